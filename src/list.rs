//! Index-based doubly linked lists threaded through the slot table.
//!
//! Each slot carries one [`Link`], so a slot can sit in at most one list at a
//! time. Lists only store their head, tail and length; the links live in the
//! slots and are reached through the [`Links`] trait.

use crate::table::SlotId;

/// Previous/next pointers of a slot, expressed as slot ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    pub(crate) prev: Option<SlotId>,
    pub(crate) next: Option<SlotId>,
}

/// Access to the links stored in a slot table.
pub trait Links {
    fn link(&self, id: SlotId) -> Link;
    fn set_link(&mut self, id: SlotId, link: Link);

    fn set_prev(&mut self, id: SlotId, prev: Option<SlotId>) {
        let mut link = self.link(id);
        link.prev = prev;
        self.set_link(id, link);
    }

    fn set_next(&mut self, id: SlotId, next: Option<SlotId>) {
        let mut link = self.link(id);
        link.next = next;
        self.set_link(id, link);
    }
}

/// Head of one logical list.
#[derive(Debug, Clone, Default)]
pub struct SlotList {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl SlotList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<SlotId> {
        self.tail
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `id` at the tail.
    pub fn push_back<N: Links + ?Sized>(&mut self, nodes: &mut N, id: SlotId) {
        let tail = self.tail;
        self.insert_after(nodes, tail, id);
    }

    /// Link `id` right after `after`, or at the head when `after` is `None`.
    ///
    /// `id` must not currently be linked into any list.
    pub fn insert_after<N: Links + ?Sized>(
        &mut self,
        nodes: &mut N,
        after: Option<SlotId>,
        id: SlotId,
    ) {
        let next = match after {
            Some(prev) => nodes.link(prev).next,
            None => self.head,
        };

        nodes.set_link(id, Link { prev: after, next });

        match after {
            Some(prev) => nodes.set_next(prev, Some(id)),
            None => self.head = Some(id),
        }
        match next {
            Some(next) => nodes.set_prev(next, Some(id)),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    /// Remove `id` from this list. `id` must be linked into this list.
    pub fn unlink<N: Links + ?Sized>(&mut self, nodes: &mut N, id: SlotId) {
        let Link { prev, next } = nodes.link(id);

        match prev {
            Some(prev) => nodes.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(next) => nodes.set_prev(next, prev),
            None => self.tail = prev,
        }

        nodes.set_link(id, Link::default());
        self.len -= 1;
    }

    /// Remove and return the head.
    pub fn pop_front<N: Links + ?Sized>(&mut self, nodes: &mut N) -> Option<SlotId> {
        let head = self.head?;
        self.unlink(nodes, head);
        Some(head)
    }

    /// Iterate from head to tail.
    pub fn iter<'a, N: Links + ?Sized>(&self, nodes: &'a N) -> Iter<'a, N> {
        Iter {
            nodes,
            next: self.head,
        }
    }
}

pub struct Iter<'a, N: ?Sized> {
    nodes: &'a N,
    next: Option<SlotId>,
}

impl<N: Links + ?Sized> Iterator for Iter<'_, N> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        let current = self.next?;
        self.next = self.nodes.link(current).next;
        Some(current)
    }
}
