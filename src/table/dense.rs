//! Slot table indexed directly by handle value.

use super::{IndexingMode, Slot, SlotId, SlotTable};
use crate::error::Error;
use crate::handle::Handle;

/// One preallocated slot per handle value in `0..capacity`.
///
/// Lookup is a bounds check plus an array index. Inserting and erasing only
/// flip the slot between free and claimed; nothing is allocated after
/// construction.
pub struct DenseTable<C: ?Sized> {
    slots: Box<[Slot<C>]>,
    claimed: usize,
}

impl<C: ?Sized> DenseTable<C> {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| Slot::vacant(Handle::new(i as u64)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { slots, claimed: 0 }
    }

    #[inline]
    fn index(&self, handle: Handle) -> Option<usize> {
        handle.as_index().filter(|&i| i < self.slots.len())
    }
}

impl<C: ?Sized> SlotTable<C> for DenseTable<C> {
    #[inline]
    fn lookup(&self, handle: Handle) -> Option<SlotId> {
        let index = self.index(handle)?;
        if self.slots[index].is_free() {
            None
        } else {
            Some(SlotId::new(index))
        }
    }

    fn insert(&mut self, handle: Handle) -> Result<SlotId, Error> {
        let index = self.index(handle).ok_or(Error::HandleOutOfRange {
            handle,
            capacity: self.slots.len(),
        })?;

        let slot = &mut self.slots[index];
        if !slot.is_free() {
            return Err(Error::AlreadyRegistered(handle));
        }
        slot.claim(handle);
        self.claimed += 1;
        Ok(SlotId::new(index))
    }

    fn erase(&mut self, handle: Handle) -> Option<SlotId> {
        let id = self.lookup(handle)?;
        self.slots[id.as_usize()] = Slot::vacant(handle);
        self.claimed -= 1;
        Some(id)
    }

    #[inline]
    fn get(&self, id: SlotId) -> Option<&Slot<C>> {
        self.slots.get(id.as_usize())
    }

    #[inline]
    fn get_mut(&mut self, id: SlotId) -> Option<&mut Slot<C>> {
        self.slots.get_mut(id.as_usize())
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.claimed
    }

    fn claimed(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_free())
            .map(|(i, _)| SlotId::new(i))
            .collect()
    }

    fn mode(&self) -> IndexingMode {
        IndexingMode::Dense
    }
}
