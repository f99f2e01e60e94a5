//! Slot tables mapping native handles to manager slots.
//!
//! Two strategies implement [`SlotTable`]:
//!
//! - [`DenseTable`] addresses slots directly by handle value. It suits
//!   platforms where handles are small non-negative integers (Unix file
//!   descriptors).
//! - [`SparseTable`] hashes handles into buckets and hands out slots from a
//!   fixed pool. It suits platforms with opaque handle values.
//!
//! The strategy is picked once, when the manager is built.

mod dense;
mod sparse;

pub use dense::DenseTable;
pub use sparse::SparseTable;

use crate::connection::ConnectionRef;
use crate::error::Error;
use crate::handle::Handle;
use crate::list::{Link, Links};
use crate::readiness::Readiness;
use serde::Deserialize;
use std::time::Instant;

/// Index of a slot inside a slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Which list a slot currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    /// Not in use.
    #[default]
    Free,
    /// Registered, needs neither a timeout nor service.
    Untracked,
    /// Linked into the timeout list.
    Timeout,
    /// Linked into the serviceable list.
    Serviceable,
}

/// The manager's record for one registered connection.
pub struct Slot<C: ?Sized> {
    pub(crate) handle: Handle,
    pub(crate) connection: Option<ConnectionRef<C>>,
    pub(crate) last: Readiness,
    pub(crate) deadline: Option<Instant>,
    pub(crate) link: Link,
    pub(crate) membership: Membership,
}

impl<C: ?Sized> Slot<C> {
    pub(crate) fn vacant(handle: Handle) -> Self {
        Self {
            handle,
            connection: None,
            last: Readiness::DORMANT,
            deadline: None,
            link: Link::default(),
            membership: Membership::Free,
        }
    }

    /// Reset to the just-allocated state for `handle`.
    pub(crate) fn claim(&mut self, handle: Handle) {
        *self = Self::vacant(handle);
        self.membership = Membership::Untracked;
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn is_free(&self) -> bool {
        self.membership == Membership::Free
    }
}

/// Handle-to-slot indexing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    /// One slot per handle value below the table capacity.
    Dense,
    /// Hash buckets over a fixed slot pool.
    Sparse,
}

impl Default for IndexingMode {
    fn default() -> Self {
        if cfg!(unix) {
            IndexingMode::Dense
        } else {
            IndexingMode::Sparse
        }
    }
}

/// Storage and lookup of slots by native handle.
pub trait SlotTable<C: ?Sized> {
    /// Find the slot registered for `handle`.
    fn lookup(&self, handle: Handle) -> Option<SlotId>;

    /// Claim a slot for `handle`. Fails without side effects if the handle is
    /// already present or no slot can be provided.
    fn insert(&mut self, handle: Handle) -> Result<SlotId, Error>;

    /// Release the slot registered for `handle`, returning its id.
    fn erase(&mut self, handle: Handle) -> Option<SlotId>;

    fn get(&self, id: SlotId) -> Option<&Slot<C>>;

    fn get_mut(&mut self, id: SlotId) -> Option<&mut Slot<C>>;

    /// Maximum number of slots.
    fn capacity(&self) -> usize;

    /// Number of claimed slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all claimed slots.
    fn claimed(&self) -> Vec<SlotId>;

    fn mode(&self) -> IndexingMode;
}

impl<C: ?Sized> Links for dyn SlotTable<C> + '_ {
    fn link(&self, id: SlotId) -> Link {
        self.get(id).map(|slot| slot.link).unwrap_or_default()
    }

    fn set_link(&mut self, id: SlotId, link: Link) {
        if let Some(slot) = self.get_mut(id) {
            slot.link = link;
        }
    }
}

/// Build the table for `mode` with room for `capacity` slots.
pub fn build<C: ?Sized + 'static>(mode: IndexingMode, capacity: usize) -> Box<dyn SlotTable<C>> {
    match mode {
        IndexingMode::Dense => Box::new(DenseTable::new(capacity)),
        IndexingMode::Sparse => Box::new(SparseTable::new(capacity)),
    }
}
