//! Hash-indexed slot table for opaque handle values.

use super::{IndexingMode, Slot, SlotId, SlotTable};
use crate::error::Error;
use crate::handle::Handle;
use ahash::RandomState;
use slab::Slab;

/// Number of entries a bucket grows by when it runs full.
const BUCKET_GROWTH: usize = 8;

/// Fixed seeds keep bucket placement reproducible across runs.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Slots handed out from a fixed-size pool, found through hash buckets.
///
/// The bucket array holds at least twice as many buckets as there are slots
/// (rounded up to a power of two), so buckets stay short and `lookup` scans
/// them linearly. Freed slots go back to the pool and are reused before
/// untouched ones.
pub struct SparseTable<C: ?Sized> {
    slots: Slab<Slot<C>>,
    capacity: usize,
    buckets: Box<[Vec<SlotId>]>,
    mask: u64,
    hasher: RandomState,
}

impl<C: ?Sized> SparseTable<C> {
    pub fn new(capacity: usize) -> Self {
        let size = (capacity.max(1) * 2).next_power_of_two();
        let buckets = (0..size)
            .map(|_| Vec::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots: Slab::with_capacity(capacity),
            capacity,
            buckets,
            mask: (size - 1) as u64,
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    #[inline]
    fn bucket_of(&self, handle: Handle) -> usize {
        (self.hasher.hash_one(handle.as_u64()) & self.mask) as usize
    }

    /// Position of `handle` within its bucket.
    fn position(&self, bucket: usize, handle: Handle) -> Option<usize> {
        self.buckets[bucket]
            .iter()
            .position(|id| self.slots.get(id.as_usize()).map(|s| s.handle) == Some(handle))
    }

    /// Number of hash buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<C: ?Sized> SlotTable<C> for SparseTable<C> {
    fn lookup(&self, handle: Handle) -> Option<SlotId> {
        let bucket = self.bucket_of(handle);
        self.position(bucket, handle)
            .map(|pos| self.buckets[bucket][pos])
    }

    fn insert(&mut self, handle: Handle) -> Result<SlotId, Error> {
        let bucket = self.bucket_of(handle);
        if self.position(bucket, handle).is_some() {
            return Err(Error::AlreadyRegistered(handle));
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::TableFull {
                capacity: self.capacity,
            });
        }

        let entries = &mut self.buckets[bucket];
        if entries.len() == entries.capacity() {
            entries
                .try_reserve_exact(BUCKET_GROWTH)
                .map_err(|_| Error::AllocationFailed(handle))?;
        }

        let entry = self.slots.vacant_entry();
        let id = SlotId::new(entry.key());
        let mut slot = Slot::vacant(handle);
        slot.claim(handle);
        entry.insert(slot);
        entries.push(id);
        Ok(id)
    }

    fn erase(&mut self, handle: Handle) -> Option<SlotId> {
        let bucket = self.bucket_of(handle);
        let pos = self.position(bucket, handle)?;
        // order-preserving removal keeps older registrations first in the scan
        let id = self.buckets[bucket].remove(pos);
        self.slots.try_remove(id.as_usize());
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
        self.capacity
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn claimed(&self) -> Vec<SlotId> {
        self.slots.iter().map(|(key, _)| SlotId::new(key)).collect()
    }

    fn mode(&self) -> IndexingMode {
        IndexingMode::Sparse
    }
}
