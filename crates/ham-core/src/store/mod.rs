// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pointer-stable slot storage.
//!
//! A [`SlotStore`] hands out fixed-layout slots carved from blocks that are
//! never moved or reallocated. Freed slots go back on a free list and are
//! reused by later emplacements. Because a live slot's address never changes,
//! raw slot pointers are valid handles for as long as the slot is occupied.
//!
//! Only the blocks come from the store's allocator. The bookkeeping (block
//! table, address index, free list and occupancy bits) lives on the global
//! heap, so an allocator budget bounds slot memory, not the whole footprint.

mod bitset;
mod error;
mod pool;
mod settings;

pub use error::StoreError;
pub use pool::Pool;
pub use settings::StoreSettings;

use crate::memory::AllocatorRef;
use bitset::OccupancyBitset;
use std::alloc::Layout;
use std::collections::BTreeMap;
use std::ptr::NonNull;

/// One contiguous allocation holding `capacity` slots.
struct Block {
    base: NonNull<u8>,
    capacity: usize,
    occupied: OccupancyBitset,
}

/// Coordinates of a slot inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotIndex {
    block: u32,
    slot: u32,
}

/// A pool of uninitialised, fixed-layout slots with stable addresses.
///
/// The store only manages memory: it never constructs or drops what callers
/// place in the slots. Typed ownership is layered on top by [`Pool`] and by
/// the object manager.
pub struct SlotStore {
    allocator: AllocatorRef,
    /// Layout of a single slot; `stride` is its size rounded to the alignment.
    slot_layout: Layout,
    stride: usize,
    settings: StoreSettings,
    blocks: Vec<Block>,
    /// Block base address to block index, for membership lookups.
    by_address: BTreeMap<usize, u32>,
    /// Slots available for reuse. Popped from the back.
    free: Vec<SlotIndex>,
    len: usize,
}

// SAFETY: the store exclusively owns its blocks; the raw pointers it keeps
// are never shared with another store.
unsafe impl Send for SlotStore {}

impl SlotStore {
    /// Creates a store for slots of the given `alignment` and `size` with
    /// default settings.
    pub fn new(allocator: AllocatorRef, alignment: usize, size: usize) -> Result<Self, StoreError> {
        Self::with_settings(allocator, alignment, size, StoreSettings::default())
    }

    /// Creates a store and eagerly allocates its first block.
    ///
    /// Fails if `alignment` is not a power of two or if the first block cannot
    /// be allocated.
    pub fn with_settings(
        allocator: AllocatorRef,
        alignment: usize,
        size: usize,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        let slot_layout = Layout::from_size_align(size.max(1), alignment)
            .map_err(|_| StoreError::InvalidLayout { alignment, size })?;
        let stride = slot_layout.pad_to_align().size();

        let mut store = Self {
            allocator,
            slot_layout,
            stride,
            settings: settings.normalized(),
            blocks: Vec::new(),
            by_address: BTreeMap::new(),
            free: Vec::new(),
            len: 0,
        };
        store.grow()?;

        log::trace!(
            "Created slot store (align {alignment}, size {size}, stride {stride}) on '{}' allocator",
            store.allocator.name()
        );
        Ok(store)
    }

    /// Layout of one slot.
    pub fn slot_layout(&self) -> Layout {
        self.slot_layout
    }

    /// The settings this store was created with.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of slots across all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|block| block.capacity).sum()
    }

    /// Reserves a slot and returns its (uninitialised) address.
    ///
    /// Returns `None` when the live-slot limit is reached or a new block cannot
    /// be allocated.
    pub fn emplace(&mut self) -> Option<NonNull<u8>> {
        if let Some(max) = self.settings.max_slots {
            if self.len >= max {
                log::debug!("Slot store is full ({max} live slots)");
                return None;
            }
        }

        if self.free.is_empty() {
            if let Err(err) = self.grow() {
                log::error!("Slot store could not grow: {err}");
                return None;
            }
        }

        let index = self.free.pop()?;
        let block = &mut self.blocks[index.block as usize];
        block.occupied.set(index.slot as usize);
        self.len += 1;

        Some(self.slot_ptr(index))
    }

    /// Releases the slot at `ptr`.
    ///
    /// Returns `false` if `ptr` is not an occupied slot of this store.
    pub fn erase(&mut self, ptr: NonNull<u8>) -> bool {
        let Some(index) = self.locate(ptr) else {
            return false;
        };
        self.blocks[index.block as usize]
            .occupied
            .clear(index.slot as usize);
        self.free.push(index);
        self.len -= 1;
        true
    }

    /// Returns `true` if `ptr` is the address of an occupied slot of this store.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.resolve(ptr).is_some()
    }

    /// Maps the address of an occupied slot back to the pointer the store
    /// handed out for it.
    ///
    /// Only the address of `ptr` is used; the returned pointer is derived from
    /// the owning block and is valid for the whole slot.
    pub fn resolve(&self, ptr: *const u8) -> Option<NonNull<u8>> {
        let index = self.locate(NonNull::new(ptr.cast_mut())?)?;
        Some(self.slot_ptr(index))
    }

    /// Visits occupied slots in block order.
    ///
    /// The visitor returns `false` to stop early. Returns the number of slots
    /// for which the visitor returned `true`; without a visitor, returns the
    /// number of occupied slots.
    pub fn iterate(&self, visitor: Option<&mut dyn FnMut(NonNull<u8>) -> bool>) -> usize {
        let Some(visitor) = visitor else {
            return self.len;
        };

        let mut visited = 0;
        for ptr in self.iter() {
            if !visitor(ptr) {
                break;
            }
            visited += 1;
        }
        visited
    }

    /// Iterates over the addresses of occupied slots in block order.
    pub fn iter(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(move |(block_idx, block)| {
                block.occupied.iter_ones().map(move |slot| {
                    self.slot_ptr(SlotIndex {
                        block: block_idx as u32,
                        slot: slot as u32,
                    })
                })
            })
    }

    fn slot_ptr(&self, index: SlotIndex) -> NonNull<u8> {
        let block = &self.blocks[index.block as usize];
        // SAFETY: `slot < capacity`, so the offset stays inside the block.
        unsafe { block.base.add(index.slot as usize * self.stride) }
    }

    fn locate(&self, ptr: NonNull<u8>) -> Option<SlotIndex> {
        let addr = ptr.as_ptr() as usize;
        let (&base, &block_idx) = self.by_address.range(..=addr).next_back()?;
        let block = &self.blocks[block_idx as usize];

        let offset = addr - base;
        if offset % self.stride != 0 {
            return None;
        }
        let slot = offset / self.stride;
        if slot >= block.capacity || !block.occupied.is_set(slot) {
            return None;
        }

        Some(SlotIndex {
            block: block_idx,
            slot: slot as u32,
        })
    }

    fn block_layout(&self, capacity: usize) -> Result<Layout, StoreError> {
        let bytes = self
            .stride
            .checked_mul(capacity)
            .ok_or(StoreError::OutOfMemory { bytes: usize::MAX })?;
        Layout::from_size_align(bytes, self.slot_layout.align()).map_err(|_| {
            StoreError::InvalidLayout {
                alignment: self.slot_layout.align(),
                size: bytes,
            }
        })
    }

    fn grow(&mut self) -> Result<(), StoreError> {
        let capacity = self
            .settings
            .next_capacity(self.blocks.last().map(|block| block.capacity));
        let layout = self.block_layout(capacity)?;
        let block_idx = u32::try_from(self.blocks.len()).map_err(|_| StoreError::OutOfMemory {
            bytes: layout.size(),
        })?;
        // `normalized` caps block capacities at `u32::MAX`.
        let slots = u32::try_from(capacity).unwrap_or(u32::MAX);
        let base = self
            .allocator
            .allocate(layout)
            .ok_or(StoreError::OutOfMemory {
                bytes: layout.size(),
            })?;

        self.blocks.push(Block {
            base,
            capacity,
            occupied: OccupancyBitset::with_capacity(capacity),
        });
        self.by_address.insert(base.as_ptr() as usize, block_idx);

        // Reverse order so the lowest slot is handed out first.
        self.free.extend((0..slots).rev().map(|slot| SlotIndex {
            block: block_idx,
            slot,
        }));

        log::trace!("Slot store grew by a block of {capacity} slots");
        Ok(())
    }
}

impl Drop for SlotStore {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            let Ok(layout) = Layout::from_size_align(
                self.stride * block.capacity,
                self.slot_layout.align(),
            ) else {
                continue;
            };
            // SAFETY: the block was allocated by this allocator with this layout.
            unsafe { self.allocator.deallocate(block.base, layout) };
        }
    }
}

impl std::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore")
            .field("slot_layout", &self.slot_layout)
            .field("len", &self.len)
            .field("blocks", &self.blocks.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{system_allocator, TrackingAllocator};
    use std::sync::Arc;

    fn small_settings() -> StoreSettings {
        StoreSettings {
            initial_block_capacity: 2,
            max_block_capacity: 4,
            max_slots: None,
        }
    }

    #[test]
    fn test_emplace_respects_alignment_and_stride() {
        let mut store = SlotStore::new(system_allocator(), 16, 20).unwrap();
        let a = store.emplace().unwrap();
        let b = store.emplace().unwrap();
        assert_eq!(a.as_ptr() as usize % 16, 0);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 32);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_addresses_are_stable_across_growth() {
        let mut store =
            SlotStore::with_settings(system_allocator(), 8, 8, small_settings()).unwrap();
        let first = store.emplace().unwrap();
        unsafe { first.cast::<u64>().as_ptr().write(0xDEAD_BEEF) };

        let others: Vec<_> = (0..20).map(|_| store.emplace().unwrap()).collect();
        assert!(store.capacity() >= 21);
        assert!(store.contains(first.as_ptr()));
        assert_eq!(unsafe { first.cast::<u64>().as_ptr().read() }, 0xDEAD_BEEF);
        assert!(others.iter().all(|ptr| store.contains(ptr.as_ptr())));
    }

    #[test]
    fn test_erase_recycles_slot() {
        let mut store = SlotStore::new(system_allocator(), 8, 8).unwrap();
        let a = store.emplace().unwrap();
        let _b = store.emplace().unwrap();

        assert!(store.erase(a));
        assert!(!store.contains(a.as_ptr()));
        assert!(!store.erase(a), "double erase must be rejected");

        let c = store.emplace().unwrap();
        assert_eq!(a, c, "freed slot should be reused first");
    }

    #[test]
    fn test_contains_rejects_foreign_and_misaligned_pointers() {
        let mut store = SlotStore::new(system_allocator(), 8, 16).unwrap();
        let a = store.emplace().unwrap();
        let inside = unsafe { a.as_ptr().add(4) };
        assert!(!store.contains(inside));
        assert!(!store.contains(std::ptr::null()));

        let local = 0u64;
        assert!(!store.contains((&local as *const u64).cast()));
    }

    #[test]
    fn test_iterate_counts_and_stops_early() {
        let mut store = SlotStore::new(system_allocator(), 4, 4).unwrap();
        for _ in 0..5 {
            store.emplace().unwrap();
        }
        assert_eq!(store.iterate(None), 5);

        let mut seen = 0;
        let visited = store.iterate(Some(&mut |_| {
            seen += 1;
            seen < 3
        }));
        assert_eq!(seen, 3);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_max_slots_limit() {
        let settings = StoreSettings {
            max_slots: Some(2),
            ..StoreSettings::default()
        };
        let mut store = SlotStore::with_settings(system_allocator(), 8, 8, settings).unwrap();
        let a = store.emplace().unwrap();
        store.emplace().unwrap();
        assert!(store.emplace().is_none());

        store.erase(a);
        assert!(store.emplace().is_some());
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let tracking = Arc::new(TrackingAllocator::system().with_limit(8));
        let err = SlotStore::new(tracking.clone(), 8, 64).unwrap_err();
        assert_eq!(err, StoreError::OutOfMemory { bytes: 64 * 16 });
        assert_eq!(tracking.stats().current_allocated_bytes, 0);
    }

    #[test]
    fn test_resolve_returns_the_slot_pointer() {
        let mut store = SlotStore::new(system_allocator(), 8, 16).unwrap();
        let a = store.emplace().unwrap();
        let b = store.emplace().unwrap();

        assert_eq!(store.resolve(b.as_ptr()), Some(b));
        assert_eq!(store.resolve(unsafe { a.as_ptr().add(8) }), None);
        store.erase(a);
        assert_eq!(store.resolve(a.as_ptr()), None);
    }

    #[test]
    fn test_budget_covers_slot_blocks_only() {
        // A budget of exactly one block: the free list and the address index
        // are not charged to the store's allocator.
        let tracking = Arc::new(TrackingAllocator::system().with_limit(8 * 4));
        let settings = StoreSettings {
            initial_block_capacity: 4,
            max_block_capacity: 4,
            max_slots: None,
        };
        let mut store = SlotStore::with_settings(tracking.clone(), 8, 8, settings).unwrap();
        for _ in 0..4 {
            store.emplace().unwrap();
        }
        assert_eq!(tracking.stats().current_allocated_bytes, 32);
        assert!(store.emplace().is_none());
        assert_eq!(tracking.stats().failed_allocations, 1);
    }

    #[test]
    fn test_invalid_alignment() {
        let err = SlotStore::new(system_allocator(), 3, 8).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout { alignment: 3, .. }));
    }

    #[test]
    fn test_drop_releases_every_block() {
        let tracking = Arc::new(TrackingAllocator::system());
        {
            let mut store =
                SlotStore::with_settings(tracking.clone(), 8, 8, small_settings()).unwrap();
            for _ in 0..10 {
                store.emplace().unwrap();
            }
            assert!(tracking.stats().current_allocated_bytes > 0);
        }
        assert_eq!(tracking.stats().current_allocated_bytes, 0);
    }
}
