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

//! A typed, owning layer over [`SlotStore`].

use super::{SlotStore, StoreError, StoreSettings};
use crate::memory::AllocatorRef;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A pointer-stable collection of `T` values.
///
/// Values inserted into a pool keep their address until they are removed or
/// the pool is dropped, which makes `NonNull<T>` returned by [`Pool::insert`]
/// usable as a long-lived identity.
pub struct Pool<T> {
    store: SlotStore,
    _marker: PhantomData<T>,
}

// SAFETY: the pool owns its values exactly like a `Vec<T>` would.
unsafe impl<T: Send> Send for Pool<T> {}

impl<T> Pool<T> {
    /// Creates an empty pool on the given allocator.
    pub fn new(allocator: AllocatorRef, settings: StoreSettings) -> Result<Self, StoreError> {
        let layout = Layout::new::<T>();
        let store = SlotStore::with_settings(allocator, layout.align(), layout.size(), settings)?;
        Ok(Self {
            store,
            _marker: PhantomData,
        })
    }

    /// Moves `value` into the pool and returns its stable address.
    ///
    /// On exhaustion the value is handed back in `Err`.
    pub fn insert(&mut self, value: T) -> Result<NonNull<T>, T> {
        match self.store.emplace() {
            Some(slot) => {
                let ptr = slot.cast::<T>();
                // SAFETY: the slot is freshly reserved and laid out for `T`.
                unsafe { ptr.as_ptr().write(value) };
                Ok(ptr)
            }
            None => Err(value),
        }
    }

    /// Removes and returns the value at `ptr`, if it belongs to this pool.
    pub fn remove(&mut self, ptr: NonNull<T>) -> Option<T> {
        if !self.store.contains(ptr.as_ptr().cast()) {
            return None;
        }
        // SAFETY: membership guarantees an initialised `T` lives there.
        let value = unsafe { ptr.as_ptr().read() };
        self.store.erase(ptr.cast());
        Some(value)
    }

    /// Returns `true` if `ptr` addresses a live value of this pool.
    pub fn contains(&self, ptr: *const T) -> bool {
        self.store.contains(ptr.cast())
    }

    /// Returns a shared reference to the value at `ptr`.
    pub fn get(&self, ptr: NonNull<T>) -> Option<&T> {
        // SAFETY: membership guarantees an initialised `T`.
        self.contains(ptr.as_ptr())
            .then(|| unsafe { &*ptr.as_ptr() })
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the pool holds no value.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Iterates over the live values in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        // SAFETY: every occupied slot holds an initialised `T`.
        self.store.iter().map(|slot| unsafe { &*slot.cast::<T>().as_ptr() })
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }
        for slot in self.store.iter() {
            // SAFETY: every occupied slot holds an initialised `T`, dropped once.
            unsafe { std::ptr::drop_in_place(slot.cast::<T>().as_ptr()) };
        }
    }
}
