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

//! An [`Allocator`] wrapper that tracks memory usage and enforces an optional budget.

use super::{Allocator, SystemAllocator};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A wrapper around another [`Allocator`] that counts every block it hands out.
///
/// Unlike a `#[global_allocator]`, the counters live inside the instance, so
/// each manager or typeset can be given its own tracked context. An optional
/// byte budget turns the allocator into a bounded arena: requests that would
/// push the live byte count past the limit fail with `None`.
///
/// # Usage
///
/// ```rust
/// use std::sync::Arc;
/// use ham_core::memory::{AllocatorRef, TrackingAllocator};
///
/// let tracking = Arc::new(TrackingAllocator::system().with_limit(4096));
/// let ctx: AllocatorRef = tracking.clone();
/// # let _ = ctx;
/// assert_eq!(tracking.stats().current_allocated_bytes, 0);
/// ```
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = SystemAllocator> {
    inner: A,
    limit: Option<usize>,
    current: AtomicUsize,
    peak: AtomicUsize,
    total_allocations: AtomicU64,
    total_deallocations: AtomicU64,
    failed_allocations: AtomicU64,
    bytes_allocated_lifetime: AtomicU64,
}

impl TrackingAllocator<SystemAllocator> {
    /// Creates a tracking allocator over the system allocator.
    pub fn system() -> Self {
        Self::new(SystemAllocator)
    }
}

impl<A> TrackingAllocator<A> {
    /// Creates a new tracking allocator that wraps the given inner allocator.
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            limit: None,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total_allocations: AtomicU64::new(0),
            total_deallocations: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            bytes_allocated_lifetime: AtomicU64::new(0),
        }
    }

    /// Caps the number of simultaneously live bytes.
    pub fn with_limit(mut self, bytes: usize) -> Self {
        self.limit = Some(bytes);
        self
    }

    /// Returns the configured byte budget, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Takes a snapshot of the counters.
    pub fn stats(&self) -> MemoryStats {
        let mut stats = MemoryStats {
            current_allocated_bytes: self.current.load(Ordering::Relaxed),
            peak_allocated_bytes: self.peak.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_deallocations: self.total_deallocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            bytes_allocated_lifetime: self.bytes_allocated_lifetime.load(Ordering::Relaxed),
            ..Default::default()
        };
        stats.calculate_derived_metrics();
        stats
    }

    fn reserve(&self, size: usize) -> bool {
        let limit = self.limit;
        let result = self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                let next = current.checked_add(size)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });

        match result {
            Ok(previous) => {
                self.peak.fetch_max(previous + size, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    fn release(&self, size: usize) {
        let result = self
            .current
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(size)
            });
        if result.is_err() {
            log::error!("Memory tracking counter underflowed during dealloc! Size: {size}");
        }
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let size = layout.size();
        if !self.reserve(size) {
            self.failed_allocations.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Tracking allocator refused {size} bytes (limit: {:?})",
                self.limit
            );
            return None;
        }

        match self.inner.allocate(layout) {
            Some(ptr) => {
                self.total_allocations.fetch_add(1, Ordering::Relaxed);
                self.bytes_allocated_lifetime
                    .fetch_add(size as u64, Ordering::Relaxed);
                Some(ptr)
            }
            None => {
                self.release(size);
                self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.release(layout.size());
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);
        self.inner.deallocate(ptr, layout);
    }

    fn name(&self) -> &str {
        "tracking"
    }
}

/// A snapshot of a [`TrackingAllocator`]'s counters, including derived metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryStats {
    /// The number of bytes currently in use.
    pub current_allocated_bytes: usize,
    /// The maximum number of bytes that were ever in use simultaneously.
    pub peak_allocated_bytes: usize,
    /// The number of successful allocations.
    pub total_allocations: u64,
    /// The number of deallocations.
    pub total_deallocations: u64,
    /// The number of allocations refused by the budget or the inner allocator.
    pub failed_allocations: u64,
    /// The cumulative sum of all bytes ever allocated.
    pub bytes_allocated_lifetime: u64,
    /// `total_allocations - total_deallocations`.
    pub net_allocations: i64,
    /// `bytes_allocated_lifetime / total_allocations`.
    pub average_allocation_size: f64,
}

impl MemoryStats {
    /// Populates the derived metrics based on the raw counter values.
    pub fn calculate_derived_metrics(&mut self) {
        self.net_allocations = self.total_allocations as i64 - self.total_deallocations as i64;
        if self.total_allocations > 0 {
            self.average_allocation_size =
                self.bytes_allocated_lifetime as f64 / self.total_allocations as f64;
        }
    }
}
