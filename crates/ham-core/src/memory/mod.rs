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

//! Explicit allocation contexts for the object runtime.
//!
//! Every long-lived runtime structure (slot stores, object managers, typesets)
//! captures an [`AllocatorRef`] when it is created and uses it for its whole
//! lifetime. There is no process-wide "current allocator": callers thread the
//! context through constructors explicitly.

mod tracking;

pub use tracking::{MemoryStats, TrackingAllocator};

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

/// A source of raw, aligned memory blocks.
///
/// Implementations must be thread-safe: a single allocator is commonly shared
/// by many managers and typesets living on different threads.
pub trait Allocator: Send + Sync {
    /// Allocates a block satisfying `layout`.
    ///
    /// Returns `None` when the request cannot be satisfied. `layout` always has
    /// a non-zero size when called by this crate.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this same allocator with
    /// an identical `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// A short human-readable name used in diagnostics.
    fn name(&self) -> &str {
        "allocator"
    }
}

/// A shared handle to an allocator.
pub type AllocatorRef = Arc<dyn Allocator>;

/// Forwards to the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: the layout has a non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Returns the shared process-wide [`SystemAllocator`] handle.
pub fn system_allocator() -> AllocatorRef {
    static SYSTEM: OnceLock<AllocatorRef> = OnceLock::new();
    SYSTEM.get_or_init(|| Arc::new(SystemAllocator)).clone()
}
