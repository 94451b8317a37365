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

//! Top-level runtime configuration.

use crate::memory::{system_allocator, AllocatorRef, TrackingAllocator};
use crate::store::StoreSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Settings shared by every manager a host creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Slot store policy applied to every object manager.
    pub store: StoreSettings,
    /// Byte budget for the runtime allocator. `None` means unbounded.
    ///
    /// Covers slot blocks and type descriptors. Store and typeset bookkeeping
    /// is allocated on the global heap and is not counted.
    pub allocator_budget: Option<usize>,
}

impl RuntimeSettings {
    /// Builds the allocator these settings describe.
    ///
    /// A budget wraps the system allocator in a [`TrackingAllocator`]; the
    /// concrete handle is returned alongside so its statistics stay readable.
    pub fn allocator(&self) -> (AllocatorRef, Option<Arc<TrackingAllocator>>) {
        match self.allocator_budget {
            Some(budget) => {
                let tracking = Arc::new(TrackingAllocator::system().with_limit(budget));
                log::debug!("Runtime allocator limited to {budget} bytes");
                let allocator: AllocatorRef = tracking.clone();
                (allocator, Some(tracking))
            }
            None => (system_allocator(), None),
        }
    }
}
