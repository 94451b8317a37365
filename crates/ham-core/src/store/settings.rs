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

use serde::{Deserialize, Serialize};

/// Largest number of slots a single block may hold; slots are indexed by `u32`.
const MAX_BLOCK_SLOTS: usize = u32::MAX as usize;

/// Growth and capacity policy of a [`SlotStore`](super::SlotStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Number of slots in the first block, allocated when the store is created.
    pub initial_block_capacity: usize,
    /// Upper bound for the capacity of a single block. Blocks double in size
    /// until they reach it.
    pub max_block_capacity: usize,
    /// Maximum number of simultaneously live slots. `None` means unbounded.
    pub max_slots: Option<usize>,
}

impl StoreSettings {
    /// Returns the settings with both capacities clamped to `1..=u32::MAX`
    /// slots and `max_block_capacity >= initial_block_capacity`.
    pub fn normalized(self) -> Self {
        let initial = self.initial_block_capacity.clamp(1, MAX_BLOCK_SLOTS);
        Self {
            initial_block_capacity: initial,
            max_block_capacity: self.max_block_capacity.clamp(initial, MAX_BLOCK_SLOTS),
            max_slots: self.max_slots,
        }
    }

    /// Capacity of the block following one of `previous` slots.
    pub(crate) fn next_capacity(&self, previous: Option<usize>) -> usize {
        match previous {
            None => self.initial_block_capacity,
            Some(previous) => previous.saturating_mul(2).min(self.max_block_capacity),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            initial_block_capacity: 16,
            max_block_capacity: 1024,
            max_slots: None,
        }
    }
}
