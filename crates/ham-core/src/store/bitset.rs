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

//! Fixed-size occupancy bitset for slot blocks.

/// A bitset wrapped around a `Vec<u64>`, one bit per slot of a block.
///
/// The size is fixed at creation: a block never grows, so neither does its
/// occupancy map.
#[derive(Debug, Clone)]
pub(crate) struct OccupancyBitset {
    bits: Vec<u64>,
    capacity: usize,
}

impl OccupancyBitset {
    /// Creates a cleared bitset able to track `capacity` slots.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Sets the bit at the specified index to 1.
    pub(crate) fn set(&mut self, index: usize) {
        debug_assert!(index < self.capacity);
        self.bits[index / 64] |= 1 << (index % 64);
    }

    /// Clears the bit at the specified index to 0.
    pub(crate) fn clear(&mut self, index: usize) {
        if let Some(word) = self.bits.get_mut(index / 64) {
            *word &= !(1 << (index % 64));
        }
    }

    /// Returns true if the bit at the specified index is set.
    pub(crate) fn is_set(&self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        (self.bits[index / 64] & (1 << (index % 64))) != 0
    }

    /// Iterates over the indices of set bits in ascending order.
    pub(crate) fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut remaining = word;
                std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros() as usize;
                    remaining &= remaining - 1;
                    Some(word_idx * 64 + bit)
                })
            })
    }
}
