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

use std::fmt;

/// An error raised while creating or growing a [`SlotStore`](super::SlotStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The requested slot layout is not representable (alignment not a power
    /// of two, or the size overflows when padded).
    InvalidLayout {
        /// The requested alignment.
        alignment: usize,
        /// The requested size.
        size: usize,
    },
    /// The allocator could not provide a new block.
    OutOfMemory {
        /// Size of the refused block, in bytes.
        bytes: usize,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidLayout { alignment, size } => {
                write!(f, "Invalid slot layout (alignment {alignment}, size {size})")
            }
            StoreError::OutOfMemory { bytes } => {
                write!(f, "Out of memory while allocating a {bytes} byte block")
            }
        }
    }
}

impl std::error::Error for StoreError {}
