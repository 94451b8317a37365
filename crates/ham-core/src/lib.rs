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

//! # Ham Core
//!
//! The object runtime: embedding-based object types with explicit vtables,
//! pointer-stable slot storage, and object managers that own every instance
//! of one concrete type.

#![warn(missing_docs)]

// Lets `#[derive(Derived)]` expand to `::ham_core` paths inside this crate too.
extern crate self as ham_core;

pub mod manager;
pub mod memory;
pub mod object;
pub mod registry;
pub mod settings;
pub mod store;

pub use manager::ObjectManager;
pub use object::{Args, Object, ObjectHandle, ObjectInfo, ObjectVTable, VTableRef};
pub use registry::ManagerRegistry;
pub use settings::RuntimeSettings;

#[doc(hidden)]
pub use inventory;
