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

use crate::types::TypeKind;
use std::fmt;

/// An error raised by [`TypeBuilder::instantiate`](crate::TypeBuilder::instantiate).
///
/// The builder keeps its staged state on every error, so the caller may fix
/// the description and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Builders only produce object and runtime types.
    UnsupportedKind(TypeKind),
    /// Object types must be named.
    MissingName,
    /// A parent or vtable was staged on a non-object type.
    NotAnObject {
        /// What was staged (`"parent"` or `"vptr"`).
        what: &'static str,
    },
    /// The staged parent is not an object type.
    InvalidParent {
        /// Name of the rejected parent.
        parent: String,
    },
    /// A referenced type belongs to another typeset.
    ForeignType {
        /// Where the type was referenced.
        context: String,
    },
    /// A member type has no runtime representation (void, top or bottom).
    UninhabitedMember {
        /// The member name.
        member: String,
    },
    /// Two members share a name.
    DuplicateMember {
        /// The repeated name.
        member: String,
    },
    /// The laid-out size does not fit in `usize`.
    LayoutOverflow,
    /// The name is taken by a type with a different structure.
    NameConflict {
        /// The contested name.
        name: String,
    },
    /// The typeset could not store the new type.
    OutOfMemory,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnsupportedKind(kind) => {
                write!(f, "Type builders cannot produce {kind:?} types")
            }
            BuildError::MissingName => write!(f, "Object types require a name"),
            BuildError::NotAnObject { what } => {
                write!(f, "Only object types may carry a {what}")
            }
            BuildError::InvalidParent { parent } => {
                write!(f, "Parent '{parent}' is not an object type")
            }
            BuildError::ForeignType { context } => {
                write!(f, "Type used as {context} belongs to another typeset")
            }
            BuildError::UninhabitedMember { member } => {
                write!(f, "Member '{member}' has an uninhabited type")
            }
            BuildError::DuplicateMember { member } => {
                write!(f, "Member '{member}' is declared twice")
            }
            BuildError::LayoutOverflow => write!(f, "Type layout overflows"),
            BuildError::NameConflict { name } => {
                write!(f, "Type '{name}' is already defined with a different structure")
            }
            BuildError::OutOfMemory => write!(f, "Typeset is out of memory"),
        }
    }
}

impl std::error::Error for BuildError {}
