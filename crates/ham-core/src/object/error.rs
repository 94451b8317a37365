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

//! Error types of the object runtime.

use super::ArgKind;
use crate::store::StoreError;
use std::fmt;

/// Constructor arguments that do not match the expected signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgError {
    /// Wrong number of arguments.
    Arity {
        /// Number of parameters in the signature.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },
    /// An argument carries the wrong tag.
    Kind {
        /// Position of the offending argument.
        index: usize,
        /// The tag the signature asks for.
        expected: ArgKind,
        /// The tag supplied.
        found: ArgKind,
    },
    /// No argument at the requested position.
    Missing {
        /// The requested position.
        index: usize,
    },
    /// An opaque argument does not hold the requested Rust type.
    OpaqueType {
        /// Position of the offending argument.
        index: usize,
    },
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::Arity { expected, found } => {
                write!(f, "Expected {expected} argument(s), found {found}")
            }
            ArgError::Kind {
                index,
                expected,
                found,
            } => {
                write!(f, "Argument {index} should be '{expected}', found '{found}'")
            }
            ArgError::Missing { index } => write!(f, "Missing argument {index}"),
            ArgError::OpaqueType { index } => {
                write!(f, "Opaque argument {index} holds an unexpected type")
            }
        }
    }
}

impl std::error::Error for ArgError {}

/// A constructor refused to build an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructError {
    /// The arguments could not be interpreted.
    BadArguments(ArgError),
    /// The constructor failed for a domain-specific reason.
    Failed(String),
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::BadArguments(err) => write!(f, "Bad constructor arguments: {err}"),
            ConstructError::Failed(msg) => write!(f, "Construction failed: {msg}"),
        }
    }
}

impl std::error::Error for ConstructError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConstructError::BadArguments(err) => Some(err),
            ConstructError::Failed(_) => None,
        }
    }
}

impl From<ArgError> for ConstructError {
    fn from(err: ArgError) -> Self {
        ConstructError::BadArguments(err)
    }
}

/// An error raised by an object manager or registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectError {
    /// A null vtable was supplied.
    NullVTable,
    /// The vtable's info violates a layout invariant.
    InvalidInfo {
        /// Name of the offending type.
        name: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The slot store backing a manager could not be created.
    StoreCreation(StoreError),
    /// No slot could be reserved for a new instance.
    StoreExhausted {
        /// Name of the type being instantiated.
        name: &'static str,
    },
    /// The arguments do not match the type's constructor signature.
    BadArguments(ArgError),
    /// The initialiser rejected the reserved memory. The slot has been released.
    InitFailed {
        /// Name of the type being instantiated.
        name: &'static str,
    },
    /// The constructor reported a failure. The slot has been released.
    ConstructionFailed {
        /// Name of the type being instantiated.
        name: &'static str,
        /// The constructor's error.
        source: ConstructError,
    },
    /// Another class is already registered under this name.
    DuplicateClass {
        /// The contested name.
        name: &'static str,
    },
    /// No manager is registered under this name.
    UnknownClass {
        /// The requested name.
        name: String,
    },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::NullVTable => write!(f, "Object manager created with a null vtable"),
            ObjectError::InvalidInfo { name, reason } => {
                write!(f, "Invalid type info for '{name}': {reason}")
            }
            ObjectError::StoreCreation(err) => {
                write!(f, "Failed to create the object slot store: {err}")
            }
            ObjectError::StoreExhausted { name } => {
                write!(f, "No slot available for a new '{name}' instance")
            }
            ObjectError::BadArguments(err) => write!(f, "Bad arguments: {err}"),
            ObjectError::InitFailed { name } => {
                write!(f, "Initialisation of a new '{name}' instance failed")
            }
            ObjectError::ConstructionFailed { name, source } => {
                write!(f, "Constructor of '{name}' failed: {source}")
            }
            ObjectError::DuplicateClass { name } => {
                write!(f, "A different class is already registered as '{name}'")
            }
            ObjectError::UnknownClass { name } => write!(f, "No class registered as '{name}'"),
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObjectError::StoreCreation(err) => Some(err),
            ObjectError::BadArguments(err) => Some(err),
            ObjectError::ConstructionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for ObjectError {
    fn from(err: StoreError) -> Self {
        ObjectError::StoreCreation(err)
    }
}
