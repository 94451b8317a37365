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

//! Tagged, positional constructor arguments.

use super::{ArgError, ObjectHandle};
use std::any::Any;
use std::fmt;

/// The tag of an [`Arg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// A boolean.
    Bool,
    /// A signed integer.
    Int,
    /// An unsigned integer.
    Nat,
    /// A floating-point number.
    Float,
    /// A borrowed string.
    Str,
    /// A handle to another managed object.
    Object,
    /// Any other borrowed value.
    Opaque,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Bool => "bool",
            ArgKind::Int => "int",
            ArgKind::Nat => "nat",
            ArgKind::Float => "float",
            ArgKind::Str => "str",
            ArgKind::Object => "object",
            ArgKind::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// A single constructor argument.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    Nat(u64),
    /// A floating-point number.
    Float(f64),
    /// A borrowed string.
    Str(&'a str),
    /// A handle to another managed object.
    Object(ObjectHandle),
    /// Any other borrowed value, recovered with [`Args::opaque`].
    Opaque(&'a dyn Any),
}

impl Arg<'_> {
    /// The tag of this argument.
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Bool(_) => ArgKind::Bool,
            Arg::Int(_) => ArgKind::Int,
            Arg::Nat(_) => ArgKind::Nat,
            Arg::Float(_) => ArgKind::Float,
            Arg::Str(_) => ArgKind::Str,
            Arg::Object(_) => ArgKind::Object,
            Arg::Opaque(_) => ArgKind::Opaque,
        }
    }
}

impl From<bool> for Arg<'_> {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u64> for Arg<'_> {
    fn from(value: u64) -> Self {
        Arg::Nat(value)
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::Nat(value.into())
    }
}

impl From<f64> for Arg<'_> {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(value)
    }
}

impl From<ObjectHandle> for Arg<'_> {
    fn from(value: ObjectHandle) -> Self {
        Arg::Object(value)
    }
}

/// A borrowed list of positional arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    items: &'a [Arg<'a>],
}

impl<'a> Args<'a> {
    /// Wraps a slice of arguments.
    pub const fn new(items: &'a [Arg<'a>]) -> Self {
        Self { items }
    }

    /// An empty argument list.
    pub const fn empty() -> Self {
        Self { items: &[] }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The argument at `index`.
    pub fn get(&self, index: usize) -> Option<Arg<'a>> {
        self.items.get(index).copied()
    }

    /// Iterates over the arguments.
    pub fn iter(&self) -> impl Iterator<Item = Arg<'a>> + 'a {
        self.items.iter().copied()
    }

    /// Validates arity and tags against a signature.
    pub fn check(&self, signature: &[ArgKind]) -> Result<(), ArgError> {
        if self.items.len() != signature.len() {
            return Err(ArgError::Arity {
                expected: signature.len(),
                found: self.items.len(),
            });
        }
        for (index, (arg, &expected)) in self.items.iter().zip(signature).enumerate() {
            let found = arg.kind();
            if found != expected {
                return Err(ArgError::Kind {
                    index,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn expect(&self, index: usize, expected: ArgKind) -> Result<Arg<'a>, ArgError> {
        let arg = self.get(index).ok_or(ArgError::Missing { index })?;
        if arg.kind() != expected {
            return Err(ArgError::Kind {
                index,
                expected,
                found: arg.kind(),
            });
        }
        Ok(arg)
    }

    /// The boolean at `index`.
    pub fn bool(&self, index: usize) -> Result<bool, ArgError> {
        match self.expect(index, ArgKind::Bool)? {
            Arg::Bool(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Bool, &other)),
        }
    }

    /// The signed integer at `index`.
    pub fn int(&self, index: usize) -> Result<i64, ArgError> {
        match self.expect(index, ArgKind::Int)? {
            Arg::Int(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Int, &other)),
        }
    }

    /// The unsigned integer at `index`.
    pub fn nat(&self, index: usize) -> Result<u64, ArgError> {
        match self.expect(index, ArgKind::Nat)? {
            Arg::Nat(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Nat, &other)),
        }
    }

    /// The float at `index`.
    pub fn float(&self, index: usize) -> Result<f64, ArgError> {
        match self.expect(index, ArgKind::Float)? {
            Arg::Float(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Float, &other)),
        }
    }

    /// The string at `index`.
    pub fn str(&self, index: usize) -> Result<&'a str, ArgError> {
        match self.expect(index, ArgKind::Str)? {
            Arg::Str(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Str, &other)),
        }
    }

    /// The object handle at `index`.
    pub fn object(&self, index: usize) -> Result<ObjectHandle, ArgError> {
        match self.expect(index, ArgKind::Object)? {
            Arg::Object(value) => Ok(value),
            other => Err(mismatch(index, ArgKind::Object, &other)),
        }
    }

    /// The opaque value at `index`, downcast to `T`.
    pub fn opaque<T: Any>(&self, index: usize) -> Result<&'a T, ArgError> {
        match self.expect(index, ArgKind::Opaque)? {
            Arg::Opaque(value) => value
                .downcast_ref::<T>()
                .ok_or(ArgError::OpaqueType { index }),
            other => Err(mismatch(index, ArgKind::Opaque, &other)),
        }
    }
}

fn mismatch(index: usize, expected: ArgKind, found: &Arg<'_>) -> ArgError {
    ArgError::Kind {
        index,
        expected,
        found: found.kind(),
    }
}

/// Builds an [`Args`] list from expressions convertible into [`Arg`].
///
/// The list borrows a temporary array, so use it directly as a call argument.
///
/// ```rust
/// use ham_core::{args, object::ArgKind};
///
/// assert!(args![3, "label", true]
///     .check(&[ArgKind::Int, ArgKind::Str, ArgKind::Bool])
///     .is_ok());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::object::Args::empty()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::object::Args::new(&[$($crate::object::Arg::from($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_reports_arity_and_kind() {
        let items = [Arg::Int(1), Arg::Str("x")];
        let args = Args::new(&items);

        assert!(args.check(&[ArgKind::Int, ArgKind::Str]).is_ok());
        assert_eq!(
            args.check(&[ArgKind::Int]),
            Err(ArgError::Arity {
                expected: 1,
                found: 2
            })
        );
        assert_eq!(
            args.check(&[ArgKind::Int, ArgKind::Float]),
            Err(ArgError::Kind {
                index: 1,
                expected: ArgKind::Float,
                found: ArgKind::Str
            })
        );
    }

    #[test]
    fn test_typed_getters() {
        let payload = 42u16;
        let items = [
            Arg::Bool(true),
            Arg::Nat(7),
            Arg::Float(0.5),
            Arg::Opaque(&payload),
        ];
        let args = Args::new(&items);

        assert_eq!(args.bool(0), Ok(true));
        assert_eq!(args.nat(1), Ok(7));
        assert_eq!(args.float(2), Ok(0.5));
        assert_eq!(args.opaque::<u16>(3), Ok(&42));
        assert_eq!(args.opaque::<u32>(3), Err(ArgError::OpaqueType { index: 3 }));
        assert_eq!(args.int(9), Err(ArgError::Missing { index: 9 }));
        assert!(matches!(args.str(0), Err(ArgError::Kind { index: 0, .. })));
    }

    #[test]
    fn test_args_macro_converts_values() {
        let kinds: Vec<ArgKind> = crate::args![1i64, 2u32, "three"]
            .iter()
            .map(|arg| arg.kind())
            .collect();
        assert_eq!(kinds, vec![ArgKind::Int, ArgKind::Nat, ArgKind::Str]);
        assert!(crate::args![].is_empty());
    }
}
