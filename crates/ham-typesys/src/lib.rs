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

//! Runtime type descriptors for introspection across plugin boundaries.
//!
//! A [`Typeset`] owns every [`Ty`] it hands out and returns one canonical
//! identity per structurally distinct description. Composite object and
//! runtime types are staged with a [`TypeBuilder`].

#![warn(missing_docs)]

mod error;

pub mod builder;
pub mod types;
pub mod typeset;

pub use builder::TypeBuilder;
pub use error::BuildError;
pub use types::{
    Member, Method, NumericInfo, ObjectKind, Param, RuntimeInfo, StringEncoding, TheoreticInfo,
    Ty, TypeFlags, TypeInfo, TypeKind,
};
pub use typeset::Typeset;

/// Rust types with a canonical counterpart in every typeset.
pub trait Reflect {
    /// The counterpart of `Self` in `typeset`.
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>>;
}

macro_rules! reflect_sized {
    ($($ty:ty => $ctor:ident),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
                    typeset.$ctor(8 * std::mem::size_of::<$ty>())
                }
            }
        )*
    };
}

reflect_sized! {
    u8 => nat, u16 => nat, u32 => nat, u64 => nat, u128 => nat, usize => nat,
    i8 => int, i16 => int, i32 => int, i64 => int, i128 => int, isize => int,
    f32 => float, f64 => float,
}

impl Reflect for bool {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        Some(typeset.bool())
    }
}

impl Reflect for () {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        Some(typeset.unit())
    }
}

impl Reflect for str {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        typeset.str(StringEncoding::Utf8)
    }
}

impl Reflect for String {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        typeset.str(StringEncoding::Utf8)
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        typeset.vec(T::reflect(typeset)?, N)
    }
}

impl<T: Reflect + ?Sized> Reflect for &T {
    fn reflect(typeset: &Typeset) -> Option<Ty<'_>> {
        typeset.reference(T::reflect(typeset)?)
    }
}
