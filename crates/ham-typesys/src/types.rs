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

//! Immutable type descriptors and the flags that classify them.

use ham_core::VTableRef;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// The broad family a type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeKind {
    /// Types with no runtime representation of their own (void, top, refs, ...).
    Theoretic = 0,
    /// Named aggregate object types.
    Object = 1,
    /// Encoded character strings.
    String = 2,
    /// Booleans, integers, rationals, floats and vectors.
    Numeric = 3,
    /// Types owned by a foreign runtime.
    Runtime = 4,
}

impl TypeKind {
    fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => TypeKind::Theoretic,
            1 => TypeKind::Object,
            2 => TypeKind::String,
            3 => TypeKind::Numeric,
            4 => TypeKind::Runtime,
            _ => return None,
        })
    }
}

/// Refinement of [`TypeKind::Theoretic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TheoreticInfo {
    /// The empty return type.
    Void = 0,
    /// The single-valued type.
    Unit = 1,
    /// Supertype of every type.
    Top = 2,
    /// Subtype of every type.
    Bottom = 3,
    /// Reference to another type.
    Ref = 4,
    /// Placeholder for any object.
    Object = 5,
}

/// Refinement of [`TypeKind::Object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    /// Plain data with no vtable.
    Pod = 0,
    /// Carries a vtable pointer at its root.
    Virtual = 1,
}

/// Refinement of [`TypeKind::String`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StringEncoding {
    /// UTF-8 code units.
    Utf8 = 0,
    /// UTF-16 code units.
    Utf16 = 1,
    /// UTF-32 code units.
    Utf32 = 2,
}

impl StringEncoding {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            StringEncoding::Utf8 => "utf8",
            StringEncoding::Utf16 => "utf16",
            StringEncoding::Utf32 => "utf32",
        }
    }
}

/// Refinement of [`TypeKind::Numeric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumericInfo {
    /// `bool`.
    Boolean = 0,
    /// Unsigned integers.
    Natural = 1,
    /// Signed integers.
    Integer = 2,
    /// Fixed-width rationals.
    Rational = 3,
    /// IEEE floating point.
    FloatingPoint = 4,
    /// Fixed-length vectors of another type.
    Vector = 5,
}

/// Refinement of [`TypeKind::Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuntimeInfo {
    /// A C-layout type.
    C = 0,
}

/// A kind together with its kind-relative refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    /// See [`TheoreticInfo`].
    Theoretic(TheoreticInfo),
    /// See [`ObjectKind`].
    Object(ObjectKind),
    /// See [`StringEncoding`].
    String(StringEncoding),
    /// See [`NumericInfo`].
    Numeric(NumericInfo),
    /// See [`RuntimeInfo`].
    Runtime(RuntimeInfo),
}

impl TypeInfo {
    /// The kind of this info.
    pub fn kind(self) -> TypeKind {
        match self {
            TypeInfo::Theoretic(_) => TypeKind::Theoretic,
            TypeInfo::Object(_) => TypeKind::Object,
            TypeInfo::String(_) => TypeKind::String,
            TypeInfo::Numeric(_) => TypeKind::Numeric,
            TypeInfo::Runtime(_) => TypeKind::Runtime,
        }
    }

    fn code(self) -> u32 {
        match self {
            TypeInfo::Theoretic(info) => info as u32,
            TypeInfo::Object(info) => info as u32,
            TypeInfo::String(info) => info as u32,
            TypeInfo::Numeric(info) => info as u32,
            TypeInfo::Runtime(info) => info as u32,
        }
    }

    fn from_parts(kind: TypeKind, code: u32) -> Option<Self> {
        use TheoreticInfo as T;
        Some(match (kind, code) {
            (TypeKind::Theoretic, 0) => TypeInfo::Theoretic(T::Void),
            (TypeKind::Theoretic, 1) => TypeInfo::Theoretic(T::Unit),
            (TypeKind::Theoretic, 2) => TypeInfo::Theoretic(T::Top),
            (TypeKind::Theoretic, 3) => TypeInfo::Theoretic(T::Bottom),
            (TypeKind::Theoretic, 4) => TypeInfo::Theoretic(T::Ref),
            (TypeKind::Theoretic, 5) => TypeInfo::Theoretic(T::Object),
            (TypeKind::Object, 0) => TypeInfo::Object(ObjectKind::Pod),
            (TypeKind::Object, 1) => TypeInfo::Object(ObjectKind::Virtual),
            (TypeKind::String, 0) => TypeInfo::String(StringEncoding::Utf8),
            (TypeKind::String, 1) => TypeInfo::String(StringEncoding::Utf16),
            (TypeKind::String, 2) => TypeInfo::String(StringEncoding::Utf32),
            (TypeKind::Numeric, 0) => TypeInfo::Numeric(NumericInfo::Boolean),
            (TypeKind::Numeric, 1) => TypeInfo::Numeric(NumericInfo::Natural),
            (TypeKind::Numeric, 2) => TypeInfo::Numeric(NumericInfo::Integer),
            (TypeKind::Numeric, 3) => TypeInfo::Numeric(NumericInfo::Rational),
            (TypeKind::Numeric, 4) => TypeInfo::Numeric(NumericInfo::FloatingPoint),
            (TypeKind::Numeric, 5) => TypeInfo::Numeric(NumericInfo::Vector),
            (TypeKind::Runtime, 0) => TypeInfo::Runtime(RuntimeInfo::C),
            _ => return None,
        })
    }
}

/// Kind and info packed into one word: the kind in the low 3 bits, the
/// kind-relative info in the next 6.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeFlags(u32);

impl TypeFlags {
    /// Mask of the kind bits.
    pub const KIND_MASK: u32 = 0x7;
    /// Shift of the info bits.
    pub const INFO_SHIFT: u32 = Self::KIND_MASK.count_ones();
    /// Mask of the info bits, after shifting.
    pub const INFO_MASK: u32 = 0x3F << Self::INFO_SHIFT;

    /// Packs a kind and a raw info code.
    pub const fn pack(kind: TypeKind, info: u32) -> Self {
        Self((kind as u32 & Self::KIND_MASK) | ((info << Self::INFO_SHIFT) & Self::INFO_MASK))
    }

    /// Reinterprets raw bits, rejecting unknown kind/info combinations.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let flags = Self(bits & (Self::KIND_MASK | Self::INFO_MASK));
        (flags.0 == bits && flags.decode().is_some()).then_some(flags)
    }

    /// The packed word.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The raw info code.
    pub const fn info_code(self) -> u32 {
        (self.0 & Self::INFO_MASK) >> Self::INFO_SHIFT
    }

    /// The kind, if the kind bits are valid.
    pub fn kind(self) -> Option<TypeKind> {
        TypeKind::from_bits(self.0 & Self::KIND_MASK)
    }

    /// Unpacks the flags.
    pub fn decode(self) -> Option<TypeInfo> {
        TypeInfo::from_parts(self.kind()?, self.info_code())
    }
}

impl From<TypeInfo> for TypeFlags {
    fn from(info: TypeInfo) -> Self {
        Self::pack(info.kind(), info.code())
    }
}

impl fmt::Debug for TypeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some(info) => write!(f, "TypeFlags({info:?})"),
            None => write!(f, "TypeFlags({:#x})", self.0),
        }
    }
}

/// Kind-specific parameters of a type.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TypeParams {
    None,
    Bits(u16),
    Ref(NonNull<TypeData>),
    Vec(NonNull<TypeData>, usize),
}

pub(crate) struct MemberData {
    pub(crate) name: String,
    pub(crate) ty: NonNull<TypeData>,
    pub(crate) offset: usize,
}

pub(crate) struct ParamData {
    pub(crate) name: String,
    pub(crate) ty: NonNull<TypeData>,
}

pub(crate) struct MethodData {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamData>,
}

/// Storage of one interned type. Referenced types live in the same typeset.
pub(crate) struct TypeData {
    pub(crate) owner: u64,
    pub(crate) info: TypeInfo,
    pub(crate) name: Option<String>,
    pub(crate) alignment: usize,
    pub(crate) size: usize,
    pub(crate) params: TypeParams,
    pub(crate) parent: Option<NonNull<TypeData>>,
    pub(crate) vptr: Option<VTableRef>,
    pub(crate) members: Vec<MemberData>,
    pub(crate) methods: Vec<MethodData>,
}

impl TypeData {
    pub(crate) fn basic(
        owner: u64,
        info: TypeInfo,
        name: String,
        alignment: usize,
        size: usize,
        params: TypeParams,
    ) -> Self {
        Self {
            owner,
            info,
            name: Some(name),
            alignment,
            size,
            params,
            parent: None,
            vptr: None,
            members: Vec::new(),
            methods: Vec::new(),
        }
    }
}

/// Rebinds a stored type pointer to the lifetime of its typeset.
///
/// # Safety
///
/// `ptr` must point at a type interned in a typeset borrowed for `'ts`.
pub(crate) unsafe fn ty<'ts>(ptr: NonNull<TypeData>) -> Ty<'ts> {
    Ty {
        data: &*ptr.as_ptr(),
    }
}

/// A canonical type, borrowed from the typeset that owns it.
///
/// Identity is the address: two `Ty` are equal iff they are the same
/// interned type.
#[derive(Clone, Copy)]
pub struct Ty<'ts> {
    data: &'ts TypeData,
}

impl<'ts> Ty<'ts> {
    pub(crate) fn as_ptr(self) -> NonNull<TypeData> {
        NonNull::from(self.data)
    }

    pub(crate) fn owner(self) -> u64 {
        self.data.owner
    }

    fn rebind(self, ptr: NonNull<TypeData>) -> Ty<'ts> {
        // SAFETY: types only reference types of their own typeset, which
        // `self` keeps borrowed for `'ts`.
        unsafe { ty(ptr) }
    }

    /// The packed kind and info.
    pub fn flags(self) -> TypeFlags {
        self.data.info.into()
    }

    /// The kind and info.
    pub fn info(self) -> TypeInfo {
        self.data.info
    }

    /// The kind.
    pub fn kind(self) -> TypeKind {
        self.data.info.kind()
    }

    /// The registered name, `None` for anonymous types.
    pub fn name(self) -> Option<&'ts str> {
        self.data.name.as_deref()
    }

    /// Alignment in bytes.
    pub fn alignment(self) -> usize {
        self.data.alignment
    }

    /// Size in bytes.
    pub fn size(self) -> usize {
        self.data.size
    }

    /// The embedded parent type of an object type.
    pub fn parent(self) -> Option<Ty<'ts>> {
        self.data.parent.map(|ptr| self.rebind(ptr))
    }

    /// The vtable of a virtual object type, when one was attached.
    pub fn vptr(self) -> Option<VTableRef> {
        self.data.vptr
    }

    /// Returns `true` for [`TypeKind::Object`] types.
    pub fn is_object(self) -> bool {
        self.kind() == TypeKind::Object
    }

    /// Bit width of a sized numeric type.
    pub fn bits(self) -> Option<u16> {
        match self.data.params {
            TypeParams::Bits(bits) => Some(bits),
            _ => None,
        }
    }

    /// The referenced type of a ref, or the element type of a vector.
    pub fn element(self) -> Option<Ty<'ts>> {
        match self.data.params {
            TypeParams::Ref(elem) | TypeParams::Vec(elem, _) => Some(self.rebind(elem)),
            _ => None,
        }
    }

    /// Element count of a vector type.
    pub fn count(self) -> Option<usize> {
        match self.data.params {
            TypeParams::Vec(_, n) => Some(n),
            _ => None,
        }
    }

    /// Number of members.
    pub fn num_members(self) -> usize {
        self.data.members.len()
    }

    /// Number of methods.
    pub fn num_methods(self) -> usize {
        self.data.methods.len()
    }

    /// Members in layout order.
    pub fn members(self) -> impl ExactSizeIterator<Item = Member<'ts>> + 'ts {
        let data: &'ts TypeData = self.data;
        data.members.iter().map(move |member| Member {
            name: &member.name,
            // SAFETY: see `rebind`.
            ty: unsafe { ty(member.ty) },
            offset: member.offset,
        })
    }

    /// Methods in declaration order.
    pub fn methods(self) -> impl ExactSizeIterator<Item = Method<'ts>> + 'ts {
        let data: &'ts TypeData = self.data;
        data.methods.iter().map(|method| Method { data: method })
    }

    /// The member called `name`.
    pub fn member(self, name: &str) -> Option<Member<'ts>> {
        self.members().find(|member| member.name == name)
    }

    /// Visits members in layout order with their index.
    ///
    /// The visitor returns `false` to stop early. Returns the number of
    /// members for which it returned `true`; without a visitor, returns the
    /// member count.
    pub fn visit_members(
        self,
        visitor: Option<&mut dyn FnMut(usize, Member<'ts>) -> bool>,
    ) -> usize {
        let Some(visitor) = visitor else {
            return self.num_members();
        };
        self.members()
            .enumerate()
            .take_while(|&(index, member)| visitor(index, member))
            .count()
    }

    /// Visits methods in declaration order with their index, following the
    /// conventions of [`Ty::visit_members`].
    pub fn visit_methods(
        self,
        visitor: Option<&mut dyn FnMut(usize, Method<'ts>) -> bool>,
    ) -> usize {
        let Some(visitor) = visitor else {
            return self.num_methods();
        };
        self.methods()
            .enumerate()
            .take_while(|&(index, method)| visitor(index, method))
            .count()
    }
}

impl PartialEq for Ty<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.data, other.data)
    }
}

impl Eq for Ty<'_> {}

impl Hash for Ty<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.data, state);
    }
}

impl fmt::Display for Ty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        // Anonymous runtime types print their structure.
        f.write_str("{")?;
        for (index, member) in self.members().enumerate() {
            let sep = if index == 0 { " " } else { ", " };
            write!(f, "{sep}{}: {}", member.name, member.ty)?;
        }
        f.write_str(" }")
    }
}

impl fmt::Debug for Ty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ty")
            .field("name", &self.to_string())
            .field("flags", &self.flags())
            .field("alignment", &self.alignment())
            .field("size", &self.size())
            .finish()
    }
}

/// A data member of an object or runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member<'ts> {
    /// Member name.
    pub name: &'ts str,
    /// Member type.
    pub ty: Ty<'ts>,
    /// Byte offset inside the enclosing type.
    pub offset: usize,
}

/// A named, typed method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'ts> {
    /// Parameter name.
    pub name: &'ts str,
    /// Parameter type.
    pub ty: Ty<'ts>,
}

/// An introspection-only method descriptor.
#[derive(Clone, Copy)]
pub struct Method<'ts> {
    data: &'ts MethodData,
}

impl<'ts> Method<'ts> {
    /// Method name.
    pub fn name(self) -> &'ts str {
        &self.data.name
    }

    /// Number of parameters.
    pub fn num_params(self) -> usize {
        self.data.params.len()
    }

    /// Parameters in declaration order.
    pub fn params(self) -> impl ExactSizeIterator<Item = Param<'ts>> + 'ts {
        let data: &'ts MethodData = self.data;
        data.params.iter().map(|param| Param {
            name: &param.name,
            // SAFETY: parameter types belong to the method's typeset.
            ty: unsafe { ty(param.ty) },
        })
    }
}

impl fmt::Debug for Method<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name())
            .field("params", &self.params().collect::<Vec<_>>())
            .finish()
    }
}
