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

//! The canonicalizing type registry.

use crate::types::{
    ty, MemberData, MethodData, NumericInfo, StringEncoding, TheoreticInfo, Ty, TypeData,
    TypeInfo, TypeParams,
};
use crate::error::BuildError;
use crate::Reflect;
use ham_core::memory::AllocatorRef;
use ham_core::store::{Pool, StoreError, StoreSettings};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TYPESET_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Structural identity used for interning.
///
/// Referenced types are keyed by address, which is stable for the lifetime
/// of the typeset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TypeKey {
    Basic(TypeInfo),
    Sized(NumericInfo, u16),
    Ref(usize),
    Vec(usize, usize),
    Composite(CompositeKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CompositeKey {
    pub(crate) info: TypeInfo,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<usize>,
    pub(crate) vptr: Option<usize>,
    pub(crate) members: Vec<(String, usize)>,
    pub(crate) methods: Vec<(String, Vec<(String, usize)>)>,
}

/// A fully laid-out composite type awaiting interning.
pub(crate) struct Staged {
    pub(crate) key: CompositeKey,
    pub(crate) alignment: usize,
    pub(crate) size: usize,
    pub(crate) parent: Option<NonNull<TypeData>>,
    pub(crate) vptr: Option<ham_core::VTableRef>,
    pub(crate) members: Vec<MemberData>,
    pub(crate) methods: Vec<MethodData>,
}

struct Basics {
    void: NonNull<TypeData>,
    unit: NonNull<TypeData>,
    top: NonNull<TypeData>,
    bottom: NonNull<TypeData>,
    any_object: NonNull<TypeData>,
    boolean: NonNull<TypeData>,
}

struct Interner {
    pool: Pool<TypeData>,
    order: Vec<NonNull<TypeData>>,
    by_name: HashMap<String, NonNull<TypeData>>,
    by_key: HashMap<TypeKey, NonNull<TypeData>>,
}

impl Interner {
    fn insert(&mut self, key: TypeKey, data: TypeData) -> Option<NonNull<TypeData>> {
        let name = data.name.clone();
        let ptr = match self.pool.insert(data) {
            Ok(ptr) => ptr,
            Err(data) => {
                log::error!(
                    "Typeset is out of memory while interning '{}'",
                    data.name.as_deref().unwrap_or("<anonymous>")
                );
                return None;
            }
        };
        self.order.push(ptr);
        // The first type interned under a name keeps it.
        if let Some(name) = name {
            match self.by_name.entry(name) {
                Entry::Vacant(entry) => {
                    entry.insert(ptr);
                }
                Entry::Occupied(entry) => log::warn!(
                    "Type name '{}' is already taken; the new type is only reachable structurally",
                    entry.key()
                ),
            }
        }
        self.by_key.insert(key, ptr);
        Some(ptr)
    }
}

/// Owns every type it produces and hands out one canonical [`Ty`] per
/// structurally distinct description.
///
/// Lookups take `&self`; the returned `Ty` borrows the typeset, so every
/// type stays valid for as long as the typeset is alive.
///
/// Type descriptors are stored on the typeset's allocator. The name and
/// structure indexes live on the global heap.
pub struct Typeset {
    id: u64,
    allocator: AllocatorRef,
    basics: Basics,
    interner: RefCell<Interner>,
}

// SAFETY: the raw pointers only address types owned by this typeset's pool,
// which moves along with it.
unsafe impl Send for Typeset {}

impl Typeset {
    /// Creates a typeset on `allocator` with default store settings.
    pub fn new(allocator: AllocatorRef) -> Result<Self, StoreError> {
        Self::with_settings(allocator, StoreSettings::default())
    }

    /// Creates a typeset whose type storage follows `settings`.
    ///
    /// The theoretic singletons, the object placeholder and `bool` are
    /// interned eagerly.
    pub fn with_settings(
        allocator: AllocatorRef,
        settings: StoreSettings,
    ) -> Result<Self, StoreError> {
        let id = NEXT_TYPESET_ID.fetch_add(1, Ordering::Relaxed);
        let mut interner = Interner {
            pool: Pool::new(allocator.clone(), settings)?,
            order: Vec::new(),
            by_name: HashMap::new(),
            by_key: HashMap::new(),
        };

        let mut basic = |info: TypeInfo, name: &str, alignment: usize, size: usize| {
            let params = TypeParams::None;
            let data = TypeData::basic(id, info, name.to_string(), alignment, size, params);
            interner
                .insert(TypeKey::Basic(info), data)
                .ok_or(StoreError::OutOfMemory {
                    bytes: std::mem::size_of::<TypeData>(),
                })
        };

        let basics = Basics {
            void: basic(TypeInfo::Theoretic(TheoreticInfo::Void), "void", 1, 0)?,
            unit: basic(TypeInfo::Theoretic(TheoreticInfo::Unit), "unit", 1, 0)?,
            top: basic(TypeInfo::Theoretic(TheoreticInfo::Top), "top", 1, 0)?,
            bottom: basic(TypeInfo::Theoretic(TheoreticInfo::Bottom), "bottom", 1, 0)?,
            any_object: basic(
                TypeInfo::Theoretic(TheoreticInfo::Object),
                "object",
                POINTER_SIZE,
                POINTER_SIZE,
            )?,
            boolean: basic(TypeInfo::Numeric(NumericInfo::Boolean), "bool", 1, 1)?,
        };

        log::debug!("Created typeset #{id} on '{}' allocator", allocator.name());
        Ok(Self {
            id,
            allocator,
            basics,
            interner: RefCell::new(interner),
        })
    }

    /// The allocator captured at creation.
    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }

    fn wrap(&self, ptr: NonNull<TypeData>) -> Ty<'_> {
        // SAFETY: `ptr` was interned by this typeset, which `&self` keeps
        // alive; interned types are never removed before drop.
        unsafe { ty(ptr) }
    }

    /// Returns `true` if `ty` was produced by this typeset.
    pub fn owns(&self, candidate: Ty<'_>) -> bool {
        candidate.owner() == self.id
    }

    fn check_owned(&self, candidate: Ty<'_>, what: &str) -> bool {
        if self.owns(candidate) {
            return true;
        }
        log::warn!("Rejected {what}: type '{candidate}' belongs to another typeset");
        false
    }

    /// Looks a type up by name.
    ///
    /// A name belongs to the first type interned under it; a parametrized type
    /// created later with the same name is only reachable through its
    /// constructor.
    pub fn get(&self, name: &str) -> Option<Ty<'_>> {
        let ptr = *self.interner.borrow().by_name.get(name)?;
        Some(self.wrap(ptr))
    }

    /// The empty return type.
    pub fn void(&self) -> Ty<'_> {
        self.wrap(self.basics.void)
    }

    /// The single-valued type.
    pub fn unit(&self) -> Ty<'_> {
        self.wrap(self.basics.unit)
    }

    /// The supertype of every type.
    pub fn top(&self) -> Ty<'_> {
        self.wrap(self.basics.top)
    }

    /// The subtype of every type.
    pub fn bottom(&self) -> Ty<'_> {
        self.wrap(self.basics.bottom)
    }

    /// The placeholder for any object.
    pub fn any_object(&self) -> Ty<'_> {
        self.wrap(self.basics.any_object)
    }

    /// `bool`.
    pub fn bool(&self) -> Ty<'_> {
        self.wrap(self.basics.boolean)
    }

    /// The canonical reference to `referent`.
    pub fn reference<'ts>(&'ts self, referent: Ty<'_>) -> Option<Ty<'ts>> {
        if !self.check_owned(referent, "reference") {
            return None;
        }
        let key = TypeKey::Ref(referent.as_ptr().as_ptr() as usize);
        self.intern(key, || {
            TypeData::basic(
                self.id,
                TypeInfo::Theoretic(TheoreticInfo::Ref),
                format!("ref<{referent}>"),
                POINTER_SIZE,
                POINTER_SIZE,
                TypeParams::Ref(referent.as_ptr()),
            )
        })
    }

    /// An already registered object type. Never creates one.
    pub fn object(&self, name: &str) -> Option<Ty<'_>> {
        self.get(name).filter(|ty| ty.is_object())
    }

    /// The canonical unsigned integer of `bits` bits (8 to 128, power of two).
    pub fn nat(&self, bits: usize) -> Option<Ty<'_>> {
        self.sized(NumericInfo::Natural, bits)
    }

    /// The canonical signed integer of `bits` bits (8 to 128, power of two).
    pub fn int(&self, bits: usize) -> Option<Ty<'_>> {
        self.sized(NumericInfo::Integer, bits)
    }

    /// The canonical rational of `bits` bits (8 to 256, power of two).
    pub fn rat(&self, bits: usize) -> Option<Ty<'_>> {
        self.sized(NumericInfo::Rational, bits)
    }

    /// The canonical float of `bits` bits (16, 32, 64 or 128).
    pub fn float(&self, bits: usize) -> Option<Ty<'_>> {
        self.sized(NumericInfo::FloatingPoint, bits)
    }

    /// The canonical string type of `encoding`.
    pub fn str(&self, encoding: StringEncoding) -> Option<Ty<'_>> {
        let info = TypeInfo::String(encoding);
        // A string is a (pointer, length) pair.
        self.intern(TypeKey::Basic(info), || {
            TypeData::basic(
                self.id,
                info,
                format!("str-{}", encoding.suffix()),
                POINTER_SIZE,
                2 * POINTER_SIZE,
                TypeParams::None,
            )
        })
    }

    /// The canonical vector of `n` elements of `elem`.
    pub fn vec<'ts>(&'ts self, elem: Ty<'_>, n: usize) -> Option<Ty<'ts>> {
        if !self.check_owned(elem, "vector element") {
            return None;
        }
        if n == 0 {
            log::warn!("Rejected zero-length vector of '{elem}'");
            return None;
        }
        if matches!(
            elem.info(),
            TypeInfo::Theoretic(TheoreticInfo::Void | TheoreticInfo::Top | TheoreticInfo::Bottom)
        ) {
            log::warn!("Rejected vector of uninhabitable element '{elem}'");
            return None;
        }
        let Some(size) = elem.size().checked_mul(n) else {
            log::warn!("Vector of {n} '{elem}' overflows");
            return None;
        };

        let key = TypeKey::Vec(elem.as_ptr().as_ptr() as usize, n);
        self.intern(key, || {
            TypeData::basic(
                self.id,
                TypeInfo::Numeric(NumericInfo::Vector),
                format!("vec<{elem}, {n}>"),
                elem.alignment(),
                size,
                TypeParams::Vec(elem.as_ptr(), n),
            )
        })
    }

    /// The type describing the Rust type `T`.
    pub fn type_of<T: Reflect + ?Sized>(&self) -> Option<Ty<'_>> {
        T::reflect(self)
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.interner.borrow().order.len()
    }

    /// Always `false`: the basic types are interned at creation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every interned type, in interning order.
    pub fn iter(&self) -> impl Iterator<Item = Ty<'_>> + '_ {
        let order = self.interner.borrow().order.clone();
        order.into_iter().map(move |ptr| self.wrap(ptr))
    }

    fn sized(&self, info: NumericInfo, bits: usize) -> Option<Ty<'_>> {
        let Some((prefix, alignment, size)) = sized_layout(info, bits) else {
            log::warn!("Rejected {info:?} type of {bits} bits");
            return None;
        };
        // Validated above: `bits` fits in 9 bits.
        let bits = bits as u16;
        self.intern(TypeKey::Sized(info, bits), || {
            TypeData::basic(
                self.id,
                TypeInfo::Numeric(info),
                format!("{prefix}{bits}"),
                alignment,
                size,
                TypeParams::Bits(bits),
            )
        })
    }

    fn intern(&self, key: TypeKey, make: impl FnOnce() -> TypeData) -> Option<Ty<'_>> {
        let mut interner = self.interner.borrow_mut();
        if let Some(&ptr) = interner.by_key.get(&key) {
            return Some(self.wrap(ptr));
        }
        let ptr = interner.insert(key, make())?;
        log::trace!("Typeset #{} interned '{}'", self.id, self.wrap(ptr));
        Some(self.wrap(ptr))
    }

    /// Interns a composite type from a builder, or returns the canonical type
    /// with identical structure. A different structure under a taken name is
    /// rejected.
    pub(crate) fn intern_composite(&self, staged: Staged) -> Result<Ty<'_>, BuildError> {
        let key = TypeKey::Composite(staged.key.clone());
        let mut interner = self.interner.borrow_mut();

        if let Some(&ptr) = interner.by_key.get(&key) {
            return Ok(self.wrap(ptr));
        }
        if let Some(name) = &staged.key.name {
            if interner.by_name.contains_key(name) {
                return Err(BuildError::NameConflict { name: name.clone() });
            }
        }

        let data = TypeData {
            owner: self.id,
            info: staged.key.info,
            name: staged.key.name,
            alignment: staged.alignment,
            size: staged.size,
            params: TypeParams::None,
            parent: staged.parent,
            vptr: staged.vptr,
            members: staged.members,
            methods: staged.methods,
        };
        let ptr = interner.insert(key, data).ok_or(BuildError::OutOfMemory)?;
        log::debug!("Typeset #{} interned composite '{}'", self.id, self.wrap(ptr));
        Ok(self.wrap(ptr))
    }
}

impl std::fmt::Debug for Typeset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeset")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Name prefix, alignment and size of a sized numeric type.
fn sized_layout(info: NumericInfo, bits: usize) -> Option<(&'static str, usize, usize)> {
    if !bits.is_power_of_two() {
        return None;
    }
    let size = bits / 8;
    match info {
        NumericInfo::Natural if (8..=128).contains(&bits) => Some(("nat", size.min(16), size)),
        NumericInfo::Integer if (8..=128).contains(&bits) => Some(("int", size.min(16), size)),
        // Numerator and denominator each take half the width.
        NumericInfo::Rational if (8..=256).contains(&bits) => {
            Some(("rat", (size / 2).clamp(1, 16), size))
        }
        NumericInfo::FloatingPoint if (16..=128).contains(&bits) => {
            Some(("float", size.min(16), size))
        }
        _ => None,
    }
}
