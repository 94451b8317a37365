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

//! The object model: embedding-based inheritance with explicit dispatch tables.
//!
//! A concrete object type is a `#[repr(C)]` struct whose first field is its
//! parent type, repeated per ancestor down to the root [`Object`] header. Its
//! vtable follows the same rule: a `#[repr(C)]` struct whose first field is
//! the parent vtable, bottoming out at [`ObjectVTable`] with its three root
//! slots (info accessor, constructor, destructor).
//!
//! Because every parent sits at a fixed offset of its child, navigating from a
//! derived pointer to a base pointer ("super navigation") is plain address
//! arithmetic. The [`Derived`] and [`Embedded`] traits expose those offsets at
//! compile time; `#[derive(Derived)]` implements both for a struct.
//!
//! ```rust
//! use ham_core::object::{Derived, Embedded, Object};
//!
//! #[repr(C)]
//! #[derive(Derived)]
//! struct Shape {
//!     base: Object,
//!     sides: u32,
//! }
//!
//! #[repr(C)]
//! #[derive(Derived)]
//! struct Square {
//!     base: Shape,
//!     width: f32,
//! }
//!
//! assert_eq!(<Square as Embedded>::DEPTH, 2);
//! assert_eq!(<Square as Derived>::BASE_OFFSET, 0);
//! ```

mod args;
mod error;
mod handle;

pub use args::{Arg, ArgKind, Args};
pub use error::{ArgError, ConstructError, ObjectError};
pub use handle::{ObjectHandle, ObjectView};
pub use ham_macros::Derived;

use std::ops::Deref;
use std::ptr::NonNull;

/// Static description of a concrete object type.
#[derive(Debug)]
pub struct ObjectInfo {
    /// Type identifier, unique among the types registered together.
    pub name: &'static str,
    /// Alignment of the concrete instance, in bytes.
    pub alignment: usize,
    /// Size of the concrete instance, in bytes.
    pub size: usize,
    /// Info of the embedded parent type. `None` for types embedding [`Object`] directly.
    pub parent: Option<&'static ObjectInfo>,
    /// Constructor signature checked before any slot is reserved.
    /// `None` leaves argument validation to the constructor.
    pub params: Option<&'static [ArgKind]>,
}

impl ObjectInfo {
    /// Describes `T` under the given name.
    pub const fn of<T>(name: &'static str) -> Self {
        Self {
            name,
            alignment: std::mem::align_of::<T>(),
            size: std::mem::size_of::<T>(),
            parent: None,
            params: None,
        }
    }

    /// Sets the parent type info.
    pub const fn with_parent(mut self, parent: &'static ObjectInfo) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the constructor signature.
    pub const fn with_params(mut self, params: &'static [ArgKind]) -> Self {
        self.params = Some(params);
        self
    }

    /// Iterates over this info followed by its ancestors, most derived first.
    pub fn lineage(&self) -> impl Iterator<Item = &ObjectInfo> {
        std::iter::successors(Some(self), |info| info.parent)
    }

    /// Number of embedding levels below the root [`Object`].
    pub fn depth(&self) -> usize {
        self.lineage().count()
    }

    /// Returns `true` if `self` is `other` or embeds it somewhere in its chain.
    ///
    /// Every type is an [`Object`].
    pub fn is_a(&self, other: &ObjectInfo) -> bool {
        std::ptr::eq(other, &OBJECT_INFO) || self.lineage().any(|info| std::ptr::eq(info, other))
    }

    /// Checks the invariants a manager relies on.
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !self.alignment.is_power_of_two() {
            return Err("alignment is not a power of two");
        }
        if self.alignment < std::mem::align_of::<Object>() {
            return Err("alignment is smaller than the object header's");
        }
        if self.size < std::mem::size_of::<Object>() {
            return Err("size is smaller than the object header");
        }
        Ok(())
    }
}

/// Returns the info of a vtable.
pub type InfoFn = fn() -> &'static ObjectInfo;

/// Constructs an instance in place.
///
/// Receives the root of an uninitialised slot whose vtable field is already
/// set. On success returns the address of the root sub-object.
pub type CtorFn =
    unsafe fn(NonNull<Object>, &Args<'_>) -> Result<NonNull<Object>, ConstructError>;

/// Destroys an instance in place. Never fails.
pub type DtorFn = unsafe fn(NonNull<Object>);

/// The root dispatch table every vtable embeds first.
///
/// The entries run on whichever thread owns the instance's manager, so a
/// hand-written constructor may only produce `Send` instances.
#[repr(C)]
pub struct ObjectVTable {
    /// Info accessor.
    pub info: InfoFn,
    /// Constructor.
    pub ctor: CtorFn,
    /// Destructor.
    pub dtor: DtorFn,
}

impl ObjectVTable {
    /// Builds the root slots for `T`, constructing through [`Construct`] and
    /// destroying by dropping `T` in place.
    pub const fn of<T: Construct>(info: InfoFn) -> Self {
        Self {
            info,
            ctor: construct_in_place::<T>,
            dtor: destroy_in_place::<T>,
        }
    }

    /// Calls the info accessor.
    pub fn info(&self) -> &'static ObjectInfo {
        (self.info)()
    }
}

impl std::fmt::Debug for ObjectVTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectVTable")
            .field("type", &self.info().name)
            .finish_non_exhaustive()
    }
}

/// A pointer to a concrete vtable, seen through its root [`ObjectVTable`].
///
/// Created from the whole derived vtable, so it can be widened back to any
/// layout that vtable embeds. Headers and managers store this instead of a
/// root reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VTableRef(NonNull<ObjectVTable>);

// SAFETY: vtables are immutable `'static` tables of `Sync` entries.
unsafe impl Send for VTableRef {}
// SAFETY: see above.
unsafe impl Sync for VTableRef {}

impl VTableRef {
    /// Points at `vtable` through its root slots.
    pub fn of<V: Embedded<Root = ObjectVTable> + Sync>(vtable: &'static V) -> Self {
        Self(V::root_ptr(NonNull::from(vtable)))
    }

    /// Wraps a raw root pointer. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point at a vtable living for the rest of the
    /// program, and must be valid for every layout it is later widened to.
    pub unsafe fn from_raw(ptr: *const ObjectVTable) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// The root pointer.
    pub const fn as_ptr(self) -> NonNull<ObjectVTable> {
        self.0
    }

    /// Address of the vtable, usable as an identity key.
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// The root slots.
    pub fn get(self) -> &'static ObjectVTable {
        // SAFETY: built from a `'static` vtable (or under `from_raw`'s contract).
        unsafe { &*self.0.as_ptr() }
    }

    /// Widens to the derived vtable layout `V`.
    ///
    /// # Safety
    ///
    /// The concrete vtable must embed `V`.
    pub unsafe fn cast<V: Embedded<Root = ObjectVTable>>(self) -> &'static V {
        &*V::from_root_ptr(self.0).as_ptr()
    }
}

impl Deref for VTableRef {
    type Target = ObjectVTable;

    fn deref(&self) -> &ObjectVTable {
        self.get()
    }
}

impl std::fmt::Debug for VTableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VTableRef")
            .field(&self.info().name)
            .field(&self.0)
            .finish()
    }
}

unsafe fn construct_in_place<T: Construct>(
    root: NonNull<Object>,
    args: &Args<'_>,
) -> Result<NonNull<Object>, ConstructError> {
    let value = T::construct(args)?;
    let ptr = T::from_root_ptr(root);
    ptr.as_ptr().write(value);
    Ok(T::root_ptr(ptr))
}

unsafe fn destroy_in_place<T: Embedded<Root = Object>>(root: NonNull<Object>) {
    std::ptr::drop_in_place(T::from_root_ptr(root).as_ptr());
}

/// The root header of every object instance: its single vtable pointer.
#[repr(C)]
#[derive(Debug)]
pub struct Object {
    vtable: VTableRef,
}

/// Info of the root [`Object`] type.
pub static OBJECT_INFO: ObjectInfo = ObjectInfo::of::<Object>("object");

static UNBOUND_VTABLE: ObjectVTable = ObjectVTable {
    info: object_info,
    ctor: unbound_ctor,
    dtor: unbound_dtor,
};

fn object_info() -> &'static ObjectInfo {
    &OBJECT_INFO
}

unsafe fn unbound_ctor(
    _root: NonNull<Object>,
    _args: &Args<'_>,
) -> Result<NonNull<Object>, ConstructError> {
    Err(ConstructError::Failed(
        "the root object type cannot be instantiated".to_string(),
    ))
}

unsafe fn unbound_dtor(_root: NonNull<Object>) {}

impl Object {
    /// A header not yet bound to a concrete type. Managers stamp the real
    /// vtable once construction succeeds.
    pub fn new() -> Self {
        Self {
            vtable: VTableRef::of(&UNBOUND_VTABLE),
        }
    }

    /// The vtable of the concrete type this header belongs to.
    pub fn vtable(&self) -> VTableRef {
        self.vtable
    }

    /// Returns `true` once a manager has stamped a concrete vtable.
    pub fn is_bound(&self) -> bool {
        self.vtable != VTableRef::of(&UNBOUND_VTABLE)
    }

    pub(crate) fn bind(&mut self, vtable: VTableRef) {
        self.vtable = vtable;
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

/// A type that belongs to an embedding chain.
///
/// Implemented by [`Object`] and [`ObjectVTable`] (the two roots) and, through
/// `#[derive(Derived)]`, by every struct embedding one of them.
///
/// # Safety
///
/// `root_ptr`/`from_root_ptr` must be exact inverses computing the address of
/// the embedded root sub-object, and `DEPTH` must be the number of embedding
/// levels above the root.
pub unsafe trait Embedded: Sized + 'static {
    /// The root type of the chain.
    type Root: 'static;
    /// Number of embedding levels above the root.
    const DEPTH: usize;

    /// Borrows the root sub-object.
    fn as_root(&self) -> &Self::Root;
    /// Mutably borrows the root sub-object.
    fn as_root_mut(&mut self) -> &mut Self::Root;
    /// Address of the root sub-object.
    fn root_ptr(ptr: NonNull<Self>) -> NonNull<Self::Root>;
    /// Address of the enclosing `Self` given its root sub-object. Unchecked.
    fn from_root_ptr(root: NonNull<Self::Root>) -> NonNull<Self>;
}

/// A type embedding a parent type as its first field.
///
/// # Safety
///
/// `BASE_OFFSET` must be the offset of the embedded base inside `Self`, and
/// `base`/`base_mut` must return that field.
pub unsafe trait Derived: Embedded {
    /// The embedded parent type.
    type Base: Embedded<Root = Self::Root>;
    /// Byte offset of the base inside `Self`.
    const BASE_OFFSET: usize;

    /// Borrows the embedded base.
    fn base(&self) -> &Self::Base;
    /// Mutably borrows the embedded base.
    fn base_mut(&mut self) -> &mut Self::Base;

    /// One level of super navigation.
    fn super_ptr(ptr: NonNull<Self>) -> NonNull<Self::Base> {
        // SAFETY: offsetting a non-null object address by a field offset
        // yields the (non-null) address of that field.
        unsafe {
            NonNull::new_unchecked(
                ptr.as_ptr()
                    .cast::<u8>()
                    .wrapping_add(Self::BASE_OFFSET)
                    .cast(),
            )
        }
    }

    /// Inverse of [`Derived::super_ptr`]. Performs no verification.
    fn from_base_ptr(base: NonNull<Self::Base>) -> NonNull<Self> {
        // SAFETY: see `super_ptr`.
        unsafe {
            NonNull::new_unchecked(
                base.as_ptr()
                    .cast::<u8>()
                    .wrapping_sub(Self::BASE_OFFSET)
                    .cast(),
            )
        }
    }
}

unsafe impl Embedded for Object {
    type Root = Object;
    const DEPTH: usize = 0;

    fn as_root(&self) -> &Object {
        self
    }

    fn as_root_mut(&mut self) -> &mut Object {
        self
    }

    fn root_ptr(ptr: NonNull<Self>) -> NonNull<Object> {
        ptr
    }

    fn from_root_ptr(root: NonNull<Object>) -> NonNull<Self> {
        root
    }
}

unsafe impl Embedded for ObjectVTable {
    type Root = ObjectVTable;
    const DEPTH: usize = 0;

    fn as_root(&self) -> &ObjectVTable {
        self
    }

    fn as_root_mut(&mut self) -> &mut ObjectVTable {
        self
    }

    fn root_ptr(ptr: NonNull<Self>) -> NonNull<ObjectVTable> {
        ptr
    }

    fn from_root_ptr(root: NonNull<ObjectVTable>) -> NonNull<Self> {
        root
    }
}

/// An object type with a known dispatch table layout and type info.
///
/// Abstract bases implement this so instances of their concrete descendants
/// can be viewed through them.
///
/// # Safety
///
/// Every concrete type whose info `is_a` [`ObjectType::type_info`] must have a
/// vtable that embeds `Self::VTable`.
pub unsafe trait ObjectType: Embedded<Root = Object> {
    /// The vtable layout shared by this type and its descendants.
    type VTable: Embedded<Root = ObjectVTable> + Sync;

    /// The info of this type.
    fn type_info() -> &'static ObjectInfo;
}

unsafe impl ObjectType for Object {
    type VTable = ObjectVTable;

    fn type_info() -> &'static ObjectInfo {
        &OBJECT_INFO
    }
}

/// Builds an instance by value. Derived types chain to their base's
/// constructor to produce the embedded parent.
///
/// Instances are owned by a manager that may move between threads, so they
/// must be `Send`:
///
/// ```compile_fail
/// use ham_core::object::{Args, Construct, ConstructError, Derived, Object};
/// use std::rc::Rc;
///
/// #[repr(C)]
/// #[derive(Derived)]
/// struct Shared {
///     base: Object,
///     count: Rc<u32>,
/// }
///
/// impl Construct for Shared {
///     fn construct(_args: &Args<'_>) -> Result<Self, ConstructError> {
///         Ok(Shared {
///             base: Object::new(),
///             count: Rc::new(0),
///         })
///     }
/// }
/// ```
pub trait Construct: Embedded<Root = Object> + Send {
    /// Produces a fully initialised value from the constructor arguments.
    fn construct(args: &Args<'_>) -> Result<Self, ConstructError>;
}

impl Construct for Object {
    fn construct(_args: &Args<'_>) -> Result<Self, ConstructError> {
        Ok(Object::new())
    }
}

/// A concrete, instantiable object type with a static vtable.
///
/// # Safety
///
/// `class_vtable` must describe `Self`: its info must report `Self`'s size and
/// alignment, and its constructor must initialise a `Self`.
pub unsafe trait Class: ObjectType + Construct {
    /// The concrete vtable.
    fn class_vtable() -> &'static Self::VTable;

    /// The concrete vtable, as handed to an object manager.
    fn vtable() -> VTableRef {
        VTableRef::of(Self::class_vtable())
    }
}
