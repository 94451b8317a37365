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

use super::{Derived, Embedded, Object, ObjectInfo, ObjectType, ObjectVTable, VTableRef};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// The identity of a managed object: the address of its root [`Object`].
///
/// A handle is only a pointer. It stays valid while the instance lives in its
/// manager; dereferencing it is `unsafe`, while the manager's `get`/`view`
/// accessors check membership first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(NonNull<Object>);

impl ObjectHandle {
    /// Wraps a root pointer.
    pub const fn from_root(root: NonNull<Object>) -> Self {
        Self(root)
    }

    /// The handle of any type in the object chain.
    pub fn from_ptr<T: Embedded<Root = Object>>(ptr: NonNull<T>) -> Self {
        Self(T::root_ptr(ptr))
    }

    /// The root pointer.
    pub const fn as_ptr(self) -> NonNull<Object> {
        self.0
    }

    /// The concrete vtable stamped in the instance header.
    ///
    /// # Safety
    ///
    /// The handle must point at a live instance.
    pub unsafe fn vtable(self) -> VTableRef {
        self.0.as_ref().vtable()
    }

    /// The concrete type info of the instance.
    ///
    /// # Safety
    ///
    /// The handle must point at a live instance.
    pub unsafe fn info(self) -> &'static ObjectInfo {
        self.vtable().info()
    }

    /// Returns `true` if the instance's type is `info` or descends from it.
    ///
    /// # Safety
    ///
    /// The handle must point at a live instance.
    pub unsafe fn is_a(self, info: &ObjectInfo) -> bool {
        self.info().is_a(info)
    }

    /// Reinterprets the concrete vtable as the derived vtable layout `V`.
    ///
    /// # Safety
    ///
    /// The handle must point at a live instance whose vtable embeds `V`.
    pub unsafe fn vtable_as<V: Embedded<Root = ObjectVTable>>(self) -> &'static V {
        self.vtable().cast::<V>()
    }

    /// Recovers a typed pointer without any verification.
    ///
    /// # Safety
    ///
    /// The instance must be a `T` or a descendant of `T`.
    pub unsafe fn downcast_unchecked<T: Embedded<Root = Object>>(self) -> NonNull<T> {
        T::from_root_ptr(self.0)
    }

    /// Recovers a typed pointer if the instance's type info descends from `T`'s.
    ///
    /// # Safety
    ///
    /// The handle must point at a live instance.
    pub unsafe fn downcast<T: ObjectType>(self) -> Option<NonNull<T>> {
        self.info()
            .is_a(T::type_info())
            .then(|| self.downcast_unchecked::<T>())
    }
}

impl<T: Embedded<Root = Object>> From<NonNull<T>> for ObjectHandle {
    fn from(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr)
    }
}

/// A checked, borrowed view of a managed instance as an `T`.
///
/// Obtained from a manager; the borrow keeps the manager from deleting the
/// instance while the view is alive. The view keeps a pointer to the whole
/// instance, so it can be narrowed to a descendant with [`ObjectView::downcast`]
/// and handed to dispatch entries that need the concrete type.
pub struct ObjectView<'a, T: ObjectType> {
    ptr: NonNull<T>,
    marker: PhantomData<&'a T>,
}

impl<'a, T: ObjectType> ObjectView<'a, T> {
    /// # Safety
    ///
    /// `ptr` must address a live managed instance whose type info is a `T`,
    /// carry access to the whole instance, and stay shared for `'a`.
    pub(crate) unsafe fn new_unchecked(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            marker: PhantomData,
        }
    }

    /// The viewed value.
    pub fn get(&self) -> &'a T {
        // SAFETY: live and shared for `'a` (`new_unchecked` contract).
        unsafe { &*self.ptr.as_ptr() }
    }

    /// The handle of the viewed instance.
    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle::from_ptr(self.ptr)
    }

    /// The concrete type info of the instance, which may be a descendant of `T`.
    pub fn info(&self) -> &'static ObjectInfo {
        self.get().as_root().vtable().info()
    }

    /// The instance's dispatch table seen through `T`'s vtable layout.
    pub fn vtable(&self) -> &'static T::VTable {
        let vtable = self.get().as_root().vtable();
        // SAFETY: the view was checked to be a `T`, and every `T` carries a
        // vtable embedding `T::VTable` (`ObjectType` contract).
        unsafe { vtable.cast::<T::VTable>() }
    }

    /// One level of super navigation.
    pub fn super_view(&self) -> ObjectView<'a, T::Base>
    where
        T: Derived,
        T::Base: ObjectType,
    {
        ObjectView {
            ptr: T::super_ptr(self.ptr),
            marker: PhantomData,
        }
    }

    /// Narrows the view to `U` if the instance descends from it.
    pub fn downcast<U: ObjectType>(&self) -> Option<ObjectView<'a, U>> {
        self.info().is_a(U::type_info()).then(|| ObjectView {
            ptr: U::from_root_ptr(T::root_ptr(self.ptr)),
            marker: PhantomData,
        })
    }
}

impl<T: ObjectType> Clone for ObjectView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ObjectType> Copy for ObjectView<'_, T> {}

impl<T: ObjectType> Deref for ObjectView<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T: ObjectType> std::fmt::Debug for ObjectView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectView")
            .field("type", &self.info().name)
            .field("handle", &self.handle())
            .finish()
    }
}
