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

//! The object manager: sole factory, owner and destroyer of the instances of
//! one concrete object type.

use crate::memory::AllocatorRef;
use crate::object::{
    Args, Class, ConstructError, Object, ObjectError, ObjectHandle, ObjectInfo, ObjectType,
    ObjectVTable, ObjectView, VTableRef,
};
use crate::store::{SlotStore, StoreSettings};
use std::ptr::NonNull;

/// Owns every live instance of one concrete object type.
///
/// Instances live in a pointer-stable [`SlotStore`] laid out from the type's
/// info, so an [`ObjectHandle`] stays valid until the instance is deleted or
/// the manager is destroyed. Dropping the manager destructs every live
/// instance.
///
/// A manager is `Send`: every [`Construct`](crate::object::Construct) type is
/// `Send`, so its instances may be destructed on another thread.
pub struct ObjectManager {
    vtable: VTableRef,
    info: &'static ObjectInfo,
    store: SlotStore,
}

impl ObjectManager {
    /// Creates a manager for the type described by `vtable`.
    pub fn new(vtable: VTableRef, allocator: AllocatorRef) -> Result<Self, ObjectError> {
        Self::with_settings(vtable, allocator, StoreSettings::default())
    }

    /// Creates a manager with an explicit slot store policy.
    pub fn with_settings(
        vtable: VTableRef,
        allocator: AllocatorRef,
        settings: StoreSettings,
    ) -> Result<Self, ObjectError> {
        let info = vtable.info();
        if let Err(reason) = info.validate() {
            log::error!("Refusing to manage '{}': {reason}", info.name);
            return Err(ObjectError::InvalidInfo {
                name: info.name,
                reason,
            });
        }

        let store = SlotStore::with_settings(allocator, info.alignment, info.size, settings)
            .map_err(|err| {
                log::error!("Failed to create the slot store for '{}': {err}", info.name);
                ObjectError::StoreCreation(err)
            })?;

        log::debug!(
            "Created object manager for '{}' (align {}, size {})",
            info.name,
            info.alignment,
            info.size
        );
        Ok(Self {
            vtable,
            info,
            store,
        })
    }

    /// Creates a manager for the concrete class `T`.
    pub fn for_class<T: Class>(allocator: AllocatorRef) -> Result<Self, ObjectError> {
        Self::new(T::vtable(), allocator)
    }

    /// Creates a manager from a raw vtable pointer, rejecting null.
    ///
    /// # Safety
    ///
    /// A non-null `vtable` must satisfy [`VTableRef::from_raw`].
    pub unsafe fn from_raw_vtable(
        vtable: *const ObjectVTable,
        allocator: AllocatorRef,
        settings: StoreSettings,
    ) -> Result<Self, ObjectError> {
        match VTableRef::from_raw(vtable) {
            Some(vtable) => Self::with_settings(vtable, allocator, settings),
            None => {
                log::error!("Object manager created with a null vtable");
                Err(ObjectError::NullVTable)
            }
        }
    }

    /// The vtable stamped into every instance.
    pub fn vtable(&self) -> VTableRef {
        self.vtable
    }

    /// The info of the managed type.
    pub fn info(&self) -> &'static ObjectInfo {
        self.info
    }

    /// Constructs a new instance from `args`.
    ///
    /// Arguments are checked against the type's signature before any slot is
    /// reserved. On constructor failure the slot is released and the live
    /// count is unchanged.
    pub fn new_object(&mut self, args: Args<'_>) -> Result<ObjectHandle, ObjectError> {
        self.new_object_with(|_| true, args)
    }

    /// Constructs a new instance, running `init` over the reserved slot first.
    ///
    /// `init` receives the root of the slot: its header is bound to the
    /// concrete vtable, the rest is uninitialised. Returning `false` aborts the
    /// creation and releases the slot.
    pub fn new_object_with<F>(
        &mut self,
        init: F,
        args: Args<'_>,
    ) -> Result<ObjectHandle, ObjectError>
    where
        F: FnOnce(NonNull<Object>) -> bool,
    {
        let name = self.info.name;

        if let Some(signature) = self.info.params {
            if let Err(err) = args.check(signature) {
                log::warn!("Bad arguments for a new '{name}': {err}");
                return Err(ObjectError::BadArguments(err));
            }
        }

        let Some(slot) = self.store.emplace() else {
            log::error!("Object store for '{name}' is exhausted");
            return Err(ObjectError::StoreExhausted { name });
        };
        let root = slot.cast::<Object>();

        // The initialiser and constructor see the concrete vtable while they run.
        let mut header = Object::new();
        header.bind(self.vtable);
        // SAFETY: the slot is sized and aligned for the concrete type, which
        // starts with an `Object` header.
        unsafe { root.as_ptr().write(header) };

        if !init(root) {
            log::warn!("Initialisation of a new '{name}' failed");
            self.store.erase(slot);
            return Err(ObjectError::InitFailed { name });
        }

        // SAFETY: the slot holds a bound header and enough room for the type.
        let built = match unsafe { (self.vtable.ctor)(root, &args) } {
            Ok(built) => built,
            Err(err) => {
                log::warn!("Constructor of '{name}' failed: {err}");
                self.store.erase(slot);
                return Err(ObjectError::ConstructionFailed { name, source: err });
            }
        };

        if built != root {
            log::error!("Constructor of '{name}' returned a foreign root address");
            // SAFETY: the constructor reported success, so the slot is initialised.
            unsafe { (self.vtable.dtor)(root) };
            self.store.erase(slot);
            return Err(ObjectError::ConstructionFailed {
                name,
                source: ConstructError::Failed(
                    "constructor returned a foreign root address".to_string(),
                ),
            });
        }

        // SAFETY: construction succeeded, the instance is initialised.
        unsafe { (*root.as_ptr()).bind(self.vtable) };

        log::trace!("Created '{name}' instance at {:p}", root.as_ptr());
        Ok(ObjectHandle::from_root(root))
    }

    /// Destructs the instance and releases its slot.
    ///
    /// Returns `false` if `handle` is not a live instance of this manager.
    pub fn delete_object(&mut self, handle: ObjectHandle) -> bool {
        let Some(slot) = self.store.resolve(handle.as_ptr().as_ptr().cast()) else {
            log::debug!("'{}' manager does not own {handle:?}", self.info.name);
            return false;
        };
        // SAFETY: membership guarantees a live, constructed instance.
        unsafe { (self.vtable.dtor)(slot.cast()) };
        self.store.erase(slot)
    }

    /// Returns `true` if `handle` is a live instance of this manager.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.store.contains(handle.as_ptr().as_ptr().cast())
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if no instance is alive.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Visits live instances in storage order.
    ///
    /// The visitor returns `false` to stop early. Returns the number of
    /// instances for which it returned `true`; without a visitor, returns the
    /// live count.
    pub fn iterate(&self, visitor: Option<&mut dyn FnMut(ObjectHandle) -> bool>) -> usize {
        match visitor {
            Some(visitor) => self.store.iterate(Some(&mut |slot: NonNull<u8>| {
                visitor(ObjectHandle::from_root(slot.cast()))
            })),
            None => self.store.iterate(None),
        }
    }

    /// Iterates over the handles of live instances in storage order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.store
            .iter()
            .map(|slot| ObjectHandle::from_root(slot.cast()))
    }

    /// Borrows a live instance as a `T`, if it is one.
    pub fn get<T: ObjectType>(&self, handle: ObjectHandle) -> Option<&T> {
        // SAFETY: checked live and of a type embedding `T` at its root.
        self.locate::<T>(handle).map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Mutably borrows a live instance as a `T`, if it is one.
    pub fn get_mut<T: ObjectType>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        // SAFETY: as in `get`; the `&mut self` borrow makes it exclusive.
        self.locate::<T>(handle).map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// A checked view of a live instance as a `T`.
    pub fn view<T: ObjectType>(&self, handle: ObjectHandle) -> Option<ObjectView<'_, T>> {
        // SAFETY: `locate` verified membership and ancestry, and the pointer
        // comes from the store, covering the whole instance.
        self.locate::<T>(handle).map(|ptr| unsafe { ObjectView::new_unchecked(ptr) })
    }

    /// Destroys the manager, destructing every live instance.
    ///
    /// Returns the number of instances destructed.
    pub fn destroy(mut self) -> usize {
        self.destroy_all()
    }

    /// The store's own pointer to a live instance, if it is a `T`.
    fn locate<T: ObjectType>(&self, handle: ObjectHandle) -> Option<NonNull<T>> {
        if !self.info.is_a(T::type_info()) {
            return None;
        }
        let slot = self.store.resolve(handle.as_ptr().as_ptr().cast())?;
        Some(T::from_root_ptr(slot.cast()))
    }

    fn destroy_all(&mut self) -> usize {
        let live: Vec<NonNull<u8>> = self.store.iter().collect();
        for &slot in &live {
            // SAFETY: every occupied slot holds a constructed instance,
            // destructed once before its slot is released.
            unsafe { (self.vtable.dtor)(slot.cast()) };
            self.store.erase(slot);
        }
        if !live.is_empty() {
            log::debug!(
                "Destructed {} live '{}' instance(s)",
                live.len(),
                self.info.name
            );
        }
        live.len()
    }
}

impl Drop for ObjectManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl std::fmt::Debug for ObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectManager")
            .field("type", &self.info.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::system_allocator;
    use crate::object::{ArgKind, Construct, Derived};
    use std::cell::Cell;

    thread_local! {
        static DROPS: Cell<usize> = const { Cell::new(0) };
    }

    #[repr(C)]
    #[derive(Derived)]
    struct Counter {
        base: Object,
        value: i64,
    }

    static COUNTER_INFO: ObjectInfo =
        ObjectInfo::of::<Counter>("counter").with_params(&[ArgKind::Int]);
    static COUNTER_VTABLE: ObjectVTable = ObjectVTable::of::<Counter>(counter_info);

    fn counter_info() -> &'static ObjectInfo {
        &COUNTER_INFO
    }

    impl Construct for Counter {
        fn construct(args: &Args<'_>) -> Result<Self, ConstructError> {
            let value = args.int(0)?;
            if value < 0 {
                return Err(ConstructError::Failed("negative start".to_string()));
            }
            Ok(Counter {
                base: Object::new(),
                value,
            })
        }
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            DROPS.with(|drops| drops.set(drops.get() + 1));
        }
    }

    unsafe impl ObjectType for Counter {
        type VTable = ObjectVTable;

        fn type_info() -> &'static ObjectInfo {
            &COUNTER_INFO
        }
    }

    unsafe impl Class for Counter {
        fn class_vtable() -> &'static ObjectVTable {
            &COUNTER_VTABLE
        }
    }

    fn drops() -> usize {
        DROPS.with(Cell::get)
    }

    #[test]
    fn test_new_object_stamps_vtable() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let handle = manager.new_object(crate::args![5]).unwrap();

        assert!(manager.contains(handle));
        assert_eq!(unsafe { handle.vtable() }, VTableRef::of(&COUNTER_VTABLE));
        assert!(unsafe { handle.as_ptr().as_ref() }.is_bound());
        assert_eq!(manager.get::<Counter>(handle).map(|c| c.value), Some(5));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_failing_constructor_leaves_count_unchanged() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        manager.new_object(crate::args![1]).unwrap();

        let err = manager.new_object(crate::args![-1]).unwrap_err();
        assert!(matches!(
            err,
            ObjectError::ConstructionFailed {
                name: "counter",
                source: ConstructError::Failed(_)
            }
        ));
        assert_eq!(manager.iterate(None), 1);
    }

    #[test]
    fn test_bad_arguments_are_rejected_before_reserving() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let err = manager.new_object(crate::args!["five"]).unwrap_err();
        assert!(matches!(err, ObjectError::BadArguments(_)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_delete_object_runs_destructor_once() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let handle = manager.new_object(crate::args![2]).unwrap();
        let before = drops();

        assert!(manager.delete_object(handle));
        assert_eq!(drops(), before + 1);
        assert!(!manager.contains(handle));
        assert!(!manager.delete_object(handle));
        assert_eq!(drops(), before + 1);
    }

    #[test]
    fn test_get_mut_and_view() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let handle = manager.new_object(crate::args![3]).unwrap();

        manager.get_mut::<Counter>(handle).unwrap().value += 1;
        let view = manager.view::<Counter>(handle).unwrap();
        assert_eq!(view.value, 4);
        assert_eq!(view.info().name, "counter");
        assert_eq!(view.handle(), handle);
        assert!(manager.view::<Object>(handle).is_some());
    }

    #[test]
    fn test_init_runs_on_reserved_slot_before_constructor() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let mut seen = None;
        let handle = manager
            .new_object_with(
                |root| {
                    // The header is already bound while the rest is uninitialised.
                    seen = Some((root, unsafe { root.as_ref() }.vtable()));
                    true
                },
                crate::args![9],
            )
            .unwrap();

        assert_eq!(seen, Some((handle.as_ptr(), manager.vtable())));
        assert_eq!(manager.get::<Counter>(handle).map(|c| c.value), Some(9));
    }

    #[test]
    fn test_failing_init_releases_the_slot() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let kept = manager.new_object(crate::args![1]).unwrap();
        let before = drops();

        let mut rejected = None;
        let err = manager
            .new_object_with(
                |root| {
                    rejected = Some(root);
                    false
                },
                crate::args![2],
            )
            .unwrap_err();

        assert_eq!(err, ObjectError::InitFailed { name: "counter" });
        assert_eq!(manager.len(), 1);
        assert_eq!(drops(), before, "no instance was constructed");
        let reused = manager.new_object(crate::args![3]).unwrap();
        assert_eq!(Some(reused.as_ptr()), rejected, "the released slot is reused");
        assert!(manager.contains(kept));
    }

    #[test]
    fn test_foreign_pointer_to_a_live_instance_is_resolved() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        let handle = manager.new_object(crate::args![4]).unwrap();

        // A handle rebuilt from a borrowed header still reaches the whole instance.
        let header = manager.get::<Object>(handle).unwrap();
        let rebuilt = ObjectHandle::from_ptr(NonNull::from(header));
        assert_eq!(rebuilt, handle);
        assert_eq!(manager.get::<Counter>(rebuilt).map(|c| c.value), Some(4));
        assert!(manager.delete_object(rebuilt));
    }

    #[test]
    fn test_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ObjectManager>();
        assert_send::<VTableRef>();
    }

    #[test]
    fn test_destroy_counts_live_instances() {
        let mut manager = ObjectManager::for_class::<Counter>(system_allocator()).unwrap();
        for i in 0..4 {
            manager.new_object(crate::args![i]).unwrap();
        }
        let before = drops();
        assert_eq!(manager.destroy(), 4);
        assert_eq!(drops(), before + 4);
    }

    #[test]
    fn test_null_vtable_is_rejected() {
        let result = unsafe {
            ObjectManager::from_raw_vtable(
                std::ptr::null(),
                system_allocator(),
                StoreSettings::default(),
            )
        };
        assert_eq!(result.unwrap_err(), ObjectError::NullVTable);
    }

    #[test]
    fn test_invalid_info_is_rejected() {
        static TINY_INFO: ObjectInfo = ObjectInfo::of::<u8>("tiny");
        static TINY_VTABLE: ObjectVTable = ObjectVTable::of::<Counter>(tiny_info);
        fn tiny_info() -> &'static ObjectInfo {
            &TINY_INFO
        }

        let err =
            ObjectManager::new(VTableRef::of(&TINY_VTABLE), system_allocator()).unwrap_err();
        assert!(matches!(err, ObjectError::InvalidInfo { name: "tiny", .. }));
    }
}
