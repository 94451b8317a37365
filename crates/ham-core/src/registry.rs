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

//! Class registration across crate boundaries and one-manager-per-class
//! bookkeeping.
//!
//! Plugin crates announce their classes with [`register_class!`](crate::register_class);
//! a host collects them through [`registered_classes`] and creates one
//! [`ObjectManager`] per class with [`ManagerRegistry::instantiate_registered`].

use crate::manager::ObjectManager;
use crate::memory::AllocatorRef;
use crate::object::{Args, Class, ObjectError, ObjectHandle, VTableRef};
use crate::settings::RuntimeSettings;
use crate::store::StoreSettings;
use std::collections::HashMap;

/// A class submitted for link-time discovery.
#[derive(Debug)]
pub struct ClassRegistration {
    vtable: fn() -> VTableRef,
}

impl ClassRegistration {
    /// Registers the class whose vtable is returned by `vtable`.
    pub const fn new(vtable: fn() -> VTableRef) -> Self {
        Self { vtable }
    }

    /// The registered vtable.
    pub fn vtable(&self) -> VTableRef {
        (self.vtable)()
    }

    /// The registered type name.
    pub fn name(&self) -> &'static str {
        self.vtable().info().name
    }
}

inventory::collect!(ClassRegistration);

/// Submits a [`Class`] for discovery by [`registered_classes`].
///
/// ```rust,ignore
/// ham_core::register_class!(MyWidget);
/// ```
#[macro_export]
macro_rules! register_class {
    ($class:ty) => {
        $crate::inventory::submit! {
            $crate::registry::ClassRegistration::new(<$class as $crate::object::Class>::vtable)
        }
    };
}

/// Every class submitted with [`register_class!`](crate::register_class) in
/// the final binary.
pub fn registered_classes() -> impl Iterator<Item = &'static ClassRegistration> {
    inventory::iter::<ClassRegistration>.into_iter()
}

/// One [`ObjectManager`] per class, found by vtable or by type name.
pub struct ManagerRegistry {
    allocator: AllocatorRef,
    settings: StoreSettings,
    managers: Vec<ObjectManager>,
    by_vtable: HashMap<usize, usize>,
    by_name: HashMap<&'static str, usize>,
}

impl ManagerRegistry {
    /// Creates an empty registry whose managers share `allocator` and `settings`.
    pub fn new(allocator: AllocatorRef, settings: StoreSettings) -> Self {
        Self {
            allocator,
            settings,
            managers: Vec::new(),
            by_vtable: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Creates an empty registry configured from runtime settings.
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let (allocator, _) = settings.allocator();
        Self::new(allocator, settings.store)
    }

    /// Returns the manager for `vtable`, creating it on first use.
    ///
    /// Fails if a different vtable is already registered under the same name
    /// or if the manager cannot be created.
    pub fn register(&mut self, vtable: VTableRef) -> Result<&mut ObjectManager, ObjectError> {
        let key = vtable.addr();
        if let Some(&index) = self.by_vtable.get(&key) {
            return Ok(&mut self.managers[index]);
        }

        let name = vtable.info().name;
        if self.by_name.contains_key(name) {
            log::error!("Class name '{name}' is already registered with another vtable");
            return Err(ObjectError::DuplicateClass { name });
        }

        let manager =
            ObjectManager::with_settings(vtable, self.allocator.clone(), self.settings)?;
        let index = self.managers.len();
        self.managers.push(manager);
        self.by_vtable.insert(key, index);
        self.by_name.insert(name, index);
        log::debug!("Registered class '{name}'");

        Ok(&mut self.managers[index])
    }

    /// Returns the manager for `T`, creating it on first use.
    pub fn register_class<T: Class>(&mut self) -> Result<&mut ObjectManager, ObjectError> {
        self.register(T::vtable())
    }

    /// Creates a manager for every class in [`registered_classes`] not yet
    /// registered. Returns the number of managers created.
    pub fn instantiate_registered(&mut self) -> Result<usize, ObjectError> {
        let before = self.managers.len();
        for registration in registered_classes() {
            self.register(registration.vtable())?;
        }
        let created = self.managers.len() - before;
        log::info!("Instantiated {created} registered class manager(s)");
        Ok(created)
    }

    /// The manager of the class named `name`.
    pub fn manager(&self, name: &str) -> Option<&ObjectManager> {
        self.by_name.get(name).map(|&index| &self.managers[index])
    }

    /// Mutable access to the manager of the class named `name`.
    pub fn manager_mut(&mut self, name: &str) -> Option<&mut ObjectManager> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.managers[index])
    }

    /// The manager of `T`, if registered.
    pub fn manager_for<T: Class>(&mut self) -> Option<&mut ObjectManager> {
        let key = T::vtable().addr();
        let index = *self.by_vtable.get(&key)?;
        Some(&mut self.managers[index])
    }

    /// Creates an instance of the class named `name`.
    pub fn new_object(&mut self, name: &str, args: Args<'_>) -> Result<ObjectHandle, ObjectError> {
        let Some(manager) = self.manager_mut(name) else {
            log::warn!("Cannot instantiate unknown class '{name}'");
            return Err(ObjectError::UnknownClass {
                name: name.to_string(),
            });
        };
        manager.new_object(args)
    }

    /// The manager owning `handle`, found by membership only.
    pub fn find_owner(&self, handle: ObjectHandle) -> Option<&ObjectManager> {
        self.managers
            .iter()
            .find(|manager| manager.contains(handle))
    }

    /// Deletes `handle` through whichever manager owns it.
    pub fn delete(&mut self, handle: ObjectHandle) -> bool {
        self.managers
            .iter_mut()
            .find(|manager| manager.contains(handle))
            .is_some_and(|manager| manager.delete_object(handle))
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Returns `true` if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Iterates over the managers in registration order.
    pub fn managers(&self) -> impl Iterator<Item = &ObjectManager> {
        self.managers.iter()
    }

    /// Live instances across every manager.
    pub fn total_instances(&self) -> usize {
        self.managers.iter().map(ObjectManager::len).sum()
    }

    /// Destroys every manager, returning the number of instances destructed.
    pub fn destroy(self) -> usize {
        self.managers.into_iter().map(ObjectManager::destroy).sum()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("managers", &self.managers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::system_allocator;
    use crate::object::{
        Construct, ConstructError, Derived, Object, ObjectInfo, ObjectType, ObjectVTable,
    };

    #[repr(C)]
    #[derive(Derived)]
    struct Marker {
        base: Object,
    }

    static MARKER_INFO: ObjectInfo = ObjectInfo::of::<Marker>("marker");
    static MARKER_VTABLE: ObjectVTable = ObjectVTable::of::<Marker>(marker_info);
    // Same name, different vtable.
    static IMPOSTOR_VTABLE: ObjectVTable = ObjectVTable::of::<Marker>(marker_info);

    fn marker_info() -> &'static ObjectInfo {
        &MARKER_INFO
    }

    impl Construct for Marker {
        fn construct(_args: &Args<'_>) -> Result<Self, ConstructError> {
            Ok(Marker {
                base: Object::new(),
            })
        }
    }

    unsafe impl ObjectType for Marker {
        type VTable = ObjectVTable;

        fn type_info() -> &'static ObjectInfo {
            &MARKER_INFO
        }
    }

    unsafe impl Class for Marker {
        fn class_vtable() -> &'static ObjectVTable {
            &MARKER_VTABLE
        }
    }

    fn registry() -> ManagerRegistry {
        ManagerRegistry::new(system_allocator(), StoreSettings::default())
    }

    #[test]
    fn test_register_is_idempotent_per_vtable() {
        let mut registry = registry();
        registry.register_class::<Marker>().unwrap();
        registry.register(VTableRef::of(&MARKER_VTABLE)).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.manager("marker").is_some());
        assert!(registry.manager_for::<Marker>().is_some());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut registry = registry();
        registry.register(VTableRef::of(&MARKER_VTABLE)).unwrap();
        let err = registry.register(VTableRef::of(&IMPOSTOR_VTABLE)).unwrap_err();
        assert_eq!(err, ObjectError::DuplicateClass { name: "marker" });
    }

    #[test]
    fn test_new_object_and_delete_by_name() {
        let mut registry = registry();
        registry.register_class::<Marker>().unwrap();

        let handle = registry.new_object("marker", Args::empty()).unwrap();
        assert_eq!(registry.total_instances(), 1);
        assert_eq!(
            registry.find_owner(handle).map(|m| m.info().name),
            Some("marker")
        );

        assert!(registry.delete(handle));
        assert!(!registry.delete(handle));
        assert!(registry.find_owner(handle).is_none());

        let err = registry.new_object("ghost", Args::empty()).unwrap_err();
        assert!(matches!(err, ObjectError::UnknownClass { .. }));
    }

    #[test]
    fn test_destroy_sums_instances() {
        let mut registry = registry();
        let manager = registry.register_class::<Marker>().unwrap();
        manager.new_object(Args::empty()).unwrap();
        manager.new_object(Args::empty()).unwrap();
        assert_eq!(registry.destroy(), 2);
    }
}
