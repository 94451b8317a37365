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

//! Integration tests for object managers driving a three-level class
//! hierarchy (`Widget` → `Button` → `IconButton`).

use ham_core::memory::{system_allocator, TrackingAllocator};
use ham_core::object::{
    Arg, ArgKind, Args, Class, Construct, ConstructError, Derived, Embedded, Object, ObjectError,
    ObjectHandle, ObjectInfo, ObjectType, ObjectVTable,
};
use ham_core::store::StoreSettings;
use ham_core::ObjectManager;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Class hierarchy
// ─────────────────────────────────────────────────────────────────────────────

/// Counts constructions and destructions observed by one test.
#[derive(Default)]
struct Tally {
    constructed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Tally {
    fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[repr(C)]
#[derive(Derived)]
struct Widget {
    base: Object,
    label: String,
}

#[repr(C)]
#[derive(Derived)]
struct WidgetVTable {
    base: ObjectVTable,
    describe: fn(&Widget) -> String,
}

static WIDGET_INFO: ObjectInfo = ObjectInfo::of::<Widget>("widget");

unsafe impl ObjectType for Widget {
    type VTable = WidgetVTable;

    fn type_info() -> &'static ObjectInfo {
        &WIDGET_INFO
    }
}

#[repr(C)]
#[derive(Derived)]
struct Button {
    base: Widget,
    presses: u32,
    tally: Arc<Tally>,
}

#[repr(C)]
#[derive(Derived)]
struct ButtonVTable {
    base: WidgetVTable,
    press: fn(&mut Button),
}

static BUTTON_INFO: ObjectInfo = ObjectInfo::of::<Button>("button")
    .with_parent(&WIDGET_INFO)
    .with_params(&[ArgKind::Str, ArgKind::Opaque]);

static BUTTON_VTABLE: ButtonVTable = ButtonVTable {
    base: WidgetVTable {
        base: ObjectVTable::of::<Button>(button_info),
        describe: describe_button,
    },
    press: press_button,
};

fn button_info() -> &'static ObjectInfo {
    &BUTTON_INFO
}

fn describe_button(widget: &Widget) -> String {
    format!("button '{}'", widget.label)
}

fn press_button(button: &mut Button) {
    button.presses += 1;
}

impl Construct for Button {
    fn construct(args: &Args<'_>) -> Result<Self, ConstructError> {
        let label = args.str(0)?;
        let tally = args.opaque::<Arc<Tally>>(1)?.clone();
        if label.is_empty() {
            return Err(ConstructError::Failed("empty label".to_string()));
        }
        tally.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Button {
            base: Widget {
                base: Object::new(),
                label: label.to_string(),
            },
            presses: 0,
            tally,
        })
    }
}

impl Drop for Button {
    fn drop(&mut self) {
        self.tally.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

unsafe impl ObjectType for Button {
    type VTable = ButtonVTable;

    fn type_info() -> &'static ObjectInfo {
        &BUTTON_INFO
    }
}

unsafe impl Class for Button {
    fn class_vtable() -> &'static ButtonVTable {
        &BUTTON_VTABLE
    }
}

#[repr(C)]
#[derive(Derived)]
struct IconButton {
    base: Button,
    icon: u64,
}

static ICON_BUTTON_INFO: ObjectInfo = ObjectInfo::of::<IconButton>("icon_button")
    .with_parent(&BUTTON_INFO)
    .with_params(&[ArgKind::Str, ArgKind::Opaque, ArgKind::Nat]);

static ICON_BUTTON_VTABLE: ButtonVTable = ButtonVTable {
    base: WidgetVTable {
        base: ObjectVTable::of::<IconButton>(icon_button_info),
        describe: describe_icon_button,
    },
    press: press_button,
};

fn icon_button_info() -> &'static ObjectInfo {
    &ICON_BUTTON_INFO
}

fn describe_icon_button(widget: &Widget) -> String {
    format!("icon button '{}'", widget.label)
}

impl Construct for IconButton {
    fn construct(args: &Args<'_>) -> Result<Self, ConstructError> {
        let base = Button::construct(args)?;
        Ok(IconButton {
            base,
            icon: args.nat(2)?,
        })
    }
}

unsafe impl ObjectType for IconButton {
    type VTable = ButtonVTable;

    fn type_info() -> &'static ObjectInfo {
        &ICON_BUTTON_INFO
    }
}

unsafe impl Class for IconButton {
    fn class_vtable() -> &'static ButtonVTable {
        &ICON_BUTTON_VTABLE
    }
}

/// Helper: creates an icon button labelled `label`.
fn new_icon_button(
    manager: &mut ObjectManager,
    tally: &Arc<Tally>,
    label: &str,
    icon: u64,
) -> Result<ObjectHandle, ObjectError> {
    manager.new_object(Args::new(&[
        Arg::Str(label),
        Arg::Opaque(tally),
        Arg::Nat(icon),
    ]))
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation and dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_chained_super_navigation_matches_base_view() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    let handle = new_icon_button(&mut manager, &tally, "ok", 7).unwrap();

    let leaf = unsafe { handle.downcast_unchecked::<IconButton>() };
    let button = IconButton::super_ptr(leaf);
    let widget = Button::super_ptr(button);

    let view = manager.view::<Widget>(handle).expect("icon button is a widget");
    assert_eq!(widget.as_ptr().cast_const(), view.get() as *const Widget);
    assert_eq!(Widget::super_ptr(widget), handle.as_ptr());
    assert_eq!(<IconButton as Embedded>::DEPTH, 3);
    assert_eq!(view.get().label, "ok");
}

#[test]
fn test_dispatch_through_base_vtable_reaches_concrete_entry() {
    let tally = Arc::new(Tally::default());
    let mut icons = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    let mut buttons = ObjectManager::for_class::<Button>(system_allocator()).unwrap();

    let icon = new_icon_button(&mut icons, &tally, "save", 1).unwrap();
    let plain = buttons
        .new_object(Args::new(&[Arg::Str("quit"), Arg::Opaque(&tally)]))
        .unwrap();

    let icon_view = icons.view::<Widget>(icon).unwrap();
    let plain_view = buttons.view::<Widget>(plain).unwrap();
    assert_eq!((icon_view.vtable().describe)(&icon_view), "icon button 'save'");
    assert_eq!((plain_view.vtable().describe)(&plain_view), "button 'quit'");

    let press = unsafe { icon.vtable_as::<ButtonVTable>() }.press;
    press(icons.get_mut::<Button>(icon).unwrap());
    press(icons.get_mut::<Button>(icon).unwrap());
    assert_eq!(icons.get::<IconButton>(icon).unwrap().base.presses, 2);
}

#[test]
fn test_checked_access_respects_ancestry() {
    let tally = Arc::new(Tally::default());
    let mut buttons = ObjectManager::for_class::<Button>(system_allocator()).unwrap();
    let plain = buttons
        .new_object(Args::new(&[Arg::Str("quit"), Arg::Opaque(&tally)]))
        .unwrap();

    assert!(buttons.get::<Widget>(plain).is_some());
    assert!(buttons.get::<IconButton>(plain).is_none());
    assert!(unsafe { plain.downcast::<IconButton>() }.is_none());
    assert!(unsafe { plain.downcast::<Widget>() }.is_some());

    let view = buttons.view::<Object>(plain).unwrap();
    assert!(view.downcast::<Button>().is_some());
    assert!(view.downcast::<IconButton>().is_none());
}

#[test]
fn test_root_view_narrows_to_the_whole_leaf() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    let handle = new_icon_button(&mut manager, &tally, "ok", 42).unwrap();

    let root = manager.view::<Object>(handle).unwrap();
    let leaf = root.downcast::<IconButton>().unwrap();
    assert_eq!(leaf.icon, 42);

    let vtable = leaf.vtable();
    assert!(std::ptr::eq(vtable, &ICON_BUTTON_VTABLE));
    let widget = leaf.super_view().super_view();
    assert_eq!((vtable.base.describe)(&widget), "icon button 'ok'");
    assert_eq!(widget.downcast::<IconButton>().map(|icon| icon.icon), Some(42));
}

#[test]
fn test_managers_move_across_threads() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<Button>(system_allocator()).unwrap();
    manager
        .new_object(Args::new(&[Arg::Str("far"), Arg::Opaque(&tally)]))
        .unwrap();

    std::thread::spawn(move || drop(manager)).join().unwrap();
    assert_eq!(tally.dropped(), 1);
    assert_eq!(Arc::strong_count(&tally), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_contains_tracks_interleaved_create_and_delete() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::with_settings(
        IconButton::vtable(),
        system_allocator(),
        StoreSettings {
            initial_block_capacity: 2,
            max_block_capacity: 8,
            max_slots: None,
        },
    )
    .unwrap();

    let mut live = HashSet::new();
    let mut seen = Vec::new();
    let mut seed = 0x2545_f491_u32;
    for step in 0..200u64 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        if seed % 3 != 0 || live.is_empty() {
            let handle = new_icon_button(&mut manager, &tally, "w", step).unwrap();
            live.insert(handle);
            seen.push(handle);
        } else {
            let victim = *live.iter().next().unwrap();
            assert!(manager.delete_object(victim));
            live.remove(&victim);
        }

        for handle in &seen {
            assert_eq!(manager.contains(*handle), live.contains(handle));
        }
    }
    assert_eq!(manager.len(), live.len());
}

#[test]
fn test_create_then_delete_leaves_count_unchanged() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    new_icon_button(&mut manager, &tally, "a", 0).unwrap();
    let before = manager.iterate(None);

    let handle = new_icon_button(&mut manager, &tally, "b", 0).unwrap();
    assert!(manager.delete_object(handle));

    assert_eq!(manager.iterate(None), before);
    assert_eq!(tally.dropped(), 1, "only the deleted instance is destructed");
}

#[test]
fn test_destroy_destructs_each_live_instance_once() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    let handles: Vec<_> = (0..5)
        .map(|i| new_icon_button(&mut manager, &tally, "x", i).unwrap())
        .collect();
    assert!(manager.delete_object(handles[2]));

    assert_eq!(manager.destroy(), 4);
    assert_eq!(tally.constructed(), 5);
    assert_eq!(tally.dropped(), 5);
    assert_eq!(Arc::strong_count(&tally), 1, "no instance outlives its manager");
}

#[test]
fn test_dropping_manager_destructs_instances() {
    let tally = Arc::new(Tally::default());
    {
        let mut manager = ObjectManager::for_class::<Button>(system_allocator()).unwrap();
        for _ in 0..3 {
            manager
                .new_object(Args::new(&[Arg::Str("b"), Arg::Opaque(&tally)]))
                .unwrap();
        }
    }
    assert_eq!(tally.dropped(), 3);
}

#[test]
fn test_iterate_stops_when_visitor_declines() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    for i in 0..6 {
        new_icon_button(&mut manager, &tally, "i", i).unwrap();
    }

    let mut icons = Vec::new();
    let visited = manager.iterate(Some(&mut |handle: ObjectHandle| {
        let icon = unsafe { handle.downcast_unchecked::<IconButton>().as_ref() }.icon;
        icons.push(icon);
        icons.len() < 4
    }));
    assert_eq!(visited, 3);
    assert_eq!(icons.len(), 4);
    assert_eq!(manager.handles().count(), 6);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure paths
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_failing_constructor_releases_the_slot() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();
    new_icon_button(&mut manager, &tally, "keep", 0).unwrap();

    let err = new_icon_button(&mut manager, &tally, "", 0).unwrap_err();
    assert!(matches!(
        err,
        ObjectError::ConstructionFailed {
            name: "icon_button",
            ..
        }
    ));
    assert_eq!(manager.len(), 1);
    assert_eq!(tally.dropped(), 0, "a failed constructor builds nothing to drop");
}

#[test]
fn test_bad_arguments_never_reach_the_constructor() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::for_class::<IconButton>(system_allocator()).unwrap();

    let missing = manager.new_object(Args::new(&[Arg::Str("x"), Arg::Opaque(&tally)]));
    let wrong = manager.new_object(Args::new(&[
        Arg::Str("x"),
        Arg::Opaque(&tally),
        Arg::Int(-1),
    ]));

    assert!(matches!(missing, Err(ObjectError::BadArguments(_))));
    assert!(matches!(wrong, Err(ObjectError::BadArguments(_))));
    assert_eq!(tally.constructed(), 0);
    assert!(manager.is_empty());
}

#[test]
fn test_slot_limit_exhausts_new_object() {
    let tally = Arc::new(Tally::default());
    let mut manager = ObjectManager::with_settings(
        IconButton::vtable(),
        system_allocator(),
        StoreSettings {
            max_slots: Some(2),
            ..StoreSettings::default()
        },
    )
    .unwrap();

    new_icon_button(&mut manager, &tally, "1", 1).unwrap();
    new_icon_button(&mut manager, &tally, "2", 2).unwrap();
    let err = new_icon_button(&mut manager, &tally, "3", 3).unwrap_err();

    assert_eq!(
        err,
        ObjectError::StoreExhausted {
            name: "icon_button"
        }
    );
    assert_eq!(manager.len(), 2);
    assert_eq!(tally.constructed(), 2);
}

#[test]
fn test_allocator_budget_exhausts_without_leaking() {
    let tally = Arc::new(Tally::default());
    let block = 2 * std::mem::size_of::<IconButton>();
    let tracking = Arc::new(TrackingAllocator::system().with_limit(block));
    {
        let mut manager = ObjectManager::with_settings(
            IconButton::vtable(),
            tracking.clone(),
            StoreSettings {
                initial_block_capacity: 2,
                max_block_capacity: 2,
                max_slots: None,
            },
        )
        .unwrap();

        new_icon_button(&mut manager, &tally, "1", 1).unwrap();
        new_icon_button(&mut manager, &tally, "2", 2).unwrap();
        let err = new_icon_button(&mut manager, &tally, "3", 3).unwrap_err();

        assert!(matches!(err, ObjectError::StoreExhausted { .. }));
        assert_eq!(manager.len(), 2);
        assert_eq!(tracking.stats().current_allocated_bytes, block);
        assert_eq!(tracking.stats().failed_allocations, 1);
    }
    assert_eq!(tracking.stats().current_allocated_bytes, 0);
    assert_eq!(tally.dropped(), 2);
}

#[test]
fn test_manager_creation_fails_when_first_block_is_refused() {
    let tracking = Arc::new(TrackingAllocator::system().with_limit(1));
    let err = ObjectManager::for_class::<Button>(tracking.clone()).unwrap_err();
    assert!(matches!(err, ObjectError::StoreCreation(_)));
    assert_eq!(tracking.stats().current_allocated_bytes, 0);
}
