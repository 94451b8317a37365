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

// Ham Sandbox
// Registers a small shape plugin, drives its managers and reflects its layout.
//
// Usage: sandbox [settings.ron]

use anyhow::{Context, Result};
use ham_core::memory::AllocatorRef;
use ham_core::object::{
    ArgKind, Args, Class, Construct, ConstructError, Derived, Object, ObjectInfo, ObjectType,
    ObjectVTable, ObjectView,
};
use ham_core::{args, ManagerRegistry, RuntimeSettings};
use ham_typesys::{TypeBuilder, Typeset};

// --- Shape plugin ---

#[repr(C)]
#[derive(Derived)]
struct Shape {
    base: Object,
    scale: f64,
}

#[repr(C)]
#[derive(Derived)]
struct ShapeVTable {
    base: ObjectVTable,
    area: fn(ObjectView<'_, Shape>) -> f64,
}

static SHAPE_INFO: ObjectInfo = ObjectInfo::of::<Shape>("shape");

unsafe impl ObjectType for Shape {
    type VTable = ShapeVTable;

    fn type_info() -> &'static ObjectInfo {
        &SHAPE_INFO
    }
}

#[repr(C)]
#[derive(Derived)]
struct Circle {
    base: Shape,
    radius: f64,
}

static CIRCLE_INFO: ObjectInfo = ObjectInfo::of::<Circle>("circle")
    .with_parent(&SHAPE_INFO)
    .with_params(&[ArgKind::Float]);

static CIRCLE_VTABLE: ShapeVTable = ShapeVTable {
    base: ObjectVTable::of::<Circle>(circle_info),
    area: circle_area,
};

fn circle_info() -> &'static ObjectInfo {
    &CIRCLE_INFO
}

fn circle_area(shape: ObjectView<'_, Shape>) -> f64 {
    let Some(circle) = shape.downcast::<Circle>() else {
        return 0.0;
    };
    let radius = circle.radius * shape.scale;
    std::f64::consts::PI * radius * radius
}

impl Construct for Circle {
    fn construct(args: &Args<'_>) -> Result<Self, ConstructError> {
        let radius = args.float(0)?;
        if radius <= 0.0 {
            return Err(ConstructError::Failed(format!("invalid radius {radius}")));
        }
        Ok(Circle {
            base: Shape {
                base: Object::new(),
                scale: 1.0,
            },
            radius,
        })
    }
}

unsafe impl ObjectType for Circle {
    type VTable = ShapeVTable;

    fn type_info() -> &'static ObjectInfo {
        &CIRCLE_INFO
    }
}

unsafe impl Class for Circle {
    fn class_vtable() -> &'static ShapeVTable {
        &CIRCLE_VTABLE
    }
}

ham_core::register_class!(Circle);

// --- Demo ---

fn load_settings() -> Result<RuntimeSettings> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(RuntimeSettings::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings from '{path}'"))?;
    let settings = ron::from_str(&text).with_context(|| format!("Invalid settings in '{path}'"))?;
    log::info!("Loaded runtime settings from '{path}'");
    Ok(settings)
}

fn run_objects(registry: &mut ManagerRegistry) -> Result<()> {
    let created = registry.instantiate_registered()?;
    log::info!("Registered {created} plugin class(es)");

    let unit = registry.new_object("circle", args![1.0])?;
    let wheel = registry.new_object("circle", args![0.35])?;
    registry.new_object("circle", args![0.12])?;
    if let Err(err) = registry.new_object("circle", args![-1.0]) {
        log::warn!("Rejected as expected: {err}");
    }

    let manager = registry
        .manager_for::<Circle>()
        .context("circle manager is missing")?;
    if let Some(circle) = manager.get_mut::<Circle>(wheel) {
        circle.base.scale = 2.0;
    }
    for handle in manager.handles() {
        let Some(shape) = manager.view::<Circle>(handle).map(|view| view.super_view()) else {
            continue;
        };
        log::info!(
            "{} {handle:?}: area {:.3}",
            shape.info().name,
            (shape.vtable().area)(shape)
        );
    }

    registry.delete(unit);
    log::info!("{} live instance(s) after deletion", registry.total_instances());
    Ok(())
}

fn run_types(allocator: AllocatorRef) -> Result<()> {
    let ts = Typeset::new(allocator)?;
    let float64 = ts.type_of::<f64>().context("float64 is always available")?;

    let shape = TypeBuilder::new()
        .set_name("shape")
        .set_virtual()
        .add_member("scale", float64)
        .add_method("area", &[])
        .instantiate(&ts)?;
    let circle = TypeBuilder::new()
        .set_name("circle")
        .set_parent(shape)
        .set_vptr(Circle::vtable())
        .add_member("radius", float64)
        .add_method("resize", &[("radius", float64)])
        .instantiate(&ts)?;

    for ty in [shape, circle] {
        log::info!(
            "Type '{ty}': {} bytes, align {}, {:?}",
            ty.size(),
            ty.alignment(),
            ty.info()
        );
        for member in ty.members() {
            log::info!("  member {} @ {}: {}", member.name, member.offset, member.ty);
        }
        for method in ty.methods() {
            let params: Vec<_> = method
                .params()
                .map(|param| format!("{}: {}", param.name, param.ty))
                .collect();
            log::info!("  method {}({})", method.name(), params.join(", "));
        }
    }
    log::info!("Typeset holds {} type(s)", ts.len());
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = load_settings()?;
    let (allocator, tracking) = settings.allocator();
    let mut registry = ManagerRegistry::new(allocator.clone(), settings.store);

    run_objects(&mut registry)?;
    run_types(allocator)?;

    let destroyed = registry.destroy();
    log::info!("Destroyed {destroyed} remaining instance(s)");
    if let Some(tracking) = tracking {
        let stats = tracking.stats();
        log::info!(
            "Allocator: {} bytes live, peak {} bytes, {} refused",
            stats.current_allocated_bytes,
            stats.peak_allocated_bytes,
            stats.failed_allocations
        );
    }
    Ok(())
}
