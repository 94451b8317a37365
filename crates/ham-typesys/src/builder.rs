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

//! Incremental construction of object and runtime types.

use crate::error::BuildError;
use crate::types::{
    MemberData, MethodData, ObjectKind, ParamData, RuntimeInfo, TheoreticInfo, Ty, TypeInfo,
    TypeKind,
};
use crate::typeset::{CompositeKey, Staged, Typeset, POINTER_SIZE};
use ham_core::VTableRef;
use std::collections::HashSet;

type StagedParams<'ts> = Vec<(String, Ty<'ts>)>;

/// Stages the description of a composite type, then interns it into a
/// [`Typeset`].
///
/// Members and methods are append-only and keep their call order. A
/// successful [`instantiate`](TypeBuilder::instantiate) empties the builder;
/// a failed one leaves the staged state untouched.
///
/// ```ignore
/// let mut builder = TypeBuilder::new();
/// let vec3 = builder
///     .set_name("vec3")
///     .add_member("x", ts.float(32)?)
///     .add_member("y", ts.float(32)?)
///     .add_member("z", ts.float(32)?)
///     .instantiate(&ts)?;
/// ```
#[derive(Debug, Clone)]
pub struct TypeBuilder<'ts> {
    kind: TypeKind,
    name: Option<String>,
    parent: Option<Ty<'ts>>,
    vptr: Option<VTableRef>,
    virtual_root: bool,
    members: StagedParams<'ts>,
    methods: Vec<(String, StagedParams<'ts>)>,
}

impl Default for TypeBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ts> TypeBuilder<'ts> {
    /// An empty builder staging an object type.
    pub fn new() -> Self {
        Self {
            kind: TypeKind::Object,
            name: None,
            parent: None,
            vptr: None,
            virtual_root: false,
            members: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Selects the kind to produce: [`TypeKind::Object`] or [`TypeKind::Runtime`].
    pub fn set_kind(&mut self, kind: TypeKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Names the type.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Embeds `parent` at offset zero.
    pub fn set_parent(&mut self, parent: Ty<'ts>) -> &mut Self {
        self.parent = Some(parent);
        self
    }

    /// Attaches the vtable of a concrete class. Its reported layout becomes
    /// the layout of the type.
    pub fn set_vptr(&mut self, vtable: VTableRef) -> &mut Self {
        self.vptr = Some(vtable);
        self
    }

    /// Marks an object type as carrying a vtable pointer without naming a
    /// concrete vtable, as abstract bases do.
    pub fn set_virtual(&mut self) -> &mut Self {
        self.virtual_root = true;
        self
    }

    /// Appends a data member.
    pub fn add_member(&mut self, name: impl Into<String>, ty: Ty<'ts>) -> &mut Self {
        self.members.push((name.into(), ty));
        self
    }

    /// Appends a method descriptor with its named parameters.
    pub fn add_method(&mut self, name: impl Into<String>, params: &[(&str, Ty<'ts>)]) -> &mut Self {
        let params = params
            .iter()
            .map(|&(name, ty)| (name.to_string(), ty))
            .collect();
        self.methods.push((name.into(), params));
        self
    }

    /// The staged kind.
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The staged name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of staged members.
    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    /// Number of staged methods.
    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.parent.is_none()
            && self.vptr.is_none()
            && !self.virtual_root
            && self.members.is_empty()
            && self.methods.is_empty()
    }

    /// Discards everything staged so far.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Validates and lays out the staged description, then returns the
    /// canonical type from `typeset`.
    ///
    /// Structurally identical content always yields the same [`Ty`]. On
    /// success the builder is reset.
    pub fn instantiate(&mut self, typeset: &'ts Typeset) -> Result<Ty<'ts>, BuildError> {
        let result = self
            .stage(typeset)
            .and_then(|staged| typeset.intern_composite(staged));
        match result {
            Ok(ty) => {
                self.reset();
                Ok(ty)
            }
            Err(err) => {
                log::error!(
                    "Failed to instantiate type '{}': {err}",
                    self.name.as_deref().unwrap_or("<anonymous>")
                );
                Err(err)
            }
        }
    }

    fn stage(&self, typeset: &Typeset) -> Result<Staged, BuildError> {
        let object = match self.kind {
            TypeKind::Object => true,
            TypeKind::Runtime => false,
            other => return Err(BuildError::UnsupportedKind(other)),
        };

        if object {
            if self.name.is_none() {
                return Err(BuildError::MissingName);
            }
        } else if self.parent.is_some() {
            return Err(BuildError::NotAnObject { what: "parent" });
        } else if self.vptr.is_some() || self.virtual_root {
            return Err(BuildError::NotAnObject { what: "vptr" });
        }

        if let Some(parent) = self.parent {
            check_owned(typeset, parent, || "parent".to_string())?;
            if !parent.is_object() {
                return Err(BuildError::InvalidParent {
                    parent: parent.to_string(),
                });
            }
        }

        let virtual_parent = self
            .parent
            .is_some_and(|parent| parent.info() == TypeInfo::Object(ObjectKind::Virtual));
        let info = if !object {
            TypeInfo::Runtime(RuntimeInfo::C)
        } else if self.vptr.is_some() || self.virtual_root || virtual_parent {
            TypeInfo::Object(ObjectKind::Virtual)
        } else {
            TypeInfo::Object(ObjectKind::Pod)
        };

        let (mut offset, mut alignment) = match self.parent {
            Some(parent) => (parent.size(), parent.alignment()),
            // A virtual root starts with its vtable pointer.
            None if info == TypeInfo::Object(ObjectKind::Virtual) => (POINTER_SIZE, POINTER_SIZE),
            None => (0, 1),
        };

        let mut seen = HashSet::with_capacity(self.members.len());
        let mut members = Vec::with_capacity(self.members.len());
        for (name, ty) in &self.members {
            check_owned(typeset, *ty, || format!("member '{name}'"))?;
            if matches!(
                ty.info(),
                TypeInfo::Theoretic(TheoreticInfo::Void | TheoreticInfo::Top | TheoreticInfo::Bottom)
            ) {
                return Err(BuildError::UninhabitedMember {
                    member: name.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(BuildError::DuplicateMember {
                    member: name.clone(),
                });
            }

            let member_alignment = ty.alignment().max(1);
            offset = offset
                .checked_next_multiple_of(member_alignment)
                .ok_or(BuildError::LayoutOverflow)?;
            members.push(MemberData {
                name: name.clone(),
                ty: ty.as_ptr(),
                offset,
            });
            offset = offset
                .checked_add(ty.size())
                .ok_or(BuildError::LayoutOverflow)?;
            alignment = alignment.max(member_alignment);
        }
        let mut size = offset
            .checked_next_multiple_of(alignment)
            .ok_or(BuildError::LayoutOverflow)?;

        if let Some(vtable) = self.vptr {
            let class = vtable.info();
            if class.size < size {
                log::warn!(
                    "Class '{}' reports {} bytes but its described members need {size}",
                    class.name,
                    class.size
                );
            }
            let parent_class = self.parent.and_then(Ty::vptr).map(|parent| parent.info());
            if let Some(parent_class) = parent_class {
                if !class.is_a(parent_class) {
                    log::warn!(
                        "Class '{}' does not derive from parent class '{}'",
                        class.name,
                        parent_class.name
                    );
                }
            }
            alignment = class.alignment;
            size = class.size;
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for (name, params) in &self.methods {
            let mut staged_params = Vec::with_capacity(params.len());
            for (param, ty) in params {
                check_owned(typeset, *ty, || format!("parameter '{param}' of '{name}'"))?;
                staged_params.push(ParamData {
                    name: param.clone(),
                    ty: ty.as_ptr(),
                });
            }
            methods.push(MethodData {
                name: name.clone(),
                params: staged_params,
            });
        }

        let key = CompositeKey {
            info,
            name: self.name.clone(),
            parent: self.parent.map(address),
            vptr: self.vptr.map(VTableRef::addr),
            members: self
                .members
                .iter()
                .map(|(name, ty)| (name.clone(), address(*ty)))
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|(name, params)| {
                    let params = params
                        .iter()
                        .map(|(param, ty)| (param.clone(), address(*ty)))
                        .collect();
                    (name.clone(), params)
                })
                .collect(),
        };

        Ok(Staged {
            key,
            alignment,
            size,
            parent: self.parent.map(Ty::as_ptr),
            vptr: self.vptr,
            members,
            methods,
        })
    }
}

fn address(ty: Ty<'_>) -> usize {
    ty.as_ptr().as_ptr() as usize
}

fn check_owned(
    typeset: &Typeset,
    ty: Ty<'_>,
    context: impl FnOnce() -> String,
) -> Result<(), BuildError> {
    if typeset.owns(ty) {
        Ok(())
    } else {
        Err(BuildError::ForeignType { context: context() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ham_core::memory::system_allocator;

    fn typeset() -> Typeset {
        Typeset::new(system_allocator()).unwrap()
    }

    #[test]
    fn test_object_types_require_a_name() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        builder.add_member("value", ts.nat(32).unwrap());

        assert_eq!(builder.instantiate(&ts), Err(BuildError::MissingName));
        assert_eq!(builder.num_members(), 1, "failure keeps the staged state");
    }

    #[test]
    fn test_only_object_and_runtime_kinds() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        builder.set_kind(TypeKind::Numeric).set_name("number");

        assert_eq!(
            builder.instantiate(&ts),
            Err(BuildError::UnsupportedKind(TypeKind::Numeric))
        );
    }

    #[test]
    fn test_runtime_types_cannot_embed_a_parent() {
        let ts = typeset();
        let base = TypeBuilder::new().set_name("base").instantiate(&ts).unwrap();

        let mut builder = TypeBuilder::new();
        builder.set_kind(TypeKind::Runtime).set_parent(base);
        assert_eq!(
            builder.instantiate(&ts),
            Err(BuildError::NotAnObject { what: "parent" })
        );
    }

    #[test]
    fn test_anonymous_runtime_type_layout() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        let header = builder
            .set_kind(TypeKind::Runtime)
            .add_member("tag", ts.nat(8).unwrap())
            .add_member("len", ts.nat(32).unwrap())
            .add_member("flag", ts.bool())
            .instantiate(&ts)
            .unwrap();

        assert_eq!(header.kind(), TypeKind::Runtime);
        assert_eq!(header.name(), None);
        let offsets: Vec<_> = header.members().map(|member| member.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!((header.size(), header.alignment()), (12, 4));
        assert_eq!(header.to_string(), "{ tag: nat8, len: nat32, flag: bool }");
    }

    #[test]
    fn test_parent_is_embedded_first() {
        let ts = typeset();
        let float32 = ts.float(32).unwrap();
        let base = TypeBuilder::new()
            .set_name("point2")
            .add_member("x", float32)
            .add_member("y", float32)
            .instantiate(&ts)
            .unwrap();
        let derived = TypeBuilder::new()
            .set_name("point3")
            .set_parent(base)
            .add_member("z", float32)
            .instantiate(&ts)
            .unwrap();

        assert_eq!(derived.parent(), Some(base));
        assert_eq!(derived.member("z").map(|member| member.offset), Some(8));
        assert_eq!(derived.size(), 12);
        assert_eq!(derived.info(), TypeInfo::Object(ObjectKind::Pod));
    }

    #[test]
    fn test_invalid_members_are_rejected() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        builder.set_name("broken").add_member("nothing", ts.void());
        assert!(matches!(
            builder.instantiate(&ts),
            Err(BuildError::UninhabitedMember { .. })
        ));

        builder.reset();
        let nat8 = ts.nat(8).unwrap();
        builder
            .set_name("twice")
            .add_member("a", nat8)
            .add_member("a", nat8);
        assert!(matches!(
            builder.instantiate(&ts),
            Err(BuildError::DuplicateMember { .. })
        ));
    }

    #[test]
    fn test_reset_discards_everything() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        builder
            .set_kind(TypeKind::Runtime)
            .set_name("scratch")
            .add_member("a", ts.bool())
            .add_method("run", &[]);
        assert!(!builder.is_empty());

        builder.reset();
        assert!(builder.is_empty());
        assert_eq!(builder.kind(), TypeKind::Object);
    }

    #[test]
    fn test_success_resets_the_builder() {
        let ts = typeset();
        let mut builder = TypeBuilder::new();
        builder.set_name("empty");
        builder.instantiate(&ts).unwrap();
        assert!(builder.is_empty());
    }

    #[test]
    fn test_abstract_virtual_base_reserves_the_vtable_slot() {
        let ts = typeset();
        let base = TypeBuilder::new()
            .set_name("node")
            .set_virtual()
            .add_member("id", ts.nat(32).unwrap())
            .instantiate(&ts)
            .unwrap();

        assert_eq!(base.info(), TypeInfo::Object(ObjectKind::Virtual));
        assert!(base.vptr().is_none());
        assert_eq!(base.member("id").map(|member| member.offset), Some(POINTER_SIZE));
        assert_eq!(base.size(), 2 * POINTER_SIZE);
    }
}
