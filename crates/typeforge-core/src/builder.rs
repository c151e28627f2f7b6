//! Mutable construction phase for type graphs.
//!
//! The builder owns the growing type and attribute arrays, deduplicates
//! types by identity, and freezes into an immutable
//! [`TypeGraph`](crate::type_graph::TypeGraph) with `finish`. Each type is
//! committed exactly once to its reserved index; set-once fields may be
//! filled later but never twice.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;

use crate::attributes::{StringTypes, TypeAttributes};
use crate::error::{GraphError, Result};
use crate::internal_assert;
use crate::type_graph::{TypeGraph, TypeRef};
use crate::types::{ClassProperty, ObjectData, ObjectKind, PrimitiveKind, Type, TypeIdentity};

static NEXT_GRAPH_SERIAL: AtomicU32 = AtomicU32::new(1);

fn next_serial() -> u32 {
    NEXT_GRAPH_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Whether transformed-string kinds are preserved or lowered to plain
/// `string` before the builder caches them.
#[derive(Clone, Debug, Default)]
pub struct StringTypeMapping {
    lowered: BTreeSet<PrimitiveKind>,
}

impl StringTypeMapping {
    /// Preserve every transformed-string kind.
    pub fn preserve_all() -> StringTypeMapping {
        StringTypeMapping::default()
    }

    /// Lower every transformed-string kind to plain `string`.
    pub fn lower_all() -> StringTypeMapping {
        StringTypeMapping {
            lowered: PrimitiveKind::ALL_TRANSFORMED.into_iter().collect(),
        }
    }

    pub fn lower(mut self, kind: PrimitiveKind) -> StringTypeMapping {
        internal_assert!(
            kind.is_transformed_string(),
            "{:?} cannot be lowered to string",
            kind
        );
        self.lowered.insert(kind);
        self
    }

    pub fn apply(&self, kind: PrimitiveKind) -> PrimitiveKind {
        if self.lowered.contains(&kind) {
            PrimitiveKind::String
        } else {
            kind
        }
    }
}

pub struct TypeBuilder {
    serial: u32,
    string_type_mapping: StringTypeMapping,
    types: Vec<Option<Type>>,
    attributes: Vec<TypeAttributes>,
    top_levels: IndexMap<String, TypeRef>,
    type_for_identity: HashMap<TypeIdentity, TypeRef>,
}

impl Default for TypeBuilder {
    fn default() -> Self {
        TypeBuilder::new(StringTypeMapping::default())
    }
}

impl TypeBuilder {
    pub fn new(string_type_mapping: StringTypeMapping) -> TypeBuilder {
        TypeBuilder {
            serial: next_serial(),
            string_type_mapping,
            types: Vec::new(),
            attributes: Vec::new(),
            top_levels: IndexMap::new(),
            type_for_identity: HashMap::new(),
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn string_type_mapping(&self) -> &StringTypeMapping {
        &self.string_type_mapping
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Reserve an index whose type body will be committed later. Used for
    /// forwarding references across cycles.
    pub fn reserve(&mut self) -> TypeRef {
        let r = TypeRef::new(self.serial, self.types.len() as u32);
        self.types.push(None);
        self.attributes.push(TypeAttributes::new());
        r
    }

    fn commit(&mut self, r: TypeRef, t: Type) {
        r.assert_graph(self.serial);
        internal_assert!(
            self.types[r.index()].is_none(),
            "type {:?} committed twice",
            r
        );
        self.types[r.index()] = Some(t);
    }

    /// The committed type behind a ref, if any.
    pub fn lookup(&self, r: TypeRef) -> Option<&Type> {
        r.assert_graph(self.serial);
        self.types[r.index()].as_ref()
    }

    pub fn attributes_of(&self, r: TypeRef) -> &TypeAttributes {
        r.assert_graph(self.serial);
        &self.attributes[r.index()]
    }

    /// Identity-deduplicating insertion. On a hit the caller's
    /// non-identity attributes are added to the cached type; if the caller
    /// holds a forwarding ref it is committed as a single-member
    /// intersection forwarding to the hit. On a miss the type is committed
    /// to the forwarding ref (or a fresh one) and registered.
    pub fn get_or_add_type(
        &mut self,
        t: Type,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        match t.identity(&attributes) {
            None => self.add_unique_type(t, attributes, forwarding),
            Some(identity) => {
                if let Some(&hit) = self.type_for_identity.get(&identity) {
                    let (_, rest) = attributes.split_identity();
                    if !rest.is_empty() {
                        self.add_attributes(hit, rest);
                    }
                    match forwarding {
                        None => hit,
                        Some(fwd) => {
                            self.commit(
                                fwd,
                                Type::Intersection {
                                    members: Some(BTreeSet::from([hit])),
                                },
                            );
                            fwd
                        }
                    }
                } else {
                    let r = match forwarding {
                        Some(fwd) => fwd,
                        None => self.reserve(),
                    };
                    self.commit(r, t);
                    self.store_attributes(r, attributes);
                    self.type_for_identity.insert(identity, r);
                    r
                }
            }
        }
    }

    /// Insertion that never consults or populates the identity cache.
    pub fn add_unique_type(
        &mut self,
        t: Type,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        let r = match forwarding {
            Some(fwd) => fwd,
            None => self.reserve(),
        };
        self.commit(r, t);
        self.store_attributes(r, attributes);
        r
    }

    fn store_attributes(&mut self, r: TypeRef, attributes: TypeAttributes) {
        if !attributes.is_empty() {
            self.attributes[r.index()] = attributes;
        }
    }

    /// Union additional attributes into a committed type. Identity-affecting
    /// kinds may not change after the fact: they must be identical to what
    /// the type already carries, or absent from it.
    pub fn add_attributes(&mut self, r: TypeRef, attributes: TypeAttributes) {
        r.assert_graph(self.serial);
        if attributes.is_empty() {
            return;
        }
        {
            let existing = &self.attributes[r.index()];
            for (kind, value) in attributes.iter() {
                if kind.spec().in_identity() {
                    match existing.get(*kind) {
                        None => {}
                        Some(current) => internal_assert!(
                            current == value,
                            "identity-affecting attribute {} changed after commit",
                            kind.name()
                        ),
                    }
                }
            }
        }
        let combined = self.attributes[r.index()]
            .combine_with(&attributes, crate::attributes::CombinationKind::Union);
        self.attributes[r.index()] = combined;
    }

    // ------------------------------------------------------------------
    // Factory methods
    // ------------------------------------------------------------------

    pub fn get_primitive_type(&mut self, kind: PrimitiveKind, attributes: TypeAttributes) -> TypeRef {
        self.get_primitive_type_with(kind, attributes, None)
    }

    pub fn get_primitive_type_with(
        &mut self,
        kind: PrimitiveKind,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        let mapped = self.string_type_mapping.apply(kind);
        if mapped == PrimitiveKind::String {
            return self.get_string_type_with(attributes, None, forwarding);
        }
        self.get_or_add_type(Type::Primitive(mapped), attributes, forwarding)
    }

    /// A string type always carries a string-types attribute; restricted
    /// strings stay distinct from unrestricted ones through identity.
    pub fn get_string_type(
        &mut self,
        attributes: TypeAttributes,
        string_types: Option<StringTypes>,
    ) -> TypeRef {
        self.get_string_type_with(attributes, string_types, None)
    }

    pub fn get_string_type_with(
        &mut self,
        attributes: TypeAttributes,
        string_types: Option<StringTypes>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        let attributes = match (string_types, attributes.string_types()) {
            (Some(st), None) => {
                attributes.with(crate::attributes::AttributeValue::StringTypes(st))
            }
            (Some(st), Some(existing)) => {
                let merged = existing.union_with(&st);
                attributes.with(crate::attributes::AttributeValue::StringTypes(merged))
            }
            (None, Some(_)) => attributes,
            (None, None) => attributes.with(crate::attributes::AttributeValue::StringTypes(
                StringTypes::unrestricted(),
            )),
        };
        self.get_or_add_type(Type::Primitive(PrimitiveKind::String), attributes, forwarding)
    }

    pub fn get_enum_type(&mut self, attributes: TypeAttributes, cases: BTreeSet<String>) -> TypeRef {
        self.get_enum_type_with(attributes, cases, None)
    }

    pub fn get_enum_type_with(
        &mut self,
        attributes: TypeAttributes,
        cases: BTreeSet<String>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        self.get_or_add_type(Type::Enum { cases }, attributes, forwarding)
    }

    pub fn get_array_type(&mut self, attributes: TypeAttributes, items: TypeRef) -> TypeRef {
        self.get_array_type_with(attributes, items, None)
    }

    pub fn get_array_type_with(
        &mut self,
        attributes: TypeAttributes,
        items: TypeRef,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        items.assert_graph(self.serial);
        self.get_or_add_type(Type::Array { items: Some(items) }, attributes, forwarding)
    }

    /// An array whose item type is committed later with `set_array_items`.
    pub fn get_unique_array_type(&mut self, attributes: TypeAttributes) -> TypeRef {
        self.add_unique_type(Type::Array { items: None }, attributes, None)
    }

    pub fn get_map_type(&mut self, attributes: TypeAttributes, values: TypeRef) -> TypeRef {
        self.get_map_type_with(attributes, values, None)
    }

    pub fn get_map_type_with(
        &mut self,
        attributes: TypeAttributes,
        values: TypeRef,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        values.assert_graph(self.serial);
        self.get_or_add_type(Type::Object(ObjectData::map(values)), attributes, forwarding)
    }

    pub fn get_class_type(
        &mut self,
        attributes: TypeAttributes,
        properties: BTreeMap<String, ClassProperty>,
    ) -> TypeRef {
        self.get_class_type_with(attributes, properties, None)
    }

    pub fn get_class_type_with(
        &mut self,
        attributes: TypeAttributes,
        properties: BTreeMap<String, ClassProperty>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        for p in properties.values() {
            p.type_ref.assert_graph(self.serial);
        }
        self.get_or_add_type(
            Type::Object(ObjectData::class(properties, true)),
            attributes,
            forwarding,
        )
    }

    pub fn get_unique_class_type(
        &mut self,
        attributes: TypeAttributes,
        is_fixed: bool,
        properties: Option<BTreeMap<String, ClassProperty>>,
    ) -> TypeRef {
        self.get_unique_class_type_with(attributes, is_fixed, properties, None)
    }

    pub fn get_unique_class_type_with(
        &mut self,
        attributes: TypeAttributes,
        is_fixed: bool,
        properties: Option<BTreeMap<String, ClassProperty>>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        self.add_unique_type(
            Type::Object(ObjectData {
                object_kind: ObjectKind::Class,
                is_fixed,
                properties,
                additional_properties: None,
            }),
            attributes,
            forwarding,
        )
    }

    pub fn get_unique_object_type(
        &mut self,
        attributes: TypeAttributes,
        properties: Option<BTreeMap<String, ClassProperty>>,
        additional_properties: Option<TypeRef>,
    ) -> TypeRef {
        self.get_unique_object_type_with(attributes, properties, additional_properties, None)
    }

    pub fn get_unique_object_type_with(
        &mut self,
        attributes: TypeAttributes,
        properties: Option<BTreeMap<String, ClassProperty>>,
        additional_properties: Option<TypeRef>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        if let Some(a) = additional_properties {
            a.assert_graph(self.serial);
        }
        self.add_unique_type(
            Type::Object(ObjectData::full(properties, additional_properties)),
            attributes,
            forwarding,
        )
    }

    pub fn get_union_type(
        &mut self,
        attributes: TypeAttributes,
        members: BTreeSet<TypeRef>,
    ) -> TypeRef {
        self.get_union_type_with(attributes, members, None)
    }

    pub fn get_union_type_with(
        &mut self,
        attributes: TypeAttributes,
        members: BTreeSet<TypeRef>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        internal_assert!(!members.is_empty(), "unions must have at least one member");
        for &m in &members {
            m.assert_graph(self.serial);
        }
        self.get_or_add_type(
            Type::Union {
                members: Some(members),
            },
            attributes,
            forwarding,
        )
    }

    pub fn get_unique_union_type(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
    ) -> TypeRef {
        self.get_unique_union_type_with(attributes, members, None)
    }

    pub fn get_unique_union_type_with(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        self.add_unique_type(Type::Union { members }, attributes, forwarding)
    }

    pub fn get_intersection_type(
        &mut self,
        attributes: TypeAttributes,
        members: BTreeSet<TypeRef>,
    ) -> TypeRef {
        for &m in &members {
            m.assert_graph(self.serial);
        }
        self.get_or_add_type(
            Type::Intersection {
                members: Some(members),
            },
            attributes,
            None,
        )
    }

    pub fn get_unique_intersection_type(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
    ) -> TypeRef {
        self.get_unique_intersection_type_with(attributes, members, None)
    }

    pub fn get_unique_intersection_type_with(
        &mut self,
        attributes: TypeAttributes,
        members: Option<BTreeSet<TypeRef>>,
        forwarding: Option<TypeRef>,
    ) -> TypeRef {
        self.add_unique_type(Type::Intersection { members }, attributes, forwarding)
    }

    // ------------------------------------------------------------------
    // Set-once mutators
    // ------------------------------------------------------------------

    pub fn set_array_items(&mut self, r: TypeRef, items: TypeRef) {
        r.assert_graph(self.serial);
        items.assert_graph(self.serial);
        match &mut self.types[r.index()] {
            Some(Type::Array { items: slot }) => {
                internal_assert!(slot.is_none(), "array items set twice on {:?}", r);
                *slot = Some(items);
            }
            other => internal_assert!(false, "set_array_items on {:?}", other),
        }
    }

    pub fn set_object_properties(
        &mut self,
        r: TypeRef,
        properties: BTreeMap<String, ClassProperty>,
    ) {
        r.assert_graph(self.serial);
        for p in properties.values() {
            p.type_ref.assert_graph(self.serial);
        }
        match &mut self.types[r.index()] {
            Some(Type::Object(data)) => {
                internal_assert!(
                    data.properties.is_none(),
                    "object properties set twice on {:?}",
                    r
                );
                data.properties = Some(properties);
            }
            other => internal_assert!(false, "set_object_properties on {:?}", other),
        }
    }

    pub fn set_set_operation_members(&mut self, r: TypeRef, members: BTreeSet<TypeRef>) {
        r.assert_graph(self.serial);
        for &m in &members {
            m.assert_graph(self.serial);
        }
        match &mut self.types[r.index()] {
            Some(Type::Union { members: slot }) => {
                internal_assert!(
                    slot.is_none(),
                    "set-operation members set twice on {:?}",
                    r
                );
                internal_assert!(!members.is_empty(), "unions must have at least one member");
                *slot = Some(members);
            }
            Some(Type::Intersection { members: slot }) => {
                internal_assert!(
                    slot.is_none(),
                    "set-operation members set twice on {:?}",
                    r
                );
                *slot = Some(members);
            }
            other => internal_assert!(false, "set_set_operation_members on {:?}", other),
        }
    }

    // ------------------------------------------------------------------
    // Top levels and freezing
    // ------------------------------------------------------------------

    pub fn add_top_level(&mut self, name: impl Into<String>, r: TypeRef) -> Result<()> {
        r.assert_graph(self.serial);
        let name = name.into();
        if self.top_levels.contains_key(&name) {
            return Err(GraphError::internal(format!(
                "duplicate top-level name \"{}\"",
                name
            )));
        }
        self.top_levels.insert(name, r);
        Ok(())
    }

    pub fn top_levels(&self) -> &IndexMap<String, TypeRef> {
        &self.top_levels
    }

    /// Freeze into an immutable graph. Every reserved index must have been
    /// committed.
    pub fn finish(self) -> TypeGraph {
        let mut types = Vec::with_capacity(self.types.len());
        for (index, slot) in self.types.into_iter().enumerate() {
            match slot {
                Some(t) => types.push(t),
                None => {
                    internal_assert!(false, "type index {} was reserved but never committed", index);
                    unreachable!()
                }
            }
        }
        TypeGraph::new(self.serial, types, self.attributes, self.top_levels)
    }
}
