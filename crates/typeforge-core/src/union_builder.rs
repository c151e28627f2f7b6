//! Two-phase union and intersection assembly.
//!
//! Phase 1, the [`UnionAccumulator`], is fed one type at a time and
//! partitions what it sees by kind, merging attributes per partition under
//! union composition. Phase 2, a [`UnionBuilderLike`] implementation,
//! materializes the accumulated kinds into a single type or a fresh union.
//! Kind conflicts are reconciled when the accumulator is drained: number
//! conflation, `any` absorption, and enum-into-string movement.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::attributes::{AttributeValue, CombinationKind, StringTypes, TypeAttributes};
use crate::builder::TypeBuilder;
use crate::error::{GraphError, Result};
use crate::internal_error;
use crate::rewrite::GraphRewriter;
use crate::type_graph::{TypeGraph, TypeRef};
use crate::types::{ClassProperty, PrimitiveKind, Type, TypeKind};

pub struct UnionAccumulator<A, O> {
    conflate_numbers: bool,
    primitives: BTreeMap<PrimitiveKind, Vec<TypeAttributes>>,
    enum_cases: BTreeSet<String>,
    enum_attributes: Vec<TypeAttributes>,
    arrays: Vec<A>,
    array_attributes: Vec<TypeAttributes>,
    objects: Vec<O>,
    object_attributes: Vec<TypeAttributes>,
    lost_type_attributes: bool,
}

/// The accumulator's drained state: reconciled member kinds with their
/// attributes, plus the raw per-kind payloads phase 2 materializes from.
pub struct AccumulatedMembers<A, O> {
    pub entries: Vec<(TypeKind, TypeAttributes)>,
    pub enum_cases: BTreeSet<String>,
    pub arrays: Vec<A>,
    pub objects: Vec<O>,
    pub lost_type_attributes: bool,
}

impl<A, O> UnionAccumulator<A, O> {
    pub fn new(conflate_numbers: bool) -> UnionAccumulator<A, O> {
        UnionAccumulator {
            conflate_numbers,
            primitives: BTreeMap::new(),
            enum_cases: BTreeSet::new(),
            enum_attributes: Vec::new(),
            arrays: Vec::new(),
            array_attributes: Vec::new(),
            objects: Vec::new(),
            object_attributes: Vec::new(),
            lost_type_attributes: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
            && self.enum_attributes.is_empty()
            && self.enum_cases.is_empty()
            && self.arrays.is_empty()
            && self.objects.is_empty()
    }

    pub fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }

    pub fn add_primitive(&mut self, kind: PrimitiveKind, attributes: TypeAttributes) {
        self.primitives.entry(kind).or_default().push(attributes);
    }

    pub fn add_enum(&mut self, cases: BTreeSet<String>, attributes: TypeAttributes) {
        self.enum_cases.extend(cases);
        self.enum_attributes.push(attributes);
    }

    pub fn add_array(&mut self, array: A, attributes: TypeAttributes) {
        self.arrays.push(array);
        self.array_attributes.push(attributes);
    }

    pub fn add_object(&mut self, object: O, attributes: TypeAttributes) {
        self.objects.push(object);
        self.object_attributes.push(attributes);
    }

    fn combined(groups: Vec<TypeAttributes>) -> TypeAttributes {
        TypeAttributes::combine(groups, CombinationKind::Union)
    }

    /// Drain into reconciled member kinds.
    pub fn into_parts(mut self) -> AccumulatedMembers<A, O> {
        // `any` absorbs every other member; everything else's attributes
        // move onto it and the caller learns that information was lost.
        if self.primitives.contains_key(&PrimitiveKind::Any) {
            let absorbed_others = self.primitives.len() > 1
                || !self.enum_attributes.is_empty()
                || !self.enum_cases.is_empty()
                || !self.arrays.is_empty()
                || !self.objects.is_empty();
            let mut all: Vec<TypeAttributes> = Vec::new();
            for (_, attrs) in std::mem::take(&mut self.primitives) {
                all.extend(attrs);
            }
            all.extend(std::mem::take(&mut self.enum_attributes));
            all.extend(std::mem::take(&mut self.array_attributes));
            all.extend(std::mem::take(&mut self.object_attributes));
            return AccumulatedMembers {
                entries: vec![(TypeKind::Any, Self::combined(all))],
                enum_cases: BTreeSet::new(),
                arrays: Vec::new(),
                objects: Vec::new(),
                lost_type_attributes: self.lost_type_attributes || absorbed_others,
            };
        }

        // `none` is the union identity; it disappears next to anything else.
        let member_count = self.primitives.len()
            + usize::from(!self.enum_cases.is_empty() || !self.enum_attributes.is_empty())
            + usize::from(!self.arrays.is_empty())
            + usize::from(!self.objects.is_empty());
        if member_count > 1 {
            self.primitives.remove(&PrimitiveKind::None);
        }

        // Number conflation: integer attributes move to double.
        if self.conflate_numbers
            && self.primitives.contains_key(&PrimitiveKind::Integer)
            && self.primitives.contains_key(&PrimitiveKind::Double)
        {
            let integer_attrs = self.primitives.remove(&PrimitiveKind::Integer).unwrap();
            self.primitives
                .entry(PrimitiveKind::Double)
                .or_default()
                .extend(integer_attrs);
        }

        // Enum next to a plain string: enum cases and attributes move onto
        // the string's string-types attribute.
        let have_enum = !self.enum_cases.is_empty() || !self.enum_attributes.is_empty();
        if have_enum && self.primitives.contains_key(&PrimitiveKind::String) {
            let case_types = StringTypes::restricted(
                std::mem::take(&mut self.enum_cases)
                    .into_iter()
                    .map(|c| (c, 1))
                    .collect(),
            );
            let mut moved = std::mem::take(&mut self.enum_attributes);
            moved.push(TypeAttributes::one(AttributeValue::StringTypes(case_types)));
            self.primitives
                .entry(PrimitiveKind::String)
                .or_default()
                .extend(moved);
        }

        let mut entries = Vec::new();
        for (kind, attrs) in std::mem::take(&mut self.primitives) {
            entries.push((kind.type_kind(), Self::combined(attrs)));
        }
        if !self.enum_cases.is_empty() || !self.enum_attributes.is_empty() {
            entries.push((
                TypeKind::Enum,
                Self::combined(std::mem::take(&mut self.enum_attributes)),
            ));
        }
        if !self.arrays.is_empty() {
            entries.push((
                TypeKind::Array,
                Self::combined(std::mem::take(&mut self.array_attributes)),
            ));
        }
        if !self.objects.is_empty() {
            entries.push((
                TypeKind::Object,
                Self::combined(std::mem::take(&mut self.object_attributes)),
            ));
        }

        AccumulatedMembers {
            entries,
            enum_cases: self.enum_cases,
            arrays: self.arrays,
            objects: self.objects,
            lost_type_attributes: self.lost_type_attributes,
        }
    }
}

impl UnionAccumulator<TypeRef, TypeRef> {
    /// Feed a type by ref, recursing through nested unions. The union's
    /// own attributes descend onto its members at increased distance.
    /// Intersections cannot be accumulated; resolve them first.
    pub fn add_type_ref(&mut self, graph: &TypeGraph, r: TypeRef, extra: TypeAttributes) {
        let attributes = TypeAttributes::combine(
            vec![graph.attributes(r).clone(), extra],
            CombinationKind::Union,
        );
        match graph.resolve(r) {
            Type::Primitive(kind) => self.add_primitive(*kind, attributes),
            Type::Enum { cases } => self.add_enum(cases.clone(), attributes),
            t @ Type::Array { .. } => self.add_array(t.array_items(), attributes),
            Type::Object(_) => self.add_object(r, attributes),
            Type::Union { members: Some(members) } => {
                let nested = attributes.increase_distance();
                for &m in members {
                    self.add_type_ref(graph, m, nested.clone());
                }
            }
            Type::Union { members: None } => {
                internal_error!("union with unset members fed to accumulator")
            }
            Type::Intersection { .. } => {
                internal_error!("intersections cannot be accumulated into unions")
            }
        }
    }
}

/// Phase 2: materializes accumulated members. Implementations provide the
/// payload-specific array, object, and enum construction.
pub trait UnionBuilderLike<A, O> {
    fn type_builder(&mut self) -> &mut TypeBuilder;

    /// Called when the accumulator knowingly dropped information (`any`
    /// absorption). Implementations backed by a rewriter flag it there.
    fn note_lost_type_attributes(&mut self) {}

    fn make_enum(
        &mut self,
        cases: BTreeSet<String>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef>;

    fn make_array(
        &mut self,
        arrays: Vec<A>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef>;

    fn make_object(
        &mut self,
        objects: Vec<O>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef>;

    /// Build the final type for everything the accumulator saw: a direct
    /// type when a single kind remains (with attribute distance increased),
    /// otherwise a union over freshly constructed members.
    fn build_union(
        &mut self,
        accumulator: UnionAccumulator<A, O>,
        unique: bool,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let mut parts = accumulator.into_parts();
        if parts.entries.is_empty() {
            return Err(GraphError::NoEmptyUnions);
        }
        if parts.lost_type_attributes {
            self.note_lost_type_attributes();
        }

        if parts.entries.len() == 1 {
            let (kind, kind_attributes) = parts.entries.pop().unwrap();
            let merged = TypeAttributes::combine(
                vec![attributes, kind_attributes],
                CombinationKind::Union,
            )
            .increase_distance();
            return self.materialize(kind, merged, &mut parts, forwarding);
        }

        let mut members = BTreeSet::new();
        let entries = std::mem::take(&mut parts.entries);
        for (kind, kind_attributes) in entries {
            members.insert(self.materialize(kind, kind_attributes, &mut parts, None)?);
        }
        let builder = self.type_builder();
        Ok(if unique {
            builder.get_unique_union_type_with(attributes, Some(members), forwarding)
        } else {
            builder.get_union_type_with(attributes, members, forwarding)
        })
    }

    fn materialize(
        &mut self,
        kind: TypeKind,
        attributes: TypeAttributes,
        parts: &mut AccumulatedMembers<A, O>,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        match kind {
            TypeKind::String => Ok(self
                .type_builder()
                .get_string_type_with(attributes, None, forwarding)),
            TypeKind::Enum => {
                let cases = std::mem::take(&mut parts.enum_cases);
                self.make_enum(cases, attributes, forwarding)
            }
            TypeKind::Array => {
                let arrays = std::mem::take(&mut parts.arrays);
                self.make_array(arrays, attributes, forwarding)
            }
            TypeKind::Object => {
                let objects = std::mem::take(&mut parts.objects);
                self.make_object(objects, attributes, forwarding)
            }
            _ => match kind.primitive() {
                Some(p) => Ok(self
                    .type_builder()
                    .get_primitive_type_with(p, attributes, forwarding)),
                None => internal_error!("cannot materialize union member kind {:?}", kind),
            },
        }
    }
}

/// Phase-2 implementation over type refs of a graph being rewritten:
/// single payloads reconstitute, multiple payloads union recursively.
pub struct TypeRefUnionBuilder<'r, 'g> {
    rewriter: &'r mut GraphRewriter<'g>,
    conflate_numbers: bool,
}

impl<'r, 'g> TypeRefUnionBuilder<'r, 'g> {
    pub fn new(
        rewriter: &'r mut GraphRewriter<'g>,
        conflate_numbers: bool,
    ) -> TypeRefUnionBuilder<'r, 'g> {
        TypeRefUnionBuilder {
            rewriter,
            conflate_numbers,
        }
    }

    pub fn rewriter(&mut self) -> &mut GraphRewriter<'g> {
        &mut *self.rewriter
    }

    /// Union a set of old-graph refs into the new graph: one distinct ref
    /// reconstitutes, several accumulate recursively.
    pub fn union_of_old_refs(
        &mut self,
        refs: Vec<TypeRef>,
        attributes: TypeAttributes,
        unique: bool,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let distinct: BTreeSet<TypeRef> = refs.into_iter().collect();
        if distinct.len() == 1 {
            let only = *distinct.iter().next().unwrap();
            let rebuilt = match forwarding {
                None => self.rewriter.reconstitute(only)?,
                Some(fwd) => self.rewriter.reconstitute_into(only, fwd)?,
            };
            if !attributes.is_empty() {
                self.rewriter.builder().add_attributes(rebuilt, attributes);
            }
            return Ok(rebuilt);
        }
        let mut accumulator = UnionAccumulator::new(self.conflate_numbers);
        let original = self.rewriter.original();
        for r in distinct {
            accumulator.add_type_ref(original, r, TypeAttributes::new());
        }
        self.build_union(accumulator, unique, attributes, forwarding)
    }
}

impl<'r, 'g> UnionBuilderLike<TypeRef, TypeRef> for TypeRefUnionBuilder<'r, 'g> {
    fn type_builder(&mut self) -> &mut TypeBuilder {
        self.rewriter.builder()
    }

    fn note_lost_type_attributes(&mut self) {
        self.rewriter.set_lost_type_attributes();
    }

    fn make_enum(
        &mut self,
        cases: BTreeSet<String>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        Ok(self
            .type_builder()
            .get_enum_type_with(attributes, cases, forwarding))
    }

    fn make_array(
        &mut self,
        arrays: Vec<TypeRef>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let items = self.union_of_old_refs(arrays, TypeAttributes::new(), false, None)?;
        Ok(self
            .type_builder()
            .get_array_type_with(attributes, items, forwarding))
    }

    /// Merge object-like members: property sets union (a property missing
    /// somewhere turns optional), additional-properties union when any
    /// member carries them. A lone member just reconstitutes.
    fn make_object(
        &mut self,
        objects: Vec<TypeRef>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let distinct: BTreeSet<TypeRef> = objects.iter().copied().collect();
        if distinct.len() == 1 {
            let only = *distinct.iter().next().unwrap();
            let rebuilt = match forwarding {
                None => self.rewriter.reconstitute(only)?,
                Some(fwd) => self.rewriter.reconstitute_into(only, fwd)?,
            };
            if !attributes.is_empty() {
                self.rewriter.builder().add_attributes(rebuilt, attributes);
            }
            return Ok(rebuilt);
        }

        let original = self.rewriter.original();
        let count = distinct.len();
        let mut property_sets: BTreeMap<String, (Vec<TypeRef>, bool)> = BTreeMap::new();
        let mut additional_old: Vec<TypeRef> = Vec::new();
        for &obj in &distinct {
            let data = original.resolve(obj).object_data();
            if let Some(props) = &data.properties {
                for (name, p) in props {
                    let entry = property_sets
                        .entry(name.clone())
                        .or_insert_with(|| (Vec::new(), false));
                    entry.0.push(p.type_ref);
                    entry.1 |= p.is_optional;
                }
            }
            if let Some(a) = data.additional_properties {
                additional_old.push(a);
            }
        }

        let mut properties = BTreeMap::new();
        for (name, (refs, any_optional)) in property_sets {
            let optional = any_optional || refs.len() < count;
            let type_ref = self.union_of_old_refs(refs, TypeAttributes::new(), false, None)?;
            properties.insert(name, ClassProperty::new(type_ref, optional));
        }

        let additional = if additional_old.is_empty() {
            None
        } else {
            Some(self.union_of_old_refs(additional_old, TypeAttributes::new(), false, None)?)
        };

        let builder = self.type_builder();
        Ok(match additional {
            Some(values) if properties.is_empty() => {
                builder.get_map_type_with(attributes, values, forwarding)
            }
            Some(values) => builder.get_unique_object_type_with(
                attributes,
                Some(properties),
                Some(values),
                forwarding,
            ),
            None => builder.get_unique_class_type_with(attributes, true, Some(properties), forwarding),
        })
    }
}

/// Walk the given types through nested unions and attribute each leaf with
/// the attributes of every union that funnels into just that leaf; unions
/// spreading over several leaves contribute to the root attribute set
/// instead.
pub fn attributes_for_types(
    graph: &TypeGraph,
    types: &[TypeRef],
) -> (HashMap<TypeRef, TypeAttributes>, TypeAttributes) {
    let mut union_leaves: Vec<(TypeRef, Vec<TypeRef>)> = Vec::new();
    let mut leaves: Vec<TypeRef> = Vec::new();

    fn walk(
        graph: &TypeGraph,
        r: TypeRef,
        visiting: &mut HashSet<TypeRef>,
        union_leaves: &mut Vec<(TypeRef, Vec<TypeRef>)>,
        leaves: &mut Vec<TypeRef>,
    ) -> Vec<TypeRef> {
        if !visiting.insert(r) {
            return Vec::new();
        }
        let result = match graph.resolve(r) {
            Type::Union { members: Some(members) } => {
                let mut reached = Vec::new();
                for &m in members {
                    reached.extend(walk(graph, m, visiting, union_leaves, leaves));
                }
                union_leaves.push((r, reached.clone()));
                reached
            }
            _ => {
                if !leaves.contains(&r) {
                    leaves.push(r);
                }
                vec![r]
            }
        };
        visiting.remove(&r);
        result
    }

    let mut visiting = HashSet::new();
    for &t in types {
        walk(graph, t, &mut visiting, &mut union_leaves, &mut leaves);
    }

    let mut leaf_attributes: HashMap<TypeRef, TypeAttributes> = leaves
        .iter()
        .map(|&l| (l, TypeAttributes::new()))
        .collect();
    let mut root_attributes = TypeAttributes::new();
    for (union_ref, reached) in union_leaves {
        let attrs = graph.attributes(union_ref).clone();
        if attrs.is_empty() {
            continue;
        }
        let distinct: BTreeSet<TypeRef> = reached.into_iter().collect();
        if distinct.len() == 1 {
            let leaf = *distinct.iter().next().unwrap();
            let existing = leaf_attributes.entry(leaf).or_default();
            *existing = existing.combine_with(&attrs, CombinationKind::Union);
        } else {
            root_attributes = root_attributes.combine_with(&attrs, CombinationKind::Union);
        }
    }
    (leaf_attributes, root_attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::names::TypeNames;
    use crate::attributes::MinMax;
    use crate::builder::StringTypeMapping;

    #[test]
    fn test_any_absorbs_everything() {
        let mut acc: UnionAccumulator<(), ()> = UnionAccumulator::new(false);
        acc.add_primitive(PrimitiveKind::Any, TypeAttributes::new());
        acc.add_primitive(PrimitiveKind::Integer, TypeAttributes::new());
        acc.add_enum(BTreeSet::from(["x".to_string()]), TypeAttributes::new());
        let parts = acc.into_parts();
        assert_eq!(parts.entries.len(), 1);
        assert_eq!(parts.entries[0].0, TypeKind::Any);
        assert!(parts.lost_type_attributes);
    }

    #[test]
    fn test_number_conflation_moves_attributes() {
        let mut acc: UnionAccumulator<(), ()> = UnionAccumulator::new(true);
        acc.add_primitive(
            PrimitiveKind::Integer,
            TypeAttributes::one(AttributeValue::MinMax(MinMax::new(Some(0.0), None))),
        );
        acc.add_primitive(
            PrimitiveKind::Double,
            TypeAttributes::one(AttributeValue::MinMax(MinMax::new(Some(-1.0), None))),
        );
        let parts = acc.into_parts();
        assert_eq!(parts.entries.len(), 1);
        let (kind, attrs) = &parts.entries[0];
        assert_eq!(*kind, TypeKind::Double);
        match attrs.get(crate::attributes::AttributeKind::MinMax) {
            Some(AttributeValue::MinMax(mm)) => assert_eq!(mm.min, Some(-1.0)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_enum_moves_into_string() {
        let mut acc: UnionAccumulator<(), ()> = UnionAccumulator::new(false);
        acc.add_primitive(
            PrimitiveKind::String,
            TypeAttributes::one(AttributeValue::StringTypes(StringTypes::case("on"))),
        );
        acc.add_enum(BTreeSet::from(["off".to_string()]), TypeAttributes::new());
        let parts = acc.into_parts();
        assert_eq!(parts.entries.len(), 1);
        assert_eq!(parts.entries[0].0, TypeKind::String);
        let st = parts.entries[0].1.string_types().unwrap();
        let cases = st.case_counts.as_ref().unwrap();
        assert!(cases.contains_key("on") && cases.contains_key("off"));
    }

    #[test]
    fn test_none_disappears_next_to_others() {
        let mut acc: UnionAccumulator<(), ()> = UnionAccumulator::new(false);
        acc.add_primitive(PrimitiveKind::None, TypeAttributes::new());
        acc.add_primitive(PrimitiveKind::Bool, TypeAttributes::new());
        let parts = acc.into_parts();
        assert_eq!(parts.entries.len(), 1);
        assert_eq!(parts.entries[0].0, TypeKind::Bool);
    }

    #[test]
    fn test_attributes_for_types_single_leaf_union() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let union = builder.get_unique_union_type(
            TypeAttributes::one(AttributeValue::Names(TypeNames::given("Count"))),
            Some(BTreeSet::from([int])),
        );
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();
        let union_ref = graph.top_levels()["Top"];

        let (leaf_attrs, root_attrs) = attributes_for_types(&graph, &[union_ref]);
        assert!(root_attrs.is_empty());
        let int_leaf = leaf_attrs.keys().copied().next().unwrap();
        assert_eq!(
            leaf_attrs[&int_leaf].names().unwrap().combined_name(),
            "Count"
        );
    }

    #[test]
    fn test_attributes_for_types_spreading_union_contributes_to_root() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let union = builder.get_unique_union_type(
            TypeAttributes::one(AttributeValue::Names(TypeNames::given("Value"))),
            Some(BTreeSet::from([int, bool_])),
        );
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();
        let union_ref = graph.top_levels()["Top"];

        let (_, root_attrs) = attributes_for_types(&graph, &[union_ref]);
        assert_eq!(root_attrs.names().unwrap().combined_name(), "Value");
    }
}
