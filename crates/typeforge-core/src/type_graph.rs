//! The frozen type arena: an ordered array of types keyed by [`TypeRef`],
//! a parallel attribute array, and the insertion-ordered top-level map.
//!
//! Graphs are immutable once built; every mutation produces a new graph
//! through [`crate::rewrite`]. Refs are `(graph serial, index)` pairs and
//! assert their graph at every use, so a ref can never silently read from
//! the wrong arena.

use std::collections::{BTreeSet, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::attributes::TypeAttributes;
use crate::error::Result;
use crate::graph::Graph;
use crate::types::{ObjectKind, PrimitiveKind, Type, TypeKind};
use crate::{internal_assert, internal_error};

/// Opaque stable handle to a type within one graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeRef {
    serial: u32,
    index: u32,
}

impl TypeRef {
    pub(crate) fn new(serial: u32, index: u32) -> TypeRef {
        TypeRef { serial, index }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn graph_serial(self) -> u32 {
        self.serial
    }

    pub(crate) fn assert_graph(self, serial: u32) {
        internal_assert!(
            self.serial == serial,
            "type ref #{} belongs to graph {} but was used with graph {}",
            self.index,
            self.serial,
            serial
        );
    }

    #[cfg(test)]
    pub(crate) fn for_tests(serial: u32, index: u32) -> TypeRef {
        TypeRef { serial, index }
    }
}

impl std::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}#{}", self.serial, self.index)
    }
}

/// Maps refs from an old graph into a new one; implemented by the graph
/// rewriter and consumed by attribute reconstitution.
pub trait RefMapper {
    fn map_ref(&mut self, r: TypeRef) -> Result<TypeRef>;
}

/// Named types a renderer declares, separated by family.
#[derive(Debug, Default)]
pub struct SeparatedNamedTypes {
    pub objects: Vec<TypeRef>,
    pub enums: Vec<TypeRef>,
    pub unions: Vec<TypeRef>,
}

#[derive(Debug)]
pub struct TypeGraph {
    serial: u32,
    types: Vec<Type>,
    attributes: Vec<TypeAttributes>,
    top_levels: IndexMap<String, TypeRef>,
}

impl TypeGraph {
    pub(crate) fn new(
        serial: u32,
        types: Vec<Type>,
        attributes: Vec<TypeAttributes>,
        top_levels: IndexMap<String, TypeRef>,
    ) -> TypeGraph {
        internal_assert!(
            types.len() == attributes.len(),
            "graph has {} types but {} attribute entries",
            types.len(),
            attributes.len()
        );
        TypeGraph {
            serial,
            types,
            attributes,
            top_levels,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn resolve(&self, r: TypeRef) -> &Type {
        r.assert_graph(self.serial);
        &self.types[r.index()]
    }

    pub fn attributes(&self, r: TypeRef) -> &TypeAttributes {
        r.assert_graph(self.serial);
        &self.attributes[r.index()]
    }

    pub fn top_levels(&self) -> &IndexMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn type_ref(&self, index: usize) -> TypeRef {
        internal_assert!(index < self.types.len(), "type index {} out of range", index);
        TypeRef::new(self.serial, index as u32)
    }

    /// Every type in the arena, in index order, reachable or not.
    pub fn all_type_refs(&self) -> impl Iterator<Item = TypeRef> + '_ {
        (0..self.types.len()).map(|i| TypeRef::new(self.serial, i as u32))
    }

    /// Structural children plus children carried by attributes.
    pub fn children_of(&self, r: TypeRef) -> Vec<TypeRef> {
        let mut children = self.resolve(r).non_attribute_children();
        children.extend(self.attributes(r).children());
        children
    }

    /// Refs reachable from the top levels, in deterministic BFS order.
    pub fn reachable_refs(&self) -> Vec<TypeRef> {
        let mut seen: HashSet<TypeRef> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<TypeRef> = self.top_levels.values().copied().collect();
        while let Some(r) = queue.pop_front() {
            if !seen.insert(r) {
                continue;
            }
            order.push(r);
            for child in self.children_of(r) {
                if !seen.contains(&child) {
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Reachable nameable types, separated by family.
    pub fn all_named_types_separated(&self) -> SeparatedNamedTypes {
        let mut separated = SeparatedNamedTypes::default();
        for r in self.reachable_refs() {
            match self.resolve(r).kind() {
                TypeKind::Class | TypeKind::Object | TypeKind::Map => separated.objects.push(r),
                TypeKind::Enum => separated.enums.push(r),
                TypeKind::Union => separated.unions.push(r),
                _ => {}
            }
        }
        separated
    }

    /// Nullability per kind. Intersections are not nullable-queryable.
    pub fn is_nullable(&self, r: TypeRef) -> bool {
        match self.resolve(r) {
            Type::Primitive(k) => matches!(
                k,
                PrimitiveKind::Null | PrimitiveKind::Any | PrimitiveKind::None
            ),
            Type::Union { members: Some(m) } => m
                .iter()
                .any(|&member| self.resolve(member).kind() == TypeKind::Null),
            Type::Union { members: None } => {
                internal_error!("nullability of a union with unset members")
            }
            Type::Intersection { .. } => {
                internal_error!("nullability is not defined on intersections")
            }
            _ => false,
        }
    }

    /// A union is canonical when it has more than one member, all member
    /// kinds are distinct, no member is a set operation or `none`/`any`,
    /// it does not mix `string` with `enum`, and it holds at most one of
    /// the object family.
    pub fn is_canonical_union(&self, members: &BTreeSet<TypeRef>) -> bool {
        if members.len() <= 1 {
            return false;
        }
        let mut kinds: BTreeSet<TypeKind> = BTreeSet::new();
        for &m in members {
            let kind = self.resolve(m).kind();
            if !kinds.insert(kind) {
                return false;
            }
        }
        if kinds
            .iter()
            .any(|k| k.is_set_operation() || matches!(k, TypeKind::None | TypeKind::Any))
        {
            return false;
        }
        if kinds.contains(&TypeKind::String) && kinds.contains(&TypeKind::Enum) {
            return false;
        }
        let object_family = kinds.iter().filter(|k| k.is_object_like()).count();
        object_family <= 1
    }

    /// Pairwise structural compatibility by BFS over child pairs, memoized
    /// on canonically ordered index pairs. With `conflate_numbers`, integer
    /// and double are compatible.
    pub fn structurally_compatible(
        &self,
        a: TypeRef,
        b: TypeRef,
        conflate_numbers: bool,
    ) -> bool {
        let mut visited: HashSet<(u32, u32)> = HashSet::new();
        let mut queue: VecDeque<(TypeRef, TypeRef)> = VecDeque::from([(a, b)]);
        while let Some((x, y)) = queue.pop_front() {
            let key = if x.index() <= y.index() {
                (x.index() as u32, y.index() as u32)
            } else {
                (y.index() as u32, x.index() as u32)
            };
            if !visited.insert(key) {
                continue;
            }
            if !self.structural_equality_step(x, y, conflate_numbers, &mut queue) {
                return false;
            }
        }
        true
    }

    /// One comparison step: checks the kind-specific shape of the pair and
    /// enqueues child pairs for further comparison.
    fn structural_equality_step(
        &self,
        a: TypeRef,
        b: TypeRef,
        conflate_numbers: bool,
        queue: &mut VecDeque<(TypeRef, TypeRef)>,
    ) -> bool {
        let ta = self.resolve(a);
        let tb = self.resolve(b);
        match (ta, tb) {
            (Type::Primitive(ka), Type::Primitive(kb)) => {
                ka == kb || (conflate_numbers && ka.is_number() && kb.is_number())
            }
            (Type::Enum { cases: ca }, Type::Enum { cases: cb }) => ca == cb,
            (Type::Array { .. }, Type::Array { .. }) => {
                queue.push_back((ta.array_items(), tb.array_items()));
                true
            }
            (Type::Object(da), Type::Object(db)) => {
                if da.object_kind != db.object_kind {
                    return false;
                }
                match da.object_kind {
                    ObjectKind::Map => match (da.additional_properties, db.additional_properties) {
                        (Some(x), Some(y)) => {
                            queue.push_back((x, y));
                            true
                        }
                        _ => internal_error!("map without committed values in comparison"),
                    },
                    ObjectKind::Class | ObjectKind::Object => {
                        let pa = da.properties();
                        let pb = db.properties();
                        if pa.len() != pb.len() {
                            return false;
                        }
                        for ((na, ca), (nb, cb)) in pa.iter().zip(pb.iter()) {
                            if na != nb || ca.is_optional != cb.is_optional {
                                return false;
                            }
                            queue.push_back((ca.type_ref, cb.type_ref));
                        }
                        match (da.additional_properties, db.additional_properties) {
                            (None, None) => true,
                            (Some(x), Some(y)) => {
                                queue.push_back((x, y));
                                true
                            }
                            _ => false,
                        }
                    }
                }
            }
            (Type::Union { .. }, Type::Union { .. })
            | (Type::Intersection { .. }, Type::Intersection { .. }) => {
                let ma = ta.set_operation_members();
                let mb = tb.set_operation_members();
                if ma.len() != mb.len() {
                    return false;
                }
                // Member sets pair up by kind; canonical set operations have
                // at most one member per kind.
                let mut by_kind_a: Vec<(TypeKind, TypeRef)> =
                    ma.iter().map(|&m| (self.resolve(m).kind(), m)).collect();
                let mut by_kind_b: Vec<(TypeKind, TypeRef)> =
                    mb.iter().map(|&m| (self.resolve(m).kind(), m)).collect();
                by_kind_a.sort();
                by_kind_b.sort();
                for ((ka, ra), (kb, rb)) in by_kind_a.iter().zip(by_kind_b.iter()) {
                    let conflated = conflate_numbers && ka.primitive().map_or(false, |p| p.is_number())
                        && kb.primitive().map_or(false, |p| p.is_number());
                    if ka != kb && !conflated {
                        return false;
                    }
                    queue.push_back((*ra, *rb));
                }
                true
            }
            _ => false,
        }
    }

    /// Restrict the graph to the given children function and lift it into
    /// the generic [`Graph`] for SCC and traversal work.
    pub fn make_graph<F>(&self, children_of: F) -> Graph<TypeRef>
    where
        F: Fn(&TypeGraph, TypeRef) -> Vec<TypeRef>,
    {
        let nodes: Vec<TypeRef> = self.all_type_refs().collect();
        let successors: Vec<Vec<usize>> = nodes
            .iter()
            .map(|&r| {
                let mut succs = Vec::new();
                for child in children_of(self, r) {
                    child.assert_graph(self.serial);
                    if !succs.contains(&child.index()) {
                        succs.push(child.index());
                    }
                }
                succs
            })
            .collect();
        Graph::from_successors(nodes, successors, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeBuilder;
    use crate::types::ClassProperty;

    #[test]
    fn test_refs_assert_their_graph() {
        let mut builder = TypeBuilder::default();
        let r = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        builder.add_top_level("Top", r).unwrap();
        let graph = builder.finish();

        let mut other = TypeBuilder::default();
        let foreign = other.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| graph.resolve(foreign)));
        assert!(result.is_err());
    }

    #[test]
    fn test_nullability() {
        let mut builder = TypeBuilder::default();
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let union = builder.get_union_type(
            TypeAttributes::new(),
            BTreeSet::from([null, int]),
        );
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();

        let union_ref = graph.top_levels()["Top"];
        assert!(graph.is_nullable(union_ref));
        let int_ref = graph
            .all_type_refs()
            .find(|&r| graph.resolve(r).kind() == TypeKind::Integer)
            .unwrap();
        assert!(!graph.is_nullable(int_ref));
    }

    #[test]
    fn test_canonical_union() {
        let mut builder = TypeBuilder::default();
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let any = builder.get_primitive_type(PrimitiveKind::Any, TypeAttributes::new());
        let good = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([null, int]));
        let bad = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([int, any]));
        builder.add_top_level("Good", good).unwrap();
        builder.add_top_level("Bad", bad).unwrap();
        let graph = builder.finish();

        let good_members = graph.resolve(graph.top_levels()["Good"]).set_operation_members().clone();
        let bad_members = graph.resolve(graph.top_levels()["Bad"]).set_operation_members().clone();
        assert!(graph.is_canonical_union(&good_members));
        assert!(!graph.is_canonical_union(&bad_members));
    }

    #[test]
    fn test_structural_compatibility_with_conflation() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let dbl = builder.get_primitive_type(PrimitiveKind::Double, TypeAttributes::new());
        let c1 = builder.get_class_type(
            TypeAttributes::new(),
            [("x".to_string(), ClassProperty::new(int, false))].into(),
        );
        let c2 = builder.get_class_type(
            TypeAttributes::new(),
            [("x".to_string(), ClassProperty::new(dbl, false))].into(),
        );
        builder.add_top_level("A", c1).unwrap();
        builder.add_top_level("B", c2).unwrap();
        let graph = builder.finish();

        let a = graph.top_levels()["A"];
        let b = graph.top_levels()["B"];
        assert!(graph.structurally_compatible(a, b, true));
        assert!(!graph.structurally_compatible(a, b, false));
    }

    #[test]
    fn test_recursive_compatibility_terminates() {
        let mut builder = TypeBuilder::default();
        let class = builder.get_unique_class_type(TypeAttributes::new(), true, None);
        builder.set_object_properties(
            class,
            [("next".to_string(), ClassProperty::new(class, true))].into(),
        );
        builder.add_top_level("Node", class).unwrap();
        let graph = builder.finish();
        let r = graph.top_levels()["Node"];
        assert!(graph.structurally_compatible(r, r, false));
    }
}
