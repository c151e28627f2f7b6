//! Union flattening.
//!
//! Every non-canonical union is expanded to its transitive leaf members
//! and rebuilt canonically; unions whose expansions are equal flatten into
//! one type. Groups touching an intersection are left for intersection
//! resolution and reported so the driver keeps iterating.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use typeforge_core::error::Result;
use typeforge_core::union_builder::{
    attributes_for_types, TypeRefUnionBuilder, UnionAccumulator, UnionBuilderLike,
};
use typeforge_core::{PipelineConfig, StringTypeMapping, Type, TypeAttributes, TypeGraph, TypeRef};

pub struct FlattenOutcome {
    pub graph: TypeGraph,
    pub changed: bool,
    /// Some group contained an intersection and was skipped.
    pub found_intersection: bool,
}

/// Leaf members reached through nested unions, or `None` when an
/// intersection is reachable (the group is not flattenable yet).
fn expanded_members(graph: &TypeGraph, union: TypeRef) -> Option<BTreeSet<TypeRef>> {
    let mut leaves = BTreeSet::new();
    let mut stack = vec![union];
    let mut seen = HashSet::new();
    while let Some(r) = stack.pop() {
        if !seen.insert(r) {
            continue;
        }
        match graph.resolve(r) {
            Type::Union { members: Some(members) } => stack.extend(members.iter().copied()),
            Type::Intersection { .. } => return None,
            _ => {
                leaves.insert(r);
            }
        }
    }
    Some(leaves)
}

pub fn flatten_unions(graph: TypeGraph, config: &PipelineConfig) -> Result<FlattenOutcome> {
    let mut found_intersection = false;
    // expansion -> unions that flatten together
    let mut groups_by_expansion: BTreeMap<BTreeSet<TypeRef>, Vec<TypeRef>> = BTreeMap::new();
    for r in graph.reachable_refs() {
        if let Type::Union { members: Some(members) } = graph.resolve(r) {
            if graph.is_canonical_union(members) {
                continue;
            }
            match expanded_members(&graph, r) {
                Some(expansion) => groups_by_expansion.entry(expansion).or_default().push(r),
                None => found_intersection = true,
            }
        }
    }

    if groups_by_expansion.is_empty() {
        return Ok(FlattenOutcome {
            graph,
            changed: false,
            found_intersection,
        });
    }

    let plans: Vec<(Vec<TypeRef>, BTreeSet<TypeRef>)> = groups_by_expansion
        .into_iter()
        .map(|(expansion, unions)| (unions, expansion))
        .collect();
    debug!(groups = plans.len(), "flattening unions");

    let groups: Vec<Vec<TypeRef>> = plans.iter().map(|(unions, _)| unions.clone()).collect();
    let conflate = config.conflate_numbers;
    let outcome = graph.rewrite(
        "flatten unions",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let original = rewriter.original();
            let (leaf_attributes, root_attributes) = attributes_for_types(original, group);
            let expansion = plans
                .iter()
                .find(|(unions, _)| unions.as_slice() == group)
                .map(|(_, expansion)| expansion.clone())
                .unwrap_or_default();

            let mut accumulator = UnionAccumulator::new(conflate);
            for leaf in expansion {
                let extra = leaf_attributes
                    .get(&leaf)
                    .cloned()
                    .unwrap_or_else(TypeAttributes::new);
                accumulator.add_type_ref(original, leaf, extra);
            }
            let mut union_builder = TypeRefUnionBuilder::new(rewriter, conflate);
            union_builder.build_union(accumulator, true, root_attributes, Some(forwarding))
        },
    )?;

    Ok(FlattenOutcome {
        graph: outcome.graph,
        changed: true,
        found_intersection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeforge_core::{PrimitiveKind, TypeBuilder, TypeKind};

    #[test]
    fn test_nested_union_flattens_to_canonical() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let inner = builder.get_unique_union_type(
            TypeAttributes::new(),
            Some(BTreeSet::from([int, bool_])),
        );
        let outer = builder.get_unique_union_type(
            TypeAttributes::new(),
            Some(BTreeSet::from([inner, null])),
        );
        builder.add_top_level("Top", outer).unwrap();
        let graph = builder.finish();

        let outcome = flatten_unions(graph, &PipelineConfig::default()).unwrap();
        assert!(outcome.changed);
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        let members = graph.resolve(top).set_operation_members().clone();
        assert_eq!(members.len(), 3);
        assert!(graph.is_canonical_union(&members));
    }

    #[test]
    fn test_single_member_union_collapses() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let union =
            builder.get_unique_union_type(TypeAttributes::new(), Some(BTreeSet::from([int])));
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();

        let outcome = flatten_unions(graph, &PipelineConfig::default()).unwrap();
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Integer);
    }

    #[test]
    fn test_canonical_union_is_untouched() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let union = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([int, null]));
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();

        let outcome = flatten_unions(graph, &PipelineConfig::default()).unwrap();
        assert!(!outcome.changed);
        assert!(!outcome.found_intersection);
    }

    #[test]
    fn test_idempotent_after_one_run() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let inner = builder.get_unique_union_type(
            TypeAttributes::new(),
            Some(BTreeSet::from([int, bool_])),
        );
        let outer = builder.get_unique_union_type(
            TypeAttributes::new(),
            Some(BTreeSet::from([inner, int])),
        );
        builder.add_top_level("Top", outer).unwrap();
        let graph = builder.finish();

        let first = flatten_unions(graph, &PipelineConfig::default()).unwrap();
        assert!(first.changed);
        let second = flatten_unions(first.graph, &PipelineConfig::default()).unwrap();
        assert!(!second.changed);
    }
}
