//! String flattening inside unions.
//!
//! A union holding an unrestricted plain string next to transformed-string
//! members conveys no extra information through the refinements; the
//! string-like members coalesce into the single plain string with their
//! attributes merged.

use std::collections::BTreeSet;

use tracing::debug;

use typeforge_core::attributes::CombinationKind;
use typeforge_core::error::Result;
use typeforge_core::union_builder::{UnionAccumulator, UnionBuilderLike, TypeRefUnionBuilder};
use typeforge_core::{
    PipelineConfig, PrimitiveKind, StringTypeMapping, Type, TypeAttributes, TypeGraph, TypeKind,
    TypeRef,
};

fn has_unrestricted_plain_string(graph: &TypeGraph, members: &BTreeSet<TypeRef>) -> bool {
    members.iter().any(|&m| {
        graph.resolve(m).kind() == TypeKind::String
            && graph
                .attributes(m)
                .string_types()
                .map_or(true, |st| !st.is_restricted())
    })
}

fn string_like_members(graph: &TypeGraph, members: &BTreeSet<TypeRef>) -> Vec<TypeRef> {
    members
        .iter()
        .copied()
        .filter(|&m| graph.resolve(m).kind().is_string_like())
        .collect()
}

pub fn flatten_strings(graph: TypeGraph, config: &PipelineConfig) -> Result<(TypeGraph, bool)> {
    let groups: Vec<Vec<TypeRef>> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| match graph.resolve(r) {
            Type::Union { members: Some(members) } => {
                string_like_members(&graph, members).len() >= 2
                    && has_unrestricted_plain_string(&graph, members)
            }
            _ => false,
        })
        .map(|r| vec![r])
        .collect();
    if groups.is_empty() {
        return Ok((graph, false));
    }
    debug!(unions = groups.len(), "flattening union strings");

    let conflate = config.conflate_numbers;
    let outcome = graph.rewrite(
        "flatten strings",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let union_ref = group[0];
            let original = rewriter.original();
            let union_attributes = original.attributes(union_ref).clone();
            let members = original.resolve(union_ref).set_operation_members().clone();

            let mut string_attrs: Vec<TypeAttributes> = Vec::new();
            let mut accumulator = UnionAccumulator::new(conflate);
            for m in members {
                if original.resolve(m).kind().is_string_like() {
                    string_attrs.push(original.attributes(m).clone());
                } else {
                    accumulator.add_type_ref(original, m, TypeAttributes::new());
                }
            }
            let merged = TypeAttributes::combine(string_attrs, CombinationKind::Union);
            accumulator.add_primitive(PrimitiveKind::String, merged);

            let mut union_builder = TypeRefUnionBuilder::new(rewriter, conflate);
            union_builder.build_union(accumulator, true, union_attributes, Some(forwarding))
        },
    )?;
    Ok((outcome.graph, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeforge_core::TypeBuilder;

    #[test]
    fn test_transformed_strings_coalesce_into_plain_string() {
        let mut builder = TypeBuilder::default();
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let date = builder.get_primitive_type(PrimitiveKind::Date, TypeAttributes::new());
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let union = builder.get_union_type(
            TypeAttributes::new(),
            BTreeSet::from([string, date, int]),
        );
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();

        let (graph, changed) = flatten_strings(graph, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let top = graph.top_levels()["Top"];
        let members = graph.resolve(top).set_operation_members().clone();
        let kinds: BTreeSet<TypeKind> = members
            .iter()
            .map(|&m| graph.resolve(m).kind())
            .collect();
        assert_eq!(kinds, BTreeSet::from([TypeKind::String, TypeKind::Integer]));
    }

    #[test]
    fn test_without_plain_string_nothing_happens() {
        let mut builder = TypeBuilder::default();
        let date = builder.get_primitive_type(PrimitiveKind::Date, TypeAttributes::new());
        let uuid = builder.get_primitive_type(PrimitiveKind::Uuid, TypeAttributes::new());
        let union =
            builder.get_union_type(TypeAttributes::new(), BTreeSet::from([date, uuid]));
        builder.add_top_level("Top", union).unwrap();
        let graph = builder.finish();

        let (_, changed) = flatten_strings(graph, &PipelineConfig::default()).unwrap();
        assert!(!changed);
    }
}
