//! Map inference over constructed classes.
//!
//! A class whose property names look machine-generated is really a map.
//! All-digit names convert outright; small classes whose values are all
//! string-like or null are kept (they read as configuration); everything
//! else is scored with the trigram Markov chain against a power-law
//! threshold in the property count, and converts only when the property
//! value types are structurally compatible.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use typeforge_core::error::Result;
use typeforge_core::union_builder::TypeRefUnionBuilder;
use typeforge_core::{
    PipelineConfig, StringTypeMapping, Type, TypeAttributes, TypeGraph, TypeKind, TypeRef,
};

use crate::context::PipelineContext;

fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static pattern"))
}

fn non_null_cases(graph: &TypeGraph, r: TypeRef) -> Vec<TypeRef> {
    match graph.resolve(r) {
        Type::Union { members: Some(members) } => members
            .iter()
            .copied()
            .filter(|&m| graph.resolve(m).kind() != TypeKind::Null)
            .collect(),
        _ if graph.resolve(r).kind() == TypeKind::Null => Vec::new(),
        _ => vec![r],
    }
}

fn values_unify(graph: &TypeGraph, class: TypeRef, conflate_numbers: bool) -> bool {
    let props = graph.resolve(class).object_data().properties();
    let mut cases: Vec<TypeRef> = Vec::new();
    for p in props.values() {
        cases.extend(non_null_cases(graph, p.type_ref));
    }
    let Some((&first, rest)) = cases.split_first() else {
        return true;
    };
    rest.iter()
        .all(|&c| graph.structurally_compatible(first, c, conflate_numbers))
}

fn all_values_stringy_or_null(graph: &TypeGraph, class: TypeRef) -> bool {
    let props = graph.resolve(class).object_data().properties();
    props.values().all(|p| {
        non_null_cases(graph, p.type_ref)
            .into_iter()
            .all(|c| graph.resolve(c).kind().is_string_like())
    })
}

fn should_be_map(
    graph: &TypeGraph,
    class: TypeRef,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> bool {
    let props = graph.resolve(class).object_data().properties();
    if props.len() < 2 {
        return false;
    }
    let names: Vec<&str> = props.keys().map(String::as_str).collect();

    if names.iter().all(|n| digits_regex().is_match(n)) {
        return values_unify(graph, class, config.conflate_numbers);
    }
    if props.len() < config.small_class_size && all_values_stringy_or_null(graph, class) {
        return false;
    }
    let score = ctx.markov().score_all(names.iter().copied());
    if score >= config.map_probability_threshold(props.len()) {
        return false;
    }
    values_unify(graph, class, config.conflate_numbers)
}

pub fn infer_maps(
    graph: TypeGraph,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<(TypeGraph, bool)> {
    let groups: Vec<Vec<TypeRef>> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| graph.resolve(r).kind() == TypeKind::Class)
        .filter(|&r| should_be_map(&graph, r, config, ctx))
        .map(|r| vec![r])
        .collect();
    if groups.is_empty() {
        return Ok((graph, false));
    }
    debug!(classes = groups.len(), "converting classes to maps");

    let conflate = config.conflate_numbers;
    let outcome = graph.rewrite(
        "infer maps",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let class = group[0];
            let original = rewriter.original();
            let attributes = original.attributes(class).clone();
            let value_refs: Vec<TypeRef> = original
                .resolve(class)
                .object_data()
                .properties()
                .values()
                .map(|p| p.type_ref)
                .collect();
            let mut union_builder = TypeRefUnionBuilder::new(rewriter, conflate);
            let values =
                union_builder.union_of_old_refs(value_refs, TypeAttributes::new(), false, None)?;
            Ok(union_builder
                .rewriter()
                .builder()
                .get_map_type_with(attributes, values, Some(forwarding)))
        },
    )?;
    Ok((outcome.graph, true))
}
