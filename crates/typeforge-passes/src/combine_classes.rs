//! Class similarity merging.
//!
//! Classes whose property-name overlap is at least the configured fraction
//! of the larger class, and whose common properties are structurally
//! compatible, merge into one class. Clique building is greedy: each class
//! is tested against existing cliques' prototypes, most-recently-hit
//! cliques first (a recency index keeps the scan deterministic instead of
//! mutating list order mid-iteration).

use std::collections::BTreeMap;

use tracing::debug;

use typeforge_core::attributes::CombinationKind;
use typeforge_core::error::Result;
use typeforge_core::union_builder::TypeRefUnionBuilder;
use typeforge_core::{
    ClassProperty, PipelineConfig, StringTypeMapping, Type, TypeAttributes, TypeGraph, TypeKind,
    TypeRef,
};

struct Clique {
    members: Vec<TypeRef>,
    prototypes: Vec<TypeRef>,
    last_hit: usize,
}

/// Non-null cases of a type: union members minus null, or the type itself.
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

fn cases_compatible(
    graph: &TypeGraph,
    a: TypeRef,
    b: TypeRef,
    conflate_numbers: bool,
) -> bool {
    let cases_a = non_null_cases(graph, a);
    let cases_b = non_null_cases(graph, b);
    if cases_a.is_empty() || cases_b.is_empty() {
        return true;
    }
    // canonical unions hold at most one member per kind, so kind-sorted
    // sequences pair up
    if cases_a.len() != cases_b.len() {
        return false;
    }
    let mut sorted_a: Vec<(TypeKind, TypeRef)> =
        cases_a.iter().map(|&c| (graph.resolve(c).kind(), c)).collect();
    let mut sorted_b: Vec<(TypeKind, TypeRef)> =
        cases_b.iter().map(|&c| (graph.resolve(c).kind(), c)).collect();
    sorted_a.sort();
    sorted_b.sort();
    sorted_a
        .iter()
        .zip(sorted_b.iter())
        .all(|((_, ca), (_, cb))| graph.structurally_compatible(*ca, *cb, conflate_numbers))
}

fn name_overlap(graph: &TypeGraph, a: TypeRef, b: TypeRef) -> (usize, usize) {
    let pa = graph.resolve(a).object_data().properties();
    let pb = graph.resolve(b).object_data().properties();
    let common = pa.keys().filter(|k| pb.contains_key(*k)).count();
    (common, pa.len().max(pb.len()))
}

/// The relaxed rule: enough property names in common.
fn classes_similar(graph: &TypeGraph, a: TypeRef, b: TypeRef, required_overlap: f64) -> bool {
    let (common, larger) = name_overlap(graph, a, b);
    if larger == 0 {
        return false;
    }
    (common as f64) >= required_overlap * (larger as f64)
}

/// The strict rule: similar names and compatible common property types.
fn classes_compatible(
    graph: &TypeGraph,
    a: TypeRef,
    b: TypeRef,
    required_overlap: f64,
    conflate_numbers: bool,
) -> bool {
    if !classes_similar(graph, a, b, required_overlap) {
        return false;
    }
    let pa = graph.resolve(a).object_data().properties().clone();
    let pb = graph.resolve(b).object_data().properties().clone();
    pa.iter().all(|(name, prop_a)| match pb.get(name) {
        None => true,
        Some(prop_b) => cases_compatible(graph, prop_a.type_ref, prop_b.type_ref, conflate_numbers),
    })
}

fn build_cliques(graph: &TypeGraph, config: &PipelineConfig) -> Vec<Clique> {
    let classes: Vec<TypeRef> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| graph.resolve(r).kind() == TypeKind::Class)
        .collect();

    let mut cliques: Vec<Clique> = Vec::new();
    for (step, &class) in classes.iter().enumerate() {
        // most recently hit cliques first, creation order breaks ties
        let mut scan_order: Vec<usize> = (0..cliques.len()).collect();
        scan_order.sort_by_key(|&i| (std::cmp::Reverse(cliques[i].last_hit), i));

        let mut joined = false;
        for i in scan_order {
            let compatible = cliques[i].prototypes.iter().any(|&p| {
                classes_compatible(
                    graph,
                    class,
                    p,
                    config.required_overlap,
                    config.conflate_numbers,
                )
            });
            if compatible {
                cliques[i].members.push(class);
                cliques[i].prototypes.push(class);
                cliques[i].last_hit = step + 1;
                joined = true;
                break;
            }
            let similar = cliques[i]
                .prototypes
                .iter()
                .any(|&p| classes_similar(graph, class, p, config.required_overlap));
            if similar {
                cliques[i].members.push(class);
                cliques[i].last_hit = step + 1;
                joined = true;
                break;
            }
        }
        if !joined {
            cliques.push(Clique {
                members: vec![class],
                prototypes: vec![class],
                last_hit: 0,
            });
        }
    }
    cliques
}

pub fn combine_classes(
    graph: TypeGraph,
    config: &PipelineConfig,
) -> Result<(TypeGraph, bool)> {
    let groups: Vec<Vec<TypeRef>> = build_cliques(&graph, config)
        .into_iter()
        .filter(|c| c.members.len() > 1)
        .map(|c| c.members)
        .collect();
    if groups.is_empty() {
        return Ok((graph, false));
    }
    debug!(cliques = groups.len(), "combining classes");

    let conflate = config.conflate_numbers;
    let outcome = graph.rewrite(
        "combine classes",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let original = rewriter.original();
            let count = group.len();
            let mut property_sets: BTreeMap<String, (Vec<TypeRef>, bool)> = BTreeMap::new();
            let mut attributes: Vec<TypeAttributes> = Vec::new();
            for &class in group {
                attributes.push(original.attributes(class).clone());
                for (name, p) in original.resolve(class).object_data().properties() {
                    let entry = property_sets
                        .entry(name.clone())
                        .or_insert_with(|| (Vec::new(), false));
                    entry.0.push(p.type_ref);
                    entry.1 |= p.is_optional;
                }
            }
            let combined = TypeAttributes::combine(attributes, CombinationKind::Union);

            let mut union_builder = TypeRefUnionBuilder::new(rewriter, conflate);
            let mut properties = BTreeMap::new();
            for (name, (refs, any_optional)) in property_sets {
                let optional = any_optional || refs.len() < count;
                let type_ref =
                    union_builder.union_of_old_refs(refs, TypeAttributes::new(), false, None)?;
                properties.insert(name, ClassProperty::new(type_ref, optional));
            }

            Ok(union_builder.rewriter().builder().get_unique_class_type_with(
                combined,
                true,
                Some(properties),
                Some(forwarding),
            ))
        },
    )?;
    Ok((outcome.graph, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use typeforge_core::{PrimitiveKind, TypeBuilder};

    fn person_like(
        builder: &mut TypeBuilder,
        extra: Option<(&str, TypeRef)>,
    ) -> TypeRef {
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let mut props = BTreeMap::from([
            ("name".to_string(), ClassProperty::new(string, false)),
            ("age".to_string(), ClassProperty::new(int, false)),
            ("email".to_string(), ClassProperty::new(string, false)),
            ("city".to_string(), ClassProperty::new(string, false)),
        ]);
        if let Some((key, r)) = extra {
            props.insert(key.to_string(), ClassProperty::new(r, false));
        }
        builder.get_unique_class_type(TypeAttributes::new(), true, Some(props))
    }

    #[test]
    fn test_similar_classes_merge() {
        let mut builder = TypeBuilder::default();
        // a null type must exist for optional-property widening
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let a = person_like(&mut builder, None);
        let b = person_like(&mut builder, Some(("active", bool_)));
        let opt = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([null, bool_]));
        let keep_alive = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([
                ("a".to_string(), ClassProperty::new(a, false)),
                ("b".to_string(), ClassProperty::new(b, false)),
                ("opt".to_string(), ClassProperty::new(opt, true)),
            ])),
        );
        builder.add_top_level("Top", keep_alive).unwrap();
        let graph = builder.finish();

        let (graph, changed) = combine_classes(graph, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let top = graph.top_levels()["Top"];
        let props = graph.resolve(top).object_data().properties().clone();
        // both properties now point at the same merged class
        assert_eq!(props["a"].type_ref, props["b"].type_ref);
        let merged = graph.resolve(props["a"].type_ref);
        let merged_props = merged.object_data().properties();
        assert_eq!(merged_props.len(), 5);
        assert!(merged_props["active"].is_optional);
        assert!(!merged_props["name"].is_optional);
    }

    #[test]
    fn test_dissimilar_classes_stay_apart() {
        let mut builder = TypeBuilder::default();
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let a = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "name".to_string(),
                ClassProperty::new(string, false),
            )])),
        );
        let b = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "count".to_string(),
                ClassProperty::new(int, false),
            )])),
        );
        let root = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([
                ("a".to_string(), ClassProperty::new(a, false)),
                ("b".to_string(), ClassProperty::new(b, false)),
            ])),
        );
        builder.add_top_level("Top", root).unwrap();
        let graph = builder.finish();

        let (_, changed) = combine_classes(graph, &PipelineConfig::default()).unwrap();
        assert!(!changed);
    }
}
