//! String expansion.
//!
//! Restricted strings carry observed case counts and recognized
//! transformed-string kinds in their string-types attribute. This pass
//! turns that evidence into real types: enums for case sets that pass the
//! configured inference rule, one primitive per transformed kind, and a
//! plain string for whatever remains; several results union. Transformed
//! kinds expand in every mode, the enum rule only applies to `infer`/`all`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use typeforge_core::attributes::{AttributeKind, StringTypes};
use typeforge_core::error::Result;
use typeforge_core::{
    EnumInference, PipelineConfig, StringTypeMapping, TypeAttributes, TypeGraph, TypeKind, TypeRef,
};

fn case_total(cases: &BTreeMap<String, usize>) -> usize {
    cases.values().sum()
}

struct ExpansionPlan {
    /// Accepted enum case sets, in acceptance order.
    enum_sets: Vec<BTreeSet<String>>,
    /// String ref -> index into `enum_sets`.
    matches: HashMap<TypeRef, usize>,
}

fn plan_enums(
    graph: &TypeGraph,
    candidates: &[TypeRef],
    config: &PipelineConfig,
) -> ExpansionPlan {
    let mut plan = ExpansionPlan {
        enum_sets: Vec::new(),
        matches: HashMap::new(),
    };
    if config.enum_inference == EnumInference::None {
        return plan;
    }
    for &r in candidates {
        let Some(string_types) = graph.attributes(r).string_types() else {
            continue;
        };
        let Some(cases) = &string_types.case_counts else {
            continue;
        };
        if cases.is_empty() {
            continue;
        }
        let case_set: BTreeSet<String> = cases.keys().cloned().collect();

        if config.enum_inference == EnumInference::All {
            let index = match plan.enum_sets.iter().position(|s| *s == case_set) {
                Some(i) => i,
                None => {
                    plan.enum_sets.push(case_set);
                    plan.enum_sets.len() - 1
                }
            };
            plan.matches.insert(r, index);
            continue;
        }

        let total = case_total(cases);
        let distinct = case_set.len();
        if total >= config.min_length_for_enum && (distinct as f64) < (total as f64).sqrt() {
            let index = match plan.enum_sets.iter().position(|s| *s == case_set) {
                Some(i) => i,
                None => {
                    plan.enum_sets.push(case_set);
                    plan.enum_sets.len() - 1
                }
            };
            plan.matches.insert(r, index);
        } else if total >= config.min_length_for_overlap {
            // merge into an existing enum when the overlap covers enough
            // of the newer, smaller set
            let needed = (config.required_overlap * distinct as f64).ceil() as usize;
            let found = plan.enum_sets.iter().position(|set| {
                case_set.intersection(set).count() >= needed
            });
            if let Some(index) = found {
                plan.enum_sets[index].extend(case_set);
                plan.matches.insert(r, index);
            }
        }
    }
    plan
}

pub fn expand_strings(graph: TypeGraph, config: &PipelineConfig) -> Result<(TypeGraph, bool)> {
    let candidates: Vec<TypeRef> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| graph.resolve(r).kind() == TypeKind::String)
        .filter(|&r| match graph.attributes(r).string_types() {
            None => false,
            Some(st) => {
                !st.transformations.is_empty()
                    || st.case_counts.as_ref().map_or(false, |c| !c.is_empty())
            }
        })
        .collect();
    if candidates.is_empty() {
        return Ok((graph, false));
    }

    let plan = plan_enums(&graph, &candidates, config);
    debug!(
        strings = candidates.len(),
        enums = plan.enum_sets.len(),
        "expanding strings"
    );

    let groups: Vec<Vec<TypeRef>> = candidates.iter().map(|&r| vec![r]).collect();
    let outcome = graph.rewrite(
        "expand strings",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let string_ref = group[0];
            let original = rewriter.original();
            let attributes = original
                .attributes(string_ref)
                .without(AttributeKind::StringTypes);
            let string_types = original
                .attributes(string_ref)
                .string_types()
                .cloned()
                .unwrap_or_else(StringTypes::unrestricted);

            let enum_set = plan
                .matches
                .get(&string_ref)
                .map(|&i| plan.enum_sets[i].clone());
            let plain_string = match &string_types.case_counts {
                None => true,
                Some(cases) => !cases.is_empty() && enum_set.is_none(),
            };

            enum Piece {
                Enum(BTreeSet<String>),
                Transformed(typeforge_core::PrimitiveKind),
                Plain,
            }
            let mut pieces = Vec::new();
            if let Some(set) = enum_set {
                pieces.push(Piece::Enum(set));
            }
            for &kind in &string_types.transformations {
                pieces.push(Piece::Transformed(kind));
            }
            if plain_string || pieces.is_empty() {
                pieces.push(Piece::Plain);
            }

            let single = pieces.len() == 1;
            let builder = rewriter.builder();
            let mut members = BTreeSet::new();
            for piece in pieces {
                let (attrs, fwd) = if single {
                    (attributes.clone(), Some(forwarding))
                } else {
                    (TypeAttributes::new(), None)
                };
                let built = match piece {
                    Piece::Enum(cases) => builder.get_enum_type_with(attrs, cases, fwd),
                    Piece::Transformed(kind) => {
                        builder.get_primitive_type_with(kind, attrs, fwd)
                    }
                    Piece::Plain => builder.get_string_type_with(attrs, None, fwd),
                };
                if single {
                    return Ok(built);
                }
                members.insert(built);
            }
            Ok(builder.get_unique_union_type_with(attributes, Some(members), Some(forwarding)))
        },
    )?;
    Ok((outcome.graph, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeforge_core::attributes::AttributeValue;
    use typeforge_core::{PrimitiveKind, TypeBuilder};

    fn graph_with_cases(cases: &[(&str, usize)]) -> TypeGraph {
        let mut builder = TypeBuilder::default();
        let st = StringTypes::restricted(
            cases
                .iter()
                .map(|(c, n)| (c.to_string(), *n))
                .collect(),
        );
        let s = builder.get_string_type(TypeAttributes::new(), Some(st));
        builder.add_top_level("Top", s).unwrap();
        builder.finish()
    }

    #[test]
    fn test_all_mode_expands_to_enum() {
        let graph = graph_with_cases(&[("red", 3), ("green", 2), ("blue", 5)]);
        let config = PipelineConfig {
            enum_inference: EnumInference::All,
            ..PipelineConfig::default()
        };
        let (graph, changed) = expand_strings(graph, &config).unwrap();
        assert!(changed);
        let top = graph.top_levels()["Top"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::Enum);
        assert_eq!(t.enum_cases().len(), 3);
    }

    #[test]
    fn test_none_mode_keeps_plain_string() {
        let graph = graph_with_cases(&[("red", 3), ("green", 2), ("blue", 5)]);
        let config = PipelineConfig {
            enum_inference: EnumInference::None,
            ..PipelineConfig::default()
        };
        let (graph, _) = expand_strings(graph, &config).unwrap();
        let top = graph.top_levels()["Top"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::String);
        let st = graph.attributes(top).string_types().unwrap();
        assert!(!st.is_restricted());
    }

    #[test]
    fn test_infer_mode_enum_rule() {
        // 12 values over 3 cases: 3 < sqrt(12), own enum
        let graph = graph_with_cases(&[("a", 4), ("b", 4), ("c", 4)]);
        let config = PipelineConfig::default();
        let (graph, _) = expand_strings(graph, &config).unwrap();
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Enum);

        // 4 values over 4 cases: everything distinct, stays a string
        let graph = graph_with_cases(&[("w", 1), ("x", 1), ("y", 1), ("z", 1)]);
        let (graph, _) = expand_strings(graph, &config).unwrap();
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::String);
    }

    #[test]
    fn test_transformations_expand_to_union() {
        let mut builder = TypeBuilder::default();
        let st = StringTypes {
            case_counts: Some(BTreeMap::new()),
            transformations: BTreeSet::from([PrimitiveKind::Date, PrimitiveKind::Uuid]),
        };
        let s = builder.get_string_type(
            TypeAttributes::one(AttributeValue::StringTypes(st)),
            None,
        );
        builder.add_top_level("Top", s).unwrap();
        let graph = builder.finish();

        let (graph, changed) = expand_strings(graph, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let top = graph.top_levels()["Top"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::Union);
        let kinds: BTreeSet<TypeKind> = t
            .set_operation_members()
            .iter()
            .map(|&m| graph.resolve(m).kind())
            .collect();
        assert_eq!(
            kinds,
            BTreeSet::from([TypeKind::Date, TypeKind::Uuid])
        );
    }

    #[test]
    fn test_idempotent() {
        let graph = graph_with_cases(&[("red", 6), ("green", 6)]);
        let config = PipelineConfig::default();
        let (graph, first) = expand_strings(graph, &config).unwrap();
        assert!(first);
        let (_, second) = expand_strings(graph, &config).unwrap();
        assert!(!second);
    }
}
