//! Intersection resolution.
//!
//! An intersection is resolvable once every member is a canonical union or
//! a non-set-operation type. The accumulator narrows the possible kind set
//! member by member, intersecting object property sets (presence on either
//! side wins, optionality ANDs), collecting array item types for recursive
//! intersection, and intersecting attributes per kind. Recursive member
//! intersections are emitted as fresh intersections the next fixpoint
//! round resolves.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use typeforge_core::attributes::CombinationKind;
use typeforge_core::error::Result;
use typeforge_core::rewrite::GraphRewriter;
use typeforge_core::{
    ClassProperty, PipelineConfig, PrimitiveKind, StringTypeMapping, Type, TypeAttributes,
    TypeGraph, TypeKind, TypeRef,
};

pub struct ResolveOutcome {
    pub graph: TypeGraph,
    pub changed: bool,
    /// Intersections remained that are not resolvable yet.
    pub remaining: bool,
}

#[derive(Default, Clone)]
struct PropertyAcc {
    refs: Vec<TypeRef>,
    /// AND over the sides the property appeared on.
    optional: bool,
    seen: bool,
}

#[derive(Default, Clone)]
struct ObjectAcc {
    properties: BTreeMap<String, PropertyAcc>,
    additional: Vec<TypeRef>,
}

#[derive(Default, Clone)]
struct KindAcc {
    attributes: Vec<TypeAttributes>,
    enum_cases: Option<BTreeSet<String>>,
    array_items: Vec<TypeRef>,
    object: ObjectAcc,
}

struct IntersectionAccumulator<'g> {
    graph: &'g TypeGraph,
    /// `None` until the first non-`any` member arrives; `any` is the
    /// intersection identity.
    kinds: Option<BTreeMap<TypeKind, KindAcc>>,
    extra_attributes: Vec<TypeAttributes>,
}

impl<'g> IntersectionAccumulator<'g> {
    fn new(graph: &'g TypeGraph) -> IntersectionAccumulator<'g> {
        IntersectionAccumulator {
            graph,
            kinds: None,
            extra_attributes: Vec::new(),
        }
    }

    fn member_kind_map(&self, member: TypeRef) -> BTreeMap<TypeKind, Vec<TypeRef>> {
        let mut map: BTreeMap<TypeKind, Vec<TypeRef>> = BTreeMap::new();
        match self.graph.resolve(member) {
            Type::Union { members: Some(union_members) } => {
                for &m in union_members {
                    map.entry(self.graph.resolve(m).kind()).or_default().push(m);
                }
            }
            t => {
                map.entry(t.kind()).or_default().push(member);
            }
        }
        map
    }

    fn seed(&self, refs: &[TypeRef]) -> KindAcc {
        let mut acc = KindAcc::default();
        for &r in refs {
            self.feed(&mut acc, r);
        }
        acc
    }

    fn feed(&self, acc: &mut KindAcc, r: TypeRef) {
        acc.attributes.push(self.graph.attributes(r).clone());
        match self.graph.resolve(r) {
            Type::Enum { cases } => {
                acc.enum_cases = Some(match acc.enum_cases.take() {
                    None => cases.clone(),
                    Some(existing) => existing.intersection(cases).cloned().collect(),
                });
            }
            t @ Type::Array { .. } => acc.array_items.push(t.array_items()),
            Type::Object(data) => {
                if let Some(props) = &data.properties {
                    for (name, p) in props {
                        let entry = acc
                            .object
                            .properties
                            .entry(name.clone())
                            .or_default();
                        entry.refs.push(p.type_ref);
                        entry.optional = if entry.seen {
                            entry.optional && p.is_optional
                        } else {
                            p.is_optional
                        };
                        entry.seen = true;
                    }
                }
                if let Some(a) = data.additional_properties {
                    acc.object.additional.push(a);
                }
            }
            _ => {}
        }
    }

    fn add_member(&mut self, member: TypeRef) {
        if self.graph.resolve(member).kind() == TypeKind::Any {
            self.extra_attributes
                .push(self.graph.attributes(member).clone());
            return;
        }
        let incoming = self.member_kind_map(member);
        match self.kinds.take() {
            None => {
                let seeded = incoming
                    .into_iter()
                    .map(|(kind, refs)| (kind, self.seed(&refs)))
                    .collect();
                self.kinds = Some(seeded);
            }
            Some(existing) => {
                let mut narrowed = BTreeMap::new();
                for (kind, mut acc) in existing {
                    if let Some(refs) = incoming.get(&kind) {
                        for &r in refs {
                            self.feed(&mut acc, r);
                        }
                        narrowed.insert(kind, acc);
                    }
                }
                self.kinds = Some(narrowed);
            }
        }
    }
}

fn is_resolvable(graph: &TypeGraph, members: &BTreeSet<TypeRef>) -> bool {
    members.iter().all(|&m| match graph.resolve(m) {
        Type::Intersection { .. } => false,
        Type::Union { members: Some(u) } => graph.is_canonical_union(u),
        Type::Union { members: None } => false,
        _ => true,
    })
}

/// One ref reconstitutes; several become a fresh intersection for the next
/// round.
fn intersect_refs(
    rewriter: &mut GraphRewriter<'_>,
    refs: Vec<TypeRef>,
) -> Result<TypeRef> {
    let distinct: BTreeSet<TypeRef> = refs.into_iter().collect();
    if distinct.len() == 1 {
        return rewriter.reconstitute(*distinct.iter().next().unwrap());
    }
    let mut rebuilt = BTreeSet::new();
    for r in distinct {
        rebuilt.insert(rewriter.reconstitute(r)?);
    }
    Ok(rewriter
        .builder()
        .get_intersection_type(TypeAttributes::new(), rebuilt))
}

pub fn resolve_intersections(graph: TypeGraph, _config: &PipelineConfig) -> Result<ResolveOutcome> {
    let mut groups_by_members: BTreeMap<BTreeSet<TypeRef>, Vec<TypeRef>> = BTreeMap::new();
    let mut remaining = false;
    for r in graph.reachable_refs() {
        if let Type::Intersection { members: Some(members) } = graph.resolve(r) {
            if is_resolvable(&graph, members) {
                groups_by_members
                    .entry(members.clone())
                    .or_default()
                    .push(r);
            } else {
                remaining = true;
            }
        }
    }

    if groups_by_members.is_empty() {
        return Ok(ResolveOutcome {
            graph,
            changed: false,
            remaining,
        });
    }

    let plans: Vec<(Vec<TypeRef>, BTreeSet<TypeRef>)> = groups_by_members
        .into_iter()
        .map(|(members, intersections)| (intersections, members))
        .collect();
    debug!(groups = plans.len(), "resolving intersections");

    let groups: Vec<Vec<TypeRef>> = plans.iter().map(|(is, _)| is.clone()).collect();
    let outcome = graph.rewrite(
        "resolve intersections",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let original = rewriter.original();
            let members = plans
                .iter()
                .find(|(intersections, _)| intersections.as_slice() == group)
                .map(|(_, members)| members.clone())
                .unwrap_or_default();

            let mut own_attributes: Vec<TypeAttributes> = group
                .iter()
                .map(|&r| original.attributes(r).clone())
                .collect();

            let mut accumulator = IntersectionAccumulator::new(original);
            for &m in &members {
                accumulator.add_member(m);
            }
            own_attributes.extend(accumulator.extra_attributes.clone());
            let attributes = TypeAttributes::combine(own_attributes, CombinationKind::Intersect);

            build_resolved(rewriter, accumulator.kinds, attributes, forwarding)
        },
    )?;

    Ok(ResolveOutcome {
        graph: outcome.graph,
        changed: true,
        remaining,
    })
}

fn build_resolved(
    rewriter: &mut GraphRewriter<'_>,
    kinds: Option<BTreeMap<TypeKind, KindAcc>>,
    attributes: TypeAttributes,
    forwarding: TypeRef,
) -> Result<TypeRef> {
    let kinds = match kinds {
        // only `any` members, or none at all
        None => {
            return Ok(rewriter.builder().get_primitive_type_with(
                PrimitiveKind::Any,
                attributes,
                Some(forwarding),
            ))
        }
        Some(kinds) => kinds,
    };
    if kinds.is_empty() {
        // contradictory members intersect to nothing
        return Ok(rewriter.builder().get_primitive_type_with(
            PrimitiveKind::None,
            attributes,
            Some(forwarding),
        ));
    }

    if kinds.len() == 1 {
        let (kind, acc) = kinds.into_iter().next().unwrap();
        let member_attributes =
            TypeAttributes::combine(acc.attributes.clone(), CombinationKind::Intersect);
        let merged = TypeAttributes::combine(
            vec![attributes, member_attributes],
            CombinationKind::Intersect,
        );
        return build_kind(rewriter, kind, acc, merged, Some(forwarding));
    }

    let mut member_refs = BTreeSet::new();
    for (kind, acc) in kinds {
        let member_attributes =
            TypeAttributes::combine(acc.attributes.clone(), CombinationKind::Intersect);
        member_refs.insert(build_kind(rewriter, kind, acc, member_attributes, None)?);
    }
    Ok(rewriter.builder().get_unique_union_type_with(
        attributes,
        Some(member_refs),
        Some(forwarding),
    ))
}

fn build_kind(
    rewriter: &mut GraphRewriter<'_>,
    kind: TypeKind,
    acc: KindAcc,
    attributes: TypeAttributes,
    forwarding: Option<TypeRef>,
) -> Result<TypeRef> {
    match kind {
        TypeKind::Enum => {
            let cases = acc.enum_cases.unwrap_or_default();
            Ok(rewriter
                .builder()
                .get_enum_type_with(attributes, cases, forwarding))
        }
        TypeKind::Array => {
            let items = intersect_refs(rewriter, acc.array_items)?;
            Ok(rewriter
                .builder()
                .get_array_type_with(attributes, items, forwarding))
        }
        TypeKind::Class | TypeKind::Object | TypeKind::Map => {
            let mut properties = BTreeMap::new();
            for (name, p) in acc.object.properties {
                let type_ref = intersect_refs(rewriter, p.refs)?;
                properties.insert(name, ClassProperty::new(type_ref, p.optional));
            }
            let additional = if acc.object.additional.is_empty() {
                None
            } else {
                Some(intersect_refs(rewriter, acc.object.additional)?)
            };
            let builder = rewriter.builder();
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
                None => builder.get_unique_class_type_with(
                    attributes,
                    true,
                    Some(properties),
                    forwarding,
                ),
            })
        }
        other => match other.primitive() {
            Some(p) => Ok(rewriter
                .builder()
                .get_primitive_type_with(p, attributes, forwarding)),
            None => typeforge_core::internal_error!(
                "set operations cannot appear as accumulated kinds"
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeforge_core::TypeBuilder;

    #[test]
    fn test_object_intersection_merges_properties() {
        let mut builder = TypeBuilder::default();
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let left = builder.get_class_type(
            TypeAttributes::new(),
            BTreeMap::from([("name".to_string(), ClassProperty::new(string, false))]),
        );
        let right = builder.get_class_type(
            TypeAttributes::new(),
            BTreeMap::from([
                ("age".to_string(), ClassProperty::new(int, false)),
                ("name".to_string(), ClassProperty::new(string, true)),
            ]),
        );
        let intersection =
            builder.get_intersection_type(TypeAttributes::new(), BTreeSet::from([left, right]));
        builder.add_top_level("Top", intersection).unwrap();
        let graph = builder.finish();

        let outcome = resolve_intersections(graph, &PipelineConfig::default()).unwrap();
        assert!(outcome.changed);
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::Class);
        let props = t.object_data().properties();
        assert_eq!(props.len(), 2);
        // required on one side wins: optionality is ANDed
        assert!(!props["name"].is_optional);
        assert!(!props["age"].is_optional);
    }

    #[test]
    fn test_kind_narrowing_to_single_primitive() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let null = builder.get_primitive_type(PrimitiveKind::Null, TypeAttributes::new());
        let left = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([int, string]));
        let right = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([int, null]));
        let intersection =
            builder.get_intersection_type(TypeAttributes::new(), BTreeSet::from([left, right]));
        builder.add_top_level("Top", intersection).unwrap();
        let graph = builder.finish();

        let outcome = resolve_intersections(graph, &PipelineConfig::default()).unwrap();
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Integer);
    }

    #[test]
    fn test_any_is_identity() {
        let mut builder = TypeBuilder::default();
        let any = builder.get_primitive_type(PrimitiveKind::Any, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let intersection =
            builder.get_intersection_type(TypeAttributes::new(), BTreeSet::from([any, bool_]));
        builder.add_top_level("Top", intersection).unwrap();
        let graph = builder.finish();

        let outcome = resolve_intersections(graph, &PipelineConfig::default()).unwrap();
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Bool);
    }

    #[test]
    fn test_contradiction_resolves_to_none() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let bool_ = builder.get_primitive_type(PrimitiveKind::Bool, TypeAttributes::new());
        let intersection =
            builder.get_intersection_type(TypeAttributes::new(), BTreeSet::from([int, bool_]));
        builder.add_top_level("Top", intersection).unwrap();
        let graph = builder.finish();

        let outcome = resolve_intersections(graph, &PipelineConfig::default()).unwrap();
        let graph = outcome.graph;
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::None);
    }
}
