//! Name gathering.
//!
//! Collects a naming candidate set for every reachable type without
//! touching the frozen graph: stored names attributes, top-level names,
//! property keys, singularized container names, and union member names
//! all merge under the usual smallest-distance-wins rule.

use std::collections::{HashMap, HashSet, VecDeque};

use typeforge_core::attributes::names::TypeNames;
use typeforge_core::attributes::{AttributeKind, AttributeValue};
use typeforge_core::{Type, TypeGraph, TypeRef};

pub fn gathered_names(graph: &TypeGraph) -> HashMap<TypeRef, TypeNames> {
    let mut gathered: HashMap<TypeRef, TypeNames> = HashMap::new();

    let mut merge = |gathered: &mut HashMap<TypeRef, TypeNames>, r: TypeRef, names: TypeNames| {
        let merged = match gathered.get(&r) {
            Some(existing) => existing.add(&names),
            None => names,
        };
        gathered.insert(r, merged);
    };

    // stored attributes and member names first
    for r in graph.reachable_refs() {
        if let Some(names) = graph.attributes(r).names() {
            merge(&mut gathered, r, names.clone());
        }
        if let Some(AttributeValue::UnionMemberNames(by_union)) =
            graph.attributes(r).get(AttributeKind::UnionMemberNames)
        {
            for names in by_union.values() {
                merge(&mut gathered, r, names.increase_distance());
            }
        }
    }

    // top levels override with given names
    for (name, &r) in graph.top_levels() {
        merge(&mut gathered, r, TypeNames::given(name.clone()));
    }

    // propagate through the structure
    let mut queue: VecDeque<(TypeRef, u32)> =
        graph.top_levels().values().map(|&r| (r, 0)).collect();
    let mut visited: HashSet<TypeRef> = HashSet::new();
    while let Some((r, depth)) = queue.pop_front() {
        if !visited.insert(r) {
            continue;
        }
        let own = gathered.get(&r).cloned();
        match graph.resolve(r) {
            Type::Object(data) => {
                if let Some(props) = &data.properties {
                    for (key, p) in props {
                        merge(
                            &mut gathered,
                            p.type_ref,
                            TypeNames::inferred(key.clone(), depth + 1),
                        );
                        queue.push_back((p.type_ref, depth + 1));
                    }
                }
                if let Some(values) = data.additional_properties {
                    if let Some(own) = &own {
                        merge(&mut gathered, values, own.singularize());
                    }
                    queue.push_back((values, depth + 1));
                }
            }
            t @ Type::Array { .. } => {
                let items = t.array_items();
                if let Some(own) = &own {
                    merge(&mut gathered, items, own.singularize());
                }
                queue.push_back((items, depth + 1));
            }
            Type::Union { members: Some(members) }
            | Type::Intersection { members: Some(members) } => {
                for &m in members {
                    if let Some(own) = &own {
                        merge(&mut gathered, m, own.increase_distance());
                    }
                    queue.push_back((m, depth + 1));
                }
            }
            _ => {}
        }
    }

    gathered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use typeforge_core::{ClassProperty, PrimitiveKind, TypeAttributes, TypeBuilder, TypeKind};

    #[test]
    fn test_property_types_get_key_names() {
        let mut builder = TypeBuilder::default();
        let inner = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::new()),
        );
        let outer = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "homeAddress".to_string(),
                ClassProperty::new(inner, false),
            )])),
        );
        builder.add_top_level("Person", outer).unwrap();
        let graph = builder.finish();

        let gathered = gathered_names(&graph);
        let outer_ref = graph.top_levels()["Person"];
        assert_eq!(gathered[&outer_ref].combined_name(), "Person");
        let inner_ref = graph
            .all_type_refs()
            .find(|&r| r != outer_ref && graph.resolve(r).kind() == TypeKind::Class)
            .unwrap();
        assert_eq!(gathered[&inner_ref].combined_name(), "homeAddress");
    }

    #[test]
    fn test_array_items_are_singularized() {
        let mut builder = TypeBuilder::default();
        let element = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::new()),
        );
        let array = builder.get_array_type(TypeAttributes::new(), element);
        builder.add_top_level("entries", array).unwrap();
        let graph = builder.finish();

        let gathered = gathered_names(&graph);
        let element_ref = graph
            .all_type_refs()
            .find(|&r| graph.resolve(r).kind() == TypeKind::Class)
            .unwrap();
        assert_eq!(gathered[&element_ref].combined_name(), "entry");
    }

    #[test]
    fn test_given_name_beats_inferred() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let class = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "count".to_string(),
                ClassProperty::new(int, false),
            )])),
        );
        builder.add_top_level("Stats", class).unwrap();
        let outer = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "statistics".to_string(),
                ClassProperty::new(class, false),
            )])),
        );
        builder.add_top_level("Root", outer).unwrap();
        let graph = builder.finish();

        let gathered = gathered_names(&graph);
        let stats = graph.top_levels()["Stats"];
        assert_eq!(gathered[&stats].combined_name(), "Stats");
    }
}
