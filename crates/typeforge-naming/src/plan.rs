//! Renderer-facing naming entry point: build a name store for a graph's
//! nameable types and assign collision-free names.

use std::collections::BTreeMap;

use typeforge_core::error::Result;
use typeforge_core::{TypeGraph, TypeRef};

use crate::gather::gathered_names;
use crate::namespace::{NameId, NameStore};
use crate::styles::StyleFn;

/// Naming priority by category; lower assigns first so higher-priority
/// categories win contested names.
const ORDER_TOP_LEVEL: u32 = 0;
const ORDER_OBJECT: u32 = 10;
const ORDER_ENUM: u32 = 20;
const ORDER_UNION: u32 = 30;

pub struct AssignedNames {
    pub store: NameStore,
    pub name_for_type: BTreeMap<TypeRef, NameId>,
    pub assigned: BTreeMap<NameId, String>,
}

impl AssignedNames {
    pub fn string_for(&self, r: TypeRef) -> Option<&str> {
        let id = self.name_for_type.get(&r)?;
        self.assigned.get(id).map(String::as_str)
    }
}

/// Name every object, enum, and union in the graph with the given style,
/// using gathered candidate names and the namer's prefix set to avoid
/// collisions.
pub fn assign_type_names(
    graph: &TypeGraph,
    style: StyleFn,
    prefixes: Vec<String>,
) -> Result<AssignedNames> {
    let mut store = NameStore::new();
    let global = store.add_namespace(None);
    let namer = store.add_namer(style, prefixes);

    let gathered = gathered_names(graph);
    let separated = graph.all_named_types_separated();
    let top_level_refs: Vec<TypeRef> = graph.top_levels().values().copied().collect();

    let mut name_for_type: BTreeMap<TypeRef, NameId> = BTreeMap::new();
    let mut add = |store: &mut NameStore,
                   name_for_type: &mut BTreeMap<TypeRef, NameId>,
                   r: TypeRef,
                   order: u32| {
        if name_for_type.contains_key(&r) {
            return;
        }
        let candidates = match gathered.get(&r) {
            Some(names) => names.proposed_names(),
            None => vec!["anonymous".to_string()],
        };
        let order = if top_level_refs.contains(&r) {
            ORDER_TOP_LEVEL
        } else {
            order
        };
        let id = store.add_simple(global, order, namer, candidates);
        name_for_type.insert(r, id);
    };

    for &r in &separated.objects {
        add(&mut store, &mut name_for_type, r, ORDER_OBJECT);
    }
    for &r in &separated.enums {
        add(&mut store, &mut name_for_type, r, ORDER_ENUM);
    }
    for &r in &separated.unions {
        add(&mut store, &mut name_for_type, r, ORDER_UNION);
    }

    let assigned = store.assign()?;
    Ok(AssignedNames {
        store,
        name_for_type,
        assigned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::pascal_case;
    use std::collections::BTreeMap as Map;
    use typeforge_core::{ClassProperty, TypeAttributes, TypeBuilder};

    #[test]
    fn test_collision_between_top_levels() {
        let mut builder = TypeBuilder::default();
        let a = builder.get_unique_class_type(TypeAttributes::new(), true, Some(Map::new()));
        let b = builder.get_unique_class_type(TypeAttributes::new(), true, Some(Map::new()));
        builder.add_top_level("user", a).unwrap();
        builder.add_top_level("User", b).unwrap();
        let graph = builder.finish();

        let names = assign_type_names(&graph, pascal_case, Vec::new()).unwrap();
        let sa = names.string_for(a).unwrap();
        let sb = names.string_for(b).unwrap();
        assert_ne!(sa, sb);
        assert!(sa == "User" || sb == "User");
    }

    #[test]
    fn test_nested_types_named_from_context() {
        let mut builder = TypeBuilder::default();
        let inner = builder.get_unique_class_type(TypeAttributes::new(), true, Some(Map::new()));
        let outer = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(Map::from([(
                "shipping_address".to_string(),
                ClassProperty::new(inner, false),
            )])),
        );
        builder.add_top_level("Order", outer).unwrap();
        let graph = builder.finish();

        let names = assign_type_names(&graph, pascal_case, Vec::new()).unwrap();
        assert_eq!(names.string_for(outer).unwrap(), "Order");
        assert_eq!(names.string_for(inner).unwrap(), "ShippingAddress");
    }

    #[test]
    fn test_prefix_used_on_collision() {
        let mut builder = TypeBuilder::default();
        let a = builder.get_unique_class_type(TypeAttributes::new(), true, Some(Map::new()));
        let b = builder.get_unique_class_type(TypeAttributes::new(), true, Some(Map::new()));
        builder.add_top_level("value", a).unwrap();
        builder.add_top_level("Value", b).unwrap();
        let graph = builder.finish();

        let names =
            assign_type_names(&graph, pascal_case, vec!["extra".to_string()]).unwrap();
        let mut strings = vec![
            names.string_for(a).unwrap().to_string(),
            names.string_for(b).unwrap().to_string(),
        ];
        strings.sort();
        assert_eq!(strings, vec!["ExtraValue".to_string(), "Value".to_string()]);
    }
}
