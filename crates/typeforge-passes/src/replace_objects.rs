//! Object replacement.
//!
//! Full objects (named properties plus possibly additional properties)
//! normalize into the class/map family: no additional properties makes a
//! class, no named properties makes a map, `any` additional properties
//! makes a class that drops the constraint (flagged as lost information),
//! and a genuine mix makes a map over the union of every value type.

use tracing::debug;

use typeforge_core::error::Result;
use typeforge_core::union_builder::TypeRefUnionBuilder;
use typeforge_core::{
    ClassProperty, PipelineConfig, StringTypeMapping, TypeAttributes, TypeGraph, TypeKind,
    TypeRef,
};

pub fn replace_object_type(
    graph: TypeGraph,
    config: &PipelineConfig,
) -> Result<(TypeGraph, bool)> {
    let groups: Vec<Vec<TypeRef>> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| graph.resolve(r).kind() == TypeKind::Object)
        .filter(|&r| {
            let data = graph.resolve(r).object_data();
            let has_props = data.properties.as_ref().map_or(false, |p| !p.is_empty());
            let has_additional = data.additional_properties.is_some();
            !(config.leave_full_objects && has_props && has_additional)
        })
        .map(|r| vec![r])
        .collect();
    if groups.is_empty() {
        return Ok((graph, false));
    }
    debug!(objects = groups.len(), "replacing object types");

    let conflate = config.conflate_numbers;
    let outcome = graph.rewrite_with_strictness(
        "replace object types",
        StringTypeMapping::default(),
        groups,
        config.fail_on_lost_attributes,
        move |group, rewriter, forwarding| {
            let object_ref = group[0];
            let original = rewriter.original();
            let attributes = original.attributes(object_ref).clone();
            let data = original.resolve(object_ref).object_data().clone();
            let properties = data.properties.clone().unwrap_or_default();
            let additional = data.additional_properties;

            let additional_is_any = additional
                .map_or(false, |a| original.resolve(a).kind() == TypeKind::Any);

            let mut union_builder = TypeRefUnionBuilder::new(rewriter, conflate);
            match (properties.is_empty(), additional) {
                // nothing but additional properties: a map
                (true, Some(values)) => {
                    let values = union_builder.rewriter().reconstitute(values)?;
                    Ok(union_builder.rewriter().builder().get_map_type_with(
                        attributes,
                        values,
                        Some(forwarding),
                    ))
                }
                // no additional properties: a fixed class
                (_, None) => {
                    let mut rebuilt = std::collections::BTreeMap::new();
                    for (name, p) in properties {
                        let type_ref = union_builder.rewriter().reconstitute(p.type_ref)?;
                        rebuilt.insert(name, ClassProperty::new(type_ref, p.is_optional));
                    }
                    Ok(union_builder
                        .rewriter()
                        .builder()
                        .get_unique_class_type_with(
                            attributes,
                            true,
                            Some(rebuilt),
                            Some(forwarding),
                        ))
                }
                // `any` additional properties says nothing; keep the class
                // but record that the constraint was dropped
                (false, Some(_)) if additional_is_any => {
                    let mut rebuilt = std::collections::BTreeMap::new();
                    for (name, p) in properties {
                        let type_ref = union_builder.rewriter().reconstitute(p.type_ref)?;
                        rebuilt.insert(name, ClassProperty::new(type_ref, p.is_optional));
                    }
                    let rewriter = union_builder.rewriter();
                    rewriter.set_lost_type_attributes();
                    Ok(rewriter.builder().get_unique_class_type_with(
                        attributes,
                        true,
                        Some(rebuilt),
                        Some(forwarding),
                    ))
                }
                // both: a map over everything the object can hold
                (false, Some(values)) => {
                    let mut value_refs: Vec<TypeRef> =
                        properties.values().map(|p| p.type_ref).collect();
                    value_refs.push(values);
                    let unified = union_builder.union_of_old_refs(
                        value_refs,
                        TypeAttributes::new(),
                        false,
                        None,
                    )?;
                    Ok(union_builder.rewriter().builder().get_map_type_with(
                        attributes,
                        unified,
                        Some(forwarding),
                    ))
                }
            }
        },
    )?;
    Ok((outcome.graph, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use typeforge_core::{PrimitiveKind, TypeBuilder};

    #[test]
    fn test_object_without_additional_becomes_class() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let object = builder.get_unique_object_type(
            TypeAttributes::new(),
            Some(BTreeMap::from([(
                "count".to_string(),
                ClassProperty::new(int, false),
            )])),
            None,
        );
        builder.add_top_level("Top", object).unwrap();
        let graph = builder.finish();

        let (graph, changed) = replace_object_type(graph, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Class);
    }

    #[test]
    fn test_object_without_properties_becomes_map() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let object = builder.get_unique_object_type(TypeAttributes::new(), None, Some(int));
        builder.add_top_level("Top", object).unwrap();
        let graph = builder.finish();

        let (graph, _) = replace_object_type(graph, &PipelineConfig::default()).unwrap();
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Map);
    }

    #[test]
    fn test_mixed_object_becomes_map_of_value_union() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let object = builder.get_unique_object_type(
            TypeAttributes::new(),
            Some(BTreeMap::from([(
                "label".to_string(),
                ClassProperty::new(string, false),
            )])),
            Some(int),
        );
        builder.add_top_level("Top", object).unwrap();
        let graph = builder.finish();

        let (graph, _) = replace_object_type(graph, &PipelineConfig::default()).unwrap();
        let top = graph.top_levels()["Top"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::Map);
        let values = t.object_data().additional_properties.unwrap();
        assert_eq!(graph.resolve(values).kind(), TypeKind::Union);
    }

    #[test]
    fn test_any_additional_drops_constraint_into_class() {
        let mut builder = TypeBuilder::default();
        let any = builder.get_primitive_type(PrimitiveKind::Any, TypeAttributes::new());
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let object = builder.get_unique_object_type(
            TypeAttributes::new(),
            Some(BTreeMap::from([(
                "label".to_string(),
                ClassProperty::new(string, false),
            )])),
            Some(any),
        );
        builder.add_top_level("Top", object).unwrap();
        let graph = builder.finish();

        let (graph, _) = replace_object_type(graph, &PipelineConfig::default()).unwrap();
        let top = graph.top_levels()["Top"];
        assert_eq!(graph.resolve(top).kind(), TypeKind::Class);
    }

    #[test]
    fn test_leave_full_objects_keeps_mixed_object() {
        let mut builder = TypeBuilder::default();
        let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
        let string = builder.get_string_type(TypeAttributes::new(), None);
        let object = builder.get_unique_object_type(
            TypeAttributes::new(),
            Some(BTreeMap::from([(
                "label".to_string(),
                ClassProperty::new(string, false),
            )])),
            Some(int),
        );
        builder.add_top_level("Top", object).unwrap();
        let graph = builder.finish();

        let config = PipelineConfig {
            leave_full_objects: true,
            ..PipelineConfig::default()
        };
        let (_, changed) = replace_object_type(graph, &config).unwrap();
        assert!(!changed);
    }
}
