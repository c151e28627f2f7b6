//! Transformation attachment.
//!
//! Every transformed-string primitive gets a transformation attribute
//! describing how wire strings decode into it: the target is the raw
//! string type, the transformer parses it into the refined kind, and its
//! reverse stringifies back.

use tracing::debug;

use typeforge_core::attributes::{AttributeKind, AttributeValue};
use typeforge_core::error::Result;
use typeforge_core::transformer::{Transformation, Transformer};
use typeforge_core::{
    PipelineConfig, StringTypeMapping, Type, TypeAttributes, TypeGraph, TypeRef,
};

pub fn make_transformations(
    graph: TypeGraph,
    _config: &PipelineConfig,
) -> Result<(TypeGraph, bool)> {
    let groups: Vec<Vec<TypeRef>> = graph
        .reachable_refs()
        .into_iter()
        .filter(|&r| match graph.resolve(r) {
            Type::Primitive(kind) => {
                kind.is_transformed_string()
                    && graph.attributes(r).get(AttributeKind::Transformation).is_none()
            }
            _ => false,
        })
        .map(|r| vec![r])
        .collect();
    if groups.is_empty() {
        return Ok((graph, false));
    }
    debug!(primitives = groups.len(), "attaching transformations");

    let outcome = graph.rewrite(
        "make transformations",
        StringTypeMapping::default(),
        groups,
        move |group, rewriter, forwarding| {
            let primitive_ref = group[0];
            let original = rewriter.original();
            let kind = match original.resolve(primitive_ref) {
                Type::Primitive(k) => *k,
                _ => typeforge_core::internal_error!("transformation group holds a non-primitive"),
            };
            let attributes = original.attributes(primitive_ref).clone();

            let builder = rewriter.builder();
            let raw_string = builder.get_string_type(TypeAttributes::new(), None);
            let transformation = Transformation {
                target: raw_string,
                transformer: Transformer::ParseString {
                    source: raw_string,
                    kind,
                },
            };
            let attributes =
                attributes.with(AttributeValue::Transformation(transformation));
            Ok(builder.get_primitive_type_with(kind, attributes, Some(forwarding)))
        },
    )?;
    Ok((outcome.graph, true))
}
