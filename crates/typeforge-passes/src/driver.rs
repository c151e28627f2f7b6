//! The sequential rewrite pipeline.
//!
//! Union flattening and intersection resolution iterate to their own
//! fixpoint first; the remaining passes run in a fixed order, and the
//! whole sequence repeats until no pass reports a change. Every stage
//! consumes one frozen graph and produces the next, so a pipeline run is
//! fully deterministic and replayable.

use serde_json::Value;
use tracing::{debug, info};

use typeforge_core::error::{GraphError, Result};
use typeforge_core::{PipelineConfig, TypeBuilder, TypeGraph};

use crate::combine_classes::combine_classes;
use crate::context::PipelineContext;
use crate::expand_strings::expand_strings;
use crate::flatten_strings::flatten_strings;
use crate::flatten_unions::flatten_unions;
use crate::infer_maps::infer_maps;
use crate::inference::TypeInference;
use crate::make_transformations::make_transformations;
use crate::replace_objects::replace_object_type;
use crate::resolve_intersections::resolve_intersections;

/// Normalize a constructed graph to fixpoint.
pub fn run_pipeline(
    graph: TypeGraph,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<TypeGraph> {
    let mut graph = graph;
    for iteration in 0..config.fixed_point_limit {
        debug!(iteration, types = graph.len(), "pipeline iteration");
        let mut changed = false;

        let mut inner = 0;
        loop {
            let flatten = flatten_unions(graph, config)?;
            graph = flatten.graph;
            let resolve = resolve_intersections(graph, config)?;
            graph = resolve.graph;
            changed |= flatten.changed || resolve.changed;
            if !flatten.changed && !resolve.changed {
                break;
            }
            inner += 1;
            if inner > config.fixed_point_limit {
                return Err(GraphError::FixedPointOverflow {
                    iterations: config.fixed_point_limit,
                });
            }
        }

        let (g, c) = expand_strings(graph, config)?;
        changed |= c;
        let (g, c2) = flatten_strings(g, config)?;
        changed |= c2;
        graph = g;

        if config.infer_maps {
            let (g, c) = infer_maps(graph, config, ctx)?;
            changed |= c;
            graph = g;
        }
        if config.combine_classes {
            let (g, c) = combine_classes(graph, config)?;
            changed |= c;
            graph = g;
        }
        let (g, c) = replace_object_type(graph, config)?;
        changed |= c;
        let (g, c2) = make_transformations(g, config)?;
        changed |= c2;
        graph = g;

        if !changed {
            info!(
                iterations = iteration + 1,
                types = graph.len(),
                "pipeline reached fixpoint"
            );
            return Ok(graph);
        }
    }
    Err(GraphError::FixedPointOverflow {
        iterations: config.fixed_point_limit,
    })
}

/// Infer every top level from its samples and normalize the result: the
/// whole compilation in one call.
pub fn compile_samples(
    top_levels: &[(String, Vec<Value>)],
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<TypeGraph> {
    let mut builder = TypeBuilder::default();
    let mut inference = TypeInference::new(&mut builder, config, ctx);
    for (name, samples) in top_levels {
        inference.infer_top_level(name, samples)?;
    }
    inference.resolve_refs()?;
    let graph = builder.finish();
    run_pipeline(graph, config, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use typeforge_core::TypeKind;

    #[test]
    fn test_compile_simple_samples() {
        let config = PipelineConfig::default();
        let ctx = PipelineContext::new();
        let graph = compile_samples(
            &[(
                "Person".to_string(),
                vec![
                    json!({"name": "Ada", "age": 36}),
                    json!({"name": "Grace", "age": 85}),
                ],
            )],
            &config,
            &ctx,
        )
        .unwrap();

        let top = graph.top_levels()["Person"];
        let t = graph.resolve(top);
        assert_eq!(t.kind(), TypeKind::Class);
        assert_eq!(t.object_data().properties().len(), 2);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let config = PipelineConfig::default();
        let ctx = PipelineContext::new();
        let graph = compile_samples(
            &[(
                "Doc".to_string(),
                vec![json!({"values": [1, 2.5], "flag": true})],
            )],
            &config,
            &ctx,
        )
        .unwrap();
        let before = graph.len();
        let graph = run_pipeline(graph, &config, &ctx).unwrap();
        assert_eq!(graph.len(), before);
    }
}
