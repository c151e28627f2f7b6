//! Sample inference and graph normalization passes for typeforge.
//!
//! [`inference::TypeInference`] turns JSON sample documents into an
//! initial type graph; the passes here rewrite it to a normal form:
//! canonical unions, no resolvable intersections, maps where property
//! names look generated, merged similar classes, expanded string enums,
//! and transformation attributes on every transformed-string primitive.
//! [`driver::run_pipeline`] sequences them to fixpoint.

pub mod combine_classes;
pub mod context;
pub mod driver;
pub mod expand_strings;
pub mod flatten_strings;
pub mod flatten_unions;
pub mod infer_maps;
pub mod inference;
pub mod make_transformations;
pub mod markov;
pub mod replace_objects;
pub mod resolve_intersections;

pub use context::PipelineContext;
pub use driver::{compile_samples, run_pipeline};
pub use inference::TypeInference;
