//! Pipeline configuration.
//!
//! Every inference heuristic that used to be a hard-coded constant is a
//! field here, so drivers can tune them per invocation.

use serde::{Deserialize, Serialize};

/// How string-enum expansion treats observed string cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnumInference {
    /// Strings stay strings.
    None,
    /// Strings become enums when the case statistics look enum-like.
    #[default]
    Infer,
    /// Every restricted string becomes an enum.
    All,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Merge integer and double union members into double.
    pub conflate_numbers: bool,
    pub enum_inference: EnumInference,
    pub infer_maps: bool,
    pub combine_classes: bool,
    /// Keep objects that carry both named and additional properties
    /// instead of converting them to classes or maps.
    pub leave_full_objects: bool,
    /// Fail a rewrite that knowingly drops attributes instead of flagging.
    pub fail_on_lost_attributes: bool,

    /// Minimum observed values for a string to become its own enum.
    pub min_length_for_enum: usize,
    /// Minimum observed values for a string to merge into an existing enum.
    pub min_length_for_overlap: usize,
    /// Case overlap, as a fraction of the newer set, required to merge.
    pub required_overlap: f64,
    /// Property count past which inference collapses an object to a map.
    pub map_inference_property_threshold: usize,
    /// Classes at or below this size keep their shape when every property
    /// is string-like or null.
    pub small_class_size: usize,
    /// Scale of the power-law threshold for Markov map detection.
    pub markov_scale: f64,
    /// Iteration cap for the rewrite fixpoint loop.
    pub fixed_point_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            conflate_numbers: true,
            enum_inference: EnumInference::Infer,
            infer_maps: true,
            combine_classes: true,
            leave_full_objects: false,
            fail_on_lost_attributes: false,
            min_length_for_enum: 10,
            min_length_for_overlap: 5,
            required_overlap: 3.0 / 4.0,
            map_inference_property_threshold: 500,
            small_class_size: 20,
            markov_scale: (1u64 << 25) as f64,
            fixed_point_limit: 50,
        }
    }
}

impl PipelineConfig {
    /// The geometric-mean probability below which a class's property names
    /// look random enough to be map keys, as a function of property count.
    pub fn map_probability_threshold(&self, property_count: usize) -> f64 {
        let n = property_count as f64;
        ((n + 2.0).powi(5) - 3f64.powi(5)) / self.markov_scale + 0.0025
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_threshold_grows_with_property_count() {
        let config = PipelineConfig::default();
        assert!(config.map_probability_threshold(3) < config.map_probability_threshold(30));
        assert!(config.map_probability_threshold(2) > 0.0025);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: PipelineConfig = serde_json::from_str(r#"{"inferMaps": false}"#).unwrap();
        // unknown casing falls back to defaults; field names are snake_case
        assert!(config.infer_maps);
        let config: PipelineConfig = serde_json::from_str(r#"{"infer_maps": false}"#).unwrap();
        assert!(!config.infer_maps);
    }
}
