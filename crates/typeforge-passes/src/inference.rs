//! Type inference over JSON sample documents.
//!
//! Each sampled value feeds the union accumulator by tag; objects gather
//! per-key value lists and infer each property recursively, marking a
//! property optional when any sample lacks it. Strings are promoted to
//! enum candidates or to transformed-string kinds when their format is
//! recognized. `{"$ref": ...}` shapes become deferred intersections that
//! resolve against the top levels once construction is done.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use typeforge_core::attributes::names::TypeNames;
use typeforge_core::attributes::{AttributeValue, StringTypes, TypeAttributes};
use typeforge_core::error::Result;
use typeforge_core::union_builder::{UnionAccumulator, UnionBuilderLike};
use typeforge_core::{
    ClassProperty, EnumInference, PipelineConfig, PrimitiveKind, Type, TypeBuilder, TypeRef,
};

use crate::context::PipelineContext;

pub struct TypeInference<'a> {
    builder: &'a mut TypeBuilder,
    config: &'a PipelineConfig,
    ctx: &'a PipelineContext,
    fixups: Vec<(TypeRef, String)>,
}

impl<'a> TypeInference<'a> {
    pub fn new(
        builder: &'a mut TypeBuilder,
        config: &'a PipelineConfig,
        ctx: &'a PipelineContext,
    ) -> TypeInference<'a> {
        TypeInference {
            builder,
            config,
            ctx,
            fixups: Vec::new(),
        }
    }

    /// Infer one top level from its samples and register it under `name`.
    /// The top level's input index rides along as provenance.
    pub fn infer_top_level(&mut self, name: &str, samples: &[Value]) -> Result<TypeRef> {
        let input_index = self.builder.top_levels().len();
        let attributes = TypeAttributes::one(AttributeValue::Names(TypeNames::given(name)))
            .with(AttributeValue::Provenance(BTreeSet::from([input_index])));
        let r = self.infer(attributes, samples.iter().collect())?;
        self.builder.add_top_level(name, r)?;
        Ok(r)
    }

    /// Resolve the deferred `$ref` intersections against the registered
    /// top levels. Unresolvable refs fall back to `any`.
    pub fn resolve_refs(&mut self) -> Result<()> {
        let fixups = std::mem::take(&mut self.fixups);
        for (intersection, path) in fixups {
            let segment = path.rsplit('/').next().unwrap_or(&path).to_string();
            let target = self.builder.top_levels().get(&segment).copied();
            let member = match target {
                Some(t) => t,
                None => self
                    .builder
                    .get_primitive_type(PrimitiveKind::Any, TypeAttributes::new()),
            };
            self.builder
                .set_set_operation_members(intersection, BTreeSet::from([member]));
        }
        Ok(())
    }

    fn infer(&mut self, attributes: TypeAttributes, values: Vec<&Value>) -> Result<TypeRef> {
        if values.is_empty() {
            return Ok(self
                .builder
                .get_primitive_type(PrimitiveKind::None, attributes));
        }

        if self.config.enum_inference != EnumInference::None {
            if let Some(path) = common_ref_path(&values) {
                let intersection = self
                    .builder
                    .get_unique_intersection_type(attributes, None);
                self.fixups.push((intersection, path));
                return Ok(intersection);
            }
        }

        let mut accumulator: UnionAccumulator<&Vec<Value>, &Map<String, Value>> =
            UnionAccumulator::new(self.config.conflate_numbers);
        for &value in &values {
            match value {
                Value::Null => {
                    accumulator.add_primitive(PrimitiveKind::Null, TypeAttributes::new())
                }
                Value::Bool(_) => {
                    accumulator.add_primitive(PrimitiveKind::Bool, TypeAttributes::new())
                }
                Value::Number(n) => {
                    let kind = if n.is_i64() || n.is_u64() {
                        PrimitiveKind::Integer
                    } else {
                        PrimitiveKind::Double
                    };
                    accumulator.add_primitive(kind, TypeAttributes::new());
                }
                Value::String(s) => {
                    let string_types = match recognize_format(s) {
                        Some(kind) => StringTypes::transformed(kind),
                        None if self.config.enum_inference != EnumInference::None => {
                            StringTypes::case(s.clone())
                        }
                        None => StringTypes::unrestricted(),
                    };
                    accumulator.add_primitive(
                        PrimitiveKind::String,
                        TypeAttributes::one(AttributeValue::StringTypes(string_types)),
                    );
                }
                Value::Array(items) => accumulator.add_array(items, TypeAttributes::new()),
                Value::Object(map) => accumulator.add_object(map, TypeAttributes::new()),
            }
        }

        let names = attributes.names().cloned();
        let result = self.build_union(accumulator, false, attributes, None)?;
        if matches!(self.builder.lookup(result), Some(Type::Union { .. })) {
            self.mark_union(result, names);
        }
        Ok(result)
    }

    /// Tag a freshly inferred union and its members so the naming engine
    /// can tell which union a member name came from.
    fn mark_union(&mut self, union: TypeRef, names: Option<TypeNames>) {
        let id = self.ctx.next_union_id();
        self.builder.add_attributes(
            union,
            TypeAttributes::one(AttributeValue::UnionIdentifiers(BTreeSet::from([id]))),
        );
        let Some(names) = names else { return };
        let members: Vec<TypeRef> = match self.builder.lookup(union) {
            Some(Type::Union { members: Some(m) }) => m.iter().copied().collect(),
            _ => return,
        };
        for member in members {
            self.builder.add_attributes(
                member,
                TypeAttributes::one(AttributeValue::UnionMemberNames(BTreeMap::from([(
                    id,
                    names.clone(),
                )]))),
            );
        }
    }
}

impl<'a, 'v> UnionBuilderLike<&'v Vec<Value>, &'v Map<String, Value>> for TypeInference<'a> {
    fn type_builder(&mut self) -> &mut TypeBuilder {
        &mut *self.builder
    }

    fn make_enum(
        &mut self,
        cases: BTreeSet<String>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        Ok(self
            .builder
            .get_enum_type_with(attributes, cases, forwarding))
    }

    fn make_array(
        &mut self,
        arrays: Vec<&'v Vec<Value>>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let elements: Vec<&Value> = arrays.iter().flat_map(|xs| xs.iter()).collect();
        let item_attributes = match attributes.names() {
            Some(names) => TypeAttributes::one(AttributeValue::Names(names.singularize())),
            None => TypeAttributes::new(),
        };
        let items = self.infer(item_attributes, elements)?;
        Ok(self
            .builder
            .get_array_type_with(attributes, items, forwarding))
    }

    fn make_object(
        &mut self,
        objects: Vec<&'v Map<String, Value>>,
        attributes: TypeAttributes,
        forwarding: Option<TypeRef>,
    ) -> Result<TypeRef> {
        let sample_count = objects.len();
        let mut values_by_key: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
        for map in &objects {
            for (key, value) in map.iter() {
                values_by_key.entry(key.clone()).or_default().push(value);
            }
        }

        if self.config.infer_maps
            && values_by_key.len() > self.config.map_inference_property_threshold
        {
            let all_values: Vec<&Value> = values_by_key.values().flatten().copied().collect();
            let value_type = self.infer(TypeAttributes::new(), all_values)?;
            return Ok(self
                .builder
                .get_map_type_with(attributes, value_type, forwarding));
        }

        let mut properties = BTreeMap::new();
        for (key, key_values) in values_by_key {
            let optional = key_values.len() < sample_count;
            let property_attributes =
                TypeAttributes::one(AttributeValue::Names(TypeNames::inferred(key.clone(), 1)));
            let property_type = self.infer(property_attributes, key_values)?;
            properties.insert(key, ClassProperty::new(property_type, optional));
        }
        Ok(self.builder.get_unique_class_type_with(
            attributes,
            true,
            Some(properties),
            forwarding,
        ))
    }
}

fn common_ref_path(values: &[&Value]) -> Option<String> {
    let mut common: Option<&str> = None;
    for value in values {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let path = map.get("$ref")?.as_str()?;
        if !path.starts_with("#/") {
            return None;
        }
        match common {
            None => common = Some(path),
            Some(existing) if existing == path => {}
            Some(_) => return None,
        }
    }
    common.map(str::to_string)
}

macro_rules! format_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static pattern"))
        }
    };
}

format_regex!(
    date_time_regex,
    r"^\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(\.\d+)?([Zz]|[+-]\d{2}:?\d{2})?$"
);
format_regex!(date_regex, r"^\d{4}-\d{2}-\d{2}$");
format_regex!(time_regex, r"^\d{2}:\d{2}:\d{2}(\.\d+)?$");
format_regex!(
    uuid_regex,
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
);
format_regex!(uri_regex, r"^[a-zA-Z][a-zA-Z0-9+.-]*://\S+$");
format_regex!(integer_string_regex, r"^-?\d{1,18}$");
format_regex!(bool_string_regex, r"^(true|false)$");

pub(crate) fn recognize_format(s: &str) -> Option<PrimitiveKind> {
    if date_time_regex().is_match(s) {
        Some(PrimitiveKind::DateTime)
    } else if date_regex().is_match(s) {
        Some(PrimitiveKind::Date)
    } else if time_regex().is_match(s) {
        Some(PrimitiveKind::Time)
    } else if uuid_regex().is_match(s) {
        Some(PrimitiveKind::Uuid)
    } else if uri_regex().is_match(s) {
        Some(PrimitiveKind::Uri)
    } else if integer_string_regex().is_match(s) {
        Some(PrimitiveKind::IntegerString)
    } else if bool_string_regex().is_match(s) {
        Some(PrimitiveKind::BoolString)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use typeforge_core::TypeKind;

    fn infer_one(samples: Vec<Value>) -> (TypeBuilder, TypeRef) {
        let config = PipelineConfig::default();
        let ctx = PipelineContext::new();
        let mut builder = TypeBuilder::default();
        let r = {
            let mut inference = TypeInference::new(&mut builder, &config, &ctx);
            let r = inference.infer_top_level("Top", &samples).unwrap();
            inference.resolve_refs().unwrap();
            r
        };
        (builder, r)
    }

    #[test]
    fn test_infers_class_with_optional_property() {
        let (builder, r) = infer_one(vec![
            json!({"name": "Ada", "age": 36}),
            json!({"name": "Grace"}),
        ]);
        let t = builder.lookup(r).unwrap();
        assert_eq!(t.kind(), TypeKind::Class);
        let props = t.object_data().properties();
        assert!(!props["name"].is_optional);
        assert!(props["age"].is_optional);
    }

    #[test]
    fn test_mixed_values_become_union() {
        let (builder, r) = infer_one(vec![json!(1), json!(true)]);
        assert_eq!(builder.lookup(r).unwrap().kind(), TypeKind::Union);
    }

    #[test]
    fn test_number_conflation_in_samples() {
        let (builder, r) = infer_one(vec![json!(1), json!(2.5)]);
        assert_eq!(builder.lookup(r).unwrap().kind(), TypeKind::Double);
    }

    #[test]
    fn test_format_recognition() {
        assert_eq!(recognize_format("2021-03-04"), Some(PrimitiveKind::Date));
        assert_eq!(
            recognize_format("2021-03-04T05:06:07Z"),
            Some(PrimitiveKind::DateTime)
        );
        assert_eq!(
            recognize_format("123e4567-e89b-12d3-a456-426614174000"),
            Some(PrimitiveKind::Uuid)
        );
        assert_eq!(
            recognize_format("https://example.com/x"),
            Some(PrimitiveKind::Uri)
        );
        assert_eq!(recognize_format("-42"), Some(PrimitiveKind::IntegerString));
        assert_eq!(recognize_format("true"), Some(PrimitiveKind::BoolString));
        assert_eq!(recognize_format("hello"), None);
    }

    #[test]
    fn test_nullable_property_unions_with_null() {
        let (builder, r) = infer_one(vec![
            json!({"score": 1}),
            json!({"score": null}),
        ]);
        let props = builder.lookup(r).unwrap().object_data().properties().clone();
        let score = props["score"].type_ref;
        assert_eq!(builder.lookup(score).unwrap().kind(), TypeKind::Union);
    }

    #[test]
    fn test_ref_shape_defers_to_intersection() {
        let config = PipelineConfig::default();
        let ctx = PipelineContext::new();
        let mut builder = TypeBuilder::default();
        let mut inference = TypeInference::new(&mut builder, &config, &ctx);
        let target_samples = vec![json!({"id": 1})];
        inference.infer_top_level("Thing", &target_samples).unwrap();
        let ref_samples = vec![json!({"$ref": "#/definitions/Thing"})];
        let r = inference.infer_top_level("Alias", &ref_samples).unwrap();
        inference.resolve_refs().unwrap();

        match builder.lookup(r).unwrap() {
            Type::Intersection { members: Some(m) } => {
                let target = builder.top_levels()["Thing"];
                assert_eq!(m.iter().copied().collect::<Vec<_>>(), vec![target]);
            }
            other => panic!("expected resolved intersection, got {:?}", other),
        }
    }

    #[test]
    fn test_map_collapse_past_property_threshold() {
        let config = PipelineConfig {
            map_inference_property_threshold: 4,
            ..PipelineConfig::default()
        };
        let ctx = PipelineContext::new();
        let mut builder = TypeBuilder::default();
        let mut map = Map::new();
        for i in 0..6 {
            map.insert(format!("key{}", i), json!(i));
        }
        let samples = vec![Value::Object(map)];
        let mut inference = TypeInference::new(&mut builder, &config, &ctx);
        let r = inference.infer_top_level("Top", &samples).unwrap();
        assert_eq!(builder.lookup(r).unwrap().kind(), TypeKind::Map);
    }
}
