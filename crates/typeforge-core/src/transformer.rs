//! Encode/decode transformation trees.
//!
//! A transformed-string type carries a [`Transformation`] attribute that
//! tells renderers how to decode raw wire values into the refined type and
//! how to encode them back. Reversal is an involution for transformers
//! that cannot fail.

use crate::attributes::{AttributeKind, AttributeSpec, AttributeValue};
use crate::error::Result;
use crate::type_graph::{RefMapper, TypeRef};
use crate::types::{PrimitiveKind, TypeKind};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transformer {
    /// Decode a raw wire value into the source type.
    Decode { source: TypeRef },
    /// Encode the source type back into a raw wire value.
    Encode { source: TypeRef },
    /// Parse a string into a transformed-string kind; fails on bad input.
    ParseString { source: TypeRef, kind: PrimitiveKind },
    /// Render a transformed-string kind back into a string.
    StringifyString { source: TypeRef, kind: PrimitiveKind },
    /// Wrap a value as the given union member.
    InstantiateUnionMember { source: TypeRef, member: TypeRef },
    /// Match a value against the given union member; fails on mismatch.
    MatchUnionMember { source: TypeRef, member: TypeRef },
    /// Match one specific string case; fails on any other string.
    MatchString { source: TypeRef, case: String },
    /// Produce one specific string case.
    ProduceString { source: TypeRef, case: String },
    /// Try each option in order until one succeeds.
    Choose {
        source: TypeRef,
        options: Vec<Transformer>,
    },
}

impl Transformer {
    pub fn source(&self) -> TypeRef {
        match self {
            Transformer::Decode { source }
            | Transformer::Encode { source }
            | Transformer::ParseString { source, .. }
            | Transformer::StringifyString { source, .. }
            | Transformer::InstantiateUnionMember { source, .. }
            | Transformer::MatchUnionMember { source, .. }
            | Transformer::MatchString { source, .. }
            | Transformer::ProduceString { source, .. }
            | Transformer::Choose { source, .. } => *source,
        }
    }

    pub fn can_fail(&self) -> bool {
        match self {
            Transformer::Decode { .. }
            | Transformer::Encode { .. }
            | Transformer::StringifyString { .. }
            | Transformer::InstantiateUnionMember { .. }
            | Transformer::ProduceString { .. } => false,
            Transformer::ParseString { .. }
            | Transformer::MatchUnionMember { .. }
            | Transformer::MatchString { .. }
            | Transformer::Choose { .. } => true,
        }
    }

    /// The inverse transformer, reading from `new_source`. For every
    /// transformer `t` with `can_fail() == false`,
    /// `t.reverse(x).reverse(t.source()) == t`.
    pub fn reverse(&self, new_source: TypeRef) -> Transformer {
        match self {
            Transformer::Decode { .. } => Transformer::Encode { source: new_source },
            Transformer::Encode { .. } => Transformer::Decode { source: new_source },
            Transformer::ParseString { kind, .. } => Transformer::StringifyString {
                source: new_source,
                kind: *kind,
            },
            Transformer::StringifyString { kind, .. } => Transformer::ParseString {
                source: new_source,
                kind: *kind,
            },
            Transformer::InstantiateUnionMember { member, .. } => Transformer::MatchUnionMember {
                source: new_source,
                member: *member,
            },
            Transformer::MatchUnionMember { member, .. } => Transformer::InstantiateUnionMember {
                source: new_source,
                member: *member,
            },
            Transformer::MatchString { case, .. } => Transformer::ProduceString {
                source: new_source,
                case: case.clone(),
            },
            Transformer::ProduceString { case, .. } => Transformer::MatchString {
                source: new_source,
                case: case.clone(),
            },
            Transformer::Choose { source, options } => Transformer::Choose {
                source: new_source,
                options: options.iter().map(|o| o.reverse(*source)).collect(),
            },
        }
    }

    /// Type refs carried anywhere in the tree.
    pub fn children(&self) -> Vec<TypeRef> {
        let mut refs = vec![self.source()];
        match self {
            Transformer::InstantiateUnionMember { member, .. }
            | Transformer::MatchUnionMember { member, .. } => refs.push(*member),
            Transformer::Choose { options, .. } => {
                for o in options {
                    refs.extend(o.children());
                }
            }
            _ => {}
        }
        refs
    }

    pub fn map_refs(&self, mapper: &mut dyn RefMapper) -> Result<Transformer> {
        Ok(match self {
            Transformer::Decode { source } => Transformer::Decode {
                source: mapper.map_ref(*source)?,
            },
            Transformer::Encode { source } => Transformer::Encode {
                source: mapper.map_ref(*source)?,
            },
            Transformer::ParseString { source, kind } => Transformer::ParseString {
                source: mapper.map_ref(*source)?,
                kind: *kind,
            },
            Transformer::StringifyString { source, kind } => Transformer::StringifyString {
                source: mapper.map_ref(*source)?,
                kind: *kind,
            },
            Transformer::InstantiateUnionMember { source, member } => {
                Transformer::InstantiateUnionMember {
                    source: mapper.map_ref(*source)?,
                    member: mapper.map_ref(*member)?,
                }
            }
            Transformer::MatchUnionMember { source, member } => Transformer::MatchUnionMember {
                source: mapper.map_ref(*source)?,
                member: mapper.map_ref(*member)?,
            },
            Transformer::MatchString { source, case } => Transformer::MatchString {
                source: mapper.map_ref(*source)?,
                case: case.clone(),
            },
            Transformer::ProduceString { source, case } => Transformer::ProduceString {
                source: mapper.map_ref(*source)?,
                case: case.clone(),
            },
            Transformer::Choose { source, options } => Transformer::Choose {
                source: mapper.map_ref(*source)?,
                options: options
                    .iter()
                    .map(|o| o.map_refs(mapper))
                    .collect::<Result<Vec<_>>>()?,
            },
        })
    }
}

/// A transformation attribute: the target the transformer produces plus
/// the transformer tree itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Transformation {
    pub target: TypeRef,
    pub transformer: Transformer,
}

pub struct TransformationAttribute;

impl AttributeSpec for TransformationAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::Transformation
    }

    fn applies_to(&self, _kind: TypeKind) -> bool {
        true
    }

    fn in_identity(&self) -> bool {
        true
    }

    /// Distinct transformations cannot merge; the kind is dropped and the
    /// caller is expected to treat that as lost information.
    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        let mut result: Option<Transformation> = None;
        for value in values {
            if let AttributeValue::Transformation(t) = value {
                match &result {
                    None => result = Some(t),
                    Some(existing) if *existing == t => {}
                    Some(_) => return None,
                }
            }
        }
        result.map(AttributeValue::Transformation)
    }

    fn make_inferred(&self, value: AttributeValue) -> Option<AttributeValue> {
        Some(value)
    }

    fn children(&self, value: &AttributeValue) -> Vec<TypeRef> {
        match value {
            AttributeValue::Transformation(t) => {
                let mut refs = vec![t.target];
                refs.extend(t.transformer.children());
                refs
            }
            _ => Vec::new(),
        }
    }

    fn reconstitute(
        &self,
        mapper: &mut dyn RefMapper,
        value: AttributeValue,
    ) -> Result<AttributeValue> {
        match value {
            AttributeValue::Transformation(t) => {
                Ok(AttributeValue::Transformation(Transformation {
                    target: mapper.map_ref(t.target)?,
                    transformer: t.transformer.map_refs(mapper)?,
                }))
            }
            other => Ok(other),
        }
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::Transformation(t) => Some(format!("{:?}", t.transformer)),
            _ => None,
        }
    }
}
