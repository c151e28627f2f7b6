//! Identity-affecting, combinable metadata attached to every type.
//!
//! Each attribute kind is a process-wide singleton implementing
//! [`AttributeSpec`]; the registry maps a stable [`AttributeKind`] id to its
//! singleton. Values live in the closed [`AttributeValue`] payload enum so
//! attribute maps stay hashable for identity participation.

pub mod constraints;
pub mod names;
pub mod strings;

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::error::Result;
use crate::transformer::Transformation;
use crate::type_graph::{RefMapper, TypeRef};
use crate::types::TypeKind;

pub use constraints::{MinMax, MinMaxLength, UriInfo};
pub use names::TypeNames;
pub use strings::StringTypes;

/// Stable identifier of an attribute kind. Registry identity is this id,
/// not pointer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    Names,
    Description,
    PropertyDescriptions,
    AccessorNames,
    EnumValues,
    MinMax,
    MinMaxLength,
    Pattern,
    UriInfo,
    StringTypes,
    UnionIdentifiers,
    UnionMemberNames,
    Transformation,
    Provenance,
}

impl AttributeKind {
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Names => "names",
            AttributeKind::Description => "description",
            AttributeKind::PropertyDescriptions => "propertyDescriptions",
            AttributeKind::AccessorNames => "accessorNames",
            AttributeKind::EnumValues => "enumValues",
            AttributeKind::MinMax => "minMax",
            AttributeKind::MinMaxLength => "minMaxLength",
            AttributeKind::Pattern => "pattern",
            AttributeKind::UriInfo => "uriInfo",
            AttributeKind::StringTypes => "stringTypes",
            AttributeKind::UnionIdentifiers => "unionIdentifiers",
            AttributeKind::UnionMemberNames => "unionMemberNames",
            AttributeKind::Transformation => "transformation",
            AttributeKind::Provenance => "provenance",
        }
    }

    pub fn spec(self) -> &'static dyn AttributeSpec {
        registry::spec_for(self)
    }
}

/// Attribute payloads. The enum is closed so that attribute maps have
/// total equality and hashing; `EnumValues` hashes through its canonical
/// JSON text (serde_json numbers cannot be NaN, so equality is total).
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Names(TypeNames),
    Description(BTreeSet<String>),
    PropertyDescriptions(BTreeMap<String, BTreeSet<String>>),
    AccessorNames(BTreeMap<String, String>),
    EnumValues(BTreeMap<String, serde_json::Value>),
    MinMax(MinMax),
    MinMaxLength(MinMaxLength),
    Pattern(BTreeSet<String>),
    UriInfo(UriInfo),
    StringTypes(StringTypes),
    UnionIdentifiers(BTreeSet<u64>),
    UnionMemberNames(BTreeMap<u64, TypeNames>),
    Transformation(Transformation),
    Provenance(BTreeSet<usize>),
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttributeValue::Names(v) => v.hash(state),
            AttributeValue::Description(v) => v.hash(state),
            AttributeValue::PropertyDescriptions(v) => v.hash(state),
            AttributeValue::AccessorNames(v) => v.hash(state),
            AttributeValue::EnumValues(v) => {
                for (k, value) in v {
                    k.hash(state);
                    value.to_string().hash(state);
                }
            }
            AttributeValue::MinMax(v) => v.hash(state),
            AttributeValue::MinMaxLength(v) => v.hash(state),
            AttributeValue::Pattern(v) => v.hash(state),
            AttributeValue::UriInfo(v) => v.hash(state),
            AttributeValue::StringTypes(v) => v.hash(state),
            AttributeValue::UnionIdentifiers(v) => v.hash(state),
            AttributeValue::UnionMemberNames(v) => v.hash(state),
            AttributeValue::Transformation(v) => v.hash(state),
            AttributeValue::Provenance(v) => v.hash(state),
        }
    }
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Names(_) => AttributeKind::Names,
            AttributeValue::Description(_) => AttributeKind::Description,
            AttributeValue::PropertyDescriptions(_) => AttributeKind::PropertyDescriptions,
            AttributeValue::AccessorNames(_) => AttributeKind::AccessorNames,
            AttributeValue::EnumValues(_) => AttributeKind::EnumValues,
            AttributeValue::MinMax(_) => AttributeKind::MinMax,
            AttributeValue::MinMaxLength(_) => AttributeKind::MinMaxLength,
            AttributeValue::Pattern(_) => AttributeKind::Pattern,
            AttributeValue::UriInfo(_) => AttributeKind::UriInfo,
            AttributeValue::StringTypes(_) => AttributeKind::StringTypes,
            AttributeValue::UnionIdentifiers(_) => AttributeKind::UnionIdentifiers,
            AttributeValue::UnionMemberNames(_) => AttributeKind::UnionMemberNames,
            AttributeValue::Transformation(_) => AttributeKind::Transformation,
            AttributeValue::Provenance(_) => AttributeKind::Provenance,
        }
    }
}

/// How attribute values merge when types are composed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombinationKind {
    Union,
    Intersect,
}

/// Behavior contract of one attribute kind.
pub trait AttributeSpec: Sync {
    fn kind(&self) -> AttributeKind;

    /// May this attribute attach to a type of the given kind?
    fn applies_to(&self, kind: TypeKind) -> bool;

    /// Does this attribute participate in type identity?
    fn in_identity(&self) -> bool {
        false
    }

    /// Does carrying this value force a fresh, never-deduplicated type?
    fn requires_unique_identity(&self, _value: &AttributeValue) -> bool {
        false
    }

    /// Merge under union composition. `None` drops the kind.
    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue>;

    /// Merge under intersection composition; defaults to `combine`.
    fn intersect(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        self.combine(values)
    }

    /// Demote an explicitly given attribute to an inferred one. `None`
    /// drops the kind.
    fn make_inferred(&self, _value: AttributeValue) -> Option<AttributeValue> {
        None
    }

    /// Widen the namedness distance of the value.
    fn increase_distance(&self, value: AttributeValue) -> Option<AttributeValue> {
        Some(value)
    }

    /// Type references transitively owned by this value.
    fn children(&self, _value: &AttributeValue) -> Vec<TypeRef> {
        Vec::new()
    }

    /// Rebuild the value across a graph rewrite.
    fn reconstitute(
        &self,
        _mapper: &mut dyn RefMapper,
        value: AttributeValue,
    ) -> Result<AttributeValue> {
        Ok(value)
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String>;
}

mod registry {
    use super::constraints::{
        MinMaxAttribute, MinMaxLengthAttribute, PatternAttribute, UriInfoAttribute,
    };
    use super::names::NamesAttribute;
    use super::strings::StringTypesAttribute;
    use super::*;
    use crate::transformer::TransformationAttribute;

    macro_rules! set_attribute {
        ($name:ident, $kind:ident, $payload:ident, inferred: $keep:expr) => {
            pub struct $name;
            impl AttributeSpec for $name {
                fn kind(&self) -> AttributeKind {
                    AttributeKind::$kind
                }
                fn applies_to(&self, _kind: TypeKind) -> bool {
                    true
                }
                fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
                    let mut merged = Default::default();
                    for v in values {
                        if let AttributeValue::$payload(s) = v {
                            merge_into(&mut merged, s);
                        }
                    }
                    Some(AttributeValue::$payload(merged))
                }
                fn make_inferred(&self, value: AttributeValue) -> Option<AttributeValue> {
                    if $keep {
                        Some(value)
                    } else {
                        None
                    }
                }
                fn stringify(&self, value: &AttributeValue) -> Option<String> {
                    if let AttributeValue::$payload(s) = value {
                        Some(format!("{:?}", s))
                    } else {
                        None
                    }
                }
            }
        };
    }

    trait MergeInto {
        fn merge(&mut self, other: Self);
    }

    impl<T: Ord> MergeInto for BTreeSet<T> {
        fn merge(&mut self, other: Self) {
            self.extend(other);
        }
    }

    fn merge_into<T: MergeInto>(target: &mut T, other: T) {
        target.merge(other);
    }

    impl MergeInto for BTreeMap<String, BTreeSet<String>> {
        fn merge(&mut self, other: Self) {
            for (k, v) in other {
                self.entry(k).or_default().extend(v);
            }
        }
    }

    // Accessor names and enum values keep the first value seen per key.
    impl MergeInto for BTreeMap<String, String> {
        fn merge(&mut self, other: Self) {
            for (k, v) in other {
                self.entry(k).or_insert(v);
            }
        }
    }

    impl MergeInto for BTreeMap<String, serde_json::Value> {
        fn merge(&mut self, other: Self) {
            for (k, v) in other {
                self.entry(k).or_insert(v);
            }
        }
    }

    impl MergeInto for BTreeMap<u64, TypeNames> {
        fn merge(&mut self, other: Self) {
            for (k, v) in other {
                match self.remove(&k) {
                    Some(existing) => {
                        self.insert(k, existing.add(&v));
                    }
                    None => {
                        self.insert(k, v);
                    }
                }
            }
        }
    }

    set_attribute!(DescriptionAttribute, Description, Description, inferred: false);
    set_attribute!(
        PropertyDescriptionsAttribute,
        PropertyDescriptions,
        PropertyDescriptions,
        inferred: true
    );
    set_attribute!(AccessorNamesAttribute, AccessorNames, AccessorNames, inferred: false);
    set_attribute!(EnumValuesAttribute, EnumValues, EnumValues, inferred: false);
    set_attribute!(
        UnionIdentifiersAttribute,
        UnionIdentifiers,
        UnionIdentifiers,
        inferred: true
    );
    set_attribute!(
        UnionMemberNamesAttribute,
        UnionMemberNames,
        UnionMemberNames,
        inferred: true
    );
    set_attribute!(ProvenanceAttribute, Provenance, Provenance, inferred: true);

    static NAMES: NamesAttribute = NamesAttribute;
    static DESCRIPTION: DescriptionAttribute = DescriptionAttribute;
    static PROPERTY_DESCRIPTIONS: PropertyDescriptionsAttribute = PropertyDescriptionsAttribute;
    static ACCESSOR_NAMES: AccessorNamesAttribute = AccessorNamesAttribute;
    static ENUM_VALUES: EnumValuesAttribute = EnumValuesAttribute;
    static MIN_MAX: MinMaxAttribute = MinMaxAttribute;
    static MIN_MAX_LENGTH: MinMaxLengthAttribute = MinMaxLengthAttribute;
    static PATTERN: PatternAttribute = PatternAttribute;
    static URI_INFO: UriInfoAttribute = UriInfoAttribute;
    static STRING_TYPES: StringTypesAttribute = StringTypesAttribute;
    static UNION_IDENTIFIERS: UnionIdentifiersAttribute = UnionIdentifiersAttribute;
    static UNION_MEMBER_NAMES: UnionMemberNamesAttribute = UnionMemberNamesAttribute;
    static TRANSFORMATION: TransformationAttribute = TransformationAttribute;
    static PROVENANCE: ProvenanceAttribute = ProvenanceAttribute;

    pub fn spec_for(kind: AttributeKind) -> &'static dyn AttributeSpec {
        match kind {
            AttributeKind::Names => &NAMES,
            AttributeKind::Description => &DESCRIPTION,
            AttributeKind::PropertyDescriptions => &PROPERTY_DESCRIPTIONS,
            AttributeKind::AccessorNames => &ACCESSOR_NAMES,
            AttributeKind::EnumValues => &ENUM_VALUES,
            AttributeKind::MinMax => &MIN_MAX,
            AttributeKind::MinMaxLength => &MIN_MAX_LENGTH,
            AttributeKind::Pattern => &PATTERN,
            AttributeKind::UriInfo => &URI_INFO,
            AttributeKind::StringTypes => &STRING_TYPES,
            AttributeKind::UnionIdentifiers => &UNION_IDENTIFIERS,
            AttributeKind::UnionMemberNames => &UNION_MEMBER_NAMES,
            AttributeKind::Transformation => &TRANSFORMATION,
            AttributeKind::Provenance => &PROVENANCE,
        }
    }
}

/// Immutable mapping from attribute kind to value. All mutating operations
/// produce a new map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeAttributes {
    map: BTreeMap<AttributeKind, AttributeValue>,
}

impl TypeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one(value: AttributeValue) -> Self {
        let mut map = BTreeMap::new();
        map.insert(value.kind(), value);
        TypeAttributes { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, kind: AttributeKind) -> Option<&AttributeValue> {
        self.map.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeKind, &AttributeValue)> {
        self.map.iter()
    }

    pub fn names(&self) -> Option<&TypeNames> {
        match self.map.get(&AttributeKind::Names) {
            Some(AttributeValue::Names(n)) => Some(n),
            _ => None,
        }
    }

    pub fn string_types(&self) -> Option<&StringTypes> {
        match self.map.get(&AttributeKind::StringTypes) {
            Some(AttributeValue::StringTypes(s)) => Some(s),
            _ => None,
        }
    }

    pub fn transformation(&self) -> Option<&Transformation> {
        match self.map.get(&AttributeKind::Transformation) {
            Some(AttributeValue::Transformation(t)) => Some(t),
            _ => None,
        }
    }

    /// Returns a copy with `value` set, replacing any existing value of the
    /// same kind.
    pub fn with(&self, value: AttributeValue) -> Self {
        let mut map = self.map.clone();
        map.insert(value.kind(), value);
        TypeAttributes { map }
    }

    /// Returns a copy without the given kind.
    pub fn without(&self, kind: AttributeKind) -> Self {
        let mut map = self.map.clone();
        map.remove(&kind);
        TypeAttributes { map }
    }

    /// Merge two attribute maps under the given composition; kinds whose
    /// rule yields `None` are dropped.
    pub fn combine_with(&self, other: &TypeAttributes, how: CombinationKind) -> TypeAttributes {
        TypeAttributes::combine(vec![self.clone(), other.clone()], how)
    }

    pub fn combine(all: Vec<TypeAttributes>, how: CombinationKind) -> TypeAttributes {
        let mut grouped: BTreeMap<AttributeKind, Vec<AttributeValue>> = BTreeMap::new();
        for attrs in all {
            for (kind, value) in attrs.map {
                grouped.entry(kind).or_default().push(value);
            }
        }
        let mut map = BTreeMap::new();
        for (kind, mut values) in grouped {
            let spec = kind.spec();
            let combined = if values.len() == 1 {
                Some(values.pop().unwrap())
            } else {
                match how {
                    CombinationKind::Union => spec.combine(values),
                    CombinationKind::Intersect => spec.intersect(values),
                }
            };
            if let Some(v) = combined {
                map.insert(kind, v);
            }
        }
        TypeAttributes { map }
    }

    pub fn make_inferred(self) -> TypeAttributes {
        let mut map = BTreeMap::new();
        for (kind, value) in self.map {
            if let Some(v) = kind.spec().make_inferred(value) {
                map.insert(kind, v);
            }
        }
        TypeAttributes { map }
    }

    pub fn increase_distance(self) -> TypeAttributes {
        let mut map = BTreeMap::new();
        for (kind, value) in self.map {
            if let Some(v) = kind.spec().increase_distance(value) {
                map.insert(kind, v);
            }
        }
        TypeAttributes { map }
    }

    /// The identity-participating subset, in kind order.
    pub fn for_identity(&self) -> Vec<(AttributeKind, AttributeValue)> {
        self.map
            .iter()
            .filter(|(kind, _)| kind.spec().in_identity())
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn requires_unique_identity(&self) -> bool {
        self.map
            .iter()
            .any(|(kind, value)| kind.spec().requires_unique_identity(value))
    }

    /// Type references owned by attribute values (transformations).
    pub fn children(&self) -> Vec<TypeRef> {
        let mut refs = Vec::new();
        for (kind, value) in &self.map {
            refs.extend(kind.spec().children(value));
        }
        refs
    }

    pub fn reconstitute(self, mapper: &mut dyn RefMapper) -> Result<TypeAttributes> {
        let mut map = BTreeMap::new();
        for (kind, value) in self.map {
            map.insert(kind, kind.spec().reconstitute(mapper, value)?);
        }
        Ok(TypeAttributes { map })
    }

    /// Split into (identity-affecting, other) halves.
    pub fn split_identity(self) -> (TypeAttributes, TypeAttributes) {
        let mut identity = BTreeMap::new();
        let mut rest = BTreeMap::new();
        for (kind, value) in self.map {
            if kind.spec().in_identity() {
                identity.insert(kind, value);
            } else {
                rest.insert(kind, value);
            }
        }
        (
            TypeAttributes { map: identity },
            TypeAttributes { map: rest },
        )
    }
}

impl Hash for TypeAttributes {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (kind, value) in &self.map {
            kind.hash(state);
            value.hash(state);
        }
    }
}

impl FromIterator<AttributeValue> for TypeAttributes {
    fn from_iter<I: IntoIterator<Item = AttributeValue>>(iter: I) -> Self {
        let mut map = BTreeMap::new();
        for value in iter {
            map.insert(value.kind(), value);
        }
        TypeAttributes { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(s: &str) -> AttributeValue {
        AttributeValue::Description(BTreeSet::from([s.to_string()]))
    }

    #[test]
    fn test_combine_unions_descriptions() {
        let a = TypeAttributes::one(description("from schema"));
        let b = TypeAttributes::one(description("from sample"));
        let combined = a.combine_with(&b, CombinationKind::Union);
        match combined.get(AttributeKind::Description) {
            Some(AttributeValue::Description(set)) => assert_eq!(set.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_make_inferred_drops_description() {
        let attrs = TypeAttributes::one(description("doc"));
        assert!(attrs.make_inferred().get(AttributeKind::Description).is_none());
    }

    #[test]
    fn test_provenance_survives_make_inferred() {
        let attrs = TypeAttributes::one(AttributeValue::Provenance(BTreeSet::from([3usize])));
        assert!(attrs.make_inferred().get(AttributeKind::Provenance).is_some());
    }

    #[test]
    fn test_identity_split() {
        let attrs = TypeAttributes::one(description("doc")).with(AttributeValue::StringTypes(
            StringTypes::unrestricted(),
        ));
        let (identity, rest) = attrs.split_identity();
        assert!(identity.get(AttributeKind::StringTypes).is_some());
        assert!(rest.get(AttributeKind::Description).is_some());
    }
}
