//! The tagged type variant and its identity components.
//!
//! Types reference each other only through [`TypeRef`] handles; structural
//! queries that need to resolve children live on
//! [`crate::type_graph::TypeGraph`].

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::TypeAttributes;
use crate::internal_assert;
use crate::type_graph::TypeRef;

/// Primitive kinds, including the transformed-string refinements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    Uuid,
    Uri,
    IntegerString,
    BoolString,
}

impl PrimitiveKind {
    pub fn type_kind(self) -> TypeKind {
        match self {
            PrimitiveKind::None => TypeKind::None,
            PrimitiveKind::Any => TypeKind::Any,
            PrimitiveKind::Null => TypeKind::Null,
            PrimitiveKind::Bool => TypeKind::Bool,
            PrimitiveKind::Integer => TypeKind::Integer,
            PrimitiveKind::Double => TypeKind::Double,
            PrimitiveKind::String => TypeKind::String,
            PrimitiveKind::Date => TypeKind::Date,
            PrimitiveKind::Time => TypeKind::Time,
            PrimitiveKind::DateTime => TypeKind::DateTime,
            PrimitiveKind::Uuid => TypeKind::Uuid,
            PrimitiveKind::Uri => TypeKind::Uri,
            PrimitiveKind::IntegerString => TypeKind::IntegerString,
            PrimitiveKind::BoolString => TypeKind::BoolString,
        }
    }

    pub fn is_transformed_string(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Date
                | PrimitiveKind::Time
                | PrimitiveKind::DateTime
                | PrimitiveKind::Uuid
                | PrimitiveKind::Uri
                | PrimitiveKind::IntegerString
                | PrimitiveKind::BoolString
        )
    }

    pub fn is_string_like(self) -> bool {
        self == PrimitiveKind::String || self.is_transformed_string()
    }

    pub fn is_number(self) -> bool {
        matches!(self, PrimitiveKind::Integer | PrimitiveKind::Double)
    }

    pub const ALL_TRANSFORMED: [PrimitiveKind; 7] = [
        PrimitiveKind::Date,
        PrimitiveKind::Time,
        PrimitiveKind::DateTime,
        PrimitiveKind::Uuid,
        PrimitiveKind::Uri,
        PrimitiveKind::IntegerString,
        PrimitiveKind::BoolString,
    ];
}

/// Kind tags over all types, primitive and compound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    Uuid,
    Uri,
    IntegerString,
    BoolString,
    Array,
    Class,
    Object,
    Map,
    Enum,
    Union,
    Intersection,
}

impl TypeKind {
    pub fn primitive(self) -> Option<PrimitiveKind> {
        match self {
            TypeKind::None => Some(PrimitiveKind::None),
            TypeKind::Any => Some(PrimitiveKind::Any),
            TypeKind::Null => Some(PrimitiveKind::Null),
            TypeKind::Bool => Some(PrimitiveKind::Bool),
            TypeKind::Integer => Some(PrimitiveKind::Integer),
            TypeKind::Double => Some(PrimitiveKind::Double),
            TypeKind::String => Some(PrimitiveKind::String),
            TypeKind::Date => Some(PrimitiveKind::Date),
            TypeKind::Time => Some(PrimitiveKind::Time),
            TypeKind::DateTime => Some(PrimitiveKind::DateTime),
            TypeKind::Uuid => Some(PrimitiveKind::Uuid),
            TypeKind::Uri => Some(PrimitiveKind::Uri),
            TypeKind::IntegerString => Some(PrimitiveKind::IntegerString),
            TypeKind::BoolString => Some(PrimitiveKind::BoolString),
            _ => None,
        }
    }

    pub fn is_primitive(self) -> bool {
        self.primitive().is_some()
    }

    pub fn is_object_like(self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Object | TypeKind::Map)
    }

    pub fn is_set_operation(self) -> bool {
        matches!(self, TypeKind::Union | TypeKind::Intersection)
    }

    pub fn is_string_like(self) -> bool {
        self.primitive().map_or(false, PrimitiveKind::is_string_like)
    }
}

/// Which face of the object family a type shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// Full object: named properties and possibly additional properties.
    Object,
    /// Fixed named properties, no additional properties.
    Class,
    /// No named properties, only an additional-properties type.
    Map,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassProperty {
    pub type_ref: TypeRef,
    pub is_optional: bool,
}

impl ClassProperty {
    pub fn new(type_ref: TypeRef, is_optional: bool) -> ClassProperty {
        ClassProperty {
            type_ref,
            is_optional,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectData {
    pub object_kind: ObjectKind,
    pub is_fixed: bool,
    /// `None` until `set_object_properties` commits them.
    pub properties: Option<BTreeMap<String, ClassProperty>>,
    pub additional_properties: Option<TypeRef>,
}

impl ObjectData {
    pub fn class(properties: BTreeMap<String, ClassProperty>, is_fixed: bool) -> ObjectData {
        ObjectData {
            object_kind: ObjectKind::Class,
            is_fixed,
            properties: Some(properties),
            additional_properties: None,
        }
    }

    pub fn map(values: TypeRef) -> ObjectData {
        ObjectData {
            object_kind: ObjectKind::Map,
            is_fixed: false,
            properties: Some(BTreeMap::new()),
            additional_properties: Some(values),
        }
    }

    pub fn full(
        properties: Option<BTreeMap<String, ClassProperty>>,
        additional_properties: Option<TypeRef>,
    ) -> ObjectData {
        ObjectData {
            object_kind: ObjectKind::Object,
            is_fixed: true,
            properties,
            additional_properties,
        }
    }

    /// Committed properties; fatal when queried before they are set.
    pub fn properties(&self) -> &BTreeMap<String, ClassProperty> {
        match &self.properties {
            Some(p) => p,
            None => {
                internal_assert!(false, "object properties queried before being set");
                unreachable!()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Primitive(PrimitiveKind),
    Array {
        /// `None` until `set_array_items` commits it.
        items: Option<TypeRef>,
    },
    Object(ObjectData),
    Enum {
        cases: BTreeSet<String>,
    },
    Union {
        /// `None` until `set_set_operation_members` commits them.
        members: Option<BTreeSet<TypeRef>>,
    },
    Intersection {
        members: Option<BTreeSet<TypeRef>>,
    },
}

impl Type {
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Primitive(k) => k.type_kind(),
            Type::Array { .. } => TypeKind::Array,
            Type::Object(data) => match data.object_kind {
                ObjectKind::Object => TypeKind::Object,
                ObjectKind::Class => TypeKind::Class,
                ObjectKind::Map => TypeKind::Map,
            },
            Type::Enum { .. } => TypeKind::Enum,
            Type::Union { .. } => TypeKind::Union,
            Type::Intersection { .. } => TypeKind::Intersection,
        }
    }

    /// Direct type references from structural fields only, in deterministic
    /// order: array item, properties in sorted key order, additional
    /// properties, set-operation members in ref order.
    pub fn non_attribute_children(&self) -> Vec<TypeRef> {
        match self {
            Type::Primitive(_) | Type::Enum { .. } => Vec::new(),
            Type::Array { items } => items.iter().copied().collect(),
            Type::Object(data) => {
                let mut children: Vec<TypeRef> = data
                    .properties
                    .iter()
                    .flat_map(|props| props.values().map(|p| p.type_ref))
                    .collect();
                children.extend(data.additional_properties);
                children
            }
            Type::Union { members } | Type::Intersection { members } => members
                .iter()
                .flat_map(|m| m.iter().copied())
                .collect(),
        }
    }

    /// Committed members of a set operation; fatal for other kinds or when
    /// queried before the members are set.
    pub fn set_operation_members(&self) -> &BTreeSet<TypeRef> {
        match self {
            Type::Union { members: Some(m) } | Type::Intersection { members: Some(m) } => m,
            Type::Union { members: None } | Type::Intersection { members: None } => {
                internal_assert!(false, "set-operation members queried before being set");
                unreachable!()
            }
            _ => {
                internal_assert!(false, "set_operation_members on {:?}", self.kind());
                unreachable!()
            }
        }
    }

    /// Committed array item; fatal otherwise.
    pub fn array_items(&self) -> TypeRef {
        match self {
            Type::Array { items: Some(r) } => *r,
            Type::Array { items: None } => {
                internal_assert!(false, "array items queried before being set");
                unreachable!()
            }
            _ => {
                internal_assert!(false, "array_items on {:?}", self.kind());
                unreachable!()
            }
        }
    }

    pub fn object_data(&self) -> &ObjectData {
        match self {
            Type::Object(data) => data,
            _ => {
                internal_assert!(false, "object_data on {:?}", self.kind());
                unreachable!()
            }
        }
    }

    pub fn enum_cases(&self) -> &BTreeSet<String> {
        match self {
            Type::Enum { cases } => cases,
            _ => {
                internal_assert!(false, "enum_cases on {:?}", self.kind());
                unreachable!()
            }
        }
    }

    /// The identity tuple for deduplication, or `None` when the type (or
    /// its attributes) demands a fresh, never-shared instance. Types whose
    /// set-once fields are still open have no identity.
    pub fn identity(&self, attributes: &TypeAttributes) -> Option<TypeIdentity> {
        if attributes.requires_unique_identity() {
            return None;
        }
        let components = match self {
            Type::Primitive(_) => IdentityComponents::Unit,
            Type::Array { items } => IdentityComponents::Item((*items)?),
            Type::Enum { cases } => IdentityComponents::Cases(cases.clone()),
            Type::Object(data) => match data.object_kind {
                // Full objects are always built unique.
                ObjectKind::Object => return None,
                ObjectKind::Map => IdentityComponents::Item(data.additional_properties?),
                ObjectKind::Class => IdentityComponents::Properties(
                    data.properties
                        .as_ref()?
                        .iter()
                        .map(|(name, p)| (name.clone(), p.type_ref, p.is_optional))
                        .collect(),
                ),
            },
            Type::Union { members } | Type::Intersection { members } => {
                IdentityComponents::Members(members.clone()?)
            }
        };
        Some(TypeIdentity {
            kind: self.kind(),
            components,
            attributes: attributes.for_identity(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentityComponents {
    Unit,
    Item(TypeRef),
    Cases(BTreeSet<String>),
    Properties(Vec<(String, TypeRef, bool)>),
    Members(BTreeSet<TypeRef>),
}

/// The tuple `(kind, identity-components, identity-affecting attributes)`
/// under which the builder deduplicates types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    kind: TypeKind,
    components: IdentityComponents,
    attributes: Vec<(crate::attributes::AttributeKind, crate::attributes::AttributeValue)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeValue, StringTypes};

    fn fake_ref(index: u32) -> TypeRef {
        TypeRef::for_tests(7, index)
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(Type::Primitive(PrimitiveKind::Null).kind(), TypeKind::Null);
        assert_eq!(
            Type::Object(ObjectData::map(fake_ref(0))).kind(),
            TypeKind::Map
        );
        assert_eq!(
            Type::Object(ObjectData::class(BTreeMap::new(), true)).kind(),
            TypeKind::Class
        );
    }

    #[test]
    fn test_children_order() {
        let mut props = BTreeMap::new();
        props.insert("b".to_string(), ClassProperty::new(fake_ref(2), false));
        props.insert("a".to_string(), ClassProperty::new(fake_ref(1), true));
        let ty = Type::Object(ObjectData::class(props, true));
        assert_eq!(
            ty.non_attribute_children(),
            vec![fake_ref(1), fake_ref(2)]
        );
    }

    #[test]
    fn test_identity_requires_committed_fields() {
        let open_array = Type::Array { items: None };
        assert!(open_array.identity(&TypeAttributes::new()).is_none());

        let closed_array = Type::Array {
            items: Some(fake_ref(3)),
        };
        assert!(closed_array.identity(&TypeAttributes::new()).is_some());
    }

    #[test]
    fn test_identity_includes_identity_attributes() {
        let attrs = TypeAttributes::one(AttributeValue::StringTypes(StringTypes::case("red")));
        let plain = Type::Primitive(PrimitiveKind::String).identity(&TypeAttributes::new());
        let restricted = Type::Primitive(PrimitiveKind::String).identity(&attrs);
        assert_ne!(plain, restricted);
    }

    #[test]
    fn test_transformed_string_kinds() {
        for kind in PrimitiveKind::ALL_TRANSFORMED {
            assert!(kind.is_transformed_string());
            assert!(kind.is_string_like());
        }
        assert!(!PrimitiveKind::String.is_transformed_string());
        assert!(PrimitiveKind::String.is_string_like());
    }
}
