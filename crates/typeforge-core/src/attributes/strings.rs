//! The string-types attribute: observed enum case counts plus the set of
//! transformed-string kinds a string was recognized as. Participates in
//! type identity so restricted strings never deduplicate with unrestricted
//! ones.

use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::{AttributeKind, AttributeSpec, AttributeValue};
use crate::internal_assert;
use crate::types::{PrimitiveKind, TypeKind};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringTypes {
    /// Observed case strings with occurrence counts; `None` means the
    /// string is unrestricted and cases are no longer tracked.
    pub case_counts: Option<BTreeMap<String, usize>>,
    /// Transformed-string kinds this string was recognized as.
    pub transformations: BTreeSet<PrimitiveKind>,
}

impl StringTypes {
    pub fn unrestricted() -> StringTypes {
        StringTypes {
            case_counts: None,
            transformations: BTreeSet::new(),
        }
    }

    pub fn restricted(case_counts: BTreeMap<String, usize>) -> StringTypes {
        StringTypes {
            case_counts: Some(case_counts),
            transformations: BTreeSet::new(),
        }
    }

    pub fn case(s: impl Into<String>) -> StringTypes {
        StringTypes::restricted(BTreeMap::from([(s.into(), 1)]))
    }

    pub fn transformed(kind: PrimitiveKind) -> StringTypes {
        internal_assert!(
            kind.is_transformed_string(),
            "{:?} is not a transformed-string kind",
            kind
        );
        StringTypes {
            case_counts: Some(BTreeMap::new()),
            transformations: BTreeSet::from([kind]),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.case_counts.is_some()
    }

    /// Union merge: case maps merge with per-key count sums (an
    /// unrestricted side absorbs); transformation kinds merge as set union.
    /// The two merges are deliberately independent.
    pub fn union_with(&self, other: &StringTypes) -> StringTypes {
        let case_counts = match (&self.case_counts, &other.case_counts) {
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                for (case, count) in b {
                    *merged.entry(case.clone()).or_insert(0) += count;
                }
                Some(merged)
            }
            _ => None,
        };
        StringTypes {
            case_counts,
            transformations: self
                .transformations
                .union(&other.transformations)
                .copied()
                .collect(),
        }
    }

    /// Intersection merge: only cases present on both sides survive, at
    /// their smaller count; an unrestricted side is the identity.
    pub fn intersect_with(&self, other: &StringTypes) -> StringTypes {
        let case_counts = match (&self.case_counts, &other.case_counts) {
            (None, cases) | (cases, None) => cases.clone(),
            (Some(a), Some(b)) => Some(
                a.iter()
                    .filter_map(|(case, count)| {
                        b.get(case).map(|c2| (case.clone(), *count.min(c2)))
                    })
                    .collect(),
            ),
        };
        StringTypes {
            case_counts,
            transformations: self
                .transformations
                .intersection(&other.transformations)
                .copied()
                .collect(),
        }
    }
}

pub struct StringTypesAttribute;

impl AttributeSpec for StringTypesAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::StringTypes
    }

    fn applies_to(&self, kind: TypeKind) -> bool {
        kind == TypeKind::String
    }

    fn in_identity(&self) -> bool {
        true
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        fold(values, StringTypes::union_with)
    }

    fn intersect(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        fold(values, StringTypes::intersect_with)
    }

    fn make_inferred(&self, value: AttributeValue) -> Option<AttributeValue> {
        Some(value)
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::StringTypes(st) => match &st.case_counts {
                None => Some("unrestricted".to_string()),
                Some(cases) => Some(format!(
                    "{} case(s), {} transformation(s)",
                    cases.len(),
                    st.transformations.len()
                )),
            },
            _ => None,
        }
    }
}

fn fold(
    values: Vec<AttributeValue>,
    merge: impl Fn(&StringTypes, &StringTypes) -> StringTypes,
) -> Option<AttributeValue> {
    let mut result: Option<StringTypes> = None;
    for value in values {
        if let AttributeValue::StringTypes(st) = value {
            result = Some(match result {
                None => st,
                Some(r) => merge(&r, &st),
            });
        }
    }
    result.map(AttributeValue::StringTypes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_sums_case_counts() {
        let a = StringTypes::restricted(BTreeMap::from([("red".to_string(), 2)]));
        let b = StringTypes::restricted(BTreeMap::from([
            ("red".to_string(), 1),
            ("blue".to_string(), 5),
        ]));
        let merged = a.union_with(&b);
        let cases = merged.case_counts.unwrap();
        assert_eq!(cases["red"], 3);
        assert_eq!(cases["blue"], 5);
    }

    #[test]
    fn test_union_with_unrestricted_absorbs_cases() {
        let a = StringTypes::case("red");
        let merged = a.union_with(&StringTypes::unrestricted());
        assert!(merged.case_counts.is_none());
    }

    #[test]
    fn test_transformations_union_independent_of_cases() {
        let a = StringTypes::transformed(PrimitiveKind::Date);
        let b = StringTypes::transformed(PrimitiveKind::Uuid);
        let merged = a.union_with(&b);
        assert_eq!(merged.transformations.len(), 2);
        assert_eq!(merged.case_counts, Some(BTreeMap::new()));
    }

    #[test]
    fn test_intersect_takes_min_counts() {
        let a = StringTypes::restricted(BTreeMap::from([
            ("red".to_string(), 3),
            ("green".to_string(), 1),
        ]));
        let b = StringTypes::restricted(BTreeMap::from([("red".to_string(), 2)]));
        let merged = a.intersect_with(&b);
        let cases = merged.case_counts.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases["red"], 2);
    }
}
