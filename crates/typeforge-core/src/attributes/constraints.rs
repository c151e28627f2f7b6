//! Schema constraint attributes: numeric ranges, string length ranges,
//! patterns, and URI facts. Constraint values force unique identity so two
//! structurally equal types with different constraints never merge.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::attributes::{AttributeKind, AttributeSpec, AttributeValue, CombinationKind};
use crate::types::TypeKind;

/// Inclusive numeric bounds. Only holds JSON numbers, so NaN cannot occur
/// and equality is total.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MinMax {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Eq for MinMax {}

impl Hash for MinMax {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min.map(f64::to_bits).hash(state);
        self.max.map(f64::to_bits).hash(state);
    }
}

impl MinMax {
    pub fn new(min: Option<f64>, max: Option<f64>) -> MinMax {
        MinMax { min, max }
    }

    pub fn is_trivial(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Union widens: the smaller minimum and the larger maximum survive; a
    /// missing bound on either side stays missing.
    pub fn widen(&self, other: &MinMax) -> MinMax {
        MinMax {
            min: combine_bound(self.min, other.min, f64::min),
            max: combine_bound(self.max, other.max, f64::max),
        }
    }

    /// Intersection narrows: the larger minimum and the smaller maximum
    /// survive; a missing bound defers to the present one.
    pub fn narrow(&self, other: &MinMax) -> MinMax {
        MinMax {
            min: narrow_bound(self.min, other.min, f64::max),
            max: narrow_bound(self.max, other.max, f64::min),
        }
    }
}

fn combine_bound(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        _ => None,
    }
}

fn narrow_bound(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MinMaxLength {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl MinMaxLength {
    pub fn new(min: Option<usize>, max: Option<usize>) -> MinMaxLength {
        MinMaxLength { min, max }
    }

    pub fn is_trivial(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn widen(&self, other: &MinMaxLength) -> MinMaxLength {
        MinMaxLength {
            min: match (self.min, other.min) {
                (Some(a), Some(b)) => Some(a.min(b)),
                _ => None,
            },
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    pub fn narrow(&self, other: &MinMaxLength) -> MinMaxLength {
        MinMaxLength {
            min: match (self.min, other.min) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

/// Protocols and file extensions observed on URI-typed strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct UriInfo {
    pub protocols: BTreeSet<String>,
    pub extensions: BTreeSet<String>,
}

impl UriInfo {
    pub fn merge(&self, other: &UriInfo) -> UriInfo {
        UriInfo {
            protocols: self.protocols.union(&other.protocols).cloned().collect(),
            extensions: self.extensions.union(&other.extensions).cloned().collect(),
        }
    }
}

pub struct MinMaxAttribute;

impl AttributeSpec for MinMaxAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::MinMax
    }

    fn applies_to(&self, kind: TypeKind) -> bool {
        kind == TypeKind::Integer || kind == TypeKind::Double
    }

    fn requires_unique_identity(&self, value: &AttributeValue) -> bool {
        matches!(value, AttributeValue::MinMax(mm) if !mm.is_trivial())
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        merge_min_max(values, CombinationKind::Union)
    }

    fn intersect(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        merge_min_max(values, CombinationKind::Intersect)
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::MinMax(mm) => Some(format!("{:?}..{:?}", mm.min, mm.max)),
            _ => None,
        }
    }
}

fn merge_min_max(values: Vec<AttributeValue>, how: CombinationKind) -> Option<AttributeValue> {
    let mut result: Option<MinMax> = None;
    for value in values {
        if let AttributeValue::MinMax(mm) = value {
            result = Some(match (result, how) {
                (None, _) => mm,
                (Some(r), CombinationKind::Union) => r.widen(&mm),
                (Some(r), CombinationKind::Intersect) => r.narrow(&mm),
            });
        }
    }
    match result {
        Some(mm) if !mm.is_trivial() => Some(AttributeValue::MinMax(mm)),
        _ => None,
    }
}

pub struct MinMaxLengthAttribute;

impl AttributeSpec for MinMaxLengthAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::MinMaxLength
    }

    fn applies_to(&self, kind: TypeKind) -> bool {
        kind == TypeKind::String
    }

    fn requires_unique_identity(&self, value: &AttributeValue) -> bool {
        matches!(value, AttributeValue::MinMaxLength(mm) if !mm.is_trivial())
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        merge_min_max_length(values, CombinationKind::Union)
    }

    fn intersect(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        merge_min_max_length(values, CombinationKind::Intersect)
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::MinMaxLength(mm) => Some(format!("{:?}..{:?}", mm.min, mm.max)),
            _ => None,
        }
    }
}

fn merge_min_max_length(
    values: Vec<AttributeValue>,
    how: CombinationKind,
) -> Option<AttributeValue> {
    let mut result: Option<MinMaxLength> = None;
    for value in values {
        if let AttributeValue::MinMaxLength(mm) = value {
            result = Some(match (result, how) {
                (None, _) => mm,
                (Some(r), CombinationKind::Union) => r.widen(&mm),
                (Some(r), CombinationKind::Intersect) => r.narrow(&mm),
            });
        }
    }
    match result {
        Some(mm) if !mm.is_trivial() => Some(AttributeValue::MinMaxLength(mm)),
        _ => None,
    }
}

pub struct PatternAttribute;

impl AttributeSpec for PatternAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::Pattern
    }

    fn applies_to(&self, kind: TypeKind) -> bool {
        kind == TypeKind::String
    }

    fn requires_unique_identity(&self, value: &AttributeValue) -> bool {
        matches!(value, AttributeValue::Pattern(p) if !p.is_empty())
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        let mut merged = BTreeSet::new();
        for value in values {
            if let AttributeValue::Pattern(p) = value {
                merged.extend(p);
            }
        }
        if merged.is_empty() {
            None
        } else {
            Some(AttributeValue::Pattern(merged))
        }
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::Pattern(p) => Some(p.iter().cloned().collect::<Vec<_>>().join(" | ")),
            _ => None,
        }
    }
}

pub struct UriInfoAttribute;

impl AttributeSpec for UriInfoAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::UriInfo
    }

    fn applies_to(&self, kind: TypeKind) -> bool {
        kind == TypeKind::String || kind == TypeKind::Uri
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        let mut merged = UriInfo::default();
        for value in values {
            if let AttributeValue::UriInfo(u) = value {
                merged = merged.merge(&u);
            }
        }
        Some(AttributeValue::UriInfo(merged))
    }

    fn make_inferred(&self, value: AttributeValue) -> Option<AttributeValue> {
        Some(value)
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::UriInfo(u) => Some(format!(
                "protocols: {:?}, extensions: {:?}",
                u.protocols, u.extensions
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_and_narrow() {
        let a = MinMax::new(Some(0.0), Some(10.0));
        let b = MinMax::new(Some(-1.0), Some(5.0));
        let widened = a.widen(&b);
        assert_eq!(widened.min, Some(-1.0));
        assert_eq!(widened.max, Some(10.0));

        let narrowed = a.narrow(&b);
        assert_eq!(narrowed.min, Some(0.0));
        assert_eq!(narrowed.max, Some(5.0));
    }

    #[test]
    fn test_widen_drops_one_sided_bounds() {
        let a = MinMax::new(Some(0.0), None);
        let b = MinMax::new(Some(2.0), Some(5.0));
        let widened = a.widen(&b);
        assert_eq!(widened.min, Some(0.0));
        assert_eq!(widened.max, None);
    }

    #[test]
    fn test_trivial_min_max_drops() {
        let merged = merge_min_max(
            vec![
                AttributeValue::MinMax(MinMax::default()),
                AttributeValue::MinMax(MinMax::default()),
            ],
            CombinationKind::Union,
        );
        assert!(merged.is_none());
    }
}
