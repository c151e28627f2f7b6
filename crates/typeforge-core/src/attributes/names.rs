//! The names attribute: candidate names for a type, with an inference
//! distance. Distance 0 means the name was given explicitly; larger values
//! mean the name was propagated from further away (property keys, enclosing
//! types) and should lose against closer names.

use std::collections::BTreeSet;

use crate::attributes::{AttributeKind, AttributeSpec, AttributeValue};
use crate::types::TypeKind;
use crate::words::{common_prefix_length, common_suffix_length, normalized_words, singularize};

/// Past this many accumulated names we stop tracking them individually and
/// substitute one synthetic name; huge samples otherwise drown the namer.
const TOO_MANY_NAMES_THRESHOLD: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeNames {
    Regular {
        names: BTreeSet<String>,
        alternative_names: Option<BTreeSet<String>>,
        distance: u32,
    },
    TooMany {
        distance: u32,
        name: String,
    },
}

impl TypeNames {
    pub fn new(
        names: BTreeSet<String>,
        alternative_names: Option<BTreeSet<String>>,
        distance: u32,
    ) -> TypeNames {
        if names.len() > TOO_MANY_NAMES_THRESHOLD {
            let name = synthetic_name(stable_hash(&names));
            TypeNames::TooMany { distance, name }
        } else {
            TypeNames::Regular {
                names,
                alternative_names,
                distance,
            }
        }
    }

    pub fn given(name: impl Into<String>) -> TypeNames {
        TypeNames::new(BTreeSet::from([name.into()]), None, 0)
    }

    pub fn inferred(name: impl Into<String>, distance: u32) -> TypeNames {
        TypeNames::new(BTreeSet::from([name.into()]), None, distance)
    }

    pub fn distance(&self) -> u32 {
        match self {
            TypeNames::Regular { distance, .. } | TypeNames::TooMany { distance, .. } => *distance,
        }
    }

    pub fn are_inferred(&self) -> bool {
        self.distance() > 0
    }

    /// Merge two name sets: the smaller distance wins outright; on a tie
    /// the name sets union.
    pub fn add(&self, other: &TypeNames) -> TypeNames {
        let (closer, further) = if self.distance() <= other.distance() {
            (self, other)
        } else {
            (other, self)
        };
        if closer.distance() < further.distance() {
            return closer.clone();
        }
        match (closer, further) {
            (
                TypeNames::Regular {
                    names: n1,
                    alternative_names: a1,
                    distance,
                },
                TypeNames::Regular {
                    names: n2,
                    alternative_names: a2,
                    ..
                },
            ) => {
                let names: BTreeSet<String> = n1.union(n2).cloned().collect();
                let alternative_names = match (a1, a2) {
                    (None, None) => None,
                    (Some(a), None) | (None, Some(a)) => Some(a.clone()),
                    (Some(a), Some(b)) => Some(a.union(b).cloned().collect()),
                };
                TypeNames::new(names, alternative_names, *distance)
            }
            // TooMany absorbs everything at the same distance.
            (too_many @ TypeNames::TooMany { .. }, _) | (_, too_many @ TypeNames::TooMany { .. }) => {
                too_many.clone()
            }
        }
    }

    pub fn with_distance(&self, distance: u32) -> TypeNames {
        match self {
            TypeNames::Regular {
                names,
                alternative_names,
                ..
            } => TypeNames::Regular {
                names: names.clone(),
                alternative_names: alternative_names.clone(),
                distance,
            },
            TypeNames::TooMany { name, .. } => TypeNames::TooMany {
                distance,
                name: name.clone(),
            },
        }
    }

    pub fn increase_distance(&self) -> TypeNames {
        self.with_distance(self.distance() + 1)
    }

    /// Drop inferred names entirely; explicitly given names pass through.
    pub fn clear_inferred(&self) -> Option<TypeNames> {
        if self.are_inferred() {
            None
        } else {
            Some(self.clone())
        }
    }

    /// A representative name. Multiple names combine through their longest
    /// common word-normalized prefix and suffix when both are substantial
    /// (at least 3 characters); otherwise the first name wins.
    pub fn combined_name(&self) -> String {
        match self {
            TypeNames::TooMany { name, .. } => name.clone(),
            TypeNames::Regular { names, .. } => {
                let first = match names.iter().next() {
                    Some(f) => f.clone(),
                    None => return String::new(),
                };
                let normalized: BTreeSet<String> =
                    names.iter().map(|n| normalized_words(n)).collect();
                if normalized.len() <= 1 {
                    return first;
                }
                let strs: Vec<&str> = normalized.iter().map(String::as_str).collect();
                let reference = strs[0];
                let prefix_len = common_prefix_length(strs.iter().copied());
                let suffix_len = common_suffix_length(strs.iter().copied());
                let prefix: String = if prefix_len >= 3 {
                    reference.chars().take(prefix_len).collect()
                } else {
                    String::new()
                };
                let suffix: String = if suffix_len >= 3 {
                    let total = reference.chars().count();
                    reference.chars().skip(total - suffix_len).collect()
                } else {
                    String::new()
                };
                let combined = format!("{}{}", prefix, suffix);
                if combined.chars().count() > 2 {
                    combined
                } else {
                    first
                }
            }
        }
    }

    /// All names worth proposing to a namer, representative first.
    pub fn proposed_names(&self) -> Vec<String> {
        match self {
            TypeNames::TooMany { name, .. } => vec![name.clone()],
            TypeNames::Regular {
                alternative_names, ..
            } => {
                let mut proposed = vec![self.combined_name()];
                if let Some(alts) = alternative_names {
                    for a in alts {
                        if !proposed.contains(a) {
                            proposed.push(a.clone());
                        }
                    }
                }
                proposed
            }
        }
    }

    pub fn singularize(&self) -> TypeNames {
        match self {
            TypeNames::TooMany { distance, name } => TypeNames::TooMany {
                distance: distance + 1,
                name: singularize(name),
            },
            TypeNames::Regular {
                names,
                alternative_names,
                distance,
            } => TypeNames::new(
                names.iter().map(|n| singularize(n)).collect(),
                alternative_names
                    .as_ref()
                    .map(|alts| alts.iter().map(|n| singularize(n)).collect()),
                distance + 1,
            ),
        }
    }
}

/// FNV-1a over the sorted names; stable across runs so `TooMany` names are
/// reproducible.
fn stable_hash(names: &BTreeSet<String>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for name in names {
        for b in name.as_bytes() {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash ^= 0xff;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "deft", "eager", "fancy", "fluent", "gentle",
    "grand", "hardy", "keen", "lively", "mellow", "noble", "prime", "quick", "sleek", "solid",
    "subtle", "swift", "tidy", "vivid",
];

const NOUNS: &[&str] = &[
    "basin", "beacon", "cedar", "comet", "crane", "delta", "ember", "falcon", "garnet", "harbor",
    "heron", "lagoon", "maple", "meadow", "onyx", "osprey", "pond", "quartz", "ridge", "sparrow",
    "summit", "thicket", "walnut", "willow",
];

/// Deterministic adjective+noun name for a seed.
pub(crate) fn synthetic_name(seed: u64) -> String {
    // xorshift64 keeps adjective and noun choices decorrelated
    let mut x = seed | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    let adjective = ADJECTIVES[(x % ADJECTIVES.len() as u64) as usize];
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    let noun = NOUNS[(x % NOUNS.len() as u64) as usize];
    format!("{}_{}", adjective, noun)
}

pub struct NamesAttribute;

impl AttributeSpec for NamesAttribute {
    fn kind(&self) -> AttributeKind {
        AttributeKind::Names
    }

    fn applies_to(&self, _kind: TypeKind) -> bool {
        true
    }

    fn combine(&self, values: Vec<AttributeValue>) -> Option<AttributeValue> {
        let mut result: Option<TypeNames> = None;
        for value in values {
            if let AttributeValue::Names(names) = value {
                result = Some(match result {
                    None => names,
                    Some(r) => r.add(&names),
                });
            }
        }
        result.map(AttributeValue::Names)
    }

    fn make_inferred(&self, value: AttributeValue) -> Option<AttributeValue> {
        match value {
            AttributeValue::Names(names) => {
                Some(AttributeValue::Names(names.increase_distance()))
            }
            _ => None,
        }
    }

    fn increase_distance(&self, value: AttributeValue) -> Option<AttributeValue> {
        match value {
            AttributeValue::Names(names) => {
                Some(AttributeValue::Names(names.increase_distance()))
            }
            _ => None,
        }
    }

    fn stringify(&self, value: &AttributeValue) -> Option<String> {
        match value {
            AttributeValue::Names(names) => Some(format!(
                "{}@{}",
                names.combined_name(),
                names.distance()
            )),
            _ => None,
        }
    }
}
