//! Styled candidate proposal and batch assignment.

use std::collections::{BTreeMap, HashSet};

use crate::styles::StyleFn;

#[derive(Clone)]
pub struct Namer {
    style: StyleFn,
    prefixes: Vec<String>,
}

impl Namer {
    pub fn new(style: StyleFn, prefixes: Vec<String>) -> Namer {
        Namer { style, prefixes }
    }

    pub fn style(&self, raw: &str) -> String {
        (self.style)(raw)
    }

    /// Styled proposals for a candidate list: each raw candidate, then
    /// each prefix applied to the first candidate, then numeric suffixes.
    /// The sequence is unbounded; callers take until one fits.
    fn proposals<'a>(&'a self, candidates: &'a [String]) -> impl Iterator<Item = String> + 'a {
        let first = candidates.first().cloned().unwrap_or_else(|| "empty".to_string());
        let direct = candidates.iter().map(move |c| self.style(c));
        let prefixed = self
            .prefixes
            .iter()
            .map(move |p| self.style(&format!("{}_{}", p, first_of(candidates))));
        let numbered = (1u32..).map(move |i| self.style(&format!("{}_{}", first, i)));
        direct.chain(prefixed).chain(numbered)
    }

    /// Assign every name in the batch the first proposal that collides
    /// neither with a forbidden name nor with an earlier batch member.
    pub fn assign_batch<K: Ord + Copy>(
        &self,
        batch: &[(K, Vec<String>)],
        forbidden: &HashSet<String>,
    ) -> BTreeMap<K, String> {
        let mut assigned = BTreeMap::new();
        let mut claimed: HashSet<String> = HashSet::new();
        for (key, candidates) in batch {
            let chosen = self
                .proposals(candidates)
                .find(|p| !forbidden.contains(p) && !claimed.contains(p))
                .unwrap_or_else(|| "empty".to_string());
            claimed.insert(chosen.clone());
            assigned.insert(*key, chosen);
        }
        assigned
    }
}

fn first_of(candidates: &[String]) -> &str {
    candidates.first().map(String::as_str).unwrap_or("empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::pascal_case;

    #[test]
    fn test_batch_resolves_collisions_with_suffixes() {
        let namer = Namer::new(pascal_case, Vec::new());
        let batch = vec![
            (0, vec!["user".to_string()]),
            (1, vec!["user".to_string()]),
        ];
        let assigned = namer.assign_batch(&batch, &HashSet::new());
        assert_eq!(assigned[&0], "User");
        assert_eq!(assigned[&1], "User1");
    }

    #[test]
    fn test_prefixes_tried_before_suffixes() {
        let namer = Namer::new(pascal_case, vec!["other".to_string()]);
        let batch = vec![(0, vec!["user".to_string()])];
        let forbidden: HashSet<String> = ["User".to_string()].into();
        let assigned = namer.assign_batch(&batch, &forbidden);
        assert_eq!(assigned[&0], "OtherUser");
    }

    #[test]
    fn test_alternative_candidates_win_over_prefixes() {
        let namer = Namer::new(pascal_case, vec!["other".to_string()]);
        let batch = vec![(0, vec!["user".to_string(), "person".to_string()])];
        let forbidden: HashSet<String> = ["User".to_string()].into();
        let assigned = namer.assign_batch(&batch, &forbidden);
        assert_eq!(assigned[&0], "Person");
    }
}
