//! Namespaces, name variants, and the assignment fixpoint.
//!
//! Names live in a tree of namespaces; a namespace also lists foreign
//! namespaces whose assigned names its own members must not collide with
//! (own members never collide with each other). Assignment repeatedly
//! picks a namespace whose forbidden namespaces are fully assigned and
//! which holds ready names, groups them by (order, namer), and lets the
//! namer assign each batch.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;
use typeforge_core::error::{GraphError, Result};

use crate::namer::Namer;
use crate::styles::StyleFn;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NamespaceId(usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NameId(usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NamerId(usize);

type DependencyFn = Box<dyn Fn(&dyn Fn(NameId) -> String) -> String>;
type TransformFn = Box<dyn Fn(&str) -> String>;

enum Variant {
    Fixed(String),
    Simple {
        candidates: Vec<String>,
        namer: NamerId,
    },
    Dependency {
        namer: NamerId,
        dependencies: Vec<NameId>,
        produce: DependencyFn,
    },
    Associated {
        sponsor: NameId,
        transform: TransformFn,
    },
}

struct NameData {
    namespace: NamespaceId,
    order: u32,
    variant: Variant,
}

struct NamespaceData {
    #[allow(dead_code)]
    parent: Option<NamespaceId>,
    children: Vec<NamespaceId>,
    forbidden: Vec<NamespaceId>,
    members: Vec<NameId>,
}

#[derive(Default)]
pub struct NameStore {
    namespaces: Vec<NamespaceData>,
    names: Vec<NameData>,
    namers: Vec<Namer>,
}

impl NameStore {
    pub fn new() -> NameStore {
        NameStore::default()
    }

    pub fn add_namespace(&mut self, parent: Option<NamespaceId>) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len());
        self.namespaces.push(NamespaceData {
            parent,
            children: Vec::new(),
            forbidden: Vec::new(),
            members: Vec::new(),
        });
        if let Some(p) = parent {
            self.namespaces[p.0].children.push(id);
        }
        id
    }

    /// Members of `ns` must not collide with assigned members of `other`.
    pub fn forbid(&mut self, ns: NamespaceId, other: NamespaceId) {
        if ns != other && !self.namespaces[ns.0].forbidden.contains(&other) {
            self.namespaces[ns.0].forbidden.push(other);
        }
    }

    pub fn add_namer(&mut self, style: StyleFn, prefixes: Vec<String>) -> NamerId {
        self.namers.push(Namer::new(style, prefixes));
        NamerId(self.namers.len() - 1)
    }

    fn push_name(&mut self, namespace: NamespaceId, order: u32, variant: Variant) -> NameId {
        let id = NameId(self.names.len());
        self.names.push(NameData {
            namespace,
            order,
            variant,
        });
        self.namespaces[namespace.0].members.push(id);
        id
    }

    /// A name whose styled form is already decided.
    pub fn add_fixed(&mut self, namespace: NamespaceId, name: impl Into<String>) -> NameId {
        self.push_name(namespace, 0, Variant::Fixed(name.into()))
    }

    pub fn add_simple(
        &mut self,
        namespace: NamespaceId,
        order: u32,
        namer: NamerId,
        candidates: Vec<String>,
    ) -> NameId {
        self.push_name(namespace, order, Variant::Simple { candidates, namer })
    }

    /// A name whose raw candidate is computed from other assigned names.
    /// The dependency set is discovered by probing `produce` once with a
    /// recording lookup.
    pub fn add_dependency(
        &mut self,
        namespace: NamespaceId,
        order: u32,
        namer: NamerId,
        produce: DependencyFn,
    ) -> NameId {
        let recorded = std::cell::RefCell::new(Vec::new());
        let probe = |id: NameId| -> String {
            recorded.borrow_mut().push(id);
            "probe".to_string()
        };
        let _ = produce(&probe);
        let mut dependencies = recorded.into_inner();
        dependencies.sort();
        dependencies.dedup();
        self.push_name(
            namespace,
            order,
            Variant::Dependency {
                namer,
                dependencies,
                produce,
            },
        )
    }

    /// A name co-assigned with its sponsor by transforming the sponsor's
    /// assigned string; it never goes through a namer.
    pub fn add_associated(
        &mut self,
        namespace: NamespaceId,
        sponsor: NameId,
        transform: TransformFn,
    ) -> NameId {
        self.push_name(namespace, u32::MAX, Variant::Associated { sponsor, transform })
    }

    fn transitive_forbidden(&self, ns: NamespaceId) -> Vec<NamespaceId> {
        let mut result = Vec::new();
        let mut stack = self.namespaces[ns.0].forbidden.clone();
        let mut seen: HashSet<NamespaceId> = HashSet::from([ns]);
        while let Some(f) = stack.pop() {
            if !seen.insert(f) {
                continue;
            }
            result.push(f);
            stack.extend(self.namespaces[f.0].forbidden.iter().copied());
        }
        result.sort();
        result
    }

    fn is_ready(&self, id: NameId, assigned: &HashMap<NameId, String>) -> bool {
        match &self.names[id.0].variant {
            Variant::Fixed(_) => true,
            Variant::Simple { .. } => true,
            Variant::Dependency { dependencies, .. } => {
                dependencies.iter().all(|d| assigned.contains_key(d))
            }
            Variant::Associated { sponsor, .. } => assigned.contains_key(sponsor),
        }
    }

    /// Assign every name, deterministically. Fails when the forbidden
    /// graph or dependencies deadlock.
    pub fn assign(&self) -> Result<BTreeMap<NameId, String>> {
        let mut assigned: HashMap<NameId, String> = HashMap::new();

        // fixed names first; they are constraints, not choices
        for (i, name) in self.names.iter().enumerate() {
            if let Variant::Fixed(s) = &name.variant {
                assigned.insert(NameId(i), s.clone());
            }
        }

        loop {
            let mut progressed = false;
            for ns_index in 0..self.namespaces.len() {
                let ns = NamespaceId(ns_index);
                let forbidden_namespaces = self.transitive_forbidden(ns);
                let blocked = forbidden_namespaces.iter().any(|f| {
                    self.namespaces[f.0]
                        .members
                        .iter()
                        .any(|m| !assigned.contains_key(m))
                });
                if blocked {
                    continue;
                }

                let ready: Vec<NameId> = self.namespaces[ns_index]
                    .members
                    .iter()
                    .copied()
                    .filter(|id| !assigned.contains_key(id) && self.is_ready(*id, &assigned))
                    .collect();
                if ready.is_empty() {
                    continue;
                }
                trace!(namespace = ns_index, ready = ready.len(), "assigning names");

                let mut forbidden_strings: HashSet<String> = HashSet::new();
                for &f in &forbidden_namespaces {
                    for m in &self.namespaces[f.0].members {
                        if let Some(s) = assigned.get(m) {
                            forbidden_strings.insert(s.clone());
                        }
                    }
                }
                for m in &self.namespaces[ns_index].members {
                    if let Some(s) = assigned.get(m) {
                        forbidden_strings.insert(s.clone());
                    }
                }

                // associated names piggyback on their sponsors
                for &id in &ready {
                    if let Variant::Associated { sponsor, transform } = &self.names[id.0].variant {
                        let s = transform(&assigned[sponsor]);
                        assigned.insert(id, s);
                        progressed = true;
                    }
                }

                // group the rest by (order, namer) and batch-assign
                let mut groups: BTreeMap<(u32, NamerId), Vec<(NameId, Vec<String>)>> =
                    BTreeMap::new();
                for &id in &ready {
                    match &self.names[id.0].variant {
                        Variant::Simple { candidates, namer } => {
                            groups
                                .entry((self.names[id.0].order, *namer))
                                .or_default()
                                .push((id, candidates.clone()));
                        }
                        Variant::Dependency { namer, produce, .. } => {
                            let lookup = |d: NameId| -> String {
                                assigned.get(&d).cloned().unwrap_or_default()
                            };
                            let raw = produce(&lookup);
                            groups
                                .entry((self.names[id.0].order, *namer))
                                .or_default()
                                .push((id, vec![raw]));
                        }
                        _ => {}
                    }
                }
                for ((_, namer_id), batch) in groups {
                    let chosen = self.namers[namer_id.0].assign_batch(&batch, &forbidden_strings);
                    for (id, s) in chosen {
                        forbidden_strings.insert(s.clone());
                        assigned.insert(id, s);
                        progressed = true;
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        if assigned.len() != self.names.len() {
            return Err(GraphError::internal(format!(
                "name assignment deadlocked with {} of {} names assigned",
                assigned.len(),
                self.names.len()
            )));
        }
        Ok(assigned.into_iter().collect())
    }
}
