//! Graph rewriting: reconstitution of a frozen graph into a new one, with
//! replacement groups or a source-to-target remap.
//!
//! Reconstitution is memoized per original index. Cycles are handled with
//! forwarding references: when a type in flight is needed again before its
//! body is finished, a ref is reserved for it and the body is committed
//! there once its children are rebuilt. Replacement groups collapse each
//! group into one type produced by the replacer callback, which receives
//! the group, the rewriter, and the pre-reserved forwarding ref it must
//! build into.

use std::collections::HashMap;

use tracing::trace;

use crate::attributes::{CombinationKind, TypeAttributes};
use crate::builder::{StringTypeMapping, TypeBuilder};
use crate::error::{GraphError, Result};
use crate::internal_assert;
use crate::type_graph::{RefMapper, TypeGraph, TypeRef};
use crate::types::{ObjectKind, Type};

type Replacer<'a> =
    Box<dyn FnMut(&[TypeRef], &mut GraphRewriter<'a>, TypeRef) -> Result<TypeRef> + 'a>;

#[derive(Clone, Copy, Debug)]
enum InFlight {
    Started,
    Forwarded(TypeRef),
}

/// Result of a rewrite: the new graph plus whether any attributes were
/// knowingly dropped along the way.
#[derive(Debug)]
pub struct RewriteOutcome {
    pub graph: TypeGraph,
    pub lost_type_attributes: bool,
}

pub struct GraphRewriter<'a> {
    original: &'a TypeGraph,
    builder: TypeBuilder,
    reconstituted: HashMap<usize, TypeRef>,
    in_flight: HashMap<usize, InFlight>,
    group_of: HashMap<usize, usize>,
    groups: Vec<Vec<TypeRef>>,
    group_results: Vec<Option<TypeRef>>,
    remap: HashMap<usize, usize>,
    remap_sources: HashMap<usize, Vec<usize>>,
    replacer: Option<Replacer<'a>>,
    lost_type_attributes: bool,
    depth: usize,
}

impl<'a> GraphRewriter<'a> {
    fn new(
        original: &'a TypeGraph,
        mapping: StringTypeMapping,
        groups: Vec<Vec<TypeRef>>,
        replacer: Option<Replacer<'a>>,
    ) -> GraphRewriter<'a> {
        let mut group_of = HashMap::new();
        for (gi, group) in groups.iter().enumerate() {
            internal_assert!(!group.is_empty(), "empty replacement group");
            for &member in group {
                member.assert_graph(original.serial());
                let previous = group_of.insert(member.index(), gi);
                internal_assert!(
                    previous.is_none(),
                    "type {:?} appears in more than one replacement group",
                    member
                );
            }
        }
        let group_results = vec![None; groups.len()];
        GraphRewriter {
            original,
            builder: TypeBuilder::new(mapping),
            reconstituted: HashMap::new(),
            in_flight: HashMap::new(),
            group_of,
            groups,
            group_results,
            remap: HashMap::new(),
            remap_sources: HashMap::new(),
            replacer,
            lost_type_attributes: false,
            depth: 0,
        }
    }

    pub fn original(&self) -> &'a TypeGraph {
        self.original
    }

    pub fn builder(&mut self) -> &mut TypeBuilder {
        &mut self.builder
    }

    pub fn lost_type_attributes(&self) -> bool {
        self.lost_type_attributes
    }

    /// Record that this rewrite knowingly dropped attribute information.
    pub fn set_lost_type_attributes(&mut self) {
        self.lost_type_attributes = true;
    }

    /// Map an original ref into the graph under construction, rebuilding
    /// the type if this is its first use.
    pub fn reconstitute(&mut self, r: TypeRef) -> Result<TypeRef> {
        r.assert_graph(self.original.serial());
        let mut index = r.index();
        // Remap targets chain through; sources never surface in the output.
        while let Some(&target) = self.remap.get(&index) {
            index = target;
        }

        if let Some(&done) = self.reconstituted.get(&index) {
            return Ok(done);
        }
        match self.in_flight.get(&index) {
            Some(InFlight::Forwarded(fwd)) => return Ok(*fwd),
            Some(InFlight::Started) => {
                // A cycle reached back into a type whose body is still being
                // rebuilt; reserve its ref now.
                let fwd = self.builder.reserve();
                self.in_flight.insert(index, InFlight::Forwarded(fwd));
                return Ok(fwd);
            }
            None => {}
        }

        if let Some(&group_index) = self.group_of.get(&index) {
            return self.replace_group(group_index, index);
        }

        self.reconstitute_plain(index)
    }

    /// Reconstitute `r` so that the result is reachable through the given
    /// forwarding ref. When the type was already rebuilt elsewhere, the
    /// forwarding ref is committed as a single-member intersection pointing
    /// at it; flattening later dissolves those.
    pub fn reconstitute_into(&mut self, r: TypeRef, fwd: TypeRef) -> Result<TypeRef> {
        r.assert_graph(self.original.serial());
        let mut index = r.index();
        while let Some(&target) = self.remap.get(&index) {
            index = target;
        }
        if !self.reconstituted.contains_key(&index)
            && !self.in_flight.contains_key(&index)
            && !self.group_of.contains_key(&index)
        {
            self.in_flight.insert(index, InFlight::Forwarded(fwd));
            return self.reconstitute_plain(index);
        }
        let target = self.reconstitute(r)?;
        if target == fwd {
            return Ok(fwd);
        }
        self.builder.add_unique_type(
            Type::Intersection {
                members: Some(std::collections::BTreeSet::from([target])),
            },
            TypeAttributes::new(),
            Some(fwd),
        );
        Ok(fwd)
    }

    fn replace_group(&mut self, group_index: usize, requested: usize) -> Result<TypeRef> {
        if let Some(result) = self.group_results[group_index] {
            self.reconstituted.insert(requested, result);
            return Ok(result);
        }
        let group = self.groups[group_index].clone();
        trace!(
            depth = self.depth,
            group = group_index,
            size = group.len(),
            "replacing group"
        );
        let fwd = self.builder.reserve();
        for member in &group {
            self.in_flight.insert(member.index(), InFlight::Forwarded(fwd));
        }

        let mut replacer = match self.replacer.take() {
            Some(r) => r,
            None => {
                internal_assert!(false, "replacement groups require a replacer");
                unreachable!()
            }
        };
        self.depth += 1;
        let result = replacer(&group, self, fwd);
        self.depth -= 1;
        self.replacer = Some(replacer);
        let result = result?;
        internal_assert!(
            result == fwd,
            "replacer returned {:?} instead of building into the forwarding ref {:?}",
            result,
            fwd
        );

        self.group_results[group_index] = Some(result);
        for member in &group {
            self.in_flight.remove(&member.index());
            self.reconstituted.insert(member.index(), result);
        }
        Ok(result)
    }

    fn reconstitute_plain(&mut self, index: usize) -> Result<TypeRef> {
        let r = self.original.type_ref(index);
        let original_type = self.original.resolve(r).clone();
        trace!(depth = self.depth, index, kind = ?original_type.kind(), "reconstituting");
        // reconstitute_into may have pre-registered a forwarding ref
        self.in_flight.entry(index).or_insert(InFlight::Started);
        self.depth += 1;

        let attributes = self.gather_attributes(index)?;
        let result = self.rebuild(index, original_type, attributes);

        self.depth -= 1;
        let result = result?;
        self.in_flight.remove(&index);
        self.reconstituted.insert(index, result);
        Ok(result)
    }

    /// The original type's attributes, unioned with the attributes of every
    /// remap source coalesced into it, rebuilt for the new graph.
    fn gather_attributes(&mut self, index: usize) -> Result<TypeAttributes> {
        let mut all = vec![self.original.attributes(self.original.type_ref(index)).clone()];
        if let Some(sources) = self.remap_sources.get(&index) {
            for &s in sources {
                all.push(self.original.attributes(self.original.type_ref(s)).clone());
            }
        }
        let combined = TypeAttributes::combine(all, CombinationKind::Union);
        combined.reconstitute(self)
    }

    fn rebuild(
        &mut self,
        index: usize,
        original_type: Type,
        attributes: TypeAttributes,
    ) -> Result<TypeRef> {
        let forwarding = |rewriter: &GraphRewriter<'a>| match rewriter.in_flight.get(&index) {
            Some(InFlight::Forwarded(fwd)) => Some(*fwd),
            _ => None,
        };
        match original_type {
            Type::Primitive(kind) => {
                let fwd = forwarding(self);
                Ok(self.builder.get_primitive_type_with(kind, attributes, fwd))
            }
            Type::Enum { cases } => {
                let fwd = forwarding(self);
                Ok(self.builder.get_enum_type_with(attributes, cases, fwd))
            }
            Type::Array { items } => {
                let items = match items {
                    Some(i) => self.reconstitute(i)?,
                    None => {
                        internal_assert!(false, "frozen graph holds an array without items");
                        unreachable!()
                    }
                };
                let fwd = forwarding(self);
                Ok(self.builder.get_array_type_with(attributes, items, fwd))
            }
            Type::Object(data) => {
                let properties = match &data.properties {
                    Some(props) => {
                        let mut rebuilt = std::collections::BTreeMap::new();
                        for (name, p) in props {
                            let type_ref = self.reconstitute(p.type_ref)?;
                            rebuilt.insert(
                                name.clone(),
                                crate::types::ClassProperty::new(type_ref, p.is_optional),
                            );
                        }
                        Some(rebuilt)
                    }
                    None => None,
                };
                let additional = match data.additional_properties {
                    Some(a) => Some(self.reconstitute(a)?),
                    None => None,
                };
                let fwd = forwarding(self);
                Ok(match data.object_kind {
                    ObjectKind::Map => {
                        let values = match additional {
                            Some(v) => v,
                            None => {
                                internal_assert!(false, "frozen graph holds a map without values");
                                unreachable!()
                            }
                        };
                        self.builder.get_map_type_with(attributes, values, fwd)
                    }
                    ObjectKind::Class => {
                        let props = properties.unwrap_or_default();
                        if data.is_fixed {
                            self.builder.get_unique_class_type_with(
                                attributes,
                                true,
                                Some(props),
                                fwd,
                            )
                        } else {
                            self.builder.get_class_type_with(attributes, props, fwd)
                        }
                    }
                    ObjectKind::Object => self.builder.get_unique_object_type_with(
                        attributes, properties, additional, fwd,
                    ),
                })
            }
            Type::Union { members } => {
                let members = self.reconstitute_members(members)?;
                let fwd = forwarding(self);
                Ok(self.builder.get_union_type_with(attributes, members, fwd))
            }
            Type::Intersection { members } => {
                let members = self.reconstitute_members(members)?;
                let fwd = forwarding(self);
                Ok(self.builder.get_or_add_type(
                    Type::Intersection {
                        members: Some(members),
                    },
                    attributes,
                    fwd,
                ))
            }
        }
    }

    fn reconstitute_members(
        &mut self,
        members: Option<std::collections::BTreeSet<TypeRef>>,
    ) -> Result<std::collections::BTreeSet<TypeRef>> {
        let members = match members {
            Some(m) => m,
            None => {
                internal_assert!(false, "frozen graph holds a set operation without members");
                unreachable!()
            }
        };
        let mut rebuilt = std::collections::BTreeSet::new();
        for m in members {
            rebuilt.insert(self.reconstitute(m)?);
        }
        Ok(rebuilt)
    }

    fn finish(mut self, strict: bool) -> Result<RewriteOutcome> {
        let top_levels: Vec<(String, TypeRef)> = self
            .original
            .top_levels()
            .iter()
            .map(|(name, r)| (name.clone(), *r))
            .collect();
        for (name, r) in top_levels {
            let rebuilt = self.reconstitute(r)?;
            self.builder.add_top_level(name, rebuilt)?;
        }
        if strict && self.lost_type_attributes {
            return Err(GraphError::TypeAttributesNotPropagated {
                count: 1,
                examples: vec!["attributes dropped during replacement".to_string()],
            });
        }
        Ok(RewriteOutcome {
            lost_type_attributes: self.lost_type_attributes,
            graph: self.builder.finish(),
        })
    }
}

impl<'a> RefMapper for GraphRewriter<'a> {
    fn map_ref(&mut self, r: TypeRef) -> Result<TypeRef> {
        self.reconstitute(r)
    }
}

impl TypeGraph {
    /// Rewrite this graph, collapsing each replacement group into a single
    /// type chosen by `replacer`. An empty group list reconstitutes the
    /// graph unchanged (modulo garbage types, which are dropped).
    pub fn rewrite<'a, F>(
        &'a self,
        title: &str,
        mapping: StringTypeMapping,
        groups: Vec<Vec<TypeRef>>,
        replacer: F,
    ) -> Result<RewriteOutcome>
    where
        F: FnMut(&[TypeRef], &mut GraphRewriter<'a>, TypeRef) -> Result<TypeRef> + 'a,
    {
        self.rewrite_with_strictness(title, mapping, groups, false, replacer)
    }

    /// Like [`rewrite`](TypeGraph::rewrite), but fails with
    /// [`GraphError::TypeAttributesNotPropagated`] when the rewrite dropped
    /// attributes instead of reporting it on the outcome.
    pub fn rewrite_with_strictness<'a, F>(
        &'a self,
        title: &str,
        mapping: StringTypeMapping,
        groups: Vec<Vec<TypeRef>>,
        strict: bool,
        replacer: F,
    ) -> Result<RewriteOutcome>
    where
        F: FnMut(&[TypeRef], &mut GraphRewriter<'a>, TypeRef) -> Result<TypeRef> + 'a,
    {
        trace!(title, groups = groups.len(), "rewriting graph");
        let rewriter = GraphRewriter::new(self, mapping, groups, Some(Box::new(replacer)));
        rewriter.finish(strict)
    }

    /// Rewrite so that every occurrence of a remap source becomes its
    /// target, with source attributes unioned into the target. Forwarding
    /// refs are not supported here; cycles are still rebuilt correctly.
    pub fn remap(
        &self,
        title: &str,
        mapping: StringTypeMapping,
        map: HashMap<TypeRef, TypeRef>,
    ) -> Result<TypeGraph> {
        trace!(title, entries = map.len(), "remapping graph");
        let mut rewriter = GraphRewriter::new(self, mapping, Vec::new(), None);
        for (source, target) in map {
            source.assert_graph(self.serial());
            target.assert_graph(self.serial());
            internal_assert!(
                source != target,
                "remap source {:?} maps to itself",
                source
            );
            let previous = rewriter.remap.insert(source.index(), target.index());
            internal_assert!(previous.is_none(), "remap source {:?} mapped twice", source);
            rewriter
                .remap_sources
                .entry(target.index())
                .or_default()
                .push(source.index());
        }
        // A remap target must not itself be remapped away transitively into
        // a source cycle; resolving the chain at lookup time handles plain
        // chains, a cyclic chain is fatal.
        for &source in rewriter.remap.keys() {
            let mut seen = vec![source];
            let mut current = source;
            while let Some(&next) = rewriter.remap.get(&current) {
                internal_assert!(!seen.contains(&next), "cyclic remap through {}", next);
                seen.push(next);
                current = next;
            }
        }
        Ok(rewriter.finish(false)?.graph)
    }
}
