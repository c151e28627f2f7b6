//! Declaration scheduling.
//!
//! Produces a topologically ordered declaration list for renderers whose
//! target languages need definitions before use: dependencies first, and
//! forward declarations inserted where cycles make a pure ordering
//! impossible.

use std::collections::{BTreeSet, HashMap, HashSet};

use typeforge_core::error::{GraphError, Result};
use typeforge_core::graph::{DfsOrder, Graph};
use typeforge_core::{TypeGraph, TypeRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclarationKind {
    Forward,
    Define,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub type_ref: TypeRef,
}

#[derive(Debug, Default)]
pub struct DeclarationIR {
    pub declarations: Vec<Declaration>,
    pub forwarded_types: HashSet<TypeRef>,
}

/// Schedule declarations for every type the predicates select.
///
/// `children_of` restricts the dependency graph (a renderer typically cuts
/// through containers it does not declare), `needs_declaration` selects
/// the declared types, and `can_be_forward_declared` marks those the
/// target language can forward-declare to break cycles.
pub fn declaration_ir<C, F, N>(
    graph: &TypeGraph,
    children_of: C,
    can_be_forward_declared: F,
    needs_declaration: N,
) -> Result<DeclarationIR>
where
    C: Fn(&TypeGraph, TypeRef) -> Vec<TypeRef>,
    F: Fn(TypeRef) -> bool,
    N: Fn(TypeRef) -> bool,
{
    let restricted = graph.make_graph(&children_of);
    let meta = restricted.strongly_connected_components();

    // bottom-up: a component's dependencies are declared before it
    let mut component_order: Vec<usize> = Vec::new();
    meta.dfs_traversal(&meta.find_roots(), DfsOrder::Post, |c| {
        component_order.push(c)
    });

    let mut ir = DeclarationIR::default();
    for component in component_order {
        let members: Vec<TypeRef> = meta.node(component).clone();
        declare_component(
            graph,
            &children_of,
            &can_be_forward_declared,
            &needs_declaration,
            members,
            &mut ir,
        )?;
    }
    Ok(ir)
}

fn declare_component<C, F, N>(
    graph: &TypeGraph,
    children_of: &C,
    can_be_forward_declared: &F,
    needs_declaration: &N,
    members: Vec<TypeRef>,
    ir: &mut DeclarationIR,
) -> Result<()>
where
    C: Fn(&TypeGraph, TypeRef) -> Vec<TypeRef>,
    F: Fn(TypeRef) -> bool,
    N: Fn(TypeRef) -> bool,
{
    if members.len() == 1 {
        let t = members[0];
        if needs_declaration(t) {
            ir.declarations.push(Declaration {
                kind: DeclarationKind::Define,
                type_ref: t,
            });
        }
        return Ok(());
    }

    let mut forwarded: Vec<TypeRef> = members
        .iter()
        .copied()
        .filter(|&t| needs_declaration(t) && can_be_forward_declared(t))
        .collect();
    if forwarded.is_empty() {
        return Err(GraphError::NoForwardDeclarableTypeInCycle {
            cycle_size: members.len(),
        });
    }
    forwarded.sort();
    for &t in &forwarded {
        ir.declarations.push(Declaration {
            kind: DeclarationKind::Forward,
            type_ref: t,
        });
        ir.forwarded_types.insert(t);
    }

    // with the forwarded types cut out, the remainder untangles; it may
    // still hold smaller cycles, so recurse through its components
    let forwarded_set: BTreeSet<TypeRef> = forwarded.iter().copied().collect();
    let rest: Vec<TypeRef> = members
        .iter()
        .copied()
        .filter(|t| !forwarded_set.contains(t))
        .collect();
    if !rest.is_empty() {
        let index_of: HashMap<TypeRef, usize> =
            rest.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        let successors: Vec<Vec<usize>> = rest
            .iter()
            .map(|&t| {
                children_of(graph, t)
                    .into_iter()
                    .filter_map(|c| index_of.get(&c).copied())
                    .collect()
            })
            .collect();
        let sub = Graph::from_successors(rest.clone(), successors, false);
        let sub_meta = sub.strongly_connected_components();
        let mut order = Vec::new();
        sub_meta.dfs_traversal(&sub_meta.find_roots(), DfsOrder::Post, |c| order.push(c));
        for component in order {
            declare_component(
                graph,
                children_of,
                can_be_forward_declared,
                needs_declaration,
                sub_meta.node(component).clone(),
                ir,
            )?;
        }
    }

    for &t in &forwarded {
        ir.declarations.push(Declaration {
            kind: DeclarationKind::Define,
            type_ref: t,
        });
    }
    Ok(())
}

/// Walk the type graph depth-first tracking the current path; when an
/// edge closes a cycle on a path member that is not an implicit breaker,
/// pick the nearest path member that can break and cut there.
pub fn break_type_cycles<C, I, B>(
    graph: &TypeGraph,
    children_of: C,
    is_implicit_breaker: I,
    can_break: B,
) -> Result<Vec<TypeRef>>
where
    C: Fn(&TypeGraph, TypeRef) -> Vec<TypeRef>,
    I: Fn(TypeRef) -> bool,
    B: Fn(TypeRef) -> bool,
{
    let mut breakers: Vec<TypeRef> = Vec::new();
    let mut broken: HashSet<TypeRef> = HashSet::new();
    let mut finished: HashSet<TypeRef> = HashSet::new();

    fn visit<C, I, B>(
        graph: &TypeGraph,
        children_of: &C,
        is_implicit_breaker: &I,
        can_break: &B,
        t: TypeRef,
        path: &mut Vec<TypeRef>,
        on_path: &mut HashSet<TypeRef>,
        breakers: &mut Vec<TypeRef>,
        broken: &mut HashSet<TypeRef>,
        finished: &mut HashSet<TypeRef>,
    ) -> Result<()>
    where
        C: Fn(&TypeGraph, TypeRef) -> Vec<TypeRef>,
        I: Fn(TypeRef) -> bool,
        B: Fn(TypeRef) -> bool,
    {
        if finished.contains(&t) || broken.contains(&t) {
            return Ok(());
        }
        path.push(t);
        on_path.insert(t);
        for child in children_of(graph, t) {
            if broken.contains(&child) {
                continue;
            }
            if on_path.contains(&child) {
                if is_implicit_breaker(child) {
                    continue;
                }
                let start = path.iter().position(|&p| p == child).unwrap_or(0);
                let breaker = path[start..].iter().rev().copied().find(|&p| can_break(p));
                match breaker {
                    Some(b) => {
                        breakers.push(b);
                        broken.insert(b);
                    }
                    None => {
                        return Err(GraphError::NoForwardDeclarableTypeInCycle {
                            cycle_size: path.len() - start,
                        })
                    }
                }
                continue;
            }
            visit(
                graph,
                children_of,
                is_implicit_breaker,
                can_break,
                child,
                path,
                on_path,
                breakers,
                broken,
                finished,
            )?;
        }
        path.pop();
        on_path.remove(&t);
        finished.insert(t);
        Ok(())
    }

    let roots: Vec<TypeRef> = graph.top_levels().values().copied().collect();
    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    for root in roots {
        visit(
            graph,
            &children_of,
            &is_implicit_breaker,
            &can_break,
            root,
            &mut path,
            &mut on_path,
            &mut breakers,
            &mut broken,
            &mut finished,
        )?;
    }
    Ok(breakers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use typeforge_core::{ClassProperty, TypeAttributes, TypeBuilder, TypeKind};

    fn class_children(graph: &TypeGraph, r: TypeRef) -> Vec<TypeRef> {
        graph
            .children_of(r)
            .into_iter()
            .filter(|&c| graph.resolve(c).kind() == TypeKind::Class)
            .collect()
    }

    fn two_class_cycle() -> TypeGraph {
        let mut builder = TypeBuilder::default();
        let a = builder.get_unique_class_type(TypeAttributes::new(), true, None);
        let b = builder.get_unique_class_type(TypeAttributes::new(), true, None);
        builder.set_object_properties(
            a,
            BTreeMap::from([("b".to_string(), ClassProperty::new(b, false))]),
        );
        builder.set_object_properties(
            b,
            BTreeMap::from([("a".to_string(), ClassProperty::new(a, false))]),
        );
        builder.add_top_level("A", a).unwrap();
        builder.add_top_level("B", b).unwrap();
        builder.finish()
    }

    #[test]
    fn test_cycle_emits_forwards_then_defines() {
        let graph = two_class_cycle();
        let a = graph.top_levels()["A"];
        let b = graph.top_levels()["B"];

        let ir = declaration_ir(
            &graph,
            class_children,
            |_| true,
            |t| graph.resolve(t).kind() == TypeKind::Class,
        )
        .unwrap();

        let kinds: Vec<(DeclarationKind, TypeRef)> = ir
            .declarations
            .iter()
            .map(|d| (d.kind, d.type_ref))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (DeclarationKind::Forward, a),
                (DeclarationKind::Forward, b),
                (DeclarationKind::Define, a),
                (DeclarationKind::Define, b),
            ]
        );
        assert_eq!(ir.forwarded_types.len(), 2);
    }

    #[test]
    fn test_cycle_without_forwardable_type_fails() {
        let graph = two_class_cycle();
        let result = declaration_ir(
            &graph,
            class_children,
            |_| false,
            |t| graph.resolve(t).kind() == TypeKind::Class,
        );
        assert!(matches!(
            result,
            Err(GraphError::NoForwardDeclarableTypeInCycle { cycle_size: 2 })
        ));
    }

    #[test]
    fn test_acyclic_children_defined_before_parents() {
        let mut builder = TypeBuilder::default();
        let leaf = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::new()),
        );
        let parent = builder.get_unique_class_type(
            TypeAttributes::new(),
            true,
            Some(BTreeMap::from([(
                "leaf".to_string(),
                ClassProperty::new(leaf, false),
            )])),
        );
        builder.add_top_level("Parent", parent).unwrap();
        let graph = builder.finish();

        let ir = declaration_ir(
            &graph,
            class_children,
            |_| true,
            |t| graph.resolve(t).kind() == TypeKind::Class,
        )
        .unwrap();
        let order: Vec<TypeRef> = ir.declarations.iter().map(|d| d.type_ref).collect();
        let leaf_pos = order.iter().position(|&t| t == leaf).unwrap();
        let parent_pos = order.iter().position(|&t| t == parent).unwrap();
        assert!(leaf_pos < parent_pos);
        assert!(ir.forwarded_types.is_empty());
    }

    #[test]
    fn test_break_type_cycles_picks_breaker_on_path() {
        let graph = two_class_cycle();
        let breakers = break_type_cycles(
            &graph,
            class_children,
            |_| false,
            |_| true,
        )
        .unwrap();
        assert_eq!(breakers.len(), 1);
    }

    #[test]
    fn test_break_type_cycles_respects_implicit_breakers() {
        let graph = two_class_cycle();
        let breakers = break_type_cycles(
            &graph,
            class_children,
            |_| true,
            |_| true,
        )
        .unwrap();
        assert!(breakers.is_empty());
    }
}
