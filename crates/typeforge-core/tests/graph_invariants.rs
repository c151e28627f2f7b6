//! Cross-module invariants of the type-graph core.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use typeforge_core::cycle_breaker::break_cycles;
use typeforge_core::graph::Graph;
use typeforge_core::{
    ClassProperty, PrimitiveKind, StringTypeMapping, TypeAttributes, TypeBuilder, TypeKind,
};

#[test]
fn identity_uniqueness_across_equal_constructions() {
    let mut builder = TypeBuilder::default();
    let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
    let a = builder.get_class_type(
        TypeAttributes::new(),
        BTreeMap::from([("x".to_string(), ClassProperty::new(int, false))]),
    );
    let b = builder.get_class_type(
        TypeAttributes::new(),
        BTreeMap::from([("x".to_string(), ClassProperty::new(int, false))]),
    );
    assert_eq!(a, b);

    let u1 = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([int, a]));
    let u2 = builder.get_union_type(TypeAttributes::new(), BTreeSet::from([a, int]));
    assert_eq!(u1, u2);
}

#[test]
fn scc_node_counts_sum_to_graph_size() {
    // two cycles and a bridge: (0 <-> 1) -> 2 -> (3 <-> 4)
    let g = Graph::from_successors(
        vec!["a", "b", "c", "d", "e"],
        vec![vec![1], vec![0, 2], vec![3], vec![4], vec![3]],
        false,
    );
    let meta = g.strongly_connected_components();
    let total: usize = meta.nodes().iter().map(Vec::len).sum();
    assert_eq!(total, g.size());
    assert_eq!(meta.size(), 3);
    for i in 0..meta.size() {
        for &s in meta.successors_of(i) {
            assert_ne!(i, s, "meta-edges must connect distinct components");
        }
    }
}

#[test]
fn cycle_breaker_returns_one_breaker_per_cycle() {
    // figure eight: two cycles sharing node 0
    let successors = vec![vec![1, 2], vec![0], vec![0]];
    let breakers = break_cycles(&successors, |cycle| (*cycle.iter().min().unwrap(), ()));
    // breaking the shared node kills both loops at once
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0].0, 0);

    // two disjoint cycles need two breakers
    let successors = vec![vec![1], vec![0], vec![3], vec![2]];
    let breakers = break_cycles(&successors, |cycle| (*cycle.iter().min().unwrap(), ()));
    assert_eq!(breakers.len(), 2);
}

#[test]
fn rewrite_totality_over_top_levels() {
    let mut builder = TypeBuilder::default();
    let int = builder.get_primitive_type(PrimitiveKind::Integer, TypeAttributes::new());
    let string = builder.get_string_type(TypeAttributes::new(), None);
    let array = builder.get_array_type(TypeAttributes::new(), string);
    builder.add_top_level("Count", int).unwrap();
    builder.add_top_level("Names", array).unwrap();
    let graph = builder.finish();

    let rewritten = graph
        .rewrite(
            "identity",
            StringTypeMapping::default(),
            Vec::new(),
            |_, _, _| unreachable!("no groups"),
        )
        .unwrap()
        .graph;

    assert_eq!(graph.top_levels().len(), rewritten.top_levels().len());
    for (name, &old_ref) in graph.top_levels() {
        let new_ref = rewritten.top_levels()[name];
        assert_eq!(
            graph.resolve(old_ref).kind(),
            rewritten.resolve(new_ref).kind()
        );
    }
}

#[test]
fn rewrite_applies_string_type_mapping() {
    let mut builder = TypeBuilder::default();
    let date = builder.get_primitive_type(PrimitiveKind::Date, TypeAttributes::new());
    builder.add_top_level("When", date).unwrap();
    let graph = builder.finish();
    assert_eq!(
        graph.resolve(graph.top_levels()["When"]).kind(),
        TypeKind::Date
    );

    let lowered = graph
        .rewrite(
            "lower transformed strings",
            StringTypeMapping::lower_all(),
            Vec::new(),
            |_, _, _| unreachable!("no groups"),
        )
        .unwrap()
        .graph;
    assert_eq!(
        lowered.resolve(lowered.top_levels()["When"]).kind(),
        TypeKind::String
    );
}

#[test]
fn remap_rejects_cyclic_chains() {
    let mut builder = TypeBuilder::default();
    let a = builder.get_unique_class_type(TypeAttributes::new(), true, Some(BTreeMap::new()));
    let b = builder.get_unique_class_type(TypeAttributes::new(), true, Some(BTreeMap::new()));
    builder.add_top_level("A", a).unwrap();
    builder.add_top_level("B", b).unwrap();
    let graph = builder.finish();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        graph.remap(
            "cyclic",
            StringTypeMapping::default(),
            HashMap::from([(a, b), (b, a)]),
        )
    }));
    assert!(result.is_err());
}
