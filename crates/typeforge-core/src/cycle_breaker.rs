//! Cycle breaking over raw successor lists.
//!
//! Peels nodes whose in- or out-degree has dropped to zero; when none
//! remain but the graph is not exhausted, walks forward from an undone node
//! until it revisits one, hands the detected cycle to a chooser, and removes
//! the chosen breaker.

use std::collections::HashSet;

use crate::internal_assert;

/// Returns `(breaker, info)` pairs in removal order. The chooser receives
/// each detected cycle as a node-index sequence and must pick one of its
/// members to break.
pub fn break_cycles<I, F>(successors: &[Vec<usize>], mut chooser: F) -> Vec<(usize, I)>
where
    F: FnMut(&[usize]) -> (usize, I),
{
    let n = successors.len();
    let mut done = vec![false; n];
    let mut done_count = 0usize;
    let mut out_degree: Vec<usize> = successors.iter().map(Vec::len).collect();
    let mut in_degree = vec![0usize; n];
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (from, succs) in successors.iter().enumerate() {
        for &to in succs {
            in_degree[to] += 1;
            predecessors[to].push(from);
        }
    }

    let mut breakers = Vec::new();

    let mut remove = |node: usize,
                      done: &mut Vec<bool>,
                      done_count: &mut usize,
                      in_degree: &mut Vec<usize>,
                      out_degree: &mut Vec<usize>| {
        internal_assert!(!done[node], "node {} removed twice", node);
        done[node] = true;
        *done_count += 1;
        for &to in &successors[node] {
            if !done[to] {
                in_degree[to] -= 1;
            }
        }
        for &from in &predecessors[node] {
            if !done[from] {
                out_degree[from] -= 1;
            }
        }
    };

    while done_count < n {
        // Peel every node that cannot be part of a cycle anymore.
        let mut progressed = true;
        while progressed {
            progressed = false;
            for node in 0..n {
                if !done[node] && (in_degree[node] == 0 || out_degree[node] == 0) {
                    remove(
                        node,
                        &mut done,
                        &mut done_count,
                        &mut in_degree,
                        &mut out_degree,
                    );
                    progressed = true;
                }
            }
        }
        if done_count == n {
            break;
        }

        // Every undone node now sits on a cycle; find one by walking forward.
        let start = (0..n).find(|&i| !done[i]).unwrap();
        let mut path: Vec<usize> = vec![start];
        let mut on_path: HashSet<usize> = HashSet::from([start]);
        let cycle: Vec<usize>;
        loop {
            let current = *path.last().unwrap();
            let next = successors[current]
                .iter()
                .copied()
                .find(|&s| !done[s]);
            let next = match next {
                Some(next) => next,
                None => {
                    internal_assert!(false, "walk from node {} left the cyclic region", current);
                    unreachable!()
                }
            };
            if on_path.contains(&next) {
                let pos = path.iter().position(|&p| p == next).unwrap();
                cycle = path[pos..].to_vec();
                break;
            }
            on_path.insert(next);
            path.push(next);
        }
        internal_assert!(cycle.len() >= 1, "detected an empty cycle");

        let (breaker, info) = chooser(&cycle);
        internal_assert!(
            cycle.contains(&breaker),
            "chosen breaker {} is not on the detected cycle",
            breaker
        );
        remove(
            breaker,
            &mut done,
            &mut done_count,
            &mut in_degree,
            &mut out_degree,
        );
        breakers.push((breaker, info));
    }

    breakers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_needs_no_breakers() {
        let successors = vec![vec![1], vec![2], vec![]];
        let breakers = break_cycles(&successors, |_cycle| -> (usize, ()) {
            panic!("chooser must not run on an acyclic graph")
        });
        assert!(breakers.is_empty());
    }

    #[test]
    fn test_single_cycle_one_breaker() {
        // 0 -> 1 -> 2 -> 0
        let successors = vec![vec![1], vec![2], vec![0]];
        let breakers = break_cycles(&successors, |cycle| {
            assert_eq!(cycle.len(), 3);
            (*cycle.iter().min().unwrap(), "info")
        });
        assert_eq!(breakers, vec![(0, "info")]);
    }

    #[test]
    fn test_two_disjoint_cycles_two_breakers() {
        // 0 <-> 1 and 2 <-> 3
        let successors = vec![vec![1], vec![0], vec![3], vec![2]];
        let breakers = break_cycles(&successors, |cycle| (*cycle.iter().min().unwrap(), ()));
        let nodes: Vec<usize> = breakers.iter().map(|&(n, _)| n).collect();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.contains(&0));
        assert!(nodes.contains(&2));
    }

    #[test]
    fn test_self_loop() {
        let successors = vec![vec![0]];
        let breakers = break_cycles(&successors, |cycle| {
            assert_eq!(cycle, &[0]);
            (0, ())
        });
        assert_eq!(breakers.len(), 1);
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn test_breaker_outside_cycle_is_fatal() {
        // 2 is acyclic tail feeding the 0 <-> 1 cycle
        let successors = vec![vec![1], vec![0], vec![0]];
        let _ = break_cycles(&successors, |_cycle| (2, ()));
    }
}
