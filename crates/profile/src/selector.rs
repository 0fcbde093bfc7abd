//! Tuning-candidate selection over the loop-nesting graph.

use crate::graph::{Loop, LoopGraph, LoopId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Closed band of relative time a loop must fall in to be tuned.
///
/// Loops above the band dominate total time so much that whole-program
/// tuning is the better tool; loops below it cannot pay for the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for SelectionBand {
    fn default() -> Self {
        Self {
            lower: 10.0,
            upper: 60.0,
        }
    }
}

impl SelectionBand {
    pub fn contains(&self, time_pct: f64) -> bool {
        time_pct >= self.lower && time_pct <= self.upper
    }
}

/// Depth-first post-order over the nesting relation, reversed so enclosing
/// loops come before the loops nested in them.
///
/// Cycles (recursion, mutual nesting) are broken by the visited check;
/// every id is visited exactly once, so the order is total and
/// deterministic, a topological order whenever the graph is acyclic.
pub fn topological_order(graph: &LoopGraph) -> Vec<LoopId> {
    enum Step {
        Enter(LoopId),
        Exit(LoopId),
    }

    let mut order = Vec::with_capacity(graph.len());
    let mut visited = HashSet::with_capacity(graph.len());
    let mut stack = Vec::new();

    for root in graph.ids() {
        if visited.contains(&root) {
            continue;
        }
        stack.push(Step::Enter(root));
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    if !visited.insert(id) {
                        continue;
                    }
                    stack.push(Step::Exit(id));
                    if let Some(l) = graph.get(id) {
                        // reversed so nested loops are explored in recorded order
                        for &nested in l.nested.iter().rev() {
                            if !visited.contains(&nested) {
                                stack.push(Step::Enter(nested));
                            }
                        }
                    }
                }
                Step::Exit(id) => order.push(id),
            }
        }
    }

    order.reverse();
    order
}

/// Pick a pairwise-independent set of tuning candidates.
///
/// Walking enclosing loops first, a loop inside the band is accepted and
/// everything nested under it (transitively) is disqualified, so a selected
/// loop is never nested in another selected loop and larger-granularity
/// loops win over their children.
pub fn select_candidates(graph: &LoopGraph, band: SelectionBand) -> Vec<Loop> {
    let mut candidates = Vec::new();
    let mut disqualified: HashSet<LoopId> = HashSet::new();

    for id in topological_order(graph) {
        if disqualified.contains(&id) {
            continue;
        }
        let Some(l) = graph.get(id) else { continue };
        if band.contains(l.time_pct) {
            disqualify_nested(graph, l, &mut disqualified);
            candidates.push(l.clone());
        }
    }

    tracing::info!(
        candidates = candidates.len(),
        total = graph.len(),
        "selected tuning candidates"
    );
    candidates
}

/// Add every loop reachable through `start`'s nested lists to the
/// disqualification set.
fn disqualify_nested(graph: &LoopGraph, start: &Loop, disqualified: &mut HashSet<LoopId>) {
    let mut stack: Vec<LoopId> = start.nested.clone();
    while let Some(id) = stack.pop() {
        if id == start.id || !disqualified.insert(id) {
            continue;
        }
        if let Some(l) = graph.get(id) {
            stack.extend(l.nested.iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Loop;

    fn mk(id: LoopId, time_pct: f64, nested: Vec<LoopId>) -> Loop {
        Loop {
            id,
            function: format!("fn{id}"),
            header_id: 1,
            time_pct,
            runs: 10,
            nested,
        }
    }

    #[test]
    fn test_outer_loop_shadows_nested_candidate() {
        // A(70) excluded by the band, B(40) accepted, C(15) disqualified
        // because it is nested under B.
        let graph = LoopGraph::from_loops([
            mk(0, 70.0, vec![]),
            mk(1, 40.0, vec![2]),
            mk(2, 15.0, vec![]),
        ]);
        let selected = select_candidates(&graph, SelectionBand::default());
        let ids: Vec<LoopId> = selected.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_transitive_nesting_disqualified() {
        // B(40) -> C(5) -> D(12): D qualifies on time but is transitively
        // nested under the accepted B.
        let graph = LoopGraph::from_loops([
            mk(0, 40.0, vec![1]),
            mk(1, 5.0, vec![2]),
            mk(2, 12.0, vec![]),
        ]);
        let selected = select_candidates(&graph, SelectionBand::default());
        let ids: Vec<LoopId> = selected.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_no_candidate_nested_in_another() {
        let graph = LoopGraph::from_loops([
            mk(0, 30.0, vec![1, 2]),
            mk(1, 25.0, vec![3]),
            mk(2, 15.0, vec![]),
            mk(3, 12.0, vec![]),
            mk(4, 55.0, vec![0]),
        ]);
        let selected = select_candidates(&graph, SelectionBand::default());
        let chosen: Vec<LoopId> = selected.iter().map(|l| l.id).collect();

        // expand each candidate's transitive nested closure
        for &id in &chosen {
            let mut reachable = HashSet::new();
            let mut stack = graph.get(id).unwrap().nested.clone();
            while let Some(next) = stack.pop() {
                if reachable.insert(next) {
                    stack.extend(graph.get(next).unwrap().nested.iter().copied());
                }
            }
            for &other in &chosen {
                assert!(
                    other == id || !reachable.contains(&other),
                    "candidate {other} is nested under candidate {id}"
                );
            }
        }
    }

    #[test]
    fn test_cyclic_graph_terminates_and_visits_all() {
        let graph = LoopGraph::from_loops([
            mk(0, 20.0, vec![1]),
            mk(1, 20.0, vec![2]),
            mk(2, 20.0, vec![0]),
            mk(3, 20.0, vec![3]), // self-recursion
        ]);
        let order = topological_order(&graph);
        assert_eq!(order.len(), 4);
        let unique: HashSet<LoopId> = order.iter().copied().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_order_puts_enclosing_before_nested() {
        let graph = LoopGraph::from_loops([
            mk(0, 1.0, vec![1]),
            mk(1, 1.0, vec![2]),
            mk(2, 1.0, vec![]),
        ]);
        assert_eq!(topological_order(&graph), vec![0, 1, 2]);
    }

    #[test]
    fn test_band_is_closed() {
        let band = SelectionBand::default();
        assert!(band.contains(10.0));
        assert!(band.contains(60.0));
        assert!(!band.contains(9.99));
        assert!(!band.contains(60.01));
    }
}
