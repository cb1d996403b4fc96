//! Cut placement
//!
//! Gantree: L3_Cutting → CutFinder
//!
//! Automatic mode runs an exact branch-and-bound over node-to-fragment
//! assignments. Nodes are visited in gate order and fragments are opened in
//! restricted-growth order, so every partition is enumerated once. Widths,
//! sizes and cut counts only grow as nodes are placed, which makes every
//! bound below safe to prune on.
//!
//! Manual modes turn a qubit grouping or a gate-vertex grouping into the same
//! [`CutSolution`] shape.

use crate::graph::WireGraph;
use log::{debug, warn};
use qknit_core::constants::cutting;
use qknit_core::{KnitError, KnitResult, QubitId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constraints
// ============================================================================

/// Limits for the automatic search
/// Gantree: CutConstraints // 탐색 제약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutConstraints {
    /// Most local wires per fragment
    pub max_subcircuit_width: usize,
    /// Most cuts overall
    pub max_cuts: usize,
    /// Most cut stubs per fragment
    pub max_subcircuit_cuts: Option<usize>,
    /// Most gates per fragment
    pub max_subcircuit_size: Option<usize>,
    /// Allowed fragment counts
    pub num_subcircuits: Vec<usize>,
    /// Search states visited before giving up
    pub search_budget: u64,
}

impl CutConstraints {
    /// Constraints with the given width and cut limits
    pub fn new(max_subcircuit_width: usize, max_cuts: usize, num_subcircuits: Vec<usize>) -> Self {
        Self {
            max_subcircuit_width,
            max_cuts,
            max_subcircuit_cuts: None,
            max_subcircuit_size: None,
            num_subcircuits,
            search_budget: cutting::DEFAULT_SEARCH_BUDGET,
        }
    }

    fn describe(&self) -> String {
        let mut text = format!(
            "max_subcircuit_width={}, max_cuts={}, num_subcircuits={:?}",
            self.max_subcircuit_width, self.max_cuts, self.num_subcircuits
        );
        if let Some(c) = self.max_subcircuit_cuts {
            text.push_str(&format!(", max_subcircuit_cuts={}", c));
        }
        if let Some(s) = self.max_subcircuit_size {
            text.push_str(&format!(", max_subcircuit_size={}", s));
        }
        text
    }
}

// ============================================================================
// Solution
// ============================================================================

/// A cut placement: fragment of every wire-graph node plus derived metrics
/// Gantree: CutSolution // 절단 해
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutSolution {
    /// Fragment of every node
    pub assignment: Vec<usize>,
    /// Number of fragments
    pub num_fragments: usize,
    /// Severed edges, ascending
    pub cut_edges: Vec<usize>,
    /// Local wire count per fragment
    pub widths: Vec<usize>,
    /// Owned gate count per fragment
    pub sizes: Vec<usize>,
    /// Cut stubs per fragment
    pub stub_counts: Vec<usize>,
    /// False when the search budget ran out first
    pub proven_optimal: bool,
    /// Search states visited (0 for manual placements)
    pub explored: u64,
}

impl CutSolution {
    /// Derive metrics for a complete assignment
    pub fn from_assignment(graph: &WireGraph, assignment: Vec<usize>, num_fragments: usize) -> Self {
        let cut_edges = graph.cut_edges(&assignment);
        let mut stub_counts = vec![0; num_fragments];
        for &e in &cut_edges {
            let edge = &graph.edges()[e];
            stub_counts[assignment[edge.source]] += 1;
            stub_counts[assignment[edge.target]] += 1;
        }
        Self {
            widths: graph.fragment_widths(&assignment, num_fragments),
            sizes: graph.fragment_sizes(&assignment, num_fragments),
            assignment,
            num_fragments,
            cut_edges,
            stub_counts,
            proven_optimal: true,
            explored: 0,
        }
    }

    /// Number of cuts
    pub fn num_cuts(&self) -> usize {
        self.cut_edges.len()
    }
}

// ============================================================================
// Automatic Search
// ============================================================================

/// Minimum-cut placement satisfying `constraints`
/// Gantree: find_cuts(graph, constraints) -> Result<CutSolution> // 자동 탐색
pub fn find_cuts(graph: &WireGraph, constraints: &CutConstraints) -> KnitResult<CutSolution> {
    let max_k = constraints.num_subcircuits.iter().copied().max().unwrap_or(0);
    let min_k = constraints.num_subcircuits.iter().copied().min().unwrap_or(0);
    if min_k == 0 {
        return Err(KnitError::InvalidConfig(
            "num_subcircuits must list positive fragment counts".into(),
        ));
    }
    if graph.num_nodes() < min_k {
        return Err(KnitError::InfeasiblePartition {
            constraints: constraints.describe(),
            explored: 0,
        });
    }

    let mut search = Search {
        graph,
        constraints,
        min_k,
        max_k,
        assignment: vec![usize::MAX; graph.num_nodes()],
        widths: vec![0; max_k],
        sizes: vec![0; max_k],
        stubs: vec![0; max_k],
        cut_stack: Vec::new(),
        used: 0,
        best: None,
        explored: 0,
        exhausted: false,
    };
    search.descend(0);

    let Search {
        best,
        explored,
        exhausted,
        ..
    } = search;
    match best {
        Some(best) => {
            let mut solution = CutSolution::from_assignment(graph, best.assignment, best.fragments);
            solution.proven_optimal = !exhausted;
            solution.explored = explored;
            if exhausted {
                warn!(
                    "cut search budget of {} states exhausted; returning {} cuts, not proven optimal",
                    constraints.search_budget,
                    solution.num_cuts()
                );
            } else {
                debug!(
                    "cut search found {} cuts over {} fragments after {} states",
                    solution.num_cuts(),
                    solution.num_fragments,
                    explored
                );
            }
            Ok(solution)
        }
        None => Err(KnitError::InfeasiblePartition {
            constraints: constraints.describe(),
            explored,
        }),
    }
}

/// Best leaf seen so far
struct Incumbent {
    assignment: Vec<usize>,
    fragments: usize,
    edges: Vec<usize>,
}

struct Search<'a> {
    graph: &'a WireGraph,
    constraints: &'a CutConstraints,
    min_k: usize,
    max_k: usize,
    assignment: Vec<usize>,
    widths: Vec<usize>,
    sizes: Vec<usize>,
    stubs: Vec<usize>,
    cut_stack: Vec<usize>,
    used: usize,
    best: Option<Incumbent>,
    explored: u64,
    exhausted: bool,
}

impl Search<'_> {
    fn descend(&mut self, node: usize) {
        if self.exhausted {
            return;
        }
        if node == self.graph.num_nodes() {
            self.record_leaf();
            return;
        }
        // Not enough nodes left to open the required fragments
        if self.used + (self.graph.num_nodes() - node) < self.min_k {
            return;
        }

        let limit = (self.used + 1).min(self.max_k);
        for f in 0..limit {
            if self.explored >= self.constraints.search_budget {
                self.exhausted = true;
                return;
            }
            self.explored += 1;

            let opened = f == self.used;
            let added = self.place(node, f);
            if opened {
                self.used += 1;
            }
            if self.feasible(f) {
                self.descend(node + 1);
            }
            if opened {
                self.used -= 1;
            }
            self.unplace(node, f, added);
        }
    }

    /// Assign `node` to `f`; returns the number of cut edges pushed
    fn place(&mut self, node: usize, f: usize) -> usize {
        let graph = self.graph;
        let info = &graph.nodes()[node];
        self.assignment[node] = f;
        self.sizes[f] += info.size;
        let mut added = 0;
        for input in &info.inputs {
            match input {
                None => self.widths[f] += 1,
                Some(e) => {
                    let source = self.assignment[graph.edges()[*e].source];
                    if source != f {
                        self.widths[f] += 1;
                        self.stubs[f] += 1;
                        self.stubs[source] += 1;
                        self.cut_stack.push(*e);
                        added += 1;
                    }
                }
            }
        }
        added
    }

    fn unplace(&mut self, node: usize, f: usize, added: usize) {
        let graph = self.graph;
        let info = &graph.nodes()[node];
        self.sizes[f] -= info.size;
        for input in &info.inputs {
            match input {
                None => self.widths[f] -= 1,
                Some(e) => {
                    let source = self.assignment[graph.edges()[*e].source];
                    if source != f {
                        self.widths[f] -= 1;
                        self.stubs[f] -= 1;
                        self.stubs[source] -= 1;
                    }
                }
            }
        }
        let keep = self.cut_stack.len() - added;
        self.cut_stack.truncate(keep);
        self.assignment[node] = usize::MAX;
    }

    fn feasible(&self, f: usize) -> bool {
        let c = self.constraints;
        let cuts = self.cut_stack.len();
        if cuts > c.max_cuts || self.widths[f] > c.max_subcircuit_width {
            return false;
        }
        // Equal counts stay open for the lexicographic tie-break
        if matches!(&self.best, Some(best) if cuts > best.edges.len()) {
            return false;
        }
        if matches!(c.max_subcircuit_size, Some(limit) if self.sizes[f] > limit) {
            return false;
        }
        if let Some(limit) = c.max_subcircuit_cuts {
            // Placing a node also adds stubs to the fragments it cuts from
            if self.stubs[..self.used].iter().any(|&s| s > limit) {
                return false;
            }
        }
        true
    }

    fn record_leaf(&mut self) {
        if !self.constraints.num_subcircuits.contains(&self.used) {
            return;
        }
        let mut edges = self.cut_stack.clone();
        edges.sort_unstable();
        let better = match &self.best {
            None => true,
            Some(best) => (edges.len(), &edges) < (best.edges.len(), &best.edges),
        };
        if better {
            self.best = Some(Incumbent {
                assignment: self.assignment.clone(),
                fragments: self.used,
                edges,
            });
        }
    }
}

// ============================================================================
// Manual Placement
// ============================================================================

/// Placement from qubit groups: each qubit in exactly one group
/// Gantree: from_qubit_groups(graph, groups) -> Result<CutSolution> // 수동(큐비트)
pub fn from_qubit_groups(graph: &WireGraph, groups: &[Vec<QubitId>]) -> KnitResult<CutSolution> {
    let n = graph.num_qubits();
    let mut group_of: Vec<Option<usize>> = vec![None; n];
    for (g, group) in groups.iter().enumerate() {
        for &q in group {
            if q >= n {
                return Err(KnitError::InvalidPartition(format!(
                    "qubit {} in group {} is out of range (circuit has {} qubits)",
                    q, g, n
                )));
            }
            if let Some(other) = group_of[q] {
                return Err(KnitError::InvalidPartition(format!(
                    "qubit {} appears in groups {} and {}",
                    q, other, g
                )));
            }
            group_of[q] = Some(g);
        }
    }
    if let Some(q) = group_of.iter().position(Option::is_none) {
        return Err(KnitError::InvalidPartition(format!(
            "qubit {} is not in any group",
            q
        )));
    }

    // Multi-qubit gates spanning groups follow their first qubit
    let raw: Vec<usize> = graph
        .nodes()
        .iter()
        .map(|node| group_of[node.qubits[0]].unwrap_or_default())
        .collect();

    // Drop groups without nodes, keep group order
    let mut renumber: Vec<Option<usize>> = vec![None; groups.len()];
    let mut next = 0;
    for g in 0..groups.len() {
        if raw.contains(&g) {
            renumber[g] = Some(next);
            next += 1;
        }
    }
    let assignment = raw
        .iter()
        .map(|&g| renumber[g].unwrap_or_default())
        .collect();
    Ok(CutSolution::from_assignment(graph, assignment, next))
}

/// Placement from gate-vertex groups: each multi-qubit gate vertex in exactly
/// one group; idle qubits join the fragment with the fewest wires
/// Gantree: from_gate_vertices(graph, groups) -> Result<CutSolution> // 수동(게이트)
pub fn from_gate_vertices(graph: &WireGraph, groups: &[Vec<usize>]) -> KnitResult<CutSolution> {
    let vertices = graph.num_gate_nodes();
    let mut assignment = vec![usize::MAX; graph.num_nodes()];
    for (g, group) in groups.iter().enumerate() {
        if group.is_empty() {
            return Err(KnitError::InvalidPartition(format!("vertex group {} is empty", g)));
        }
        for &v in group {
            if v >= vertices {
                return Err(KnitError::InvalidPartition(format!(
                    "vertex {} in group {} is out of range (circuit has {} multi-qubit gates)",
                    v, g, vertices
                )));
            }
            if assignment[v] != usize::MAX {
                return Err(KnitError::InvalidPartition(format!(
                    "vertex {} appears in groups {} and {}",
                    v, assignment[v], g
                )));
            }
            assignment[v] = g;
        }
    }
    if let Some(v) = assignment[..vertices].iter().position(|&f| f == usize::MAX) {
        return Err(KnitError::InvalidPartition(format!(
            "vertex {} is not in any group",
            v
        )));
    }

    let num_fragments = groups.len().max(1);
    let mut widths = vec![0usize; num_fragments];
    for node in &graph.nodes()[..vertices] {
        let f = assignment[node.id];
        for input in &node.inputs {
            let starts = match input {
                None => true,
                Some(e) => assignment[graph.edges()[*e].source] != f,
            };
            if starts {
                widths[f] += 1;
            }
        }
    }
    for node in &graph.nodes()[vertices..] {
        let (f, _) = widths
            .iter()
            .enumerate()
            .min_by_key(|&(i, &w)| (w, i))
            .unwrap_or((0, &0));
        assignment[node.id] = f;
        widths[f] += 1;
    }
    Ok(CutSolution::from_assignment(graph, assignment, num_fragments))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_circuits::five_qubit_circuit;
    use qknit_core::CircuitBuilder;

    fn five_qubit_graph() -> WireGraph {
        WireGraph::from_circuit(&five_qubit_circuit())
    }

    #[test]
    fn test_automatic_unique_solution() {
        let graph = five_qubit_graph();
        let mut constraints = CutConstraints::new(3, 10, vec![2]);
        constraints.max_subcircuit_cuts = Some(10);
        constraints.max_subcircuit_size = Some(12);

        let solution = find_cuts(&graph, &constraints).unwrap();
        assert_eq!(solution.assignment, vec![0, 0, 1, 1]);
        assert_eq!(solution.cut_edges, vec![1]);
        assert_eq!(solution.widths, vec![3, 3]);
        assert_eq!(solution.sizes, vec![12, 11]);
        assert_eq!(solution.stub_counts, vec![1, 1]);
        assert!(solution.proven_optimal);
    }

    #[test]
    fn test_automatic_infeasible() {
        let graph = five_qubit_graph();
        let constraints = CutConstraints::new(2, 10, vec![2]);
        let err = find_cuts(&graph, &constraints).unwrap_err();
        assert!(matches!(err, KnitError::InfeasiblePartition { .. }));
        assert!(err.to_string().contains("max_subcircuit_width=2"));
    }

    #[test]
    fn test_size_limit_excludes_solution() {
        let graph = five_qubit_graph();
        let mut constraints = CutConstraints::new(3, 10, vec![2]);
        constraints.max_subcircuit_size = Some(11);
        assert!(find_cuts(&graph, &constraints).is_err());
    }

    #[test]
    fn test_single_fragment_has_no_cuts() {
        let graph = five_qubit_graph();
        let solution = find_cuts(&graph, &CutConstraints::new(5, 0, vec![1])).unwrap();
        assert_eq!(solution.num_cuts(), 0);
        assert_eq!(solution.num_fragments, 1);
    }

    #[test]
    fn test_budget_exhaustion() {
        let graph = five_qubit_graph();
        let mut constraints = CutConstraints::new(5, 10, vec![2, 3]);
        constraints.search_budget = 5;
        // The fifth state completes the first feasible leaf [0, 0, 0, 1]
        let solution = find_cuts(&graph, &constraints).unwrap();
        assert!(!solution.proven_optimal);
        assert_eq!(solution.explored, 5);
        assert_eq!(solution.cut_edges, vec![2]);

        constraints.search_budget = 1_000;
        let full = find_cuts(&graph, &constraints).unwrap();
        assert!(full.proven_optimal);
        assert_eq!(full.cut_edges, vec![0]);

        constraints.search_budget = 2;
        assert!(matches!(
            find_cuts(&graph, &constraints),
            Err(KnitError::InfeasiblePartition { explored: 2, .. })
        ));
    }

    #[test]
    fn test_ties_take_lowest_edges() {
        // Either wire of the staircase can be cut; edge 0 wins the tie
        let circuit = CircuitBuilder::new(4)
            .cx(0, 1)
            .cx(1, 2)
            .cx(2, 3)
            .build()
            .unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = find_cuts(&graph, &CutConstraints::new(3, 4, vec![2])).unwrap();
        assert_eq!(solution.cut_edges, vec![0]);
        assert_eq!(solution.assignment, vec![0, 1, 1]);
    }

    #[test]
    fn test_qubit_groups() {
        let graph = five_qubit_graph();
        let solution = from_qubit_groups(&graph, &[vec![0, 1], vec![2, 3, 4]]).unwrap();
        assert_eq!(solution.assignment, vec![0, 0, 1, 1]);
        assert_eq!(solution.cut_edges, vec![1]);
    }

    #[test]
    fn test_qubit_groups_validation() {
        let graph = five_qubit_graph();
        assert!(matches!(
            from_qubit_groups(&graph, &[vec![0, 1], vec![2, 3]]),
            Err(KnitError::InvalidPartition(_))
        ));
        assert!(matches!(
            from_qubit_groups(&graph, &[vec![0, 1, 2], vec![2, 3, 4]]),
            Err(KnitError::InvalidPartition(_))
        ));
        assert!(from_qubit_groups(&graph, &[vec![0, 1, 2, 3, 4, 5]]).is_err());
    }

    #[test]
    fn test_qubit_groups_drop_empty() {
        let graph = five_qubit_graph();
        // cx01 follows qubit 0, leaving the group of qubit 1 without nodes
        let solution = from_qubit_groups(&graph, &[vec![0, 2, 3, 4], vec![1]]).unwrap();
        assert_eq!(solution.num_fragments, 1);
        assert_eq!(solution.assignment, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_gate_vertices() {
        let graph = five_qubit_graph();
        let solution = from_gate_vertices(&graph, &[vec![0, 1], vec![2, 3]]).unwrap();
        assert_eq!(solution.assignment, vec![0, 0, 1, 1]);
        assert!(from_gate_vertices(&graph, &[vec![0, 1], vec![2]]).is_err());
        assert!(from_gate_vertices(&graph, &[vec![0, 1, 2], vec![2, 3]]).is_err());
    }

    #[test]
    fn test_gate_vertices_idle_placement() {
        let circuit = CircuitBuilder::new(4)
            .cx(0, 1)
            .cx(1, 2)
            .h(3)
            .build()
            .unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0], vec![1]]).unwrap();
        // widths before idle: [2, 2] -> idle qubit 3 joins fragment 0
        assert_eq!(solution.assignment, vec![0, 1, 0]);
        assert_eq!(solution.widths, vec![3, 2]);
    }
}
