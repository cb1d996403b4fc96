//! Wire graph arena
//!
//! Gantree: L3_Cutting → WireGraph
//!
//! Nodes are the multi-qubit gates of a circuit, in gate order, followed by
//! one node per idle qubit (a qubit no multi-qubit gate touches). Edges are
//! the wire segments between consecutive nodes on a qubit and are numbered
//! in the order their downstream gate appears. Everything is addressed by
//! plain indices.

use qknit_core::{Circuit, QubitId};
use std::collections::HashMap;

/// What a wire-graph node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Multi-qubit gate at this index of the circuit
    Gate(usize),
    /// Qubit without any multi-qubit gate
    Idle(QubitId),
}

/// Wire-graph node
/// Gantree: WireNode // 노드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireNode {
    /// Node index
    pub id: usize,
    /// Gate or idle qubit
    pub kind: NodeKind,
    /// Qubits in operand order
    pub qubits: Vec<QubitId>,
    /// Incoming edge per operand (`None` at the start of a wire)
    pub inputs: Vec<Option<usize>>,
    /// Gates owned by this node, single-qubit gates included
    pub size: usize,
}

/// Wire segment between two consecutive nodes on one qubit
/// Gantree: WireEdge // 엣지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireEdge {
    /// Edge index
    pub id: usize,
    /// Qubit carried
    pub qubit: QubitId,
    /// Upstream node
    pub source: usize,
    /// Downstream node
    pub target: usize,
}

/// Arena graph of a circuit's multi-qubit structure
/// Gantree: WireGraph // 와이어 그래프
#[derive(Debug, Clone)]
pub struct WireGraph {
    num_qubits: usize,
    nodes: Vec<WireNode>,
    edges: Vec<WireEdge>,
    /// Owning node of every gate
    owner: Vec<usize>,
    /// (qubit, source node) -> edge
    outgoing: HashMap<(QubitId, usize), usize>,
    num_gate_nodes: usize,
}

impl WireGraph {
    /// Build the wire graph of `circuit`
    /// Gantree: from_circuit(circuit) -> WireGraph // 그래프 생성
    pub fn from_circuit(circuit: &Circuit) -> Self {
        let n = circuit.num_qubits();
        let gates = circuit.gates();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut outgoing = HashMap::new();
        let mut last_node: Vec<Option<usize>> = vec![None; n];
        let mut gate_node: Vec<Option<usize>> = vec![None; gates.len()];

        for (index, gate) in gates.iter().enumerate() {
            if !gate.is_multi_qubit() {
                continue;
            }
            let id = nodes.len();
            let qubits = gate.qubits();
            let mut inputs = Vec::with_capacity(qubits.len());
            for &q in &qubits {
                let input = last_node[q].map(|source| {
                    let edge = edges.len();
                    edges.push(WireEdge {
                        id: edge,
                        qubit: q,
                        source,
                        target: id,
                    });
                    outgoing.insert((q, source), edge);
                    edge
                });
                inputs.push(input);
                last_node[q] = Some(id);
            }
            gate_node[index] = Some(id);
            nodes.push(WireNode {
                id,
                kind: NodeKind::Gate(index),
                qubits,
                inputs,
                size: 0,
            });
        }
        let num_gate_nodes = nodes.len();

        let mut idle_node: Vec<Option<usize>> = vec![None; n];
        for q in 0..n {
            if last_node[q].is_none() {
                let id = nodes.len();
                nodes.push(WireNode {
                    id,
                    kind: NodeKind::Idle(q),
                    qubits: vec![q],
                    inputs: vec![None],
                    size: 0,
                });
                idle_node[q] = Some(id);
            }
        }

        // Single-qubit gates follow the previous node on their wire, else
        // the next one, else the idle node.
        let mut owner = vec![0usize; gates.len()];
        let mut previous: Vec<Option<usize>> = idle_node.clone();
        let mut pending: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (index, gate) in gates.iter().enumerate() {
            if let Some(node) = gate_node[index] {
                owner[index] = node;
                for q in gate.qubits() {
                    for waiting in pending[q].drain(..) {
                        owner[waiting] = node;
                    }
                    previous[q] = Some(node);
                }
            } else {
                let q = gate.qubits()[0];
                match previous[q] {
                    Some(node) => owner[index] = node,
                    None => pending[q].push(index),
                }
            }
        }
        for &node in &owner {
            nodes[node].size += 1;
        }

        Self {
            num_qubits: n,
            nodes,
            edges,
            owner,
            outgoing,
            num_gate_nodes,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of circuit qubits
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// All nodes, gate nodes first
    pub fn nodes(&self) -> &[WireNode] {
        &self.nodes
    }

    /// All edges in gate order
    pub fn edges(&self) -> &[WireEdge] {
        &self.edges
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of multi-qubit gate nodes (vertex indices `0..n`)
    pub fn num_gate_nodes(&self) -> usize {
        self.num_gate_nodes
    }

    /// Node owning gate `index`
    pub fn owner(&self, gate_index: usize) -> usize {
        self.owner[gate_index]
    }

    /// Edge leaving `source` along `qubit`
    pub fn edge_from(&self, qubit: QubitId, source: usize) -> Option<usize> {
        self.outgoing.get(&(qubit, source)).copied()
    }

    // ========================================================================
    // Fragment Metrics
    // ========================================================================

    /// Local wire count of every fragment under `assignment`
    /// Gantree: fragment_widths(assignment, k) -> Vec<usize> // 폭 계산
    pub fn fragment_widths(&self, assignment: &[usize], num_fragments: usize) -> Vec<usize> {
        let mut widths = vec![0; num_fragments];
        for node in &self.nodes {
            let f = assignment[node.id];
            for input in &node.inputs {
                let starts_wire = match input {
                    None => true,
                    Some(e) => assignment[self.edges[*e].source] != f,
                };
                if starts_wire {
                    widths[f] += 1;
                }
            }
        }
        widths
    }

    /// Owned gate count of every fragment under `assignment`
    pub fn fragment_sizes(&self, assignment: &[usize], num_fragments: usize) -> Vec<usize> {
        let mut sizes = vec![0; num_fragments];
        for node in &self.nodes {
            sizes[assignment[node.id]] += node.size;
        }
        sizes
    }

    /// Edges whose endpoints lie in different fragments, ascending
    pub fn cut_edges(&self, assignment: &[usize]) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|e| assignment[e.source] != assignment[e.target])
            .map(|e| e.id)
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_circuits::five_qubit_circuit;
    use qknit_core::CircuitBuilder;

    #[test]
    fn test_five_qubit_graph() {
        let graph = WireGraph::from_circuit(&five_qubit_circuit());
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_gate_nodes(), 4);

        let edges: Vec<(usize, usize, usize)> = graph
            .edges()
            .iter()
            .map(|e| (e.qubit, e.source, e.target))
            .collect();
        assert_eq!(edges, vec![(0, 0, 1), (2, 1, 2), (2, 2, 3)]);

        let sizes: Vec<usize> = graph.nodes().iter().map(|n| n.size).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 23);
        assert_eq!(graph.edge_from(2, 1), Some(1));
    }

    #[test]
    fn test_idle_qubits_get_nodes() {
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).x(2).build().unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.nodes()[1].kind, NodeKind::Idle(2));
        assert_eq!(graph.owner(0), 0);
        assert_eq!(graph.owner(2), 1);
        assert_eq!(graph.nodes()[1].size, 1);
    }

    #[test]
    fn test_leading_gates_attach_forward() {
        let circuit = CircuitBuilder::new(3)
            .h(2)
            .cx(0, 1)
            .cx(1, 2)
            .build()
            .unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        assert_eq!(graph.owner(0), 1);
        assert_eq!(graph.nodes()[1].size, 2);
    }

    #[test]
    fn test_widths_and_cuts() {
        let graph = WireGraph::from_circuit(&five_qubit_circuit());
        let assignment = [0, 0, 1, 1];
        assert_eq!(graph.fragment_widths(&assignment, 2), vec![3, 3]);
        assert_eq!(graph.fragment_sizes(&assignment, 2), vec![12, 11]);
        assert_eq!(graph.cut_edges(&assignment), vec![1]);

        let single = [0, 0, 0, 0];
        assert_eq!(graph.fragment_widths(&single, 1), vec![5]);
        assert!(graph.cut_edges(&single).is_empty());
    }
}
