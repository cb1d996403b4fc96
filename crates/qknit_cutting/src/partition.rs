//! Circuit partitioning
//!
//! Gantree: L3_Cutting → CircuitPartitioner
//!
//! Splits a circuit along a [`CutSolution`] in one walk over the gates.
//! Every wire segment belongs to exactly one fragment; a change of fragment
//! between consecutive gates on a wire is a cut, which closes the upstream
//! local wire with a measure stub and opens a fresh downstream local wire
//! with a prepare stub.

use crate::cut_finder::CutSolution;
use crate::graph::WireGraph;
use log::debug;
use qknit_core::{Circuit, KnitError, KnitResult, QubitId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// How a local wire begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireStart {
    /// Circuit input |0⟩
    Input,
    /// Downstream side of a cut
    Cut(usize),
}

/// How a local wire ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEnd {
    /// Measured as circuit output
    Output,
    /// Upstream side of a cut
    Cut(usize),
}

/// One qubit line of a fragment
/// Gantree: LocalWire // 로컬 와이어
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalWire {
    /// Original qubit
    pub qubit: QubitId,
    /// Start marker
    pub start: WireStart,
    /// End marker
    pub end: WireEnd,
}

/// Side of a cut a stub sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StubKind {
    /// Measure the outgoing state
    Upstream,
    /// Prepare the incoming state
    Downstream,
}

/// Open wire endpoint of a fragment
/// Gantree: CutStub // 절단 스텁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutStub {
    /// Cut this stub belongs to
    pub cut_id: usize,
    /// Measure or prepare
    pub kind: StubKind,
    /// Local wire of the stub
    pub local_qubit: usize,
}

/// One severed wire
/// Gantree: CutEdge // 절단 엣지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutEdge {
    /// Cut id (gate order)
    pub id: usize,
    /// Wire-graph edge
    pub edge: usize,
    /// Original qubit
    pub qubit: QubitId,
    /// Last gate before the cut
    pub upstream_gate: usize,
    /// First gate after the cut
    pub downstream_gate: usize,
    /// (fragment, local qubit) measured
    pub upstream: (usize, usize),
    /// (fragment, local qubit) prepared
    pub downstream: (usize, usize),
}

/// Cut map row: where each cut's two stubs live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutMapEntry {
    /// Cut id
    pub cut_id: usize,
    /// Fragment holding the measure stub
    pub upstream_fragment: usize,
    /// Index into that fragment's stubs
    pub upstream_stub: usize,
    /// Fragment holding the prepare stub
    pub downstream_fragment: usize,
    /// Index into that fragment's stubs
    pub downstream_stub: usize,
}

/// Sub-circuit left after cutting
/// Gantree: Fragment // 조각
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Fragment id
    pub id: usize,
    /// Local wires, ordered by (original qubit, segment order)
    pub wires: Vec<LocalWire>,
    /// Original indices of the gates, ascending
    pub gate_indices: Vec<usize>,
    /// Gates on local wires
    pub circuit: Circuit,
    /// Stubs sorted by cut id
    pub stubs: Vec<CutStub>,
}

impl Fragment {
    /// Number of local wires
    pub fn width(&self) -> usize {
        self.wires.len()
    }

    /// Local wires that end in a circuit output
    pub fn output_wires(&self) -> impl Iterator<Item = (usize, &LocalWire)> {
        self.wires
            .iter()
            .enumerate()
            .filter(|(_, w)| w.end == WireEnd::Output)
    }
}

/// Fragments, cuts and cut map of one circuit
/// Gantree: Partition // 분할 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    num_qubits: usize,
    fragments: Vec<Fragment>,
    cuts: Vec<CutEdge>,
    cut_map: Vec<CutMapEntry>,
}

// ============================================================================
// Partitioner
// ============================================================================

/// Wire segment under construction
struct Segment {
    fragment: usize,
    qubit: QubitId,
    start: WireStart,
    end: WireEnd,
}

impl Partition {
    /// Split `circuit` along `solution`
    /// Gantree: partition(circuit, graph, solution) -> Result<Partition> // 회로 분할
    pub fn build(circuit: &Circuit, graph: &WireGraph, solution: &CutSolution) -> KnitResult<Self> {
        let n = circuit.num_qubits();
        let gates = circuit.gates();
        if solution.assignment.len() != graph.num_nodes() {
            return Err(KnitError::InternalError(format!(
                "solution assigns {} nodes, graph has {}",
                solution.assignment.len(),
                graph.num_nodes()
            )));
        }
        let fragment_of_gate =
            |g: usize| -> usize { solution.assignment[graph.owner(g)] };

        // Walk the gates once, opening a new segment at every fragment change
        let mut segments: Vec<Segment> = Vec::new();
        let mut open: Vec<Option<usize>> = vec![None; n];
        let mut last_gate: Vec<Option<usize>> = vec![None; n];
        let mut gate_segments: Vec<Vec<usize>> = Vec::with_capacity(gates.len());
        let mut raw_cuts: Vec<(QubitId, usize, usize, usize, usize)> = Vec::new();

        for (g, gate) in gates.iter().enumerate() {
            let f = fragment_of_gate(g);
            let mut operands = Vec::new();
            for q in gate.qubits() {
                let segment = match open[q] {
                    Some(s) if segments[s].fragment == f => s,
                    Some(s) => {
                        let cut_id = raw_cuts.len();
                        segments[s].end = WireEnd::Cut(cut_id);
                        let fresh = segments.len();
                        segments.push(Segment {
                            fragment: f,
                            qubit: q,
                            start: WireStart::Cut(cut_id),
                            end: WireEnd::Output,
                        });
                        let upstream_gate = last_gate[q].unwrap_or(g);
                        raw_cuts.push((q, upstream_gate, g, s, fresh));
                        fresh
                    }
                    None => {
                        let fresh = segments.len();
                        segments.push(Segment {
                            fragment: f,
                            qubit: q,
                            start: WireStart::Input,
                            end: WireEnd::Output,
                        });
                        fresh
                    }
                };
                open[q] = Some(segment);
                last_gate[q] = Some(g);
                operands.push(segment);
            }
            gate_segments.push(operands);
        }

        // Untouched qubits live in their idle node's fragment
        for q in 0..n {
            if open[q].is_none() {
                let node = graph
                    .nodes()
                    .iter()
                    .find(|node| node.kind == crate::graph::NodeKind::Idle(q))
                    .ok_or_else(|| {
                        KnitError::InternalError(format!("qubit {} has no wire-graph node", q))
                    })?;
                segments.push(Segment {
                    fragment: solution.assignment[node.id],
                    qubit: q,
                    start: WireStart::Input,
                    end: WireEnd::Output,
                });
            }
        }

        // Number local wires by (original qubit, segment order)
        let mut order: Vec<usize> = (0..segments.len()).collect();
        order.sort_by_key(|&s| (segments[s].qubit, s));
        let mut local_index = vec![0usize; segments.len()];
        let mut wires: Vec<Vec<LocalWire>> = vec![Vec::new(); solution.num_fragments];
        for s in order {
            let seg = &segments[s];
            let list = wires.get_mut(seg.fragment).ok_or_else(|| {
                KnitError::InternalError(format!("fragment {} out of range", seg.fragment))
            })?;
            local_index[s] = list.len();
            list.push(LocalWire {
                qubit: seg.qubit,
                start: seg.start,
                end: seg.end,
            });
        }

        // Fragment gate lists on local wires
        let mut gate_lists: Vec<(Vec<usize>, Vec<qknit_core::Gate>)> =
            vec![(Vec::new(), Vec::new()); solution.num_fragments];
        for (g, gate) in gates.iter().enumerate() {
            let f = fragment_of_gate(g);
            let mapping: Vec<(QubitId, usize)> = gate
                .qubits()
                .into_iter()
                .zip(gate_segments[g].iter().map(|&s| local_index[s]))
                .collect();
            let local = gate.remap(|q| {
                mapping
                    .iter()
                    .find(|(orig, _)| *orig == q)
                    .map(|(_, l)| *l)
                    .unwrap_or(q)
            });
            gate_lists[f].0.push(g);
            gate_lists[f].1.push(local);
        }

        // Cuts, stubs and the cut map
        let mut cuts = Vec::with_capacity(raw_cuts.len());
        let mut stubs: Vec<Vec<CutStub>> = vec![Vec::new(); solution.num_fragments];
        let mut cut_map = Vec::with_capacity(raw_cuts.len());
        for (id, &(q, upstream_gate, downstream_gate, up_seg, down_seg)) in
            raw_cuts.iter().enumerate()
        {
            let edge = graph
                .edge_from(q, graph.owner(upstream_gate))
                .ok_or_else(|| {
                    KnitError::InternalError(format!(
                        "cut {} on qubit {} does not follow a wire-graph edge",
                        id, q
                    ))
                })?;
            let upstream = (segments[up_seg].fragment, local_index[up_seg]);
            let downstream = (segments[down_seg].fragment, local_index[down_seg]);

            stubs[upstream.0].push(CutStub {
                cut_id: id,
                kind: StubKind::Upstream,
                local_qubit: upstream.1,
            });
            stubs[downstream.0].push(CutStub {
                cut_id: id,
                kind: StubKind::Downstream,
                local_qubit: downstream.1,
            });
            cut_map.push(CutMapEntry {
                cut_id: id,
                upstream_fragment: upstream.0,
                upstream_stub: stubs[upstream.0].len() - 1,
                downstream_fragment: downstream.0,
                downstream_stub: stubs[downstream.0].len() - 1,
            });
            cuts.push(CutEdge {
                id,
                edge,
                qubit: q,
                upstream_gate,
                downstream_gate,
                upstream,
                downstream,
            });
        }

        let mut found: Vec<usize> = cuts.iter().map(|c| c.edge).collect();
        found.sort_unstable();
        if found != solution.cut_edges {
            return Err(KnitError::InternalError(format!(
                "partition cut edges {:?} differ from solution {:?}",
                found, solution.cut_edges
            )));
        }

        let mut fragments = Vec::with_capacity(solution.num_fragments);
        for (id, ((gate_indices, local_gates), (wire_list, stub_list))) in gate_lists
            .into_iter()
            .zip(wires.into_iter().zip(stubs))
            .enumerate()
        {
            if wire_list.is_empty() {
                return Err(KnitError::InternalError(format!("fragment {} is empty", id)));
            }
            let mut fragment_circuit =
                Circuit::from_gates(wire_list.len(), local_gates)?;
            fragment_circuit.set_name(format!("fragment_{}", id));
            fragments.push(Fragment {
                id,
                wires: wire_list,
                gate_indices,
                circuit: fragment_circuit,
                stubs: stub_list,
            });
        }

        debug!(
            "partitioned {} qubits into {} fragments with {} cuts (widths {:?})",
            n,
            fragments.len(),
            cuts.len(),
            fragments.iter().map(Fragment::width).collect::<Vec<_>>()
        );

        Ok(Self {
            num_qubits: n,
            fragments,
            cuts,
            cut_map,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Qubits of the uncut circuit
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Fragments in id order
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Number of fragments
    pub fn num_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Cuts in id order
    pub fn cuts(&self) -> &[CutEdge] {
        &self.cuts
    }

    /// Number of cuts
    pub fn num_cuts(&self) -> usize {
        self.cuts.len()
    }

    /// Cut map in cut id order
    pub fn cut_map(&self) -> &[CutMapEntry] {
        &self.cut_map
    }

    // ========================================================================
    // Reassembly
    // ========================================================================

    /// Rebuild the uncut circuit by joining every cut with an identity wire
    /// Gantree: stitch(&self) -> Result<Circuit> // 재조립
    pub fn stitch(&self) -> KnitResult<Circuit> {
        let mut placed: Vec<(usize, qknit_core::Gate)> = Vec::new();
        for fragment in &self.fragments {
            for (local, &index) in fragment.circuit.gates().iter().zip(&fragment.gate_indices) {
                placed.push((index, local.remap(|l| fragment.wires[l].qubit)));
            }
        }
        placed.sort_by_key(|(index, _)| *index);
        Circuit::from_gates(
            self.num_qubits,
            placed.into_iter().map(|(_, gate)| gate).collect(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
