//! # QKNIT Cutting
//!
//! Wire-cut placement, circuit partitioning, and the summation terms that
//! stand in for every severed wire.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qknit_cutting // L3: Cutting (완료)
//!     WireGraph // 멀티큐비트 게이트 아레나 그래프 (완료)
//!     CutFinder // 자동 분기한정 탐색 + 수동 그룹 (완료)
//!     CircuitPartitioner // 조각, 스텁, 절단 맵, stitch (완료)
//!     CutBasis // 8개 측정-준비 라벨 (완료)
//!     SummationTermGenerator // 지연 항 스트림, 인스턴스 생성 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qknit_core::CircuitBuilder;
//! use qknit_cutting::prelude::*;
//!
//! let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
//! let graph = WireGraph::from_circuit(&circuit);
//! let solution = find_cuts(&graph, &CutConstraints::new(2, 4, vec![2])).unwrap();
//! assert_eq!(solution.num_cuts(), 1);
//!
//! let partition = Partition::build(&circuit, &graph, &solution).unwrap();
//! let terms = TermGenerator::new(&partition).unwrap();
//! assert_eq!(terms.len(), 8);
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Wire graph arena (Gantree: L3_Cutting → WireGraph)
pub mod graph;

/// Cut placement (Gantree: L3_Cutting → CutFinder)
pub mod cut_finder;

/// Fragments and cut map (Gantree: L3_Cutting → CircuitPartitioner)
pub mod partition;

/// Cut basis labels (Gantree: L3_Cutting → CutBasis)
pub mod basis;

/// Term stream and instances (Gantree: L3_Cutting → SummationTermGenerator)
pub mod terms;

// ============================================================================
// Re-exports
// ============================================================================

pub use basis::{CutBasis, Observable};
pub use cut_finder::{find_cuts, from_gate_vertices, from_qubit_groups, CutConstraints, CutSolution};
pub use graph::{NodeKind, WireEdge, WireGraph, WireNode};
pub use partition::{
    CutEdge, CutMapEntry, CutStub, Fragment, LocalWire, Partition, StubKind, WireEnd, WireStart,
};
pub use terms::{InstanceKey, StubSetting, SubcircuitInstance, SummationTerm, TermGenerator};

// ============================================================================
// Prelude
// ============================================================================

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qknit_cutting::prelude::*;
    //! ```

    pub use crate::basis::{CutBasis, Observable};
    pub use crate::cut_finder::{
        find_cuts, from_gate_vertices, from_qubit_groups, CutConstraints, CutSolution,
    };
    pub use crate::graph::WireGraph;
    pub use crate::partition::{Fragment, Partition, StubKind};
    pub use crate::terms::{InstanceKey, StubSetting, SubcircuitInstance, SummationTerm, TermGenerator};
}

// ============================================================================
// Shared Test Circuits
// ============================================================================


// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use super::test_circuits::five_qubit_circuit;
    use qknit_backend::{ExactEvaluator, SimulatorBackend};

    #[test]
    fn test_automatic_matches_manual() {
        let circuit = five_qubit_circuit();
        let graph = WireGraph::from_circuit(&circuit);
        let automatic = find_cuts(&graph, &CutConstraints::new(3, 10, vec![2])).unwrap();
        let manual = from_qubit_groups(&graph, &[vec![0, 1], vec![2, 3, 4]]).unwrap();
        assert_eq!(automatic.assignment, manual.assignment);
        assert_eq!(automatic.cut_edges, manual.cut_edges);
    }

    #[test]
    fn test_stitched_circuit_same_distribution() {
        let circuit = five_qubit_circuit();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = find_cuts(&graph, &CutConstraints::new(3, 10, vec![2])).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();

        let backend = SimulatorBackend::new();
        let original = backend.exact_distribution(&circuit).unwrap();
        let stitched = backend
            .exact_distribution(&partition.stitch().unwrap())
            .unwrap();
        for (outcome, p) in original.iter() {
            assert!((stitched.get(outcome) - p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_every_instance_fits_fragment_width() {
        let circuit = five_qubit_circuit();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_qubit_groups(&graph, &[vec![0, 1], vec![2, 3, 4]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        let generator = TermGenerator::new(&partition).unwrap();
        for term in generator.clone() {
            for key in generator.instance_keys(&term) {
                let instance = generator.build_instance(&key).unwrap();
                assert!(instance.circuit.num_qubits() <= 3);
            }
        }
    }
}
