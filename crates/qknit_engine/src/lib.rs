//! # QKNIT Engine
//!
//! Runs a cut circuit end to end: dispatch of subcircuit instances,
//! reconstruction of the uncut distribution, and verification.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qknit_engine // L4: Engine (완료)
//!     KnitConfig // 통합 설정 (완료)
//!         automatic(), manual(), manual_vertices()
//!         validate(), load(), save()
//!     InstanceCache // 인스턴스 단일 실행 캐시 (완료)
//!     ExecutionDispatcher // 배치 병렬 실행 (완료)
//!     Reconstructor // 병렬 항 합산 (완료)
//!     Verifier // MSE, MAPE, CE, TVD, HOP (완료)
//!     Pipeline // 단계별 실행 (완료)
//!         cut() → generate_terms() → execute() → reconstruct() → verify()
//!         run() - 전체 파이프라인
//!     CoordinateSearch // 블랙박스 최소화 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qknit_core::CircuitBuilder;
//! use qknit_engine::prelude::*;
//!
//! let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
//!
//! // Fragments of at most two qubits, two fragments
//! let config = KnitConfig::automatic(2, 4, vec![2]);
//! let mut pipeline = Pipeline::simulated(config);
//! let output = pipeline.run(&circuit).unwrap();
//!
//! assert_eq!(output.num_cuts, 1);
//! assert!(output.passed());
//! ```
//!
//! ## Using Stages
//!
//! ```rust
//! use qknit_core::CircuitBuilder;
//! use qknit_engine::prelude::*;
//!
//! let circuit = CircuitBuilder::new(4).h_layer().cx_chain().build().unwrap();
//! let mut pipeline = Pipeline::simulated(KnitConfig::manual(vec![vec![0, 1], vec![2, 3]]));
//!
//! pipeline.cut(&circuit).unwrap();
//! let terms = pipeline.generate_terms().unwrap();
//! assert_eq!(terms, 8);
//! pipeline.execute().unwrap();
//! let reconstructed = pipeline.reconstruct().unwrap();
//! assert!(reconstructed.nearest.is_normalized(1e-9));
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Configuration (Gantree: L4_Engine → KnitConfig)
pub mod config;

/// Instance cache (Gantree: L4_Engine → InstanceCache)
pub mod cache;

/// Dispatch (Gantree: L4_Engine → ExecutionDispatcher)
pub mod dispatcher;

/// Reconstruction (Gantree: L4_Engine → Reconstructor)
pub mod reconstruct;

/// Verification (Gantree: L4_Engine → Verifier)
pub mod verify;

/// Pipeline (Gantree: L4_Engine → Pipeline)
pub mod pipeline;

/// Minimizer boundary (Gantree: L4_Engine → Minimizer)
pub mod variational;

// ============================================================================
// Re-exports
// ============================================================================

pub use cache::InstanceCache;
pub use config::{CutMethod, KnitConfig};
pub use dispatcher::{CancelHandle, DispatchReport, ExecutionDispatcher, RunControl};
pub use pipeline::{KnitOutput, Pipeline, PipelineStage, PipelineState};
pub use reconstruct::{nearest, ReconstructedDistribution, Reconstruction, Reconstructor};
pub use variational::{CoordinateSearch, IterationRecord, MinimizeResult, Minimizer, Objective};
pub use verify::{compute_metrics, metric, MetricMap, VerificationReport, Verifier};

// ============================================================================
// Prelude
// ============================================================================

/// Convenient imports for common use cases
pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qknit_engine::prelude::*;
    //! ```

    pub use crate::config::{CutMethod, KnitConfig};
    pub use crate::dispatcher::CancelHandle;
    pub use crate::pipeline::{KnitOutput, Pipeline, PipelineStage};
    pub use crate::reconstruct::ReconstructedDistribution;
    pub use crate::variational::{CoordinateSearch, Minimizer};
    pub use crate::verify::{metric, VerificationReport};
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
    use super::test_circuits::{five_qubit_circuit, FailingExecutor};
    use qknit_backend::{ExactEvaluator, SimulatorBackend};
    use qknit_core::{CircuitBuilder, KnitError, KnitResult, KnitWarning};
    use std::sync::Arc;
    use std::time::Duration;

    fn mse(output: &KnitOutput, variant: &str) -> f64 {
        output
            .metrics
            .as_ref()
            .and_then(|m| m.metric(variant, metric::MSE))
            .unwrap()
    }

    #[test]
    fn test_manual_split_exact() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]]);
        let output = Pipeline::simulated(config).run(&circuit).unwrap();

        assert_eq!(output.num_cuts, 1);
        assert!(output.passed());
        assert!(mse(&output, "raw") < 1e-9);
        assert!(mse(&output, "nearest") < 1e-9);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_automatic_split_exact() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::automatic(3, 10, vec![2]);
        let mut pipeline = Pipeline::simulated(config);
        let output = pipeline.run(&circuit).unwrap();

        assert_eq!(output.num_cuts, 1);
        let widths = &pipeline.state().solution.as_ref().unwrap().widths;
        assert!(widths.iter().all(|&w| w <= 3));
        assert!(mse(&output, "raw") < 1e-9);
        assert!(mse(&output, "nearest") < 1e-9);
    }

    #[test]
    fn test_gate_vertex_split_exact() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual_vertices(vec![vec![0, 1], vec![2, 3]]);
        let output = Pipeline::simulated(config).run(&circuit).unwrap();
        assert_eq!(output.num_cuts, 1);
        assert!(output.passed());
    }

    #[test]
    fn test_zero_cuts_reproduce_exact() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1, 2, 3, 4]]);
        let output = Pipeline::simulated(config).run(&circuit).unwrap();

        assert_eq!(output.num_cuts, 0);
        assert_eq!(output.dispatch.executed, 1);
        let exact = SimulatorBackend::new().exact_distribution(&circuit).unwrap();
        for (outcome, p) in exact.iter() {
            assert!((output.reconstructed.raw.get(outcome) - p).abs() < 1e-15);
            assert!((output.reconstructed.nearest.get(outcome) - p).abs() < 1e-15);
        }
        assert!(mse(&output, "raw") < 1e-20);
    }

    #[test]
    fn test_each_instance_runs_once() {
        let circuit = five_qubit_circuit();
        let executor = Arc::new(FailingExecutor::counting());
        let evaluator: Arc<dyn ExactEvaluator> = Arc::new(SimulatorBackend::new());
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]])
            .with_threads(4)
            .with_batch_size(1);
        let output = Pipeline::new(config, executor.clone(), Some(evaluator))
            .run(&circuit)
            .unwrap();

        // Z, X, Y measurements upstream; six preparations downstream
        assert_eq!(executor.calls(), 9);
        assert_eq!(output.dispatch.executed, 9);
        assert_eq!(output.dispatch.requested, 16);
        assert_eq!(output.dispatch.reused, 7);
        assert!(output.passed());
    }

    #[test]
    fn test_sampled_execution_close() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]])
            .with_shots(50_000)
            .with_seed(7);
        let output = Pipeline::simulated(config).run(&circuit).unwrap();

        let metrics = output.metrics.as_ref().unwrap();
        assert!(metrics.metric("nearest", metric::MSE).unwrap() < 1e-3);
        assert!(metrics.metric("nearest", metric::TVD).unwrap() < 0.15);
        assert!(output.reconstructed.nearest.is_normalized(1e-9));
    }

    #[test]
    fn test_deadline_surfaces_partial_result() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]]).with_timeout_ms(1);
        let mut pipeline = Pipeline::simulated(config);
        pipeline.cut(&circuit).unwrap();
        pipeline.generate_terms().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(
            pipeline.execute().unwrap_err(),
            KnitError::PartialResult {
                completed: 0,
                pending: 9
            }
        );
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
    }

    #[test]
    fn test_deadline_with_partial_reconstructs_completed_terms() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]])
            .with_threads(1)
            .with_batch_size(1)
            .with_timeout_ms(50)
            .with_allow_partial(true);
        let executor = Arc::new(FailingExecutor::slow(Duration::from_millis(30)));
        let mut pipeline = Pipeline::new(config, executor, None);
        let output = pipeline.run(&circuit).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Reconstructed);
        assert!(output.dispatch.executed >= 1);
        assert!(output.dispatch.not_attempted > 0);
        assert_eq!(output.dispatch.failed, 0);
        assert!(output.warnings.iter().any(|w| matches!(
            w,
            KnitWarning::PartialReconstruction { total_terms: 8, .. }
        )));
        assert!(output.reconstructed.nearest.is_normalized(1e-9));
    }

    #[test]
    fn test_partial_reconstruction_skips_failed_fragment() {
        let circuit = five_qubit_circuit();
        let config = KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]]).with_allow_partial(true);
        let executor = Arc::new(FailingExecutor::for_fragment(1));
        let mut pipeline = Pipeline::new(config, executor, None);
        let output = pipeline.run(&circuit).unwrap();

        assert_eq!(output.dispatch.failed, 6);
        assert!(output.warnings.iter().any(|w| matches!(
            w,
            KnitWarning::PartialReconstruction {
                skipped_terms: 8,
                total_terms: 8
            }
        )));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]]));
        let handle = pipeline.cancel_handle();
        std::thread::spawn(move || handle.cancel()).join().unwrap();

        assert_eq!(pipeline.run(&circuit).unwrap_err(), KnitError::Cancelled);
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert!(pipeline.cache().is_empty());
    }

    #[test]
    fn test_minimizer_drives_pipeline() {
        let mut pipeline = Pipeline::simulated(KnitConfig::automatic(2, 4, vec![2]));
        let mut objective = |theta: &[f64]| -> KnitResult<f64> {
            let circuit = CircuitBuilder::new(3)
                .ry(0, theta[0])
                .cx(0, 1)
                .cx(1, 2)
                .build()?;
            pipeline.reset();
            let output = pipeline.run(&circuit)?;
            Ok(1.0 - output.reconstructed.nearest.get(0b111))
        };

        let result = CoordinateSearch::new(0.5)
            .with_tolerance(1e-3)
            .minimize(&mut objective, &[0.3])
            .unwrap();
        assert!(result.converged);
        assert!(result.value < 1e-5);
        assert!((result.params[0] - std::f64::consts::PI).abs() < 5e-3);
    }
}
