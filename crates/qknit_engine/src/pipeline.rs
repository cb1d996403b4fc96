//! Pipeline for staged circuit knitting
//!
//! Gantree: L4_Engine → Pipeline
//!
//! Stages run strictly forward:
//! `NotCut → Cut → TermsGenerated → Executed → Reconstructed → Verified`.
//! An error in any stage leaves the pipeline `Failed` with its run state
//! discarded; `reset` starts over. A failing exact evaluator is not a stage
//! error: `verify` records a failed report and the reconstruction is kept.

use crate::cache::InstanceCache;
use crate::config::{CutMethod, KnitConfig};
use crate::dispatcher::{CancelHandle, DispatchReport, ExecutionDispatcher, RunControl};
use crate::reconstruct::{ReconstructedDistribution, Reconstruction, Reconstructor};
use crate::verify::{VerificationReport, Verifier};
use log::{info, warn};
use qknit_backend::{ExactEvaluator, Executor, SimulatorBackend};
use qknit_core::execution::DEFAULT_SEED;
use qknit_core::{Circuit, KnitError, KnitResult, KnitWarning};
use qknit_cutting::{
    find_cuts, from_gate_vertices, from_qubit_groups, CutSolution, Partition, TermGenerator,
    WireGraph,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Nothing done yet
    NotCut,
    /// Cut placed and circuit partitioned
    Cut,
    /// Term stream checked
    TermsGenerated,
    /// Every needed instance dispatched
    Executed,
    /// Distribution rebuilt
    Reconstructed,
    /// Compared against the exact distribution
    Verified,
    /// A stage returned an error
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Final result of a run
/// Gantree: KnitOutput // 실행 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnitOutput {
    /// Raw and nearest reconstruction
    pub reconstructed: ReconstructedDistribution,
    /// Verification metrics, when an exact evaluator is attached
    pub metrics: Option<VerificationReport>,
    /// Every warning raised during the run
    pub warnings: Vec<KnitWarning>,
    /// Number of wire cuts
    pub num_cuts: usize,
    /// Dispatch counters
    pub dispatch: DispatchReport,
    /// Wall time of the run in milliseconds
    pub elapsed_ms: u64,
}

impl KnitOutput {
    /// Check if verification ran and passed
    pub fn passed(&self) -> bool {
        self.metrics.as_ref().map_or(false, |m| m.passed)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> KnitResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Intermediate results of the current run
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// Current stage
    pub stage: PipelineStage,

    /// Circuit being knitted
    pub circuit: Option<Circuit>,

    /// Cut placement
    pub solution: Option<CutSolution>,

    /// Fragments and cut map
    pub partition: Option<Partition>,

    /// Number of summation terms
    pub total_terms: Option<u64>,

    /// Dispatch counters
    pub dispatch: Option<DispatchReport>,

    /// Reconstruction result
    pub reconstruction: Option<Reconstruction>,

    /// Verification result
    pub verification: Option<VerificationReport>,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            stage: PipelineStage::NotCut,
            circuit: None,
            solution: None,
            partition: None,
            total_terms: None,
            dispatch: None,
            reconstruction: None,
            verification: None,
        }
    }

    /// Check if a partition is held
    pub fn is_cut(&self) -> bool {
        self.partition.is_some()
    }

    /// Check if reconstruction finished
    pub fn is_reconstructed(&self) -> bool {
        self.reconstruction.is_some()
    }
}

/// Staged wire-cutting pipeline
/// Gantree: Pipeline // 단계별 실행
pub struct Pipeline {
    config: KnitConfig,
    executor: Arc<dyn Executor>,
    evaluator: Option<Arc<dyn ExactEvaluator>>,
    cache: InstanceCache,
    cancel: CancelHandle,
    control: RunControl,
    started: Option<Instant>,
    state: PipelineState,
}

impl Pipeline {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a pipeline over an executor and an optional exact evaluator
    pub fn new(
        config: KnitConfig,
        executor: Arc<dyn Executor>,
        evaluator: Option<Arc<dyn ExactEvaluator>>,
    ) -> Self {
        Self {
            config,
            executor,
            evaluator,
            cache: InstanceCache::new(),
            cancel: CancelHandle::new(),
            control: RunControl::default(),
            started: None,
            state: PipelineState::new(),
        }
    }

    /// Pipeline whose executor and evaluator are the built-in simulator
    pub fn simulated(config: KnitConfig) -> Self {
        let simulator = Arc::new(
            SimulatorBackend::new().with_seed(config.seed.unwrap_or(DEFAULT_SEED)),
        );
        let evaluator: Arc<dyn ExactEvaluator> = simulator.clone();
        Self::new(config, simulator, Some(evaluator))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get current stage
    pub fn stage(&self) -> PipelineStage {
        self.state.stage
    }

    /// Get current state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Get configuration
    pub fn config(&self) -> &KnitConfig {
        &self.config
    }

    /// Handle that cancels the running stage from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Instance cache of the current run
    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Stage 1: place cuts and partition `circuit`
    /// Gantree: cut(circuit) -> Result<&Partition> // 절단
    pub fn cut(&mut self, circuit: &Circuit) -> KnitResult<&Partition> {
        self.expect_stage(PipelineStage::NotCut)?;
        self.started = Some(Instant::now());
        self.control = RunControl::new(
            self.config.timeout_ms.map(Duration::from_millis),
            self.cancel.clone(),
        );
        let result = self.place_cuts(circuit);
        let (solution, partition) = self.settle(result)?;

        info!(
            "cut {} qubits ({} multi-qubit gates) into {} fragments with {} cuts (widths {:?})",
            circuit.num_qubits(),
            circuit.count_multi(),
            partition.num_fragments(),
            partition.num_cuts(),
            solution.widths
        );
        self.state.circuit = Some(circuit.clone());
        self.state.solution = Some(solution);
        self.state.stage = PipelineStage::Cut;
        Ok(&*self.state.partition.insert(partition))
    }

    fn place_cuts(&self, circuit: &Circuit) -> KnitResult<(CutSolution, Partition)> {
        self.config.validate()?;
        self.control.check_cancelled()?;
        if circuit.is_empty() {
            return Err(KnitError::EmptyCircuit);
        }

        let graph = WireGraph::from_circuit(circuit);
        let solution = match self.config.method {
            CutMethod::Automatic => find_cuts(&graph, &self.config.to_constraints())?,
            CutMethod::Manual => match (&self.config.subcircuit_vertices, &self.config.gate_vertices) {
                (Some(groups), _) => from_qubit_groups(&graph, groups)?,
                (None, Some(groups)) => from_gate_vertices(&graph, groups)?,
                (None, None) => {
                    return Err(KnitError::InvalidConfig(
                        "manual method needs subcircuit_vertices or gate_vertices".to_string(),
                    ))
                }
            },
        };
        let partition = Partition::build(circuit, &graph, &solution)?;

        let limit = self.executor.max_qubits();
        if let Some(fragment) = partition.fragments().iter().find(|f| f.width() > limit) {
            return Err(KnitError::InvalidPartition(format!(
                "fragment {} needs {} qubits but {} runs at most {}",
                fragment.id,
                fragment.width(),
                self.executor.name(),
                limit
            )));
        }
        Ok((solution, partition))
    }

    /// Stage 2: check the term stream and count its terms
    /// Gantree: generate_terms() -> Result<u64> // 항 생성
    pub fn generate_terms(&mut self) -> KnitResult<u64> {
        self.expect_stage(PipelineStage::Cut)?;
        let result = self
            .partition()
            .and_then(|p| TermGenerator::new(p).map(|g| g.total_terms()));
        let total = self.settle(result)?;

        info!("generated {} summation terms", total);
        self.state.total_terms = Some(total);
        self.state.stage = PipelineStage::TermsGenerated;
        Ok(total)
    }

    /// Stage 3: run every distinct instance once
    /// Gantree: execute() -> Result<&DispatchReport> // 실행
    pub fn execute(&mut self) -> KnitResult<&DispatchReport> {
        self.expect_stage(PipelineStage::TermsGenerated)?;
        let result = self.dispatch();
        let report = self.settle(result)?;

        info!(
            "executed {} instances on {} ({} lookups reused)",
            report.executed,
            self.executor.name(),
            report.reused
        );
        self.state.stage = PipelineStage::Executed;
        Ok(&*self.state.dispatch.insert(report))
    }

    fn dispatch(&self) -> KnitResult<DispatchReport> {
        let generator = TermGenerator::new(self.partition()?)?;
        let report = ExecutionDispatcher::new(self.executor.as_ref(), self.config.shot_budget)
            .with_batch_size(self.config.batch_size)
            .with_threads(self.config.threads)
            .dispatch(&generator, &self.cache, &self.control)?;

        if report.is_complete() || self.config.allow_partial {
            return Ok(report);
        }
        if report.failed > 0 {
            return Err(self.first_failure(&generator));
        }
        Err(KnitError::PartialResult {
            completed: report.executed,
            pending: report.not_attempted,
        })
    }

    fn first_failure(&self, generator: &TermGenerator<'_>) -> KnitError {
        let mut terms = generator.clone();
        terms.reset();
        for term in terms {
            for key in generator.instance_keys(&term) {
                if let Err(err @ KnitError::InstanceExecution { attempted: true, .. }) =
                    self.cache.wait(&key)
                {
                    return err;
                }
            }
        }
        KnitError::InternalError("dispatch reported a failure the cache does not hold".to_string())
    }

    /// Stage 4: rebuild the uncut distribution
    /// Gantree: reconstruct() -> Result<&ReconstructedDistribution> // 재구성
    pub fn reconstruct(&mut self) -> KnitResult<&ReconstructedDistribution> {
        self.expect_stage(PipelineStage::Executed)?;
        let result = self.partition().and_then(|partition| {
            let generator = TermGenerator::new(partition)?;
            Reconstructor::new()
                .with_dense_threshold(self.config.dense_threshold)
                .with_numerical_tolerance(self.config.numerical_tolerance)
                .with_threads(self.config.threads)
                .with_allow_partial(self.config.allow_partial)
                .reconstruct(&generator, |key| self.cache.wait(key), &self.control)
        });
        let reconstruction = self.settle(result)?;

        info!(
            "reconstructed from {} terms ({} skipped)",
            reconstruction.terms_used, reconstruction.skipped_terms
        );
        self.state.stage = PipelineStage::Reconstructed;
        Ok(&self.state.reconstruction.insert(reconstruction).distribution)
    }

    /// Stage 5: compare against the exact distribution
    /// Gantree: verify() -> Result<&VerificationReport> // 검증
    pub fn verify(&mut self) -> KnitResult<&VerificationReport> {
        self.expect_stage(PipelineStage::Reconstructed)?;
        let result = self.compare();
        let report = self.settle(result)?;

        self.state.stage = PipelineStage::Verified;
        Ok(&*self.state.verification.insert(report))
    }

    fn compare(&self) -> KnitResult<VerificationReport> {
        let evaluator = self.evaluator.as_ref().ok_or_else(|| {
            KnitError::InvalidConfig("verification needs an exact evaluator".to_string())
        })?;
        let circuit = self
            .state
            .circuit
            .as_ref()
            .ok_or_else(|| missing("circuit"))?;
        let reconstruction = self
            .state
            .reconstruction
            .as_ref()
            .ok_or_else(|| missing("reconstruction"))?;
        Verifier::new(self.config.verification_tolerance)
            .with_dense_threshold(self.config.dense_threshold)
            .verify(evaluator.as_ref(), circuit, &reconstruction.distribution)
    }

    /// Run every stage; verification is skipped without an evaluator
    /// Gantree: run(circuit) -> Result<KnitOutput> // 전체 실행
    pub fn run(&mut self, circuit: &Circuit) -> KnitResult<KnitOutput> {
        self.cut(circuit)?;
        self.generate_terms()?;
        self.execute()?;
        self.reconstruct()?;
        if self.evaluator.is_some() {
            self.verify()?;
        }
        self.output()
    }

    /// Collect the result of a finished run
    pub fn output(&self) -> KnitResult<KnitOutput> {
        let reconstruction = self
            .state
            .reconstruction
            .as_ref()
            .ok_or_else(|| missing("reconstruction"))?;
        let mut warnings = reconstruction.warnings.clone();
        if let Some(report) = &self.state.verification {
            warnings.extend(report.warnings.iter().cloned());
        }
        Ok(KnitOutput {
            reconstructed: reconstruction.distribution.clone(),
            metrics: self.state.verification.clone(),
            warnings,
            num_cuts: self.partition()?.num_cuts(),
            dispatch: self.state.dispatch.clone().unwrap_or_default(),
            elapsed_ms: self
                .started
                .map_or(0, |t| t.elapsed().as_millis() as u64),
        })
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Reset to `NotCut`, dropping all run state
    pub fn reset(&mut self) {
        self.discard_run();
        self.cancel.reset();
        self.started = None;
        self.state.stage = PipelineStage::NotCut;
    }

    /// Replace configuration and reset
    pub fn reconfigure(&mut self, config: KnitConfig) {
        self.config = config;
        self.reset();
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn expect_stage(&self, expected: PipelineStage) -> KnitResult<()> {
        if self.state.stage != expected {
            return Err(KnitError::InvalidStage {
                expected: expected.to_string(),
                found: self.state.stage.to_string(),
            });
        }
        Ok(())
    }

    fn partition(&self) -> KnitResult<&Partition> {
        self.state.partition.as_ref().ok_or_else(|| missing("partition"))
    }

    /// Move to `Failed` on error
    fn settle<T>(&mut self, result: KnitResult<T>) -> KnitResult<T> {
        if let Err(err) = &result {
            warn!("pipeline failed after {}: {}", self.state.stage, err);
            self.discard_run();
            self.state.stage = PipelineStage::Failed;
        }
        result
    }

    fn discard_run(&mut self) {
        self.cache.clear();
        let stage = self.state.stage;
        self.state = PipelineState::new();
        self.state.stage = stage;
    }
}

fn missing(what: &str) -> KnitError {
    KnitError::InternalError(format!("pipeline has no {}", what))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_circuits::{five_qubit_circuit, FailingExecutor};
    use qknit_core::CircuitBuilder;

    fn manual_config() -> KnitConfig {
        KnitConfig::manual(vec![vec![0, 1], vec![2, 3, 4]]).with_threads(2)
    }

    #[test]
    fn test_pipeline_stages() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(manual_config());
        assert_eq!(pipeline.stage(), PipelineStage::NotCut);

        assert_eq!(pipeline.cut(&circuit).unwrap().num_cuts(), 1);
        assert_eq!(pipeline.stage(), PipelineStage::Cut);

        assert_eq!(pipeline.generate_terms().unwrap(), 8);
        assert_eq!(pipeline.stage(), PipelineStage::TermsGenerated);

        let report = pipeline.execute().unwrap().clone();
        assert!(report.is_complete());
        assert_eq!(pipeline.stage(), PipelineStage::Executed);

        pipeline.reconstruct().unwrap();
        assert_eq!(pipeline.stage(), PipelineStage::Reconstructed);

        assert!(pipeline.verify().unwrap().passed);
        assert_eq!(pipeline.stage(), PipelineStage::Verified);

        let output = pipeline.output().unwrap();
        assert_eq!(output.num_cuts, 1);
        assert_eq!(output.dispatch, report);
    }

    #[test]
    fn test_out_of_order_stage() {
        let mut pipeline = Pipeline::simulated(manual_config());
        match pipeline.execute() {
            Err(KnitError::InvalidStage { expected, found }) => {
                assert_eq!(expected, "TermsGenerated");
                assert_eq!(found, "NotCut");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pipeline.stage(), PipelineStage::NotCut);
    }

    #[test]
    fn test_no_back_transitions() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(manual_config());
        pipeline.run(&circuit).unwrap();
        assert!(matches!(
            pipeline.cut(&circuit),
            Err(KnitError::InvalidStage { .. })
        ));

        pipeline.reset();
        assert_eq!(pipeline.stage(), PipelineStage::NotCut);
        assert!(!pipeline.state().is_cut());
        assert!(pipeline.cache().is_empty());
        assert!(pipeline.run(&circuit).unwrap().passed());
    }

    #[test]
    fn test_invalid_config_fails_cut() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(KnitConfig::default().with_batch_size(0));
        assert!(matches!(
            pipeline.cut(&circuit),
            Err(KnitError::InvalidConfig(_))
        ));
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
    }

    #[test]
    fn test_fragment_wider_than_executor() {
        let circuit = five_qubit_circuit();
        let executor = Arc::new(SimulatorBackend::new().with_max_qubits(2));
        let mut pipeline = Pipeline::new(manual_config(), executor, None);
        assert!(matches!(
            pipeline.cut(&circuit),
            Err(KnitError::InvalidPartition(_))
        ));
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
    }

    #[test]
    fn test_executor_failure_clears_run_state() {
        let circuit = five_qubit_circuit();
        let executor = Arc::new(FailingExecutor::for_fragment(1));
        let mut pipeline = Pipeline::new(manual_config(), executor, None);
        pipeline.cut(&circuit).unwrap();
        pipeline.generate_terms().unwrap();

        match pipeline.execute() {
            Err(KnitError::InstanceExecution {
                instance,
                attempted,
                reason,
            }) => {
                assert!(instance.starts_with("f1["));
                assert!(attempted);
                assert!(reason.contains("injected failure"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert!(!pipeline.state().is_cut());
        assert!(pipeline.cache().is_empty());
    }

    #[test]
    fn test_run_without_evaluator() {
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
        let config = KnitConfig::automatic(2, 4, vec![2]);
        let mut pipeline = Pipeline::new(config, Arc::new(SimulatorBackend::new()), None);
        let output = pipeline.run(&circuit).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Reconstructed);
        assert!(output.metrics.is_none());
        assert!(!output.passed());
        assert!((output.reconstructed.nearest.get(0b000) - 0.5).abs() < 1e-9);
        assert!((output.reconstructed.nearest.get(0b111) - 0.5).abs() < 1e-9);
    }

    struct DownEvaluator;

    impl ExactEvaluator for DownEvaluator {
        fn exact_distribution(&self, _circuit: &Circuit) -> KnitResult<qknit_core::Distribution> {
            Err(KnitError::BackendError("evaluator down".to_string()))
        }
    }

    #[test]
    fn test_evaluator_failure_keeps_reconstruction() {
        let circuit = five_qubit_circuit();
        let evaluator: Arc<dyn ExactEvaluator> = Arc::new(DownEvaluator);
        let mut pipeline = Pipeline::new(
            manual_config(),
            Arc::new(SimulatorBackend::new()),
            Some(evaluator),
        );
        let output = pipeline.run(&circuit).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Verified);
        assert!(pipeline.state().is_reconstructed());
        assert!(!output.passed());
        assert!(output.metrics.as_ref().unwrap().metrics.is_empty());
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, KnitWarning::VerificationUnavailable { .. })));

        let exact = SimulatorBackend::new().exact_distribution(&circuit).unwrap();
        for (outcome, p) in exact.iter() {
            assert!((output.reconstructed.raw.get(outcome) - p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cancel_before_execute() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(manual_config());
        pipeline.cut(&circuit).unwrap();
        pipeline.generate_terms().unwrap();

        pipeline.cancel_handle().cancel();
        assert_eq!(pipeline.execute().unwrap_err(), KnitError::Cancelled);
        assert_eq!(pipeline.stage(), PipelineStage::Failed);

        pipeline.reset();
        assert!(pipeline.run(&circuit).is_ok());
    }

    #[test]
    fn test_output_json() {
        let circuit = five_qubit_circuit();
        let mut pipeline = Pipeline::simulated(manual_config());
        let output = pipeline.run(&circuit).unwrap();
        let json = output.to_json().unwrap();
        let back: KnitOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_cuts, output.num_cuts);
        assert_eq!(back.metrics.map(|m| m.passed), Some(true));
    }
}
