//! Pipeline configuration for QKNIT
//!
//! Gantree: L4_Engine → KnitConfig
//!
//! One serde-backed struct for cut placement, execution, reconstruction, and
//! verification settings. Missing JSON fields take their defaults.

use qknit_backend::ShotBudget;
use qknit_core::constants::{cutting, execution, numerics};
use qknit_core::{KnitError, KnitResult, QubitId};
use qknit_cutting::CutConstraints;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How cuts are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CutMethod {
    /// Branch-and-bound search under the width and cut limits
    #[default]
    Automatic,
    /// Caller-supplied qubit groups or gate-vertex groups
    Manual,
}

/// Unified QKNIT configuration
/// Gantree: KnitConfig // 통합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnitConfig {
    // ========================================================================
    // Cut Placement
    // ========================================================================
    /// Automatic or manual placement
    pub method: CutMethod,

    /// Widest fragment allowed (local wires)
    pub max_subcircuit_width: usize,

    /// Most cuts allowed in total
    pub max_cuts: usize,

    /// Most stubs allowed on one fragment
    pub max_subcircuit_cuts: Option<usize>,

    /// Most gates allowed in one fragment
    pub max_subcircuit_size: Option<usize>,

    /// Allowed fragment counts
    pub num_subcircuits: Vec<usize>,

    /// Manual qubit groups
    pub subcircuit_vertices: Option<Vec<Vec<QubitId>>>,

    /// Manual multi-qubit-gate vertex groups
    pub gate_vertices: Option<Vec<Vec<usize>>>,

    /// Search states the automatic finder may visit
    pub search_budget: u64,

    // ========================================================================
    // Execution
    // ========================================================================
    /// Exact or sampled fragment execution
    pub shot_budget: ShotBudget,

    /// Instances per executor batch
    pub batch_size: usize,

    /// Worker threads for dispatch and reconstruction
    pub threads: usize,

    /// Overall deadline in milliseconds
    pub timeout_ms: Option<u64>,

    /// Reconstruct from whatever executed instead of failing
    pub allow_partial: bool,

    /// Seed for sampled execution
    pub seed: Option<u64>,

    // ========================================================================
    // Reconstruction & Verification
    // ========================================================================
    /// Widest output kept in a dense accumulator
    pub dense_threshold: usize,

    /// Negative mass / sum drift that triggers a numerical warning
    pub numerical_tolerance: f64,

    /// MSE at or below which verification passes
    pub verification_tolerance: f64,
}

impl KnitConfig {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Automatic placement with the given limits
    pub fn automatic(
        max_subcircuit_width: usize,
        max_cuts: usize,
        num_subcircuits: Vec<usize>,
    ) -> Self {
        Self {
            method: CutMethod::Automatic,
            max_subcircuit_width,
            max_cuts,
            num_subcircuits,
            ..Self::default()
        }
    }

    /// Manual placement from qubit groups
    pub fn manual(groups: Vec<Vec<QubitId>>) -> Self {
        Self {
            method: CutMethod::Manual,
            subcircuit_vertices: Some(groups),
            ..Self::default()
        }
    }

    /// Manual placement from multi-qubit-gate vertex groups
    pub fn manual_vertices(groups: Vec<Vec<usize>>) -> Self {
        Self {
            method: CutMethod::Manual,
            gate_vertices: Some(groups),
            ..Self::default()
        }
    }

    // ========================================================================
    // Builder Methods
    // ========================================================================

    /// Set the per-fragment stub limit
    pub fn with_max_subcircuit_cuts(mut self, cuts: usize) -> Self {
        self.max_subcircuit_cuts = Some(cuts);
        self
    }

    /// Set the per-fragment gate limit
    pub fn with_max_subcircuit_size(mut self, size: usize) -> Self {
        self.max_subcircuit_size = Some(size);
        self
    }

    /// Set the search budget
    pub fn with_search_budget(mut self, budget: u64) -> Self {
        self.search_budget = budget;
        self
    }

    /// Set the shot budget
    pub fn with_shot_budget(mut self, budget: ShotBudget) -> Self {
        self.shot_budget = budget;
        self
    }

    /// Set shots (sampled execution)
    pub fn with_shots(mut self, shots: u64) -> Self {
        self.shot_budget = ShotBudget::Shots(shots);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set worker threads
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the dense accumulator threshold
    pub fn with_dense_threshold(mut self, qubits: usize) -> Self {
        self.dense_threshold = qubits;
        self
    }

    /// Set the numerical warning tolerance
    pub fn with_numerical_tolerance(mut self, tolerance: f64) -> Self {
        self.numerical_tolerance = tolerance;
        self
    }

    /// Set the verification tolerance
    pub fn with_verification_tolerance(mut self, tolerance: f64) -> Self {
        self.verification_tolerance = tolerance;
        self
    }

    /// Set the overall deadline
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Allow partial reconstruction
    pub fn with_allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    /// Set seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Search constraints for automatic placement
    pub fn to_constraints(&self) -> CutConstraints {
        CutConstraints {
            max_subcircuit_width: self.max_subcircuit_width,
            max_cuts: self.max_cuts,
            max_subcircuit_cuts: self.max_subcircuit_cuts,
            max_subcircuit_size: self.max_subcircuit_size,
            num_subcircuits: self.num_subcircuits.clone(),
            search_budget: self.search_budget,
        }
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> KnitResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> KnitResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> KnitResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> KnitResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate configuration
    pub fn validate(&self) -> KnitResult<()> {
        let invalid = |msg: String| -> KnitResult<()> { Err(KnitError::InvalidConfig(msg)) };

        match self.method {
            CutMethod::Automatic => {
                if self.max_subcircuit_width == 0 {
                    return invalid("max_subcircuit_width must be > 0".to_string());
                }
                if self.num_subcircuits.is_empty() || self.num_subcircuits.contains(&0) {
                    return invalid(format!(
                        "num_subcircuits must list positive counts, got {:?}",
                        self.num_subcircuits
                    ));
                }
                if self.search_budget == 0 {
                    return invalid("search_budget must be > 0".to_string());
                }
            }
            CutMethod::Manual => {
                match (&self.subcircuit_vertices, &self.gate_vertices) {
                    (Some(_), Some(_)) => {
                        return invalid(
                            "set either subcircuit_vertices or gate_vertices, not both".to_string(),
                        )
                    }
                    (None, None) => {
                        return invalid(
                            "manual method needs subcircuit_vertices or gate_vertices".to_string(),
                        )
                    }
                    _ => {}
                }
            }
        }

        if self.max_cuts > cutting::MAX_CUTS {
            return invalid(format!(
                "max_cuts must be <= {}, got {}",
                cutting::MAX_CUTS,
                self.max_cuts
            ));
        }
        if self.shot_budget == ShotBudget::Shots(0) {
            return invalid("shots must be > 0".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be > 0".to_string());
        }
        if self.threads == 0 {
            return invalid("threads must be > 0".to_string());
        }
        if self.dense_threshold > numerics::MAX_DENSE_QUBITS {
            return invalid(format!(
                "dense_threshold must be <= {}, got {}",
                numerics::MAX_DENSE_QUBITS,
                self.dense_threshold
            ));
        }
        let tolerances = [self.numerical_tolerance, self.verification_tolerance];
        if tolerances.iter().any(|t| t.is_nan() || *t < 0.0) {
            return invalid("tolerances must be non-negative".to_string());
        }
        if self.timeout_ms == Some(0) {
            return invalid("timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for KnitConfig {
    fn default() -> Self {
        Self {
            method: CutMethod::Automatic,
            max_subcircuit_width: 10,
            max_cuts: 10,
            max_subcircuit_cuts: None,
            max_subcircuit_size: None,
            num_subcircuits: cutting::DEFAULT_NUM_SUBCIRCUITS.to_vec(),
            subcircuit_vertices: None,
            gate_vertices: None,
            search_budget: cutting::DEFAULT_SEARCH_BUDGET,
            shot_budget: ShotBudget::Exact,
            batch_size: execution::DEFAULT_BATCH_SIZE,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout_ms: None,
            allow_partial: false,
            seed: None,
            dense_threshold: numerics::DEFAULT_DENSE_THRESHOLD,
            numerical_tolerance: numerics::DEFAULT_NUMERICAL_TOLERANCE,
            verification_tolerance: numerics::DEFAULT_VERIFICATION_TOLERANCE,
        }
    }
}

impl fmt::Display for KnitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KnitConfig({:?}, width<={}, cuts<={}, {}, batch={}, threads={})",
            self.method,
            self.max_subcircuit_width,
            self.max_cuts,
            self.shot_budget,
            self.batch_size,
            self.threads
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
