//! Error and warning types for QKNIT
//!
//! Gantree: L0_Foundation → Errors
//!
//! Fatal conditions are [`KnitError`] values. Conditions that must not abort
//! a run (numerical drift, failed verification, partial reconstruction) are
//! [`KnitWarning`] values attached to results.

// Error variant fields are self-documenting via error messages
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for QKNIT
/// Gantree: KnitError // enum
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnitError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Qubit index out of range
    /// Gantree: QubitOutOfRange{{q,max}} // 큐비트 범위
    #[error("Qubit {qubit} out of range: max is {max}")]
    QubitOutOfRange { qubit: usize, max: usize },

    /// Invalid bitstring format
    #[error("Invalid bitstring '{0}': must contain only '0' and '1'")]
    InvalidBitstring(String),

    /// Invalid basis character
    #[error("Invalid basis '{0}': must be X, Y, or Z")]
    InvalidBasis(String),

    /// Invalid angle
    #[error("Invalid angle {0}: must be finite")]
    InvalidAngle(f64),

    /// Distribution failed validation (width, sum, or entries)
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    /// Configuration rejected by `validate()`
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Circuit Errors
    // ========================================================================
    /// Circuit without qubits
    #[error("Circuit has no qubits")]
    EmptyCircuit,

    /// Gate on non-existent qubit
    #[error("Gate references qubit {qubit} but circuit has only {num_qubits} qubits")]
    GateQubitMismatch { qubit: usize, num_qubits: usize },

    /// Gate acting twice on the same qubit
    #[error("Gate '{gate}' acts on qubit {qubit} more than once")]
    DuplicateGateQubit { gate: String, qubit: usize },

    /// Gate the simulator cannot apply
    #[error("Unsupported gate: {0}")]
    UnsupportedGate(String),

    /// Circuit wider than an outcome index can address
    #[error("Circuit has {qubits} qubits, at most {max} are supported")]
    TooManyQubits { qubits: usize, max: usize },

    // ========================================================================
    // Partition Errors
    // ========================================================================
    /// Manual grouping does not cover every qubit (or vertex) exactly once
    /// Gantree: InvalidPartition(String) // 수동 분할 오류
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// Automatic search found no cut set satisfying the constraints
    /// Gantree: InfeasiblePartition{{constraints,explored}} // 탐색 실패
    #[error("No feasible partition for {constraints} (explored {explored} search states)")]
    InfeasiblePartition { constraints: String, explored: u64 },

    /// More cuts than the term enumeration can index
    #[error("{cuts} cuts exceed the supported maximum of {max}")]
    TooManyCuts { cuts: usize, max: usize },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Backend execution error
    /// Gantree: BackendError(String) // 백엔드
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Executor failed for one subcircuit instance
    /// Gantree: InstanceExecution{{instance,attempted,reason}} // 인스턴스 실행 실패
    #[error("Instance {instance} failed ({}): {reason}", attempt_label(.attempted))]
    InstanceExecution {
        instance: String,
        attempted: bool,
        reason: String,
    },

    /// Deadline reached before every instance was executed
    #[error("Partial result: {completed} instances completed, {pending} pending at timeout")]
    PartialResult { completed: usize, pending: usize },

    /// Run cancelled through its cancel handle
    #[error("Run cancelled")]
    Cancelled,

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// Stage method called out of order
    #[error("Pipeline stage error: expected {expected}, found {found}")]
    InvalidStage { expected: String, found: String },

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(String),

    /// File I/O error
    #[error("File error: {0}")]
    FileError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    InternalError(String),
}

fn attempt_label(attempted: &bool) -> &'static str {
    if *attempted {
        "attempted"
    } else {
        "never attempted"
    }
}

/// Result type alias for QKNIT operations
/// Gantree: KnitResult<T> // type alias
pub type KnitResult<T> = Result<T, KnitError>;

// ============================================================================
// Error Conversion Helpers
// ============================================================================

impl From<serde_json::Error> for KnitError {
    fn from(err: serde_json::Error) -> Self {
        KnitError::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for KnitError {
    fn from(err: std::io::Error) -> Self {
        KnitError::FileError(err.to_string())
    }
}

// ============================================================================
// Error Helpers
// ============================================================================

impl KnitError {
    /// Errors raised while placing cuts, before anything is dispatched
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            KnitError::InvalidPartition(_)
                | KnitError::InfeasiblePartition { .. }
                | KnitError::TooManyCuts { .. }
        )
    }

    /// Errors raised by or around the executor
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            KnitError::BackendError(_)
                | KnitError::InstanceExecution { .. }
                | KnitError::PartialResult { .. }
        )
    }

    /// A rerun with a longer deadline or a new executor may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KnitError::PartialResult { .. }
                | KnitError::Cancelled
                | KnitError::InstanceExecution {
                    attempted: false,
                    ..
                }
        )
    }

    /// Check if error is a circuit error
    pub fn is_circuit_error(&self) -> bool {
        matches!(
            self,
            KnitError::EmptyCircuit
                | KnitError::GateQubitMismatch { .. }
                | KnitError::DuplicateGateQubit { .. }
                | KnitError::UnsupportedGate(_)
                | KnitError::TooManyQubits { .. }
        )
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Non-fatal condition attached to a pipeline result
/// Gantree: KnitWarning // 경고 (비치명)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnitWarning {
    /// Raw reconstruction drifted from a probability distribution
    ReconstructionNumerical {
        negative_mass: f64,
        sum_deviation: f64,
        tolerance: f64,
    },

    /// A verification metric exceeded its threshold
    VerificationToleranceExceeded {
        variant: String,
        metric: String,
        value: f64,
        tolerance: f64,
    },

    /// Terms skipped because an instance result was unavailable
    PartialReconstruction {
        skipped_terms: u64,
        total_terms: u64,
    },

    /// The exact evaluator failed; no metrics were computed
    VerificationUnavailable {
        reason: String,
    },
}

impl fmt::Display for KnitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnitWarning::ReconstructionNumerical {
                negative_mass,
                sum_deviation,
                tolerance,
            } => write!(
                f,
                "ReconstructionNumericalWarning: negative mass {:.3e}, sum deviation {:.3e} (tolerance {:.1e})",
                negative_mass, sum_deviation, tolerance
            ),
            KnitWarning::VerificationToleranceExceeded {
                variant,
                metric,
                value,
                tolerance,
            } => write!(
                f,
                "VerificationToleranceExceeded: {} {} = {:.3e} > {:.1e}",
                variant, metric, value, tolerance
            ),
            KnitWarning::PartialReconstruction {
                skipped_terms,
                total_terms,
            } => write!(
                f,
                "PartialReconstruction: skipped {} of {} terms",
                skipped_terms, total_terms
            ),
            KnitWarning::VerificationUnavailable { reason } => {
                write!(f, "VerificationUnavailable: {}", reason)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
