//! Executor capabilities and shot budgets
//!
//! Gantree: L2_Backend → ExecutorTrait
//!
//! The cutting engine never runs circuits itself. It talks to an
//! [`Executor`] (sampled or exact fragment execution) and, for
//! verification, to an [`ExactEvaluator`].

use qknit_core::constants::numerics;
use qknit_core::{Circuit, Distribution, KnitError, KnitResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Shot Budget
// ============================================================================

/// How many samples an executor may draw per circuit
/// Gantree: ShotBudget // Exact | Shots(u64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShotBudget {
    /// Exact probabilities, no sampling
    #[default]
    Exact,
    /// Empirical frequencies from this many shots
    Shots(u64),
}

impl ShotBudget {
    /// Check if the budget asks for exact probabilities
    pub fn is_exact(&self) -> bool {
        matches!(self, ShotBudget::Exact)
    }

    /// Shot count, if sampled
    pub fn shots(&self) -> Option<u64> {
        match self {
            ShotBudget::Exact => None,
            ShotBudget::Shots(n) => Some(*n),
        }
    }
}

impl fmt::Display for ShotBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShotBudget::Exact => write!(f, "exact"),
            ShotBudget::Shots(n) => write!(f, "{} shots", n),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Fragment execution capability
/// Gantree: Executor // 실행 인터페이스
///
/// Returned distributions are over the circuit's own qubits (bit `i` =
/// local qubit `i`) and must sum to 1.
pub trait Executor: Send + Sync {
    /// Executor name (for logs and reports)
    fn name(&self) -> &str;

    /// Widest circuit this executor accepts
    fn max_qubits(&self) -> usize;

    /// Execute one circuit
    /// Gantree: execute(circuit, budget) -> Result<Distribution>
    fn execute(&self, circuit: &Circuit, budget: ShotBudget) -> KnitResult<Distribution>;

    /// Execute several circuits, one result per input in order
    fn execute_batch(
        &self,
        circuits: &[Circuit],
        budget: ShotBudget,
    ) -> Vec<KnitResult<Distribution>> {
        circuits.iter().map(|c| self.execute(c, budget)).collect()
    }
}

/// Exact output distribution of a whole circuit (verification ground truth)
/// Gantree: ExactEvaluator // 정확 분포
pub trait ExactEvaluator: Send + Sync {
    /// Exact distribution over every qubit of `circuit`
    fn exact_distribution(&self, circuit: &Circuit) -> KnitResult<Distribution>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_qubits(&self) -> usize {
        (**self).max_qubits()
    }

    fn execute(&self, circuit: &Circuit, budget: ShotBudget) -> KnitResult<Distribution> {
        (**self).execute(circuit, budget)
    }

    fn execute_batch(
        &self,
        circuits: &[Circuit],
        budget: ShotBudget,
    ) -> Vec<KnitResult<Distribution>> {
        (**self).execute_batch(circuits, budget)
    }
}

impl<E: ExactEvaluator + ?Sized> ExactEvaluator for Arc<E> {
    fn exact_distribution(&self, circuit: &Circuit) -> KnitResult<Distribution> {
        (**self).exact_distribution(circuit)
    }
}

// ============================================================================
// Output Validation
// ============================================================================

/// Check an executor result against the circuit it came from
/// Gantree: validate_output(circuit, dist) -> Result // 결과 검증
pub fn validate_output(circuit: &Circuit, dist: &Distribution) -> KnitResult<()> {
    if dist.num_bits() != circuit.num_qubits() {
        return Err(KnitError::InvalidDistribution(format!(
            "expected {} bits, executor returned {}",
            circuit.num_qubits(),
            dist.num_bits()
        )));
    }
    dist.validate_probabilities(numerics::PROBABILITY_SUM_TOLERANCE)
}

// ============================================================================
// Tests
// ============================================================================
