//! Verification against the exact distribution
//!
//! Gantree: L4_Engine → Verifier

use crate::reconstruct::ReconstructedDistribution;
use log::{info, warn};
use qknit_backend::ExactEvaluator;
use qknit_core::numerics::{CROSS_ENTROPY_EPSILON, MAX_DENSE_QUBITS};
use qknit_core::{Circuit, Distribution, KnitError, KnitResult, KnitWarning, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Metric names
pub mod metric {
    /// Mean squared error over the full outcome space
    pub const MSE: &str = "mse";
    /// Mean absolute percentage error over the exact support
    pub const MAPE: &str = "mape";
    /// Cross entropy of the observed distribution against the exact one
    pub const CROSS_ENTROPY: &str = "cross_entropy";
    /// Total variation distance
    pub const TVD: &str = "tvd";
    /// Heavy output probability
    pub const HOP: &str = "hop";
}

/// Metric name -> value
pub type MetricMap = BTreeMap<String, f64>;

/// Metrics per variant plus the pass flag
/// Gantree: VerificationReport // 검증 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// "raw" / "nearest" -> metrics
    pub metrics: BTreeMap<String, MetricMap>,
    /// Both MSE values within tolerance
    pub passed: bool,
    /// Tolerance breaches
    pub warnings: Vec<KnitWarning>,
}

impl VerificationReport {
    /// Look up one metric
    pub fn metric(&self, variant: &str, name: &str) -> Option<f64> {
        self.metrics.get(variant)?.get(name).copied()
    }
}

/// Compare `observed` against `exact`; HOP only when `dense`
/// Gantree: compute_metrics(exact, observed) -> MetricMap // 지표 계산
pub fn compute_metrics(exact: &Distribution, observed: &Distribution, dense: bool) -> KnitResult<MetricMap> {
    if exact.num_bits() != observed.num_bits() {
        return Err(KnitError::InvalidDistribution(format!(
            "cannot compare {}-bit and {}-bit distributions",
            exact.num_bits(),
            observed.num_bits()
        )));
    }
    let support: BTreeSet<Outcome> = exact.outcomes().chain(observed.outcomes()).collect();
    let space = 2f64.powi(exact.num_bits() as i32);

    let mut squared = 0.0;
    let mut absolute = 0.0;
    for &x in &support {
        let d = observed.get(x) - exact.get(x);
        squared += d * d;
        absolute += d.abs();
    }

    let mut percentage = 0.0;
    let mut counted = 0usize;
    let mut cross_entropy = 0.0;
    for (x, p) in exact.iter() {
        if p > 0.0 {
            percentage += (observed.get(x) - p).abs() / p;
            counted += 1;
            cross_entropy -= p * observed.get(x).max(CROSS_ENTROPY_EPSILON).ln();
        }
    }

    let mut metrics = MetricMap::new();
    metrics.insert(metric::MSE.to_string(), squared / space);
    metrics.insert(
        metric::MAPE.to_string(),
        if counted > 0 {
            100.0 * percentage / counted as f64
        } else {
            0.0
        },
    );
    metrics.insert(metric::CROSS_ENTROPY.to_string(), cross_entropy);
    metrics.insert(metric::TVD.to_string(), 0.5 * absolute);
    if dense {
        metrics.insert(metric::HOP.to_string(), heavy_output_probability(exact, observed)?);
    }
    Ok(metrics)
}

/// Observed mass on outcomes whose exact probability exceeds the median
pub fn heavy_output_probability(exact: &Distribution, observed: &Distribution) -> KnitResult<f64> {
    let mut probabilities = exact.to_dense()?;
    probabilities.sort_by(|a, b| a.total_cmp(b));
    let len = probabilities.len();
    let median = if len % 2 == 0 {
        0.5 * (probabilities[len / 2 - 1] + probabilities[len / 2])
    } else {
        probabilities[len / 2]
    };
    Ok(exact
        .iter()
        .filter(|(_, p)| *p > median)
        .map(|(x, _)| observed.get(x))
        .sum())
}

/// Checks a reconstruction against ground truth
/// Gantree: Verifier // 검증기
#[derive(Debug, Clone)]
pub struct Verifier {
    tolerance: f64,
    dense_threshold: usize,
}

impl Verifier {
    /// Verifier passing at MSE <= `tolerance`
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            dense_threshold: qknit_core::numerics::DEFAULT_DENSE_THRESHOLD,
        }
    }

    /// Widest output for which HOP is reported
    pub fn with_dense_threshold(mut self, qubits: usize) -> Self {
        self.dense_threshold = qubits.min(MAX_DENSE_QUBITS);
        self
    }

    /// Compare both variants against `evaluator`'s exact distribution.
    /// An evaluator failure yields a failed report with no metrics.
    /// Gantree: verify(evaluator, circuit, reconstructed) -> Result<VerificationReport> // 검증
    pub fn verify(
        &self,
        evaluator: &dyn ExactEvaluator,
        circuit: &Circuit,
        reconstructed: &ReconstructedDistribution,
    ) -> KnitResult<VerificationReport> {
        let exact = match evaluator.exact_distribution(circuit) {
            Ok(exact) => exact,
            Err(err) => {
                let warning = KnitWarning::VerificationUnavailable {
                    reason: err.to_string(),
                };
                warn!("{}", warning);
                return Ok(VerificationReport {
                    metrics: BTreeMap::new(),
                    passed: false,
                    warnings: vec![warning],
                });
            }
        };
        let dense = circuit.num_qubits() <= self.dense_threshold;

        let mut metrics = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut passed = true;
        for (variant, observed) in [("raw", &reconstructed.raw), ("nearest", &reconstructed.nearest)] {
            let values = compute_metrics(&exact, observed, dense)?;
            let mse = values.get(metric::MSE).copied().unwrap_or(f64::INFINITY);
            if mse.is_nan() || mse > self.tolerance {
                passed = false;
                let warning = KnitWarning::VerificationToleranceExceeded {
                    variant: variant.to_string(),
                    metric: metric::MSE.to_string(),
                    value: mse,
                    tolerance: self.tolerance,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
            metrics.insert(variant.to_string(), values);
        }
        info!(
            "verification {}: raw mse {:.3e}, nearest mse {:.3e}",
            if passed { "passed" } else { "failed" },
            metrics["raw"][metric::MSE],
            metrics["nearest"][metric::MSE]
        );

        Ok(VerificationReport {
            metrics,
            passed,
            warnings,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
