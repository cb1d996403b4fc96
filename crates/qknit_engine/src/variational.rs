//! Black-box minimizer boundary
//!
//! Gantree: L4_Engine → Minimizer
//!
//! The objective is an opaque callback, typically one that rebuilds a
//! parameterised circuit and reruns a [`Pipeline`](crate::Pipeline). The
//! minimizer sees parameters and scalar values only.

use log::debug;
use qknit_core::{KnitError, KnitResult};
use serde::{Deserialize, Serialize};

/// Objective callback
pub type Objective<'a> = dyn FnMut(&[f64]) -> KnitResult<f64> + 'a;

/// One sweep over all coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration index (0-based)
    pub iteration: usize,
    /// Probe step used in this sweep
    pub step: f64,
    /// Best value after the sweep
    pub value: f64,
    /// Number of coordinates that moved
    pub moves: usize,
}

/// Minimization outcome
/// Gantree: MinimizeResult // 최소화 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizeResult {
    /// Best parameters found
    pub params: Vec<f64>,
    /// Objective at `params`
    pub value: f64,
    /// Value at the starting point
    pub initial_value: f64,
    /// Sweeps performed
    pub iterations: usize,
    /// Objective calls
    pub evaluations: usize,
    /// Step fell below tolerance before the iteration cap
    pub converged: bool,
    /// Per-sweep history
    pub history: Vec<IterationRecord>,
}

impl MinimizeResult {
    /// Decrease from the starting value
    pub fn improvement(&self) -> f64 {
        self.initial_value - self.value
    }
}

/// Black-box minimizer
/// Gantree: Minimizer // 블랙박스 최소화기
pub trait Minimizer {
    /// Minimize `objective` starting from `initial`
    fn minimize(
        &self,
        objective: &mut Objective<'_>,
        initial: &[f64],
    ) -> KnitResult<MinimizeResult>;
}

/// Coordinate search with ±step probes and geometric step decay
/// Gantree: CoordinateSearch // 좌표 탐색
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSearch {
    /// Initial probe step
    pub step: f64,
    /// Step multiplier after a sweep without improvement, in (0, 1)
    pub decay: f64,
    /// Converged once the step drops below this
    pub tolerance: f64,
    /// Sweep cap
    pub max_iterations: usize,
}

impl Default for CoordinateSearch {
    fn default() -> Self {
        Self {
            step: 0.1,
            decay: 0.5,
            tolerance: 1e-4,
            max_iterations: 100,
        }
    }
}

impl CoordinateSearch {
    /// Search with the given initial step
    pub fn new(step: f64) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Set step decay
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Set convergence tolerance on the step
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set sweep cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> KnitResult<()> {
        if !(self.step > 0.0) || !self.step.is_finite() {
            return Err(KnitError::InvalidConfig(format!("step must be > 0, got {}", self.step)));
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(KnitError::InvalidConfig(format!(
                "decay must be in (0, 1), got {}",
                self.decay
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(KnitError::InvalidConfig(format!(
                "tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

fn evaluate(
    objective: &mut Objective<'_>,
    params: &[f64],
    evaluations: &mut usize,
) -> KnitResult<f64> {
    *evaluations += 1;
    let value = objective(params)?;
    if value.is_nan() {
        return Err(KnitError::InternalError(format!(
            "objective returned NaN at {:?}",
            params
        )));
    }
    Ok(value)
}

impl Minimizer for CoordinateSearch {
    fn minimize(
        &self,
        objective: &mut Objective<'_>,
        initial: &[f64],
    ) -> KnitResult<MinimizeResult> {
        self.validate()?;
        let mut evaluations = 0;
        let mut params = initial.to_vec();
        let mut value = evaluate(objective, &params, &mut evaluations)?;
        let initial_value = value;

        let mut step = self.step;
        let mut history = Vec::new();
        let mut converged = false;

        for iteration in 0..self.max_iterations {
            if step < self.tolerance {
                converged = true;
                break;
            }

            let mut moves = 0;
            for j in 0..params.len() {
                let origin = params[j];

                params[j] = origin + step;
                let plus = evaluate(objective, &params, &mut evaluations)?;
                params[j] = origin - step;
                let minus = evaluate(objective, &params, &mut evaluations)?;

                if plus < value && plus <= minus {
                    params[j] = origin + step;
                    value = plus;
                    moves += 1;
                } else if minus < value {
                    params[j] = origin - step;
                    value = minus;
                    moves += 1;
                } else {
                    params[j] = origin;
                }
            }

            debug!(
                "sweep {}: step {:.2e}, value {:.6}, {} moves",
                iteration, step, value, moves
            );
            history.push(IterationRecord {
                iteration,
                step,
                value,
                moves,
            });
            if moves == 0 {
                step *= self.decay;
            }
        }
        if !converged && step < self.tolerance {
            converged = true;
        }

        Ok(MinimizeResult {
            params,
            value,
            initial_value,
            iterations: history.len(),
            evaluations,
            converged,
            history,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quadratic_bowl() {
        let mut objective =
            |x: &[f64]| -> KnitResult<f64> { Ok((x[0] - 0.3).powi(2) + (x[1] + 0.7).powi(2)) };
        let result = CoordinateSearch::new(0.25)
            .with_tolerance(1e-6)
            .with_max_iterations(500)
            .minimize(&mut objective, &[0.0, 0.0])
            .unwrap();

        assert!(result.converged);
        assert_abs_diff_eq!(result.params[0], 0.3, epsilon = 1e-5);
        assert_abs_diff_eq!(result.params[1], -0.7, epsilon = 1e-5);
        assert!(result.improvement() > 0.5);
        assert_eq!(result.iterations, result.history.len());
    }

    #[test]
    fn test_values_never_increase() {
        let mut objective = |x: &[f64]| -> KnitResult<f64> { Ok(x[0].cos() + 0.5 * x[1].sin()) };
        let result = CoordinateSearch::default()
            .minimize(&mut objective, &[0.4, 0.1])
            .unwrap();
        let values: Vec<f64> = result.history.iter().map(|r| r.value).collect();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
        assert!(result.value <= result.initial_value);
    }

    #[test]
    fn test_iteration_cap() {
        let mut objective = |x: &[f64]| -> KnitResult<f64> { Ok(-x[0]) };
        let result = CoordinateSearch::new(1.0)
            .with_max_iterations(5)
            .minimize(&mut objective, &[0.0])
            .unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 5);
        assert_abs_diff_eq!(result.params[0], 5.0);
        // one start value plus two probes per sweep
        assert_eq!(result.evaluations, 11);
    }

    #[test]
    fn test_objective_error_propagates() {
        let mut calls = 0;
        let mut objective = |_: &[f64]| -> KnitResult<f64> {
            calls += 1;
            if calls > 2 {
                Err(KnitError::Cancelled)
            } else {
                Ok(1.0)
            }
        };
        let result = CoordinateSearch::default().minimize(&mut objective, &[0.0]);
        assert_eq!(result.unwrap_err(), KnitError::Cancelled);
    }

    #[test]
    fn test_invalid_settings() {
        let mut objective = |_: &[f64]| -> KnitResult<f64> { Ok(0.0) };
        assert!(CoordinateSearch::new(0.0)
            .minimize(&mut objective, &[0.0])
            .is_err());
        assert!(CoordinateSearch::default()
            .with_decay(1.0)
            .minimize(&mut objective, &[0.0])
            .is_err());
    }
}
