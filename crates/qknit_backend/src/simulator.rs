//! State-vector simulator for QKNIT
//!
//! Gantree: L2_Backend → SimulatorBackend
//!
//! Noiseless reference executor. Exact budgets return |amplitude|²;
//! sampled budgets draw shots from that distribution with a ChaCha stream
//! derived from the backend seed and the circuit text, so every fragment
//! instance is reproducible no matter which worker runs it.

use crate::execution::{ExactEvaluator, Executor, ShotBudget};
use log::trace;
use num_complex::Complex64;
use qknit_core::constants::numerics;
use qknit_core::{Circuit, Counts, Distribution, Gate, KnitError, KnitResult};
use rand::distributions::{Distribution as _, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::DefaultHasher;
use std::f64::consts::FRAC_1_SQRT_2;
use std::hash::{Hash, Hasher};

/// Default width limit for the simulator
pub const DEFAULT_MAX_QUBITS: usize = 24;

/// 2×2 unitary, row major
type Matrix2 = [[Complex64; 2]; 2];

/// Noiseless state-vector simulator
/// Gantree: SimulatorBackend // 시뮬레이터 구현
#[derive(Debug, Clone)]
pub struct SimulatorBackend {
    /// Backend name
    name: String,

    /// Widest accepted circuit
    max_qubits: usize,

    /// Base seed for sampling; `None` draws from OS entropy
    seed: Option<u64>,
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorBackend {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a simulator with the default width limit
    pub fn new() -> Self {
        Self {
            name: "qknit_statevector".to_string(),
            max_qubits: DEFAULT_MAX_QUBITS,
            seed: None,
        }
    }

    /// Set seed for reproducible sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set backend name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the width limit (capped at the dense limit)
    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits.min(numerics::MAX_DENSE_QUBITS);
        self
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Final state vector of `circuit` started from |0…0⟩
    /// Gantree: state_vector(circuit) -> Result<Vec<Complex64>> // 상태 벡터
    pub fn state_vector(&self, circuit: &Circuit) -> KnitResult<Vec<Complex64>> {
        let n = circuit.num_qubits();
        if n > self.max_qubits {
            return Err(KnitError::TooManyQubits {
                qubits: n,
                max: self.max_qubits,
            });
        }
        let mut state = vec![Complex64::new(0.0, 0.0); 1usize << n];
        state[0] = Complex64::new(1.0, 0.0);
        for gate in circuit.gates() {
            apply_gate(&mut state, gate)?;
        }
        Ok(state)
    }

    /// Exact outcome probabilities
    pub fn probabilities(&self, circuit: &Circuit) -> KnitResult<Distribution> {
        let state = self.state_vector(circuit)?;
        let mut dist = Distribution::new(circuit.num_qubits());
        for (outcome, amp) in state.iter().enumerate() {
            let p = amp.norm_sqr();
            if p > 0.0 {
                dist.set(outcome as u64, p);
            }
        }
        Ok(dist)
    }

    /// Draw `shots` samples from the exact distribution
    /// Gantree: sample(circuit, shots) -> Result<Counts> // 샘플링
    pub fn sample(&self, circuit: &Circuit, shots: u64) -> KnitResult<Counts> {
        let exact = self.probabilities(circuit)?;
        let outcomes: Vec<u64> = exact.outcomes().collect();
        let weights: Vec<f64> = exact.iter().map(|(_, p)| p).collect();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| KnitError::BackendError(format!("cannot sample: {}", e)))?;

        let mut rng = self.rng_for(circuit);
        let mut counts = Counts::new();
        for _ in 0..shots {
            *counts.entry(outcomes[index.sample(&mut rng)]).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn rng_for(&self, circuit: &Circuit) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                circuit.to_qasm().hash(&mut hasher);
                ChaCha8Rng::seed_from_u64(seed ^ hasher.finish())
            }
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

impl Executor for SimulatorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_qubits(&self) -> usize {
        self.max_qubits
    }

    fn execute(&self, circuit: &Circuit, budget: ShotBudget) -> KnitResult<Distribution> {
        trace!(
            "{}: executing {} qubits / {} gates ({})",
            self.name,
            circuit.num_qubits(),
            circuit.gate_count(),
            budget
        );
        match budget {
            ShotBudget::Exact => self.probabilities(circuit),
            ShotBudget::Shots(0) => Err(KnitError::BackendError(
                "shot budget must be positive".into(),
            )),
            ShotBudget::Shots(shots) => {
                let counts = self.sample(circuit, shots)?;
                Ok(Distribution::from_counts(circuit.num_qubits(), &counts))
            }
        }
    }
}

impl ExactEvaluator for SimulatorBackend {
    fn exact_distribution(&self, circuit: &Circuit) -> KnitResult<Distribution> {
        self.probabilities(circuit)
    }
}

// ============================================================================
// Gate Application
// ============================================================================

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Single-qubit unitary of `gate`, `None` for multi-qubit gates
fn single_qubit_matrix(gate: &Gate) -> Option<Matrix2> {
    let zero = c(0.0, 0.0);
    let one = c(1.0, 0.0);
    let m = match gate {
        Gate::H(_) => [
            [c(FRAC_1_SQRT_2, 0.0), c(FRAC_1_SQRT_2, 0.0)],
            [c(FRAC_1_SQRT_2, 0.0), c(-FRAC_1_SQRT_2, 0.0)],
        ],
        Gate::X(_) => [[zero, one], [one, zero]],
        Gate::Y(_) => [[zero, c(0.0, -1.0)], [c(0.0, 1.0), zero]],
        Gate::Z(_) => [[one, zero], [zero, c(-1.0, 0.0)]],
        Gate::S(_) => [[one, zero], [zero, c(0.0, 1.0)]],
        Gate::Sdg(_) => [[one, zero], [zero, c(0.0, -1.0)]],
        Gate::T(_) => [[one, zero], [zero, Complex64::from_polar(1.0, std::f64::consts::FRAC_PI_4)]],
        Gate::Tdg(_) => [[one, zero], [zero, Complex64::from_polar(1.0, -std::f64::consts::FRAC_PI_4)]],
        Gate::Sx(_) => [[c(0.5, 0.5), c(0.5, -0.5)], [c(0.5, -0.5), c(0.5, 0.5)]],
        Gate::Sxdg(_) => [[c(0.5, -0.5), c(0.5, 0.5)], [c(0.5, 0.5), c(0.5, -0.5)]],
        Gate::Id(_) => [[one, zero], [zero, one]],
        Gate::Rx(_, a) => rx(*a),
        Gate::Ry(_, a) => ry(*a),
        Gate::Rz(_, a) => rz(*a),
        Gate::U(_, theta, phi, lambda) => {
            let (cos, sin) = ((theta / 2.0).cos(), (theta / 2.0).sin());
            [
                [c(cos, 0.0), -Complex64::from_polar(sin, *lambda)],
                [
                    Complex64::from_polar(sin, *phi),
                    Complex64::from_polar(cos, phi + lambda),
                ],
            ]
        }
        Gate::P(_, lambda) => [[one, zero], [zero, Complex64::from_polar(1.0, *lambda)]],
        _ => return None,
    };
    Some(m)
}

fn rx(angle: f64) -> Matrix2 {
    let (cos, sin) = ((angle / 2.0).cos(), (angle / 2.0).sin());
    [[c(cos, 0.0), c(0.0, -sin)], [c(0.0, -sin), c(cos, 0.0)]]
}

fn ry(angle: f64) -> Matrix2 {
    let (cos, sin) = ((angle / 2.0).cos(), (angle / 2.0).sin());
    [[c(cos, 0.0), c(-sin, 0.0)], [c(sin, 0.0), c(cos, 0.0)]]
}

fn rz(angle: f64) -> Matrix2 {
    [
        [Complex64::from_polar(1.0, -angle / 2.0), c(0.0, 0.0)],
        [c(0.0, 0.0), Complex64::from_polar(1.0, angle / 2.0)],
    ]
}

/// Apply `m` to `target` on every basis pair whose `controls` bits are all set
fn apply_controlled(state: &mut [Complex64], controls: usize, target: usize, m: &Matrix2) {
    let tmask = 1usize << target;
    for i in 0..state.len() {
        if i & tmask == 0 && i & controls == controls {
            let j = i | tmask;
            let (a, b) = (state[i], state[j]);
            state[i] = m[0][0] * a + m[0][1] * b;
            state[j] = m[1][0] * a + m[1][1] * b;
        }
    }
}

/// Exchange `a` and `b` on basis states whose `controls` bits are all set
fn apply_controlled_swap(state: &mut [Complex64], controls: usize, a: usize, b: usize) {
    let (amask, bmask) = (1usize << a, 1usize << b);
    for i in 0..state.len() {
        if i & controls == controls && i & amask != 0 && i & bmask == 0 {
            state.swap(i, i ^ amask ^ bmask);
        }
    }
}

fn apply_gate(state: &mut [Complex64], gate: &Gate) -> KnitResult<()> {
    if let Some(m) = single_qubit_matrix(gate) {
        let q = gate.qubits()[0];
        apply_controlled(state, 0, q, &m);
        return Ok(());
    }
    let x = [[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]];
    match gate {
        Gate::Cnot(ctl, t) => apply_controlled(state, 1 << ctl, *t, &x),
        Gate::Cy(ctl, t) => {
            let y = [[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]];
            apply_controlled(state, 1 << ctl, *t, &y)
        }
        Gate::Cz(ctl, t) => {
            let mask = (1usize << ctl) | (1usize << t);
            for (i, amp) in state.iter_mut().enumerate() {
                if i & mask == mask {
                    *amp = -*amp;
                }
            }
        }
        Gate::Crx(ctl, t, a) => apply_controlled(state, 1 << ctl, *t, &rx(*a)),
        Gate::Cry(ctl, t, a) => apply_controlled(state, 1 << ctl, *t, &ry(*a)),
        Gate::Crz(ctl, t, a) => apply_controlled(state, 1 << ctl, *t, &rz(*a)),
        Gate::Swap(a, b) => apply_controlled_swap(state, 0, *a, *b),
        Gate::Ccx(c1, c2, t) => apply_controlled(state, (1 << c1) | (1 << c2), *t, &x),
        Gate::Cswap(ctl, a, b) => apply_controlled_swap(state, 1 << ctl, *a, *b),
        other => return Err(KnitError::UnsupportedGate(other.name().to_string())),
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qknit_core::CircuitBuilder;
    use std::f64::consts::PI;

    fn exact(circuit: &Circuit) -> Distribution {
        SimulatorBackend::new().probabilities(circuit).unwrap()
    }

    #[test]
    fn test_bell_state() {
        let circuit = CircuitBuilder::new(2).h(0).cx(0, 1).build().unwrap();
        let dist = exact(&circuit);
        assert_relative_eq!(dist.probability("00"), 0.5, epsilon = 1e-12);
        assert_relative_eq!(dist.probability("11"), 0.5, epsilon = 1e-12);
        assert_relative_eq!(dist.probability("01"), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qubit_order() {
        // bit i = qubit i, qubit 0 rightmost
        let circuit = CircuitBuilder::new(3).x(0).build().unwrap();
        let dist = exact(&circuit);
        assert_relative_eq!(dist.get(1), 1.0);
        assert_relative_eq!(dist.probability("001"), 1.0);
    }

    #[test]
    fn test_rotation_gates() {
        for circuit in [
            CircuitBuilder::new(1).rx(0, PI).build().unwrap(),
            CircuitBuilder::new(1).ry(0, PI).build().unwrap(),
            CircuitBuilder::new(1).h(0).rz(0, PI).h(0).build().unwrap(),
            CircuitBuilder::new(1).sx(0).sx(0).build().unwrap(),
            CircuitBuilder::new(1).u(0, PI, 0.0, PI).build().unwrap(),
        ] {
            assert_relative_eq!(exact(&circuit).get(1), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_controlled_gates() {
        let toffoli = CircuitBuilder::new(3).x(0).x(1).ccx(0, 1, 2).build().unwrap();
        assert_relative_eq!(exact(&toffoli).get(0b111), 1.0, epsilon = 1e-12);

        let fredkin = CircuitBuilder::new(3).x(0).x(1).cswap(0, 1, 2).build().unwrap();
        assert_relative_eq!(exact(&fredkin).get(0b101), 1.0, epsilon = 1e-12);

        let cry = CircuitBuilder::new(2).x(0).cry(0, 1, PI).build().unwrap();
        assert_relative_eq!(exact(&cry).get(0b11), 1.0, epsilon = 1e-12);

        let cz = CircuitBuilder::new(2).h(0).h(1).cz(0, 1).h(1).build().unwrap();
        assert_relative_eq!(exact(&cz).probability("11"), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_preparation_states() {
        // Y-basis rotation after |+i⟩ preparation measures 0
        let mut circuit = Circuit::new(1);
        circuit
            .add_gates(Gate::preparation(0, qknit_core::PrepState::PlusI))
            .unwrap();
        circuit
            .add_gates(Gate::basis_transform(0, qknit_core::Basis::Y))
            .unwrap();
        assert_relative_eq!(exact(&circuit).get(0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_opaque_gate_rejected() {
        let circuit = CircuitBuilder::new(2)
            .opaque("rzz", vec![0, 1], vec![0.3])
            .build()
            .unwrap();
        assert!(matches!(
            SimulatorBackend::new().execute(&circuit, ShotBudget::Exact),
            Err(KnitError::UnsupportedGate(_))
        ));
    }

    #[test]
    fn test_qubit_limit() {
        let backend = SimulatorBackend::new().with_max_qubits(3);
        let circuit = CircuitBuilder::new(5).build().unwrap();
        assert!(matches!(
            backend.execute(&circuit, ShotBudget::Exact),
            Err(KnitError::TooManyQubits { qubits: 5, max: 3 })
        ));
    }

    #[test]
    fn test_sampling_reproducible() {
        let backend = SimulatorBackend::new().with_seed(42);
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();

        let a = backend.execute(&circuit, ShotBudget::Shots(2000)).unwrap();
        let b = backend.execute(&circuit, ShotBudget::Shots(2000)).unwrap();
        assert_eq!(a, b);
        assert!(a.is_normalized(1e-9));
        assert!((a.probability("111") - 0.5).abs() < 0.05);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_zero_shots_rejected() {
        let circuit = CircuitBuilder::new(1).h(0).build().unwrap();
        assert!(SimulatorBackend::new()
            .execute(&circuit, ShotBudget::Shots(0))
            .is_err());
    }
}
