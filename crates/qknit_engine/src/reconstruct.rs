//! Distribution reconstruction
//!
//! Gantree: L4_Engine → DistributionReconstructor
//!
//! Each fragment contributes an effective vector per restriction of the
//! term labels to its own stubs: instance outcomes weighted by ±1 on Pauli
//! upstream stubs, stub bits summed away, output bits moved to their
//! original qubit positions. A term is its coefficient times the tensor
//! product of those vectors. The term ids are split into a few contiguous
//! ranges per worker; each range sums into one private accumulator and the
//! accumulators are merged pairwise.

use crate::dispatcher::RunControl;
use log::{debug, info, warn};
use qknit_core::constants::cutting::BASIS_COUNT;
use qknit_core::{Distribution, KnitError, KnitResult, KnitWarning, Outcome};
use qknit_cutting::{CutBasis, Fragment, InstanceKey, Observable, StubKind, TermGenerator};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Terms between deadline / cancel polls in one worker
const POLL_INTERVAL: usize = 1024;

/// Term ranges handed to each worker
const CHUNKS_PER_THREAD: usize = 4;

// ============================================================================
// Output Types
// ============================================================================

/// Raw and projected reconstruction of the uncut distribution
/// Gantree: ReconstructedDistribution // 재구성 분포
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedDistribution {
    /// Signed sum over all terms
    pub raw: Distribution,
    /// Closest probability distribution to `raw`
    pub nearest: Distribution,
}

/// Reconstruction plus its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    /// Raw and nearest distributions
    pub distribution: ReconstructedDistribution,
    /// Non-fatal conditions met on the way
    pub warnings: Vec<KnitWarning>,
    /// Terms summed
    pub terms_used: u64,
    /// Terms skipped for missing instances (partial mode only)
    pub skipped_terms: u64,
}

// ============================================================================
// Effective Vectors
// ============================================================================

/// Effective vectors of one fragment, indexed by restriction code
struct FragmentTable {
    /// Cut id of every stub, in stub order
    cuts: Vec<usize>,
    /// `None` where the instance was unavailable
    vectors: Vec<Option<Vec<(Outcome, f64)>>>,
}

impl FragmentTable {
    /// Base-8 code of the term digits restricted to this fragment's stubs
    fn code(&self, digits: &[usize]) -> usize {
        self.cuts
            .iter()
            .fold(0, |code, &cut| code * BASIS_COUNT + digits[cut])
    }
}

/// Fold one instance distribution into an effective vector
fn effective_vector(
    fragment: &Fragment,
    labels: &[CutBasis],
    dist: &Distribution,
) -> Vec<(Outcome, f64)> {
    let pauli_bits: Vec<usize> = fragment
        .stubs
        .iter()
        .zip(labels)
        .filter(|(stub, label)| {
            stub.kind == StubKind::Upstream && label.observable() == Observable::Pauli
        })
        .map(|(stub, _)| stub.local_qubit)
        .collect();
    let outputs: Vec<(usize, usize)> = fragment
        .output_wires()
        .map(|(local, wire)| (local, wire.qubit))
        .collect();

    let mut folded: BTreeMap<Outcome, f64> = BTreeMap::new();
    for (outcome, p) in dist.iter() {
        let flips = pauli_bits
            .iter()
            .filter(|&&bit| outcome >> bit & 1 == 1)
            .count();
        let sign = if flips % 2 == 1 { -1.0 } else { 1.0 };
        let mapped = outputs.iter().fold(0, |acc, &(local, qubit)| {
            acc | ((outcome >> local & 1) << qubit)
        });
        *folded.entry(mapped).or_insert(0.0) += sign * p;
    }
    folded.into_iter().filter(|(_, v)| *v != 0.0).collect()
}

// ============================================================================
// Accumulators
// ============================================================================

/// Dense or sparse running sum over outcomes
#[derive(Debug, Clone)]
enum Accumulator {
    Dense(Vec<f64>),
    Sparse(BTreeMap<Outcome, f64>),
}

impl Accumulator {
    fn new(num_qubits: usize, dense_threshold: usize) -> Self {
        if num_qubits <= dense_threshold {
            Accumulator::Dense(vec![0.0; 1usize << num_qubits])
        } else {
            Accumulator::Sparse(BTreeMap::new())
        }
    }

    fn add(&mut self, outcome: Outcome, value: f64) {
        match self {
            Accumulator::Dense(values) => values[outcome as usize] += value,
            Accumulator::Sparse(values) => *values.entry(outcome).or_insert(0.0) += value,
        }
    }

    fn merge(&mut self, other: Accumulator) {
        if let (Accumulator::Dense(mine), Accumulator::Dense(theirs)) = (&mut *self, &other) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
            return;
        }
        match other {
            Accumulator::Dense(values) => {
                for (outcome, value) in values.into_iter().enumerate() {
                    if value != 0.0 {
                        self.add(outcome as Outcome, value);
                    }
                }
            }
            Accumulator::Sparse(values) => {
                for (outcome, value) in values {
                    self.add(outcome, value);
                }
            }
        }
    }

    fn into_distribution(self, num_qubits: usize) -> KnitResult<Distribution> {
        match self {
            Accumulator::Dense(values) => Distribution::from_dense(&values),
            Accumulator::Sparse(values) => Distribution::from_pairs(num_qubits, values),
        }
    }
}

/// Partial sum over one term range
struct TermFold {
    sum: Accumulator,
    processed: u64,
    skipped: u64,
}

impl TermFold {
    fn merge(mut self, other: TermFold) -> TermFold {
        self.sum.merge(other.sum);
        self.processed += other.processed;
        self.skipped += other.skipped;
        self
    }
}

/// Base-8 digits of a term id, most significant cut first
fn term_digits(id: u64, num_cuts: usize) -> Vec<usize> {
    let mut digits = vec![0usize; num_cuts];
    let mut rest = id;
    for digit in digits.iter_mut().rev() {
        *digit = (rest % BASIS_COUNT as u64) as usize;
        rest /= BASIS_COUNT as u64;
    }
    digits
}

/// Weighted tensor product of one term; `None` when an instance is missing
fn term_product(
    tables: &[FragmentTable],
    coefficients: &[f64],
    digits: &[usize],
) -> Option<Vec<(Outcome, f64)>> {
    let coefficient: f64 = digits.iter().map(|&d| coefficients[d]).product();
    let mut product: Vec<(Outcome, f64)> = vec![(0, coefficient)];
    for table in tables {
        let vector = table.vectors[table.code(digits)].as_ref()?;
        product = product
            .iter()
            .flat_map(|&(o, v)| vector.iter().map(move |&(o2, v2)| (o | o2, v * v2)))
            .collect();
    }
    Some(product)
}

// ============================================================================
// Reconstructor
// ============================================================================

/// Rebuilds the uncut distribution from instance distributions
/// Gantree: Reconstructor // 분포 재구성기
#[derive(Debug, Clone)]
pub struct Reconstructor {
    dense_threshold: usize,
    numerical_tolerance: f64,
    threads: usize,
    allow_partial: bool,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self {
            dense_threshold: qknit_core::numerics::DEFAULT_DENSE_THRESHOLD,
            numerical_tolerance: qknit_core::numerics::DEFAULT_NUMERICAL_TOLERANCE,
            threads: 1,
            allow_partial: false,
        }
    }
}

impl Reconstructor {
    /// Create with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dense accumulator threshold
    pub fn with_dense_threshold(mut self, qubits: usize) -> Self {
        self.dense_threshold = qubits.min(qknit_core::numerics::MAX_DENSE_QUBITS);
        self
    }

    /// Set the numerical warning tolerance
    pub fn with_numerical_tolerance(mut self, tolerance: f64) -> Self {
        self.numerical_tolerance = tolerance;
        self
    }

    /// Set the worker count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Skip terms with unavailable instances instead of failing
    pub fn with_allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    /// Contiguous id ranges, a few per worker, so each worker holds a
    /// handful of accumulators
    fn chunks(&self, total: u64) -> Vec<Range<u64>> {
        let count = (self.threads * CHUNKS_PER_THREAD) as u64;
        let size = ((total + count - 1) / count).max(1);
        (0..total)
            .step_by(size as usize)
            .map(|start| start..(start + size).min(total))
            .collect()
    }

    /// Cancellation always stops the sum; the deadline only without
    /// `allow_partial`, whose instances are already settled
    fn should_stop(&self, control: &RunControl) -> bool {
        control.check_cancelled().is_err() || (!self.allow_partial && control.expired())
    }

    fn tables<F>(&self, generator: &TermGenerator<'_>, lookup: &F) -> KnitResult<Vec<FragmentTable>>
    where
        F: Fn(&InstanceKey) -> KnitResult<Arc<Distribution>>,
    {
        let mut tables = Vec::new();
        for fragment in generator.partition().fragments() {
            let cuts: Vec<usize> = fragment.stubs.iter().map(|s| s.cut_id).collect();
            let count = BASIS_COUNT.pow(cuts.len() as u32);
            let mut vectors = Vec::with_capacity(count);
            for code in 0..count {
                let mut labels = vec![CutBasis::I0; cuts.len()];
                let mut rest = code;
                for slot in labels.iter_mut().rev() {
                    *slot = CutBasis::from_index(rest % BASIS_COUNT)?;
                    rest /= BASIS_COUNT;
                }
                let key = generator.fragment_key(fragment, |cut| {
                    cuts.iter()
                        .position(|&c| c == cut)
                        .map_or(CutBasis::I0, |i| labels[i])
                });
                match lookup(&key) {
                    Ok(dist) => vectors.push(Some(effective_vector(fragment, &labels, &dist))),
                    Err(err) if self.allow_partial => {
                        debug!("instance {} unavailable: {}", key, err);
                        vectors.push(None);
                    }
                    Err(err) => return Err(err),
                }
            }
            tables.push(FragmentTable { cuts, vectors });
        }
        Ok(tables)
    }

    /// Sum every term of `generator` using instance distributions from
    /// `lookup`
    /// Gantree: reconstruct(generator, lookup, control) -> Result<Reconstruction> // 재구성
    pub fn reconstruct<F>(
        &self,
        generator: &TermGenerator<'_>,
        lookup: F,
        control: &RunControl,
    ) -> KnitResult<Reconstruction>
    where
        F: Fn(&InstanceKey) -> KnitResult<Arc<Distribution>>,
    {
        let partition = generator.partition();
        let n = partition.num_qubits();
        let num_cuts = partition.num_cuts();
        let total = generator.total_terms();
        let tables = self.tables(generator, &lookup)?;
        control.check_cancelled()?;

        let coefficients: Vec<f64> = CutBasis::ALL.iter().map(CutBasis::coefficient).collect();
        let stop = AtomicBool::new(false);
        let chunks = self.chunks(total);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| KnitError::InternalError(format!("thread pool: {}", err)))?;

        let folded = pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let mut fold = TermFold {
                        sum: Accumulator::new(n, self.dense_threshold),
                        processed: 0,
                        skipped: 0,
                    };
                    for (i, id) in range.enumerate() {
                        if i % POLL_INTERVAL == 0 && self.should_stop(control) {
                            stop.store(true, Ordering::Relaxed);
                        }
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        fold.processed += 1;
                        let digits = term_digits(id, num_cuts);
                        match term_product(&tables, &coefficients, &digits) {
                            Some(product) => {
                                for (outcome, value) in product {
                                    fold.sum.add(outcome, value);
                                }
                            }
                            None => fold.skipped += 1,
                        }
                    }
                    fold
                })
                .reduce_with(TermFold::merge)
        });

        let (sum, processed, skipped) = match folded {
            Some(fold) => (fold.sum, fold.processed, fold.skipped),
            None => (Accumulator::new(n, self.dense_threshold), 0, 0),
        };

        control.check_cancelled()?;
        if processed < total {
            return Err(KnitError::PartialResult {
                completed: processed as usize,
                pending: (total - processed) as usize,
            });
        }

        let raw = sum.into_distribution(n)?;
        let nearest = nearest(&raw);
        let mut warnings = Vec::new();

        let negative_mass = raw.negative_mass();
        let sum_deviation = (raw.total() - 1.0).abs();
        if negative_mass > self.numerical_tolerance || sum_deviation > self.numerical_tolerance {
            let warning = KnitWarning::ReconstructionNumerical {
                negative_mass,
                sum_deviation,
                tolerance: self.numerical_tolerance,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
        if skipped > 0 {
            let warning = KnitWarning::PartialReconstruction {
                skipped_terms: skipped,
                total_terms: total,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
        info!(
            "reconstructed {} qubits from {} terms ({} skipped)",
            n,
            total - skipped,
            skipped
        );

        Ok(Reconstruction {
            distribution: ReconstructedDistribution { raw, nearest },
            warnings,
            terms_used: total - skipped,
            skipped_terms: skipped,
        })
    }
}

// ============================================================================
// Nearest Distribution
// ============================================================================

/// Clip negatives and renormalise; uniform over the raw support when
/// nothing positive is left, outcome 0 when the support is empty
/// Gantree: nearest(raw) -> Distribution // 최근접 분포
pub fn nearest(raw: &Distribution) -> Distribution {
    let n = raw.num_bits();
    let positive: Vec<(Outcome, f64)> = raw
        .iter()
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .collect();
    let mass: f64 = positive.iter().map(|(_, v)| v).sum();

    let mut dist = Distribution::new(n);
    if mass > 0.0 && mass.is_finite() {
        for (outcome, value) in positive {
            dist.set(outcome, value / mass);
        }
    } else if !raw.is_empty() {
        let share = 1.0 / raw.len() as f64;
        for outcome in raw.outcomes() {
            dist.set(outcome, share);
        }
    } else {
        dist = Distribution::delta(n, 0);
    }
    dist
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InstanceCache;
    use crate::dispatcher::ExecutionDispatcher;
    use approx::assert_relative_eq;
    use qknit_backend::{ExactEvaluator, ShotBudget, SimulatorBackend};
    use qknit_core::{Circuit, CircuitBuilder};
    use qknit_cutting::{from_gate_vertices, from_qubit_groups, Partition, WireGraph};

    fn reconstruct_exact(circuit: &Circuit, partition: &Partition) -> Reconstruction {
        let backend = SimulatorBackend::new();
        let generator = TermGenerator::new(partition).unwrap();
        let cache = InstanceCache::new();
        ExecutionDispatcher::new(&backend, ShotBudget::Exact)
            .dispatch(&generator, &cache, &RunControl::default())
            .unwrap();
        let reconstruction = Reconstructor::new()
            .with_threads(2)
            .reconstruct(&generator, |key| cache.wait(key), &RunControl::default())
            .unwrap();
        assert_eq!(reconstruction.distribution.raw.num_bits(), circuit.num_qubits());
        reconstruction
    }

    fn assert_matches_exact(circuit: &Circuit, raw: &Distribution) {
        let exact = SimulatorBackend::new().exact_distribution(circuit).unwrap();
        for outcome in 0..(1u64 << circuit.num_qubits()) {
            assert!(
                (raw.get(outcome) - exact.get(outcome)).abs() < 1e-9,
                "outcome {}: {} vs {}",
                outcome,
                raw.get(outcome),
                exact.get(outcome)
            );
        }
    }

    #[test]
    fn test_single_cut_exact() {
        let circuit = CircuitBuilder::new(3)
            .h(0)
            .ry(1, 0.7)
            .cx(0, 1)
            .rx(1, 1.1)
            .cx(1, 2)
            .t(2)
            .h(2)
            .build()
            .unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0], vec![1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        assert_eq!(partition.num_cuts(), 1);

        let reconstruction = reconstruct_exact(&circuit, &partition);
        assert_matches_exact(&circuit, &reconstruction.distribution.raw);
        assert!(reconstruction.warnings.is_empty());
        assert_eq!(reconstruction.terms_used, 8);
    }

    #[test]
    fn test_wire_cut_twice_exact() {
        let circuit = CircuitBuilder::new(3)
            .h(0)
            .h(1)
            .cx(0, 1)
            .ry(1, 0.4)
            .cx(1, 2)
            .rx(1, 0.9)
            .cx(0, 1)
            .build()
            .unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0, 2], vec![1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        assert_eq!(partition.num_cuts(), 2);

        let reconstruction = reconstruct_exact(&circuit, &partition);
        assert_matches_exact(&circuit, &reconstruction.distribution.raw);
        assert_eq!(reconstruction.terms_used, 64);
    }

    #[test]
    fn test_sparse_accumulator_agrees() {
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0], vec![1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        let generator = TermGenerator::new(&partition).unwrap();
        let cache = InstanceCache::new();
        let backend = SimulatorBackend::new();
        ExecutionDispatcher::new(&backend, ShotBudget::Exact)
            .dispatch(&generator, &cache, &RunControl::default())
            .unwrap();

        let sparse = Reconstructor::new()
            .with_dense_threshold(0)
            .reconstruct(&generator, |key| cache.wait(key), &RunControl::default())
            .unwrap();
        assert_relative_eq!(sparse.distribution.raw.get(0b000), 0.5, epsilon = 1e-12);
        assert_relative_eq!(sparse.distribution.raw.get(0b111), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_instance_fails_or_skips() {
        let circuit = CircuitBuilder::new(2).h(0).cx(0, 1).x(1).cx(0, 1).build().unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0], vec![1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        let generator = TermGenerator::new(&partition).unwrap();
        let backend = SimulatorBackend::new();

        let lookup = |key: &InstanceKey| -> KnitResult<Arc<Distribution>> {
            if key.to_string().contains('Y') {
                return Err(KnitError::BackendError("no Y today".to_string()));
            }
            let instance = generator.build_instance(key)?;
            Ok(Arc::new(backend.exact_distribution(&instance.circuit)?))
        };

        let strict = Reconstructor::new().reconstruct(&generator, lookup, &RunControl::default());
        assert!(matches!(strict, Err(KnitError::BackendError(_))));

        let partial = Reconstructor::new()
            .with_allow_partial(true)
            .reconstruct(&generator, lookup, &RunControl::default())
            .unwrap();
        assert!(partial.skipped_terms > 0);
        assert!(partial
            .warnings
            .iter()
            .any(|w| matches!(w, KnitWarning::PartialReconstruction { .. })));
    }

    #[test]
    fn test_cancelled_reconstruction() {
        let circuit = CircuitBuilder::new(2).h(0).cx(0, 1).build().unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_qubit_groups(&graph, &[vec![0, 1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        let generator = TermGenerator::new(&partition).unwrap();
        let backend = SimulatorBackend::new();
        let cancel = crate::dispatcher::CancelHandle::new();
        cancel.cancel();

        let result = Reconstructor::new().reconstruct(
            &generator,
            |key| Ok(Arc::new(backend.exact_distribution(&generator.build_instance(key)?.circuit)?)),
            &RunControl::new(None, cancel),
        );
        assert_eq!(result.unwrap_err(), KnitError::Cancelled);
    }

    #[test]
    fn test_expired_deadline_stops_only_strict_sum() {
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
        let graph = WireGraph::from_circuit(&circuit);
        let solution = from_gate_vertices(&graph, &[vec![0], vec![1]]).unwrap();
        let partition = Partition::build(&circuit, &graph, &solution).unwrap();
        let generator = TermGenerator::new(&partition).unwrap();
        let cache = InstanceCache::new();
        let backend = SimulatorBackend::new();
        ExecutionDispatcher::new(&backend, ShotBudget::Exact)
            .dispatch(&generator, &cache, &RunControl::default())
            .unwrap();
        let expired = RunControl::new(
            Some(std::time::Duration::ZERO),
            crate::dispatcher::CancelHandle::new(),
        );

        let strict = Reconstructor::new().reconstruct(&generator, |key| cache.wait(key), &expired);
        assert!(matches!(strict, Err(KnitError::PartialResult { completed: 0, .. })));

        let partial = Reconstructor::new()
            .with_allow_partial(true)
            .reconstruct(&generator, |key| cache.wait(key), &expired)
            .unwrap();
        assert_eq!(partial.terms_used, 8);
        assert_matches_exact(&circuit, &partial.distribution.raw);
    }

    #[test]
    fn test_chunks_cover_every_term() {
        let reconstructor = Reconstructor::new().with_threads(3);
        for total in [0u64, 1, 8, 13, 64, 4096] {
            let chunks = reconstructor.chunks(total);
            assert!(chunks.len() <= 3 * CHUNKS_PER_THREAD);
            let mut next = 0;
            for range in &chunks {
                assert_eq!(range.start, next);
                next = range.end;
            }
            assert_eq!(next, total);
        }
    }

    #[test]
    fn test_nearest_clips_and_renormalises() {
        let raw = Distribution::from_pairs(2, vec![(0, 0.6), (1, -0.1), (3, 0.6)]).unwrap();
        let near = nearest(&raw);
        assert_relative_eq!(near.get(0), 0.5);
        assert_eq!(near.get(1), 0.0);
        assert_relative_eq!(near.get(3), 0.5);
        assert!(near.is_normalized(1e-12));
    }

    #[test]
    fn test_nearest_fallbacks() {
        let negative = Distribution::from_pairs(2, vec![(1, -0.2), (2, -0.3)]).unwrap();
        let near = nearest(&negative);
        assert_relative_eq!(near.get(1), 0.5);
        assert_relative_eq!(near.get(2), 0.5);

        let empty = Distribution::new(3);
        assert_eq!(nearest(&empty), Distribution::delta(3, 0));
    }
}
