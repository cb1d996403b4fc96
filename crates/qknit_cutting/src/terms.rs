//! Summation terms and subcircuit instances
//!
//! Gantree: L3_Cutting → SummationTermGenerator
//!
//! A term picks one [`CutBasis`] label per cut. Term ids count through the
//! labels in base 8 with cut 0 as the most significant digit, so the stream
//! is lexicographic, restartable, and randomly addressable.

use crate::basis::CutBasis;
use crate::partition::{Fragment, Partition, StubKind};
use qknit_core::constants::cutting::{self, BASIS_COUNT, MAX_CUTS};
use qknit_core::{Basis, Circuit, Gate, KnitError, KnitResult, PrepState};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Types
// ============================================================================

/// One weighted choice of labels across all cuts
/// Gantree: SummationTerm // 합산 항
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummationTerm {
    /// Position in the term stream
    pub id: u64,
    /// Label per cut, indexed by cut id
    pub labels: Vec<CutBasis>,
    /// Product of the per-cut coefficients
    pub coefficient: f64,
}

/// Physical operator inserted at one stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StubSetting {
    /// Rotate then measure (upstream stub)
    Measure(Basis),
    /// Prepare from |0⟩ (downstream stub)
    Prepare(PrepState),
}

impl fmt::Display for StubSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubSetting::Measure(basis) => write!(f, "{}", basis),
            StubSetting::Prepare(state) => write!(f, "{}", state.symbol()),
        }
    }
}

/// Identity of a subcircuit instance: fragment plus one setting per stub
/// Gantree: InstanceKey // 인스턴스 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    /// Fragment id
    pub fragment: usize,
    /// Settings in the fragment's stub order
    pub settings: Vec<StubSetting>,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings: Vec<String> = self.settings.iter().map(|s| s.to_string()).collect();
        write!(f, "f{}[{}]", self.fragment, settings.join(","))
    }
}

/// Executable fragment circuit for one key
/// Gantree: SubcircuitInstance // 서브회로 인스턴스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcircuitInstance {
    /// Identity
    pub key: InstanceKey,
    /// Preparations, fragment gates, measurement rotations
    pub circuit: Circuit,
}

// ============================================================================
// Generator
// ============================================================================

/// Lazy, restartable stream of summation terms over a partition
/// Gantree: TermGenerator // 항 생성기
#[derive(Debug, Clone)]
pub struct TermGenerator<'a> {
    partition: &'a Partition,
    total: u64,
    position: u64,
}

impl<'a> TermGenerator<'a> {
    /// Generator positioned at term 0
    pub fn new(partition: &'a Partition) -> KnitResult<Self> {
        let cuts = partition.num_cuts();
        if cuts > MAX_CUTS {
            return Err(KnitError::TooManyCuts {
                cuts,
                max: MAX_CUTS,
            });
        }
        Ok(Self {
            partition,
            total: cutting::term_count(cuts),
            position: 0,
        })
    }

    /// Partition the terms range over
    pub fn partition(&self) -> &'a Partition {
        self.partition
    }

    /// Number of terms (8^cuts)
    pub fn total_terms(&self) -> u64 {
        self.total
    }

    /// Id of the next term `next()` yields
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the cursor to `id` (`total_terms()` means exhausted)
    pub fn seek(&mut self, id: u64) -> KnitResult<()> {
        if id > self.total {
            return Err(KnitError::InternalError(format!(
                "seek to term {} past the end ({} terms)",
                id, self.total
            )));
        }
        self.position = id;
        Ok(())
    }

    /// Restart from term 0
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Term with id `id`
    /// Gantree: term(id) -> Result<SummationTerm> // 임의 접근
    pub fn term(&self, id: u64) -> KnitResult<SummationTerm> {
        if id >= self.total {
            return Err(KnitError::InternalError(format!(
                "term {} out of range ({} terms)",
                id, self.total
            )));
        }
        Ok(self.decode(id))
    }

    fn decode(&self, id: u64) -> SummationTerm {
        let cuts = self.partition.num_cuts();
        let mut labels = vec![CutBasis::I0; cuts];
        let mut rest = id;
        for slot in labels.iter_mut().rev() {
            *slot = CutBasis::ALL[(rest % BASIS_COUNT as u64) as usize];
            rest /= BASIS_COUNT as u64;
        }
        let coefficient = labels.iter().map(CutBasis::coefficient).product();
        SummationTerm {
            id,
            labels,
            coefficient,
        }
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Key of `fragment` when cut `c` carries `label_of(c)`
    pub fn fragment_key(
        &self,
        fragment: &Fragment,
        label_of: impl Fn(usize) -> CutBasis,
    ) -> InstanceKey {
        let settings = fragment
            .stubs
            .iter()
            .map(|stub| {
                let label = label_of(stub.cut_id);
                match stub.kind {
                    StubKind::Upstream => StubSetting::Measure(label.measurement()),
                    StubKind::Downstream => StubSetting::Prepare(label.preparation()),
                }
            })
            .collect();
        InstanceKey {
            fragment: fragment.id,
            settings,
        }
    }

    /// One key per fragment for `term`
    /// Gantree: instance_keys(term) -> Vec<InstanceKey> // 인스턴스 식별
    pub fn instance_keys(&self, term: &SummationTerm) -> Vec<InstanceKey> {
        self.partition
            .fragments()
            .iter()
            .map(|fragment| self.fragment_key(fragment, |cut| term.labels[cut]))
            .collect()
    }

    /// Build the circuit for `key`
    /// Gantree: build_instance(key) -> Result<SubcircuitInstance> // 인스턴스 생성
    pub fn build_instance(&self, key: &InstanceKey) -> KnitResult<SubcircuitInstance> {
        let fragment = self.partition.fragments().get(key.fragment).ok_or_else(|| {
            KnitError::InternalError(format!("instance {} names a missing fragment", key))
        })?;
        if key.settings.len() != fragment.stubs.len() {
            return Err(KnitError::InternalError(format!(
                "instance {} has {} settings for {} stubs",
                key,
                key.settings.len(),
                fragment.stubs.len()
            )));
        }

        let mut gates = Vec::new();
        for (stub, setting) in fragment.stubs.iter().zip(&key.settings) {
            match (stub.kind, setting) {
                (StubKind::Downstream, StubSetting::Prepare(state)) => {
                    gates.extend(Gate::preparation(stub.local_qubit, *state))
                }
                (StubKind::Upstream, StubSetting::Measure(_)) => {}
                _ => {
                    return Err(KnitError::InternalError(format!(
                        "instance {} mismatches stub kind of cut {}",
                        key, stub.cut_id
                    )))
                }
            }
        }
        gates.extend(fragment.circuit.gates().iter().cloned());
        for (stub, setting) in fragment.stubs.iter().zip(&key.settings) {
            if let StubSetting::Measure(basis) = setting {
                gates.extend(Gate::basis_transform(stub.local_qubit, *basis));
            }
        }

        let mut circuit = Circuit::from_gates(fragment.width(), gates)?;
        circuit.set_name(key.to_string());
        Ok(SubcircuitInstance {
            key: key.clone(),
            circuit,
        })
    }
}

impl Iterator for TermGenerator<'_> {
    type Item = SummationTerm;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let term = self.decode(self.position);
        self.position += 1;
        Some(term)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.position) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TermGenerator<'_> {}

// ============================================================================
// Tests
// ============================================================================
