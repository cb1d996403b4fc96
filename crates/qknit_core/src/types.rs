//! Core types for QKNIT
//!
//! Gantree: L0_Foundation → CoreTypes
//!
//! Type aliases, measurement bases, preparation states, and the sparse
//! [`Distribution`] used for every probability table in the system.

use crate::constants::numerics;
use crate::error::{KnitError, KnitResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Qubit identifier (0-indexed)
/// Gantree: QubitId // pub type QubitId = usize
pub type QubitId = usize;

/// Rotation angle in radians
/// Gantree: Angle // pub type Angle = f64
pub type Angle = f64;

/// Measurement outcome index: bit `i` is the value measured on qubit `i`
/// Gantree: Outcome // pub type Outcome = u64
pub type Outcome = u64;

/// Measurement counts: outcome -> count
/// Gantree: Counts // pub type Counts = BTreeMap<Outcome, u64>
pub type Counts = BTreeMap<Outcome, u64>;

/// Parameter vector for variational circuits
/// Gantree: ParamVec // pub type ParamVec = Vec<f64>
pub type ParamVec = Vec<f64>;

// ============================================================================
// Outcome Formatting
// ============================================================================

/// Format an outcome as a bitstring, qubit 0 rightmost
pub fn format_outcome(outcome: Outcome, width: usize) -> String {
    format!("{:0width$b}", outcome, width = width)
}

/// Parse a bitstring (qubit 0 rightmost) into an outcome index
pub fn parse_outcome(s: &str) -> KnitResult<Outcome> {
    if s.is_empty() || s.len() > 64 || !s.chars().all(|c| c == '0' || c == '1') {
        return Err(KnitError::InvalidBitstring(s.to_string()));
    }
    Outcome::from_str_radix(s, 2).map_err(|_| KnitError::InvalidBitstring(s.to_string()))
}

// ============================================================================
// MeasurementBasis
// ============================================================================

/// Measurement basis for a single qubit
/// Gantree: Basis // X/Y/Z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Basis {
    /// X (Hadamard) basis
    X,
    /// Y basis
    Y,
    /// Z (computational) basis
    Z,
}

impl Basis {
    /// Parse from character
    pub fn from_char(c: char) -> KnitResult<Self> {
        match c.to_ascii_uppercase() {
            'X' => Ok(Basis::X),
            'Y' => Ok(Basis::Y),
            'Z' => Ok(Basis::Z),
            _ => Err(KnitError::InvalidBasis(c.to_string())),
        }
    }

    /// Convert to character
    pub fn to_char(&self) -> char {
        match self {
            Basis::X => 'X',
            Basis::Y => 'Y',
            Basis::Z => 'Z',
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

// ============================================================================
// Preparation State
// ============================================================================

/// Single-qubit state prepared on a fresh wire
/// Gantree: PrepState // 초기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrepState {
    /// |0⟩
    Zero,
    /// |1⟩
    One,
    /// |+⟩ = (|0⟩ + |1⟩)/√2
    Plus,
    /// |−⟩ = (|0⟩ − |1⟩)/√2
    Minus,
    /// |+i⟩ = (|0⟩ + i|1⟩)/√2
    PlusI,
    /// |−i⟩ = (|0⟩ − i|1⟩)/√2
    MinusI,
}

impl PrepState {
    /// Short label used in instance identifiers
    pub fn symbol(&self) -> &'static str {
        match self {
            PrepState::Zero => "0",
            PrepState::One => "1",
            PrepState::Plus => "+",
            PrepState::Minus => "-",
            PrepState::PlusI => "+i",
            PrepState::MinusI => "-i",
        }
    }
}

impl fmt::Display for PrepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}⟩", self.symbol())
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Sparse probability (or quasi-probability) table over outcomes
/// Gantree: Distribution // 확률 분포
///
/// Entries are kept in outcome order so iteration, display, and
/// serialization are deterministic. Values are not constrained: a raw
/// reconstruction may hold negative entries. Use
/// [`Distribution::validate_probabilities`] where a real distribution is
/// required.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Distribution {
    /// Number of bits per outcome
    num_bits: usize,

    /// Outcome -> value
    values: BTreeMap<Outcome, f64>,
}

impl Distribution {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create an empty table over `num_bits`-bit outcomes
    pub fn new(num_bits: usize) -> Self {
        Self {
            num_bits,
            values: BTreeMap::new(),
        }
    }

    /// Single outcome with probability 1
    pub fn delta(num_bits: usize, outcome: Outcome) -> Self {
        let mut dist = Self::new(num_bits);
        dist.values.insert(outcome, 1.0);
        dist
    }

    /// Build from (outcome, value) pairs; duplicates are summed
    pub fn from_pairs(
        num_bits: usize,
        pairs: impl IntoIterator<Item = (Outcome, f64)>,
    ) -> KnitResult<Self> {
        check_width(num_bits)?;
        let mut dist = Self::new(num_bits);
        for (outcome, value) in pairs {
            if !dist.contains_outcome(outcome) {
                return Err(KnitError::InvalidDistribution(format!(
                    "outcome {} does not fit in {} bits",
                    outcome, num_bits
                )));
            }
            dist.add(outcome, value);
        }
        Ok(dist)
    }

    /// Build from a dense vector of length 2^n; exact zeros are skipped
    pub fn from_dense(values: &[f64]) -> KnitResult<Self> {
        if values.is_empty() || !values.len().is_power_of_two() {
            return Err(KnitError::InvalidDistribution(format!(
                "dense length {} is not a power of two",
                values.len()
            )));
        }
        let num_bits = values.len().trailing_zeros() as usize;
        let mut dist = Self::new(num_bits);
        for (outcome, &value) in values.iter().enumerate() {
            if value != 0.0 {
                dist.values.insert(outcome as Outcome, value);
            }
        }
        Ok(dist)
    }

    /// Normalize measurement counts into frequencies
    pub fn from_counts(num_bits: usize, counts: &Counts) -> Self {
        let total: u64 = counts.values().sum();
        let mut dist = Self::new(num_bits);
        if total == 0 {
            return dist;
        }
        for (&outcome, &count) in counts {
            if count > 0 {
                dist.values.insert(outcome, count as f64 / total as f64);
            }
        }
        dist
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of bits per outcome
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no entries are stored
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of an outcome (0 when absent)
    pub fn get(&self, outcome: Outcome) -> f64 {
        self.values.get(&outcome).copied().unwrap_or(0.0)
    }

    /// Value of a bitstring (qubit 0 rightmost), 0 when absent or malformed
    pub fn probability(&self, bitstring: &str) -> f64 {
        parse_outcome(bitstring).map(|o| self.get(o)).unwrap_or(0.0)
    }

    /// Iterate entries in outcome order
    pub fn iter(&self) -> impl Iterator<Item = (Outcome, f64)> + '_ {
        self.values.iter().map(|(&o, &v)| (o, v))
    }

    /// Iterate stored outcomes in order
    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.values.keys().copied()
    }

    /// Whether `outcome` fits in `num_bits` bits
    pub fn contains_outcome(&self, outcome: Outcome) -> bool {
        self.num_bits >= 64 || outcome >> self.num_bits == 0
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add `value` to an outcome
    pub fn add(&mut self, outcome: Outcome, value: f64) {
        *self.values.entry(outcome).or_insert(0.0) += value;
    }

    /// Overwrite the value of an outcome
    pub fn set(&mut self, outcome: Outcome, value: f64) {
        self.values.insert(outcome, value);
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Sum of all entries
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Sum of magnitudes of negative entries
    pub fn negative_mass(&self) -> f64 {
        self.values.values().filter(|&&v| v < 0.0).map(|v| -v).sum()
    }

    /// Non-negative, finite, and summing to 1 within `tolerance`
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        self.validate_probabilities(tolerance).is_ok()
    }

    /// Require a real probability distribution
    pub fn validate_probabilities(&self, tolerance: f64) -> KnitResult<()> {
        for (&outcome, &value) in &self.values {
            if !value.is_finite() || value < -tolerance {
                return Err(KnitError::InvalidDistribution(format!(
                    "entry {} has value {}",
                    format_outcome(outcome, self.num_bits),
                    value
                )));
            }
            if !self.contains_outcome(outcome) {
                return Err(KnitError::InvalidDistribution(format!(
                    "outcome {} does not fit in {} bits",
                    outcome, self.num_bits
                )));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > tolerance {
            return Err(KnitError::InvalidDistribution(format!(
                "entries sum to {} (tolerance {})",
                total, tolerance
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Dense vector of length 2^num_bits
    pub fn to_dense(&self) -> KnitResult<Vec<f64>> {
        if self.num_bits > numerics::MAX_DENSE_QUBITS {
            return Err(KnitError::TooManyQubits {
                qubits: self.num_bits,
                max: numerics::MAX_DENSE_QUBITS,
            });
        }
        let mut dense = vec![0.0; 1usize << self.num_bits];
        for (&outcome, &value) in &self.values {
            dense[outcome as usize] = value;
        }
        Ok(dense)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (outcome, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.6}", format_outcome(outcome, self.num_bits), value)?;
        }
        write!(f, "}}")
    }
}

fn check_width(num_bits: usize) -> KnitResult<()> {
    if num_bits > numerics::MAX_QUBITS {
        return Err(KnitError::TooManyQubits {
            qubits: num_bits,
            max: numerics::MAX_QUBITS,
        });
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

    #[test]
    fn test_outcome_formatting() {
        assert_eq!(format_outcome(0b101, 4), "0101");
        assert_eq!(parse_outcome("0101").unwrap(), 5);
        assert!(parse_outcome("01x1").is_err());
        assert!(parse_outcome("").is_err());
    }

    #[test]
    fn test_from_pairs_sums_duplicates() {
        let dist = Distribution::from_pairs(2, vec![(1, 0.25), (1, 0.25), (3, 0.5)]).unwrap();
        assert_relative_eq!(dist.get(1), 0.5);
        assert_relative_eq!(dist.total(), 1.0);
        assert!(dist.is_normalized(1e-12));
    }

    #[test]
    fn test_from_pairs_rejects_wide_outcome() {
        assert!(Distribution::from_pairs(2, vec![(4, 1.0)]).is_err());
    }

    #[test]
    fn test_from_dense_roundtrip() {
        let dense = vec![0.5, 0.0, 0.0, 0.5];
        let dist = Distribution::from_dense(&dense).unwrap();
        assert_eq!(dist.num_bits(), 2);
        assert_eq!(dist.len(), 2);
        assert_eq!(dist.to_dense().unwrap(), dense);
        assert!(Distribution::from_dense(&[0.5, 0.25, 0.25]).is_err());
    }

    #[test]
    fn test_from_counts() {
        let mut counts = Counts::new();
        counts.insert(0, 300);
        counts.insert(3, 700);
        let dist = Distribution::from_counts(2, &counts);
        assert_relative_eq!(dist.probability("11"), 0.7);
        assert_relative_eq!(dist.probability("00"), 0.3);
    }

    #[test]
    fn test_negative_mass_and_validation() {
        let dist = Distribution::from_pairs(1, vec![(0, 1.2), (1, -0.2)]).unwrap();
        assert_relative_eq!(dist.negative_mass(), 0.2);
        assert!(dist.validate_probabilities(1e-9).is_err());
    }

    #[test]
    fn test_basis_parse() {
        assert_eq!(Basis::from_char('y').unwrap(), Basis::Y);
        assert!(Basis::from_char('q').is_err());
        assert_eq!(PrepState::MinusI.symbol(), "-i");
    }
}
