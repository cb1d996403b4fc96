//! Cut basis labels
//!
//! Gantree: L3_Cutting → CutBasis
//!
//! The identity channel on one wire is written as a signed sum of eight
//! measure-and-prepare pairs. The observable says whether the measured bit
//! enters the term as ±1 (Pauli) or is summed away (identity).

use qknit_core::constants::cutting::BASIS_COUNT;
use qknit_core::{Basis, KnitError, KnitResult, PrepState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable weighting the upstream measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Observable {
    /// Weight 1 for both outcomes
    Identity,
    /// Weight (−1)^bit
    Pauli,
}

/// One of the eight labels a cut can take in a summation term
/// Gantree: CutBasis // 절단 기저
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CutBasis {
    /// Z measurement summed away, prepare |0⟩
    I0,
    /// Z measurement summed away, prepare |1⟩
    I1,
    /// X measurement, prepare |+⟩
    XPlus,
    /// X measurement, prepare |−⟩
    XMinus,
    /// Y measurement, prepare |+i⟩
    YPlus,
    /// Y measurement, prepare |−i⟩
    YMinus,
    /// Z measurement, prepare |0⟩
    Z0,
    /// Z measurement, prepare |1⟩
    Z1,
}

impl CutBasis {
    /// All labels in digit order
    pub const ALL: [CutBasis; BASIS_COUNT] = [
        CutBasis::I0,
        CutBasis::I1,
        CutBasis::XPlus,
        CutBasis::XMinus,
        CutBasis::YPlus,
        CutBasis::YMinus,
        CutBasis::Z0,
        CutBasis::Z1,
    ];

    /// Digit of this label in a term id
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Label for digit `index`
    pub fn from_index(index: usize) -> KnitResult<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            KnitError::InternalError(format!("cut basis digit {} out of range", index))
        })
    }

    /// Short text label
    pub fn label(&self) -> &'static str {
        match self {
            CutBasis::I0 => "I0",
            CutBasis::I1 => "I1",
            CutBasis::XPlus => "X+",
            CutBasis::XMinus => "X-",
            CutBasis::YPlus => "Y+",
            CutBasis::YMinus => "Y-",
            CutBasis::Z0 => "Z0",
            CutBasis::Z1 => "Z1",
        }
    }

    /// Basis measured on the upstream stub
    pub fn measurement(&self) -> Basis {
        match self {
            CutBasis::XPlus | CutBasis::XMinus => Basis::X,
            CutBasis::YPlus | CutBasis::YMinus => Basis::Y,
            _ => Basis::Z,
        }
    }

    /// How the upstream outcome is weighted
    pub fn observable(&self) -> Observable {
        match self {
            CutBasis::I0 | CutBasis::I1 => Observable::Identity,
            _ => Observable::Pauli,
        }
    }

    /// State prepared on the downstream stub
    pub fn preparation(&self) -> PrepState {
        match self {
            CutBasis::I0 | CutBasis::Z0 => PrepState::Zero,
            CutBasis::I1 | CutBasis::Z1 => PrepState::One,
            CutBasis::XPlus => PrepState::Plus,
            CutBasis::XMinus => PrepState::Minus,
            CutBasis::YPlus => PrepState::PlusI,
            CutBasis::YMinus => PrepState::MinusI,
        }
    }

    /// Coefficient of this label
    pub fn coefficient(&self) -> f64 {
        match self {
            CutBasis::XMinus | CutBasis::YMinus | CutBasis::Z1 => -0.5,
            _ => 0.5,
        }
    }
}

impl fmt::Display for CutBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qknit_core::constants::cutting::IDENTITY_CHANNEL_NORM;

    #[test]
    fn test_digit_roundtrip() {
        for (i, label) in CutBasis::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(CutBasis::from_index(i).unwrap(), *label);
        }
        assert!(CutBasis::from_index(BASIS_COUNT).is_err());
    }

    #[test]
    fn test_coefficient_norm() {
        let norm: f64 = CutBasis::ALL.iter().map(|b| b.coefficient().abs()).sum();
        assert_relative_eq!(norm, IDENTITY_CHANNEL_NORM);
        let signed: f64 = CutBasis::ALL.iter().map(|b| b.coefficient()).sum();
        assert_relative_eq!(signed, 1.0);
    }

    #[test]
    fn test_table_rows() {
        assert_eq!(CutBasis::I1.measurement(), Basis::Z);
        assert_eq!(CutBasis::I1.observable(), Observable::Identity);
        assert_eq!(CutBasis::I1.preparation(), PrepState::One);

        assert_eq!(CutBasis::YMinus.measurement(), Basis::Y);
        assert_eq!(CutBasis::YMinus.observable(), Observable::Pauli);
        assert_eq!(CutBasis::YMinus.preparation(), PrepState::MinusI);
        assert_eq!(CutBasis::YMinus.coefficient(), -0.5);

        assert_eq!(CutBasis::Z1.coefficient(), -0.5);
        assert_eq!(CutBasis::XPlus.to_string(), "X+");
    }
}
