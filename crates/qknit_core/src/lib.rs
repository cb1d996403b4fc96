//! # QKNIT Core
//!
//! Circuits, gates, distributions, and error types shared by every QKNIT
//! crate.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qknit_core // L0+L1: Foundation + Circuit (완료)
//!     L0_Foundation // 기반 타입/상수/에러 (완료)
//!         CoreTypes // Outcome, Basis, PrepState, Distribution (완료)
//!         Constants // 수치/절단/실행 상수 (완료)
//!         Errors // KnitError, KnitWarning (완료)
//!     L1_Circuit // 회로 구조 (완료)
//!         Gate // 게이트 enum (완료)
//!         Circuit // 회로 구조체 (완료)
//!         CircuitBuilder // 빌더 패턴 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qknit_core::prelude::*;
//!
//! let circuit = CircuitBuilder::new(3)
//!     .h(0)
//!     .cx(0, 1)
//!     .cx(1, 2)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(circuit.count_multi(), 2);
//! println!("{}", circuit.to_qasm());
//! ```
//!
//! ## Distributions
//!
//! ```rust
//! use qknit_core::prelude::*;
//!
//! let dist = Distribution::from_pairs(2, vec![(0b00, 0.5), (0b11, 0.5)]).unwrap();
//! assert_eq!(dist.probability("11"), 0.5);
//! assert!(dist.is_normalized(1e-12));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Core types (Gantree: L0_Foundation → CoreTypes)
pub mod types;

/// Constants (Gantree: L0_Foundation → Constants)
pub mod constants;

/// Error types (Gantree: L0_Foundation → Errors)
pub mod error;

/// Quantum gates (Gantree: L1_Circuit → Gate)
pub mod gate;

/// Circuit structure (Gantree: L1_Circuit → Circuit)
pub mod circuit;

/// Circuit builder (Gantree: L1_Circuit → CircuitBuilder)
pub mod builder;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::CircuitBuilder;
pub use circuit::Circuit;
pub use constants::{cutting, execution, numerics};
pub use error::{KnitError, KnitResult, KnitWarning};
pub use gate::Gate;
pub use types::{
    format_outcome, parse_outcome, Angle, Basis, Counts, Distribution, Outcome, ParamVec,
    PrepState, QubitId,
};

// ============================================================================
// Prelude
// ============================================================================

pub mod prelude {
    //! Convenient imports for common use cases
    //!
    //! ```rust
    //! use qknit_core::prelude::*;
    //! ```

    pub use crate::builder::CircuitBuilder;
    pub use crate::circuit::Circuit;
    pub use crate::constants::{cutting, execution, numerics};
    pub use crate::error::{KnitError, KnitResult, KnitWarning};
    pub use crate::gate::Gate;
    pub use crate::types::{
        format_outcome, parse_outcome, Angle, Basis, Counts, Distribution, Outcome, ParamVec,
        PrepState, QubitId,
    };
}

// ============================================================================
// Version Information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Integration Tests
// ============================================================================
