//! # QKNIT Backend
//!
//! Executor capabilities and the reference state-vector simulator.
//!
//! ## Gantree Architecture
//!
//! ```text
//! qknit_backend // L2: Backend (완료)
//!     ExecutorTrait // Executor, ExactEvaluator, ShotBudget (완료)
//!     SimulatorBackend // 상태 벡터 시뮬레이터 (완료)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use qknit_backend::prelude::*;
//! use qknit_core::CircuitBuilder;
//!
//! let backend = SimulatorBackend::new().with_seed(42);
//! let circuit = CircuitBuilder::new(2).h(0).cx(0, 1).build().unwrap();
//!
//! let exact = backend.execute(&circuit, ShotBudget::Exact).unwrap();
//! assert!((exact.probability("11") - 0.5).abs() < 1e-12);
//!
//! let sampled = backend.execute(&circuit, ShotBudget::Shots(1000)).unwrap();
//! assert!(sampled.is_normalized(1e-9));
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Executor traits and shot budgets (Gantree: L2_Backend → ExecutorTrait)
pub mod execution;

/// State-vector simulator (Gantree: L2_Backend → SimulatorBackend)
pub mod simulator;

// ============================================================================
// Re-exports
// ============================================================================

pub use execution::{validate_output, ExactEvaluator, Executor, ShotBudget};
pub use simulator::SimulatorBackend;

// ============================================================================
// Prelude
// ============================================================================

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! ```rust
    //! use qknit_backend::prelude::*;
    //! ```

    pub use crate::execution::{validate_output, ExactEvaluator, Executor, ShotBudget};
    pub use crate::simulator::SimulatorBackend;
}

// ============================================================================
// Integration Tests
// ============================================================================
