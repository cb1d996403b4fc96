//! Constants for QKNIT
//!
//! Gantree: L0_Foundation → Constants
//!
//! Numerical tolerances, cutting limits, and execution defaults.

// ============================================================================
// Numerical Constants
// Gantree: numerics // 수치 상수
// ============================================================================

pub mod numerics {
    //! Tolerances and width limits for distributions

    /// Allowed deviation of an executor distribution from unit sum
    /// Gantree: PROBABILITY_SUM_TOLERANCE: f64 = 1e-6
    pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

    /// Default threshold for the reconstruction numerical warning
    /// Gantree: DEFAULT_NUMERICAL_TOLERANCE: f64 = 1e-6
    pub const DEFAULT_NUMERICAL_TOLERANCE: f64 = 1e-6;

    /// Default MSE threshold for a passing verification
    /// Gantree: DEFAULT_VERIFICATION_TOLERANCE: f64 = 1e-9
    pub const DEFAULT_VERIFICATION_TOLERANCE: f64 = 1e-9;

    /// Widest outcome an index can address (bit 63 reserved)
    pub const MAX_QUBITS: usize = 63;

    /// Widest distribution that may be expanded to a dense vector
    pub const MAX_DENSE_QUBITS: usize = 30;

    /// Default width at or below which accumulators are dense
    /// Gantree: DEFAULT_DENSE_THRESHOLD: usize = 20
    pub const DEFAULT_DENSE_THRESHOLD: usize = 20;

    /// Clipping floor for cross entropy
    pub const CROSS_ENTROPY_EPSILON: f64 = 1e-16;
}

// ============================================================================
// Cutting Constants
// Gantree: cutting // 회로 절단 상수
// ============================================================================

pub mod cutting {
    //! Cut basis scheme and search limits

    /// Labels per cut in the Pauli measure-and-prepare scheme
    /// Gantree: BASIS_COUNT: usize = 8
    pub const BASIS_COUNT: usize = 8;

    /// Σ|coefficient| over one cut's labels
    /// Gantree: IDENTITY_CHANNEL_NORM: f64 = 4.0
    pub const IDENTITY_CHANNEL_NORM: f64 = 4.0;

    /// Most cuts a term id can enumerate (8^20 < 2^64)
    /// Gantree: MAX_CUTS: usize = 20
    pub const MAX_CUTS: usize = 20;

    /// Default number of search states visited by the automatic finder
    pub const DEFAULT_SEARCH_BUDGET: u64 = 1_000_000;

    /// Default allowed fragment counts for automatic search
    pub const DEFAULT_NUM_SUBCIRCUITS: [usize; 1] = [2];

    /// Number of summation terms for `num_cuts` cuts
    #[inline]
    pub const fn term_count(num_cuts: usize) -> u64 {
        (BASIS_COUNT as u64).pow(num_cuts as u32)
    }
}

// ============================================================================
// Execution Constants
// Gantree: execution // 실행 상수
// ============================================================================

pub mod execution {
    //! Dispatch defaults

    /// Instances sent per executor batch
    /// Gantree: DEFAULT_BATCH_SIZE: usize = 16
    pub const DEFAULT_BATCH_SIZE: usize = 16;

    /// Default number of shots per measurement
    /// Gantree: DEFAULT_SHOTS: u64 = 8192
    pub const DEFAULT_SHOTS: u64 = 8192;

    /// Minimum recommended shots
    pub const MIN_SHOTS: u64 = 1024;

    /// Default seed for sampled execution
    pub const DEFAULT_SEED: u64 = 42;
}

// ============================================================================
// Tests
// ============================================================================
