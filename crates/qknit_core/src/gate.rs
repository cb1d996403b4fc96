//! Quantum gate definitions for QKNIT
//!
//! Gantree: L1_Circuit → Gate
//!
//! Statically typed gate descriptors. Every gate exposes its kind label,
//! parameter list, and qubit indices; the cutting core only ever looks at
//! those three, so [`Gate::Opaque`] passes arbitrary kinds through untouched.

use crate::types::{Angle, Basis, PrepState, QubitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantum gate enumeration
/// Gantree: Gate // 게이트 enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    // ========================================================================
    // Single-Qubit Gates (Non-Parameterized)
    // ========================================================================
    /// Hadamard gate
    /// Gantree: H(QubitId) // 하다마드
    H(QubitId),

    /// Pauli-X gate (NOT)
    X(QubitId),

    /// Pauli-Y gate
    Y(QubitId),

    /// Pauli-Z gate
    Z(QubitId),

    /// S gate (sqrt(Z))
    S(QubitId),

    /// S-dagger gate
    Sdg(QubitId),

    /// T gate (fourth root of Z)
    T(QubitId),

    /// T-dagger gate
    Tdg(QubitId),

    /// SX gate (sqrt(X))
    Sx(QubitId),

    /// SX-dagger gate
    Sxdg(QubitId),

    /// Identity gate
    Id(QubitId),

    // ========================================================================
    // Single-Qubit Parameterized Rotation Gates
    // ========================================================================
    /// Rotation around X-axis
    /// Gantree: Rx(QubitId, Angle) // X 회전
    Rx(QubitId, Angle),

    /// Rotation around Y-axis
    Ry(QubitId, Angle),

    /// Rotation around Z-axis
    Rz(QubitId, Angle),

    /// General single-qubit rotation U(θ, φ, λ)
    U(QubitId, Angle, Angle, Angle),

    /// Phase gate P(λ) = diag(1, e^{iλ})
    P(QubitId, Angle),

    // ========================================================================
    // Two-Qubit Gates
    // ========================================================================
    /// Controlled-NOT (CX)
    /// Gantree: CNOT(QubitId, QubitId) // ctrl, tgt
    Cnot(QubitId, QubitId),

    /// Controlled-Z
    Cz(QubitId, QubitId),

    /// Controlled-Y
    Cy(QubitId, QubitId),

    /// SWAP gate
    Swap(QubitId, QubitId),

    /// Controlled-Rx
    Crx(QubitId, QubitId, Angle),

    /// Controlled-Ry
    Cry(QubitId, QubitId, Angle),

    /// Controlled-Rz
    Crz(QubitId, QubitId, Angle),

    // ========================================================================
    // Three-Qubit Gates
    // ========================================================================
    /// Toffoli (CCX)
    Ccx(QubitId, QubitId, QubitId),

    /// Controlled-SWAP (Fredkin)
    Cswap(QubitId, QubitId, QubitId),

    // ========================================================================
    // Pass-through
    // ========================================================================
    /// Gate of any other kind, carried through cutting unchanged
    /// Gantree: Opaque{kind,qubits,params} // 불투명 게이트
    Opaque {
        /// Gate name as written in QASM
        kind: String,
        /// Operand qubits, in order
        qubits: Vec<QubitId>,
        /// Angle parameters
        params: Vec<f64>,
    },
}

impl Gate {
    // ========================================================================
    // Gate Properties
    // ========================================================================

    /// Qubits this gate acts on, in operand order
    /// Gantree: qubits(&self) -> Vec<QubitId> // 관련 큐비트
    pub fn qubits(&self) -> Vec<QubitId> {
        match self {
            Gate::H(q)
            | Gate::X(q)
            | Gate::Y(q)
            | Gate::Z(q)
            | Gate::S(q)
            | Gate::Sdg(q)
            | Gate::T(q)
            | Gate::Tdg(q)
            | Gate::Sx(q)
            | Gate::Sxdg(q)
            | Gate::Id(q)
            | Gate::Rx(q, _)
            | Gate::Ry(q, _)
            | Gate::Rz(q, _)
            | Gate::U(q, _, _, _)
            | Gate::P(q, _) => vec![*q],

            Gate::Cnot(c, t)
            | Gate::Cz(c, t)
            | Gate::Cy(c, t)
            | Gate::Swap(c, t)
            | Gate::Crx(c, t, _)
            | Gate::Cry(c, t, _)
            | Gate::Crz(c, t, _) => vec![*c, *t],

            Gate::Ccx(a, b, c) | Gate::Cswap(a, b, c) => vec![*a, *b, *c],

            Gate::Opaque { qubits, .. } => qubits.clone(),
        }
    }

    /// Parameter list (angles) in declaration order
    /// Gantree: params(&self) -> Vec<f64> // 파라미터
    pub fn params(&self) -> Vec<f64> {
        match self {
            Gate::Rx(_, a) | Gate::Ry(_, a) | Gate::Rz(_, a) | Gate::P(_, a) => vec![*a],
            Gate::U(_, theta, phi, lambda) => vec![*theta, *phi, *lambda],
            Gate::Crx(_, _, a) | Gate::Cry(_, _, a) | Gate::Crz(_, _, a) => vec![*a],
            Gate::Opaque { params, .. } => params.clone(),
            _ => Vec::new(),
        }
    }

    /// Number of qubits the gate acts on
    pub fn arity(&self) -> usize {
        match self {
            Gate::Opaque { qubits, .. } => qubits.len(),
            Gate::Cnot(..)
            | Gate::Cz(..)
            | Gate::Cy(..)
            | Gate::Swap(..)
            | Gate::Crx(..)
            | Gate::Cry(..)
            | Gate::Crz(..) => 2,
            Gate::Ccx(..) | Gate::Cswap(..) => 3,
            _ => 1,
        }
    }

    /// Check if gate acts on two or more qubits (a wire-graph node)
    /// Gantree: is_multi_qubit(&self) -> bool // 다중 큐비트 판별
    pub fn is_multi_qubit(&self) -> bool {
        self.arity() >= 2
    }

    /// Kind label
    pub fn name(&self) -> &str {
        match self {
            Gate::H(_) => "h",
            Gate::X(_) => "x",
            Gate::Y(_) => "y",
            Gate::Z(_) => "z",
            Gate::S(_) => "s",
            Gate::Sdg(_) => "sdg",
            Gate::T(_) => "t",
            Gate::Tdg(_) => "tdg",
            Gate::Sx(_) => "sx",
            Gate::Sxdg(_) => "sxdg",
            Gate::Id(_) => "id",
            Gate::Rx(..) => "rx",
            Gate::Ry(..) => "ry",
            Gate::Rz(..) => "rz",
            Gate::U(..) => "u",
            Gate::P(..) => "p",
            Gate::Cnot(..) => "cx",
            Gate::Cz(..) => "cz",
            Gate::Cy(..) => "cy",
            Gate::Swap(..) => "swap",
            Gate::Crx(..) => "crx",
            Gate::Cry(..) => "cry",
            Gate::Crz(..) => "crz",
            Gate::Ccx(..) => "ccx",
            Gate::Cswap(..) => "cswap",
            Gate::Opaque { kind, .. } => kind,
        }
    }

    // ========================================================================
    // Qubit Remapping
    // ========================================================================

    /// Same gate with every qubit index passed through `map`
    /// Gantree: remap(&self, map) -> Gate // 큐비트 재배치
    pub fn remap<F: Fn(QubitId) -> QubitId>(&self, map: F) -> Gate {
        match self {
            Gate::H(q) => Gate::H(map(*q)),
            Gate::X(q) => Gate::X(map(*q)),
            Gate::Y(q) => Gate::Y(map(*q)),
            Gate::Z(q) => Gate::Z(map(*q)),
            Gate::S(q) => Gate::S(map(*q)),
            Gate::Sdg(q) => Gate::Sdg(map(*q)),
            Gate::T(q) => Gate::T(map(*q)),
            Gate::Tdg(q) => Gate::Tdg(map(*q)),
            Gate::Sx(q) => Gate::Sx(map(*q)),
            Gate::Sxdg(q) => Gate::Sxdg(map(*q)),
            Gate::Id(q) => Gate::Id(map(*q)),
            Gate::Rx(q, a) => Gate::Rx(map(*q), *a),
            Gate::Ry(q, a) => Gate::Ry(map(*q), *a),
            Gate::Rz(q, a) => Gate::Rz(map(*q), *a),
            Gate::U(q, t, p, l) => Gate::U(map(*q), *t, *p, *l),
            Gate::P(q, a) => Gate::P(map(*q), *a),
            Gate::Cnot(c, t) => Gate::Cnot(map(*c), map(*t)),
            Gate::Cz(c, t) => Gate::Cz(map(*c), map(*t)),
            Gate::Cy(c, t) => Gate::Cy(map(*c), map(*t)),
            Gate::Swap(a, b) => Gate::Swap(map(*a), map(*b)),
            Gate::Crx(c, t, a) => Gate::Crx(map(*c), map(*t), *a),
            Gate::Cry(c, t, a) => Gate::Cry(map(*c), map(*t), *a),
            Gate::Crz(c, t, a) => Gate::Crz(map(*c), map(*t), *a),
            Gate::Ccx(a, b, c) => Gate::Ccx(map(*a), map(*b), map(*c)),
            Gate::Cswap(a, b, c) => Gate::Cswap(map(*a), map(*b), map(*c)),
            Gate::Opaque {
                kind,
                qubits,
                params,
            } => Gate::Opaque {
                kind: kind.clone(),
                qubits: qubits.iter().map(|&q| map(q)).collect(),
                params: params.clone(),
            },
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Convert to OpenQASM 2.0 string
    /// Gantree: to_qasm(&self) -> String // QASM 변환
    pub fn to_qasm(&self) -> String {
        let params = self.params();
        let head = if params.is_empty() {
            self.name().to_string()
        } else {
            let list: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            format!("{}({})", self.name(), list.join(","))
        };
        let operands: Vec<String> = self.qubits().iter().map(|q| format!("q[{}]", q)).collect();
        format!("{} {};", head, operands.join(","))
    }

    // ========================================================================
    // Basis Helpers
    // ========================================================================

    /// Rotation applied before a Z measurement to measure in `basis`
    /// X basis: H
    /// Y basis: Sdg, H
    /// Z basis: (none)
    pub fn basis_transform(qubit: QubitId, basis: Basis) -> Vec<Gate> {
        match basis {
            Basis::X => vec![Gate::H(qubit)],
            Basis::Y => vec![Gate::Sdg(qubit), Gate::H(qubit)],
            Basis::Z => vec![],
        }
    }

    /// Gates preparing `state` from |0⟩
    /// Gantree: preparation(q, PrepState) -> Vec<Gate> // 상태 준비
    pub fn preparation(qubit: QubitId, state: PrepState) -> Vec<Gate> {
        match state {
            PrepState::Zero => vec![],
            PrepState::One => vec![Gate::X(qubit)],
            PrepState::Plus => vec![Gate::H(qubit)],
            PrepState::Minus => vec![Gate::X(qubit), Gate::H(qubit)],
            PrepState::PlusI => vec![Gate::H(qubit), Gate::S(qubit)],
            PrepState::MinusI => vec![Gate::X(qubit), Gate::H(qubit), Gate::S(qubit)],
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_qasm())
    }
}

// ============================================================================
// Tests
// ============================================================================
