//! Circuit builder for QKNIT
//!
//! Gantree: L1_Circuit → CircuitBuilder
//!
//! Fluent builder for circuits. Gate errors do not interrupt the chain;
//! the first one is kept and returned by [`CircuitBuilder::build`].

use crate::circuit::Circuit;
use crate::constants::numerics;
use crate::error::{KnitError, KnitResult};
use crate::gate::Gate;
use crate::types::{Angle, QubitId};

/// Fluent circuit builder (consuming self pattern)
/// Gantree: CircuitBuilder // 빌더 패턴
pub struct CircuitBuilder {
    /// Internal circuit being built
    circuit: Circuit,

    /// First rejected gate
    error: Option<KnitError>,
}

impl CircuitBuilder {
    // ========================================================================
    // Constructor
    // ========================================================================

    /// Create a new circuit builder
    /// Gantree: new(n) -> Self // 생성자
    pub fn new(num_qubits: usize) -> Self {
        Self {
            circuit: Circuit::new(num_qubits),
            error: None,
        }
    }

    /// Create with circuit name
    pub fn with_name(num_qubits: usize, name: impl Into<String>) -> Self {
        Self {
            circuit: Circuit::with_name(num_qubits, name),
            error: None,
        }
    }

    /// Append any gate
    /// Gantree: gate(self, Gate) -> Self // 게이트 추가
    pub fn gate(mut self, gate: Gate) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.circuit.add_gate(gate) {
                self.error = Some(e);
            }
        }
        self
    }

    // ========================================================================
    // Single-Qubit Gates
    // ========================================================================

    /// Add Hadamard gate
    pub fn h(self, qubit: QubitId) -> Self {
        self.gate(Gate::H(qubit))
    }

    /// Add Pauli-X gate
    pub fn x(self, qubit: QubitId) -> Self {
        self.gate(Gate::X(qubit))
    }

    /// Add Pauli-Y gate
    pub fn y(self, qubit: QubitId) -> Self {
        self.gate(Gate::Y(qubit))
    }

    /// Add Pauli-Z gate
    pub fn z(self, qubit: QubitId) -> Self {
        self.gate(Gate::Z(qubit))
    }

    /// Add S gate
    pub fn s(self, qubit: QubitId) -> Self {
        self.gate(Gate::S(qubit))
    }

    /// Add S-dagger gate
    pub fn sdg(self, qubit: QubitId) -> Self {
        self.gate(Gate::Sdg(qubit))
    }

    /// Add T gate
    pub fn t(self, qubit: QubitId) -> Self {
        self.gate(Gate::T(qubit))
    }

    /// Add T-dagger gate
    pub fn tdg(self, qubit: QubitId) -> Self {
        self.gate(Gate::Tdg(qubit))
    }

    /// Add SX gate
    pub fn sx(self, qubit: QubitId) -> Self {
        self.gate(Gate::Sx(qubit))
    }

    /// Add Rx rotation
    /// Gantree: rx(self, q, a) -> Self // Rx 추가
    pub fn rx(self, qubit: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Rx(qubit, angle))
    }

    /// Add Ry rotation
    pub fn ry(self, qubit: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Ry(qubit, angle))
    }

    /// Add Rz rotation
    pub fn rz(self, qubit: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Rz(qubit, angle))
    }

    /// Add U gate (general single-qubit)
    pub fn u(self, qubit: QubitId, theta: Angle, phi: Angle, lambda: Angle) -> Self {
        self.gate(Gate::U(qubit, theta, phi, lambda))
    }

    /// Add phase gate
    pub fn p(self, qubit: QubitId, lambda: Angle) -> Self {
        self.gate(Gate::P(qubit, lambda))
    }

    // ========================================================================
    // Multi-Qubit Gates
    // ========================================================================

    /// Add CNOT gate
    /// Gantree: cx(self, c, t) -> Self // CNOT 추가
    pub fn cx(self, control: QubitId, target: QubitId) -> Self {
        self.gate(Gate::Cnot(control, target))
    }

    /// Add CZ gate
    pub fn cz(self, control: QubitId, target: QubitId) -> Self {
        self.gate(Gate::Cz(control, target))
    }

    /// Add CY gate
    pub fn cy(self, control: QubitId, target: QubitId) -> Self {
        self.gate(Gate::Cy(control, target))
    }

    /// Add SWAP gate
    pub fn swap(self, a: QubitId, b: QubitId) -> Self {
        self.gate(Gate::Swap(a, b))
    }

    /// Add CRX gate
    pub fn crx(self, control: QubitId, target: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Crx(control, target, angle))
    }

    /// Add CRY gate
    pub fn cry(self, control: QubitId, target: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Cry(control, target, angle))
    }

    /// Add CRZ gate
    pub fn crz(self, control: QubitId, target: QubitId, angle: Angle) -> Self {
        self.gate(Gate::Crz(control, target, angle))
    }

    /// Add Toffoli (CCX) gate
    pub fn ccx(self, c1: QubitId, c2: QubitId, target: QubitId) -> Self {
        self.gate(Gate::Ccx(c1, c2, target))
    }

    /// Add Fredkin (CSWAP) gate
    pub fn cswap(self, control: QubitId, a: QubitId, b: QubitId) -> Self {
        self.gate(Gate::Cswap(control, a, b))
    }

    /// Add a gate of arbitrary kind
    pub fn opaque(self, kind: impl Into<String>, qubits: Vec<QubitId>, params: Vec<f64>) -> Self {
        self.gate(Gate::Opaque {
            kind: kind.into(),
            qubits,
            params,
        })
    }

    // ========================================================================
    // Layer Operations
    // ========================================================================

    /// Hadamard on every qubit
    pub fn h_layer(self) -> Self {
        let n = self.circuit.num_qubits();
        (0..n).fold(self, |b, q| b.h(q))
    }

    /// Ry on qubit i with angle i (extra angles ignored)
    /// Gantree: ry_layer(self, angles) -> Self // Ry 레이어
    pub fn ry_layer(self, angles: &[Angle]) -> Self {
        let n = self.circuit.num_qubits().min(angles.len());
        (0..n).fold(self, |b, q| b.ry(q, angles[q]))
    }

    /// CX between neighbours along the register
    /// Gantree: cx_chain(self) -> Self // CX 체인
    pub fn cx_chain(self) -> Self {
        let n = self.circuit.num_qubits();
        (0..n.saturating_sub(1)).fold(self, |b, q| b.cx(q, q + 1))
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Finish the circuit, reporting the first rejected gate
    /// Gantree: build(self) -> Result<Circuit> // 빌드
    pub fn build(self) -> KnitResult<Circuit> {
        if self.circuit.num_qubits() == 0 {
            return Err(KnitError::EmptyCircuit);
        }
        if self.circuit.num_qubits() > numerics::MAX_QUBITS {
            return Err(KnitError::TooManyQubits {
                qubits: self.circuit.num_qubits(),
                max: numerics::MAX_QUBITS,
            });
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.circuit),
        }
    }

    /// Get reference to current circuit state
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Get number of qubits
    pub fn num_qubits(&self) -> usize {
        self.circuit.num_qubits()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let circuit = CircuitBuilder::new(3).h(0).cx(0, 1).cx(1, 2).build().unwrap();
        assert_eq!(circuit.num_qubits(), 3);
        assert_eq!(circuit.gate_count(), 3);
    }

    #[test]
    fn test_builder_chain() {
        let circuit = CircuitBuilder::new(5).h(0).cx_chain().build().unwrap();
        assert_eq!(circuit.gate_count(), 5);
        assert_eq!(circuit.count_multi(), 4);
    }

    #[test]
    fn test_builder_layers() {
        let circuit = CircuitBuilder::new(3)
            .h_layer()
            .ry_layer(&[0.1, 0.2, 0.3, 0.4])
            .build()
            .unwrap();
        assert_eq!(circuit.gate_count(), 6);
    }

    #[test]
    fn test_builder_keeps_first_error() {
        let result = CircuitBuilder::new(2).h(0).cx(0, 4).x(7).build();
        assert!(matches!(
            result,
            Err(KnitError::GateQubitMismatch { qubit: 4, .. })
        ));
    }

    #[test]
    fn test_builder_empty_register() {
        assert!(matches!(
            CircuitBuilder::new(0).build(),
            Err(KnitError::EmptyCircuit)
        ));
    }
}
