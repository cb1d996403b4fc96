//! Quantum circuit structure for QKNIT
//!
//! Gantree: L1_Circuit → Circuit
//!
//! The uncut input circuit and every fragment instance are plain
//! [`Circuit`] values: a qubit count plus an ordered, validated gate list.

use crate::constants::numerics;
use crate::error::{KnitError, KnitResult};
use crate::gate::Gate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantum circuit
/// Gantree: Circuit // 회로 구조체
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// Number of qubits
    /// Gantree: num_qubits: usize // 큐비트 수
    num_qubits: usize,

    /// Gate sequence
    /// Gantree: gates: Vec<Gate> // 게이트 목록
    gates: Vec<Gate>,

    /// Optional circuit name
    name: Option<String>,
}

impl Circuit {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a new empty circuit
    /// Gantree: new(n) -> Self // 생성자
    pub fn new(num_qubits: usize) -> Self {
        Self {
            num_qubits,
            gates: Vec::new(),
            name: None,
        }
    }

    /// Create a circuit with a name
    pub fn with_name(num_qubits: usize, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(num_qubits)
        }
    }

    /// Create from a vector of gates, validating every gate
    /// Gantree: from_gates(n, gates) -> Result<Self> // 검증 생성
    pub fn from_gates(num_qubits: usize, gates: Vec<Gate>) -> KnitResult<Self> {
        if num_qubits == 0 {
            return Err(KnitError::EmptyCircuit);
        }
        if num_qubits > numerics::MAX_QUBITS {
            return Err(KnitError::TooManyQubits {
                qubits: num_qubits,
                max: numerics::MAX_QUBITS,
            });
        }
        let mut circuit = Self::new(num_qubits);
        circuit.gates.reserve(gates.len());
        for gate in gates {
            circuit.add_gate(gate)?;
        }
        Ok(circuit)
    }

    // ========================================================================
    // Basic Operations
    // ========================================================================

    /// Add a gate to the circuit
    /// Gantree: add_gate(&mut, Gate) -> Result // 게이트 추가
    pub fn add_gate(&mut self, gate: Gate) -> KnitResult<()> {
        self.check_gate(&gate)?;
        self.gates.push(gate);
        Ok(())
    }

    /// Add multiple gates
    pub fn add_gates(&mut self, gates: impl IntoIterator<Item = Gate>) -> KnitResult<()> {
        for gate in gates {
            self.add_gate(gate)?;
        }
        Ok(())
    }

    /// Get number of qubits
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Get gates
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Get circuit name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set circuit name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Check if circuit has no gates
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    // ========================================================================
    // Circuit Analysis
    // ========================================================================

    /// Get total gate count
    /// Gantree: gate_count(&self) -> usize // 게이트 수
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Count gates acting on two or more qubits
    /// Gantree: count_multi(&self) -> usize // 다중 큐비트 게이트 수
    pub fn count_multi(&self) -> usize {
        self.gates.iter().filter(|g| g.is_multi_qubit()).count()
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn check_gate(&self, gate: &Gate) -> KnitResult<()> {
        let qubits = gate.qubits();
        for (i, &qubit) in qubits.iter().enumerate() {
            if qubit >= self.num_qubits {
                return Err(KnitError::GateQubitMismatch {
                    qubit,
                    num_qubits: self.num_qubits,
                });
            }
            if qubits[..i].contains(&qubit) {
                return Err(KnitError::DuplicateGateQubit {
                    gate: gate.to_qasm(),
                    qubit,
                });
            }
        }
        if let Some(angle) = gate.params().into_iter().find(|p| !p.is_finite()) {
            return Err(KnitError::InvalidAngle(angle));
        }
        Ok(())
    }

    // ========================================================================
    // QASM Conversion
    // ========================================================================

    /// Convert to OpenQASM 2.0 string
    /// Gantree: to_qasm(&self) -> String // QASM2 출력
    pub fn to_qasm(&self) -> String {
        let mut lines = vec![
            "OPENQASM 2.0;".to_string(),
            "include \"qelib1.inc\";".to_string(),
            String::new(),
            format!("qreg q[{}];", self.num_qubits),
            format!("creg c[{}];", self.num_qubits),
            String::new(),
        ];
        lines.extend(self.gates.iter().map(Gate::to_qasm));
        lines.push("measure q -> c;".to_string());
        lines.join("\n")
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Circuit({} qubits, {} gates)",
            self.num_qubits,
            self.gates.len()
        )?;
        writeln!(f, "  Multi-qubit gates: {}", self.count_multi())?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_new() {
        let circuit = Circuit::new(5);
        assert_eq!(circuit.num_qubits(), 5);
        assert!(circuit.is_empty());
    }

    #[test]
    fn test_add_gate() {
        let mut circuit = Circuit::new(3);
        assert!(circuit.add_gate(Gate::H(0)).is_ok());
        assert!(circuit.add_gate(Gate::Cnot(0, 1)).is_ok());
        assert_eq!(circuit.gate_count(), 2);
    }

    #[test]
    fn test_add_gate_rejections() {
        let mut circuit = Circuit::new(3);
        assert!(matches!(
            circuit.add_gate(Gate::H(5)),
            Err(KnitError::GateQubitMismatch { qubit: 5, .. })
        ));
        assert!(matches!(
            circuit.add_gate(Gate::Cnot(1, 1)),
            Err(KnitError::DuplicateGateQubit { qubit: 1, .. })
        ));
        assert!(matches!(
            circuit.add_gate(Gate::Rx(0, f64::NAN)),
            Err(KnitError::InvalidAngle(_))
        ));
        assert!(circuit.is_empty());
    }

    #[test]
    fn test_from_gates_requires_qubits() {
        assert!(matches!(
            Circuit::from_gates(0, vec![]),
            Err(KnitError::EmptyCircuit)
        ));
        assert!(Circuit::from_gates(64, vec![]).is_err());
    }

    #[test]
    fn test_gate_counts() {
        let circuit = Circuit::from_gates(
            3,
            vec![
                Gate::H(0),
                Gate::H(1),
                Gate::Cnot(0, 1),
                Gate::Ccx(0, 1, 2),
                Gate::Rx(0, 1.0),
            ],
        )
        .unwrap();
        assert_eq!(circuit.count_multi(), 2);
    }

    #[test]
    fn test_to_qasm() {
        let circuit = Circuit::from_gates(2, vec![Gate::H(0), Gate::Cnot(0, 1)]).unwrap();
        let qasm = circuit.to_qasm();
        assert!(qasm.contains("OPENQASM 2.0"));
        assert!(qasm.contains("qreg q[2]"));
        assert!(qasm.contains("h q[0]"));
        assert!(qasm.contains("cx q[0],q[1]"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let circuit = Circuit::from_gates(2, vec![Gate::Ry(0, 0.5), Gate::Cz(0, 1)]).unwrap();
        let json = serde_json::to_string(&circuit).unwrap();
        let back: Circuit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, circuit);
    }
}
