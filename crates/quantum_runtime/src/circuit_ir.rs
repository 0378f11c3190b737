// =============================================================================
// QMK - Circuit IR (C8 data model)
// =============================================================================
// Table of Contents:
//   1. Instruction
//   2. Circuit
// =============================================================================
// Purpose: A flat ordered instruction list over a fixed qubit set, derived
//          from Graph IR by flattening and dropping allocation/free (§3, §4.8).
//          Optimizer passes (C9) act on this representation.
// =============================================================================

use crate::graph_ir::Opcode;
use serde::{Deserialize, Serialize};

// =============================================================================
// 1. Instruction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub qubits: Vec<String>,
    pub params: Vec<f64>,
    pub result: Option<String>,
    /// Originating Graph IR node id, carried through for re-lifting (§4.8).
    pub source_node_id: String,
}

impl Instruction {
    pub fn new(op: Opcode, qubits: Vec<String>, source_node_id: impl Into<String>) -> Self {
        Self {
            op,
            qubits,
            params: Vec::new(),
            result: None,
            source_node_id: source_node_id.into(),
        }
    }

    pub fn with_param(mut self, value: f64) -> Self {
        self.params.push(value);
        self
    }

    pub fn with_result(mut self, event: impl Into<String>) -> Self {
        self.result = Some(event.into());
        self
    }

    pub fn with_result_opt(mut self, event: Option<String>) -> Self {
        self.result = event;
        self
    }

    pub fn is_single_qubit_unitary(&self) -> bool {
        matches!(
            self.op,
            Opcode::ApplyH
                | Opcode::ApplyX
                | Opcode::ApplyY
                | Opcode::ApplyZ
                | Opcode::ApplyS
                | Opcode::ApplyT
                | Opcode::ApplyRx
                | Opcode::ApplyRy
                | Opcode::ApplyRz
        )
    }

    pub fn is_two_qubit_unitary(&self) -> bool {
        matches!(self.op, Opcode::ApplyCnot | Opcode::ApplyCz | Opcode::ApplySwap)
    }

    pub fn is_measurement(&self) -> bool {
        matches!(self.op, Opcode::MeasureZ | Opcode::MeasureX | Opcode::MeasureY | Opcode::MeasureBell)
    }

    /// True iff `self` and `other` act on at least one common qubit.
    pub fn shares_qubit_with(&self, other: &Instruction) -> bool {
        self.qubits.iter().any(|q| other.qubits.contains(q))
    }
}

// =============================================================================
// 2. Circuit
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    pub qubits: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl Circuit {
    pub fn new(qubits: Vec<String>) -> Self {
        Self {
            qubits,
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn gate_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.is_single_qubit_unitary() || i.is_two_qubit_unitary())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_qubit_detects_overlap() {
        let a = Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n0");
        let b = Instruction::new(Opcode::ApplyX, vec!["q0".to_string()], "n1");
        let c = Instruction::new(Opcode::ApplyX, vec!["q1".to_string()], "n2");
        assert!(a.shares_qubit_with(&b));
        assert!(!a.shares_qubit_with(&c));
    }

    #[test]
    fn gate_count_excludes_measurements_and_markers() {
        let mut circuit = Circuit::new(vec!["q0".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n0"));
        circuit.push(Instruction::new(Opcode::MeasureZ, vec!["q0".to_string()], "n1").with_result("m0"));
        assert_eq!(circuit.gate_count(), 1);
    }
}
