// =============================================================================
// QMK - Gate Cancellation Pass (C9)
// =============================================================================
// Purpose: Removes adjacent inverse pairs on identical qubits: self-inverse
//          {H,X,Y,Z,CNOT,CZ,SWAP}; opposite-angle rotations within tolerance
//          1e-10 (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};

const ANGLE_TOLERANCE: f64 = 1e-10;

fn is_self_inverse(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::ApplyH | Opcode::ApplyX | Opcode::ApplyY | Opcode::ApplyZ | Opcode::ApplyCnot | Opcode::ApplyCz | Opcode::ApplySwap
    )
}

fn cancels(a: &Instruction, b: &Instruction) -> bool {
    if a.qubits != b.qubits {
        return false;
    }
    if a.op == b.op && is_self_inverse(a.op) {
        return true;
    }
    if a.op == b.op && matches!(a.op, Opcode::ApplyRx | Opcode::ApplyRy | Opcode::ApplyRz) {
        let theta_a = a.params.first().copied().unwrap_or(0.0);
        let theta_b = b.params.first().copied().unwrap_or(0.0);
        return (theta_a + theta_b).abs() < ANGLE_TOLERANCE;
    }
    false
}

pub struct GateCancellationPass;

impl Pass for GateCancellationPass {
    fn name(&self) -> &'static str {
        "gate_cancellation"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let mut instructions = circuit.instructions.clone();
        let mut removed = 0u64;
        let mut cnot_removed = 0u64;

        loop {
            let mut changed = false;
            let mut i = 0;
            while i + 1 < instructions.len() {
                if cancels(&instructions[i], &instructions[i + 1]) {
                    if instructions[i].op == Opcode::ApplyCnot {
                        cnot_removed += 2;
                    }
                    instructions.remove(i + 1);
                    instructions.remove(i);
                    removed += 2;
                    changed = true;
                    i = i.saturating_sub(1);
                } else {
                    i += 1;
                }
            }
            if !changed {
                break;
            }
        }

        let mut out = Circuit::new(circuit.qubits.clone());
        out.instructions = instructions;
        Ok((
            out,
            PassMetrics {
                gates_removed: removed,
                cnot_removed,
                ..Default::default()
            },
        ))
    }
}
