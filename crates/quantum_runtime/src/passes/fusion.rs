// =============================================================================
// QMK - Gate Fusion Pass (C9)
// =============================================================================
// Purpose: `S.S -> Z`, `T.T -> S`, `RZ(θ1).RZ(θ2) -> RZ(θ1+θ2)` mod 2π,
//          analogous for RX, RY. Iterative to fixed point (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};
use std::f64::consts::TAU;

/// Fuses `a` followed by `b` into a single instruction, if the pair is a
/// known-fusible combination. Returns `None` if the pair cancels to identity.
fn fuse_pair(a: &Instruction, b: &Instruction) -> Option<Option<Instruction>> {
    if a.qubits != b.qubits {
        return None;
    }
    match (a.op, b.op) {
        (Opcode::ApplyS, Opcode::ApplyS) => {
            Some(Some(Instruction::new(Opcode::ApplyZ, a.qubits.clone(), a.source_node_id.clone())))
        }
        (Opcode::ApplyT, Opcode::ApplyT) => {
            Some(Some(Instruction::new(Opcode::ApplyS, a.qubits.clone(), a.source_node_id.clone())))
        }
        (Opcode::ApplyRx, Opcode::ApplyRx) | (Opcode::ApplyRy, Opcode::ApplyRy) | (Opcode::ApplyRz, Opcode::ApplyRz) => {
            let sum = (a.params.first().copied().unwrap_or(0.0) + b.params.first().copied().unwrap_or(0.0)).rem_euclid(TAU);
            if sum.abs() < 1e-10 || (sum - TAU).abs() < 1e-10 {
                Some(None)
            } else {
                Some(Some(Instruction::new(a.op, a.qubits.clone(), a.source_node_id.clone()).with_param(sum)))
            }
        }
        _ => None,
    }
}

pub struct GateFusionPass;

impl Pass for GateFusionPass {
    fn name(&self) -> &'static str {
        "gate_fusion"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let mut instructions = circuit.instructions.clone();
        let mut removed = 0u64;
        let mut added = 0u64;

        loop {
            let mut changed = false;
            let mut i = 0;
            while i + 1 < instructions.len() {
                match fuse_pair(&instructions[i], &instructions[i + 1]) {
                    Some(Some(fused)) => {
                        instructions[i] = fused;
                        instructions.remove(i + 1);
                        removed += 2;
                        added += 1;
                        changed = true;
                    }
                    Some(None) => {
                        instructions.remove(i + 1);
                        instructions.remove(i);
                        removed += 2;
                        changed = true;
                    }
                    None => i += 1,
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
                gates_added: added,
                ..Default::default()
            },
        ))
    }
}
