// =============================================================================
// QMK - Measurement Canonicalization Pass (C9)
// =============================================================================
// Purpose: Detects `H...M_Z -> M_X` and `S^3.H...M_Z -> M_Y` patterns when no
//          interfering gate acts on the measured qubit between the
//          change-of-basis and the measurement; removes the basis-change
//          gates (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};

pub struct MeasurementCanonicalizationPass;

impl Pass for MeasurementCanonicalizationPass {
    fn name(&self) -> &'static str {
        "measurement_canonicalization"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let instructions = circuit.instructions.clone();
        let mut out: Vec<Instruction> = Vec::with_capacity(instructions.len());
        let mut matched = 0u64;
        let mut removed = 0u64;

        let mut i = 0;
        while i < instructions.len() {
            let instr = &instructions[i];
            if instr.op != Opcode::MeasureZ {
                out.push(instr.clone());
                i += 1;
                continue;
            }
            let qubit = &instr.qubits;
            // S^3.H immediately preceding -> M_Y, no interfering gate in between.
            if out.len() >= 4
                && out[out.len() - 4..].iter().map(|g| g.op).eq([Opcode::ApplyS, Opcode::ApplyS, Opcode::ApplyS, Opcode::ApplyH])
                && out[out.len() - 4..].iter().all(|g| g.qubits == *qubit)
            {
                for _ in 0..4 {
                    out.pop();
                }
                out.push(Instruction::new(Opcode::MeasureY, qubit.clone(), instr.source_node_id.clone()).with_result_opt(instr.result.clone()));
                matched += 1;
                removed += 4;
                i += 1;
                continue;
            }
            // H immediately preceding -> M_X.
            if out.last().map(|p| p.op == Opcode::ApplyH && p.qubits == *qubit).unwrap_or(false) {
                out.pop();
                out.push(Instruction::new(Opcode::MeasureX, qubit.clone(), instr.source_node_id.clone()).with_result_opt(instr.result.clone()));
                matched += 1;
                removed += 1;
                i += 1;
                continue;
            }
            out.push(instr.clone());
            i += 1;
        }

        let mut circuit_out = Circuit::new(circuit.qubits.clone());
        circuit_out.instructions = out;
        Ok((
            circuit_out,
            PassMetrics {
                patterns_matched: matched,
                gates_removed: removed,
                ..Default::default()
            },
        ))
    }
}
