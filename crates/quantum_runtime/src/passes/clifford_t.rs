// =============================================================================
// QMK - Clifford+T Optimization Pass (C9)
// =============================================================================
// Purpose: Commutes T gates together and replaces `T^4` by `S`; reports
//          initial/final T-count (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};

const COMMUTE_DISTANCE: usize = 8;

pub struct CliffordTPass;

impl Pass for CliffordTPass {
    fn name(&self) -> &'static str {
        "clifford_t"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let initial_t_count = circuit.instructions.iter().filter(|i| i.op == Opcode::ApplyT).count();
        let mut instructions = circuit.instructions.clone();

        // Bubble each T gate earlier past disjoint-qubit instructions so runs
        // of four on the same qubit become adjacent.
        for i in 0..instructions.len() {
            if instructions[i].op != Opcode::ApplyT {
                continue;
            }
            let mut j = i;
            let mut moved = 0;
            while j > 0 && moved < COMMUTE_DISTANCE {
                let prev = &instructions[j - 1];
                if prev.is_measurement() || prev.qubits.iter().any(|q| instructions[j].qubits.contains(q)) {
                    break;
                }
                instructions.swap(j - 1, j);
                j -= 1;
                moved += 1;
            }
        }

        let mut t_removed = 0u64;
        loop {
            let mut changed = false;
            let mut i = 0;
            while i + 3 < instructions.len() {
                let run = &instructions[i..i + 4];
                if run.iter().all(|instr| instr.op == Opcode::ApplyT) && run.windows(2).all(|w| w[0].qubits == w[1].qubits) {
                    let replacement = Instruction::new(Opcode::ApplyS, run[0].qubits.clone(), run[0].source_node_id.clone());
                    instructions.splice(i..i + 4, [replacement]);
                    t_removed += 4;
                    changed = true;
                } else {
                    i += 1;
                }
            }
            if !changed {
                break;
            }
        }

        let final_t_count = instructions.iter().filter(|i| i.op == Opcode::ApplyT).count();
        let mut custom = std::collections::HashMap::new();
        custom.insert("t_count_initial".to_string(), initial_t_count as f64);
        custom.insert("t_count_final".to_string(), final_t_count as f64);

        let mut out = Circuit::new(circuit.qubits.clone());
        out.instructions = instructions;
        Ok((
            out,
            PassMetrics {
                t_gates_removed: t_removed,
                custom,
                ..Default::default()
            },
        ))
    }
}
