// =============================================================================
// QMK - Gate Commutation Pass (C9)
// =============================================================================
// Purpose: Moves a single-qubit gate past a gate on disjoint qubits, or two
//          two-qubit gates sharing only a control, up to a fixed distance
//          bound. Never reorders across a measurement on any shared qubit
//          (§4.8). Exists to bring gates separated by unrelated ops into
//          adjacency for cancellation/fusion.
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::pass_manager::{Pass, PassMetrics};

const MAX_DISTANCE: usize = 8;

fn commute_eligible(a: &Instruction, b: &Instruction) -> bool {
    if a.is_measurement() || b.is_measurement() {
        return false;
    }
    if !a.qubits.iter().any(|q| b.qubits.contains(q)) {
        return true;
    }
    // Two two-qubit gates sharing only the control qubit commute (both act as
    // a no-op on the shared control's computational basis in that case).
    if a.qubits.len() == 2 && b.qubits.len() == 2 && a.qubits[0] == b.qubits[0] && a.qubits[1] != b.qubits[1] {
        return true;
    }
    false
}

pub struct GateCommutationPass;

impl Pass for GateCommutationPass {
    fn name(&self) -> &'static str {
        "gate_commutation"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let mut instructions = circuit.instructions.clone();
        let mut swaps = 0u64;

        // Walk back-to-front so a later gate bubbles past disjoint
        // instructions towards an earlier one on the same qubits, instead of
        // an earlier disjoint instruction bubbling forward over it first.
        for i in (0..instructions.len()).rev() {
            let mut j = i;
            let mut moved = 0;
            while j > 0 && moved < MAX_DISTANCE && commute_eligible(&instructions[j - 1], &instructions[j]) {
                instructions.swap(j - 1, j);
                j -= 1;
                moved += 1;
            }
            if moved > 0 {
                swaps += moved as u64;
            }
        }

        let mut out = Circuit::new(circuit.qubits.clone());
        out.instructions = instructions;
        Ok((
            out,
            PassMetrics {
                patterns_matched: swaps,
                ..Default::default()
            },
        ))
    }
}
