// =============================================================================
// QMK - Measurement Deferral Pass (C9)
// =============================================================================
// Purpose: Moves a measurement forward until it meets a use of the same
//          qubit; never moves a measurement past a user of its produced
//          event (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::pass_manager::{Pass, PassMetrics};

pub struct MeasurementDeferralPass;

impl Pass for MeasurementDeferralPass {
    fn name(&self) -> &'static str {
        "measurement_deferral"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let mut instructions: Vec<Instruction> = circuit.instructions.clone();
        let mut moved = 0u64;

        let mut i = 0;
        while i < instructions.len() {
            if !instructions[i].is_measurement() {
                i += 1;
                continue;
            }
            let measured_qubits = instructions[i].qubits.clone();

            // Circuit IR has no instruction kind that consumes a classical
            // event directly (conditionals live only in Graph IR), so the
            // "never past a user of its produced event" clause has no
            // observable effect here beyond the qubit-reuse boundary.
            let mut j = i;
            while j + 1 < instructions.len() {
                let next = &instructions[j + 1];
                if next.qubits.iter().any(|q| measured_qubits.contains(q)) {
                    break;
                }
                instructions.swap(j, j + 1);
                j += 1;
                moved += 1;
            }
            i = j + 1;
        }

        let mut out = Circuit::new(circuit.qubits.clone());
        out.instructions = instructions;
        Ok((
            out,
            PassMetrics {
                patterns_matched: moved,
                ..Default::default()
            },
        ))
    }
}
