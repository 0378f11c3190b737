// =============================================================================
// QMK - Template Matching Pass (C9)
// =============================================================================
// Purpose: Replaces a library of fixed patterns with equivalents, e.g.
//          `H-Z-H -> X`, `S^4 -> I` (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};

/// Attempts to match a fixed template starting at `instructions[i]`. Returns
/// the template's replacement (possibly empty, for `S^4 -> I`) and how many
/// source instructions it consumed.
fn match_template(instructions: &[Instruction], i: usize) -> Option<(Vec<Instruction>, usize)> {
    let same_qubit = |a: &Instruction, b: &Instruction| a.qubits == b.qubits;

    if i + 2 < instructions.len() {
        let (h1, z, h2) = (&instructions[i], &instructions[i + 1], &instructions[i + 2]);
        if h1.op == Opcode::ApplyH
            && z.op == Opcode::ApplyZ
            && h2.op == Opcode::ApplyH
            && same_qubit(h1, z)
            && same_qubit(z, h2)
        {
            return Some((vec![Instruction::new(Opcode::ApplyX, h1.qubits.clone(), h1.source_node_id.clone())], 3));
        }
    }

    if i + 3 < instructions.len() {
        let run = &instructions[i..i + 4];
        if run.iter().all(|instr| instr.op == Opcode::ApplyS) && run.windows(2).all(|w| same_qubit(&w[0], &w[1])) {
            return Some((Vec::new(), 4));
        }
    }

    None
}

pub struct TemplateMatchingPass;

impl Pass for TemplateMatchingPass {
    fn name(&self) -> &'static str {
        "template_matching"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let instructions = circuit.instructions.clone();
        let mut out = Vec::with_capacity(instructions.len());
        let mut matched = 0u64;
        let mut removed = 0u64;
        let mut added = 0u64;

        let mut i = 0;
        while i < instructions.len() {
            if let Some((replacement, consumed)) = match_template(&instructions, i) {
                matched += 1;
                removed += consumed as u64;
                added += replacement.len() as u64;
                out.extend(replacement);
                i += consumed;
            } else {
                out.push(instructions[i].clone());
                i += 1;
            }
        }

        let mut circuit_out = Circuit::new(circuit.qubits.clone());
        circuit_out.instructions = out;
        Ok((
            circuit_out,
            PassMetrics {
                patterns_matched: matched,
                gates_removed: removed,
                gates_added: added,
                ..Default::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h_z_h_becomes_x() {
        let mut circuit = Circuit::new(vec!["q0".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n0"));
        circuit.push(Instruction::new(Opcode::ApplyZ, vec!["q0".to_string()], "n1"));
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n2"));
        let (out, metrics) = TemplateMatchingPass.run(&circuit).unwrap();
        assert_eq!(out.instructions.len(), 1);
        assert_eq!(out.instructions[0].op, Opcode::ApplyX);
        assert_eq!(metrics.patterns_matched, 1);
    }

    #[test]
    fn four_s_gates_vanish() {
        let mut circuit = Circuit::new(vec!["q0".to_string()]);
        for i in 0..4 {
            circuit.push(Instruction::new(Opcode::ApplyS, vec!["q0".to_string()], format!("n{i}")));
        }
        let (out, _) = TemplateMatchingPass.run(&circuit).unwrap();
        assert!(out.is_empty());
    }
}
