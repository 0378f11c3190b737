// =============================================================================
// QMK - IR Converters (C12)
// =============================================================================
// Table of Contents:
//   1. graph_to_circuit - flatten a topological schedule, drop alloc/free
//   2. circuit_to_graph - re-lift a circuit into an executable graph
// =============================================================================
// Purpose: Bidirectional Graph-IR <-> Circuit-IR conversion. Lowering
//          linearizes the topological schedule and removes allocation/free
//          markers; lifting restores them and a sequential dependency chain
//          so the optimizer's chosen order survives re-scheduling (§3, §4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::{Graph, GraphNode, Opcode, Resources};
use crate::scheduler::topological_order;
use std::collections::BTreeSet;

// =============================================================================
// 1. graph_to_circuit
// =============================================================================

pub fn graph_to_circuit(graph: &Graph) -> Result<Circuit, QmkError> {
    let order = topological_order(&graph.program)?;
    let by_id: std::collections::HashMap<&str, &GraphNode> =
        graph.program.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut qubits: BTreeSet<String> = graph.resources.vqs.iter().cloned().collect();
    for node in &graph.program.nodes {
        qubits.extend(node.vqs.iter().cloned());
    }

    let mut circuit = Circuit::new(qubits.into_iter().collect());
    for node_id in &order {
        let node = by_id[node_id.as_str()];
        if matches!(node.op, Opcode::AllocLq | Opcode::FreeLq) {
            continue;
        }
        let mut instruction = Instruction::new(node.op, node.vqs.clone(), node.id.clone());
        if let Some(theta) = node.arg_f64("theta") {
            instruction = instruction.with_param(theta);
        }
        if let Some(event) = node.produces.first() {
            instruction = instruction.with_result(event.clone());
        }
        circuit.push(instruction);
    }
    Ok(circuit)
}

// =============================================================================
// 2. circuit_to_graph
// =============================================================================

fn rotation_opcode(op: Opcode) -> bool {
    matches!(op, Opcode::ApplyRx | Opcode::ApplyRy | Opcode::ApplyRz)
}

/// Re-lifts `circuit` into an executable graph, wrapping it with fresh
/// `ALLOC_LQ`/`FREE_LQ` nodes and a sequential dependency chain that pins the
/// exact instruction order the pass pipeline produced.
pub fn circuit_to_graph(circuit: &Circuit, profile_string: &str) -> Graph {
    let mut nodes = Vec::with_capacity(circuit.instructions.len() + 2);

    let alloc_id = "alloc_lifted".to_string();
    let mut alloc_node = GraphNode::new(alloc_id.clone(), Opcode::AllocLq);
    alloc_node.vqs = circuit.qubits.clone();
    alloc_node
        .args
        .insert("profile".to_string(), serde_json::Value::String(profile_string.to_string()));
    nodes.push(alloc_node);
    let mut prev_id = Some(alloc_id);

    for (idx, instr) in circuit.instructions.iter().enumerate() {
        let id = format!("{}_{idx}", instr.source_node_id);
        let mut node = GraphNode::new(id.clone(), instr.op);
        node.vqs = instr.qubits.clone();
        if rotation_opcode(instr.op) {
            if let Some(theta) = instr.params.first() {
                node.args.insert("theta".to_string(), serde_json::json!(theta));
            }
        }
        if let Some(result) = &instr.result {
            node.produces.push(result.clone());
        }
        if let Some(dep) = &prev_id {
            node.deps.push(dep.clone());
        }
        prev_id = Some(id.clone());
        nodes.push(node);
    }

    let free_id = "free_lifted".to_string();
    let mut free_node = GraphNode::new(free_id, Opcode::FreeLq);
    free_node.vqs = circuit.qubits.clone();
    if let Some(dep) = &prev_id {
        free_node.deps.push(dep.clone());
    }
    nodes.push(free_node);

    let mut graph = Graph::new(nodes);
    graph.resources = Resources {
        vqs: circuit.qubits.clone(),
        chs: Vec::new(),
        events: circuit.instructions.iter().filter_map(|i| i.result.clone()).collect(),
    };
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    #[test]
    fn graph_to_circuit_drops_alloc_and_free() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
f0: FREE_LQ q0 q1
";
        let graph = assemble(text).unwrap();
        let circuit = graph_to_circuit(&graph).unwrap();
        assert_eq!(circuit.instructions.len(), 3);
        assert!(circuit.instructions.iter().all(|i| !matches!(i.op, Opcode::AllocLq | Opcode::FreeLq)));
    }

    #[test]
    fn round_trip_preserves_gate_sequence() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
f0: FREE_LQ q0 q1
";
        let graph = assemble(text).unwrap();
        let circuit = graph_to_circuit(&graph).unwrap();
        let lifted = circuit_to_graph(&circuit, "logical:surface(d=3)");
        let ops: Vec<Opcode> = lifted.program.nodes.iter().map(|n| n.op).collect();
        assert_eq!(
            ops,
            vec![Opcode::AllocLq, Opcode::ApplyH, Opcode::ApplyCnot, Opcode::MeasureZ, Opcode::FreeLq]
        );
    }
}
