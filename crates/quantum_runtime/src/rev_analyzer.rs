// =============================================================================
// QMK - REV Analyzer + Uncomputation (C10)
// =============================================================================
// Table of Contents:
//   1. RevSegment
//   2. find_segments
//   3. Uncomputation (inverse node generation, cost estimate)
// =============================================================================
// Purpose: Partitions a graph's nodes into maximal reversible ("unitary-only")
//          runs bounded by irreversible opcodes or graph ends, and generates
//          the inverse node sequence that undoes a segment (§4.9).
// =============================================================================

use crate::error::QmkError;
use crate::graph_ir::{GraphNode, Opcode};
use crate::scheduler::topological_order;
use std::collections::HashSet;

// =============================================================================
// 1. RevSegment
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RevSegment {
    pub node_ids: Vec<String>,
    pub entry_nodes: Vec<String>,
    pub exit_nodes: Vec<String>,
    pub qubits: HashSet<String>,
    pub reversible: bool,
}

// =============================================================================
// 2. find_segments
// =============================================================================

/// Finds every maximal run of Unitary-opcode nodes in topological order,
/// bounded by Irreversible nodes or the ends of the graph (§4.9).
pub fn find_segments(nodes: &[GraphNode]) -> Result<Vec<RevSegment>, QmkError> {
    let program = crate::graph_ir::Program { nodes: nodes.to_vec(), edges: None };
    let order = topological_order(&program)?;
    let by_id: std::collections::HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut segments = Vec::new();
    let mut current: Vec<&GraphNode> = Vec::new();

    for id in &order {
        let node = by_id[id.as_str()];
        if node.op.is_unitary() {
            current.push(node);
        } else if !current.is_empty() {
            segments.push(build_segment(&current));
            current.clear();
        }
    }
    if !current.is_empty() {
        segments.push(build_segment(&current));
    }
    Ok(segments)
}

fn build_segment(nodes: &[&GraphNode]) -> RevSegment {
    let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let segment_ids: HashSet<&str> = node_ids.iter().map(|s| s.as_str()).collect();

    let mut qubits = HashSet::new();
    for node in nodes {
        qubits.extend(node.vqs.iter().cloned());
    }

    let mut entry_nodes = Vec::new();
    let mut seen_qubits = HashSet::new();
    for node in nodes {
        let deps_outside = node.deps.iter().any(|d| !segment_ids.contains(d.as_str()));
        let touches_fresh_qubit = node.vqs.iter().any(|q| !seen_qubits.contains(q));
        if deps_outside || touches_fresh_qubit {
            entry_nodes.push(node.id.clone());
        }
        seen_qubits.extend(node.vqs.iter().cloned());
    }

    let mut exit_nodes = Vec::new();
    let mut last_touch: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for node in nodes {
        for q in &node.vqs {
            last_touch.insert(q.as_str(), node.id.as_str());
        }
    }
    let last_touch_ids: HashSet<&str> = last_touch.values().copied().collect();
    for node in nodes {
        if last_touch_ids.contains(node.id.as_str()) {
            exit_nodes.push(node.id.clone());
        }
    }

    RevSegment {
        node_ids,
        entry_nodes,
        exit_nodes,
        qubits,
        reversible: true,
    }
}

// =============================================================================
// 3. Uncomputation
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct UncomputationCost {
    pub single_qubit_gates: u64,
    pub two_qubit_gates: u64,
    pub estimated_units: u64,
}

/// Generates the inverse node sequence for a segment: each node's inverse,
/// in reverse topological order, prefixed `inv_<id>` and retaining the
/// original qubit operands (§4.9).
pub fn uncompute(nodes: &[GraphNode], segment: &RevSegment) -> Result<Vec<GraphNode>, QmkError> {
    let by_id: std::collections::HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut inverses = Vec::with_capacity(segment.node_ids.len());

    for id in segment.node_ids.iter().rev() {
        let node = by_id
            .get(id.as_str())
            .ok_or_else(|| QmkError::Internal(format!("segment references unknown node {id}")))?;
        inverses.extend(inverse_of(node));
    }
    Ok(inverses)
}

/// One node's inverse. `S` and `T` are not self-inverse and have no direct
/// opcode for their adjoint, so each is expanded to repeated applications
/// (`S^-1 = S^3`, `T^-1 = T^7`) chained by an explicit dependency so they
/// execute in order on the same qubit.
fn inverse_of(node: &GraphNode) -> Vec<GraphNode> {
    let inv_id = format!("inv_{}", node.id);
    match node.op {
        // Self-inverse: H, X, Y, Z, CNOT, TeleportCnot.
        Opcode::ApplyH | Opcode::ApplyX | Opcode::ApplyY | Opcode::ApplyZ | Opcode::ApplyCnot | Opcode::TeleportCnot => {
            let mut inv = node.clone();
            inv.id = inv_id;
            vec![inv]
        }
        Opcode::ApplyS => repeated(node, Opcode::ApplyS, &inv_id, 3),
        Opcode::ApplyT => repeated(node, Opcode::ApplyT, &inv_id, 7),
        Opcode::ApplyRx | Opcode::ApplyRy | Opcode::ApplyRz => {
            let mut inv = node.clone();
            inv.id = inv_id;
            let theta = node.arg_f64("theta").unwrap_or(0.0);
            inv.args.insert("theta".to_string(), serde_json::json!(-theta));
            vec![inv]
        }
        _ => {
            let mut inv = node.clone();
            inv.id = inv_id;
            vec![inv]
        }
    }
}

fn repeated(node: &GraphNode, op: Opcode, inv_id: &str, count: usize) -> Vec<GraphNode> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut n = GraphNode::new(format!("{inv_id}_{i}"), op);
        n.vqs = node.vqs.clone();
        if i > 0 {
            n.deps.push(format!("{inv_id}_{}", i - 1));
        }
        out.push(n);
    }
    out
}

/// 1 unit per single-qubit gate, 10 units per two-qubit gate (§4.9).
pub fn estimate_cost(segment: &RevSegment, nodes: &[GraphNode]) -> UncomputationCost {
    let by_id: std::collections::HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut single = 0u64;
    let mut two = 0u64;
    for id in &segment.node_ids {
        if let Some(node) = by_id.get(id.as_str()) {
            if node.vqs.len() >= 2 {
                two += 1;
            } else {
                single += 1;
            }
        }
    }
    UncomputationCost {
        single_qubit_gates: single,
        two_qubit_gates: two,
        estimated_units: single + two * 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, op: Opcode, vqs: &[&str]) -> GraphNode {
        let mut n = GraphNode::new(id, op);
        n.vqs = vqs.iter().map(|s| s.to_string()).collect();
        n
    }

    #[test]
    fn segment_spans_unitary_run_bounded_by_measurement() {
        let mut alloc = node("a0", Opcode::AllocLq, &["q0"]);
        alloc.produces = vec![];
        let nodes = vec![
            alloc,
            node("h0", Opcode::ApplyH, &["q0"]),
            node("x0", Opcode::ApplyX, &["q0"]),
            {
                let mut m = node("m0", Opcode::MeasureZ, &["q0"]);
                m.produces = vec!["m0".to_string()];
                m
            },
        ];
        let segments = find_segments(&nodes).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].node_ids, vec!["h0".to_string(), "x0".to_string()]);
        assert!(segments[0].qubits.contains("q0"));
    }

    #[test]
    fn uncomputation_reverses_order_and_prefixes_ids() {
        let nodes = vec![node("h0", Opcode::ApplyH, &["q0"]), node("x0", Opcode::ApplyX, &["q0"])];
        let segment = RevSegment {
            node_ids: vec!["h0".to_string(), "x0".to_string()],
            entry_nodes: vec!["h0".to_string()],
            exit_nodes: vec!["x0".to_string()],
            qubits: ["q0".to_string()].into_iter().collect(),
            reversible: true,
        };
        let inverses = uncompute(&nodes, &segment).unwrap();
        assert_eq!(inverses.len(), 2);
        assert_eq!(inverses[0].id, "inv_x0");
        assert_eq!(inverses[1].id, "inv_h0");
        assert_eq!(inverses[0].op, Opcode::ApplyX);
    }

    #[test]
    fn s_gate_inverse_expands_to_three_chained_applications() {
        let nodes = vec![node("s0", Opcode::ApplyS, &["q0"])];
        let segment = RevSegment {
            node_ids: vec!["s0".to_string()],
            entry_nodes: vec!["s0".to_string()],
            exit_nodes: vec!["s0".to_string()],
            qubits: ["q0".to_string()].into_iter().collect(),
            reversible: true,
        };
        let inverses = uncompute(&nodes, &segment).unwrap();
        assert_eq!(inverses.len(), 3);
        assert!(inverses.iter().all(|n| n.op == Opcode::ApplyS));
        assert_eq!(inverses[1].deps, vec![inverses[0].id.clone()]);
        assert_eq!(inverses[2].deps, vec![inverses[1].id.clone()]);
    }

    #[test]
    fn cost_weights_two_qubit_gates_at_ten_units() {
        let nodes = vec![node("h0", Opcode::ApplyH, &["q0"]), node("cx0", Opcode::ApplyCnot, &["q0", "q1"])];
        let segment = RevSegment {
            node_ids: vec!["h0".to_string(), "cx0".to_string()],
            entry_nodes: vec!["h0".to_string()],
            exit_nodes: vec!["cx0".to_string()],
            qubits: ["q0".to_string(), "q1".to_string()].into_iter().collect(),
            reversible: true,
        };
        let cost = estimate_cost(&segment, &nodes);
        assert_eq!(cost.single_qubit_gates, 1);
        assert_eq!(cost.two_qubit_gates, 1);
        assert_eq!(cost.estimated_units, 11);
    }
}
