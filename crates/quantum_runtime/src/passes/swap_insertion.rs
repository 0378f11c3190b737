// =============================================================================
// QMK - SWAP Insertion Pass (C9)
// =============================================================================
// Purpose: Given a hardware topology, routes two-qubit gates by inserting
//          SWAPs along shortest paths found by BFS; updates the
//          logical->physical map accordingly (§4.8).
// =============================================================================

use crate::circuit_ir::{Circuit, Instruction};
use crate::error::QmkError;
use crate::graph_ir::Opcode;
use crate::pass_manager::{Pass, PassMetrics};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct Topology {
    edges: HashSet<(u32, u32)>,
    adjacency: HashMap<u32, Vec<u32>>,
}

impl Topology {
    pub fn new(edges: Vec<(u32, u32)>) -> Self {
        let mut adjacency: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut set = HashSet::new();
        for (a, b) in edges {
            set.insert((a, b));
            set.insert((b, a));
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        Self { edges: set, adjacency }
    }

    pub fn adjacent(&self, a: u32, b: u32) -> bool {
        self.edges.contains(&(a, b))
    }

    /// Shortest path from `start` to `end` inclusive, BFS over an unweighted
    /// topology graph.
    pub fn bfs_path(&self, start: u32, end: u32) -> Option<Vec<u32>> {
        if start == end {
            return Some(vec![start]);
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut parent = HashMap::new();
        visited.insert(start);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for &next in self.adjacency.get(&node).into_iter().flatten() {
                if visited.insert(next) {
                    parent.insert(next, node);
                    if next == end {
                        let mut path = vec![end];
                        let mut cur = end;
                        while let Some(&p) = parent.get(&cur) {
                            path.push(p);
                            cur = p;
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

pub struct SwapInsertionPass {
    topology: Option<Topology>,
    initial_mapping: Option<HashMap<String, u32>>,
}

impl SwapInsertionPass {
    /// Routes against an explicit hardware topology and starting mapping.
    pub fn new(topology: Topology, initial_mapping: HashMap<String, u32>) -> Self {
        Self {
            topology: Some(topology),
            initial_mapping: Some(initial_mapping),
        }
    }

    /// No topology configured: treats every pair of qubits as adjacent, so
    /// the pass is a no-op. This is the default used when an optimization
    /// level's pipeline includes this pass without a target backend.
    pub fn all_to_all() -> Self {
        Self { topology: None, initial_mapping: None }
    }
}

impl Pass for SwapInsertionPass {
    fn name(&self) -> &'static str {
        "swap_insertion"
    }

    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError> {
        let topology = match &self.topology {
            Some(t) => t.clone(),
            None => Topology::new(
                circuit
                    .qubits
                    .iter()
                    .enumerate()
                    .flat_map(|(i, _)| circuit.qubits.iter().enumerate().skip(i + 1).map(move |(j, _)| (i as u32, j as u32)))
                    .collect(),
            ),
        };
        let mut current_physical: HashMap<String, u32> = self.initial_mapping.clone().unwrap_or_else(|| {
            circuit
                .qubits
                .iter()
                .enumerate()
                .map(|(i, q)| (q.clone(), i as u32))
                .collect()
        });
        let mut current_logical: HashMap<u32, String> = current_physical.iter().map(|(q, p)| (*p, q.clone())).collect();

        let mut out = Vec::with_capacity(circuit.instructions.len());
        let mut swaps_added = 0u64;

        for instr in &circuit.instructions {
            if !instr.is_two_qubit_unitary() || instr.qubits.len() != 2 {
                out.push(instr.clone());
                continue;
            }
            let a = &instr.qubits[0];
            let b = &instr.qubits[1];
            let pa = *current_physical.get(a).ok_or_else(|| QmkError::Internal(format!("qubit {a} not in swap-insertion mapping")))?;
            let pb = *current_physical.get(b).ok_or_else(|| QmkError::Internal(format!("qubit {b} not in swap-insertion mapping")))?;

            if topology.adjacent(pa, pb) {
                out.push(instr.clone());
                continue;
            }

            let path = topology
                .bfs_path(pa, pb)
                .ok_or_else(|| QmkError::Internal(format!("no route between physical qubits {pa} and {pb}")))?;

            for window in path.windows(2).take(path.len().saturating_sub(2)) {
                let (p0, p1) = (window[0], window[1]);
                let q0 = current_logical[&p0].clone();
                let q1 = current_logical[&p1].clone();
                out.push(Instruction::new(Opcode::ApplySwap, vec![q0.clone(), q1.clone()], instr.source_node_id.clone()));
                current_physical.insert(q0.clone(), p1);
                current_physical.insert(q1.clone(), p0);
                current_logical.insert(p0, q1);
                current_logical.insert(p1, q0);
                swaps_added += 1;
            }

            out.push(instr.clone());
        }

        let mut circuit_out = Circuit::new(circuit.qubits.clone());
        circuit_out.instructions = out;
        Ok((
            circuit_out,
            PassMetrics {
                swap_gates_added: swaps_added,
                gates_added: swaps_added,
                ..Default::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_topology(n: u32) -> Topology {
        Topology::new((0..n - 1).map(|i| (i, i + 1)).collect())
    }

    #[test]
    fn adjacent_gate_needs_no_swaps() {
        let topology = line_topology(3);
        let mut mapping = HashMap::new();
        mapping.insert("q0".to_string(), 0);
        mapping.insert("q1".to_string(), 1);
        let mut circuit = Circuit::new(vec!["q0".to_string(), "q1".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyCnot, vec!["q0".to_string(), "q1".to_string()], "n0"));
        let (out, metrics) = SwapInsertionPass::new(topology, mapping).run(&circuit).unwrap();
        assert_eq!(metrics.swap_gates_added, 0);
        assert_eq!(out.instructions.len(), 1);
    }

    #[test]
    fn distant_gate_is_routed_with_swaps() {
        let topology = line_topology(4);
        let mut mapping = HashMap::new();
        mapping.insert("q0".to_string(), 0);
        mapping.insert("q1".to_string(), 1);
        mapping.insert("q2".to_string(), 2);
        mapping.insert("q3".to_string(), 3);
        let mut circuit = Circuit::new(vec!["q0".to_string(), "q1".to_string(), "q2".to_string(), "q3".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyCnot, vec!["q0".to_string(), "q3".to_string()], "n0"));
        let (out, metrics) = SwapInsertionPass::new(topology, mapping).run(&circuit).unwrap();
        assert_eq!(metrics.swap_gates_added, 2);
        assert_eq!(out.instructions.last().unwrap().op, Opcode::ApplyCnot);
        assert_eq!(out.instructions.last().unwrap().qubits, vec!["q0".to_string(), "q3".to_string()]);
    }
}
