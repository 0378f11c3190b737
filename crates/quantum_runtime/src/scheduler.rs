// =============================================================================
// QMK - Scheduler (C7, topological ordering half)
// =============================================================================
// Table of Contents:
//   1. DependencyGraph - explicit deps plus implicit qubit/event edges
//   2. topological_order - Kahn's algorithm, stable tie-break by node id
// =============================================================================
// Purpose: Orders nodes by Kahn's algorithm over the combined dependency graph
//          (explicit `deps`, plus qubit and event read-after-write /
//          write-after-read edges). Ties are broken by stable node-id order
//          so execution is deterministic given the same seed (§4.7, §5).
// =============================================================================

use crate::error::QmkError;
use crate::graph_ir::Program;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
struct DependencyGraph {
    edges: HashMap<String, BTreeSet<String>>,
    in_degree: BTreeMap<String, u32>,
}

impl DependencyGraph {
    fn add_node(&mut self, id: &str) {
        self.edges.entry(id.to_string()).or_default();
        self.in_degree.entry(id.to_string()).or_insert(0);
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let inserted = self.edges.entry(from.to_string()).or_default().insert(to.to_string());
        if inserted {
            *self.in_degree.entry(to.to_string()).or_insert(0) += 1;
        }
    }
}

fn build_dependency_graph(program: &Program) -> Result<DependencyGraph, QmkError> {
    let nodes = &program.nodes;
    let mut graph = DependencyGraph::default();
    for node in nodes {
        graph.add_node(&node.id);
    }

    for node in nodes {
        for dep in &node.deps {
            graph.add_edge(dep, &node.id);
        }
    }

    // Explicit wire-form dependency list (§6 `program.edges`): an optional
    // ordering constraint alongside per-node `deps`.
    if let Some(edges) = &program.edges {
        for edge in edges {
            graph.add_edge(&edge.from, &edge.to);
        }
    }

    // Implicit qubit edges: nodes sharing a qubit id are ordered by program
    // order for that qubit (read-after-write / write-after-read).
    let mut last_touch: HashMap<&str, &str> = HashMap::new();
    for node in nodes {
        for vq in &node.vqs {
            if let Some(prev) = last_touch.get(vq.as_str()) {
                graph.add_edge(prev, &node.id);
            }
            last_touch.insert(vq.as_str(), &node.id);
        }
    }

    // Implicit channel edges, same rule.
    let mut last_chan_touch: HashMap<&str, &str> = HashMap::new();
    for node in nodes {
        for ch in &node.chs {
            if let Some(prev) = last_chan_touch.get(ch.as_str()) {
                graph.add_edge(prev, &node.id);
            }
            last_chan_touch.insert(ch.as_str(), &node.id);
        }
    }

    // Implicit event edges: producer happens-before every consumer (reads via
    // `inputs` or a guard reference).
    let mut producer: HashMap<&str, &str> = HashMap::new();
    for node in nodes {
        for produced in &node.produces {
            producer.insert(produced.as_str(), &node.id);
        }
    }
    for node in nodes {
        let mut referenced: Vec<&str> = node.inputs.iter().map(|s| s.as_str()).collect();
        if let Some(guard) = &node.guard {
            collect_guard_events(guard, &mut referenced);
        }
        for event in referenced {
            if let Some(&prod_id) = producer.get(event) {
                graph.add_edge(prod_id, &node.id);
            }
        }
    }

    Ok(graph)
}

fn collect_guard_events<'a>(guard: &'a crate::graph_ir::Guard, out: &mut Vec<&'a str>) {
    use crate::graph_ir::Guard;
    match guard {
        Guard::Equality { event, .. } => out.push(event.as_str()),
        Guard::Compound { conditions, .. } => {
            for c in conditions {
                collect_guard_events(c, out);
            }
        }
    }
}

/// Kahn's algorithm: nodes with in-degree zero are ready; the lexically
/// smallest ready node id is always chosen next (stable tie-break, §4.7).
/// Orders over explicit per-node `deps`, the program's optional explicit
/// `edges` list (§6), and implicit qubit/channel/event RAW-WAR edges.
pub fn topological_order(program: &Program) -> Result<Vec<String>, QmkError> {
    let graph = build_dependency_graph(program)?;
    let mut in_degree = graph.in_degree.clone();
    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut order = Vec::with_capacity(program.nodes.len());
    while let Some(next) = ready.iter().next().cloned() {
        ready.remove(&next);
        order.push(next.clone());
        if let Some(successors) = graph.edges.get(&next) {
            for succ in successors {
                let deg = in_degree.get_mut(succ).expect("successor tracked in in_degree");
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(succ.clone());
                }
            }
        }
    }

    if order.len() != program.nodes.len() {
        return Err(QmkError::GraphCyclic);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_ir::{Edge, GraphNode, Opcode};

    fn node(id: &str, op: Opcode, vqs: &[&str], produces: &[&str], inputs: &[&str]) -> GraphNode {
        let mut n = GraphNode::new(id, op);
        n.vqs = vqs.iter().map(|s| s.to_string()).collect();
        n.produces = produces.iter().map(|s| s.to_string()).collect();
        n.inputs = inputs.iter().map(|s| s.to_string()).collect();
        n
    }

    fn program(nodes: Vec<GraphNode>) -> Program {
        Program { nodes, edges: None }
    }

    #[test]
    fn visits_each_node_exactly_once_and_respects_qubit_order() {
        let nodes = vec![
            node("h0", Opcode::ApplyH, &["q0"], &[], &[]),
            node("cx0", Opcode::ApplyCnot, &["q0", "q1"], &[], &[]),
            node("m0", Opcode::MeasureZ, &["q0"], &["m0"], &[]),
        ];
        let order = topological_order(&program(nodes)).unwrap();
        assert_eq!(order.len(), 3);
        assert!(order.iter().position(|x| x == "h0") < order.iter().position(|x| x == "cx0"));
        assert!(order.iter().position(|x| x == "cx0") < order.iter().position(|x| x == "m0"));
    }

    #[test]
    fn event_dependency_orders_consumer_after_producer() {
        let mut cond_node = node("px", Opcode::CondPauli, &["q0"], &[], &[]);
        cond_node.guard = Some(crate::graph_ir::Guard::Equality {
            event: "m0".to_string(),
            equals: 1,
        });
        let nodes = vec![
            node("m0", Opcode::MeasureZ, &["q1"], &["m0"], &[]),
            cond_node,
        ];
        let order = topological_order(&program(nodes)).unwrap();
        assert_eq!(order, vec!["m0".to_string(), "px".to_string()]);
    }

    #[test]
    fn cyclic_explicit_deps_fail() {
        let mut a = node("a", Opcode::ApplyH, &["q0"], &[], &[]);
        a.deps.push("b".to_string());
        let mut b = node("b", Opcode::ApplyX, &["q1"], &[], &[]);
        b.deps.push("a".to_string());
        let err = topological_order(&program(vec![a, b])).unwrap_err();
        assert!(matches!(err, QmkError::GraphCyclic));
    }

    #[test]
    fn independent_nodes_tie_break_by_id() {
        let nodes = vec![
            node("z_node", Opcode::ApplyH, &["q0"], &[], &[]),
            node("a_node", Opcode::ApplyH, &["q1"], &[], &[]),
        ];
        let order = topological_order(&program(nodes)).unwrap();
        assert_eq!(order, vec!["a_node".to_string(), "z_node".to_string()]);
    }

    #[test]
    fn explicit_program_edges_order_independent_nodes() {
        let nodes = vec![
            node("a_node", Opcode::ApplyH, &["q0"], &[], &[]),
            node("z_node", Opcode::ApplyH, &["q1"], &[], &[]),
        ];
        let mut prog = program(nodes);
        prog.edges = Some(vec![Edge {
            from: "z_node".to_string(),
            to: "a_node".to_string(),
        }]);
        let order = topological_order(&prog).unwrap();
        assert_eq!(order, vec!["z_node".to_string(), "a_node".to_string()]);
    }

    #[test]
    fn explicit_program_edges_creating_a_cycle_fail() {
        let nodes = vec![
            node("a", Opcode::ApplyH, &["q0"], &[], &[]),
            node("b", Opcode::ApplyH, &["q1"], &[], &[]),
        ];
        let mut a_to_b = program(nodes);
        a_to_b.edges = Some(vec![
            Edge { from: "a".to_string(), to: "b".to_string() },
            Edge { from: "b".to_string(), to: "a".to_string() },
        ]);
        let err = topological_order(&a_to_b).unwrap_err();
        assert!(matches!(err, QmkError::GraphCyclic));
    }
}
