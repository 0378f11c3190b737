// =============================================================================
// QMK - Executor (C7, dispatch half)
// =============================================================================
// Table of Contents:
//   1. ExecutionStatus / ExecutionLogEntry / ExecutionResult
//   2. Guard evaluation
//   3. Capability check
//   4. execute() - dispatch loop
// =============================================================================
// Purpose: Consumes a graph and a granted capability set, checks capabilities
//          and guards per node, and dispatches opcodes into the resource
//          manager (§4.7). Single-threaded cooperative: no gate dispatch runs
//          concurrently with another on the same Resource Manager (§5).
// =============================================================================

use crate::error::{QmkError, WireError};
use crate::graph_ir::{Graph, GraphNode, Guard, GuardCompoundType, Opcode};
use crate::logical_qubit::{RotationAxis, SingleQubitGate};
use crate::qec_profile::QecProfile;
use crate::resource_manager::{ResourceManager, Telemetry};
use crate::scheduler::topological_order;
use kernel_services::capability::{Capability, CapabilitySet};
use kernel_services::task::CancelFlag;
use std::collections::HashMap;
use tracing::{info, warn};

// =============================================================================
// 1. ExecutionStatus / ExecutionLogEntry / ExecutionResult
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ExecutionLogEntry {
    pub node_id: String,
    pub op: Opcode,
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub events: HashMap<String, u8>,
    pub telemetry: Option<Telemetry>,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub error: Option<WireError>,
}

// =============================================================================
// 2. Guard evaluation
// =============================================================================

pub(crate) fn eval_guard(guard: &Guard, events: &HashMap<String, u8>) -> Result<bool, QmkError> {
    match guard {
        Guard::Equality { event, equals } => {
            let value = events
                .get(event)
                .ok_or_else(|| QmkError::EventNotProduced(event.clone()))?;
            Ok(*value == *equals)
        }
        Guard::Compound { r#type, conditions } => match r#type {
            GuardCompoundType::And => {
                for c in conditions {
                    if !eval_guard(c, events)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            GuardCompoundType::Or => {
                for c in conditions {
                    if eval_guard(c, events)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },
    }
}

// =============================================================================
// 3. Capability check
// =============================================================================

fn available_capabilities(graph: &Graph, node: &GraphNode, granted: &CapabilitySet) -> CapabilitySet {
    let mut set = granted.clone();
    for cap in graph.caps.iter().chain(node.caps.iter()) {
        set.grant(Capability::new(cap.clone()));
    }
    set
}

pub(crate) fn check_capabilities(graph: &Graph, node: &GraphNode, granted: &CapabilitySet) -> Result<(), QmkError> {
    let required: Vec<Capability> = node.op.required_capabilities().iter().map(|c| Capability::new(*c)).collect();
    if required.is_empty() {
        return Ok(());
    }
    let available = available_capabilities(graph, node, granted);
    if !available.satisfies(&required) {
        return Err(QmkError::CapabilityDenied {
            node_id: node.id.clone(),
            required: required.iter().map(|c| c.as_str().to_string()).collect(),
            granted: available.iter().map(|c| c.as_str().to_string()).collect(),
        });
    }
    Ok(())
}

// =============================================================================
// 4. execute() - dispatch loop
// =============================================================================

fn emit_event(events: &mut HashMap<String, u8>, name: &str, value: u8) -> Result<(), QmkError> {
    if events.insert(name.to_string(), value).is_some() {
        return Err(QmkError::EventDoubleAssigned(name.to_string()));
    }
    Ok(())
}

fn single_qubit_gate_for(op: Opcode) -> Option<SingleQubitGate> {
    match op {
        Opcode::ApplyH => Some(SingleQubitGate::H),
        Opcode::ApplyX => Some(SingleQubitGate::X),
        Opcode::ApplyY => Some(SingleQubitGate::Y),
        Opcode::ApplyZ => Some(SingleQubitGate::Z),
        Opcode::ApplyS => Some(SingleQubitGate::S),
        Opcode::ApplyT => Some(SingleQubitGate::T),
        _ => None,
    }
}

fn rotation_axis_for(op: Opcode) -> Option<RotationAxis> {
    match op {
        Opcode::ApplyRx => Some(RotationAxis::X),
        Opcode::ApplyRy => Some(RotationAxis::Y),
        Opcode::ApplyRz => Some(RotationAxis::Z),
        _ => None,
    }
}

pub(crate) fn dispatch_node(
    node: &GraphNode,
    rm: &mut ResourceManager,
    events: &mut HashMap<String, u8>,
) -> Result<(), QmkError> {
    match node.op {
        Opcode::AllocLq => {
            let profile_str = node.arg_str("profile").ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "ALLOC_LQ requires a 'profile' argument".into(),
            })?;
            let profile: QecProfile = QecProfile::parse_profile_string(profile_str)?;
            rm.alloc(&node.vqs, profile)?;
            Ok(())
        }
        Opcode::FreeLq => {
            rm.free(&node.vqs);
            Ok(())
        }
        op if single_qubit_gate_for(op).is_some() => {
            let gate = single_qubit_gate_for(op).unwrap();
            let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "single-qubit gate requires one vq".into(),
            })?;
            rm.with_qubit_mut(id, |q| {
                let now = q.current_time_us;
                q.apply_single_gate(gate, now);
            })?;
            Ok(())
        }
        op if rotation_axis_for(op).is_some() => {
            let axis = rotation_axis_for(op).unwrap();
            let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "rotation gate requires one vq".into(),
            })?;
            let theta = node.arg_f64("theta").ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "rotation gate requires a 'theta' argument".into(),
            })?;
            rm.with_qubit_mut(id, |q| {
                let now = q.current_time_us;
                q.apply_rotation(axis, theta, now);
            })?;
            Ok(())
        }
        Opcode::ApplyCnot | Opcode::ApplyCz | Opcode::ApplySwap | Opcode::TeleportCnot => {
            let (a, b) = two_qubit_operands(node)?;
            rm.with_two_qubits_mut(a, b, |qa, qb, tracker| {
                let now = qa.current_time_us.max(qb.current_time_us);
                match node.op {
                    Opcode::ApplyCnot | Opcode::TeleportCnot => crate::logical_qubit::apply_cnot(qa, qb, tracker, now),
                    Opcode::ApplyCz => crate::logical_qubit::apply_cz(qa, qb, tracker, now),
                    Opcode::ApplySwap => crate::logical_qubit::apply_swap(qa, qb, tracker, now),
                    _ => unreachable!(),
                }
            })?;
            Ok(())
        }
        Opcode::MeasureZ | Opcode::MeasureX | Opcode::MeasureY => {
            if node.produces.len() != 1 {
                return Err(QmkError::MeasurementArity(format!(
                    "{} requires exactly one produced event, found {}",
                    node.op.as_str(),
                    node.produces.len()
                )));
            }
            let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "measurement requires one vq".into(),
            })?;
            let outcome = rm.with_qubit_and_tracker_mut(id, |q, tracker| {
                let now = q.current_time_us;
                match node.op {
                    Opcode::MeasureZ => q.measure_z(tracker, now),
                    Opcode::MeasureX => q.measure_x(tracker, now),
                    Opcode::MeasureY => q.measure_y(tracker, now),
                    _ => unreachable!(),
                }
            })?;
            emit_event(events, &node.produces[0], outcome as u8)
        }
        Opcode::MeasureBell => {
            let (a, b) = two_qubit_operands(node)?;
            let (ma, mb, index) = rm.with_two_qubits_mut(a, b, |qa, qb, tracker| {
                let now = qa.current_time_us.max(qb.current_time_us);
                crate::logical_qubit::measure_bell(qa, qb, tracker, now)
            })?;
            match node.produces.len() {
                2 => {
                    emit_event(events, &node.produces[0], ma as u8)?;
                    emit_event(events, &node.produces[1], mb as u8)
                }
                1 => emit_event(events, &node.produces[0], index),
                other => Err(QmkError::MeasurementArity(format!(
                    "MEASURE_BELL requires one or two produced events, found {other}"
                ))),
            }
        }
        Opcode::Reset => {
            let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "RESET requires one vq".into(),
            })?;
            rm.with_qubit_and_tracker_mut(id, |q, tracker| {
                let now = q.current_time_us;
                q.reset(tracker, now);
            })?;
            Ok(())
        }
        Opcode::CondPauli => {
            let event_name = node.inputs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "COND_PAULI requires one input event".into(),
            })?;
            let event_value = events
                .get(event_name)
                .ok_or_else(|| QmkError::EventNotProduced(event_name.clone()))?;
            if *event_value == 1 {
                let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                    location: node.id.clone(),
                    message: "COND_PAULI requires one vq".into(),
                })?;
                let mask = node.arg_str("pauli").unwrap_or("X");
                let gate = match mask {
                    "X" => SingleQubitGate::X,
                    "Y" => SingleQubitGate::Y,
                    "Z" => SingleQubitGate::Z,
                    other => {
                        return Err(QmkError::ParseError {
                            location: node.id.clone(),
                            message: format!("unknown Pauli mask '{other}'"),
                        })
                    }
                };
                rm.with_qubit_mut(id, |q| {
                    let now = q.current_time_us;
                    q.apply_single_gate(gate, now);
                })?;
            }
            Ok(())
        }
        Opcode::OpenChan => {
            let channel_id = node.chs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "OPEN_CHAN requires one channel id".into(),
            })?;
            let (a, b) = two_qubit_operands(node)?;
            let fidelity = node.arg_f64("fidelity").unwrap_or(0.99);
            rm.open_channel(channel_id.clone(), a.to_string(), b.to_string(), fidelity)
        }
        Opcode::CloseChan => {
            let channel_id = node.chs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "CLOSE_CHAN requires one channel id".into(),
            })?;
            rm.close_channel(channel_id);
            Ok(())
        }
        Opcode::InjectTState => {
            let id = node.vqs.first().ok_or_else(|| QmkError::ParseError {
                location: node.id.clone(),
                message: "INJECT_T_STATE requires one vq".into(),
            })?;
            rm.with_qubit_mut(id, |q| {
                let now = q.current_time_us;
                q.apply_single_gate(SingleQubitGate::T, now);
            })?;
            Ok(())
        }
        Opcode::FenceEpoch | Opcode::BarRegion | Opcode::SetPolicy => Ok(()),
        Opcode::ApplyH
        | Opcode::ApplyX
        | Opcode::ApplyY
        | Opcode::ApplyZ
        | Opcode::ApplyS
        | Opcode::ApplyT
        | Opcode::ApplyRx
        | Opcode::ApplyRy
        | Opcode::ApplyRz => unreachable!("covered by single_qubit_gate_for/rotation_axis_for guards above"),
    }
}

fn two_qubit_operands(node: &GraphNode) -> Result<(&str, &str), QmkError> {
    if node.vqs.len() < 2 {
        return Err(QmkError::ParseError {
            location: node.id.clone(),
            message: format!("{} requires two vqs", node.op.as_str()),
        });
    }
    Ok((node.vqs[0].as_str(), node.vqs[1].as_str()))
}

/// Runs `graph` to completion against `rm` under `granted` capabilities.
/// Deterministic given identical graph, capabilities, and resource-manager
/// seed (§4.7 Determinism).
pub fn execute(graph: &Graph, granted: &CapabilitySet, rm: &mut ResourceManager, cancel: &CancelFlag) -> ExecutionResult {
    let order = match topological_order(&graph.program) {
        Ok(order) => order,
        Err(err) => {
            return ExecutionResult {
                status: ExecutionStatus::Failed,
                events: HashMap::new(),
                telemetry: None,
                execution_log: Vec::new(),
                error: Some(err.to_wire()),
            }
        }
    };
    let by_id: HashMap<&str, &GraphNode> = graph.program.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut events = HashMap::new();
    let mut log = Vec::with_capacity(order.len());

    for node_id in &order {
        if cancel.is_cancelled() {
            warn!(node_id, "execution cancelled at node boundary");
            return ExecutionResult {
                status: ExecutionStatus::Cancelled,
                events,
                telemetry: Some(rm.telemetry()),
                execution_log: log,
                error: None,
            };
        }
        let node = by_id[node_id.as_str()];

        if let Err(err) = check_capabilities(graph, node, granted) {
            return ExecutionResult {
                status: ExecutionStatus::Failed,
                events,
                telemetry: Some(rm.telemetry()),
                execution_log: log,
                error: Some(err.to_wire()),
            };
        }

        let runs = match &node.guard {
            Some(guard) => match eval_guard(guard, &events) {
                Ok(runs) => runs,
                Err(err) => {
                    return ExecutionResult {
                        status: ExecutionStatus::Failed,
                        events,
                        telemetry: Some(rm.telemetry()),
                        execution_log: log,
                        error: Some(err.to_wire()),
                    }
                }
            },
            None => true,
        };

        if !runs {
            log.push(ExecutionLogEntry {
                node_id: node.id.clone(),
                op: node.op,
                skipped: true,
            });
            continue;
        }

        if let Err(err) = dispatch_node(node, rm, &mut events) {
            return ExecutionResult {
                status: ExecutionStatus::Failed,
                events,
                telemetry: Some(rm.telemetry()),
                execution_log: log,
                error: Some(err.to_wire()),
            };
        }
        log.push(ExecutionLogEntry {
            node_id: node.id.clone(),
            op: node.op,
            skipped: false,
        });
    }

    info!(nodes = order.len(), "graph execution completed");
    ExecutionResult {
        status: ExecutionStatus::Completed,
        events,
        telemetry: Some(rm.telemetry()),
        execution_log: log,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn caps_all() -> CapabilitySet {
        CapabilitySet::from_tokens([
            Capability::ALLOC,
            Capability::LINK,
            Capability::TELEPORT,
            Capability::MAGIC,
        ])
    }

    #[test]
    fn bell_state_scenario_produces_agreeing_outcomes() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q0 -> m0
m1: MEASURE_Z q1 -> m1
f0: FREE_LQ q0 q1
";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 42);
        let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.events["m0"], result.events["m1"]);
        assert_eq!(result.telemetry.unwrap().resource_usage.physical_qubits_used, 0);
    }

    /// §6: `program.edges` is an explicit dependency list alongside per-node
    /// `deps`; the executor must respect it even when no qubit/event edge
    /// would otherwise order the two nodes.
    #[test]
    fn explicit_program_edges_are_respected_by_the_dispatch_order() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
a_node: APPLY_H q0
z_node: APPLY_H q1
f0: FREE_LQ q0 q1
";
        let mut graph = assemble(text).unwrap();
        graph.program.edges = Some(vec![crate::graph_ir::Edge {
            from: "z_node".to_string(),
            to: "a_node".to_string(),
        }]);

        let mut rm = ResourceManager::new(1000, 42);
        let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);

        let pos = |id: &str| result.execution_log.iter().position(|e| e.node_id == id).unwrap();
        assert!(pos("z_node") < pos("a_node"));
    }

    #[test]
    fn missing_capability_fails_alloc() {
        let text = "a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let result = execute(&graph, &CapabilitySet::new(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.unwrap().code, "CAPABILITY_DENIED");
    }

    #[test]
    fn guard_skips_node_when_false() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
h1: APPLY_H q1
cx0: APPLY_CNOT q0 q1
m0: MEASURE_Z q1 -> s
px0: APPLY_X q0 if s==1
h2: APPLY_H q0
m1: MEASURE_Z q0 -> r
f0: FREE_LQ q0 q1
";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 7);
        let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.events.contains_key("r"));
    }

    #[test]
    fn cancellation_before_any_node_reports_cancelled() {
        let text = "a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = execute(&graph, &caps_all(), &mut rm, &cancel);
        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert!(!rm.is_live("q0"));
    }

    #[test]
    fn unknown_event_guard_fails() {
        let text = "px0: COND_PAULI q0 ev0 if ev0==1\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.unwrap().code, "EVENT_NOT_PRODUCED");
    }

    #[test]
    fn bell_measurement_with_index_arity() {
        let text = "\
a0: ALLOC_LQ q0 q1 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
cx0: APPLY_CNOT q0 q1
mb: MEASURE_BELL q0 q1 -> idx
";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 3);
        let result = execute(&graph, &caps_all(), &mut rm, &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.events["idx"] <= 3);
    }
}
