// =============================================================================
// QMK - Migration (C11)
// =============================================================================
// Table of Contents:
//   1. MigrationPoint / find_migration_points
//   2. MigrationRecord - lifecycle and validation
// =============================================================================
// Purpose: Identifies graph points where execution may hand off between
//          contexts, and drives the checkpoint-based migration lifecycle
//          (§4.10).
// =============================================================================

use crate::checkpoint::CheckpointStore;
use crate::error::QmkError;
use crate::graph_ir::{GraphNode, Opcode};
use crate::resource_manager::ResourceManager;
use std::collections::HashSet;

// =============================================================================
// 1. MigrationPoint
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPoint {
    pub node_id: String,
    pub epoch: u64,
    pub is_fence: bool,
    pub qubits_live: Vec<String>,
    pub can_migrate: bool,
    pub reason: Option<String>,
}

/// Scans the graph for migration points: `FENCE_EPOCH` (always a migration
/// point), measurements (natural boundary), and `FREE_LQ`/`CLOSE_CHAN`
/// (§4.10). `qubits_live` is tracked by a running alloc/free pass over the
/// node list in its given order.
pub fn find_migration_points(nodes: &[GraphNode]) -> Vec<MigrationPoint> {
    let mut live: HashSet<String> = HashSet::new();
    let mut epoch = 0u64;
    let mut points = Vec::new();

    for node in nodes {
        match node.op {
            Opcode::AllocLq => {
                live.extend(node.vqs.iter().cloned());
            }
            Opcode::FenceEpoch => {
                epoch += 1;
                points.push(MigrationPoint {
                    node_id: node.id.clone(),
                    epoch,
                    is_fence: true,
                    qubits_live: sorted(&live),
                    can_migrate: true,
                    reason: None,
                });
            }
            Opcode::MeasureZ | Opcode::MeasureX | Opcode::MeasureY | Opcode::MeasureBell => {
                points.push(MigrationPoint {
                    node_id: node.id.clone(),
                    epoch,
                    is_fence: false,
                    qubits_live: sorted(&live),
                    can_migrate: true,
                    reason: None,
                });
            }
            Opcode::FreeLq => {
                points.push(MigrationPoint {
                    node_id: node.id.clone(),
                    epoch,
                    is_fence: false,
                    qubits_live: sorted(&live),
                    can_migrate: true,
                    reason: None,
                });
                for vq in &node.vqs {
                    live.remove(vq);
                }
            }
            Opcode::CloseChan => {
                points.push(MigrationPoint {
                    node_id: node.id.clone(),
                    epoch,
                    is_fence: false,
                    qubits_live: sorted(&live),
                    can_migrate: true,
                    reason: None,
                });
            }
            _ => {}
        }
    }
    points
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = set.iter().cloned().collect();
    v.sort();
    v
}

// =============================================================================
// 2. MigrationRecord
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub id: String,
    pub job_id: String,
    pub from_ctx: String,
    pub to_ctx: String,
    pub checkpoint_id: String,
    pub migration_point: MigrationPoint,
    pub started_at: u64,
    pub completed_at: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}

impl MigrationRecord {
    /// Initiates a migration: checkpoints the current state against `rm`
    /// under `checkpoint_id` and records the attempt as in-flight (§4.10).
    pub fn initiate(
        id: impl Into<String>,
        job_id: impl Into<String>,
        from_ctx: impl Into<String>,
        to_ctx: impl Into<String>,
        checkpoint_id: impl Into<String>,
        migration_point: MigrationPoint,
        store: &mut CheckpointStore,
        rm: &ResourceManager,
        now: u64,
    ) -> Self {
        let checkpoint_id = checkpoint_id.into();
        let job_id = job_id.into();
        store.snapshot(checkpoint_id.clone(), job_id.clone(), migration_point.epoch, migration_point.node_id.clone(), rm, Default::default(), now);
        Self {
            id: id.into(),
            job_id,
            from_ctx: from_ctx.into(),
            to_ctx: to_ctx.into(),
            checkpoint_id,
            migration_point,
            started_at: now,
            completed_at: None,
            success: false,
            error: None,
        }
    }

    /// Rehydrates in the destination context by restoring from the
    /// checkpoint, after validating that it still exists and that the live
    /// qubit set on `rm` matches the recorded set (§4.10).
    pub fn complete(&mut self, store: &mut CheckpointStore, rm: &ResourceManager, now: u64) -> Result<(), QmkError> {
        if let Err(err) = self.validate(rm, store) {
            self.fail(now, err.to_string());
            return Err(err);
        }
        if let Err(err) = store.restore(&self.checkpoint_id, rm) {
            self.fail(now, err.to_string());
            return Err(err);
        }
        self.completed_at = Some(now);
        self.success = true;
        Ok(())
    }

    fn validate(&self, rm: &ResourceManager, store: &mut CheckpointStore) -> Result<(), QmkError> {
        if !store.contains(&self.checkpoint_id) {
            return Err(QmkError::CheckpointNotFound(self.checkpoint_id.clone()));
        }
        let mut live: Vec<String> = self
            .migration_point
            .qubits_live
            .iter()
            .filter(|q| rm.is_live(q))
            .cloned()
            .collect();
        live.sort();
        if live != self.migration_point.qubits_live {
            return Err(QmkError::MigrationCannotProceed(format!(
                "live qubit set changed since migration point {}",
                self.migration_point.node_id
            )));
        }
        Ok(())
    }

    fn fail(&mut self, now: u64, error: String) {
        self.completed_at = Some(now);
        self.success = false;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qec_profile::{CodeFamily, QecProfile};

    fn node(id: &str, op: Opcode, vqs: &[&str]) -> GraphNode {
        let mut n = GraphNode::new(id, op);
        n.vqs = vqs.iter().map(|s| s.to_string()).collect();
        n
    }

    #[test]
    fn fence_epoch_is_always_a_migration_point() {
        let nodes = vec![node("a0", Opcode::AllocLq, &["q0"]), node("f0", Opcode::FenceEpoch, &[])];
        let points = find_migration_points(&nodes);
        assert_eq!(points.len(), 1);
        assert!(points[0].is_fence);
        assert_eq!(points[0].qubits_live, vec!["q0".to_string()]);
    }

    #[test]
    fn free_lq_removes_qubit_from_subsequent_points() {
        let nodes = vec![
            node("a0", Opcode::AllocLq, &["q0", "q1"]),
            node("free0", Opcode::FreeLq, &["q0"]),
            node("f0", Opcode::FenceEpoch, &[]),
        ];
        let points = find_migration_points(&nodes);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].qubits_live, vec!["q1".to_string()]);
    }

    #[test]
    fn migration_completes_when_live_set_is_unchanged() {
        let mut rm = ResourceManager::new(100, 1);
        rm.alloc(&["q0".to_string()], QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap())
            .unwrap();
        let mut store = CheckpointStore::new(4);
        let point = MigrationPoint {
            node_id: "f0".to_string(),
            epoch: 1,
            is_fence: true,
            qubits_live: vec!["q0".to_string()],
            can_migrate: true,
            reason: None,
        };
        let mut record = MigrationRecord::initiate("mig0", "job0", "ctx_a", "ctx_b", "cp0", point, &mut store, &rm, 0);
        record.complete(&mut store, &rm, 10).unwrap();
        assert!(record.success);
        assert_eq!(record.completed_at, Some(10));
    }

    #[test]
    fn migration_fails_when_live_set_changed() {
        let mut rm = ResourceManager::new(100, 1);
        rm.alloc(&["q0".to_string()], QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap())
            .unwrap();
        let mut store = CheckpointStore::new(4);
        let point = MigrationPoint {
            node_id: "f0".to_string(),
            epoch: 1,
            is_fence: true,
            qubits_live: vec!["q0".to_string()],
            can_migrate: true,
            reason: None,
        };
        let mut record = MigrationRecord::initiate("mig0", "job0", "ctx_a", "ctx_b", "cp0", point, &mut store, &rm, 0);
        rm.free(&["q0".to_string()]);
        let err = record.complete(&mut store, &rm, 10).unwrap_err();
        assert!(matches!(err, QmkError::MigrationCannotProceed(_)));
        assert!(!record.success);
    }
}
