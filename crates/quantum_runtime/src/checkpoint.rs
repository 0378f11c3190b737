// =============================================================================
// QMK - Checkpoint Store (C11)
// =============================================================================
// Table of Contents:
//   1. Checkpoint
//   2. CheckpointStore - snapshot/restore, LRU eviction
// =============================================================================
// Purpose: Snapshots the observable state of every live logical qubit and
//          restores it in place, with bounded storage via LRU eviction
//          beyond `max_checkpoints` (§4.10).
// =============================================================================

use crate::error::QmkError;
use crate::logical_qubit::LogicalQubit;
use crate::resource_manager::ResourceManager;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

// =============================================================================
// 1. Checkpoint
// =============================================================================

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: String,
    pub job_id: String,
    pub epoch: u64,
    pub node_id: String,
    pub qubit_states: HashMap<String, LogicalQubit>,
    pub classical_registers: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
    pub created_at: u64,
}

// =============================================================================
// 2. CheckpointStore
// =============================================================================

pub struct CheckpointStore {
    max_checkpoints: usize,
    checkpoints: HashMap<String, Checkpoint>,
    /// Least-recently-used order, most recent at the back.
    recency: VecDeque<String>,
}

impl CheckpointStore {
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            max_checkpoints,
            checkpoints: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    /// Snapshots every live qubit on `rm` plus the supplied classical
    /// register state, evicting the least-recently-touched checkpoint if
    /// storage is at capacity (§4.10).
    pub fn snapshot(
        &mut self,
        id: impl Into<String>,
        job_id: impl Into<String>,
        epoch: u64,
        node_id: impl Into<String>,
        rm: &ResourceManager,
        classical_registers: HashMap<String, Value>,
        created_at: u64,
    ) -> String {
        let id = id.into();
        let checkpoint = Checkpoint {
            id: id.clone(),
            job_id: job_id.into(),
            epoch,
            node_id: node_id.into(),
            qubit_states: rm.snapshot_live_qubits(),
            classical_registers,
            metadata: HashMap::new(),
            created_at,
        };
        self.insert(checkpoint);
        id
    }

    fn insert(&mut self, checkpoint: Checkpoint) {
        if self.checkpoints.contains_key(&checkpoint.id) {
            self.touch(&checkpoint.id);
        } else {
            if self.checkpoints.len() >= self.max_checkpoints {
                if let Some(evicted) = self.recency.pop_front() {
                    self.checkpoints.remove(&evicted);
                }
            }
            self.recency.push_back(checkpoint.id.clone());
        }
        self.checkpoints.insert(checkpoint.id.clone(), checkpoint);
    }

    fn touch(&mut self, id: &str) {
        if let Some(pos) = self.recency.iter().position(|existing| existing == id) {
            let entry = self.recency.remove(pos).unwrap();
            self.recency.push_back(entry);
        }
    }

    pub fn get(&mut self, id: &str) -> Option<&Checkpoint> {
        if self.checkpoints.contains_key(id) {
            self.touch(id);
        }
        self.checkpoints.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Restores the snapshotted qubits' state in place on `rm`; qubits
    /// allocated after the snapshot are left untouched (§4.10).
    pub fn restore(&mut self, id: &str, rm: &ResourceManager) -> Result<(), QmkError> {
        let checkpoint = self.get(id).ok_or_else(|| QmkError::CheckpointNotFound(id.to_string()))?;
        rm.restore_qubits(&checkpoint.qubit_states);
        Ok(())
    }
}
