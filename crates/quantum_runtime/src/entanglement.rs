// =============================================================================
// QMK - Entanglement Tracker (C4)
// =============================================================================
// Table of Contents:
//   1. EntanglementGroupId - Arena index, not a pointer (§9)
//   2. EntanglementGroup - Disjoint set of qubit ids plus a latched outcome
//   3. EntanglementTracker - Arena of groups and qubit membership
// =============================================================================
// Purpose: Multi-qubit entanglement groups with correlated measurement. The
//          tracker is internally single-threaded; external coordination across
//          concurrent jobs is the executor's responsibility (§5).
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// =============================================================================
// 1. EntanglementGroupId
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntanglementGroupId(u64);

// =============================================================================
// 2. EntanglementGroup
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntanglementGroup {
    pub id: EntanglementGroupId,
    pub qubits: HashSet<String>,
    pub latched_outcome: Option<bool>,
}

// =============================================================================
// 3. EntanglementTracker
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntanglementTracker {
    arena: HashMap<EntanglementGroupId, EntanglementGroup>,
    membership: HashMap<String, EntanglementGroupId>,
    next_id: u64,
}

impl EntanglementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_of(&self, qubit_id: &str) -> Option<&EntanglementGroup> {
        self.membership.get(qubit_id).and_then(|id| self.arena.get(id))
    }

    pub fn group_id_of(&self, qubit_id: &str) -> Option<EntanglementGroupId> {
        self.membership.get(qubit_id).copied()
    }

    /// Forms a new group from `qubit_ids`, or unions any existing groups its
    /// members already belong to, merging latched outcomes by adopting the
    /// first non-null (§4.4). Returns the resulting group's id.
    pub fn entangle(&mut self, qubit_ids: &[String]) -> EntanglementGroupId {
        let mut member_groups: Vec<EntanglementGroupId> = qubit_ids
            .iter()
            .filter_map(|q| self.membership.get(q).copied())
            .collect();
        member_groups.sort_by_key(|id| id.0);
        member_groups.dedup();

        let mut merged_qubits: HashSet<String> = qubit_ids.iter().cloned().collect();
        let mut merged_outcome: Option<bool> = None;
        for gid in &member_groups {
            if let Some(group) = self.arena.remove(gid) {
                merged_qubits.extend(group.qubits);
                if merged_outcome.is_none() {
                    merged_outcome = group.latched_outcome;
                }
            }
        }

        let id = EntanglementGroupId(self.next_id);
        self.next_id += 1;
        for q in &merged_qubits {
            self.membership.insert(q.clone(), id);
        }
        self.arena.insert(
            id,
            EntanglementGroup {
                id,
                qubits: merged_qubits,
                latched_outcome: merged_outcome,
            },
        );
        id
    }

    /// Latches `outcome` on `qubit_id`'s group if not already latched; returns
    /// the (possibly pre-existing) group outcome. Callers outside any group
    /// should not call this (pairwise / unentangled measurement takes its own
    /// path).
    pub fn latch(&mut self, qubit_id: &str, outcome: bool) -> Option<bool> {
        let gid = self.membership.get(qubit_id).copied()?;
        let group = self.arena.get_mut(&gid)?;
        if group.latched_outcome.is_none() {
            group.latched_outcome = Some(outcome);
        }
        group.latched_outcome
    }

    pub fn latched_outcome(&self, qubit_id: &str) -> Option<bool> {
        self.group_of(qubit_id).and_then(|g| g.latched_outcome)
    }

    /// Removes `qubit_id` from its group (post-measurement break, §4.4);
    /// garbage-collects the group if it becomes empty.
    pub fn break_entanglement(&mut self, qubit_id: &str) {
        let Some(gid) = self.membership.remove(qubit_id) else {
            return;
        };
        if let Some(group) = self.arena.get_mut(&gid) {
            group.qubits.remove(qubit_id);
            if group.qubits.is_empty() {
                self.arena.remove(&gid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entangle_creates_group_shared_by_members() {
        let mut t = EntanglementTracker::new();
        let gid = t.entangle(&["q0".to_string(), "q1".to_string()]);
        assert_eq!(t.group_id_of("q0"), Some(gid));
        assert_eq!(t.group_id_of("q1"), Some(gid));
    }

    #[test]
    fn latch_is_idempotent_and_shared() {
        let mut t = EntanglementTracker::new();
        t.entangle(&["q0".to_string(), "q1".to_string()]);
        assert_eq!(t.latch("q0", true), Some(true));
        assert_eq!(t.latch("q1", false), Some(true));
        assert_eq!(t.latched_outcome("q1"), Some(true));
    }

    #[test]
    fn union_of_two_groups_merges_outcome() {
        let mut t = EntanglementTracker::new();
        t.entangle(&["q0".to_string(), "q1".to_string()]);
        t.latch("q0", true);
        t.entangle(&["q2".to_string(), "q3".to_string()]);

        let merged = t.entangle(&["q1".to_string(), "q2".to_string()]);
        assert_eq!(t.group_id_of("q0"), Some(merged));
        assert_eq!(t.group_id_of("q3"), Some(merged));
        assert_eq!(t.latched_outcome("q3"), Some(true));
    }

    #[test]
    fn break_entanglement_garbage_collects_empty_group() {
        let mut t = EntanglementTracker::new();
        t.entangle(&["q0".to_string()]);
        t.break_entanglement("q0");
        assert_eq!(t.group_id_of("q0"), None);
    }
}
