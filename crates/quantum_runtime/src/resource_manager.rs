// =============================================================================
// QMK - Resource Manager (C5)
// =============================================================================
// Table of Contents:
//   1. Channel
//   2. Telemetry types
//   3. ResourceManager - allocation, channels, clock, telemetry
// =============================================================================
// Purpose: Allocates/frees logical qubits and channels against a physical
//          budget. Logical Qubits are owned exclusively here (§5); all other
//          components borrow them through this manager.
// =============================================================================

use crate::entanglement::EntanglementTracker;
use crate::error::QmkError;
use crate::logical_qubit::LogicalQubit;
use crate::qec_profile::QecProfile;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// 1. Channel
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub endpoint_a: String,
    pub endpoint_b: String,
    pub target_fidelity: f64,
    pub usage_count: u64,
}

// =============================================================================
// 2. Telemetry types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub logical_qubits_allocated: u64,
    pub physical_qubits_used: u64,
    pub physical_qubits_available: u64,
    pub utilization: f64,
    pub channels_open: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    pub depolarizing: u64,
    pub coherence: u64,
    pub measurement: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QubitTelemetry {
    pub profile: String,
    pub distance: u32,
    pub physical_qubits: u32,
    pub gate_count: u64,
    pub measurement_count: u64,
    pub decoder_cycles: u64,
    pub correction_count: u64,
    pub syndrome_weight: u32,
    pub error_breakdown: ErrorBreakdown,
    pub logical_error_rate: f64,
    pub total_time_us: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTelemetry {
    pub endpoint_a: String,
    pub endpoint_b: String,
    pub target_fidelity: f64,
    pub usage_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub resource_usage: ResourceUsage,
    pub qubits: HashMap<String, QubitTelemetry>,
    pub channels: HashMap<String, ChannelTelemetry>,
    pub simulation_time_us: f64,
}

// =============================================================================
// 3. ResourceManager
// =============================================================================

pub struct ResourceManager {
    physical_qubit_budget: u64,
    physical_qubits_used: u64,
    qubits: RwLock<HashMap<String, LogicalQubit>>,
    channels: RwLock<HashMap<String, Channel>>,
    tracker: RwLock<EntanglementTracker>,
    simulation_time_us: RwLock<f64>,
    base_seed: u64,
    allocation_counter: RwLock<u64>,
}

impl ResourceManager {
    pub fn new(physical_qubit_budget: u64, base_seed: u64) -> Self {
        Self {
            physical_qubit_budget,
            physical_qubits_used: 0,
            qubits: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
            tracker: RwLock::new(EntanglementTracker::new()),
            simulation_time_us: RwLock::new(0.0),
            base_seed,
            allocation_counter: RwLock::new(0),
        }
    }

    /// Derives a distinct per-qubit seed so identical `(seed, schedule)` pairs
    /// remain bit-exact (§4.2 Determinism). A splitmix-style mix of the base
    /// seed, the qubit id, and an allocation counter.
    fn derive_seed(&self, qubit_id: &str) -> u64 {
        let mut counter = self.allocation_counter.write();
        *counter = counter.wrapping_add(1);
        let mut hash = self.base_seed ^ (*counter).wrapping_mul(0x9E3779B97F4A7C15);
        for byte in qubit_id.bytes() {
            hash = hash.wrapping_mul(0x100000001B3).wrapping_add(byte as u64);
        }
        hash ^= hash >> 33;
        hash = hash.wrapping_mul(0xFF51AFD7ED558CCD);
        hash ^= hash >> 33;
        hash
    }

    pub fn alloc(&mut self, ids: &[String], profile: QecProfile) -> Result<Vec<u32>, QmkError> {
        let profile = Arc::new(profile);
        let required: u64 = profile.physical_qubit_count as u64 * ids.len() as u64;
        if self.physical_qubits_used + required > self.physical_qubit_budget {
            return Err(QmkError::QuotaExceeded {
                requested: required,
                budget: self.physical_qubit_budget,
                used: self.physical_qubits_used,
            });
        }
        let mut qubits = self.qubits.write();
        for id in ids {
            if qubits.contains_key(id) {
                return Err(QmkError::IdTaken(id.clone()));
            }
        }
        let mut per_qubit_counts = Vec::with_capacity(ids.len());
        for id in ids {
            let seed = self.derive_seed(id);
            qubits.insert(id.clone(), LogicalQubit::new(id.clone(), profile.clone(), seed));
            per_qubit_counts.push(profile.physical_qubit_count);
        }
        self.physical_qubits_used += required;
        debug!(count = ids.len(), profile = profile.family.tag(), "allocated logical qubits");
        Ok(per_qubit_counts)
    }

    pub fn free(&mut self, ids: &[String]) {
        let mut qubits = self.qubits.write();
        let mut tracker = self.tracker.write();
        for id in ids {
            if let Some(qubit) = qubits.remove(id) {
                tracker.break_entanglement(id);
                self.physical_qubits_used -= qubit.profile.physical_qubit_count as u64;
            }
        }
    }

    pub fn open_channel(
        &mut self,
        channel_id: String,
        endpoint_a: String,
        endpoint_b: String,
        target_fidelity: f64,
    ) -> Result<(), QmkError> {
        let mut channels = self.channels.write();
        if channels.contains_key(&channel_id) {
            return Err(QmkError::IdTaken(channel_id));
        }
        let qubits = self.qubits.read();
        if !qubits.contains_key(&endpoint_a) {
            return Err(QmkError::IdNotLive(endpoint_a));
        }
        if !qubits.contains_key(&endpoint_b) {
            return Err(QmkError::IdNotLive(endpoint_b));
        }
        channels.insert(
            channel_id.clone(),
            Channel {
                id: channel_id,
                endpoint_a,
                endpoint_b,
                target_fidelity,
                usage_count: 0,
            },
        );
        Ok(())
    }

    pub fn close_channel(&mut self, channel_id: &str) {
        if self.channels.write().remove(channel_id).is_none() {
            warn!(channel_id, "close_channel on unknown channel ignored");
        }
    }

    pub fn advance_time(&mut self, delta_us: f64) {
        *self.simulation_time_us.write() += delta_us;
    }

    pub fn is_live(&self, qubit_id: &str) -> bool {
        self.qubits.read().contains_key(qubit_id)
    }

    pub fn with_qubit_mut<R>(&self, id: &str, f: impl FnOnce(&mut LogicalQubit) -> R) -> Result<R, QmkError> {
        let mut qubits = self.qubits.write();
        let qubit = qubits.get_mut(id).ok_or_else(|| QmkError::IdNotLive(id.to_string()))?;
        Ok(f(qubit))
    }

    pub fn with_two_qubits_mut<R>(
        &self,
        a: &str,
        b: &str,
        f: impl FnOnce(&mut LogicalQubit, &mut LogicalQubit, &mut EntanglementTracker) -> R,
    ) -> Result<R, QmkError> {
        let mut qubits = self.qubits.write();
        if !qubits.contains_key(a) {
            return Err(QmkError::IdNotLive(a.to_string()));
        }
        if !qubits.contains_key(b) {
            return Err(QmkError::IdNotLive(b.to_string()));
        }
        let mut tracker = self.tracker.write();
        // Split the borrow: remove then reinsert, since HashMap can't yield two
        // disjoint `&mut` entries directly.
        let mut qa = qubits.remove(a).unwrap();
        let mut qb = qubits.remove(b).unwrap();
        let result = f(&mut qa, &mut qb, &mut tracker);
        qubits.insert(a.to_string(), qa);
        qubits.insert(b.to_string(), qb);
        Ok(result)
    }

    pub fn tracker_mut(&self) -> parking_lot::RwLockWriteGuard<'_, EntanglementTracker> {
        self.tracker.write()
    }

    pub fn with_qubit_and_tracker_mut<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut LogicalQubit, &mut EntanglementTracker) -> R,
    ) -> Result<R, QmkError> {
        let mut qubits = self.qubits.write();
        let qubit = qubits.get_mut(id).ok_or_else(|| QmkError::IdNotLive(id.to_string()))?;
        let mut tracker = self.tracker.write();
        Ok(f(qubit, &mut tracker))
    }

    /// Deep copy of every live qubit's observable state, for checkpointing
    /// (§4.10). Channels and simulation clock are not part of a checkpoint.
    pub fn snapshot_live_qubits(&self) -> HashMap<String, LogicalQubit> {
        self.qubits.read().clone()
    }

    /// Replaces the state of every qubit named in `snapshot` that is still
    /// live; qubits allocated after the snapshot was taken are left
    /// untouched (§4.10).
    pub fn restore_qubits(&self, snapshot: &HashMap<String, LogicalQubit>) {
        let mut qubits = self.qubits.write();
        for (id, saved) in snapshot {
            if let Some(live) = qubits.get_mut(id) {
                *live = saved.clone();
            }
        }
    }

    pub fn physical_qubits_used(&self) -> u64 {
        self.physical_qubits_used
    }

    pub fn physical_qubit_budget(&self) -> u64 {
        self.physical_qubit_budget
    }

    pub fn telemetry(&self) -> Telemetry {
        let qubits = self.qubits.read();
        let channels = self.channels.read();
        let mut qubit_telemetry = HashMap::new();
        for (id, qubit) in qubits.iter() {
            let mut breakdown = ErrorBreakdown::default();
            for entry in qubit.error_log() {
                use crate::error_model::ErrorKind;
                match entry.kind {
                    ErrorKind::Depolarizing => breakdown.depolarizing += 1,
                    ErrorKind::T1Decay | ErrorKind::Dephasing => breakdown.coherence += 1,
                    ErrorKind::MeasurementFlip => breakdown.measurement += 1,
                    ErrorKind::GateError => breakdown.depolarizing += 1,
                }
                breakdown.total += 1;
            }
            qubit_telemetry.insert(
                id.clone(),
                QubitTelemetry {
                    profile: qubit.profile.family.tag().to_string(),
                    distance: qubit.profile.distance,
                    physical_qubits: qubit.profile.physical_qubit_count,
                    gate_count: qubit.counters.gate_count,
                    measurement_count: qubit.counters.measurement_count,
                    decoder_cycles: qubit.counters.decoder_cycles,
                    correction_count: qubit.counters.correction_count,
                    syndrome_weight: qubit.counters.syndrome_weight,
                    error_breakdown: breakdown,
                    logical_error_rate: qubit.profile.logical_error_rate(),
                    total_time_us: qubit.current_time_us,
                },
            );
        }
        let mut channel_telemetry = HashMap::new();
        for (id, channel) in channels.iter() {
            channel_telemetry.insert(
                id.clone(),
                ChannelTelemetry {
                    endpoint_a: channel.endpoint_a.clone(),
                    endpoint_b: channel.endpoint_b.clone(),
                    target_fidelity: channel.target_fidelity,
                    usage_count: channel.usage_count,
                },
            );
        }
        let utilization = if self.physical_qubit_budget == 0 {
            0.0
        } else {
            self.physical_qubits_used as f64 / self.physical_qubit_budget as f64
        };
        Telemetry {
            resource_usage: ResourceUsage {
                logical_qubits_allocated: qubits.len() as u64,
                physical_qubits_used: self.physical_qubits_used,
                physical_qubits_available: self.physical_qubit_budget - self.physical_qubits_used,
                utilization,
                channels_open: channels.len() as u64,
            },
            qubits: qubit_telemetry,
            channels: channel_telemetry,
            simulation_time_us: *self.simulation_time_us.read(),
        }
    }
}
