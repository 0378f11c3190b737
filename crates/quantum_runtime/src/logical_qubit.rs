// =============================================================================
// QMK - Logical Qubit (C3)
// =============================================================================
// Table of Contents:
//   1. StateVariant / Gate vocabulary
//   2. QubitCounters
//   3. LogicalQubit - discrete state + entanglement tag + error accounting
//   4. Single-qubit gate rewrite table
//   5. Measurement (Z/X/Y/arbitrary-angle, Bell)
//   6. Two-qubit gates (CNOT table, CZ/SWAP decomposition)
// =============================================================================
// Purpose: Mutable logical qubit state, owned exclusively by the Resource
//          Manager (§5 sharing policy); all other components borrow it through
//          the manager. Gates act on a fixed rewrite table over
//          {Zero, One, Plus, Minus}; phases are tracked but never affect
//          discrete-state measurement outcomes (§4.3).
// =============================================================================

use crate::entanglement::{EntanglementGroupId, EntanglementTracker};
use crate::error_model::ErrorModel;
use crate::qec_profile::QecProfile;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

// =============================================================================
// 1. StateVariant / Gate vocabulary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateVariant {
    Zero,
    One,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingleQubitGate {
    H,
    X,
    Y,
    Z,
    S,
    T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationAxis {
    X,
    Y,
    Z,
}

// =============================================================================
// 2. QubitCounters
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QubitCounters {
    pub gate_count: u64,
    pub measurement_count: u64,
    pub decoder_cycles: u64,
    pub correction_count: u64,
    pub syndrome_weight: u32,
}

// =============================================================================
// 3. LogicalQubit
// =============================================================================

#[derive(Debug, Clone)]
pub struct LogicalQubit {
    pub id: String,
    pub profile: Arc<QecProfile>,
    pub state: StateVariant,
    pub phase: f64,
    pub entangled_partner: Option<String>,
    pub entanglement_group: Option<EntanglementGroupId>,
    pub counters: QubitCounters,
    pub current_time_us: f64,
    pub last_gate_time_us: f64,
    error_model: ErrorModel,
}

impl LogicalQubit {
    pub fn new(id: impl Into<String>, profile: Arc<QecProfile>, seed: u64) -> Self {
        Self {
            id: id.into(),
            profile,
            state: StateVariant::Zero,
            phase: 0.0,
            entangled_partner: None,
            entanglement_group: None,
            counters: QubitCounters::default(),
            current_time_us: 0.0,
            last_gate_time_us: 0.0,
            error_model: ErrorModel::new(seed),
        }
    }

    pub fn error_log(&self) -> &[crate::error_model::ErrorLogEntry] {
        self.error_model.log()
    }

    /// §4.2 step 1: idle noise is logged for telemetry but never bumps
    /// `syndrome_weight` — only a single-qubit gate error does (step 2).
    fn begin_op(&mut self, now_us: f64) {
        let delta = (now_us - self.last_gate_time_us).max(0.0);
        self.error_model
            .apply_idle_noise(&self.id, &self.profile, delta, now_us);
    }

    /// Shared post-op bookkeeping: advance time, bump `gate_count`, run the
    /// decoder pass. Never touches `syndrome_weight` — callers sample gate
    /// noise themselves so only single-qubit gates (§4.2 step 2) can bump it.
    fn finish_gate(&mut self, advance_us: f64) {
        self.counters.gate_count += 1;
        self.current_time_us += advance_us;
        self.last_gate_time_us = self.current_time_us;
        self.decoder_pass();
    }

    /// §4.2 step 2: samples a gate error and bumps `syndrome_weight` on a
    /// hit. Single-qubit gates only — two-qubit gates log an error per
    /// qubit for telemetry but must not bump the syndrome counter.
    fn sample_single_qubit_gate_noise(&mut self) {
        if self
            .error_model
            .apply_gate_noise(&self.id, &self.profile, self.current_time_us)
            .is_some()
        {
            self.counters.syndrome_weight += 1;
        }
    }

    fn finish_measurement(&mut self) {
        self.current_time_us += self.profile.logical_cycle_time_us;
        self.last_gate_time_us = self.current_time_us;
        self.decoder_pass();
    }

    /// §4.2 decoder pass: clears a correctable syndrome, otherwise it persists
    /// (indicating a would-be logical error).
    fn decoder_pass(&mut self) {
        self.counters.decoder_cycles += 1;
        let threshold = self.profile.distance / 2;
        if self.counters.syndrome_weight > 0 && self.counters.syndrome_weight <= threshold {
            self.counters.syndrome_weight = 0;
            self.counters.correction_count += 1;
            self.error_model.mark_last_corrected(&self.id);
        }
    }

    // =========================================================================
    // 4. Single-qubit gate rewrite table
    // =========================================================================

    pub fn apply_single_gate(&mut self, gate: SingleQubitGate, now_us: f64) {
        self.begin_op(now_us);
        self.rewrite_single(gate);
        self.sample_single_qubit_gate_noise();
        let advance = self.profile.logical_cycle_time_us;
        self.finish_gate(advance);
    }

    fn rewrite_single(&mut self, gate: SingleQubitGate) {
        use StateVariant::*;
        match gate {
            SingleQubitGate::H => {
                self.state = match self.state {
                    Zero => Plus,
                    Plus => Zero,
                    One => Minus,
                    Minus => One,
                };
            }
            SingleQubitGate::X => {
                self.state = match self.state {
                    Zero => One,
                    One => Zero,
                    Plus => Plus,
                    Minus => Minus,
                };
            }
            SingleQubitGate::Z => match self.state {
                Plus => self.state = Minus,
                Minus => self.state = Plus,
                One => self.phase += PI,
                Zero => {}
            },
            SingleQubitGate::Y => {
                // Y = X.Z: apply Z then X.
                self.rewrite_single(SingleQubitGate::Z);
                self.rewrite_single(SingleQubitGate::X);
            }
            SingleQubitGate::S => {
                if self.state == One {
                    self.phase += PI / 2.0;
                }
            }
            SingleQubitGate::T => {
                if self.state == One {
                    self.phase += PI / 4.0;
                }
            }
        }
    }

    pub fn apply_rotation(&mut self, axis: RotationAxis, theta: f64, now_us: f64) {
        self.begin_op(now_us);
        match axis {
            RotationAxis::Z => {
                if self.state == StateVariant::One {
                    self.phase += theta;
                }
            }
            RotationAxis::X => match self.state {
                StateVariant::Plus => self.phase += theta,
                StateVariant::Minus => self.phase -= theta,
                _ => {}
            },
            RotationAxis::Y => self.phase += theta,
        }
        self.sample_single_qubit_gate_noise();
        let advance = self.profile.logical_cycle_time_us;
        self.finish_gate(advance);
    }

    pub fn reset(&mut self, tracker: &mut EntanglementTracker, now_us: f64) {
        self.begin_op(now_us);
        self.state = StateVariant::Zero;
        self.phase = 0.0;
        tracker.break_entanglement(&self.id);
        self.entanglement_group = None;
        self.entangled_partner = None;
        self.finish_measurement();
    }

    // =========================================================================
    // 5. Measurement
    // =========================================================================

    fn measure_generic(
        &mut self,
        eigen_zero: StateVariant,
        eigen_one: StateVariant,
        tracker: &mut EntanglementTracker,
        now_us: f64,
    ) -> bool {
        self.begin_op(now_us);
        let raw = if self.state == eigen_zero {
            false
        } else if self.state == eigen_one {
            true
        } else if let Some(outcome) = tracker.latched_outcome(&self.id) {
            outcome
        } else {
            let outcome = self.error_model.sample_bool();
            if self.entanglement_group.is_some() {
                tracker.latch(&self.id, outcome);
            }
            outcome
        };
        let noisy = self
            .error_model
            .apply_measurement_noise(&self.id, raw, &self.profile, now_us);
        self.counters.measurement_count += 1;
        tracker.break_entanglement(&self.id);
        self.entanglement_group = None;
        self.entangled_partner = None;
        self.finish_measurement();
        noisy
    }

    pub fn measure_z(&mut self, tracker: &mut EntanglementTracker, now_us: f64) -> bool {
        self.measure_generic(StateVariant::Zero, StateVariant::One, tracker, now_us)
    }

    pub fn measure_x(&mut self, tracker: &mut EntanglementTracker, now_us: f64) -> bool {
        self.measure_generic(StateVariant::Plus, StateVariant::Minus, tracker, now_us)
    }

    pub fn measure_y(&mut self, tracker: &mut EntanglementTracker, now_us: f64) -> bool {
        self.measure_generic(StateVariant::Plus, StateVariant::Minus, tracker, now_us)
    }

    /// Arbitrary-angle measurement: selects the nearest eigenbasis among
    /// `0 ≡ Z`, `π/2 ≡ X`, `π ≡ −Z` (§4.3).
    pub fn measure_theta(
        &mut self,
        theta: f64,
        tracker: &mut EntanglementTracker,
        now_us: f64,
    ) -> bool {
        let norm = theta.rem_euclid(2.0 * PI);
        let dist_z = angular_distance(norm, 0.0);
        let dist_x = angular_distance(norm, PI / 2.0);
        let dist_neg_z = angular_distance(norm, PI);

        if dist_z <= dist_x && dist_z <= dist_neg_z {
            self.measure_z(tracker, now_us)
        } else if dist_x <= dist_neg_z {
            self.measure_x(tracker, now_us)
        } else {
            !self.measure_z(tracker, now_us)
        }
    }
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs();
    diff.min(2.0 * PI - diff)
}

/// Bell measurement on `(a, b)`: returns `(m_a, m_b, index = m_a*2 + m_b)`.
pub fn measure_bell(
    a: &mut LogicalQubit,
    b: &mut LogicalQubit,
    tracker: &mut EntanglementTracker,
    now_us: f64,
) -> (bool, bool, u8) {
    let ma = a.measure_z(tracker, now_us);
    let mb = b.measure_z(tracker, now_us);
    let index = (ma as u8) * 2 + (mb as u8);
    (ma, mb, index)
}

// =============================================================================
// 6. Two-qubit gates
// =============================================================================

/// CNOT table over `{Zero, One, Plus, Minus} x {Zero, One, Plus, Minus}`
/// (§4.3). When both qubits were previously in the same entanglement group
/// and re-enter superposition-on-superposition form, the second CNOT on a
/// previously-formed Bell pair deterministically disentangles them.
pub fn apply_cnot(
    control: &mut LogicalQubit,
    target: &mut LogicalQubit,
    tracker: &mut EntanglementTracker,
    now_us: f64,
) {
    control.begin_op(now_us);
    target.begin_op(now_us);

    use StateVariant::*;
    let same_group = control.entanglement_group.is_some()
        && control.entanglement_group == target.entanglement_group;

    match (control.state, target.state) {
        (Zero, _) => {}
        (One, Zero) => target.state = One,
        (One, One) => target.state = Zero,
        (One, Plus) | (One, Minus) => {}
        (c @ (Plus | Minus), Zero) | (c @ (Plus | Minus), One) if !same_group => {
            target.state = c;
            let gid = tracker.entangle(&[control.id.clone(), target.id.clone()]);
            control.entanglement_group = Some(gid);
            target.entanglement_group = Some(gid);
            control.entangled_partner = Some(target.id.clone());
            target.entangled_partner = Some(control.id.clone());
        }
        (c @ (Plus | Minus), t) if same_group && t == c => {
            target.state = Zero;
            tracker.break_entanglement(&control.id);
            tracker.break_entanglement(&target.id);
            control.entanglement_group = None;
            target.entanglement_group = None;
            control.entangled_partner = None;
            target.entangled_partner = None;
        }
        _ => {
            let gid = tracker.entangle(&[control.id.clone(), target.id.clone()]);
            control.entanglement_group = Some(gid);
            target.entanglement_group = Some(gid);
        }
    }

    // Two-qubit gates log a gate-error sample per qubit (telemetry's
    // error_breakdown) but never bump syndrome_weight — §4.2 step 2 reserves
    // that for single-qubit gates.
    control
        .error_model
        .apply_gate_noise(&control.id, &control.profile, control.current_time_us);
    target
        .error_model
        .apply_gate_noise(&target.id, &target.profile, target.current_time_us);

    let advance = control
        .profile
        .logical_cycle_time_us
        .max(target.profile.logical_cycle_time_us);
    control.finish_gate(advance);
    target.finish_gate(advance);
}

/// CZ decomposed into H-conjugated CNOT: `H(target); CNOT; H(target)` (§4.3).
pub fn apply_cz(
    control: &mut LogicalQubit,
    target: &mut LogicalQubit,
    tracker: &mut EntanglementTracker,
    now_us: f64,
) {
    target.apply_single_gate(SingleQubitGate::H, now_us);
    apply_cnot(control, target, tracker, target.current_time_us);
    target.apply_single_gate(SingleQubitGate::H, target.current_time_us);
}

/// SWAP decomposed into three CNOTs (§4.3).
pub fn apply_swap(
    a: &mut LogicalQubit,
    b: &mut LogicalQubit,
    tracker: &mut EntanglementTracker,
    now_us: f64,
) {
    apply_cnot(a, b, tracker, now_us);
    apply_cnot(b, a, tracker, a.current_time_us.max(b.current_time_us));
    apply_cnot(a, b, tracker, a.current_time_us.max(b.current_time_us));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qec_profile::{CodeFamily, QecProfile};

    fn noiseless_profile() -> Arc<QecProfile> {
        let mut profile = QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap();
        profile.physical_gate_error_rate = 0.0;
        profile.readout_error_rate = 0.0;
        profile.idle_error_rate = 0.0;
        Arc::new(profile)
    }

    #[test]
    fn hadamard_then_x_then_x_is_identity_on_discrete_state() {
        let profile = noiseless_profile();
        let mut q = LogicalQubit::new("q0", profile, 1);
        q.apply_single_gate(SingleQubitGate::H, 0.0);
        assert_eq!(q.state, StateVariant::Plus);
        q.apply_single_gate(SingleQubitGate::H, q.current_time_us);
        assert_eq!(q.state, StateVariant::Zero);
    }

    #[test]
    fn bell_state_measurements_agree() {
        let profile = noiseless_profile();
        let mut tracker = EntanglementTracker::new();
        let mut q0 = LogicalQubit::new("q0", profile.clone(), 1);
        let mut q1 = LogicalQubit::new("q1", profile, 2);

        q0.apply_single_gate(SingleQubitGate::H, 0.0);
        let now = q0.current_time_us;
        apply_cnot(&mut q0, &mut q1, &mut tracker, now);

        let m0 = q0.measure_z(&mut tracker, q0.current_time_us);
        let m1 = q1.measure_z(&mut tracker, q1.current_time_us);
        assert_eq!(m0, m1);
    }

    #[test]
    fn measuring_classical_state_is_deterministic() {
        let profile = noiseless_profile();
        let mut tracker = EntanglementTracker::new();
        let mut q = LogicalQubit::new("q0", profile, 1);
        q.apply_single_gate(SingleQubitGate::X, 0.0);
        assert!(q.measure_z(&mut tracker, q.current_time_us));
    }

    #[test]
    fn decoder_clears_correctable_syndrome() {
        let mut profile = QecProfile::standard(CodeFamily::SurfaceCode, 5, None).unwrap();
        profile.physical_gate_error_rate = 1.0;
        profile.idle_error_rate = 0.0;
        let mut q = LogicalQubit::new("q0", Arc::new(profile), 3);
        q.apply_single_gate(SingleQubitGate::H, 0.0);
        assert_eq!(q.counters.syndrome_weight, 0);
        assert!(q.counters.correction_count >= 1);
    }

    #[test]
    fn idle_noise_is_logged_but_never_bumps_syndrome_weight() {
        let mut profile = QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap();
        profile.physical_gate_error_rate = 0.0;
        profile.idle_error_rate = 1.0;
        let mut q = LogicalQubit::new("q0", Arc::new(profile), 7);
        q.apply_single_gate(SingleQubitGate::H, 0.0);
        assert_eq!(q.counters.syndrome_weight, 0);
        // A large idle gap before the next op guarantees the idle sampler fires.
        q.apply_single_gate(SingleQubitGate::H, q.current_time_us + 50.0);
        assert_eq!(q.counters.syndrome_weight, 0);
        assert!(!q.error_log().is_empty());
    }

    #[test]
    fn two_qubit_gate_logs_errors_but_never_bumps_syndrome_weight() {
        let mut profile = QecProfile::standard(CodeFamily::SurfaceCode, 5, None).unwrap();
        profile.physical_gate_error_rate = 1.0;
        profile.idle_error_rate = 0.0;
        let profile = Arc::new(profile);
        let mut tracker = EntanglementTracker::new();
        let mut q0 = LogicalQubit::new("q0", profile.clone(), 11);
        let mut q1 = LogicalQubit::new("q1", profile, 12);
        apply_cnot(&mut q0, &mut q1, &mut tracker, 0.0);
        assert_eq!(q0.counters.syndrome_weight, 0);
        assert_eq!(q1.counters.syndrome_weight, 0);
        assert!(!q0.error_log().is_empty());
        assert!(!q1.error_log().is_empty());
    }
}
