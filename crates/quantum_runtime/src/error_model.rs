// =============================================================================
// QMK - Error Model (C2)
// =============================================================================
// Table of Contents:
//   1. ErrorKind / ErrorLogEntry - Queryable telemetry record
//   2. PauliKind - Uniform gate-error choice
//   3. ErrorModel - Seedable per-qubit noise sampler
// =============================================================================
// Purpose: Stateful per-qubit noise sampler (depolarizing, T1/T2, readout).
//          Every sampled error is appended to an ordered log; the log feeds
//          telemetry only, never back into the discrete quantum state.
// =============================================================================

use crate::qec_profile::QecProfile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

// =============================================================================
// 1. ErrorKind / ErrorLogEntry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Depolarizing,
    T1Decay,
    Dephasing,
    GateError,
    MeasurementFlip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub qubit_id: String,
    pub time_us: f64,
    pub kind: ErrorKind,
    pub corrected: bool,
}

// =============================================================================
// 2. PauliKind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauliKind {
    X,
    Y,
    Z,
}

// =============================================================================
// 3. ErrorModel
// =============================================================================

/// Seedable per-qubit noise sampler. The Resource Manager derives a distinct
/// seed per allocated qubit (§4.2 Determinism) so identical `(seed, schedule)`
/// pairs are bit-exact across runs and platforms.
#[derive(Debug, Clone)]
pub struct ErrorModel {
    rng: StdRng,
    log: Vec<ErrorLogEntry>,
}

impl ErrorModel {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            log: Vec::new(),
        }
    }

    pub fn log(&self) -> &[ErrorLogEntry] {
        &self.log
    }

    /// Step 1 of §4.2: idle noise accumulated over `[last_gate_time_us, t]`.
    /// Returns `true` if any idle error was sampled (depolarizing, T1, or
    /// dephasing) so the caller can update `syndrome_weight`.
    pub fn apply_idle_noise(
        &mut self,
        qubit_id: &str,
        profile: &QecProfile,
        delta_t_us: f64,
        now_us: f64,
    ) -> bool {
        if delta_t_us <= 0.0 {
            return false;
        }
        let mut errored = false;

        let p_depol = (profile.idle_error_rate * delta_t_us).clamp(0.0, 1.0);
        if self.rng.gen::<f64>() < p_depol {
            self.log.push(ErrorLogEntry {
                qubit_id: qubit_id.to_string(),
                time_us: now_us,
                kind: ErrorKind::Depolarizing,
                corrected: false,
            });
            errored = true;
        }

        let p_t1 = 1.0 - (-delta_t_us / profile.t1_us).exp();
        if self.rng.gen::<f64>() < p_t1 {
            self.log.push(ErrorLogEntry {
                qubit_id: qubit_id.to_string(),
                time_us: now_us,
                kind: ErrorKind::T1Decay,
                corrected: false,
            });
            errored = true;
        }

        let t_phi = profile.t_phi_us();
        if t_phi.is_finite() {
            let p_phi = 1.0 - (-delta_t_us / t_phi).exp();
            if self.rng.gen::<f64>() < p_phi {
                self.log.push(ErrorLogEntry {
                    qubit_id: qubit_id.to_string(),
                    time_us: now_us,
                    kind: ErrorKind::Dephasing,
                    corrected: false,
                });
                errored = true;
            }
        }

        errored
    }

    /// Step 2 of §4.2: with probability `p_gate`, pick one of `{X, Y, Z}`.
    pub fn apply_gate_noise(
        &mut self,
        qubit_id: &str,
        profile: &QecProfile,
        now_us: f64,
    ) -> Option<PauliKind> {
        if self.rng.gen::<f64>() >= profile.physical_gate_error_rate {
            return None;
        }
        let pauli = match self.rng.gen_range(0..3) {
            0 => PauliKind::X,
            1 => PauliKind::Y,
            _ => PauliKind::Z,
        };
        self.log.push(ErrorLogEntry {
            qubit_id: qubit_id.to_string(),
            time_us: now_us,
            kind: ErrorKind::GateError,
            corrected: false,
        });
        Some(pauli)
    }

    /// Measurement noise flips the true outcome bit with probability `p_meas`.
    pub fn apply_measurement_noise(
        &mut self,
        qubit_id: &str,
        outcome: bool,
        profile: &QecProfile,
        now_us: f64,
    ) -> bool {
        if self.rng.gen::<f64>() < profile.readout_error_rate {
            self.log.push(ErrorLogEntry {
                qubit_id: qubit_id.to_string(),
                time_us: now_us,
                kind: ErrorKind::MeasurementFlip,
                corrected: false,
            });
            !outcome
        } else {
            outcome
        }
    }

    /// Uniform 50/50 coin flip drawn from the same seeded stream, used when a
    /// discrete state collapses without a pre-existing classical outcome to
    /// latch onto (§4.3 measurement of `Plus`/`Minus`).
    pub fn sample_bool(&mut self) -> bool {
        self.rng.gen::<bool>()
    }

    /// Marks the most recent uncorrected log entry for `qubit_id` as corrected,
    /// invoked by the decoder pass (§4.2) when a syndrome is cleared.
    pub fn mark_last_corrected(&mut self, qubit_id: &str) {
        if let Some(entry) = self
            .log
            .iter_mut()
            .rev()
            .find(|e| e.qubit_id == qubit_id && !e.corrected)
        {
            entry.corrected = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qec_profile::CodeFamily;

    fn profile() -> QecProfile {
        QecProfile::standard(CodeFamily::SurfaceCode, 3, None).unwrap()
    }

    #[test]
    fn determinism_same_seed_same_outcomes() {
        let mut a = ErrorModel::new(42);
        let mut b = ErrorModel::new(42);
        let profile = profile();
        let ra = a.apply_idle_noise("q0", &profile, 10.0, 10.0);
        let rb = b.apply_idle_noise("q0", &profile, 10.0, 10.0);
        assert_eq!(ra, rb);
        assert_eq!(a.log().len(), b.log().len());
    }

    #[test]
    fn zero_error_rate_never_flips_measurement() {
        let mut model = ErrorModel::new(7);
        let mut profile = profile();
        profile.readout_error_rate = 0.0;
        for _ in 0..50 {
            assert!(model.apply_measurement_noise("q0", true, &profile, 0.0));
        }
    }

    #[test]
    fn full_error_rate_always_flips_measurement() {
        let mut model = ErrorModel::new(7);
        let mut profile = profile();
        profile.readout_error_rate = 1.0;
        assert!(!model.apply_measurement_noise("q0", true, &profile, 0.0));
    }

    #[test]
    fn zero_delta_t_never_errors() {
        let mut model = ErrorModel::new(1);
        let profile = profile();
        assert!(!model.apply_idle_noise("q0", &profile, 0.0, 0.0));
    }
}
