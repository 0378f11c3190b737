// =============================================================================
// QMK - Pass Manager (C8)
// =============================================================================
// Table of Contents:
//   1. PassMetrics
//   2. Pass trait
//   3. OptimizationLevel
//   4. PassManager - runs a configured sequence, isolates pass failures
// =============================================================================
// Purpose: A pass is a pure function Circuit -> Circuit plus a metrics
//          side-channel (§4.8). The manager runs a configured pipeline,
//          aggregates metrics, and isolates a failing pass: it reports the
//          pass name and the circuit state before that pass, continuing only
//          at `Aggressive` (§7).
// =============================================================================

use crate::circuit_ir::Circuit;
use crate::error::QmkError;
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

// =============================================================================
// 1. PassMetrics
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassMetrics {
    pub gates_removed: u64,
    pub gates_added: u64,
    pub swap_gates_added: u64,
    pub cnot_removed: u64,
    pub t_gates_removed: u64,
    pub patterns_matched: u64,
    pub execution_time_ms: f64,
    pub custom: HashMap<String, f64>,
}

// =============================================================================
// 2. Pass trait
// =============================================================================

pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, circuit: &Circuit) -> Result<(Circuit, PassMetrics), QmkError>;
}

// =============================================================================
// 3. OptimizationLevel
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    None,
    Basic,
    Standard,
    Aggressive,
}

// =============================================================================
// 4. PassManager
// =============================================================================

#[derive(Debug, Clone)]
pub struct PassReport {
    pub name: &'static str,
    pub metrics: PassMetrics,
}

pub struct PassOutcome {
    pub circuit: Circuit,
    pub reports: Vec<PassReport>,
    pub failed_pass: Option<&'static str>,
}

pub struct PassManager {
    pipeline: Vec<Box<dyn Pass>>,
    level: OptimizationLevel,
}

impl PassManager {
    pub fn new(level: OptimizationLevel) -> Self {
        Self {
            pipeline: crate::passes::pipeline_for(level),
            level,
        }
    }

    pub fn run(&self, circuit: Circuit) -> PassOutcome {
        let mut current = circuit;
        let mut reports = Vec::with_capacity(self.pipeline.len());
        let mut failed_pass = None;

        for pass in &self.pipeline {
            let before = current.clone();
            let start = Instant::now();
            match pass.run(&current) {
                Ok((next, mut metrics)) => {
                    metrics.execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                    reports.push(PassReport { name: pass.name(), metrics });
                    current = next;
                }
                Err(err) => {
                    warn!(pass = pass.name(), error = %err, "optimizer pass failed");
                    if self.level == OptimizationLevel::Aggressive {
                        current = before;
                        continue;
                    }
                    failed_pass = Some(pass.name());
                    current = before;
                    break;
                }
            }
        }

        PassOutcome {
            circuit: current,
            reports,
            failed_pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_ir::Opcode;
    use crate::circuit_ir::Instruction;

    #[test]
    fn none_level_runs_no_passes() {
        let mut circuit = Circuit::new(vec!["q0".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n0"));
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n1"));
        let manager = PassManager::new(OptimizationLevel::None);
        let outcome = manager.run(circuit);
        assert_eq!(outcome.circuit.len(), 2);
        assert!(outcome.reports.is_empty());
    }

    #[test]
    fn basic_level_cancels_adjacent_self_inverse_gates() {
        let mut circuit = Circuit::new(vec!["q0".to_string()]);
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n0"));
        circuit.push(Instruction::new(Opcode::ApplyH, vec!["q0".to_string()], "n1"));
        let manager = PassManager::new(OptimizationLevel::Basic);
        let outcome = manager.run(circuit);
        assert!(outcome.circuit.is_empty());
    }
}
