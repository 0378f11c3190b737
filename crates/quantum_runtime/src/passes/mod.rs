// =============================================================================
// QMK - Optimizer Passes (C9)
// =============================================================================
// Purpose: The eight circuit-level optimizer passes and the level-to-pipeline
//          presets they compose into (§4.8).
// =============================================================================

pub mod cancellation;
pub mod clifford_t;
pub mod commutation;
pub mod fusion;
pub mod measurement_canonicalization;
pub mod measurement_deferral;
pub mod swap_insertion;
pub mod template_matching;

pub use cancellation::GateCancellationPass;
pub use clifford_t::CliffordTPass;
pub use commutation::GateCommutationPass;
pub use fusion::GateFusionPass;
pub use measurement_canonicalization::MeasurementCanonicalizationPass;
pub use measurement_deferral::MeasurementDeferralPass;
pub use swap_insertion::{SwapInsertionPass, Topology};
pub use template_matching::TemplateMatchingPass;

use crate::pass_manager::{OptimizationLevel, Pass};

/// Builds the pass pipeline for an optimization level. `Basic` targets
/// single-qubit redundancy only; `Standard` adds cross-gate commutation and
/// measurement-basis rewrites; `Aggressive` adds Clifford+T consolidation and
/// routing, re-running the cheap passes afterward since they compose
/// (swap insertion and the T^4 fusion above it can each expose new adjacent
/// pairs for the earlier passes to clean up).
pub fn pipeline_for(level: OptimizationLevel) -> Vec<Box<dyn Pass>> {
    match level {
        OptimizationLevel::None => vec![],
        OptimizationLevel::Basic => vec![
            Box::new(GateCancellationPass) as Box<dyn Pass>,
            Box::new(GateFusionPass) as Box<dyn Pass>,
        ],
        OptimizationLevel::Standard => vec![
            Box::new(GateCancellationPass) as Box<dyn Pass>,
            Box::new(GateFusionPass) as Box<dyn Pass>,
            Box::new(GateCommutationPass) as Box<dyn Pass>,
            Box::new(TemplateMatchingPass) as Box<dyn Pass>,
            Box::new(MeasurementDeferralPass) as Box<dyn Pass>,
            Box::new(MeasurementCanonicalizationPass) as Box<dyn Pass>,
            Box::new(GateCancellationPass) as Box<dyn Pass>,
        ],
        OptimizationLevel::Aggressive => vec![
            Box::new(GateCancellationPass) as Box<dyn Pass>,
            Box::new(GateFusionPass) as Box<dyn Pass>,
            Box::new(GateCommutationPass) as Box<dyn Pass>,
            Box::new(TemplateMatchingPass) as Box<dyn Pass>,
            Box::new(MeasurementDeferralPass) as Box<dyn Pass>,
            Box::new(MeasurementCanonicalizationPass) as Box<dyn Pass>,
            Box::new(CliffordTPass) as Box<dyn Pass>,
            Box::new(SwapInsertionPass::all_to_all()) as Box<dyn Pass>,
            Box::new(GateCancellationPass) as Box<dyn Pass>,
        ],
    }
}
