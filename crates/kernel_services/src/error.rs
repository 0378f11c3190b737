// =============================================================================
// QMK - Kernel Services - Error Types
// =============================================================================
// Table of Contents:
//   1. KernelError - Capability/session-layer errors
// =============================================================================
// Purpose: Error variants owned by the kernel services layer (capability and
//          job-status bookkeeping). The graph-execution error surface lives in
//          quantum_runtime::error::QmkError, which wraps these when needed.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("capability denied: opcode requires {required:?}, session granted {granted:?}")]
    CapabilityDenied {
        required: Vec<String>,
        granted: Vec<String>,
    },

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {0} already in a terminal state")]
    JobAlreadyTerminal(String),
}
