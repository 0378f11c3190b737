// =============================================================================
// QMK - Kernel Services - Job Status and Cooperative Cancellation
// =============================================================================
// Table of Contents:
//   1. JobStatus - Lifecycle state exposed over the session contract (§6)
//   2. ExecutionPolicy - Per-submission priority/seed/debug policy
//   3. CancelFlag - Cooperative cancellation token
// =============================================================================
// Purpose: The vocabulary the (out-of-scope) session/RPC layer and the
//          executor agree on for job lifecycle and cancellation, kept here so
//          it is not duplicated between the two.
// =============================================================================

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// 1. JobStatus
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

// =============================================================================
// 2. ExecutionPolicy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum JobPriority {
    Background = 0,
    #[default]
    Normal = 1,
    Elevated = 2,
    Critical = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub priority: JobPriority,
    pub seed: u64,
    pub debug: bool,
}

impl ExecutionPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            priority: JobPriority::default(),
            seed,
            debug: false,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

// =============================================================================
// 3. CancelFlag - Cooperative cancellation token
// =============================================================================

/// Consulted between node dispatches by the executor (§5). Setting it does not
/// interrupt an in-flight node; the executor checks it at node boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<RwLock<bool>>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(false)))
    }

    pub fn cancel(&self) {
        *self.0.write() = true;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.read()
    }
}
