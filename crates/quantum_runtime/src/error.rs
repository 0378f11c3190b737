// =============================================================================
// QMK - Unified Error Types
// =============================================================================
// Table of Contents:
//   1. QmkError - Main error enum (one variant group per §7 category)
//   2. WireError - Structured {code, message, data} wire representation
//   3. Result type alias
// =============================================================================
// Purpose: Unified error handling across the quantum runtime layer. The parser
//          and preprocessor recover no errors locally: the first error fails
//          the job with an explicit location. No stack traces cross the wire.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// =============================================================================
// 1. QmkError - Main error enum
// =============================================================================

#[derive(Debug, Error)]
pub enum QmkError {
    #[error("parse error at {location}: {message}")]
    ParseError { location: String, message: String },

    #[error("include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("include target not found: {0}")]
    IncludeMissing(String),

    #[error("formula error at {location}: {message}")]
    FormulaError { location: String, message: String },

    #[error("unknown QEC code family: {0}")]
    ProfileUnknownFamily(String),

    #[error("capability denied: node {node_id} requires {required:?}, granted {granted:?}")]
    CapabilityDenied {
        node_id: String,
        required: Vec<String>,
        granted: Vec<String>,
    },

    #[error("quota exceeded: requested {requested} physical qubits, budget {budget} with {used} already in use")]
    QuotaExceeded {
        requested: u64,
        budget: u64,
        used: u64,
    },

    #[error("id already live: {0}")]
    IdTaken(String),

    #[error("id not live: {0}")]
    IdNotLive(String),

    #[error("graph contains a dependency cycle")]
    GraphCyclic,

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    #[error("event not produced: {0}")]
    EventNotProduced(String),

    #[error("event assigned more than once: {0}")]
    EventDoubleAssigned(String),

    #[error("malformed guard on node {0}")]
    GuardMalformed(String),

    #[error("measurement arity error: {0}")]
    MeasurementArity(String),

    #[error("uncomputation requested on an invalid segment: {0}")]
    UncomputationInvalidSegment(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("migration cannot proceed: {0}")]
    MigrationCannotProceed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QmkError {
    /// Stable machine-readable code for the wire form. Kept in sync with the
    /// variant names rather than derived, so renaming a variant is a deliberate
    /// wire-compatibility decision.
    pub fn code(&self) -> &'static str {
        match self {
            QmkError::ParseError { .. } => "PARSE_ERROR",
            QmkError::IncludeCycle(_) => "INCLUDE_CYCLE",
            QmkError::IncludeMissing(_) => "INCLUDE_MISSING",
            QmkError::FormulaError { .. } => "FORMULA_ERROR",
            QmkError::ProfileUnknownFamily(_) => "PROFILE_UNKNOWN_FAMILY",
            QmkError::CapabilityDenied { .. } => "CAPABILITY_DENIED",
            QmkError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            QmkError::IdTaken(_) => "ID_TAKEN",
            QmkError::IdNotLive(_) => "ID_NOT_LIVE",
            QmkError::GraphCyclic => "GRAPH_CYCLIC",
            QmkError::DuplicateNodeId(_) => "DUPLICATE_NODE_ID",
            QmkError::UnknownOpcode(_) => "UNKNOWN_OPCODE",
            QmkError::EventNotProduced(_) => "EVENT_NOT_PRODUCED",
            QmkError::EventDoubleAssigned(_) => "EVENT_DOUBLE_ASSIGNED",
            QmkError::GuardMalformed(_) => "GUARD_MALFORMED",
            QmkError::MeasurementArity(_) => "MEASUREMENT_ARITY",
            QmkError::UncomputationInvalidSegment(_) => "UNCOMPUTATION_INVALID_SEGMENT",
            QmkError::CheckpointNotFound(_) => "CHECKPOINT_NOT_FOUND",
            QmkError::MigrationCannotProceed(_) => "MIGRATION_CANNOT_PROCEED",
            QmkError::Internal(_) => "INTERNAL",
        }
    }

    /// Structured data payload for the wire form; `None` collapses to `Value::Null`.
    pub fn data(&self) -> Value {
        match self {
            QmkError::CapabilityDenied {
                node_id,
                required,
                granted,
            } => serde_json::json!({
                "node_id": node_id,
                "required": required,
                "granted": granted,
            }),
            QmkError::QuotaExceeded {
                requested,
                budget,
                used,
            } => serde_json::json!({
                "requested": requested,
                "budget": budget,
                "used": used,
            }),
            _ => Value::Null,
        }
    }

    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code().to_string(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}

// =============================================================================
// 2. WireError - Structured {code, message, data} wire representation
// =============================================================================

/// The only error shape that crosses the session/RPC boundary (§6, §7):
/// never a stack trace, never the Rust `Debug` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    pub data: Value,
}

impl From<&QmkError> for WireError {
    fn from(err: &QmkError) -> Self {
        err.to_wire()
    }
}

// =============================================================================
// 3. Result type alias
// =============================================================================

pub type QmkResult<T> = Result<T, QmkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_carries_no_debug_text() {
        let err = QmkError::CapabilityDenied {
            node_id: "n1".into(),
            required: vec!["CAP_ALLOC".into()],
            granted: vec![],
        };
        let wire = err.to_wire();
        assert_eq!(wire.code, "CAPABILITY_DENIED");
        assert!(wire.data["required"].as_array().unwrap().len() == 1);
    }

    #[test]
    fn quota_exceeded_reports_code() {
        let err = QmkError::QuotaExceeded {
            requested: 50,
            budget: 100,
            used: 100,
        };
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
    }
}
