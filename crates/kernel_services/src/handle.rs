// =============================================================================
// QMK - Kernel Services - Job and Session Handles
// =============================================================================
// Table of Contents:
//   1. SessionHandle - Opaque session identifier
//   2. JobHandle - Opaque submitted-job identifier
//   3. CheckpointHandle / MigrationHandle - Identifiers for C11 records
// =============================================================================
// Purpose: Lightweight identifier newtypes used across the kernel and runtime
//          so job/session/checkpoint ids are not confused with plain strings
//          at call sites.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_handle!(SessionHandle);
uuid_handle!(JobHandle);
uuid_handle!(CheckpointHandle);
uuid_handle!(MigrationHandle);
