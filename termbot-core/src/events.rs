use crate::types::{Identity, Timestamp};
use serde::{Deserialize, Serialize};

/// Gateway events: the audit trail of access decisions that changed or
/// threatened to change state. Published on a broadcast channel; the server
/// logs them and forwards the operator-relevant ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    AttemptDenied {
        identity: Identity,
        attempt: u32,
        max_attempts: u32,
        at: Timestamp,
    },
    IdentityBlocked {
        identity: Identity,
        attempts: u32,
        at: Timestamp,
    },
    /// The threshold was reached but the block could not be recorded.
    PersistFailed {
        identity: Identity,
        attempt: u32,
        reason: String,
        at: Timestamp,
    },
}

impl GatewayEvent {
    pub fn identity(&self) -> Identity {
        match self {
            GatewayEvent::AttemptDenied { identity, .. }
            | GatewayEvent::IdentityBlocked { identity, .. }
            | GatewayEvent::PersistFailed { identity, .. } => *identity,
        }
    }

    /// Whether the operator should be told about this event.
    pub fn needs_operator(&self) -> bool {
        !matches!(self, GatewayEvent::AttemptDenied { .. })
    }
}
