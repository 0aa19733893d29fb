use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ─── Identity ─────────────────────────────────────────────────

/// Opaque requester identifier supplied by the transport (a Telegram user id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity(id)
    }
}

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

pub(crate) fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

// ─── Access state ─────────────────────────────────────────────

/// Access status of a single identity, as seen by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    Authorized,
    /// Implicit default. Carries the in-memory failure count.
    Unauthorized { failure_count: u32 },
    Blocked,
}

// ─── Gateway configuration ────────────────────────────────────

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Persisted access-control configuration.
///
/// Keys this crate does not own (the bot token written by the installer, for
/// instance) are kept in `extra` so a rewrite never drops them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Static allowlist.
    #[serde(alias = "ids_autorizados")]
    pub authorized_ids: BTreeSet<Identity>,
    /// Grows only while the service runs.
    #[serde(default, alias = "usuarios_bloqueados")]
    pub blocked_ids: BTreeSet<Identity>,
    #[serde(default = "default_max_attempts", alias = "tentativas_maximas")]
    pub max_attempts: u32,
    /// Display only; has no authorization effect.
    #[serde(default, alias = "dono_username")]
    pub owner_handle: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GatewayConfig {
    pub fn new(
        authorized_ids: impl IntoIterator<Item = Identity>,
        max_attempts: u32,
        owner_handle: impl Into<String>,
    ) -> Self {
        Self {
            authorized_ids: authorized_ids.into_iter().collect(),
            blocked_ids: BTreeSet::new(),
            max_attempts,
            owner_handle: owner_handle.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Check the structural invariants a loaded configuration must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be positive".to_string());
        }
        if let Some(id) = self.authorized_ids.intersection(&self.blocked_ids).next() {
            return Err(format!("identity {id} is both authorized and blocked"));
        }
        Ok(())
    }

    pub fn status_of(&self, identity: Identity) -> Option<AccessStatus> {
        if self.blocked_ids.contains(&identity) {
            Some(AccessStatus::Blocked)
        } else if self.authorized_ids.contains(&identity) {
            Some(AccessStatus::Authorized)
        } else {
            None
        }
    }

    /// String value of an unowned key, e.g. `token`.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

// ─── Decisions ────────────────────────────────────────────────

/// Outcome of evaluating one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny {
        attempt: u32,
        max_attempts: u32,
        /// Set when the threshold was reached but the block could not be
        /// recorded durably. The identity stays unauthorized.
        pending_block: Option<String>,
    },
    Blocked {
        /// True only for the evaluation that performed the transition.
        newly_blocked: bool,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}
