//! Authorization gateway: per-identity access decisions and the lockout
//! state machine.
//!
//! ```text
//!                 deny (count < max)
//!                ┌──────────────┐
//!                ▼              │
//!   ──► Unauthorized(count) ────┘
//!                │
//!                │ count ≥ max, persist ok
//!                ▼
//!             Blocked  (terminal, persisted)
//!
//!   Authorized (static allowlist, never mutated)
//! ```
//!
//! Evaluations of one identity are serialized by a per-identity async mutex
//! held across the whole increment/compare/persist sequence. Writes of the
//! configuration are serialized by a single writer lock, and the in-memory
//! snapshot is only replaced after the store accepted the new state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::events::GatewayEvent;
use crate::store::AccessStore;
use crate::types::{now_ms, AccessStatus, Decision, GatewayConfig, Identity};

const EVENT_CAPACITY: usize = 256;

/// Failure counter for one unauthorized identity.
type AttemptSlot = Arc<tokio::sync::Mutex<u32>>;

pub struct AuthorizationGateway {
    store: Arc<dyn AccessStore>,
    /// Published configuration. Replaced wholesale after each successful persist.
    config: RwLock<Arc<GatewayConfig>>,
    /// Single-writer discipline for persist.
    writer: tokio::sync::Mutex<()>,
    attempts: Mutex<HashMap<Identity, AttemptSlot>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl AuthorizationGateway {
    /// Build a gateway over an already loaded configuration.
    pub fn new(store: Arc<dyn AccessStore>, config: GatewayConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            config: RwLock::new(Arc::new(config)),
            writer: tokio::sync::Mutex::new(()),
            attempts: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Load the configuration from `store` and build a gateway over it.
    ///
    /// Any error here is fatal for the caller: there is no safe default for
    /// an access-control list.
    pub async fn load(store: Arc<dyn AccessStore>) -> Result<Self, StoreError> {
        let config = store.load().await?;
        tracing::info!(
            authorized = config.authorized_ids.len(),
            blocked = config.blocked_ids.len(),
            max_attempts = config.max_attempts,
            "Access configuration loaded"
        );
        Ok(Self::new(store, config))
    }

    /// Subscribe to gateway events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Current published configuration.
    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn max_attempts(&self) -> u32 {
        self.config().max_attempts
    }

    pub fn owner_handle(&self) -> String {
        self.config().owner_handle.clone()
    }

    /// Decide whether `identity` may proceed, advancing the lockout state
    /// machine for unauthorized identities.
    pub async fn evaluate(&self, identity: Identity) -> Decision {
        match self.config().status_of(identity) {
            Some(AccessStatus::Blocked) => {
                tracing::debug!(%identity, "Blocked identity rejected");
                return Decision::Blocked {
                    newly_blocked: false,
                };
            }
            Some(AccessStatus::Authorized) => {
                tracing::debug!(%identity, "Authorized");
                return Decision::Allow;
            }
            _ => {}
        }

        let slot = self.attempt_slot(identity);
        let mut count = slot.lock().await;

        // Another evaluation of this identity may have blocked it while we
        // waited for the slot.
        let config = self.config();
        if config.blocked_ids.contains(&identity) {
            return Decision::Blocked {
                newly_blocked: false,
            };
        }

        *count = count.saturating_add(1);
        let attempt = *count;
        let max_attempts = config.max_attempts;

        if attempt < max_attempts {
            tracing::warn!(%identity, attempt, max_attempts, "Unauthorized attempt");
            self.emit(GatewayEvent::AttemptDenied {
                identity,
                attempt,
                max_attempts,
                at: now_ms(),
            });
            return Decision::Deny {
                attempt,
                max_attempts,
                pending_block: None,
            };
        }

        match self.block(identity).await {
            Ok(newly_blocked) => {
                *count = 0;
                drop(count);
                self.release_slot(identity);
                if newly_blocked {
                    tracing::warn!(%identity, attempts = attempt, "Identity blocked");
                    self.emit(GatewayEvent::IdentityBlocked {
                        identity,
                        attempts: attempt,
                        at: now_ms(),
                    });
                }
                Decision::Blocked { newly_blocked }
            }
            Err(e) => {
                tracing::error!(
                    %identity,
                    attempt,
                    error = %e,
                    "Failed to persist block; identity remains unauthorized"
                );
                self.emit(GatewayEvent::PersistFailed {
                    identity,
                    attempt,
                    reason: e.to_string(),
                    at: now_ms(),
                });
                // Retries keep counting; the reply never reads past the threshold.
                Decision::Deny {
                    attempt: attempt.min(max_attempts),
                    max_attempts,
                    pending_block: Some(e.to_string()),
                }
            }
        }
    }

    /// Current status of `identity`, including the in-memory failure count.
    pub async fn status(&self, identity: Identity) -> AccessStatus {
        if let Some(status) = self.config().status_of(identity) {
            return status;
        }
        let slot = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&identity)
            .cloned();
        let failure_count = match slot {
            Some(slot) => *slot.lock().await,
            None => 0,
        };
        AccessStatus::Unauthorized { failure_count }
    }

    /// Add `identity` to the blocked set and persist. The published snapshot
    /// is only replaced once the store accepted the write.
    ///
    /// Returns `false` if the identity was already blocked.
    async fn block(&self, identity: Identity) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;

        let current = self.config();
        if current.blocked_ids.contains(&identity) {
            return Ok(false);
        }

        let mut next = GatewayConfig::clone(&current);
        next.blocked_ids.insert(identity);
        self.store.persist(&next).await?;

        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(next);
        Ok(true)
    }

    fn attempt_slot(&self, identity: Identity) -> AttemptSlot {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(identity)
            .or_default()
            .clone()
    }

    fn release_slot(&self, identity: Identity) {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&identity);
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryAccessStore;
    use proptest::prelude::*;

    const OWNER: &str = "owner";

    fn gateway_with(
        authorized: &[i64],
        max_attempts: u32,
    ) -> (Arc<MemoryAccessStore>, AuthorizationGateway) {
        let config = GatewayConfig::new(authorized.iter().copied().map(Identity), max_attempts, OWNER);
        let store = Arc::new(MemoryAccessStore::with_config(config.clone()));
        let gateway = AuthorizationGateway::new(store.clone(), config);
        (store, gateway)
    }

    fn deny(attempt: u32, max_attempts: u32) -> Decision {
        Decision::Deny {
            attempt,
            max_attempts,
            pending_block: None,
        }
    }

    #[tokio::test]
    async fn test_authorized_identity_is_allowed_without_counting() {
        let (store, gateway) = gateway_with(&[7], 3);

        for _ in 0..10 {
            assert_eq!(gateway.evaluate(Identity(7)).await, Decision::Allow);
        }
        assert_eq!(gateway.status(Identity(7)).await, AccessStatus::Authorized);
        assert_eq!(store.persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_lockout_after_max_attempts() {
        let (store, gateway) = gateway_with(&[], 3);
        let x = Identity(42);

        assert_eq!(gateway.evaluate(x).await, deny(1, 3));
        assert_eq!(gateway.evaluate(x).await, deny(2, 3));
        assert_eq!(store.persist_calls(), 0);

        assert_eq!(
            gateway.evaluate(x).await,
            Decision::Blocked {
                newly_blocked: true
            }
        );
        assert_eq!(store.persist_calls(), 1);
        assert!(store.snapshot().unwrap().blocked_ids.contains(&x));

        assert_eq!(
            gateway.evaluate(x).await,
            Decision::Blocked {
                newly_blocked: false
            }
        );
        assert_eq!(store.persist_calls(), 1);
        assert_eq!(gateway.status(x).await, AccessStatus::Blocked);
    }

    #[tokio::test]
    async fn test_threshold_of_one_blocks_immediately() {
        let (store, gateway) = gateway_with(&[], 1);

        assert_eq!(
            gateway.evaluate(Identity(5)).await,
            Decision::Blocked {
                newly_blocked: true
            }
        );
        assert_eq!(store.persist_calls(), 1);
    }

    #[tokio::test]
    async fn test_identities_are_counted_independently() {
        let (_store, gateway) = gateway_with(&[], 3);

        assert_eq!(gateway.evaluate(Identity(1)).await, deny(1, 3));
        assert_eq!(gateway.evaluate(Identity(2)).await, deny(1, 3));
        assert_eq!(gateway.evaluate(Identity(1)).await, deny(2, 3));
        assert_eq!(
            gateway.status(Identity(2)).await,
            AccessStatus::Unauthorized { failure_count: 1 }
        );
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_identity_unauthorized() {
        let (store, gateway) = gateway_with(&[], 2);
        let x = Identity(9);
        let mut events = gateway.subscribe();

        assert_eq!(gateway.evaluate(x).await, deny(1, 2));

        store.fail_next_persists(1);
        match gateway.evaluate(x).await {
            Decision::Deny {
                attempt: 2,
                max_attempts: 2,
                pending_block: Some(reason),
            } => assert!(reason.contains("injected failure")),
            other => panic!("unexpected decision: {other:?}"),
        }
        assert_eq!(
            gateway.status(x).await,
            AccessStatus::Unauthorized { failure_count: 2 }
        );
        assert!(!gateway.config().blocked_ids.contains(&x));
        assert!(!store.snapshot().unwrap().blocked_ids.contains(&x));

        // Next denied attempt retries the persist.
        assert_eq!(
            gateway.evaluate(x).await,
            Decision::Blocked {
                newly_blocked: true
            }
        );
        assert_eq!(store.persist_calls(), 2);
        assert!(store.snapshot().unwrap().blocked_ids.contains(&x));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], GatewayEvent::AttemptDenied { attempt: 1, .. }));
        assert!(matches!(seen[1], GatewayEvent::PersistFailed { attempt: 2, .. }));
        assert!(matches!(seen[2], GatewayEvent::IdentityBlocked { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_repeated_persist_failures_report_attempt_at_threshold() {
        let (store, gateway) = gateway_with(&[], 3);
        let x = Identity(21);

        gateway.evaluate(x).await;
        gateway.evaluate(x).await;
        store.fail_next_persists(3);
        for _ in 0..3 {
            match gateway.evaluate(x).await {
                Decision::Deny {
                    attempt,
                    max_attempts,
                    pending_block: Some(_),
                } => assert_eq!((attempt, max_attempts), (3, 3)),
                other => panic!("unexpected decision: {other:?}"),
            }
        }
        assert_eq!(
            gateway.evaluate(x).await,
            Decision::Blocked {
                newly_blocked: true
            }
        );
    }

    #[tokio::test]
    async fn test_preexisting_block_is_respected() {
        let mut config = GatewayConfig::new([], 3, OWNER);
        config.blocked_ids.insert(Identity(13));
        let store = Arc::new(MemoryAccessStore::with_config(config.clone()));
        let gateway = AuthorizationGateway::new(store.clone(), config);

        for _ in 0..5 {
            assert_eq!(
                gateway.evaluate(Identity(13)).await,
                Decision::Blocked {
                    newly_blocked: false
                }
            );
        }
        assert_eq!(store.persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = Arc::new(MemoryAccessStore::with_config(GatewayConfig::new(
            [Identity(1)],
            4,
            OWNER,
        )));
        let gateway = AuthorizationGateway::load(store).await.unwrap();

        assert_eq!(gateway.max_attempts(), 4);
        assert_eq!(gateway.owner_handle(), OWNER);
    }

    #[tokio::test]
    async fn test_load_missing_config_fails() {
        let store = Arc::new(MemoryAccessStore::default());
        assert!(matches!(
            AuthorizationGateway::load(store).await,
            Err(StoreError::ConfigMissing { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_exactly_max_attempts_block(max_attempts in 1u32..8, extra in 0u32..5) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let (store, gateway) = gateway_with(&[], max_attempts);
                let x = Identity(1000);

                for attempt in 1..max_attempts {
                    prop_assert_eq!(gateway.evaluate(x).await, deny(attempt, max_attempts));
                    prop_assert_eq!(store.persist_calls(), 0);
                }
                prop_assert_eq!(
                    gateway.evaluate(x).await,
                    Decision::Blocked { newly_blocked: true }
                );
                for _ in 0..extra {
                    prop_assert_eq!(
                        gateway.evaluate(x).await,
                        Decision::Blocked { newly_blocked: false }
                    );
                }
                prop_assert_eq!(store.persist_calls(), 1);
                Ok(())
            })?;
        }
    }
}
