//! In-memory [`AccessStore`] for tests and dry runs.
//!
//! Counts persist calls and can be told to fail the next N writes, which is
//! how the gateway's persist-failure path is exercised.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::AccessStore;
use crate::types::GatewayConfig;

#[derive(Debug, Default)]
pub struct MemoryAccessStore {
    stored: Mutex<Option<GatewayConfig>>,
    persist_calls: AtomicUsize,
    fail_next: AtomicU32,
    persist_delay: Option<Duration>,
}

impl MemoryAccessStore {
    /// A store that already holds `config`.
    pub fn with_config(config: GatewayConfig) -> Self {
        Self {
            stored: Mutex::new(Some(config)),
            ..Self::default()
        }
    }

    /// Sleep inside every persist call. Widens race windows in tests.
    pub fn with_persist_delay(mut self, delay: Duration) -> Self {
        self.persist_delay = Some(delay);
        self
    }

    /// Make the next `n` persist calls fail with `PersistFailure`.
    pub fn fail_next_persists(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of persist calls made, successful or not.
    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// Last successfully persisted configuration.
    pub fn snapshot(&self) -> Option<GatewayConfig> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn load(&self) -> Result<GatewayConfig, StoreError> {
        let config = self.snapshot().ok_or_else(|| StoreError::ConfigMissing {
            path: "<memory>".into(),
        })?;
        config
            .validate()
            .map_err(|reason| StoreError::ConfigCorrupt { reason })?;
        Ok(config)
    }

    async fn persist(&self, config: &GatewayConfig) -> Result<(), StoreError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.persist_delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::PersistFailure {
                reason: "injected failure".to_string(),
            });
        }

        *self
            .stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    #[tokio::test]
    async fn test_empty_store_is_missing() {
        let store = MemoryAccessStore::default();
        assert!(matches!(
            store.load().await,
            Err(StoreError::ConfigMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryAccessStore::with_config(GatewayConfig::new([Identity(1)], 3, "o"));
        store.fail_next_persists(1);

        let mut next = store.load().await.unwrap();
        next.blocked_ids.insert(Identity(2));

        assert!(store.persist(&next).await.is_err());
        assert!(!store.snapshot().unwrap().blocked_ids.contains(&Identity(2)));

        store.persist(&next).await.unwrap();
        assert!(store.snapshot().unwrap().blocked_ids.contains(&Identity(2)));
        assert_eq!(store.persist_calls(), 2);
    }
}
