use crate::error::StoreError;
use crate::types::GatewayConfig;
use async_trait::async_trait;

/// Persistence trait for the access-control configuration.
///
/// The gateway only ever reads through `load` at startup and writes the full
/// configuration through `persist`. Implementations must make `persist`
/// all-or-nothing: after a failed or interrupted write, a later `load` returns
/// the previous configuration.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Read the persisted configuration.
    ///
    /// Fails with `ConfigMissing` when nothing has been stored yet and with
    /// `ConfigCorrupt` when the stored form cannot be parsed or violates the
    /// configuration invariants.
    async fn load(&self) -> Result<GatewayConfig, StoreError>;

    /// Replace the persisted configuration.
    async fn persist(&self, config: &GatewayConfig) -> Result<(), StoreError>;
}
