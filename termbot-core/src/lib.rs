//! termbot core: the access gate in front of a chat-driven remote terminal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Transport (Telegram polling, in termbot-server)         │
//! └──────────────────────────────────────────────────────────┘
//!                          │ Request { identity, chat, text }
//!                          ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 RequestDispatcher                        │
//! └──────────────────────────────────────────────────────────┘
//!            │ evaluate(identity)             │ Allow
//!            ▼                                ▼
//! ┌─────────────────────────┐   ┌────────────────────────────┐
//! │  AuthorizationGateway   │   │  Executor  |  Telemetry    │
//! └─────────────────────────┘   └────────────────────────────┘
//!            │ persist (on block)
//!            ▼
//! ┌─────────────────────────┐
//! │  AccessStore (JSON)     │
//! └─────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let store: Arc<dyn AccessStore> = Arc::new(FileAccessStore::new("config.json"));
//! let gateway = Arc::new(AuthorizationGateway::load(store).await?);
//! let dispatcher = RequestDispatcher::new(gateway, executor, telemetry)
//!     .with_timeout(Duration::from_secs(60));
//! let reply = dispatcher.handle(&request).await;
//! ```

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod format;
pub mod gateway;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod telemetry;
pub mod types;

pub use commands::{Command, TelemetryQuery};
pub use dispatcher::{Request, RequestDispatcher};
pub use error::{ExecutorError, StoreError, TelemetryError};
pub use events::GatewayEvent;
pub use executor::{CommandOutput, Executor};
pub use format::{OutboundMessage, Reply, TextFormat, MESSAGE_CHUNK_CHARS};
pub use gateway::AuthorizationGateway;
pub use store::AccessStore;
pub use store_file::FileAccessStore;
pub use store_memory::MemoryAccessStore;
pub use telemetry::Telemetry;
pub use types::{AccessStatus, Decision, GatewayConfig, Identity};
