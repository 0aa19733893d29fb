//! termbot server: the Telegram transport and host collaborators around
//! `termbot-core`, plus the offline admin commands.

pub mod admin;
pub mod audit;
pub mod config;
pub mod shell;
pub mod system;
pub mod telegram;
pub mod transport;

pub use audit::{spawn_audit_relay, OperatorChannel};
pub use config::{AdminAction, Cli, Commands};
pub use shell::ShellExecutor;
pub use system::SysinfoTelemetry;
pub use telegram::{TelegramClient, TelegramError};
pub use transport::{BotApi, PollingTransport};
