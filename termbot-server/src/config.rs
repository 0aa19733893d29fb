//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use termbot_core::{GatewayConfig, Identity};

use crate::shell::DEFAULT_SHELL;
use crate::telegram::DEFAULT_API_URL;

/// Config key read when no token is given on the command line or in the
/// environment.
pub const CONFIG_TOKEN_KEY: &str = "token";

#[derive(Parser)]
#[command(name = "termbot")]
#[command(version)]
#[command(about = "Remote terminal over Telegram, gated by an allowlist with automatic lockout")]
pub struct Cli {
    /// Access-control file (allowlist, blocklist, attempt threshold)
    #[arg(long, env = "TERMBOT_CONFIG", default_value = "config.json", global = true)]
    pub config: PathBuf,

    /// Bot API token. Falls back to the `token` key of the config file
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Bot API host, for self-hosted Bot API servers
    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Upper bound for one shell command or telemetry query
    #[arg(long, env = "TERMBOT_COMMAND_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub command_timeout_secs: u64,

    /// Long-poll timeout passed to getUpdates
    #[arg(long, env = "TERMBOT_POLL_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub poll_timeout_secs: u64,

    /// Chat that receives block notices
    #[arg(long, env = "TERMBOT_OPERATOR_CHAT", allow_negative_numbers = true, global = true)]
    pub operator_chat: Option<i64>,

    /// Shell used to run /cmd
    #[arg(long, env = "TERMBOT_SHELL", default_value = DEFAULT_SHELL, global = true)]
    pub shell: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot (default)
    Run,

    /// Edit the access-control file. Stop the bot first
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Print the current allowlist and blocklist
    Show,
    /// Add an identity to the allowlist
    Authorize {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Remove an identity from the allowlist
    Revoke {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Remove an identity from the blocklist
    Unblock {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

impl AdminAction {
    pub fn identity(&self) -> Option<Identity> {
        match self {
            AdminAction::Show => None,
            AdminAction::Authorize { id }
            | AdminAction::Revoke { id }
            | AdminAction::Unblock { id } => Some(Identity(*id)),
        }
    }
}

impl Cli {
    pub fn resolved_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Token from the flag/environment, else from the config file.
    pub fn resolve_token(&self, config: &GatewayConfig) -> Result<String> {
        let token = self
            .token
            .as_deref()
            .or_else(|| config.extra_str(CONFIG_TOKEN_KEY))
            .map(str::trim)
            .unwrap_or_default();
        if token.is_empty() {
            bail!(
                "no bot token: set TELEGRAM_BOT_TOKEN, pass --token, or add a \"{CONFIG_TOKEN_KEY}\" key to {}",
                self.config.display()
            );
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["termbot", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.resolved_command(), Commands::Run);
        assert_eq!(cli.config, PathBuf::from("/tmp/c.json"));
    }

    #[test]
    fn test_api_url_flag() {
        let cli = Cli::try_parse_from(["termbot", "--api-url", "http://localhost:8081"]).unwrap();
        assert_eq!(cli.api_url, "http://localhost:8081");
    }

    #[test]
    fn test_admin_subcommands() {
        let cli = Cli::try_parse_from(["termbot", "admin", "unblock", "42"]).unwrap();
        assert_eq!(
            cli.resolved_command(),
            Commands::Admin {
                action: AdminAction::Unblock { id: 42 }
            }
        );

        let cli = Cli::try_parse_from(["termbot", "admin", "authorize", "-100"]).unwrap();
        match cli.resolved_command() {
            Commands::Admin { action } => assert_eq!(action.identity(), Some(Identity(-100))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_token_from_flag_wins() {
        let cli = Cli::try_parse_from(["termbot", "--token", "abc"]).unwrap();
        let mut config = GatewayConfig::new([], 3, "");
        config
            .extra
            .insert("token".into(), serde_json::Value::String("file".into()));
        assert_eq!(cli.resolve_token(&config).unwrap(), "abc");
    }

    #[test]
    fn test_token_falls_back_to_config() {
        let mut cli = Cli::try_parse_from(["termbot"]).unwrap();
        cli.token = None;
        let mut config = GatewayConfig::new([], 3, "");
        assert!(cli.resolve_token(&config).is_err());

        config
            .extra
            .insert("token".into(), serde_json::Value::String(" file ".into()));
        assert_eq!(cli.resolve_token(&config).unwrap(), "file");
    }
}
