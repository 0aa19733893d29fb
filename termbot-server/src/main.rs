//! termbot entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use termbot_core::{AuthorizationGateway, FileAccessStore, RequestDispatcher};
use termbot_server::{
    admin, spawn_audit_relay, BotApi, Cli, Commands, OperatorChannel, PollingTransport,
    ShellExecutor, SysinfoTelemetry, TelegramClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,termbot_core=info,termbot_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = FileAccessStore::new(&cli.config);

    match cli.resolved_command() {
        Commands::Admin { action } => {
            let message = admin::run(&store, &action).await?;
            println!("{message}");
            Ok(())
        }
        Commands::Run => run(cli, store).await,
    }
}

async fn run(cli: Cli, store: FileAccessStore) -> Result<()> {
    info!(config = %cli.config.display(), "Starting termbot");

    // No safe default exists for an access list: refuse to start without one.
    let gateway = AuthorizationGateway::load(Arc::new(store))
        .await
        .with_context(|| format!("loading access configuration from {}", cli.config.display()))?;
    let gateway = Arc::new(gateway);

    let token = cli.resolve_token(&gateway.config())?;
    let client = TelegramClient::new(token)
        .context("building HTTP client")?
        .with_base_url(cli.api_url.clone());
    let me = client
        .get_me()
        .await
        .context("checking bot token with getMe")?;
    info!(bot = me.username.as_deref().unwrap_or(&me.first_name), "Connected to Telegram");

    let api: Arc<dyn BotApi> = Arc::new(client);

    let operator = cli.operator_chat.map(|chat_id| OperatorChannel {
        api: Arc::clone(&api),
        chat_id,
    });
    let relay = spawn_audit_relay(gateway.subscribe(), operator);

    let executor = ShellExecutor::new(cli.shell.clone());
    info!(
        shell = executor.shell(),
        timeout_secs = cli.command_timeout_secs,
        "Shell executor ready"
    );

    let dispatcher = Arc::new(
        RequestDispatcher::new(
            Arc::clone(&gateway),
            Arc::new(executor),
            Arc::new(SysinfoTelemetry::new()),
        )
        .with_timeout(cli.command_timeout()),
    );

    PollingTransport::new(api, dispatcher)
        .with_poll_timeout(cli.poll_timeout_secs)
        .run(shutdown_signal())
        .await;

    relay.abort();
    info!("termbot stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
