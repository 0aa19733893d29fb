//! Request dispatcher: authorization first, then routing to the executor or
//! telemetry collaborator.
//!
//! `handle` never fails. Collaborator errors, timeouts and panics are turned
//! into error replies so one request cannot affect another.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::commands::{Command, TelemetryQuery, TOP_PROCESSES};
use crate::error::{ExecutorError, TelemetryError};
use crate::executor::Executor;
use crate::format::{self, Reply};
use crate::gateway::AuthorizationGateway;
use crate::telemetry::Telemetry;
use crate::types::Identity;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// One inbound chat event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub identity: Identity,
    pub chat_id: i64,
    pub first_name: Option<String>,
    pub text: String,
}

pub struct RequestDispatcher {
    gateway: Arc<AuthorizationGateway>,
    executor: Arc<dyn Executor>,
    telemetry: Arc<dyn Telemetry>,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(
        gateway: Arc<AuthorizationGateway>,
        executor: Arc<dyn Executor>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            gateway,
            executor,
            telemetry,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Bound for executor and telemetry calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &Arc<AuthorizationGateway> {
        &self.gateway
    }

    pub async fn handle(&self, request: &Request) -> Reply {
        let decision = self.gateway.evaluate(request.identity).await;
        if let Some(reply) = format::decision_reply(&decision, &self.gateway.owner_handle()) {
            return reply;
        }

        match Command::parse(&request.text) {
            Command::Start => Reply::Text(format::render_start(
                request.first_name.as_deref(),
                self.gateway.max_attempts(),
                &self.gateway.owner_handle(),
            )),
            Command::Help => Reply::Text(format::render_help(
                self.gateway.max_attempts(),
                &self.gateway.owner_handle(),
            )),
            Command::Shell(command) if command.is_empty() => {
                Reply::text("ℹ️ Usage: /cmd <command>\n📝 Example: /cmd ls -la")
            }
            Command::Shell(command) => self.run_shell(request.identity, command).await,
            Command::Telemetry(query) => self.query_telemetry(query).await,
            Command::Unknown(_) => Reply::text("❓ Unknown command. Use /help to list commands."),
        }
    }

    async fn run_shell(&self, identity: Identity, command: String) -> Reply {
        tracing::info!(%identity, command = %command, "Executing shell command");
        let executor = Arc::clone(&self.executor);
        let task = tokio::spawn(async move { executor.run(&command).await });

        match with_deadline(self.timeout, task).await {
            Ok(Ok(output)) => {
                tracing::debug!(%identity, exit_code = ?output.exit_code, "Shell command finished");
                format::render_command_output(&output)
            }
            Ok(Err(e)) => {
                tracing::warn!(%identity, error = %e, "Shell command failed");
                Reply::text(format!("❌ Error: {e}"))
            }
            Err(Outcome::TimedOut) => {
                let e = ExecutorError::Timeout(self.timeout);
                tracing::warn!(%identity, error = %e, "Shell command cancelled");
                Reply::text(format!("⏱️ {e}. The process was terminated."))
            }
            Err(Outcome::Panicked(msg)) => {
                tracing::error!(%identity, error = %msg, "Executor task panicked");
                Reply::text("❌ An internal error occurred while running the command.")
            }
        }
    }

    async fn query_telemetry(&self, query: TelemetryQuery) -> Reply {
        let telemetry = Arc::clone(&self.telemetry);
        let task = tokio::spawn(async move {
            match query {
                TelemetryQuery::Status => telemetry
                    .system_status()
                    .await
                    .map(|s| format::render_status(&s)),
                TelemetryQuery::Memory => telemetry.memory().await.map(|m| format::render_memory(&m)),
                TelemetryQuery::Disk => telemetry.disks().await.map(|d| format::render_disks(&d)),
                TelemetryQuery::Network => telemetry
                    .networks()
                    .await
                    .map(|n| format::render_networks(&n)),
                TelemetryQuery::Processes => telemetry
                    .top_processes(TOP_PROCESSES)
                    .await
                    .map(|p| format::render_processes(&p)),
            }
        });

        match with_deadline(self.timeout, task).await {
            Ok(Ok(text)) => Reply::Text(text),
            Ok(Err(e)) => {
                tracing::warn!(?query, error = %e, "Telemetry query failed");
                Reply::text(format!("❌ {e}"))
            }
            Err(Outcome::TimedOut) => Reply::text(format!(
                "❌ {}",
                TelemetryError::Timeout(self.timeout)
            )),
            Err(Outcome::Panicked(msg)) => {
                tracing::error!(?query, error = %msg, "Telemetry task panicked");
                Reply::text("❌ An internal error occurred while collecting telemetry.")
            }
        }
    }
}

#[derive(Debug)]
enum Outcome {
    TimedOut,
    Panicked(String),
}

/// Await a collaborator task with a timeout. The task is aborted on timeout,
/// which drops its future and whatever it owns (a child process included).
async fn with_deadline<T>(timeout: Duration, mut task: JoinHandle<T>) -> Result<T, Outcome> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(Outcome::Panicked(join_error.to_string())),
        Err(_) => {
            task.abort();
            Err(Outcome::TimedOut)
        }
    }
}

/// Spawn-and-forget helper for callers that want to drive a request in the
/// background and deliver the reply themselves.
pub fn spawn_handle<F, Fut>(dispatcher: Arc<RequestDispatcher>, request: Request, deliver: F)
where
    F: FnOnce(Request, Reply) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let reply = dispatcher.handle(&request).await;
        deliver(request, reply).await;
    });
}
