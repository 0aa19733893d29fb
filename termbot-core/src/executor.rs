use async_trait::async_trait;

use crate::error::ExecutorError;

/// Captured result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs arbitrary command text on the host.
///
/// Callers bound the call with a timeout and drop the future when it
/// expires; implementations must stop the underlying process when dropped.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutorError>;
}
