//! Host shell executor.
//!
//! Commands run as `<shell> -c <command>` with stdin closed and both output
//! streams captured up to a byte limit. Each command gets its own process
//! group. If the future driving it is dropped (the dispatcher's timeout does
//! this) the whole group is killed, so processes the shell started go too.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use termbot_core::{CommandOutput, Executor, ExecutorError};

pub const DEFAULT_SHELL: &str = "bash";

/// Per-stream capture limit. Anything past it is drained and discarded.
pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    working_dir: Option<PathBuf>,
    output_limit: usize,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            working_dir: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

/// Kills a process group when dropped, unless disarmed first.
struct GroupKill {
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl GroupKill {
    fn new(pid: Option<u32>) -> Self {
        #[cfg(unix)]
        {
            Self {
                pgid: pid.and_then(|p| i32::try_from(p).ok()).map(nix::unistd::Pid::from_raw),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            Self {}
        }
    }

    fn disarm(&mut self) {
        #[cfg(unix)]
        {
            self.pgid = None;
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            if let Some(pgid) = self.pgid.take() {
                match killpg(pgid, Signal::SIGKILL) {
                    Ok(()) => debug!(pgid = pgid.as_raw(), "Killed process group"),
                    Err(e) => debug!(pgid = pgid.as_raw(), error = ?e, "killpg failed"),
                }
            }
        }
    }
}

/// Read up to `limit` bytes, then drain the rest so the writer never blocks
/// on a full pipe. Returns the captured bytes and how many were dropped.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<(Vec<u8>, u64)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), 0));
    };
    let mut captured = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut captured).await?;
    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((captured, dropped))
}

fn render_stream(bytes: &[u8], dropped: u64) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if dropped > 0 {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("[output truncated: {dropped} more bytes]\n"));
    }
    text
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutorError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutorError::Spawn(format!("{}: {e}", self.shell)))?;
        let mut group = GroupKill::new(child.id());
        debug!(pid = ?child.id(), shell = %self.shell, "Spawned command");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let ((out, out_dropped), (err, err_dropped), status) = tokio::try_join!(
            read_capped(stdout, self.output_limit),
            read_capped(stderr, self.output_limit),
            child.wait(),
        )?;
        group.disarm();

        if out_dropped + err_dropped > 0 {
            debug!(out_dropped, err_dropped, "Command output truncated");
        }
        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: render_stream(&out, out_dropped),
            stderr: render_stream(&err, err_dropped),
        })
    }
}
