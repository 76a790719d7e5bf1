//! Subprocess execution behind an injectable trait

use crate::{CommandOutput, IssuerError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Runs an external command to completion and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting for it to exit.
    ///
    /// When `cancel` fires before the command exits the child is killed and
    /// the call fails with [`IssuerError::Cancelled`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput>;
}

/// Runs commands as real child processes on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(IssuerError::Cancelled);
        }

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => IssuerError::ToolNotFound(program.to_string()),
                _ => IssuerError::IoError(e),
            })?;

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled while waiting for {}", program);
                return Err(IssuerError::Cancelled);
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
