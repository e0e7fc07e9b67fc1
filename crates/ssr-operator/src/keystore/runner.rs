//! External command execution for store synthesis
//!
//! Commands run to completion with no internal timeout; a caller that needs
//! a bound wraps the future, and dropping it kills the child. Output is
//! captured in full so a failing `keytool` or `openssl` invocation can be
//! diagnosed from the logs.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use ssr_common::Error;

/// Captured result of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub status: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Convert a non-zero exit into `ExternalToolFailure`
    pub fn into_result(self, program: &str) -> Result<Self, Error> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::ExternalToolFailure {
                program: program.to_string(),
                status: self.status,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs an external program to completion
///
/// Implementations only fail when the program could not be run at all; a
/// non-zero exit is reported through [`CommandOutput::status`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, Error>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, Error> {
        debug!(program, "running external tool");
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                warn!(program, error = %e, "spawn failed");
                Error::ExternalToolFailure {
                    program: program.to_string(),
                    status: None,
                    stdout: String::new(),
                    stderr: format!("failed to execute: {}", e),
                }
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
