//! Command execution for hostkeeper probes and remediation
//!
//! Every external tool is invoked as a program plus discrete arguments.
//! Nothing goes through a shell, so entity names can never be interpreted
//! as shell syntax.

use anyhow::{Context, Result};
use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Command execution result
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u128,
}

impl ExecutionResult {
    /// stdout and stderr joined the same way they are shown to the operator
    pub fn combined_output(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\nSTDERR:\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs external programs with a timeout and an optional `sudo -n` prefix
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    use_sudo: bool,
}

impl CommandExecutor {
    pub fn new(timeout: Duration, use_sudo: bool) -> Self {
        Self { timeout, use_sudo }
    }

    /// Execute `program args...`
    ///
    /// A non-zero exit status is reported through `ExecutionResult::success`;
    /// `Err` means the program could not be run at all or timed out.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<ExecutionResult> {
        let start_time = Instant::now();

        let mut command = if self.use_sudo {
            let mut cmd = AsyncCommand::new("sudo");
            cmd.arg("-n").arg(program);
            cmd
        } else {
            AsyncCommand::new(program)
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing {} {:?} (timeout: {:?})", program, args, self.timeout);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .with_context(|| format!("{} timed out after {:?}", program, self.timeout))?
            .with_context(|| format!("Failed to execute {}", program))?;

        let exit_code = output.status.code();

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
