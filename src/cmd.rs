//! Command executor for the external CLI
//!
//! Runs a command, captures stdout/stderr and reports the exit code. A
//! command that outlives its timeout is killed.
//!
//! # Example
//!
//! ```ignore
//! use pipelines_e2e::cmd;
//! use std::time::Duration;
//!
//! let result = cmd::must_succeed("oc", &["get", "tektonconfig", "config"], Duration::from_secs(60)).await?;
//! println!("{}", result.stdout);
//! ```

use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for [`run`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code, `-1` when killed by a signal
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl RunResult {
    /// True when the command exited with status 0
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Errors from running commands
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("expected exit code {expected} but got {actual} from '{command}'\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    UnexpectedExit {
        command: String,
        expected: i32,
        actual: i32,
        stdout: String,
        stderr: String,
    },

    #[error("unexpected output from '{command}': expected {expected}\noutput:\n{output}")]
    UnexpectedOutput {
        command: String,
        expected: String,
        output: String,
    },
}

/// Run a command with [`DEFAULT_TIMEOUT`]
pub async fn run(program: &str, args: &[&str]) -> Result<RunResult, RunnerError> {
    run_with_timeout(program, args, DEFAULT_TIMEOUT).await
}

/// Run a command with extra environment variables
pub async fn run_with_env(
    program: &str,
    args: &[&str],
    env: &HashMap<String, String>,
) -> Result<RunResult, RunnerError> {
    let mut cmd = Command::new(program);
    cmd.args(args).envs(env);
    execute(cmd, &describe(program, args), DEFAULT_TIMEOUT).await
}

/// Run a command, killing it after `timeout`
pub async fn run_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<RunResult, RunnerError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    execute(cmd, &describe(program, args), timeout).await
}

/// Run a command and require exit code 0
pub async fn must_succeed(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<RunResult, RunnerError> {
    assert_exit_code(0, program, args, timeout).await
}

/// Run a command and require a specific exit code
pub async fn assert_exit_code(
    expected: i32,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<RunResult, RunnerError> {
    let result = run_with_timeout(program, args, timeout).await?;
    if result.exit_code != expected {
        return Err(RunnerError::UnexpectedExit {
            command: describe(program, args),
            expected,
            actual: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        });
    }
    Ok(result)
}

async fn execute(
    mut cmd: Command,
    command: &str,
    timeout: Duration,
) -> Result<RunResult, RunnerError> {
    cmd.kill_on_drop(true);
    debug!(command = %command, timeout = ?timeout, "Running command");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunnerError::CommandNotFound(command.to_string()));
        }
        Ok(Err(e)) => return Err(RunnerError::ExecutionFailed(e.to_string())),
        Err(_) => {
            return Err(RunnerError::Timeout {
                command: command.to_string(),
                timeout,
            });
        }
    };

    let result = RunResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    debug!(command = %command, exit_code = result.exit_code, "Command finished");
    Ok(result)
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
