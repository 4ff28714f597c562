//! Command execution for the Azure CLI credential source.

use crate::{RecoveryError, Result};
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::process::Command;

/// Program name of the Azure CLI.
pub const AZ_PROGRAM: &str = "az";

/// Executes a command and returns stdout as a string.
///
/// # Arguments
///
/// - `program`: Command to execute (e.g., "az")
/// - `args`: Command arguments
///
/// # Errors
///
/// Returns [`RecoveryError::CommandFailed`] if:
/// - Command not found
/// - Exit code is non-zero
/// - Output is not valid UTF-8
pub async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    tracing::debug!(program, ?args, "running command");

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RecoveryError::CommandFailed(format!("{} command not found", program))
        } else {
            RecoveryError::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecoveryError::CommandFailed(format!(
            "{} failed with exit code {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| {
        RecoveryError::Other(anyhow::anyhow!("Invalid UTF-8 in command output: {}", e))
    })
}

/// Runs `program` with `args` and parses its stdout as JSON.
pub async fn run_json<T: DeserializeOwned>(program: &str, args: &[&str]) -> Result<T> {
    let stdout = run_command(program, args).await?;
    Ok(serde_json::from_str(&stdout)?)
}
