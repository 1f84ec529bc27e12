//! Bounded subprocess execution for repository probes.
//!
//! Every invocation carries a hard timeout and a byte cap on captured
//! output. Probes must never hang a turn or balloon memory on a
//! pathological diff.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Output from a bounded subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl SubprocessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run a command with a timeout, capping captured output at `max_bytes`.
pub async fn run_cmd(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
    max_bytes: usize,
) -> Result<SubprocessOutput> {
    tracing::debug!(program, ?args, ?cwd, ?timeout, "spawning subprocess");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context(format!("failed to spawn: {program}"))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let result = SubprocessOutput {
                stdout: cap_lossy(&output.stdout, max_bytes),
                stderr: cap_lossy(&output.stderr, max_bytes),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
            };
            tracing::debug!(
                exit_code = result.exit_code,
                stdout_len = result.stdout.len(),
                "subprocess completed"
            );
            Ok(result)
        }
        Ok(Err(e)) => Err(e).context(format!("subprocess failed: {program}")),
        Err(_) => {
            tracing::warn!(program, ?timeout, "subprocess timed out");
            Ok(SubprocessOutput {
                stdout: String::new(),
                stderr: format!("process timed out after {timeout:?}"),
                exit_code: -1,
                timed_out: true,
            })
        }
    }
}

/// Run a command and return stdout on success, `None` otherwise.
pub async fn run_cmd_stdout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
    max_bytes: usize,
) -> Option<String> {
    match run_cmd(program, args, cwd, timeout, max_bytes).await {
        Ok(output) if output.success() => Some(output.stdout),
        Ok(output) => {
            tracing::debug!(
                program,
                exit_code = output.exit_code,
                timed_out = output.timed_out,
                "probe subprocess unsuccessful"
            );
            None
        }
        Err(e) => {
            tracing::debug!(program, error = %e, "probe subprocess failed to run");
            None
        }
    }
}

/// Decode captured bytes, truncating to the cap on a char boundary.
fn cap_lossy(bytes: &[u8], max_bytes: usize) -> String {
    let decoded = String::from_utf8_lossy(bytes);
    if decoded.len() <= max_bytes {
        return decoded.into_owned();
    }
    continuity_core::hash::clamp_by_bytes(&decoded, max_bytes)
}
