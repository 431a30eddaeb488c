//! Local executable tools.
//!
//! The model's arguments are JSON-encoded and passed as the single positional
//! argument; trimmed stdout is the answer. Unlike a chat shell tool, a failure
//! here is an error, never text handed back to the model.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::constants::{TOOL_MAX_OUTPUT_SIZE, TOOL_STRIPPED_ENV_VARS};

/// Runs an external tool process.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(&self, path: &Path, json_args: &str, timeout: Duration) -> Result<String>;
}

/// Spawns tools with tokio in the working directory of the run.
pub struct CommandExecutor {
    working_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

/// Truncate `output` to at most `TOOL_MAX_OUTPUT_SIZE` bytes, appending a
/// notice when truncation occurs.
fn cap_output(output: &str) -> String {
    if output.len() <= TOOL_MAX_OUTPUT_SIZE {
        return output.to_string();
    }
    let mut end = TOOL_MAX_OUTPUT_SIZE;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n... output truncated at {} bytes",
        &output[..end],
        TOOL_MAX_OUTPUT_SIZE
    )
}

#[async_trait]
impl ProcessExecutor for CommandExecutor {
    async fn run(&self, path: &Path, json_args: &str, timeout: Duration) -> Result<String> {
        let mut cmd = tokio::process::Command::new(path);
        cmd.arg(json_args);
        cmd.current_dir(&self.working_dir);

        for var in TOOL_STRIPPED_ENV_VARS {
            cmd.env_remove(var);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the future on timeout must not leave the process behind.
        cmd.kill_on_drop(true);

        tracing::debug!(tool = %path.display(), "spawning tool process");
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", path.display()))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("'{}' timed out after {}s", path.display(), timeout.as_secs()))?
            .with_context(|| format!("Failed to wait for '{}'", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            bail!("exit status {}: {}", code, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(cap_output(stdout.trim()))
    }
}
