//! Permission configuration and runtime checking for tool execution.
//!
//! Provides [`PermissionManager`] which loads permission rules from config
//! and decides whether each tool call runs, waits for operator confirmation,
//! or is refused. The [`Operator`] trait is the seam to whoever answers the
//! confirmation prompt and the `stdin-prompt` tool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, MutexGuard};

use crate::constants::PROMPT_ARGS_DISPLAY_LIMIT;

/// Permission level for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Ask,
    Deny,
}

/// Configuration for the permission system.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PermissionConfig {
    /// Per-tool permissions: tool_name -> Permission
    #[serde(default)]
    pub tools: HashMap<String, Permission>,
}

/// Manages runtime permission checks.
pub struct PermissionManager {
    config: PermissionConfig,
    /// Skip every confirmation (`--yes`). Never overrides `deny`.
    auto_approve: bool,
    /// Run-level overrides (the operator chose "always" for a tool).
    session_overrides: Mutex<HashMap<String, Permission>>,
}

impl PermissionManager {
    pub fn new(config: PermissionConfig, auto_approve: bool) -> Self {
        Self {
            config,
            auto_approve,
            session_overrides: Mutex::new(HashMap::new()),
        }
    }

    fn overrides(&self) -> MutexGuard<'_, HashMap<String, Permission>> {
        // A panic while holding the lock leaves the map intact.
        self.session_overrides
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check permission for a tool call. Returns the action to take.
    ///
    /// `requires_confirmation` is the tool's own request (binding flag or
    /// a remote tool's destructive hint).
    pub fn check(&self, tool_name: &str, requires_confirmation: bool) -> Permission {
        if let Some(perm) = self.overrides().get(tool_name) {
            return *perm;
        }

        match self.config.tools.get(tool_name) {
            Some(Permission::Deny) => Permission::Deny,
            Some(Permission::Allow) => Permission::Allow,
            Some(Permission::Ask) | None if self.auto_approve => Permission::Allow,
            Some(Permission::Ask) => Permission::Ask,
            None if requires_confirmation => Permission::Ask,
            None => Permission::Allow,
        }
    }

    /// Set a run-level override (used when the operator chooses "always").
    pub fn set_session_override(&self, tool_name: &str, perm: Permission) {
        self.overrides().insert(tool_name.to_string(), perm);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Yes,
    No,
    Always,
}

impl PromptResponse {
    /// Parses an operator answer. Anything unrecognised counts as "no".
    pub fn parse(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => PromptResponse::Yes,
            "a" | "always" => PromptResponse::Always,
            _ => PromptResponse::No,
        }
    }
}

/// Whoever sits at the terminal during a run.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Ask whether `tool_name` may run with `args`.
    async fn confirm(&self, tool_name: &str, args: &str) -> Result<PromptResponse>;

    /// Read one line of free-form input. End of input yields an empty line.
    async fn read_line(&self, prompt: &str) -> Result<String>;
}

/// Operator backed by the process's stdin/stderr.
///
/// Reads happen on the blocking pool so a waiting prompt never stalls
/// timers running on the async runtime.
pub struct StdinOperator;

fn display_args(args: &str) -> String {
    if args.chars().count() > PROMPT_ARGS_DISPLAY_LIMIT {
        let head: String = args.chars().take(PROMPT_ARGS_DISPLAY_LIMIT).collect();
        format!("{}...", head)
    } else {
        args.to_string()
    }
}

fn read_stdin_line(prompt: String) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[async_trait]
impl Operator for StdinOperator {
    async fn confirm(&self, tool_name: &str, args: &str) -> Result<PromptResponse> {
        let prompt = format!(
            "\nTool '{}' wants to execute:\n{}\n\nAllow? [y]es / [n]o / [a]lways: ",
            tool_name,
            display_args(args)
        );
        let answer = tokio::task::spawn_blocking(move || read_stdin_line(prompt))
            .await
            .context("confirmation prompt task failed")??;
        Ok(PromptResponse::parse(&answer))
    }

    async fn read_line(&self, prompt: &str) -> Result<String> {
        let prompt = format!("{} ", prompt.trim_end());
        tokio::task::spawn_blocking(move || read_stdin_line(prompt))
            .await
            .context("operator input task failed")?
    }
}
