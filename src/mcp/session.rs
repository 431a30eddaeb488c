//! Sessions to remote tool servers.
//!
//! [`StdioSession`] spawns the configured server and speaks newline-delimited
//! JSON-RPC over its stdin/stdout. A reader task routes each response to the
//! waiter registered under its request id.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    JsonRpcMessage, JsonRpcRequest, Tool, ToolsListResult,
};
use crate::config::McpServerConfig;
use crate::constants::{APP_NAME, MCP_PROTOCOL_VERSION, MCP_REQUEST_TIMEOUT_SECS};

/// One connection to a remote tool server.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Server id from the config (`[mcp.<id>]`).
    fn id(&self) -> &str;

    /// Every tool the server offers, following pagination.
    async fn list_tools(&self) -> Result<Vec<Tool>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;

    /// Shuts the session down. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

type Waiters = Arc<StdMutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>>;

fn lock_waiters(
    waiters: &Waiters,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcMessage>>> {
    waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct StdioSession {
    id: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    waiters: Waiters,
    next_id: AtomicU64,
    timeout: Duration,
}

impl StdioSession {
    /// Spawns the server and performs the `initialize` handshake.
    pub async fn connect(id: &str, config: &McpServerConfig) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args);
        cmd.envs(&config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start tool server '{}' ({})", id, config.command))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("tool server '{}' has no stdin", id))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("tool server '{}' has no stdout", id))?;

        let waiters: Waiters = Arc::new(StdMutex::new(HashMap::new()));
        let reader = tokio::spawn(read_messages(id.to_string(), stdout, waiters.clone()));

        let session = Self {
            id: id.to_string(),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
            reader: StdMutex::new(Some(reader)),
            waiters,
            next_id: AtomicU64::new(1),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(MCP_REQUEST_TIMEOUT_SECS)),
        };

        if let Err(err) = session.initialize().await {
            session.close().await.ok();
            return Err(err);
        }
        Ok(session)
    }

    async fn initialize(&self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: APP_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        tracing::debug!(
            server = %self.id,
            protocol = %result.protocol_version,
            name = ?result.server_info.as_ref().map(|s| s.name.as_str()),
            "tool server initialized"
        );
        self.send(&JsonRpcRequest::notification("notifications/initialized"))
            .await
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| anyhow!("tool server '{}' is closed", self.id))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock_waiters(&self.waiters).insert(id, tx);

        if let Err(err) = self.send(&JsonRpcRequest::new(id, method, params)).await {
            lock_waiters(&self.waiters).remove(&id);
            return Err(err.context(format!("Failed to send '{}' to '{}'", method, self.id)));
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => bail!("tool server '{}' closed during '{}'", self.id, method),
            Err(_) => {
                lock_waiters(&self.waiters).remove(&id);
                bail!(
                    "'{}' on tool server '{}' timed out after {}s",
                    method,
                    self.id,
                    self.timeout.as_secs()
                );
            }
        };

        if let Some(err) = response.error {
            bail!(
                "'{}' on tool server '{}' failed: {} (code {})",
                method,
                self.id,
                err.message,
                err.code
            );
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .with_context(|| format!("Invalid '{}' response from '{}'", method, self.id))
    }
}

/// Routes server output to waiting requests until stdout closes.
async fn read_messages(id: String, stdout: ChildStdout, waiters: Waiters) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(server = %id, error = %err, "failed reading tool server output");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let message: JsonRpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(server = %id, error = %err, "ignoring non-JSON-RPC line");
                continue;
            }
        };
        match message.response_id() {
            Some(request_id) => match lock_waiters(&waiters).remove(&request_id) {
                Some(waiter) => {
                    waiter.send(message).ok();
                }
                None => tracing::warn!(server = %id, request_id, "response for unknown request"),
            },
            None => tracing::debug!(server = %id, method = ?message.method, "server message ignored"),
        }
    }
    // Dropping the senders wakes every waiter with a closed-channel error.
    lock_waiters(&waiters).clear();
}

#[async_trait]
impl ToolSession for StdioSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolsListResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.request("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    async fn close(&self) -> Result<()> {
        // Closing stdin asks a well-behaved server to exit.
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(server = %self.id, "tool server did not exit, killing");
                    child.kill().await.ok();
                }
            }
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
        Ok(())
    }
}
