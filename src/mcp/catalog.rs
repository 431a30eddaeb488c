//! The set of remote tools discovered across every configured server.

use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::protocol::{CallToolResult, Tool, ToolContent};
use super::session::{StdioSession, ToolSession};
use crate::config::McpServerConfig;
use crate::history::{Part, ToolOutcome};
use crate::tools::ToolSpec;

/// A remote tool and the session that owns it.
pub struct RemoteTool {
    pub descriptor: Tool,
    session: Arc<dyn ToolSession>,
}

impl RemoteTool {
    pub fn server_id(&self) -> &str {
        self.session.id()
    }

    pub fn session(&self) -> &Arc<dyn ToolSession> {
        &self.session
    }
}

/// Sessions are opened once per top-level run and closed exactly once.
pub struct RemoteToolCatalog {
    sessions: Vec<Arc<dyn ToolSession>>,
    tools: Vec<RemoteTool>,
    closed: AtomicBool,
}

impl RemoteToolCatalog {
    pub fn empty() -> Self {
        Self {
            sessions: Vec::new(),
            tools: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Connects to every configured server (in id order) and lists tools.
    ///
    /// If any server fails, sessions opened so far are closed before the
    /// error is returned.
    pub async fn discover(servers: &HashMap<String, McpServerConfig>) -> Result<Self> {
        let mut ids: Vec<&String> = servers.keys().collect();
        ids.sort();

        let mut sessions: Vec<Arc<dyn ToolSession>> = Vec::new();
        for id in ids {
            match StdioSession::connect(id, &servers[id]).await {
                Ok(session) => sessions.push(Arc::new(session)),
                Err(err) => {
                    for session in &sessions {
                        session.close().await.ok();
                    }
                    return Err(err);
                }
            }
        }
        Self::from_sessions(sessions).await
    }

    /// Lists the tools of already-open sessions. The first server to offer
    /// a name owns it.
    pub async fn from_sessions(sessions: Vec<Arc<dyn ToolSession>>) -> Result<Self> {
        let mut tools: Vec<RemoteTool> = Vec::new();
        for session in &sessions {
            let listed = match session.list_tools().await {
                Ok(listed) => listed,
                Err(err) => {
                    for s in &sessions {
                        s.close().await.ok();
                    }
                    return Err(err);
                }
            };
            tracing::debug!(server = %session.id(), count = listed.len(), "remote tools listed");
            for descriptor in listed {
                if let Some(existing) = tools.iter().find(|t| t.descriptor.name == descriptor.name) {
                    tracing::warn!(
                        tool = %descriptor.name,
                        kept = %existing.server_id(),
                        ignored = %session.id(),
                        "duplicate remote tool name"
                    );
                    continue;
                }
                tools.push(RemoteTool {
                    descriptor,
                    session: session.clone(),
                });
            }
        }
        Ok(Self {
            sessions,
            tools,
            closed: AtomicBool::new(false),
        })
    }

    pub fn find(&self, name: &str) -> Option<&RemoteTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }

    pub fn tools(&self) -> &[RemoteTool] {
        &self.tools
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.descriptor.name.clone(),
                description: t.descriptor.description.clone(),
                parameters: t.descriptor.input_schema.clone(),
            })
            .collect()
    }

    /// Closes every session. Only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for session in &self.sessions {
            if let Err(err) = session.close().await {
                tracing::warn!(server = %session.id(), error = %err, "failed to close tool server");
            }
        }
    }
}

fn decode_media(data: &str, mime_type: &str) -> Result<Part> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|err| anyhow!("undecodable {} content: {}", mime_type, err))?;
    Ok(Part::media(bytes, mime_type))
}

/// Converts a remote result into a function-response outcome plus any media
/// parts that travel in the same turn.
///
/// `structuredContent` wins over text items. A result flagged `isError`, or
/// an item that cannot be decoded, is an error.
pub fn convert_result(result: CallToolResult) -> Result<(ToolOutcome, Vec<Part>)> {
    let mut texts: Vec<String> = Vec::new();
    let mut media: Vec<Part> = Vec::new();

    for item in result.content {
        match item {
            ToolContent::Text { text } => texts.push(text),
            ToolContent::Image { data, mime_type } | ToolContent::Audio { data, mime_type } => {
                media.push(decode_media(&data, &mime_type)?)
            }
            ToolContent::Resource { resource } => match (resource.text, resource.blob) {
                (Some(text), _) => texts.push(text),
                (None, Some(blob)) => {
                    let mime = resource
                        .mime_type
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    media.push(decode_media(&blob, &mime)?)
                }
                (None, None) => bail!("resource '{}' has neither text nor blob", resource.uri),
            },
        }
    }

    if result.is_error == Some(true) {
        bail!("remote tool reported an error: {}", texts.join("\n"));
    }

    let outcome = match result.structured_content {
        Some(value) => ToolOutcome::Structured(value),
        None => ToolOutcome::Output(texts.join("\n")),
    };
    Ok((outcome, media))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog_of, FakeSession};
    use serde_json::json;

    fn named(names: &[&str]) -> Vec<serde_json::Value> {
        names.iter().map(|name| json!({ "name": name })).collect()
    }

    #[tokio::test]
    async fn test_first_server_owns_duplicate_names() {
        let a = FakeSession::new("a", named(&["search", "fetch"]));
        let b = FakeSession::new("b", named(&["fetch", "write"]));
        let catalog = RemoteToolCatalog::from_sessions(vec![a.clone() as Arc<dyn ToolSession>, b.clone()])
            .await
            .unwrap();
        assert_eq!(catalog.tools().len(), 3);
        assert_eq!(catalog.find("fetch").unwrap().server_id(), "a");
        assert_eq!(catalog.find("write").unwrap().server_id(), "b");
        assert!(catalog.find("missing").is_none());
    }

    #[tokio::test]
    async fn test_close_runs_once() {
        let a = FakeSession::new("a", named(&["search"]));
        let catalog = catalog_of(&a).await;
        catalog.close().await;
        catalog.close().await;
        assert_eq!(a.close_count(), 1);
    }

    #[test]
    fn test_convert_prefers_structured_content() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "{\"n\":1}"}],
            "structuredContent": {"n": 1}
        }))
        .unwrap();
        let (outcome, media) = convert_result(result).unwrap();
        assert_eq!(outcome, ToolOutcome::Structured(json!({"n": 1})));
        assert!(media.is_empty());
    }

    #[test]
    fn test_convert_joins_text_and_collects_media() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "one"},
                {"type": "image", "data": "AAEC", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "mem://x", "text": "two"}}
            ]
        }))
        .unwrap();
        let (outcome, media) = convert_result(result).unwrap();
        assert_eq!(outcome, ToolOutcome::Output("one\ntwo".into()));
        assert_eq!(media, vec![Part::media(vec![0, 1, 2], "image/png")]);
    }

    #[test]
    fn test_convert_is_error_fails() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "disk full"}],
            "isError": true
        }))
        .unwrap();
        let err = convert_result(result).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_convert_bad_base64_fails() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "audio", "data": "%%%", "mimeType": "audio/wav"}]
        }))
        .unwrap();
        assert!(convert_result(result).is_err());
    }
}
