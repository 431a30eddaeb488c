//! LLM provider client and streaming implementation.
//!
//! Contains the [`Provider`] struct which wraps rig-core provider clients
//! behind enum dispatch, keeping provider-specific details out of the
//! generation loop. Supports Anthropic, OpenAI, OpenRouter, and Ollama.
//!
//! Each request is a single completion: rig-core never executes tools here.
//! Tool calls come back as increments and kite resolves them itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, GetTokenUsage, ToolDefinition as RigToolDefinition};
use rig::message::Text;
use rig::providers::{anthropic, openai, openrouter};
use rig::streaming::StreamedAssistantContent;

use super::convert::to_rig_messages;
use super::kind::ProviderKind;
use super::resolve::ModelSelection;
use super::{ModelClient, RequestOptions};
use crate::classifier::{Increment, IncrementStream, Usage};
use crate::config::Config;
use crate::constants::FINISH_REASON_STOP;
use crate::history::{History, PendingToolCall};
use crate::tools::{ToolArgs, ToolSpec};

/// Internal enum wrapping provider-specific clients.
enum ClientKind {
    Anthropic(anthropic::Client),
    OpenAI(openai::Client),
    OpenRouter(openrouter::Client),
    Ollama(openai::Client),
}

/// A configured LLM provider ready to handle completion requests.
pub struct Provider {
    client: ClientKind,
    model: String,
}

/// Dispatches an operation across provider-specific clients.
///
/// Matches on [`ClientKind`] and executes the same block for each variant,
/// letting the compiler monomorphize per provider.
macro_rules! dispatch {
    ($self:expr, |$client:ident| $body:expr) => {
        match &$self.client {
            ClientKind::Anthropic($client) => $body,
            ClientKind::OpenAI($client) => $body,
            ClientKind::OpenRouter($client) => $body,
            ClientKind::Ollama($client) => $body,
        }
    };
}

/// Maps a provider's raw stream onto kite increments.
///
/// Text, reasoning deltas, complete tool calls and the final usage report
/// are forwarded; tool-call deltas are assembled by rig-core and skipped.
/// The provider's own stream has no finish reason, so a clean end is
/// followed by `Finish("stop")`.
macro_rules! into_increments {
    ($stream:expr) => {
        $stream
            .filter_map(|item| async move {
                match item {
                    Ok(StreamedAssistantContent::Text(Text { text })) => {
                        Some(Ok(Increment::Text(text)))
                    }
                    Ok(StreamedAssistantContent::ReasoningDelta { reasoning, .. }) => {
                        Some(Ok(Increment::Thought(reasoning)))
                    }
                    Ok(StreamedAssistantContent::ToolCall { tool_call, .. }) => Some(
                        call_args(tool_call.function.arguments)
                            .map(|args| {
                                Increment::FunctionCall(
                                    PendingToolCall::new(tool_call.function.name, args)
                                        .with_token(tool_call.id),
                                )
                            })
                            .context("Model sent malformed tool arguments"),
                    ),
                    Ok(StreamedAssistantContent::Final(response)) => {
                        response.token_usage().map(|usage| {
                            Ok(Increment::Usage(Usage {
                                input_tokens: usage.input_tokens,
                                output_tokens: usage.output_tokens,
                                total_tokens: usage.total_tokens,
                            }))
                        })
                    }
                    Ok(_) => None,
                    Err(err) => Some(Err(anyhow::Error::new(err))),
                }
            })
            .chain(futures::stream::once(async {
                Ok(Increment::Finish(FINISH_REASON_STOP.to_string()))
            }))
            .boxed()
    };
}

/// Some providers deliver arguments as a JSON-encoded string.
fn call_args(arguments: serde_json::Value) -> Result<ToolArgs> {
    match arguments {
        serde_json::Value::String(raw) => ToolArgs::parse(&raw),
        other => ToolArgs::from_value(other),
    }
}

fn rig_tools(specs: &[ToolSpec]) -> Vec<RigToolDefinition> {
    specs
        .iter()
        .map(|spec| RigToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        })
        .collect()
}

impl Provider {
    /// Creates a new [`Provider`] from the loaded application config.
    ///
    /// Resolves the API key through kite's config precedence chain
    /// (env var, then config file) and builds the appropriate client.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is found for the selected provider
    /// or if client construction fails.
    pub fn from_config(config: &Config, selection: &ModelSelection) -> Result<Self> {
        let client = match selection.provider {
            ProviderKind::Anthropic => {
                let api_key = config
                    .resolve_api_key("anthropic")
                    .context("No API key found for Anthropic. Set ANTHROPIC_API_KEY or configure it in config.toml")?;
                ClientKind::Anthropic(
                    anthropic::Client::new(&api_key)
                        .context("Failed to create Anthropic client")?,
                )
            }
            ProviderKind::OpenAI => {
                let api_key = config
                    .resolve_api_key("openai")
                    .context("No API key found for OpenAI. Set OPENAI_API_KEY or configure it in config.toml")?;
                ClientKind::OpenAI(
                    openai::Client::new(&api_key).context("Failed to create OpenAI client")?,
                )
            }
            ProviderKind::OpenRouter => {
                let api_key = config
                    .resolve_api_key("openrouter")
                    .context("No API key found for OpenRouter. Set OPENROUTER_API_KEY or configure it in config.toml")?;
                ClientKind::OpenRouter(
                    openrouter::Client::new(&api_key)
                        .context("Failed to create OpenRouter client")?,
                )
            }
            ProviderKind::Ollama => {
                let base_url = config
                    .provider_entry("ollama")
                    .and_then(|o| o.base_url.as_deref())
                    .unwrap_or(crate::constants::OLLAMA_DEFAULT_BASE_URL);
                ClientKind::Ollama(
                    openai::Client::builder()
                        .api_key("ollama")
                        .base_url(format!("{}/v1", base_url))
                        .build()
                        .context("Failed to create Ollama client")?,
                )
            }
        };
        tracing::debug!(provider = %selection.provider, model = %selection.model, "provider ready");
        Ok(Self {
            client,
            model: selection.model.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for Provider {
    async fn stream_generate(
        &self,
        history: &History,
        options: &RequestOptions,
    ) -> Result<IncrementStream> {
        let (chat_history, prompt) = to_rig_messages(history)?;
        tracing::debug!(
            model = %self.model,
            messages = chat_history.len() + 1,
            tools = options.tools.len(),
            "sending completion request"
        );

        dispatch!(self, |client| {
            let model = client.completion_model(self.model.as_str());
            let mut request = model
                .completion_request(prompt)
                .messages(chat_history)
                .tools(rig_tools(&options.tools))
                .max_tokens(options.max_tokens);
            if let Some(preamble) = &options.system_prompt {
                request = request.preamble(preamble.clone());
            }
            let stream = request
                .stream()
                .await
                .context("Failed to start completion stream")?;
            Ok(into_increments!(stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_args_accepts_encoded_strings() {
        let direct = call_args(json!({"q": "x"})).unwrap();
        let encoded = call_args(json!("{\"q\": \"x\"}")).unwrap();
        assert_eq!(direct, encoded);
        assert!(call_args(json!("[1]")).is_err());
    }

    #[test]
    fn test_rig_tools_keep_schema() {
        let specs = vec![ToolSpec {
            name: "lookup".into(),
            description: "Looks things up".into(),
            parameters: json!({"type": "object"}),
        }];
        let defs = rig_tools(&specs);
        assert_eq!(defs[0].name, "lookup");
        assert_eq!(defs[0].parameters, json!({"type": "object"}));
    }
}
