//! LLM provider abstraction for kite.
//!
//! [`ModelClient`] is the seam the generation loop talks to: given the
//! history and request options it returns a stream of increments.
//! [`Provider`] implements it over rig-core's clients with enum dispatch,
//! supporting Anthropic, OpenAI, OpenRouter, and Ollama (local).

mod client;
mod convert;
mod kind;
mod resolve;

use anyhow::Result;
use async_trait::async_trait;

pub use client::Provider;
pub use kind::ProviderKind;
pub use resolve::{resolve_model, ModelSelection};

use crate::classifier::IncrementStream;
use crate::history::History;
use crate::tools::ToolSpec;

/// Everything besides the history that goes into one request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub system_prompt: Option<String>,
    /// Tool definitions the model may call.
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u64,
}

/// A generative model that streams its answer to a history.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_generate(
        &self,
        history: &History,
        options: &RequestOptions,
    ) -> Result<IncrementStream>;
}
