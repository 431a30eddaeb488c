//! Provider kind enumeration and default model mapping.

use anyhow::{anyhow, Error, Result};
use std::fmt;
use std::str::FromStr;

/// Identifies which LLM provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Anthropic (Claude models).
    Anthropic,
    /// OpenAI (GPT models).
    OpenAI,
    /// OpenRouter (multi-provider gateway).
    OpenRouter,
    /// Ollama (local models via OpenAI-compatible API).
    Ollama,
}

impl ProviderKind {
    /// Lowercase name used in config tables and env var names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    /// Returns the default model identifier for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => crate::constants::DEFAULT_MODEL,
            Self::OpenAI => crate::constants::DEFAULT_OPENAI_MODEL,
            Self::OpenRouter => crate::constants::DEFAULT_OPENROUTER_MODEL,
            Self::Ollama => crate::constants::OLLAMA_DEFAULT_MODEL,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    /// Case-insensitive. Returns an error for unknown providers.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!(
                "Unknown provider: {other}. Supported: anthropic, openai, openrouter, ollama"
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
