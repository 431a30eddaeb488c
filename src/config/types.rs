//! Struct definitions and serde defaults for kite configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::media::ImageOutput;
use crate::permissions::PermissionConfig;
use crate::tools::PredefinedTool;

/// Root configuration for kite, deserialized from `config.toml`.
///
/// Every field has a serde default so kite runs without a config file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Model identifier, optionally as `provider/model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Default provider name (e.g., "anthropic", "openai").
    #[serde(default)]
    pub default_provider: Option<String>,
    /// System prompt sent with every request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    /// Per-provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Generation loop settings.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Local tool bindings keyed by the function name the model calls.
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
    /// Remote tool servers keyed by server id.
    #[serde(default)]
    pub mcp: HashMap<String, McpServerConfig>,
    /// Permission settings for tool execution.
    #[serde(default)]
    pub permissions: PermissionConfig,
}

fn default_system_prompt() -> Option<String> {
    Some(crate::constants::DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Provider-specific configuration map.
///
/// Each field corresponds to a supported LLM provider. Only providers
/// the user has configured will be `Some`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    pub openai: Option<ProviderEntry>,
    pub anthropic: Option<ProviderEntry>,
    pub ollama: Option<ProviderEntry>,
    pub openrouter: Option<ProviderEntry>,
}

/// Connection details for a single LLM provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ProviderEntry {
    /// API key for authentication. The `<PROVIDER>_API_KEY` variable wins.
    pub api_key: Option<String>,
    /// Custom base URL (proxies, self-hosted instances).
    pub base_url: Option<String>,
    /// Model used when this provider is selected without an explicit model.
    pub model: Option<String>,
}

/// `[generation]`: how a run recurses, times out and handles media.
///
/// All fields are optional so project files can override single values;
/// accessors on [`Config`] apply the defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    /// Feed tool results back to the model automatically.
    pub recursion: Option<bool>,
    /// Identical calls allowed before the run is stopped. 0 disables.
    pub max_repeat_calls: Option<usize>,
    /// Deadline for each pass, in seconds.
    pub deadline_secs: Option<u64>,
    /// Echo model thoughts to stderr.
    pub show_thoughts: Option<bool>,
    pub image_output: Option<ImageOutput>,
    /// Directory for generated images and audio.
    pub output_dir: Option<PathBuf>,
    /// Skip media types kite cannot handle instead of failing.
    pub ignore_unsupported: Option<bool>,
    /// Skip every confirmation prompt (never overrides `deny`).
    pub auto_approve: Option<bool>,
    pub max_tokens: Option<u64>,
}

/// `[tools.<name>]`: one local tool binding.
///
/// Set either `command` (an executable receiving the JSON arguments as its
/// only argument) or `predefined`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ToolConfig {
    pub command: Option<String>,
    pub predefined: Option<PredefinedTool>,
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    pub parameters: Option<Value>,
    /// Template for `predefined = "template-format"`.
    pub template: Option<String>,
    /// Ask the operator before every call.
    #[serde(default)]
    pub confirm: bool,
    pub timeout_secs: Option<u64>,
}

/// `[mcp.<id>]`: a remote tool server started over stdio.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-request timeout, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: None,
            default_provider: None,
            system_prompt: default_system_prompt(),
            provider: ProviderConfig::default(),
            generation: GenerationConfig::default(),
            tools: HashMap::new(),
            mcp: HashMap::new(),
            permissions: PermissionConfig::default(),
        }
    }
}
