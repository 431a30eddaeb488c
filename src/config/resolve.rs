//! Environment variable substitution, API key resolution and accessors
//! that apply defaults to optional settings.

use std::path::PathBuf;
use std::time::Duration;

use super::types::{Config, ProviderEntry};
use crate::constants::{
    MAX_REPEAT_CALLS_DEFAULT, MAX_TOKENS, PASS_DEADLINE_DEFAULT_SECS, RECURSION_DEFAULT,
};
use crate::media::ImageOutput;

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        if let Some(ref mut model) = self.model {
            *model = Self::resolve_str(model);
        }
        if let Some(ref mut sp) = self.system_prompt {
            *sp = Self::resolve_str(sp);
        }
        if let Some(ref mut dp) = self.default_provider {
            *dp = Self::resolve_str(dp);
        }
        Self::resolve_provider_entry(&mut self.provider.openai);
        Self::resolve_provider_entry(&mut self.provider.anthropic);
        Self::resolve_provider_entry(&mut self.provider.ollama);
        Self::resolve_provider_entry(&mut self.provider.openrouter);

        for tool in self.tools.values_mut() {
            if let Some(ref mut command) = tool.command {
                *command = Self::resolve_str(command);
            }
        }
        for server in self.mcp.values_mut() {
            server.command = Self::resolve_str(&server.command);
            for arg in server.args.iter_mut() {
                *arg = Self::resolve_str(arg);
            }
            for value in server.env.values_mut() {
                *value = Self::resolve_str(value);
            }
        }
    }

    /// Resolves `{env:VAR}` patterns in a single provider entry's `api_key` and `base_url`.
    fn resolve_provider_entry(entry: &mut Option<ProviderEntry>) {
        if let Some(ref mut e) = entry {
            if let Some(ref mut key) = e.api_key {
                *key = Self::resolve_str(key);
            }
            if let Some(ref mut url) = e.base_url {
                *url = Self::resolve_str(url);
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    fn resolve_str(s: &str) -> String {
        let mut result = s.to_string();
        while let Some(start) = result.find("{env:") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 5..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!(
                    "{}{}{}",
                    &result[..start],
                    value,
                    &result[start + end + 1..]
                );
            } else {
                break;
            }
        }
        result
    }

    pub fn provider_entry(&self, provider: &str) -> Option<&ProviderEntry> {
        match provider {
            "openai" => self.provider.openai.as_ref(),
            "anthropic" => self.provider.anthropic.as_ref(),
            "ollama" => self.provider.ollama.as_ref(),
            "openrouter" => self.provider.openrouter.as_ref(),
            _ => None,
        }
    }

    /// Resolve API key for a provider: env var first, then config value.
    /// Empty values count as missing.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        let env_key = format!("{}_API_KEY", provider.to_uppercase());
        if let Ok(val) = std::env::var(&env_key) {
            if !val.is_empty() {
                return Some(val);
            }
        }

        self.provider_entry(provider)
            .and_then(|e| e.api_key.clone())
            .filter(|key| !key.is_empty())
    }

    /// Get the configured default provider name, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Get the configured model, if any (may be `provider/model`).
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }

    pub fn recursion_enabled(&self) -> bool {
        self.generation.recursion.unwrap_or(RECURSION_DEFAULT)
    }

    pub fn max_repeat_calls(&self) -> usize {
        self.generation
            .max_repeat_calls
            .unwrap_or(MAX_REPEAT_CALLS_DEFAULT)
    }

    pub fn pass_deadline(&self) -> Duration {
        Duration::from_secs(
            self.generation
                .deadline_secs
                .unwrap_or(PASS_DEADLINE_DEFAULT_SECS),
        )
    }

    pub fn show_thoughts(&self) -> bool {
        self.generation.show_thoughts.unwrap_or(false)
    }

    pub fn image_output(&self) -> ImageOutput {
        self.generation.image_output.unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.generation
            .output_dir
            .clone()
            .unwrap_or_else(Self::default_output_dir)
    }

    pub fn ignore_unsupported(&self) -> bool {
        self.generation.ignore_unsupported.unwrap_or(false)
    }

    pub fn auto_approve(&self) -> bool {
        self.generation.auto_approve.unwrap_or(false)
    }

    pub fn max_tokens(&self) -> u64 {
        self.generation.max_tokens.unwrap_or(MAX_TOKENS)
    }
}
