//! File loading and merging for kite configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{Config, GenerationConfig, ProviderConfig, ProviderEntry};

const DEFAULT_CONFIG: &str = r#"# kite configuration

[provider.anthropic]
api_key = "{env:ANTHROPIC_API_KEY}"

[provider.openai]
api_key = "{env:OPENAI_API_KEY}"

[provider.openrouter]
api_key = "{env:OPENROUTER_API_KEY}"

[provider.ollama]
base_url = "http://localhost:11434"

[generation]
# Feed tool results back to the model until it stops calling tools.
# recursion = true
max_repeat_calls = 5
deadline_secs = 300

# [tools.ask_user]
# predefined = "stdin-prompt"
#
# [tools.weather]
# command = "/usr/local/bin/weather-tool"
# description = "Current weather for a city"
# parameters = { type = "object", properties = { city = { type = "string" } }, required = ["city"] }
#
# [mcp.files]
# command = "npx"
# args = ["-y", "@modelcontextprotocol/server-filesystem", "."]
"#;

impl Config {
    /// Parses a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    /// Loads the global config from `~/.config/kite/config.toml`.
    ///
    /// If no config file exists, creates one with sensible defaults
    /// (including `{env:VAR}` placeholders for API keys) and returns it.
    pub(super) fn load_global() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            return toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config");
        }
        Self::from_file(&path)
    }

    /// Look for kite.toml in current dir, then walk up to git root.
    pub(super) fn load_project() -> Result<Option<Config>> {
        match Self::find_project_file(std::env::current_dir()?) {
            Some(path) => Ok(Some(Self::from_file(&path)?)),
            None => Ok(None),
        }
    }

    pub(super) fn find_project_file(mut dir: PathBuf) -> Option<PathBuf> {
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                return None;
            }
        }
    }

    /// Merge project config over global config.
    /// Project values win when present; tables are merged per key.
    pub(super) fn merge(global: Config, project: Config) -> Config {
        let mut tools = global.tools;
        tools.extend(project.tools);
        let mut mcp = global.mcp;
        mcp.extend(project.mcp);
        let mut permissions = global.permissions;
        permissions.tools.extend(project.permissions.tools);

        Config {
            model: project.model.or(global.model),
            default_provider: project.default_provider.or(global.default_provider),
            system_prompt: project.system_prompt.or(global.system_prompt),
            provider: merge_providers(global.provider, project.provider),
            generation: merge_generation(global.generation, project.generation),
            tools,
            mcp,
            permissions,
        }
    }
}

fn merge_entry(global: Option<ProviderEntry>, project: Option<ProviderEntry>) -> Option<ProviderEntry> {
    match (global, project) {
        (Some(g), Some(p)) => Some(ProviderEntry {
            api_key: p.api_key.or(g.api_key),
            base_url: p.base_url.or(g.base_url),
            model: p.model.or(g.model),
        }),
        (g, p) => p.or(g),
    }
}

fn merge_providers(global: ProviderConfig, project: ProviderConfig) -> ProviderConfig {
    ProviderConfig {
        openai: merge_entry(global.openai, project.openai),
        anthropic: merge_entry(global.anthropic, project.anthropic),
        ollama: merge_entry(global.ollama, project.ollama),
        openrouter: merge_entry(global.openrouter, project.openrouter),
    }
}

fn merge_generation(global: GenerationConfig, project: GenerationConfig) -> GenerationConfig {
    GenerationConfig {
        recursion: project.recursion.or(global.recursion),
        max_repeat_calls: project.max_repeat_calls.or(global.max_repeat_calls),
        deadline_secs: project.deadline_secs.or(global.deadline_secs),
        show_thoughts: project.show_thoughts.or(global.show_thoughts),
        image_output: project.image_output.or(global.image_output),
        output_dir: project.output_dir.or(global.output_dir),
        ignore_unsupported: project.ignore_unsupported.or(global.ignore_unsupported),
        auto_approve: project.auto_approve.or(global.auto_approve),
        max_tokens: project.max_tokens.or(global.max_tokens),
    }
}
