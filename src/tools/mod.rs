//! Tool bindings, argument validation, and dispatch.
//!
//! A [`ToolBinding`] maps a function name the model may call to a local
//! strategy: an external executable or one of the predefined in-process
//! callbacks. Remote tools live in [`crate::mcp`]; [`ToolDispatcher`] ties
//! both together with the loop guard and the confirmation gate.

pub mod dispatch;
pub mod executor;
pub mod predefined;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ToolConfig;
use crate::constants::TOOL_DEFAULT_TIMEOUT_SECS;

pub use dispatch::{Resolution, ToolDispatcher};
pub use executor::{CommandExecutor, ProcessExecutor};

/// Arguments of a tool call: always a JSON object.
///
/// Values keep their JSON shape (string, number, bool, array, object), so
/// they can be validated against the declared parameter schema before any
/// tool sees them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Accepts a JSON object; `null` is treated as "no arguments".
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => bail!("tool arguments must be a JSON object, got: {}", other),
        }
    }

    /// Parses a JSON-encoded argument string.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw).context("tool arguments are not valid JSON")?;
        Self::from_value(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Compact JSON with object keys sorted at every level.
    ///
    /// Stable regardless of the order the model emitted the keys in, which
    /// the loop guard relies on.
    pub fn canonical_json(&self) -> String {
        canonical(&Value::Object(self.0.clone())).to_string()
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Checks `args` against a JSON schema.
///
/// Returns `Ok(None)` when valid, `Ok(Some(reason))` listing every violation
/// otherwise, and `Err` when the schema itself cannot be compiled.
pub fn check_args(schema: &Value, args: &ToolArgs) -> Result<Option<String>> {
    let validator =
        jsonschema::validator_for(schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let instance = args.to_value();
    if validator.is_valid(&instance) {
        return Ok(None);
    }
    let messages = validator
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Ok(Some(messages.join("; ")))
}

/// Predefined in-process callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredefinedTool {
    /// Read one line from the operator as the answer.
    StdinPrompt,
    /// Render the arguments through a text template.
    TemplateFormat,
}

/// How a bound function name is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingKind {
    Executable { path: PathBuf, timeout: Duration },
    StdinPrompt,
    TemplateFormat { template: Option<String> },
}

/// Static mapping from a declared function name to its local strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolBinding {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub kind: BindingKind,
    pub requires_confirmation: bool,
}

fn default_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn stdin_prompt_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": {
                "type": "string",
                "description": "Question to show the user"
            }
        }
    })
}

impl ToolBinding {
    /// Executable binding without confirmation (used by `--tool name=path`).
    pub fn executable(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            description: format!("Runs the local tool '{}'", name),
            name,
            parameters: default_parameters(),
            kind: BindingKind::Executable {
                path: path.into(),
                timeout: Duration::from_secs(TOOL_DEFAULT_TIMEOUT_SECS),
            },
            requires_confirmation: false,
        }
    }

    /// Parses a `name=path` CLI binding.
    pub fn parse_flag(flag: &str) -> Result<Self> {
        let (name, path) = flag
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid --tool '{}'. Expected NAME=PATH", flag))?;
        let (name, path) = (name.trim(), path.trim());
        if name.is_empty() || path.is_empty() {
            bail!("Invalid --tool '{}'. Expected NAME=PATH", flag);
        }
        Ok(Self::executable(name, path))
    }

    /// Builds a binding from a `[tools.<name>]` config table.
    ///
    /// Exactly one of `command` or `predefined` must be set, and a declared
    /// `parameters` schema must compile.
    pub fn from_config(name: &str, config: &ToolConfig) -> Result<Self> {
        let kind = match (&config.command, config.predefined) {
            (Some(command), None) => BindingKind::Executable {
                path: PathBuf::from(command),
                timeout: Duration::from_secs(
                    config.timeout_secs.unwrap_or(TOOL_DEFAULT_TIMEOUT_SECS),
                ),
            },
            (None, Some(PredefinedTool::StdinPrompt)) => BindingKind::StdinPrompt,
            (None, Some(PredefinedTool::TemplateFormat)) => BindingKind::TemplateFormat {
                template: config.template.clone(),
            },
            (Some(_), Some(_)) => {
                bail!("Tool '{}' sets both 'command' and 'predefined'", name)
            }
            (None, None) => bail!("Tool '{}' needs either 'command' or 'predefined'", name),
        };

        let parameters = match (&config.parameters, &kind) {
            (Some(schema), _) => schema.clone(),
            (None, BindingKind::StdinPrompt) => stdin_prompt_parameters(),
            (None, _) => default_parameters(),
        };
        jsonschema::validator_for(&parameters)
            .map_err(|err| anyhow!("Tool '{}' has an invalid parameters schema: {}", name, err))?;

        let description = config
            .description
            .clone()
            .unwrap_or_else(|| match kind {
                BindingKind::StdinPrompt => "Ask the user a question and return the answer".into(),
                BindingKind::TemplateFormat { .. } => "Format the arguments as text".into(),
                BindingKind::Executable { .. } => format!("Runs the local tool '{}'", name),
            });

        Ok(Self {
            name: name.to_string(),
            description,
            parameters,
            kind,
            requires_confirmation: config.confirm,
        })
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Definition advertised to the model so it knows what it may call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

/// Holds every tool binding and looks them up by name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    bindings: Vec<ToolBinding>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding. A later binding with the same name replaces the
    /// earlier one, so CLI flags override config tables.
    pub fn register(&mut self, binding: ToolBinding) {
        self.bindings.retain(|b| b.name != binding.name);
        self.bindings.push(binding);
    }

    pub fn get(&self, name: &str) -> Option<&ToolBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolBinding> {
        self.bindings.iter()
    }

    /// Produce definitions for the model (sent in the API request).
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.bindings.iter().map(ToolBinding::spec).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl ToolRegistry {
    /// Create a registry from config tables plus `--tool` flags.
    pub fn from_sources<'a>(
        configured: impl IntoIterator<Item = (&'a String, &'a ToolConfig)>,
        flags: &[String],
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (name, config) in configured {
            registry.register(ToolBinding::from_config(name, config)?);
        }
        for flag in flags {
            registry.register(ToolBinding::parse_flag(flag)?);
        }
        Ok(registry)
    }
}
