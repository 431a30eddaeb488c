//! Model resolution logic for kite.
//!
//! Resolves which provider and model to use based on CLI flags, config file,
//! and hardcoded defaults. Supports `provider/model` shorthand syntax.

use anyhow::Result;

use super::kind::ProviderKind;
use crate::config::Config;
use crate::constants::DEFAULT_PROVIDER;

/// Resolved provider + model pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
}

/// Splits `provider/model` when the prefix names a known provider.
///
/// OpenRouter model ids contain slashes themselves (`org/model`), so an
/// unknown prefix leaves the string alone.
fn split_shorthand(model: &str) -> Option<(ProviderKind, &str)> {
    let (prov, rest) = model.split_once('/')?;
    prov.parse().ok().map(|kind| (kind, rest))
}

/// Resolve which provider and model to use.
/// Priority: CLI flags > config > provider table model > defaults.
///
/// Accepts these formats:
///   --model anthropic/claude-sonnet-4-6  (provider/model shorthand, only when --provider is omitted)
///   --provider openrouter --model "org/model-name"  (slash preserved as model name)
///   --provider anthropic  (uses provider's configured or default model)
///   (nothing)  (uses config, then hardcoded default)
pub fn resolve_model(
    cli_provider: Option<&str>,
    cli_model: Option<&str>,
    config: &Config,
) -> Result<ModelSelection> {
    if cli_provider.is_none() {
        if let Some((provider, model)) = cli_model.and_then(split_shorthand) {
            return Ok(ModelSelection {
                provider,
                model: model.to_string(),
            });
        }
    }

    let configured_model = config.model_name();
    let (config_provider, config_model) = match configured_model.and_then(split_shorthand) {
        Some((kind, model)) => (Some(kind), Some(model)),
        None => (None, configured_model),
    };

    let provider = match cli_provider.or(config.provider_name()) {
        Some(name) => name.parse()?,
        None => config_provider.unwrap_or(DEFAULT_PROVIDER.parse()?),
    };

    let model = cli_model
        .or(config_model)
        .map(String::from)
        .or_else(|| {
            config
                .provider_entry(provider.name())
                .and_then(|e| e.model.clone())
        })
        .unwrap_or_else(|| provider.default_model().to_string());

    Ok(ModelSelection { provider, model })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEntry;

    #[test]
    fn test_defaults_without_flags_or_config() {
        let sel = resolve_model(None, None, &Config::default()).unwrap();
        assert_eq!(sel.provider, ProviderKind::Anthropic);
        assert_eq!(sel.model, crate::constants::DEFAULT_MODEL);
    }

    #[test]
    fn test_cli_shorthand() {
        let sel = resolve_model(None, Some("openai/gpt-4.1-mini"), &Config::default()).unwrap();
        assert_eq!(sel.provider, ProviderKind::OpenAI);
        assert_eq!(sel.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_explicit_provider_keeps_slashes() {
        let sel = resolve_model(
            Some("openrouter"),
            Some("meta-llama/llama-3-70b"),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(sel.provider, ProviderKind::OpenRouter);
        assert_eq!(sel.model, "meta-llama/llama-3-70b");
    }

    #[test]
    fn test_config_shorthand_and_provider_table() {
        let mut config = Config {
            model: Some("ollama/qwen3".into()),
            ..Default::default()
        };
        let sel = resolve_model(None, None, &config).unwrap();
        assert_eq!(sel.provider, ProviderKind::Ollama);
        assert_eq!(sel.model, "qwen3");

        config.model = None;
        config.provider.openai = Some(ProviderEntry {
            model: Some("gpt-4o".into()),
            ..Default::default()
        });
        let sel = resolve_model(Some("openai"), None, &config).unwrap();
        assert_eq!(sel.model, "gpt-4o");
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        assert!(resolve_model(Some("nope"), None, &Config::default()).is_err());
    }
}
