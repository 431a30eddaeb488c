//! `kite ask`: builds one generation run from flags and config, then runs it.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::attachments;
use crate::config::Config;
use crate::generate::{GenerationSettings, Orchestrator, PassContext};
use crate::guard::LoopGuard;
use crate::history::History;
use crate::mcp::RemoteToolCatalog;
use crate::media::{ImageOutput, MediaHandler};
use crate::output::{Renderer, StdoutRenderer};
use crate::permissions::{PermissionManager, StdinOperator};
use crate::provider::{self, Provider, RequestOptions};
use crate::tools::{CommandExecutor, ToolDispatcher, ToolRegistry};

#[derive(Args, Debug, Default)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: Vec<String>,
    /// Model to use, optionally as provider/model (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,
    /// Provider to use (anthropic, openai, openrouter, ollama)
    #[arg(short, long)]
    pub provider: Option<String>,
    /// Attach a file (text, image, audio or pdf)
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,
    /// Attach the content of a URL
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,
    /// Bind a function name to a local executable
    #[arg(short, long = "tool", value_name = "NAME=PATH")]
    pub tools: Vec<String>,
    /// Run tools without asking (never overrides `deny`)
    #[arg(short, long)]
    pub yes: bool,
    /// Feed tool results back to the model until it stops calling tools
    #[arg(long)]
    pub recurse: bool,
    /// Identical tool calls allowed before the run stops (0 disables)
    #[arg(long, value_name = "N")]
    pub max_repeat: Option<usize>,
    /// Deadline for each generation pass, in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
    /// Echo model thoughts to stderr
    #[arg(long)]
    pub show_thoughts: bool,
    /// Where generated images go
    #[arg(long, value_enum)]
    pub image_output: Option<ImageOutput>,
    /// Directory for generated images and audio
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Skip media kite cannot handle instead of failing
    #[arg(long)]
    pub ignore_unsupported: bool,
    /// Print the final history as JSON to stderr
    #[arg(long)]
    pub dump_history: bool,
}

impl AskArgs {
    /// Folds flags into `[generation]`. Flags win over config files.
    fn apply(&self, config: &mut Config) {
        let generation = &mut config.generation;
        if self.yes {
            generation.auto_approve = Some(true);
        }
        if self.recurse {
            generation.recursion = Some(true);
        }
        if let Some(max) = self.max_repeat {
            generation.max_repeat_calls = Some(max);
        }
        if let Some(secs) = self.deadline {
            generation.deadline_secs = Some(secs);
        }
        if self.show_thoughts {
            generation.show_thoughts = Some(true);
        }
        if let Some(output) = self.image_output {
            generation.image_output = Some(output);
        }
        if let Some(dir) = &self.output_dir {
            generation.output_dir = Some(dir.clone());
        }
        if self.ignore_unsupported {
            generation.ignore_unsupported = Some(true);
        }
    }
}

/// Joins the prompt words with any text piped on stdin.
fn read_prompt(words: &[String]) -> Result<String> {
    let mut prompt = words.join(" ");
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut piped = String::new();
        stdin
            .lock()
            .read_to_string(&mut piped)
            .context("Failed to read prompt from stdin")?;
        let piped = piped.trim();
        if !piped.is_empty() {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(piped);
        }
    }
    Ok(prompt)
}

async fn build_history(args: &AskArgs, prompt: String) -> Result<History> {
    let mut history = History::new();
    if !prompt.is_empty() {
        history.push_user_text(prompt);
    }
    for path in &args.files {
        history.push_user_part(attachments::load_file(path).await?);
    }
    if !args.urls.is_empty() {
        let client = reqwest::Client::new();
        for url in &args.urls {
            history.push_user_part(attachments::fetch_url(&client, url).await?);
        }
    }
    if history.is_empty() {
        bail!("No prompt provided. Usage: kite ask \"your question here\"");
    }
    Ok(history)
}

pub async fn run(args: AskArgs) -> Result<i32> {
    let mut config = Config::load()?;
    args.apply(&mut config);

    let prompt = read_prompt(&args.prompt)?;
    let history = build_history(&args, prompt).await?;

    let selection = provider::resolve_model(args.provider.as_deref(), args.model.as_deref(), &config)?;
    let client = Provider::from_config(&config, &selection)?;

    let registry = ToolRegistry::from_sources(&config.tools, &args.tools)?;
    let catalog = if config.mcp.is_empty() {
        RemoteToolCatalog::empty()
    } else {
        RemoteToolCatalog::discover(&config.mcp)
            .await
            .context("Failed to start remote tool servers")?
    };
    tracing::info!(
        bindings = registry.len(),
        remote = catalog.tools().len(),
        "tools ready"
    );

    eprintln!(
        "{} [model: {}]",
        "kite".bold().cyan(),
        selection.model.yellow(),
    );

    let renderer: Arc<dyn Renderer> = Arc::new(StdoutRenderer::new());
    let working_dir = std::env::current_dir().context("Cannot determine working directory")?;
    let dispatcher = ToolDispatcher::new(
        registry,
        Arc::new(catalog),
        Arc::new(PermissionManager::new(
            config.permissions.clone(),
            config.auto_approve(),
        )),
        Arc::new(StdinOperator),
        Arc::new(CommandExecutor::new(working_dir)),
        LoopGuard::new(config.max_repeat_calls()),
        renderer.clone(),
    );
    let options = RequestOptions {
        system_prompt: config.system_prompt.clone(),
        tools: dispatcher.specs(),
        max_tokens: config.max_tokens(),
    };
    let ctx = PassContext {
        client: Arc::new(client),
        options,
        dispatcher,
        media: MediaHandler::new(
            config.image_output(),
            config.output_dir(),
            config.ignore_unsupported(),
        ),
        renderer: renderer.clone(),
        show_thoughts: config.show_thoughts(),
    };
    let settings = GenerationSettings {
        recursion: config.recursion_enabled(),
        deadline: config.pass_deadline(),
    };

    let outcome = Orchestrator::new(ctx, settings).generate(history).await;

    if outcome.is_success() {
        renderer.render_done(&outcome.usage);
    } else if let Some(err) = &outcome.error {
        renderer.render_error(&err.to_string());
    }
    if args.dump_history {
        let json = serde_json::to_string_pretty(&outcome.history)
            .context("Failed to encode history")?;
        eprintln!("{}", json);
    }
    tracing::info!(
        passes = outcome.passes,
        exit_code = outcome.exit_code,
        "generation finished"
    );
    Ok(outcome.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_generation_config() {
        let mut config = Config::default();
        config.generation.max_repeat_calls = Some(9);
        let args = AskArgs {
            recurse: true,
            max_repeat: Some(0),
            deadline: Some(3),
            yes: true,
            image_output: Some(ImageOutput::Terminal),
            ..Default::default()
        };
        args.apply(&mut config);
        assert!(config.recursion_enabled());
        assert_eq!(config.max_repeat_calls(), 0);
        assert_eq!(config.pass_deadline(), std::time::Duration::from_secs(3));
        assert!(config.auto_approve());
        assert_eq!(config.image_output(), ImageOutput::Terminal);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = Config::default();
        config.generation.show_thoughts = Some(true);
        AskArgs::default().apply(&mut config);
        assert!(config.show_thoughts());
        assert!(!config.recursion_enabled());
    }

    #[test]
    fn test_recursion_from_config_survives_without_flag() {
        let mut config = Config::default();
        config.generation.recursion = Some(true);
        AskArgs::default().apply(&mut config);
        assert!(config.recursion_enabled());
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        assert!(build_history(&AskArgs::default(), String::new()).await.is_err());
    }
}
