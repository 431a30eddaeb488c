//! `kite tools`: what the model will be offered.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::mcp::RemoteToolCatalog;
use crate::tools::{BindingKind, ToolRegistry};

pub(crate) async fn list() -> Result<()> {
    let config = Config::load()?;
    let registry = ToolRegistry::from_sources(&config.tools, &[])?;

    println!("{}", "Local tools".bold());
    if registry.is_empty() {
        println!("  {}", "(none configured)".dimmed());
    }
    let mut bindings: Vec<_> = registry.iter().collect();
    bindings.sort_by(|a, b| a.name.cmp(&b.name));
    for binding in bindings {
        let strategy = match &binding.kind {
            BindingKind::Executable { path, .. } => path.display().to_string(),
            BindingKind::StdinPrompt => "stdin-prompt".to_string(),
            BindingKind::TemplateFormat { .. } => "template-format".to_string(),
        };
        let confirm = if binding.requires_confirmation {
            " (confirm)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{}  {}",
            binding.name.cyan(),
            strategy.dimmed(),
            confirm,
            binding.description
        );
    }

    if config.mcp.is_empty() {
        return Ok(());
    }
    println!();
    println!("{}", "Remote tools".bold());
    let catalog = RemoteToolCatalog::discover(&config.mcp)
        .await
        .context("Failed to start remote tool servers")?;
    for tool in catalog.tools() {
        let marker = if tool.descriptor.is_destructive() {
            " (destructive)".red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{}  {}",
            tool.descriptor.name.cyan(),
            format!("[{}]", tool.server_id()).dimmed(),
            marker,
            tool.descriptor.description
        );
    }
    catalog.close().await;
    Ok(())
}
