//! Command-line interface definition and dispatch for kite.
//!
//! Uses [`clap`] for argument parsing with derive macros. The `ask` pipeline
//! lives in [`ask`]; tool listing in [`tools`].

mod ask;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config;

pub use ask::AskArgs;

/// Top-level CLI structure for kite.
#[derive(Parser)]
#[command(
    name = "kite",
    version,
    about = "Ask a generative model, letting it call your tools"
)]
pub struct Cli {
    /// Increase diagnostic logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the kite CLI.
///
/// The `///` doc comments on variants double as `--help` text.
#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question (prompt may also be piped on stdin)
    Ask(AskArgs),
    /// List configured tool bindings and remote tools
    Tools,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Subcommands for the `config` command.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the resolved configuration
    Show,
}

/// Parses command-line arguments into a [`Cli`] struct.
pub fn parse() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI command. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Tools => {
            tools::list().await?;
            Ok(0)
        }
        Commands::Config { action } => {
            let config = config::Config::load()?;
            match action {
                ConfigAction::Show => {
                    let path = config::Config::config_path()?;
                    println!("{} {}", "Config path:".bold(), path.display());
                    println!();
                    let toml_str = toml::to_string_pretty(&config)?;
                    println!("{}", toml_str);
                }
            }
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_flags() {
        let cli = Cli::try_parse_from([
            "kite",
            "-v",
            "ask",
            "what",
            "is",
            "x?",
            "--tool",
            "lookup=/bin/lookup",
            "--recurse",
            "--max-repeat",
            "3",
            "--deadline",
            "10",
            "--image-output",
            "terminal",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Ask(args) => {
                assert_eq!(args.prompt, vec!["what", "is", "x?"]);
                assert_eq!(args.tools, vec!["lookup=/bin/lookup"]);
                assert!(args.recurse);
                assert!(args.yes);
                assert_eq!(args.max_repeat, Some(3));
                assert_eq!(args.deadline, Some(10));
                assert_eq!(args.image_output, Some(crate::media::ImageOutput::Terminal));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_config_show_parses() {
        let cli = Cli::try_parse_from(["kite", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
