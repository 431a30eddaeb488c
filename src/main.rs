//! Entry point for kite, a tool-calling generative model client for the
//! terminal.
//!
//! This binary loads environment variables, parses CLI arguments via [`cli`],
//! and dispatches the chosen subcommand. The process exit code mirrors the
//! outcome of the run (see [`constants`]).

mod attachments;
mod classifier;
mod cli;
mod config;
mod constants;
mod error;
mod generate;
mod guard;
mod history;
mod logging;
mod mcp;
mod media;
mod output;
mod permissions;
mod provider;
mod tools;

#[cfg(test)]
mod test_support;

use colored::Colorize;
use std::process::ExitCode;

use crate::constants::{EXIT_FAILURE, EXIT_INTERRUPTED};

/// Runs the kite CLI.
///
/// Loads `.env` files (silently ignored if absent), parses command-line
/// arguments, and races the subcommand against Ctrl+C.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = cli::parse();
    logging::init(cli.verbose);

    let code = tokio::select! {
        result = cli::run(cli) => match result {
            Ok(code) => code,
            Err(err) => {
                eprintln!("{} {:#}", "error:".red().bold(), err);
                EXIT_FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("{}", "interrupted".yellow());
            EXIT_INTERRUPTED
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
