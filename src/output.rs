//! Output rendering abstraction for kite.
//!
//! Defines the [`Renderer`] trait that decouples classified stream output from
//! the display layer. [`StdoutRenderer`] prints model text to stdout and
//! everything about the run (thoughts, tool activity, saved files, warnings)
//! to stderr, so piping `kite ask` only captures the answer.
//!
//! Calls arrive in the order fragments were classified. Renderers are shared
//! with the background pass worker, hence `&self` methods and `Send + Sync`.

use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::classifier::Usage;

/// Trait for rendering generation output.
pub trait Renderer: Send + Sync {
    /// Render a text token as it arrives.
    fn render_token(&self, token: &str);

    /// Render a thought fragment (only called when thoughts are shown).
    fn render_thought(&self, text: &str);

    /// Called when the model stops emitting thoughts.
    fn end_thought(&self);

    /// A tool is about to run.
    fn tool_start(&self, name: &str, args: &str);

    /// A tool produced its answer.
    fn tool_result(&self, name: &str, result: &str);

    /// Media was written to disk.
    fn render_file(&self, kind: &str, path: &Path);

    /// Emit a terminal inline-image escape sequence.
    fn render_inline_image(&self, payload: &str);

    /// Non-fatal problem worth surfacing.
    fn render_warning(&self, msg: &str);

    /// Called when an error ends the run.
    fn render_error(&self, err: &str);

    /// Called once the top-level generation is complete.
    fn render_done(&self, usage: &Usage);
}

/// Renders streaming output directly to the terminal.
///
/// Each token is printed immediately with an explicit flush so the user
/// sees a "typing" effect.
pub struct StdoutRenderer {
    token_count: AtomicUsize,
    in_thought: AtomicBool,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self {
            token_count: AtomicUsize::new(0),
            in_thought: AtomicBool::new(false),
        }
    }

    /// Returns the total number of text tokens rendered.
    pub fn token_count(&self) -> usize {
        self.token_count.load(Ordering::Relaxed)
    }
}

impl Default for StdoutRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortens long tool arguments/results for display.
fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{}...", truncated)
}

impl Renderer for StdoutRenderer {
    fn render_token(&self, token: &str) {
        print!("{}", token);
        // Flush immediately so each token appears as it arrives
        io::stdout().flush().ok();
        self.token_count.fetch_add(1, Ordering::Relaxed);
    }

    fn render_thought(&self, text: &str) {
        if !self.in_thought.swap(true, Ordering::Relaxed) {
            eprint!("{} ", "thinking:".dimmed().italic());
        }
        eprint!("{}", text.dimmed());
        io::stderr().flush().ok();
    }

    fn end_thought(&self) {
        if self.in_thought.swap(false, Ordering::Relaxed) {
            eprintln!();
        }
    }

    fn tool_start(&self, name: &str, args: &str) {
        eprintln!();
        eprintln!("{} {} {}", "tool:".yellow().bold(), name.cyan(), preview(args, 120).dimmed());
    }

    fn tool_result(&self, name: &str, result: &str) {
        eprintln!("{} {} {}", "  ->".yellow(), name.dimmed(), preview(result, 200).dimmed());
    }

    fn render_file(&self, kind: &str, path: &Path) {
        eprintln!("{} {} {}", "saved:".green().bold(), kind, path.display());
    }

    fn render_inline_image(&self, payload: &str) {
        println!("{}", payload);
        io::stdout().flush().ok();
    }

    fn render_warning(&self, msg: &str) {
        eprintln!("{} {}", "warning:".yellow().bold(), msg);
    }

    fn render_error(&self, err: &str) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), err);
    }

    fn render_done(&self, usage: &Usage) {
        println!();
        if usage.total_tokens > 0 {
            eprintln!(
                "{}",
                format!(
                    "[{} input + {} output tokens]",
                    usage.input_tokens, usage.output_tokens
                )
                .dimmed()
            );
        } else {
            eprintln!("{}", format!("[{} tokens]", self.token_count()).dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
