//! Error types for a generation run.
//!
//! Every fatal condition of a pass maps onto one [`GenerateError`] variant.
//! Confirmation declines and unknown tool names are deliberately absent:
//! they become ordinary function responses the model can react to.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{EXIT_DEADLINE, EXIT_FAILURE};

/// Fatal outcome of a generation pass.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// The increment stream itself failed mid-consumption.
    #[error("Streaming error: {0:#}")]
    Stream(anyhow::Error),

    /// Inline media of a type nothing can handle.
    #[error("Unsupported content: no handler for media type '{mime_type}'")]
    UnsupportedContent { mime_type: String },

    /// Media could not be written to disk.
    #[error("Failed to write media to {}: {cause}", .path.display())]
    MediaWrite {
        path: PathBuf,
        cause: std::io::Error,
    },

    /// A local process, predefined callback, or remote tool failed.
    #[error("Tool '{name}' failed with arguments {args}: {cause:#}")]
    ToolExecution {
        name: String,
        args: String,
        cause: anyhow::Error,
    },

    /// The same call was already answered too many times.
    #[error("Loop guard: '{call}' repeated more than {limit} times")]
    LoopGuard { call: String, limit: usize },

    /// The model ended its turn for a reason other than "stop".
    #[error("Generation finished with reason: {0}")]
    FinishReason(String),

    /// The pass did not finish before its deadline.
    #[error("Generation pass exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The background pass worker went away without reporting.
    #[error("Generation worker stopped unexpectedly: {0}")]
    Worker(String),
}

impl GenerateError {
    pub fn tool(name: &str, args: &str, cause: impl Into<anyhow::Error>) -> Self {
        GenerateError::ToolExecution {
            name: name.to_string(),
            args: args.to_string(),
            cause: cause.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Deadline overruns get their own code so callers can retry with a
    /// larger deadline.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateError::DeadlineExceeded(_) => EXIT_DEADLINE,
            _ => EXIT_FAILURE,
        }
    }
}
