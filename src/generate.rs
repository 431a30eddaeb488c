//! Generation orchestrator and recursion controller.
//!
//! A pass sends the history to the model and classifies the streamed answer,
//! resolving tool calls as they arrive. Each pass runs on its own task while
//! [`Orchestrator::generate`] races it against the pass deadline. Passes run
//! one after another, never concurrently, until the model stops calling
//! tools (or recursion is off).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::classifier::{PassStatus, StreamClassifier, Usage};
use crate::error::GenerateError;
use crate::history::History;
use crate::media::MediaHandler;
use crate::output::Renderer;
use crate::provider::{ModelClient, RequestOptions};
use crate::tools::ToolDispatcher;

/// Shared, read-only state of every pass in one run.
pub struct PassContext {
    pub client: Arc<dyn ModelClient>,
    pub options: RequestOptions,
    pub dispatcher: ToolDispatcher,
    pub media: MediaHandler,
    pub renderer: Arc<dyn Renderer>,
    pub show_thoughts: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    /// Start another pass while a tool result is waiting for the model.
    pub recursion: bool,
    /// Upper bound for a single pass.
    pub deadline: Duration,
}

/// Result of a top-level [`Orchestrator::generate`] call.
#[derive(Debug)]
pub struct PassOutcome {
    pub exit_code: i32,
    pub error: Option<GenerateError>,
    pub history: History,
    pub usage: Usage,
    pub passes: usize,
}

/// What one pass worker hands back.
struct PassReport {
    history: History,
    usage: Usage,
    result: Result<PassStatus, GenerateError>,
}

pub struct Orchestrator {
    ctx: Arc<PassContext>,
    settings: GenerationSettings,
}

impl Orchestrator {
    pub fn new(ctx: PassContext, settings: GenerationSettings) -> Self {
        Self {
            ctx: Arc::new(ctx),
            settings,
        }
    }

    /// Runs passes until the model is done, then closes remote sessions.
    ///
    /// Later passes get no new prompt text: the carried-over history is the
    /// whole input. The loop guard is the only hard stop on recursion.
    pub async fn generate(&self, history: History) -> PassOutcome {
        let mut history = history;
        let mut usage = Usage::default();
        let mut passes = 0;

        let error = loop {
            passes += 1;
            tracing::info!(pass = passes, "starting generation pass");
            let report = self.run_pass(history).await;
            history = report.history;
            usage.add(report.usage);

            match report.result {
                Ok(status) => {
                    tracing::debug!(pass = passes, ?status, "pass finished");
                    if !history.ends_with_user_turn() {
                        break None;
                    }
                    if !self.settings.recursion {
                        tracing::info!("recursion disabled, leaving tool result unconsumed");
                        break None;
                    }
                }
                Err(err) => {
                    tracing::warn!(pass = passes, error = %err, "pass failed");
                    break Some(err);
                }
            }
        };

        self.ctx.dispatcher.catalog().close().await;

        PassOutcome {
            exit_code: error.as_ref().map_or(0, GenerateError::exit_code),
            error,
            history,
            usage,
            passes,
        }
    }

    /// Runs one pass on a worker task, bounded by the deadline.
    ///
    /// On timeout the worker is detached, not cancelled: tools it started
    /// run to completion or their own timeout, and its late result is
    /// dropped. The history handed back is the one the pass started from.
    async fn run_pass(&self, history: History) -> PassReport {
        let snapshot = history.clone();
        let (tx, rx) = oneshot::channel();
        let ctx = self.ctx.clone();
        let worker = tokio::spawn(async move {
            let report = execute_pass(ctx, history).await;
            // The receiver is gone once the deadline fired.
            tx.send(report).ok();
        });

        tokio::select! {
            received = rx => match received {
                Ok(report) => report,
                Err(_) => {
                    let reason = match worker.await {
                        Err(err) if err.is_panic() => "pass worker panicked".to_string(),
                        Err(err) => err.to_string(),
                        Ok(()) => "pass worker exited without a result".to_string(),
                    };
                    PassReport {
                        history: snapshot,
                        usage: Usage::default(),
                        result: Err(GenerateError::Worker(reason)),
                    }
                }
            },
            _ = tokio::time::sleep(self.settings.deadline) => {
                tracing::warn!(deadline = ?self.settings.deadline, "pass deadline exceeded");
                drop(worker);
                PassReport {
                    history: snapshot,
                    usage: Usage::default(),
                    result: Err(GenerateError::DeadlineExceeded(self.settings.deadline)),
                }
            }
        }
    }
}

async fn execute_pass(ctx: Arc<PassContext>, mut history: History) -> PassReport {
    let stream = match ctx.client.stream_generate(&history, &ctx.options).await {
        Ok(stream) => stream,
        Err(err) => {
            return PassReport {
                history,
                usage: Usage::default(),
                result: Err(GenerateError::Stream(err)),
            }
        }
    };
    let mut classifier = StreamClassifier::new(ctx.show_thoughts);
    let result = classifier.consume(stream, &mut history, &ctx).await;
    PassReport {
        history,
        usage: classifier.usage(),
        result,
    }
}

impl PassOutcome {
    /// True when the run ended without a fatal error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
