//! Classifies streamed model increments into history, output and tool calls.
//!
//! One [`StreamClassifier`] consumes the stream of a single pass, strictly in
//! arrival order. Text is buffered and flushed into the history with the
//! merge rule; thoughts only ever reach the renderer; function calls are
//! resolved before the next increment is read.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;

use crate::error::GenerateError;
use crate::generate::PassContext;
use crate::history::{History, Part, PendingToolCall};
use crate::media::MediaAction;

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One element of a model response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Increment {
    Text(String),
    Thought(String),
    InlineMedia { data: Vec<u8>, mime_type: String },
    FunctionCall(PendingToolCall),
    Finish(String),
    Usage(Usage),
}

/// Lazy, finite, non-restartable response stream.
pub type IncrementStream = BoxStream<'static, anyhow::Result<Increment>>;

/// How a pass ended when it ended well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// The model finished with reason "stop".
    Stopped,
    /// The stream ran out without a finish signal.
    EndOfStream,
}

pub struct StreamClassifier {
    pending_text: String,
    thinking: bool,
    show_thoughts: bool,
    usage: Usage,
}

impl StreamClassifier {
    pub fn new(show_thoughts: bool) -> Self {
        Self {
            pending_text: String::new(),
            thinking: false,
            show_thoughts,
            usage: Usage::default(),
        }
    }

    /// Usage recorded so far in this pass.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Reads `stream` to its first terminal signal or error.
    ///
    /// Buffered text is always flushed into `history` before returning, so
    /// a failed pass still leaves a consistent transcript.
    pub async fn consume(
        &mut self,
        mut stream: IncrementStream,
        history: &mut History,
        ctx: &PassContext,
    ) -> Result<PassStatus, GenerateError> {
        let status = loop {
            let increment = match stream.next().await {
                Some(Ok(increment)) => increment,
                Some(Err(err)) => break Err(GenerateError::Stream(err)),
                None => break Ok(PassStatus::EndOfStream),
            };
            match self.step(increment, history, ctx).await {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(err) => break Err(err),
            }
        };
        self.end_thought(ctx);
        self.flush(history);
        status
    }

    async fn step(
        &mut self,
        increment: Increment,
        history: &mut History,
        ctx: &PassContext,
    ) -> Result<Option<PassStatus>, GenerateError> {
        match increment {
            Increment::Usage(usage) => {
                self.usage.add(usage);
            }
            Increment::Thought(text) => {
                self.thinking = true;
                if self.show_thoughts {
                    ctx.renderer.render_thought(&text);
                }
            }
            Increment::Text(text) => {
                self.end_thought(ctx);
                if !text.is_empty() {
                    ctx.renderer.render_token(&text);
                    self.pending_text.push_str(&text);
                }
            }
            Increment::InlineMedia { data, mime_type } => {
                self.end_thought(ctx);
                self.flush(history);
                match ctx.media.handle(&data, &mime_type).await? {
                    MediaAction::Saved { kind, path } => {
                        ctx.renderer.render_file(kind, &path);
                        history.append_model_part(Part::media(data, mime_type));
                    }
                    MediaAction::Inline(sequence) => {
                        ctx.renderer.render_inline_image(&sequence);
                        history.append_model_part(Part::media(data, mime_type));
                    }
                    MediaAction::Ignored { mime_type } => {
                        ctx.renderer
                            .render_warning(&format!("ignored unsupported media '{}'", mime_type));
                    }
                }
            }
            Increment::FunctionCall(call) => {
                self.end_thought(ctx);
                let pending = std::mem::take(&mut self.pending_text);
                history.append_function_call(&pending, call.clone());
                let resolution = ctx.dispatcher.resolve(&call, history).await?;
                history.append_function_response(&call, resolution.outcome, resolution.extra);
            }
            Increment::Finish(reason) => {
                self.end_thought(ctx);
                let reason = reason.trim();
                if reason.is_empty() {
                    return Ok(None);
                }
                if reason.eq_ignore_ascii_case(crate::constants::FINISH_REASON_STOP) {
                    return Ok(Some(PassStatus::Stopped));
                }
                return Err(GenerateError::FinishReason(reason.to_string()));
            }
        }
        Ok(None)
    }

    fn flush(&mut self, history: &mut History) {
        if !self.pending_text.is_empty() {
            history.append_model_text(&self.pending_text);
            self.pending_text.clear();
        }
    }

    fn end_thought(&mut self, ctx: &PassContext) {
        if self.thinking {
            self.thinking = false;
            if self.show_thoughts {
                ctx.renderer.end_thought();
            }
        }
    }
}
