//! Runaway tool-call detection.
//!
//! A containment heuristic, not a cycle detector: the same call with the
//! same arguments answered more than `max_repeat` times fails the pass.

use crate::error::GenerateError;
use crate::history::{History, PendingToolCall};

/// Renders a call as `name(<compact JSON, keys sorted>)`.
pub fn canonical_call(call: &PendingToolCall) -> String {
    format!("{}({})", call.name, call.args.canonical_json())
}

#[derive(Debug, Clone, Copy)]
pub struct LoopGuard {
    max_repeat: usize,
}

impl LoopGuard {
    /// `max_repeat == 0` disables the guard.
    pub fn new(max_repeat: usize) -> Self {
        Self { max_repeat }
    }

    /// Checks `call` against the history it was already appended to.
    pub fn check(&self, call: &PendingToolCall, history: &History) -> Result<(), GenerateError> {
        if self.max_repeat == 0 {
            return Ok(());
        }
        let needle = canonical_call(call);
        let count = history
            .function_calls()
            .filter(|c| canonical_call(c) == needle)
            .count();
        if count > self.max_repeat {
            tracing::warn!(call = %needle, count, limit = self.max_repeat, "loop guard tripped");
            return Err(GenerateError::LoopGuard {
                call: needle,
                limit: self.max_repeat,
            });
        }
        Ok(())
    }
}
