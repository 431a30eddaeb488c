//! Conversation history for kite.
//!
//! Provides the append-only [`History`] buffer of role-tagged [`Turn`]s.
//! Every part of a turn is an explicit [`Part`] variant so the stream
//! classifier, tool dispatcher, and provider conversion can match on it
//! exhaustively. The buffer is converted to provider-specific messages
//! (e.g. rig-core's `Message`) only when a request is sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolArgs;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A tool invocation requested by the model.
///
/// Extracted from a function-call increment the moment it is seen. The
/// continuation token is opaque provider state that must be echoed back on
/// the matching [`Part::FunctionResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingToolCall {
    pub name: String,
    pub args: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl PendingToolCall {
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            name: name.into(),
            args,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// What answering a tool call produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Plain text answer (process stdout, operator input, rendered template).
    Output(String),
    /// Structured JSON answer from a remote tool.
    Structured(Value),
    /// The operator declined the confirmation prompt.
    Declined,
    /// The permission table denies this tool.
    Disabled(String),
    /// The arguments failed schema validation.
    InvalidArguments(String),
    /// Neither a binding nor a remote tool matched the name.
    NoMatchingTool,
}

impl ToolOutcome {
    /// Text fed back to the model for this outcome.
    pub fn render(&self, name: &str) -> String {
        match self {
            ToolOutcome::Output(text) => text.clone(),
            ToolOutcome::Structured(value) => value.to_string(),
            ToolOutcome::Declined => format!("The user declined to run '{}'.", name),
            ToolOutcome::Disabled(reason) => reason.clone(),
            ToolOutcome::InvalidArguments(reason) => {
                format!("Invalid arguments for '{}': {}", name, reason)
            }
            ToolOutcome::NoMatchingTool => format!("No matching tool found for '{}'.", name),
        }
    }
}

/// One typed fragment within a [`Turn`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Thought {
        text: String,
    },
    InlineMedia {
        #[serde(skip)]
        data: Vec<u8>,
        mime_type: String,
    },
    FunctionCall(PendingToolCall),
    FunctionResponse {
        name: String,
        outcome: ToolOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn media(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Part::InlineMedia {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// One role-tagged unit of conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }
}

/// Ordered, append-only conversation history.
///
/// Only the last turn is ever mutated, and only while new content has the
/// same role. Turns are never removed during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the last turn if it has `role`, otherwise starts a new one.
    fn turn_for(&mut self, role: Role) -> &mut Turn {
        let reuse = matches!(self.turns.last(), Some(t) if t.role == role);
        if !reuse {
            self.turns.push(Turn::new(role));
        }
        // A turn was just ensured above.
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }

    /// Appends prompt text to the current user turn.
    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.turn_for(Role::User).parts.push(Part::text(text));
    }

    /// Appends any prompt part (attachments) to the current user turn.
    pub fn push_user_part(&mut self, part: Part) {
        self.turn_for(Role::User).parts.push(part);
    }

    /// Merges streamed model text into the transcript.
    ///
    /// If the last turn is a model turn ending in a text part the text is
    /// concatenated onto it; otherwise a new text part (and, if needed, a new
    /// model turn) is created. Empty text is ignored.
    pub fn append_model_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let turn = self.turn_for(Role::Model);
        if let Some(Part::Text { text: existing }) = turn.parts.last_mut() {
            existing.push_str(text);
            return;
        }
        turn.parts.push(Part::text(text));
    }

    /// Appends a non-text model part such as inline media.
    pub fn append_model_part(&mut self, part: Part) {
        self.turn_for(Role::Model).parts.push(part);
    }

    /// Records a tool invocation on the current model turn.
    ///
    /// `pending_text` is flushed first so prose emitted before the call keeps
    /// its position in the transcript.
    pub fn append_function_call(&mut self, pending_text: &str, call: PendingToolCall) {
        self.append_model_text(pending_text);
        self.turn_for(Role::Model)
            .parts
            .push(Part::FunctionCall(call));
    }

    /// Records a tool answer in a fresh user turn.
    ///
    /// Function responses are user-supplied continuations, so they always
    /// open a new user turn. `extra` parts (media returned by a remote tool)
    /// follow the response in the same turn.
    pub fn append_function_response(
        &mut self,
        call: &PendingToolCall,
        outcome: ToolOutcome,
        extra: Vec<Part>,
    ) {
        let mut turn = Turn::new(Role::User);
        turn.parts.push(Part::FunctionResponse {
            name: call.name.clone(),
            outcome,
            token: call.token.clone(),
        });
        turn.parts.extend(extra);
        self.turns.push(turn);
    }

    /// True when the latest turn is user-authored, i.e. a tool answer is
    /// waiting to be consumed by the model.
    pub fn ends_with_user_turn(&self) -> bool {
        matches!(self.turns.last(), Some(t) if t.role == Role::User)
    }

    /// Iterates every function call recorded in the buffer, oldest first.
    pub fn function_calls(&self) -> impl Iterator<Item = &PendingToolCall> {
        self.turns
            .iter()
            .flat_map(|t| t.parts.iter())
            .filter_map(|p| match p {
                Part::FunctionCall(call) => Some(call),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn call(name: &str) -> PendingToolCall {
        PendingToolCall::new(name, ToolArgs::from_value(json!({"q": "x"})).unwrap())
    }

    #[test]
    fn test_text_deltas_merge_into_one_part() {
        let mut history = History::new();
        history.append_model_text("Hello ");
        history.append_model_text("world");
        assert_eq!(history.turns().len(), 1);
        assert_eq!(history.turns()[0].role, Role::Model);
        assert_eq!(history.turns()[0].parts, vec![Part::text("Hello world")]);
    }

    #[test]
    fn test_model_text_after_user_turn_starts_new_turn() {
        let mut history = History::new();
        history.push_user_text("question");
        history.append_model_text("answer");
        assert_eq!(history.turns().len(), 2);
        assert_eq!(history.turns()[1].role, Role::Model);
    }

    #[test]
    fn test_text_after_media_is_a_new_part() {
        let mut history = History::new();
        history.append_model_text("before");
        history.append_model_part(Part::media(vec![1, 2], "image/png"));
        history.append_model_text("after");
        let parts = &history.turns()[0].parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], Part::text("after"));
    }

    #[test]
    fn test_function_call_flushes_pending_text() {
        let mut history = History::new();
        history.append_function_call("let me check", call("lookup"));
        let parts = &history.turns()[0].parts;
        assert_eq!(parts[0], Part::text("let me check"));
        assert!(matches!(&parts[1], Part::FunctionCall(c) if c.name == "lookup"));
    }

    #[test]
    fn test_function_response_always_opens_user_turn() {
        let mut history = History::new();
        let c = call("lookup").with_token("sig-1");
        history.append_function_call("", c.clone());
        history.append_function_response(&c, ToolOutcome::Output("42".into()), vec![]);
        history.append_function_response(&c, ToolOutcome::Output("43".into()), vec![]);
        assert_eq!(history.turns().len(), 3);
        match &history.turns()[1].parts[0] {
            Part::FunctionResponse {
                name,
                outcome,
                token,
            } => {
                assert_eq!(name, "lookup");
                assert_eq!(outcome, &ToolOutcome::Output("42".into()));
                assert_eq!(token.as_deref(), Some("sig-1"));
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_ends_with_user_turn_tracks_last_append() {
        let mut history = History::new();
        assert!(!history.ends_with_user_turn());
        let c = call("lookup");
        history.append_function_call("", c.clone());
        assert!(!history.ends_with_user_turn());
        history.append_function_response(&c, ToolOutcome::Declined, vec![]);
        assert!(history.ends_with_user_turn());
        history.append_model_text("ok");
        assert!(!history.ends_with_user_turn());
    }

    #[test]
    fn test_function_calls_iterates_in_order() {
        let mut history = History::new();
        history.append_function_call("", call("a"));
        history.append_function_response(&call("a"), ToolOutcome::NoMatchingTool, vec![]);
        history.append_function_call("", call("b"));
        let names: Vec<_> = history.function_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_outcome_render() {
        assert_eq!(ToolOutcome::Output("42".into()).render("lookup"), "42");
        assert!(ToolOutcome::Declined.render("lookup").contains("declined"));
        assert!(ToolOutcome::NoMatchingTool
            .render("lookup")
            .contains("No matching tool"));
    }

    proptest! {
        #[test]
        fn prop_deltas_concatenate_in_order(deltas in proptest::collection::vec(".{0,8}", 1..20)) {
            let mut history = History::new();
            for d in &deltas {
                history.append_model_text(d);
            }
            let expected: String = deltas.concat();
            if expected.is_empty() {
                prop_assert!(history.is_empty());
            } else {
                prop_assert_eq!(history.turns().len(), 1);
                prop_assert_eq!(&history.turns()[0].parts, &vec![Part::text(expected)]);
            }
        }
    }
}
