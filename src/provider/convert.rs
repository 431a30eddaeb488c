//! Converts the kite [`History`] into rig-core messages.
//!
//! - model text and function calls become one assistant message per turn,
//!   each call keyed by its continuation token (or a per-name sequence id
//!   without one)
//! - consecutive user turns (prompt text, attachments and tool responses)
//!   are folded into one user message so every tool result follows its call
//!   directly
//! - thoughts and model-produced media are not sent back

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rig::message::{
    AssistantContent, AudioMediaType, Document, DocumentMediaType, DocumentSourceKind,
    ImageMediaType, Message as RigMessage, MimeType, Text, ToolCall as RigToolCall, ToolFunction,
    ToolResultContent, UserContent,
};
use rig::OneOrMany;
use std::collections::HashMap;

use crate::history::{History, Part, Role, Turn};
use crate::media::{MediaFamily, MediaType};

/// Ids linking function calls to their responses.
///
/// A continuation token is used as-is. Token-less calls get `<name>-<n>`,
/// counted per name in history order, and responses are counted the same
/// way so the n-th response to a tool pairs with its n-th call.
#[derive(Default)]
struct CallIds {
    calls: HashMap<String, usize>,
    responses: HashMap<String, usize>,
}

impl CallIds {
    fn call(&mut self, name: &str, token: Option<&String>) -> String {
        Self::next(&mut self.calls, name, token)
    }

    fn response(&mut self, name: &str, token: Option<&String>) -> String {
        Self::next(&mut self.responses, name, token)
    }

    fn next(counts: &mut HashMap<String, usize>, name: &str, token: Option<&String>) -> String {
        if let Some(token) = token {
            return token.clone();
        }
        let n = counts.entry(name.to_string()).or_default();
        *n += 1;
        format!("{}-{}", name, n)
    }
}

fn assistant_message(turn: &Turn, ids: &mut CallIds) -> Option<RigMessage> {
    let items: Vec<AssistantContent> = turn
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } if !text.is_empty() => {
                Some(AssistantContent::Text(Text { text: text.clone() }))
            }
            Part::FunctionCall(call) => Some(AssistantContent::ToolCall(RigToolCall::new(
                ids.call(&call.name, call.token.as_ref()),
                ToolFunction::new(call.name.clone(), call.args.to_value()),
            ))),
            _ => None,
        })
        .collect();
    OneOrMany::many(items)
        .ok()
        .map(|content| RigMessage::Assistant { id: None, content })
}

/// Attachments go out base64-encoded; images, audio and PDF are the kinds
/// the providers accept.
fn media_content(data: &[u8], mime_type: &str) -> Option<UserContent> {
    let media = MediaType::parse(mime_type);
    let essence = media.essence();
    match media.family() {
        MediaFamily::Image => Some(UserContent::image_base64(
            STANDARD.encode(data),
            ImageMediaType::from_mime_type(&essence),
            None,
        )),
        MediaFamily::Audio => {
            let kind = match essence.as_str() {
                "audio/mpeg" => Some(AudioMediaType::MP3),
                "audio/x-wav" | "audio/wave" => Some(AudioMediaType::WAV),
                other => AudioMediaType::from_mime_type(other),
            };
            Some(UserContent::audio(STANDARD.encode(data), kind))
        }
        MediaFamily::Other if essence == "application/pdf" => {
            Some(UserContent::Document(Document {
                data: DocumentSourceKind::Base64(STANDARD.encode(data)),
                media_type: Some(DocumentMediaType::PDF),
                additional_params: None,
            }))
        }
        MediaFamily::Other => {
            tracing::debug!(mime_type, "attachment type not sent to the model");
            None
        }
    }
}

fn user_content(part: &Part, ids: &mut CallIds) -> Option<UserContent> {
    match part {
        Part::Text { text } if !text.is_empty() => Some(UserContent::text(text.clone())),
        Part::FunctionResponse {
            name,
            outcome,
            token,
        } => Some(UserContent::tool_result(
            ids.response(name, token.as_ref()),
            OneOrMany::one(ToolResultContent::text(outcome.render(name))),
        )),
        Part::InlineMedia { data, mime_type } => media_content(data, mime_type),
        _ => None,
    }
}

/// Splits the history into rig chat messages plus the final prompt message.
///
/// The last message is what rig sends as the request's prompt; everything
/// before it is chat history.
pub fn to_rig_messages(history: &History) -> Result<(Vec<RigMessage>, RigMessage)> {
    let mut messages: Vec<RigMessage> = Vec::new();
    let mut pending_user: Vec<UserContent> = Vec::new();
    let mut ids = CallIds::default();

    let flush_user = |pending: &mut Vec<UserContent>, messages: &mut Vec<RigMessage>| {
        if let Ok(content) = OneOrMany::many(std::mem::take(pending)) {
            messages.push(RigMessage::User { content });
        }
    };

    for turn in history.turns() {
        match turn.role {
            Role::User => pending_user.extend(
                turn.parts
                    .iter()
                    .filter_map(|part| user_content(part, &mut ids)),
            ),
            Role::Model => {
                flush_user(&mut pending_user, &mut messages);
                if let Some(message) = assistant_message(turn, &mut ids) {
                    messages.push(message);
                }
            }
        }
    }
    flush_user(&mut pending_user, &mut messages);

    let prompt = messages
        .pop()
        .ok_or_else(|| anyhow!("Nothing to send: the conversation is empty"))?;
    Ok((messages, prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{PendingToolCall, ToolOutcome};
    use crate::tools::ToolArgs;
    use serde_json::json;

    fn lookup() -> PendingToolCall {
        PendingToolCall::new("lookup", ToolArgs::from_value(json!({"q": "x"})).unwrap())
            .with_token("call_1")
    }

    #[test]
    fn test_empty_history_is_an_error() {
        assert!(to_rig_messages(&History::new()).is_err());
    }

    #[test]
    fn test_single_prompt_becomes_prompt_message() {
        let mut history = History::new();
        history.push_user_text("hi");
        let (chat, prompt) = to_rig_messages(&history).unwrap();
        assert!(chat.is_empty());
        assert!(matches!(prompt, RigMessage::User { .. }));
    }

    #[test]
    fn test_tool_round_trip_layout() {
        let mut history = History::new();
        history.push_user_text("what is x?");
        let call = lookup();
        history.append_function_call("checking", call.clone());
        history.append_function_response(&call, ToolOutcome::Output("42".into()), vec![]);

        let (chat, prompt) = to_rig_messages(&history).unwrap();
        assert_eq!(chat.len(), 2);
        match &chat[1] {
            RigMessage::Assistant { content, .. } => {
                let items: Vec<_> = content.iter().collect();
                assert_eq!(items.len(), 2);
                match items[1] {
                    AssistantContent::ToolCall(tc) => {
                        assert_eq!(tc.id, "call_1");
                        assert_eq!(tc.function.name, "lookup");
                        assert_eq!(tc.function.arguments, json!({"q": "x"}));
                    }
                    other => panic!("unexpected content: {:?}", other),
                }
            }
            other => panic!("unexpected message: {:?}", other),
        }
        match prompt {
            RigMessage::User { content } => {
                assert!(matches!(content.first(), UserContent::ToolResult(r) if r.id == "call_1"));
            }
            other => panic!("unexpected prompt: {:?}", other),
        }
    }

    #[test]
    fn test_consecutive_responses_share_one_user_message() {
        let mut history = History::new();
        history.push_user_text("go");
        let a = lookup();
        let b = PendingToolCall::new("other", ToolArgs::default());
        history.append_function_call("", a.clone());
        history.append_function_call("", b.clone());
        history.append_function_response(&a, ToolOutcome::Output("1".into()), vec![]);
        history.append_function_response(&b, ToolOutcome::NoMatchingTool, vec![]);

        let (_, prompt) = to_rig_messages(&history).unwrap();
        match prompt {
            RigMessage::User { content } => assert_eq!(content.len(), 2),
            other => panic!("unexpected prompt: {:?}", other),
        }
    }

    #[test]
    fn test_user_attachments_reach_the_model() {
        let mut history = History::new();
        history.push_user_text("describe this");
        history.push_user_part(Part::media(vec![0x89, b'P', b'N', b'G'], "image/png"));

        let (chat, prompt) = to_rig_messages(&history).unwrap();
        assert!(chat.is_empty());
        let RigMessage::User { content } = prompt else {
            panic!("prompt should be a user message");
        };
        let items: Vec<_> = content.iter().collect();
        assert_eq!(items.len(), 2);
        match items[1] {
            UserContent::Image(image) => {
                assert_eq!(image.media_type, Some(ImageMediaType::PNG));
                assert_eq!(image.data, DocumentSourceKind::Base64("iVBORw==".into()));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_audio_and_pdf_attachments() {
        let mut history = History::new();
        history.push_user_part(Part::media(b"ID3".to_vec(), "audio/mpeg"));
        history.push_user_part(Part::media(b"%PDF".to_vec(), "application/pdf"));
        history.push_user_part(Part::media(vec![0; 4], "application/zip"));

        let (_, prompt) = to_rig_messages(&history).unwrap();
        let RigMessage::User { content } = prompt else {
            panic!("prompt should be a user message");
        };
        let items: Vec<_> = content.iter().collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], UserContent::Audio(a) if a.media_type == Some(AudioMediaType::MP3)));
        assert!(matches!(items[1], UserContent::Document(d) if d.media_type == Some(DocumentMediaType::PDF)));
    }

    #[test]
    fn test_model_media_is_not_sent_back() {
        let mut history = History::new();
        history.push_user_text("draw");
        history.append_model_part(Part::media(vec![1, 2, 3], "image/png"));
        history.push_user_text("thanks");

        let (chat, _) = to_rig_messages(&history).unwrap();
        assert_eq!(chat.len(), 1);
    }

    #[test]
    fn test_tokenless_calls_get_distinct_ids() {
        let mut history = History::new();
        history.push_user_text("twice");
        let first = PendingToolCall::new("lookup", ToolArgs::from_value(json!({"q": "a"})).unwrap());
        let second = PendingToolCall::new("lookup", ToolArgs::from_value(json!({"q": "b"})).unwrap());
        history.append_function_call("", first.clone());
        history.append_function_call("", second.clone());
        history.append_function_response(&first, ToolOutcome::Output("A".into()), vec![]);
        history.append_function_response(&second, ToolOutcome::Output("B".into()), vec![]);

        let (chat, prompt) = to_rig_messages(&history).unwrap();
        let RigMessage::Assistant { content, .. } = &chat[1] else {
            panic!("expected the model turn");
        };
        let call_ids: Vec<String> = content
            .iter()
            .filter_map(|item| match item {
                AssistantContent::ToolCall(tc) => Some(tc.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(call_ids, vec!["lookup-1", "lookup-2"]);

        let RigMessage::User { content } = prompt else {
            panic!("prompt should be a user message");
        };
        let result_ids: Vec<String> = content
            .iter()
            .filter_map(|item| match item {
                UserContent::ToolResult(r) => Some(r.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, call_ids);
    }
}
