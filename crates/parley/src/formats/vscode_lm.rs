//! Messages for a language model hosted by the IDE.
//!
//! The host API has user and assistant messages made of text, tool-call and tool-result
//! parts. It accepts no images and no system role.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::unsupported_placeholder;
use crate::models::content::NeutralContentBlock;
use crate::models::message::NeutralMessage;
use crate::models::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LmPart {
    Text {
        value: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        call_id: String,
        content: Vec<String>,
    },
}

impl LmPart {
    pub fn text<S: Into<String>>(value: S) -> Self {
        LmPart::Text {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmChatMessage {
    pub role: LmRole,
    pub parts: Vec<LmPart>,
}

impl LmChatMessage {
    pub fn user(parts: Vec<LmPart>) -> Self {
        LmChatMessage {
            role: LmRole::User,
            parts,
        }
    }

    pub fn assistant(parts: Vec<LmPart>) -> Self {
        LmChatMessage {
            role: LmRole::Assistant,
            parts,
        }
    }
}

pub fn image_placeholder(block: &NeutralContentBlock) -> String {
    match block {
        NeutralContentBlock::ImageBase64 { source } => format!(
            "[Image (base64): {} not supported by VSCode LM API]",
            source.media_type
        ),
        _ => "[Image (url): media-type not applicable for URL source not supported by VSCode LM API]"
            .to_string(),
    }
}

/// Tool call input must be an object; JSON strings are parsed, anything else is dropped
fn as_object(input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({}),
        },
        _ => json!({}),
    }
}

fn text_part(block: &NeutralContentBlock) -> LmPart {
    match block {
        NeutralContentBlock::Text { text } => LmPart::text(text.as_str()),
        block if block.is_image() => LmPart::text(image_placeholder(block)),
        other => LmPart::text(unsupported_placeholder(other.type_name())),
    }
}

pub fn to_vscode_lm_message(message: &NeutralMessage) -> LmChatMessage {
    let blocks = message.content.blocks();
    match message.role {
        Role::Assistant => {
            let mut calls = Vec::new();
            let mut rest = Vec::new();
            for block in blocks.iter() {
                match block {
                    NeutralContentBlock::ToolUse { id, name, input } => calls.push(LmPart::ToolCall {
                        call_id: id.clone(),
                        name: name.clone(),
                        input: as_object(input),
                    }),
                    other => rest.push(text_part(other)),
                }
            }
            calls.extend(rest);
            LmChatMessage::assistant(calls)
        }
        _ => {
            let mut results = Vec::new();
            let mut rest = Vec::new();
            for block in blocks.iter() {
                match block {
                    NeutralContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => results.push(LmPart::ToolResult {
                        call_id: tool_use_id.clone(),
                        content: content
                            .blocks()
                            .iter()
                            .map(|part| match text_part(part) {
                                LmPart::Text { value } => value,
                                _ => String::new(),
                            })
                            .collect(),
                    }),
                    other => rest.push(text_part(other)),
                }
            }
            results.extend(rest);
            LmChatMessage::user(results)
        }
    }
}

/// Convert a history to host messages. System text is sent as a leading user message.
pub fn to_vscode_lm(history: &[NeutralMessage]) -> Vec<LmChatMessage> {
    history.iter().map(to_vscode_lm_message).collect()
}
