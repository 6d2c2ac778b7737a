use serde_json::{json, Value};

use super::{unsupported_placeholder, IMAGE_NOT_SUPPORTED};
use crate::models::content::{
    NeutralContentBlock, NeutralMessageContent, ToolResultContent, ToolStatus,
};
use crate::models::message::{NeutralConversationHistory, NeutralMessage};
use crate::models::role::Role;

/// Which image sources the target accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSources {
    /// base64 and url sources (the Anthropic API)
    Any,
    /// base64 only (Claude on Vertex AI)
    Base64Only,
}

fn image_block(block: &NeutralContentBlock, images: ImageSources) -> Value {
    match (block, images) {
        (NeutralContentBlock::ImageBase64 { source }, _) => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": source.media_type,
                "data": source.data,
            }
        }),
        (NeutralContentBlock::ImageUrl { source }, ImageSources::Any) => json!({
            "type": "image",
            "source": {"type": "url", "url": source.url}
        }),
        _ => json!({"type": "text", "text": IMAGE_NOT_SUPPORTED}),
    }
}

fn tool_result_content(content: &ToolResultContent, images: ImageSources) -> Value {
    match content {
        ToolResultContent::Text(text) => json!(text),
        ToolResultContent::Blocks(blocks) => {
            let parts: Vec<Value> = blocks
                .iter()
                .map(|part| match part {
                    NeutralContentBlock::Text { text } => json!({"type": "text", "text": text}),
                    part if part.is_image() => image_block(part, images),
                    other => json!({"type": "text", "text": unsupported_placeholder(other.type_name())}),
                })
                .collect();
            if parts.is_empty() {
                json!("")
            } else {
                json!(parts)
            }
        }
    }
}

fn convert_block(block: &NeutralContentBlock, images: ImageSources) -> Value {
    match block {
        NeutralContentBlock::Text { text } => json!({"type": "text", "text": text}),
        NeutralContentBlock::ImageBase64 { .. } | NeutralContentBlock::ImageUrl { .. } => {
            image_block(block, images)
        }
        NeutralContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        NeutralContentBlock::ToolResult {
            tool_use_id,
            content,
            status,
            ..
        } => {
            let mut result = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": tool_result_content(content, images),
            });
            if *status == Some(ToolStatus::Error) {
                result["is_error"] = json!(true);
            }
            result
        }
        other => {
            tracing::debug!("Degrading {} block for Anthropic", other.type_name());
            json!({"type": "text", "text": unsupported_placeholder(other.type_name())})
        }
    }
}

/// Convert content into Anthropic blocks. Tool results are moved ahead of the other
/// blocks of the same turn, keeping their relative order.
pub fn to_anthropic_blocks(content: &[NeutralContentBlock], images: ImageSources) -> Vec<Value> {
    let (results, others): (Vec<_>, Vec<_>) = content
        .iter()
        .partition(|block| matches!(block, NeutralContentBlock::ToolResult { .. }));
    results
        .into_iter()
        .chain(others)
        .map(|block| convert_block(block, images))
        .collect()
}

pub fn to_anthropic_message(message: &NeutralMessage, images: ImageSources) -> Value {
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };
    let content = match &message.content {
        NeutralMessageContent::Text(text) => json!(text),
        NeutralMessageContent::Blocks(blocks) => json!(to_anthropic_blocks(blocks, images)),
    };
    json!({"role": role, "content": content})
}

/// Convert a history to Anthropic `messages`. System messages are skipped; lift them
/// with `split_system` first.
pub fn to_anthropic(history: &[NeutralMessage]) -> Vec<Value> {
    to_anthropic_with(history.iter(), ImageSources::Any)
}

pub fn to_anthropic_with<'a, I>(history: I, images: ImageSources) -> Vec<Value>
where
    I: IntoIterator<Item = &'a NeutralMessage>,
{
    history
        .into_iter()
        .filter(|message| message.role != Role::System)
        .map(|message| to_anthropic_message(message, images))
        .collect()
}

fn image_from_source(source: &Value) -> NeutralContentBlock {
    match source.get("type").and_then(|t| t.as_str()) {
        Some("base64") => NeutralContentBlock::image_base64(
            source["media_type"].as_str().unwrap_or("image/png"),
            source["data"].as_str().unwrap_or_default(),
        ),
        Some("url") => NeutralContentBlock::image_url(source["url"].as_str().unwrap_or_default()),
        other => NeutralContentBlock::text(unsupported_placeholder(&format!(
            "image source {}",
            other.unwrap_or("unknown")
        ))),
    }
}

/// Convert Anthropic content blocks back into neutral blocks
pub fn from_anthropic_blocks(blocks: &[Value]) -> Vec<NeutralContentBlock> {
    blocks
        .iter()
        .map(|block| match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => NeutralContentBlock::text(block["text"].as_str().unwrap_or_default()),
            Some("image") => image_from_source(&block["source"]),
            Some("tool_use") => NeutralContentBlock::tool_use(
                block["id"].as_str().unwrap_or_default(),
                block["name"].as_str().unwrap_or_default(),
                block.get("input").cloned().unwrap_or_else(|| json!({})),
            ),
            Some("tool_result") => {
                let content = match &block["content"] {
                    Value::String(text) => ToolResultContent::Text(text.clone()),
                    Value::Array(parts) => ToolResultContent::Blocks(from_anthropic_blocks(parts)),
                    _ => ToolResultContent::Text(String::new()),
                };
                let is_error = block["is_error"].as_bool().unwrap_or(false);
                NeutralContentBlock::ToolResult {
                    tool_use_id: block["tool_use_id"].as_str().unwrap_or_default().to_string(),
                    content,
                    status: is_error.then_some(ToolStatus::Error),
                    error: None,
                }
            }
            Some("thinking") => {
                NeutralContentBlock::reasoning(block["thinking"].as_str().unwrap_or_default())
            }
            other => NeutralContentBlock::text(format!(
                "[Unsupported Anthropic block type: {}]",
                other.unwrap_or("unknown")
            )),
        })
        .collect()
}

pub fn from_anthropic(messages: &[Value]) -> NeutralConversationHistory {
    messages
        .iter()
        .map(|message| {
            let role = match message["role"].as_str() {
                Some("assistant") => Role::Assistant,
                _ => Role::User,
            };
            let content = match &message["content"] {
                Value::String(text) => NeutralMessageContent::Text(text.clone()),
                Value::Array(blocks) => NeutralMessageContent::Blocks(from_anthropic_blocks(blocks)),
                _ => NeutralMessageContent::default(),
            };
            NeutralMessage {
                role,
                content,
                ts: message.get("ts").and_then(|ts| ts.as_i64()),
                metadata: None,
            }
        })
        .collect()
}
