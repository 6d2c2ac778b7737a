use serde_json::{json, Value};

use super::{parse_data_uri, to_data_uri, unsupported_placeholder, IMAGE_NOT_SUPPORTED};
use crate::models::content::{NeutralContentBlock, NeutralMessageContent, ToolResultContent};
use crate::models::message::{NeutralConversationHistory, NeutralMessage};
use crate::models::role::Role;

pub const TOOL_IMAGE_NOTICE: &str =
    "This tool result included an image that is uploaded in the next message.";

/// Convert an image block into an OpenAI `image_url` part
pub fn convert_image(block: &NeutralContentBlock) -> Option<Value> {
    match block {
        NeutralContentBlock::ImageBase64 { source } => Some(json!({
            "type": "image_url",
            "image_url": {"url": to_data_uri(&source.media_type, &source.data)}
        })),
        NeutralContentBlock::ImageUrl { source } => Some(json!({
            "type": "image_url",
            "image_url": {"url": source.url}
        })),
        _ => None,
    }
}

/// Convert user-visible blocks into OpenAI content. A lone text block collapses to a string.
pub fn to_openai_content(blocks: &[&NeutralContentBlock]) -> Value {
    if let [NeutralContentBlock::Text { text }] = blocks {
        return json!(text);
    }
    let parts: Vec<Value> = blocks
        .iter()
        .map(|block| match block {
            NeutralContentBlock::Text { text } => json!({"type": "text", "text": text}),
            block if block.is_image() => convert_image(block)
                .unwrap_or_else(|| json!({"type": "text", "text": IMAGE_NOT_SUPPORTED})),
            other => json!({"type": "text", "text": unsupported_placeholder(other.type_name())}),
        })
        .collect();
    json!(parts)
}

fn assistant_message(content: &NeutralMessageContent) -> Value {
    let blocks = content.blocks();
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks.iter() {
        match block {
            NeutralContentBlock::Text { text } => texts.push(text.clone()),
            NeutralContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": input.to_string()}
            })),
            block if block.is_image() => texts.push(IMAGE_NOT_SUPPORTED.to_string()),
            other => texts.push(unsupported_placeholder(other.type_name())),
        }
    }

    if tool_calls.is_empty() {
        return json!({"role": "assistant", "content": texts.join("\n\n")});
    }
    let content = if texts.is_empty() {
        Value::Null
    } else {
        json!(texts.join("\n\n"))
    };
    json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
}

/// Tool results become `role: tool` messages. Images they carry are re-sent in a
/// follow-up user message, since tool messages only accept text.
fn tool_messages(
    tool_use_id: &str,
    content: &ToolResultContent,
    output: &mut Vec<Value>,
    trailing_images: &mut Vec<Value>,
) {
    let mut text = content.joined_text("\n\n");
    for block in content.blocks().iter() {
        if let Some(image) = convert_image(block) {
            trailing_images.push(image);
            if !text.contains(TOOL_IMAGE_NOTICE) {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(TOOL_IMAGE_NOTICE);
            }
        }
    }
    output.push(json!({
        "role": "tool",
        "tool_call_id": tool_use_id,
        "content": text,
    }));
}

fn user_messages(role: Role, content: &NeutralMessageContent, output: &mut Vec<Value>) {
    if let NeutralMessageContent::Text(text) = content {
        output.push(json!({"role": "user", "content": text}));
        return;
    }

    let blocks = content.blocks();
    let mut trailing_images = Vec::new();
    let mut rest = Vec::new();
    for block in blocks.iter() {
        match block {
            NeutralContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => tool_messages(tool_use_id, content, output, &mut trailing_images),
            other => rest.push(other),
        }
    }

    if !trailing_images.is_empty() {
        output.push(json!({"role": "user", "content": trailing_images}));
    }
    if !rest.is_empty() || (role == Role::User && output.is_empty()) {
        output.push(json!({"role": "user", "content": to_openai_content(&rest)}));
    }
}

/// Convert one neutral message into one or more OpenAI chat messages
pub fn to_openai_messages(message: &NeutralMessage) -> Vec<Value> {
    match message.role {
        Role::System => vec![json!({"role": "system", "content": message.text()})],
        Role::Assistant => vec![assistant_message(&message.content)],
        Role::User | Role::Tool => {
            let mut output = Vec::new();
            user_messages(message.role, &message.content, &mut output);
            output
        }
    }
}

/// Convert a history to OpenAI chat `messages`
pub fn to_openai(history: &[NeutralMessage]) -> Vec<Value> {
    history.iter().flat_map(to_openai_messages).collect()
}

/// Parse tool call arguments, keeping unparseable payloads under `raw`
pub fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({"raw": arguments}))
}

fn from_openai_part(part: &Value) -> NeutralContentBlock {
    match part["type"].as_str() {
        Some("text") => NeutralContentBlock::text(part["text"].as_str().unwrap_or_default()),
        Some("image_url") => {
            let url = part["image_url"]["url"].as_str().unwrap_or_default();
            match parse_data_uri(url) {
                Some((media_type, data)) => NeutralContentBlock::image_base64(media_type, data),
                None => NeutralContentBlock::image_url(url),
            }
        }
        other => NeutralContentBlock::text(unsupported_placeholder(other.unwrap_or("unknown"))),
    }
}

fn from_openai_content(content: &Value) -> Vec<NeutralContentBlock> {
    match content {
        Value::String(text) if !text.is_empty() => vec![NeutralContentBlock::text(text)],
        Value::Array(parts) => parts.iter().map(from_openai_part).collect(),
        _ => Vec::new(),
    }
}

/// Convert OpenAI chat messages back into a neutral history.
///
/// Consecutive `tool` messages and the user message that follows them fold into one
/// user turn, mirroring how `to_openai` splits it.
pub fn from_openai(messages: &[Value]) -> NeutralConversationHistory {
    let mut history: Vec<NeutralMessage> = Vec::new();
    let mut folding = false;

    for message in messages {
        let role = message["role"].as_str().unwrap_or("user");
        match role {
            "tool" => {
                let block = NeutralContentBlock::tool_result(
                    message["tool_call_id"].as_str().unwrap_or_default(),
                    message["content"].as_str().unwrap_or_default(),
                );
                match history.last_mut() {
                    Some(last) if folding => {
                        *last = std::mem::replace(last, NeutralMessage::user()).with_block(block)
                    }
                    _ => history.push(NeutralMessage {
                        ts: None,
                        ..NeutralMessage::user().with_block(block)
                    }),
                }
                folding = true;
            }
            "user" if folding => {
                let blocks = from_openai_content(&message["content"]);
                if let Some(last) = history.last_mut() {
                    let mut merged = std::mem::replace(last, NeutralMessage::user());
                    for block in blocks {
                        merged = merged.with_block(block);
                    }
                    *last = merged;
                }
                // an image follow-up may precede the user's own content
                folding = message["content"]
                    .as_array()
                    .map(|parts| parts.iter().all(|p| p["type"] == "image_url"))
                    .unwrap_or(false);
            }
            _ => {
                folding = false;
                let role = match role {
                    "system" | "developer" => Role::System,
                    "assistant" => Role::Assistant,
                    "user" => Role::User,
                    other => {
                        tracing::warn!("Unknown OpenAI role '{}', treating as user", other);
                        Role::User
                    }
                };
                let mut blocks = from_openai_content(&message["content"]);
                if let Some(calls) = message["tool_calls"].as_array() {
                    for call in calls {
                        blocks.push(NeutralContentBlock::tool_use(
                            call["id"].as_str().unwrap_or_default(),
                            call["function"]["name"].as_str().unwrap_or_default(),
                            parse_arguments(call["function"]["arguments"].as_str().unwrap_or("")),
                        ));
                    }
                }
                let content = match (&message["content"], blocks.len()) {
                    (Value::String(text), 1) => NeutralMessageContent::Text(text.clone()),
                    _ => NeutralMessageContent::Blocks(blocks),
                };
                history.push(NeutralMessage {
                    role,
                    content,
                    ts: None,
                    metadata: None,
                });
            }
        }
    }
    history
}
