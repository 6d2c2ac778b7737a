use serde_json::{json, Value};
use std::collections::HashMap;

use super::{unsupported_placeholder, IMAGE_NOT_SUPPORTED};
use crate::models::content::{NeutralContentBlock, NeutralMessageContent, ToolResultContent};
use crate::models::message::{NeutralConversationHistory, NeutralMessage};
use crate::models::role::Role;

pub const IMAGE_FOLLOWS_NOTICE: &str = "(See next part for image)";

/// Recover a function name from a tool id when the call is not in the history.
/// Ids minted by `from_gemini` have the form `<name>-<n>`.
pub fn function_name_from_id(tool_use_id: &str) -> &str {
    match tool_use_id.rsplit_once('-') {
        Some((name, n)) if !name.is_empty() && n.parse::<usize>().is_ok() => name,
        _ => tool_use_id,
    }
}

fn inline_data(block: &NeutralContentBlock) -> Option<Value> {
    match block {
        NeutralContentBlock::ImageBase64 { source } => Some(json!({
            "inlineData": {"mimeType": source.media_type, "data": source.data}
        })),
        _ => None,
    }
}

fn function_response(name: &str, content: &ToolResultContent, parts: &mut Vec<Value>) {
    let mut text = content.joined_text("\n\n");
    let images: Vec<Value> = content.blocks().iter().filter_map(inline_data).collect();
    if !images.is_empty() {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(IMAGE_FOLLOWS_NOTICE);
    }
    parts.push(json!({
        "functionResponse": {
            "name": name,
            "response": {"name": name, "content": text}
        }
    }));
    parts.extend(images);
}

fn to_gemini_parts(
    content: &NeutralMessageContent,
    call_names: &mut HashMap<String, String>,
) -> Vec<Value> {
    let mut parts = Vec::new();
    for block in content.blocks().iter() {
        match block {
            NeutralContentBlock::Text { text } => parts.push(json!({"text": text})),
            NeutralContentBlock::ImageBase64 { .. } => parts.extend(inline_data(block)),
            NeutralContentBlock::ImageUrl { .. } => parts.push(json!({"text": IMAGE_NOT_SUPPORTED})),
            NeutralContentBlock::ToolUse { id, name, input } => {
                call_names.insert(id.clone(), name.clone());
                parts.push(json!({"functionCall": {"name": name, "args": input}}));
            }
            NeutralContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                let name = call_names
                    .get(tool_use_id)
                    .cloned()
                    .unwrap_or_else(|| function_name_from_id(tool_use_id).to_string());
                function_response(&name, content, &mut parts);
            }
            other => {
                tracing::debug!("Degrading {} block for Gemini", other.type_name());
                parts.push(json!({"text": unsupported_placeholder(other.type_name())}));
            }
        }
    }
    parts
}

/// Convert a history to Gemini `contents`. Gemini only knows `user` and `model`; tool
/// results travel as `functionResponse` parts of a user turn. System messages are
/// skipped, lift them into `systemInstruction` with `split_system`.
pub fn to_gemini(history: &[NeutralMessage]) -> Vec<Value> {
    to_gemini_from(history.iter())
}

pub fn to_gemini_from<'a, I>(history: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a NeutralMessage>,
{
    let mut call_names = HashMap::new();
    history
        .into_iter()
        .filter(|message| message.role != Role::System)
        .map(|message| {
            let role = match message.role {
                Role::User | Role::Tool => "user",
                _ => "model",
            };
            json!({"role": role, "parts": to_gemini_parts(&message.content, &mut call_names)})
        })
        .collect()
}

pub fn system_instruction(system: &str) -> Value {
    json!({"role": "user", "parts": [{"text": system}]})
}

/// Mints `<name>-<n>` ids for function calls, which Gemini does not number
#[derive(Debug, Default)]
pub struct CallIds {
    next: usize,
    last_by_name: HashMap<String, String>,
}

impl CallIds {
    pub fn mint(&mut self, name: &str) -> String {
        self.next += 1;
        let id = format!("{}-{}", name, self.next);
        self.last_by_name.insert(name.to_string(), id.clone());
        id
    }

    pub fn last_for(&self, name: &str) -> Option<&str> {
        self.last_by_name.get(name).map(String::as_str)
    }
}

fn response_text(response: &Value) -> String {
    match response.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => response.to_string(),
    }
}

fn from_gemini_parts(parts: &[Value], ids: &mut CallIds) -> Vec<NeutralContentBlock> {
    let mut blocks: Vec<NeutralContentBlock> = Vec::new();
    // index of a tool result still collecting the images that follow it
    let mut collecting: Option<usize> = None;

    for part in parts {
        if let Some(data) = part.get("inlineData") {
            let image = NeutralContentBlock::image_base64(
                data["mimeType"].as_str().unwrap_or("image/png"),
                data["data"].as_str().unwrap_or_default(),
            );
            if let Some(NeutralContentBlock::ToolResult { content, .. }) =
                collecting.and_then(|index| blocks.get_mut(index))
            {
                let mut merged = content.blocks().into_owned();
                merged.push(image);
                *content = ToolResultContent::Blocks(merged);
            } else {
                blocks.push(image);
            }
            continue;
        }
        collecting = None;

        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if part["thought"].as_bool().unwrap_or(false) {
                blocks.push(NeutralContentBlock::reasoning(text));
            } else {
                blocks.push(NeutralContentBlock::text(text));
            }
        } else if let Some(call) = part.get("functionCall") {
            let name = call["name"].as_str().unwrap_or_default();
            blocks.push(NeutralContentBlock::tool_use(
                ids.mint(name),
                name,
                call.get("args").cloned().unwrap_or_else(|| json!({})),
            ));
        } else if let Some(response) = part.get("functionResponse") {
            let name = response["name"].as_str().unwrap_or_default();
            let tool_use_id = ids
                .last_for(name)
                .map(str::to_string)
                .unwrap_or_else(|| ids.mint(name));
            let text = response_text(&response["response"]);
            let (text, images_follow) = match text.strip_suffix(IMAGE_FOLLOWS_NOTICE) {
                Some(stripped) => (stripped.trim_end().to_string(), true),
                None => (text, false),
            };
            let content = if images_follow && text.is_empty() {
                ToolResultContent::Blocks(Vec::new())
            } else if images_follow {
                ToolResultContent::Blocks(vec![NeutralContentBlock::text(text)])
            } else {
                ToolResultContent::Text(text)
            };
            blocks.push(NeutralContentBlock::tool_result(tool_use_id, content));
            if images_follow {
                collecting = Some(blocks.len() - 1);
            }
        } else {
            tracing::warn!("Unsupported Gemini part: {}", part);
            blocks.push(NeutralContentBlock::text("[Unsupported Gemini part type]"));
        }
    }
    blocks
}

/// Convert Gemini `contents` back into a neutral history. Function call ids are minted.
pub fn from_gemini(contents: &[Value]) -> NeutralConversationHistory {
    let mut ids = CallIds::default();
    contents
        .iter()
        .map(|content| {
            let role = match content["role"].as_str() {
                Some("user") => Role::User,
                _ => Role::Assistant,
            };
            let parts = content["parts"].as_array().map(Vec::as_slice).unwrap_or(&[]);
            NeutralMessage {
                role,
                content: NeutralMessageContent::Blocks(from_gemini_parts(parts, &mut ids)),
                ts: None,
                metadata: None,
            }
        })
        .collect()
}
