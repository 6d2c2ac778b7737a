use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{unsupported_placeholder, IMAGE_NOT_SUPPORTED};
use crate::models::content::{
    NeutralContentBlock, NeutralMessageContent, ToolResultContent, ToolStatus,
};
use crate::models::message::{NeutralConversationHistory, NeutralMessage};
use crate::models::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedrockRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedrockImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl BedrockImageFormat {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.split('/').nth(1)? {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Raw image bytes travel base64 encoded in the JSON form of the Converse API
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockImageSource {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockImage {
    pub format: BedrockImageFormat,
    pub source: BedrockImageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolUse {
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BedrockToolResultContent {
    Text(String),
    Json(Value),
    Image(BedrockImage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolResult {
    pub tool_use_id: String,
    pub content: Vec<BedrockToolResultContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
}

/// One Converse content block. Serialized externally tagged, e.g. `{"text": "hi"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BedrockContentBlock {
    Text(String),
    Image(BedrockImage),
    ToolUse(BedrockToolUse),
    ToolResult(BedrockToolResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockMessage {
    pub role: BedrockRole,
    pub content: Vec<BedrockContentBlock>,
}

fn convert_image(media_type: &str, data: &str) -> Result<BedrockImage, String> {
    let format = BedrockImageFormat::from_media_type(media_type)
        .ok_or_else(|| format!("[Unsupported image format: {}]", media_type))?;
    let bytes = STANDARD
        .decode(data)
        .map_err(|_| "[Image data could not be decoded]".to_string())?;
    Ok(BedrockImage {
        format,
        source: BedrockImageSource { bytes },
    })
}

fn convert_block(block: &NeutralContentBlock) -> BedrockContentBlock {
    match block {
        NeutralContentBlock::Text { text } => BedrockContentBlock::Text(text.clone()),
        NeutralContentBlock::ImageBase64 { source } => {
            match convert_image(&source.media_type, &source.data) {
                Ok(image) => BedrockContentBlock::Image(image),
                Err(placeholder) => BedrockContentBlock::Text(placeholder),
            }
        }
        NeutralContentBlock::ImageUrl { .. } => {
            BedrockContentBlock::Text(IMAGE_NOT_SUPPORTED.to_string())
        }
        NeutralContentBlock::ToolUse { id, name, input } => {
            BedrockContentBlock::ToolUse(BedrockToolUse {
                tool_use_id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            })
        }
        NeutralContentBlock::ToolResult {
            tool_use_id,
            content,
            status,
            ..
        } => {
            let content = content
                .blocks()
                .iter()
                .map(|part| match part {
                    NeutralContentBlock::Text { text } => BedrockToolResultContent::Text(text.clone()),
                    NeutralContentBlock::ImageBase64 { source } => {
                        match convert_image(&source.media_type, &source.data) {
                            Ok(image) => BedrockToolResultContent::Image(image),
                            Err(placeholder) => BedrockToolResultContent::Text(placeholder),
                        }
                    }
                    NeutralContentBlock::ImageUrl { .. } => {
                        BedrockToolResultContent::Text(IMAGE_NOT_SUPPORTED.to_string())
                    }
                    other => BedrockToolResultContent::Text(unsupported_placeholder(other.type_name())),
                })
                .collect();
            BedrockContentBlock::ToolResult(BedrockToolResult {
                tool_use_id: tool_use_id.clone(),
                content,
                status: Some(status.unwrap_or(ToolStatus::Success)),
            })
        }
        other => BedrockContentBlock::Text(unsupported_placeholder(other.type_name())),
    }
}

/// Convert a history to Converse messages. System messages are skipped; they travel in
/// the request's `system` list.
pub fn to_bedrock(history: &[NeutralMessage]) -> Vec<BedrockMessage> {
    history
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| BedrockMessage {
            role: match message.role {
                Role::Assistant => BedrockRole::Assistant,
                _ => BedrockRole::User,
            },
            content: message.content.blocks().iter().map(convert_block).collect(),
        })
        .collect()
}

pub fn system_blocks(system: &str) -> Vec<Value> {
    if system.is_empty() {
        Vec::new()
    } else {
        vec![json!({"text": system})]
    }
}

lazy_static! {
    static ref OPEN_TAG: Regex = Regex::new(r"<([A-Za-z0-9_\-]+)>").unwrap();
}

/// Parse an XML parameter envelope such as `<read_file><path>a.rs</path></read_file>`.
/// Tags matching `tool_name` are treated as the wrapper and skipped.
pub fn parse_xml_params(xml: &str, tool_name: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let mut cursor = 0;
    while let Some(caps) = OPEN_TAG.captures(&xml[cursor..]) {
        let (whole, tag) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(tag)) => (whole, tag.as_str()),
            _ => break,
        };
        let body_start = cursor + whole.end();
        if tag == tool_name {
            cursor = body_start;
            continue;
        }
        let closing = format!("</{}>", tag);
        match xml[body_start..].find(&closing) {
            Some(offset) => {
                let value = xml[body_start..body_start + offset].trim();
                params.insert(tag.to_string(), json!(value));
                cursor = body_start + offset + closing.len();
            }
            None => cursor = body_start,
        }
    }
    params
}

fn tool_input(tool_use: &BedrockToolUse) -> Value {
    match &tool_use.input {
        Value::String(xml) => Value::Object(parse_xml_params(xml, &tool_use.name)),
        other => other.clone(),
    }
}

fn from_image(image: &BedrockImage) -> NeutralContentBlock {
    NeutralContentBlock::image_base64(image.format.media_type(), STANDARD.encode(&image.source.bytes))
}

fn from_block(block: &BedrockContentBlock) -> NeutralContentBlock {
    match block {
        BedrockContentBlock::Text(text) => NeutralContentBlock::text(text),
        BedrockContentBlock::Image(image) => from_image(image),
        BedrockContentBlock::ToolUse(tool_use) => NeutralContentBlock::tool_use(
            &tool_use.tool_use_id,
            &tool_use.name,
            tool_input(tool_use),
        ),
        BedrockContentBlock::ToolResult(result) => {
            let parts: Vec<NeutralContentBlock> = result
                .content
                .iter()
                .map(|part| match part {
                    BedrockToolResultContent::Text(text) => NeutralContentBlock::text(text),
                    BedrockToolResultContent::Json(value) => NeutralContentBlock::text(value.to_string()),
                    BedrockToolResultContent::Image(image) => from_image(image),
                })
                .collect();
            NeutralContentBlock::ToolResult {
                tool_use_id: result.tool_use_id.clone(),
                content: ToolResultContent::Blocks(parts),
                status: result.status,
                error: None,
            }
        }
    }
}

pub fn from_bedrock(messages: &[BedrockMessage]) -> NeutralConversationHistory {
    messages
        .iter()
        .map(|message| NeutralMessage {
            role: match message.role {
                BedrockRole::Assistant => Role::Assistant,
                BedrockRole::User => Role::User,
            },
            content: NeutralMessageContent::Blocks(message.content.iter().map(from_block).collect()),
            ts: None,
            metadata: None,
        })
        .collect()
}
