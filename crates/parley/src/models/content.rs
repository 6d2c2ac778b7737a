use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrlSource {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBase64Source {
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The payload of a tool result: either plain text or a list of text/image blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<NeutralContentBlock>),
}

impl ToolResultContent {
    pub fn blocks(&self) -> Cow<'_, [NeutralContentBlock]> {
        match self {
            ToolResultContent::Text(text) => Cow::Owned(vec![NeutralContentBlock::text(text)]),
            ToolResultContent::Blocks(blocks) => Cow::Borrowed(blocks),
        }
    }

    /// Join every text part with `separator`, skipping non-text parts
    pub fn joined_text(&self, separator: &str) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join(separator),
        }
    }
}

impl From<String> for ToolResultContent {
    fn from(text: String) -> Self {
        ToolResultContent::Text(text)
    }
}

impl From<&str> for ToolResultContent {
    fn from(text: &str) -> Self {
        ToolResultContent::Text(text.to_string())
    }
}

impl From<Vec<NeutralContentBlock>> for ToolResultContent {
    fn from(blocks: Vec<NeutralContentBlock>) -> Self {
        ToolResultContent::Blocks(blocks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One typed unit of message content
pub enum NeutralContentBlock {
    Text {
        text: String,
    },
    ImageUrl {
        source: ImageUrlSource,
    },
    ImageBase64 {
        source: ImageBase64Source,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ToolResultError>,
    },
    Reasoning {
        text: String,
    },
    /// Any block type this crate does not know. Converters degrade it to a placeholder.
    #[serde(other)]
    Unknown,
}

impl NeutralContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        NeutralContentBlock::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        NeutralContentBlock::ImageUrl {
            source: ImageUrlSource { url: url.into() },
        }
    }

    pub fn image_base64<S: Into<String>, T: Into<String>>(media_type: S, data: T) -> Self {
        NeutralContentBlock::ImageBase64 {
            source: ImageBase64Source {
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }

    pub fn tool_use<S: Into<String>, N: Into<String>>(id: S, name: N, input: Value) -> Self {
        NeutralContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result<S: Into<String>, C: Into<ToolResultContent>>(
        tool_use_id: S,
        content: C,
    ) -> Self {
        NeutralContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            status: None,
            error: None,
        }
    }

    pub fn tool_error<S: Into<String>, M: Into<String>>(tool_use_id: S, message: M) -> Self {
        let message = message.into();
        NeutralContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::Text(message.clone()),
            status: Some(ToolStatus::Error),
            error: Some(ToolResultError {
                message,
                details: None,
            }),
        }
    }

    pub fn reasoning<S: Into<String>>(text: S) -> Self {
        NeutralContentBlock::Reasoning { text: text.into() }
    }

    /// The wire name of the block's `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            NeutralContentBlock::Text { .. } => "text",
            NeutralContentBlock::ImageUrl { .. } => "image_url",
            NeutralContentBlock::ImageBase64 { .. } => "image_base64",
            NeutralContentBlock::ToolUse { .. } => "tool_use",
            NeutralContentBlock::ToolResult { .. } => "tool_result",
            NeutralContentBlock::Reasoning { .. } => "reasoning",
            NeutralContentBlock::Unknown => "unknown",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NeutralContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            NeutralContentBlock::ImageUrl { .. } | NeutralContentBlock::ImageBase64 { .. }
        )
    }
}

/// Message content: a bare string or an ordered list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NeutralMessageContent {
    Text(String),
    Blocks(Vec<NeutralContentBlock>),
}

impl NeutralMessageContent {
    /// View the content as blocks. A bare string becomes a single text block.
    pub fn blocks(&self) -> Cow<'_, [NeutralContentBlock]> {
        match self {
            NeutralMessageContent::Text(text) => {
                Cow::Owned(vec![NeutralContentBlock::text(text.as_str())])
            }
            NeutralMessageContent::Blocks(blocks) => Cow::Borrowed(blocks),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NeutralMessageContent::Text(text) => text.is_empty(),
            NeutralMessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl Default for NeutralMessageContent {
    fn default() -> Self {
        NeutralMessageContent::Blocks(Vec::new())
    }
}

impl From<String> for NeutralMessageContent {
    fn from(text: String) -> Self {
        NeutralMessageContent::Text(text)
    }
}

impl From<&str> for NeutralMessageContent {
    fn from(text: &str) -> Self {
        NeutralMessageContent::Text(text.to_string())
    }
}

impl From<Vec<NeutralContentBlock>> for NeutralMessageContent {
    fn from(blocks: Vec<NeutralContentBlock>) -> Self {
        NeutralMessageContent::Blocks(blocks)
    }
}
