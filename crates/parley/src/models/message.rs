use super::content::{NeutralContentBlock, NeutralMessageContent, ToolResultContent};
use super::role::Role;
use crate::errors::HistoryError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM, in the neutral format
pub struct NeutralMessage {
    pub role: Role,
    pub content: NeutralMessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// An ordered conversation, oldest message first
pub type NeutralConversationHistory = Vec<NeutralMessage>;

impl NeutralMessage {
    pub fn new<C: Into<NeutralMessageContent>>(role: Role, content: C) -> Self {
        NeutralMessage {
            role,
            content: content.into(),
            ts: Some(Utc::now().timestamp_millis()),
            metadata: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User, NeutralMessageContent::default())
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant, NeutralMessageContent::default())
    }

    pub fn system() -> Self {
        Self::new(Role::System, NeutralMessageContent::default())
    }

    pub fn tool() -> Self {
        Self::new(Role::Tool, NeutralMessageContent::default())
    }

    /// Add any block to the message, promoting string content to a block list
    pub fn with_block(mut self, block: NeutralContentBlock) -> Self {
        if let NeutralMessageContent::Text(text) = &mut self.content {
            let existing = NeutralContentBlock::text(std::mem::take(text));
            self.content = NeutralMessageContent::Blocks(vec![existing]);
        }
        if let NeutralMessageContent::Blocks(blocks) = &mut self.content {
            blocks.push(block);
        }
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_block(NeutralContentBlock::text(text))
    }

    pub fn with_image_base64<S: Into<String>, T: Into<String>>(
        self,
        media_type: S,
        data: T,
    ) -> Self {
        self.with_block(NeutralContentBlock::image_base64(media_type, data))
    }

    pub fn with_image_url<S: Into<String>>(self, url: S) -> Self {
        self.with_block(NeutralContentBlock::image_url(url))
    }

    pub fn with_tool_use<S: Into<String>, N: Into<String>>(
        self,
        id: S,
        name: N,
        input: Value,
    ) -> Self {
        self.with_block(NeutralContentBlock::tool_use(id, name, input))
    }

    pub fn with_tool_result<S: Into<String>, C: Into<ToolResultContent>>(
        self,
        tool_use_id: S,
        content: C,
    ) -> Self {
        self.with_block(NeutralContentBlock::tool_result(tool_use_id, content))
    }

    pub fn with_reasoning<S: Into<String>>(self, text: S) -> Self {
        self.with_block(NeutralContentBlock::reasoning(text))
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    /// Concatenate the text blocks of this message
    pub fn text(&self) -> String {
        match &self.content {
            NeutralMessageContent::Text(text) => text.clone(),
            NeutralMessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .blocks()
            .iter()
            .any(|block| matches!(block, NeutralContentBlock::ToolUse { .. }))
    }
}

/// Check that every tool_result refers to a tool_use that appeared earlier
pub fn validate_history(history: &[NeutralMessage]) -> Result<(), HistoryError> {
    let mut seen = HashSet::new();
    for (message_index, message) in history.iter().enumerate() {
        for block in message.content.blocks().iter() {
            match block {
                NeutralContentBlock::ToolUse { id, .. } => {
                    seen.insert(id.clone());
                }
                NeutralContentBlock::ToolResult { tool_use_id, .. } => {
                    if !seen.contains(tool_use_id) {
                        return Err(HistoryError::OrphanToolResult {
                            message_index,
                            tool_use_id: tool_use_id.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_builders() {
        let message = NeutralMessage::assistant()
            .with_text("Let me check")
            .with_tool_use("toolu_1", "read_file", json!({"path": "a.txt"}));

        assert_eq!(message.role, Role::Assistant);
        assert!(message.ts.is_some());
        assert!(message.has_tool_use());
        assert_eq!(message.text(), "Let me check");
    }

    #[test]
    fn test_with_block_promotes_string_content() {
        let message = NeutralMessage::new(Role::User, "first").with_text("second");
        assert_eq!(
            message.content,
            NeutralMessageContent::Blocks(vec![
                NeutralContentBlock::text("first"),
                NeutralContentBlock::text("second"),
            ])
        );
    }

    #[test]
    fn test_deserialize_orchestrator_payload() {
        let message: NeutralMessage = serde_json::from_value(json!({
            "role": "user",
            "content": "plain text",
            "ts": 1700000000000i64,
            "metadata": {"source": "webview"}
        }))
        .unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "plain text");
        assert_eq!(message.metadata.unwrap()["source"], "webview");
    }

    #[test]
    fn test_validate_history() {
        let ok = vec![
            NeutralMessage::assistant().with_tool_use("t1", "list_files", json!({})),
            NeutralMessage::user().with_tool_result("t1", "a.txt"),
        ];
        assert!(validate_history(&ok).is_ok());

        let orphan = vec![
            NeutralMessage::user().with_text("hi"),
            NeutralMessage::user().with_tool_result("missing", "x"),
        ];
        assert_eq!(
            validate_history(&orphan),
            Err(HistoryError::OrphanToolResult {
                message_index: 1,
                tool_use_id: "missing".to_string()
            })
        );
    }
}
