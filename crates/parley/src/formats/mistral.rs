use serde_json::{json, Value};

use super::{parse_data_uri, to_data_uri, unsupported_placeholder, IMAGE_NOT_SUPPORTED};
use crate::models::content::{NeutralContentBlock, NeutralMessageContent};
use crate::models::message::{NeutralConversationHistory, NeutralMessage};
use crate::models::role::Role;

fn user_part(block: &NeutralContentBlock) -> Value {
    match block {
        NeutralContentBlock::Text { text } => json!({"type": "text", "text": text}),
        NeutralContentBlock::ImageBase64 { source } => json!({
            "type": "image_url",
            "image_url": to_data_uri(&source.media_type, &source.data)
        }),
        NeutralContentBlock::ImageUrl { source } => json!({
            "type": "image_url",
            "image_url": source.url
        }),
        other => json!({"type": "text", "text": unsupported_placeholder(other.type_name())}),
    }
}

fn joined(blocks: &[NeutralContentBlock], separator: &str) -> String {
    blocks
        .iter()
        .map(|block| match block {
            NeutralContentBlock::Text { text } => text.clone(),
            block if block.is_image() => IMAGE_NOT_SUPPORTED.to_string(),
            other => unsupported_placeholder(other.type_name()),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn to_mistral_message(message: &NeutralMessage) -> Value {
    let blocks = match &message.content {
        NeutralMessageContent::Text(text) => {
            let role = match message.role {
                Role::Tool => "user".to_string(),
                role => role.to_string(),
            };
            return json!({"role": role, "content": text});
        }
        NeutralMessageContent::Blocks(blocks) => blocks,
    };

    match message.role {
        Role::System => json!({"role": "system", "content": joined(blocks, "\n")}),
        Role::Assistant => json!({"role": "assistant", "content": joined(blocks, "\n")}),
        Role::User | Role::Tool => json!({
            "role": "user",
            "content": blocks.iter().map(user_part).collect::<Vec<_>>()
        }),
    }
}

/// Convert a history to Mistral chat messages. Tool blocks are not sent to Mistral and
/// degrade to placeholders.
pub fn to_mistral(history: &[NeutralMessage]) -> Vec<Value> {
    history.iter().map(to_mistral_message).collect()
}

fn from_mistral_part(part: &Value) -> NeutralContentBlock {
    match part["type"].as_str() {
        Some("text") => NeutralContentBlock::text(part["text"].as_str().unwrap_or_default()),
        Some("image_url") => {
            let image = part.get("image_url").or_else(|| part.get("imageUrl"));
            let url = match image {
                Some(Value::String(url)) => url.as_str(),
                Some(object) => object["url"].as_str().unwrap_or_default(),
                None => "",
            };
            match parse_data_uri(url) {
                Some((media_type, data)) => NeutralContentBlock::image_base64(media_type, data),
                None if !url.is_empty() => NeutralContentBlock::image_url(url),
                None => NeutralContentBlock::text("[Unsupported Mistral content type]"),
            }
        }
        _ => NeutralContentBlock::text("[Unsupported Mistral content type]"),
    }
}

pub fn from_mistral(messages: &[Value]) -> NeutralConversationHistory {
    messages
        .iter()
        .map(|message| {
            let role = match message["role"].as_str() {
                Some("system") => Role::System,
                Some("assistant") => Role::Assistant,
                Some("tool") => Role::Tool,
                _ => Role::User,
            };
            let content = match &message["content"] {
                Value::String(text) => vec![NeutralContentBlock::text(text)],
                Value::Array(parts) => parts.iter().map(from_mistral_part).collect(),
                _ => Vec::new(),
            };
            NeutralMessage {
                role,
                content: NeutralMessageContent::Blocks(content),
                ts: None,
                metadata: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_images_are_data_uris() {
        let message = NeutralMessage::user()
            .with_text("see")
            .with_image_base64("image/png", "AAAA");
        assert_eq!(
            to_mistral_message(&message),
            json!({"role": "user", "content": [
                {"type": "text", "text": "see"},
                {"type": "image_url", "image_url": "data:image/png;base64,AAAA"}
            ]})
        );
    }

    #[test]
    fn test_assistant_text_joined_with_newline() {
        let message = NeutralMessage::assistant()
            .with_text("one")
            .with_text("two")
            .with_tool_use("t1", "read_file", json!({}));
        assert_eq!(
            to_mistral_message(&message)["content"],
            "one\ntwo\n[Unsupported content type: tool_use]"
        );
    }

    #[test]
    fn test_round_trip() {
        let history = vec![
            NeutralMessage::system().with_text("be terse"),
            NeutralMessage::user()
                .with_text("describe")
                .with_image_base64("image/webp", "UklGR"),
            NeutralMessage::assistant().with_text("a cat"),
        ];
        let back = from_mistral(&to_mistral(&history));
        for (original, restored) in history.iter().zip(back.iter()) {
            assert_eq!(original.role, restored.role);
            assert_eq!(original.content, restored.content);
        }
    }

    #[test]
    fn test_from_mistral_accepts_sdk_shape() {
        let messages = vec![json!({"role": "user", "content": [
            {"type": "image_url", "imageUrl": {"url": "data:image/png;base64,QQ=="}}
        ]})];
        let back = from_mistral(&messages);
        assert_eq!(
            back[0].content,
            NeutralMessageContent::Blocks(vec![NeutralContentBlock::image_base64("image/png", "QQ==")])
        );
    }
}
