//! Capability projection
//!
//! Rewrites content so it only uses features the target model supports. Blocks the model
//! cannot accept are replaced by text placeholders, never dropped. Projecting already
//! projected content returns it unchanged.
use crate::models::content::{NeutralContentBlock, NeutralMessageContent, ToolResultContent};
use crate::models::message::NeutralMessage;

pub use crate::models::model_info::Capabilities;

pub const IMAGE_PLACEHOLDER: &str = "[Referenced image in conversation]";

/// Tool names that drive a computer-use session
pub const COMPUTER_USE_TOOLS: &[&str] = &["computer", "browser_action"];

pub fn computer_use_placeholder(name: &str) -> String {
    format!("[Computer use tool call omitted: {}]", name)
}

fn project_block(block: &NeutralContentBlock, caps: &Capabilities) -> NeutralContentBlock {
    match block {
        block if block.is_image() && !caps.supports_images => {
            NeutralContentBlock::text(IMAGE_PLACEHOLDER)
        }
        NeutralContentBlock::ToolUse { name, .. }
            if !caps.supports_computer_use && COMPUTER_USE_TOOLS.contains(&name.as_str()) =>
        {
            NeutralContentBlock::text(computer_use_placeholder(name))
        }
        NeutralContentBlock::ToolResult {
            tool_use_id,
            content: ToolResultContent::Blocks(blocks),
            status,
            error,
        } => NeutralContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: ToolResultContent::Blocks(project(blocks, caps)),
            status: *status,
            error: error.clone(),
        },
        other => other.clone(),
    }
}

/// Project a run of blocks onto `caps`
pub fn project(content: &[NeutralContentBlock], caps: &Capabilities) -> Vec<NeutralContentBlock> {
    content
        .iter()
        .map(|block| project_block(block, caps))
        .collect()
}

pub fn project_content(content: &NeutralMessageContent, caps: &Capabilities) -> NeutralMessageContent {
    match content {
        NeutralMessageContent::Text(text) => NeutralMessageContent::Text(text.clone()),
        NeutralMessageContent::Blocks(blocks) => NeutralMessageContent::Blocks(project(blocks, caps)),
    }
}

pub fn project_history(history: &[NeutralMessage], caps: &Capabilities) -> Vec<NeutralMessage> {
    history
        .iter()
        .map(|message| NeutralMessage {
            content: project_content(&message.content, caps),
            ..message.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_only() -> Capabilities {
        Capabilities::default()
    }

    #[test]
    fn test_image_becomes_placeholder() {
        let content = vec![NeutralContentBlock::image_base64("image/png", "iVBORw0KGgo=")];
        assert_eq!(
            project(&content, &text_only()),
            vec![NeutralContentBlock::text("[Referenced image in conversation]")]
        );
    }

    #[test]
    fn test_images_kept_when_supported() {
        let caps = Capabilities {
            supports_images: true,
            ..Default::default()
        };
        let content = vec![NeutralContentBlock::image_url("https://example.com/x.png")];
        assert_eq!(project(&content, &caps), content);
    }

    #[test]
    fn test_nested_tool_result_images() {
        let content = vec![NeutralContentBlock::tool_result(
            "t1",
            vec![
                NeutralContentBlock::text("screenshot:"),
                NeutralContentBlock::image_base64("image/png", "AAAA"),
            ],
        )];
        let projected = project(&content, &text_only());
        assert_eq!(
            projected,
            vec![NeutralContentBlock::tool_result(
                "t1",
                vec![
                    NeutralContentBlock::text("screenshot:"),
                    NeutralContentBlock::text(IMAGE_PLACEHOLDER),
                ],
            )]
        );
    }

    #[test]
    fn test_computer_use_omitted() {
        let content = vec![NeutralContentBlock::tool_use(
            "t1",
            "browser_action",
            json!({"action": "launch"}),
        )];
        assert_eq!(
            project(&content, &text_only()),
            vec![NeutralContentBlock::text(
                "[Computer use tool call omitted: browser_action]"
            )]
        );
    }

    #[test]
    fn test_projection_is_idempotent() {
        let content = vec![
            NeutralContentBlock::text("look"),
            NeutralContentBlock::image_base64("image/jpeg", "/9j/"),
            NeutralContentBlock::tool_use("t1", "computer", json!({})),
            NeutralContentBlock::tool_result(
                "t1",
                vec![NeutralContentBlock::image_url("https://example.com/s.png")],
            ),
            NeutralContentBlock::reasoning("hmm"),
        ];
        for caps in [
            text_only(),
            Capabilities {
                supports_images: true,
                supports_prompt_cache: true,
                supports_computer_use: false,
            },
        ] {
            let once = project(&content, &caps);
            assert_eq!(project(&once, &caps), once);
        }
    }

    #[test]
    fn test_project_history_keeps_metadata() {
        let history = vec![NeutralMessage::user()
            .with_image_url("https://example.com/a.png")
            .with_metadata("task", json!("t-1"))];
        let projected = project_history(&history, &text_only());
        assert_eq!(projected[0].metadata, history[0].metadata);
        assert_eq!(projected[0].text(), IMAGE_PLACEHOLDER);
    }
}
