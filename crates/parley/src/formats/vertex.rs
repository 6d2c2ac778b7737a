//! Vertex AI hosts two families behind one endpoint scheme: Claude models speak the
//! Anthropic message format (base64 images only), Gemini models speak `contents`/`parts`.
use serde_json::Value;

use super::anthropic::{to_anthropic_with, ImageSources};
use super::gemini::to_gemini;
use crate::models::message::NeutralMessage;

/// `anthropic_version` value Vertex expects in Claude request bodies
pub const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFamily {
    Claude,
    Gemini,
}

impl VertexFamily {
    pub fn for_model(model_id: &str) -> Self {
        if model_id.starts_with("claude") {
            VertexFamily::Claude
        } else {
            VertexFamily::Gemini
        }
    }
}

pub fn to_vertex_claude(history: &[NeutralMessage]) -> Vec<Value> {
    to_anthropic_with(history.iter(), ImageSources::Base64Only)
}

pub fn to_vertex_gemini(history: &[NeutralMessage]) -> Vec<Value> {
    to_gemini(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::IMAGE_NOT_SUPPORTED;
    use serde_json::json;

    #[test]
    fn test_family_detection() {
        assert_eq!(
            VertexFamily::for_model("claude-3-7-sonnet@20250219"),
            VertexFamily::Claude
        );
        assert_eq!(
            VertexFamily::for_model("gemini-2.0-flash-001"),
            VertexFamily::Gemini
        );
    }

    #[test]
    fn test_claude_keeps_tool_blocks_and_drops_url_images() {
        let history = vec![
            NeutralMessage::assistant().with_tool_use("t1", "list_files", json!({"path": "."})),
            NeutralMessage::user()
                .with_image_url("https://example.com/a.png")
                .with_tool_result("t1", "a.txt"),
        ];
        let converted = to_vertex_claude(&history);
        assert_eq!(converted[0]["content"][0]["type"], "tool_use");
        assert_eq!(converted[1]["content"][0]["type"], "tool_result");
        assert_eq!(converted[1]["content"][1]["text"], IMAGE_NOT_SUPPORTED);
    }

    #[test]
    fn test_gemini_family_uses_model_role() {
        let history = vec![NeutralMessage::assistant().with_text("hi")];
        assert_eq!(to_vertex_gemini(&history)[0]["role"], "model");
    }
}
