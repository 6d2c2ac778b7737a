//! Normalizer for Anthropic Messages streams, also used for Claude on Vertex AI.
use serde_json::Value;
use std::collections::BTreeMap;

use super::{optional_token_field, token_field, ApiStreamChunk, StreamNormalizer, Usage};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::openai::parse_arguments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    Other,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

impl PendingToolUse {
    fn into_chunk(self) -> ApiStreamChunk {
        ApiStreamChunk::tool_use(self.id, self.name, parse_arguments(&self.json))
    }
}

pub struct AnthropicNormalizer {
    vendor: &'static str,
    blocks: BTreeMap<u64, BlockKind>,
    tools: BTreeMap<u64, PendingToolUse>,
}

impl AnthropicNormalizer {
    pub fn new(vendor: &'static str) -> Self {
        Self {
            vendor,
            blocks: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }

    fn seen(&self, kind: BlockKind) -> bool {
        self.blocks.values().any(|seen| *seen == kind)
    }

    fn start_block(&mut self, index: u64, block: &Value) -> Vec<ApiStreamChunk> {
        let mut chunks = Vec::new();
        let kind = match block["type"].as_str() {
            Some("text") => BlockKind::Text,
            Some("thinking") => BlockKind::Thinking,
            Some("tool_use") => BlockKind::ToolUse,
            other => {
                tracing::debug!("Ignoring Anthropic content block type {:?}", other);
                BlockKind::Other
            }
        };

        match kind {
            BlockKind::Text | BlockKind::Thinking => {
                let (field, make): (&str, fn(String) -> ApiStreamChunk) = match kind {
                    BlockKind::Text => ("text", ApiStreamChunk::text::<String>),
                    _ => ("thinking", ApiStreamChunk::reasoning::<String>),
                };
                if self.seen(kind) {
                    chunks.push(make("\n".to_string()));
                }
                match block[field].as_str() {
                    Some(initial) if !initial.is_empty() => chunks.push(make(initial.to_string())),
                    _ => {}
                }
            }
            BlockKind::ToolUse => {
                let json = match &block["input"] {
                    Value::Object(map) if !map.is_empty() => block["input"].to_string(),
                    _ => String::new(),
                };
                self.tools.insert(
                    index,
                    PendingToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        json,
                    },
                );
            }
            BlockKind::Other => {}
        }
        self.blocks.insert(index, kind);
        chunks
    }

    fn delta(&mut self, index: u64, delta: &Value) -> Vec<ApiStreamChunk> {
        match delta["type"].as_str() {
            Some("text_delta") => text_chunk(delta, "text", ApiStreamChunk::text::<String>),
            Some("thinking_delta") => text_chunk(delta, "thinking", ApiStreamChunk::reasoning::<String>),
            Some("input_json_delta") => {
                if let Some(tool) = self.tools.get_mut(&index) {
                    tool.json
                        .push_str(delta["partial_json"].as_str().unwrap_or_default());
                }
                Vec::new()
            }
            // signature_delta and future delta types carry nothing to show
            _ => match self.blocks.get(&index) {
                Some(BlockKind::Text) => text_chunk(delta, "text", ApiStreamChunk::text::<String>),
                _ => Vec::new(),
            },
        }
    }
}

fn text_chunk(delta: &Value, field: &str, make: fn(String) -> ApiStreamChunk) -> Vec<ApiStreamChunk> {
    match delta[field].as_str() {
        Some(text) => vec![make(text.to_string())],
        None => Vec::new(),
    }
}

impl StreamNormalizer for AnthropicNormalizer {
    fn vendor(&self) -> &str {
        self.vendor
    }

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>> {
        let index = event["index"].as_u64().unwrap_or(0);
        let chunks = match event["type"].as_str() {
            Some("message_start") => {
                let usage = &event["message"]["usage"];
                vec![ApiStreamChunk::usage(
                    Usage::new(
                        token_field(usage, "input_tokens"),
                        token_field(usage, "output_tokens"),
                    )
                    .with_cache_write(optional_token_field(usage, "cache_creation_input_tokens"))
                    .with_cache_read(optional_token_field(usage, "cache_read_input_tokens")),
                )]
            }
            Some("message_delta") => match event.get("usage") {
                Some(usage) => vec![ApiStreamChunk::usage(Usage::new(
                    0,
                    token_field(usage, "output_tokens"),
                ))],
                None => Vec::new(),
            },
            Some("content_block_start") => self.start_block(index, &event["content_block"]),
            Some("content_block_delta") => self.delta(index, &event["delta"]),
            Some("content_block_stop") => match self.tools.remove(&index) {
                Some(tool) => vec![tool.into_chunk()],
                None => Vec::new(),
            },
            Some("error") => {
                let error = &event["error"];
                let message = error["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(ProviderError::stream(self.vendor, message));
            }
            // ping, message_stop
            _ => Vec::new(),
        };
        Ok(chunks)
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        let pending = std::mem::take(&mut self.tools);
        if !pending.is_empty() {
            tracing::warn!(
                "{} stream ended with {} unfinished tool call(s)",
                self.vendor,
                pending.len()
            );
        }
        pending.into_values().map(PendingToolUse::into_chunk).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::normalize;
    use futures::{stream, StreamExt};
    use serde_json::json;

    fn run(events: Vec<Value>) -> Vec<ApiStreamChunk> {
        let mut normalizer = AnthropicNormalizer::new("Anthropic");
        let mut chunks: Vec<ApiStreamChunk> = events
            .iter()
            .flat_map(|event| normalizer.process(event).unwrap())
            .collect();
        chunks.extend(normalizer.finish());
        chunks
    }

    #[test]
    fn test_text_stream_with_usage() {
        let chunks = run(vec![
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 5, "output_tokens": 0}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": "Hello"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
        ]);
        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::usage(Usage::new(5, 0)),
                ApiStreamChunk::text("Hello"),
                ApiStreamChunk::text(" world"),
            ]
        );
    }

    #[test]
    fn test_usage_at_start_and_end_both_forwarded() {
        let chunks = run(vec![
            json!({"type": "message_start", "message": {"usage": {
                "input_tokens": 10, "output_tokens": 1,
                "cache_creation_input_tokens": 7, "cache_read_input_tokens": 3
            }}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 42}}),
        ]);
        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::usage(
                    Usage::new(10, 1)
                        .with_cache_write(Some(7))
                        .with_cache_read(Some(3))
                ),
                ApiStreamChunk::usage(Usage::new(0, 42)),
            ]
        );
    }

    #[test]
    fn test_thinking_then_text_blocks() {
        let chunks = run(vec![
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "sig"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "one"}}),
            json!({"type": "content_block_start", "index": 2, "content_block": {"type": "text", "text": "two"}}),
        ]);
        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::reasoning("hmm"),
                ApiStreamChunk::text("one"),
                ApiStreamChunk::text("\n"),
                ApiStreamChunk::text("two"),
            ]
        );
    }

    #[test]
    fn test_tool_use_emitted_at_block_stop() {
        let mut normalizer = AnthropicNormalizer::new("Anthropic");
        let start = json!({"type": "content_block_start", "index": 1, "content_block": {
            "type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {}
        }});
        assert!(normalizer.process(&start).unwrap().is_empty());
        for piece in ["{\"path\":", " \"src/main.rs\"}"] {
            let delta = json!({"type": "content_block_delta", "index": 1, "delta": {
                "type": "input_json_delta", "partial_json": piece
            }});
            assert!(normalizer.process(&delta).unwrap().is_empty());
        }
        let stop = json!({"type": "content_block_stop", "index": 1});
        assert_eq!(
            normalizer.process(&stop).unwrap(),
            vec![ApiStreamChunk::tool_use(
                "toolu_1",
                "read_file",
                json!({"path": "src/main.rs"})
            )]
        );
        assert!(normalizer.finish().is_empty());
    }

    #[test]
    fn test_unfinished_tool_use_flushed_at_end() {
        let chunks = run(vec![
            json!({"type": "content_block_start", "index": 0, "content_block": {
                "type": "tool_use", "id": "toolu_2", "name": "list_files", "input": {}
            }}),
            json!({"type": "content_block_delta", "index": 0, "delta": {
                "type": "input_json_delta", "partial_json": "{\"path\": \".\"}"
            }}),
        ]);
        assert_eq!(
            chunks,
            vec![ApiStreamChunk::tool_use("toolu_2", "list_files", json!({"path": "."}))]
        );
    }

    #[tokio::test]
    async fn test_error_event_aborts_after_earlier_chunks() {
        let events = stream::iter(vec![
            Ok(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": "partial"}})),
            Ok(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})),
            Ok(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "never"}})),
        ]);
        let results: Vec<_> = normalize(events, AnthropicNormalizer::new("Vertex AI Claude"))
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &ApiStreamChunk::text("partial"));
        assert_eq!(
            results[1].as_ref().unwrap_err().to_string(),
            "Vertex AI Claude stream error: Overloaded"
        );
    }
}
