//! Normalizer for Bedrock Converse stream events.
//!
//! Events arrive already decoded from the event-stream framing, one object per event
//! keyed by its kind (`contentBlockStart`, `contentBlockDelta`, `metadata`, ...).
use serde_json::Value;
use std::collections::BTreeMap;

use super::{optional_token_field, token_field, ApiStreamChunk, StreamNormalizer, Usage};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::bedrock::parse_xml_params;
use crate::formats::openai::parse_arguments;

const EXCEPTIONS: &[&str] = &[
    "internalServerException",
    "modelStreamErrorException",
    "serviceUnavailableException",
    "throttlingException",
    "validationException",
];

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input: String,
}

impl PendingToolUse {
    fn into_chunk(self) -> ApiStreamChunk {
        // some models answer with the XML parameter envelope instead of JSON
        let input = if self.input.trim_start().starts_with('<') {
            Value::Object(parse_xml_params(&self.input, &self.name))
        } else {
            parse_arguments(&self.input)
        };
        ApiStreamChunk::tool_use(self.id, self.name, input)
    }
}

#[derive(Default)]
pub struct BedrockNormalizer {
    tools: BTreeMap<u64, PendingToolUse>,
}

impl BedrockNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamNormalizer for BedrockNormalizer {
    fn vendor(&self) -> &str {
        "Bedrock"
    }

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>> {
        for exception in EXCEPTIONS {
            if let Some(error) = event.get(*exception) {
                let message = error["message"].as_str().unwrap_or(*exception);
                return Err(ProviderError::stream("Bedrock", message));
            }
        }

        let mut chunks = Vec::new();
        if let Some(start) = event.get("contentBlockStart") {
            let index = start["contentBlockIndex"].as_u64().unwrap_or(0);
            if let Some(tool_use) = start["start"].get("toolUse") {
                self.tools.insert(
                    index,
                    PendingToolUse {
                        id: tool_use["toolUseId"].as_str().unwrap_or_default().to_string(),
                        name: tool_use["name"].as_str().unwrap_or_default().to_string(),
                        input: String::new(),
                    },
                );
            }
        } else if let Some(block) = event.get("contentBlockDelta") {
            let index = block["contentBlockIndex"].as_u64().unwrap_or(0);
            let delta = &block["delta"];
            if let Some(text) = delta["text"].as_str() {
                chunks.push(ApiStreamChunk::text(text));
            } else if let Some(text) = delta["reasoningContent"]["text"].as_str() {
                chunks.push(ApiStreamChunk::reasoning(text));
            } else if let Some(input) = delta["toolUse"]["input"].as_str() {
                if let Some(tool) = self.tools.get_mut(&index) {
                    tool.input.push_str(input);
                }
            }
        } else if let Some(stop) = event.get("contentBlockStop") {
            let index = stop["contentBlockIndex"].as_u64().unwrap_or(0);
            if let Some(tool) = self.tools.remove(&index) {
                chunks.push(tool.into_chunk());
            }
        } else if let Some(metadata) = event.get("metadata") {
            if let Some(usage) = metadata.get("usage") {
                chunks.push(ApiStreamChunk::usage(
                    Usage::new(
                        token_field(usage, "inputTokens"),
                        token_field(usage, "outputTokens"),
                    )
                    .with_cache_read(optional_token_field(usage, "cacheReadInputTokens"))
                    .with_cache_write(optional_token_field(usage, "cacheWriteInputTokens")),
                ));
            }
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        std::mem::take(&mut self.tools)
            .into_values()
            .map(PendingToolUse::into_chunk)
            .collect()
    }
}
