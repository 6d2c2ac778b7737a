//! Normalizer for Gemini `streamGenerateContent` responses, direct or through Vertex AI.
use serde_json::{json, Value};

use super::{optional_token_field, token_field, ApiStreamChunk, StreamNormalizer, Usage};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::gemini::CallIds;

pub struct GeminiNormalizer {
    vendor: &'static str,
    ids: CallIds,
}

impl GeminiNormalizer {
    pub fn new(vendor: &'static str) -> Self {
        Self {
            vendor,
            ids: CallIds::default(),
        }
    }

    fn part(&mut self, part: &Value) -> Option<ApiStreamChunk> {
        if let Some(text) = part["text"].as_str() {
            if part["thought"].as_bool().unwrap_or(false) {
                return Some(ApiStreamChunk::reasoning(text));
            }
            return Some(ApiStreamChunk::text(text));
        }
        if let Some(call) = part.get("functionCall") {
            let name = call["name"].as_str().unwrap_or_default();
            let input = call.get("args").cloned().unwrap_or_else(|| json!({}));
            return Some(ApiStreamChunk::tool_use(self.ids.mint(name), name, input));
        }
        tracing::debug!("Ignoring Gemini stream part: {}", part);
        None
    }
}

impl StreamNormalizer for GeminiNormalizer {
    fn vendor(&self) -> &str {
        self.vendor
    }

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>> {
        if let Some(error) = event.get("error") {
            let message = error["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ProviderError::stream(self.vendor, message));
        }

        let mut chunks = Vec::new();
        let candidates = event["candidates"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        if let Some(candidate) = candidates.first() {
            let parts = candidate["content"]["parts"]
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            for part in parts {
                chunks.extend(self.part(part));
            }
        }

        if let Some(usage) = event.get("usageMetadata") {
            chunks.push(ApiStreamChunk::usage(
                Usage::new(
                    token_field(usage, "promptTokenCount"),
                    token_field(usage, "candidatesTokenCount"),
                )
                .with_cache_read(optional_token_field(usage, "cachedContentTokenCount")),
            ));
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        Vec::new()
    }
}
