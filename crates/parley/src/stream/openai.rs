//! Normalizer for OpenAI-compatible chat completion streams.
//!
//! Used for OpenAI itself and for the endpoints that copy its wire format (OpenRouter,
//! DeepSeek, Ollama, LM Studio, Mistral).
use serde_json::{json, Value};
use std::collections::HashMap;

use super::think::ThinkTagSplitter;
use super::{optional_token_field, token_field, ApiStreamChunk, StreamNormalizer, Usage};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::openai::parse_arguments;

/// Upper bound on buffered arguments for a single call
pub const MAX_ARGUMENT_BYTES: usize = 256 * 1024;

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
    emitted: bool,
}

impl PendingCall {
    fn chunk(&self, input: Value) -> ApiStreamChunk {
        ApiStreamChunk::tool_use(self.id.clone(), self.name.clone(), input)
    }
}

/// Buffers incremental `tool_calls` fragments until each call's arguments form a
/// complete JSON object.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    calls: Vec<PendingCall>,
    by_index: HashMap<u64, usize>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, fragment: &Value) -> usize {
        let index = fragment["index"].as_u64().unwrap_or(0);
        let id = fragment["id"].as_str().filter(|id| !id.is_empty());

        if let Some(id) = id {
            if let Some(slot) = self.calls.iter().position(|call| call.id == id) {
                self.by_index.insert(index, slot);
                return slot;
            }
        } else if let Some(slot) = self.by_index.get(&index) {
            return *slot;
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        self.calls.push(PendingCall {
            id,
            name: String::new(),
            arguments: String::new(),
            emitted: false,
        });
        let slot = self.calls.len() - 1;
        self.by_index.insert(index, slot);
        slot
    }

    /// Absorb one `tool_calls[]` fragment, returning a `tool_use` chunk when the call
    /// it belongs to becomes complete.
    pub fn push(&mut self, fragment: &Value) -> Option<ApiStreamChunk> {
        let slot = self.slot(fragment);
        let call = &mut self.calls[slot];
        if call.emitted {
            tracing::debug!("Ignoring fragment for completed tool call {}", call.id);
            return None;
        }

        let function = &fragment["function"];
        if let Some(name) = function["name"].as_str() {
            call.name.push_str(name);
        }
        if let Some(arguments) = function["arguments"].as_str() {
            call.arguments.push_str(arguments);
        }
        if call.name.is_empty() {
            return None;
        }

        if call.arguments.len() > MAX_ARGUMENT_BYTES {
            tracing::warn!(
                "Tool call {} exceeded {} bytes of arguments",
                call.id,
                MAX_ARGUMENT_BYTES
            );
            let mut end = MAX_ARGUMENT_BYTES;
            while !call.arguments.is_char_boundary(end) {
                end -= 1;
            }
            call.emitted = true;
            return Some(call.chunk(json!({"raw": &call.arguments[..end]})));
        }

        match serde_json::from_str::<Value>(&call.arguments) {
            Ok(input @ Value::Object(_)) => {
                call.emitted = true;
                Some(call.chunk(input))
            }
            _ => None,
        }
    }

    /// Emit every call that never completed, best effort
    pub fn flush(&mut self) -> Vec<ApiStreamChunk> {
        self.calls
            .iter_mut()
            .filter(|call| !call.emitted && !call.name.is_empty())
            .map(|call| {
                call.emitted = true;
                call.chunk(parse_arguments(&call.arguments))
            })
            .collect()
    }
}

pub struct OpenAiNormalizer {
    vendor: &'static str,
    think: ThinkTagSplitter,
    tool_calls: ToolCallAggregator,
}

impl OpenAiNormalizer {
    pub fn new(vendor: &'static str) -> Self {
        Self {
            vendor,
            think: ThinkTagSplitter::new(),
            tool_calls: ToolCallAggregator::new(),
        }
    }
}

fn usage_chunk(usage: &Value) -> ApiStreamChunk {
    ApiStreamChunk::usage(
        Usage::new(
            token_field(usage, "prompt_tokens"),
            token_field(usage, "completion_tokens"),
        )
        .with_cache_read(optional_token_field(
            &usage["prompt_tokens_details"],
            "cached_tokens",
        ))
        .with_total_cost(usage.get("cost").and_then(Value::as_f64)),
    )
}

impl StreamNormalizer for OpenAiNormalizer {
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
        let choices = event["choices"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        for choice in choices {
            let delta = &choice["delta"];
            if let Some(content) = delta["content"].as_str() {
                chunks.extend(self.think.push(content));
            }
            for key in ["reasoning_content", "reasoning"] {
                match delta[key].as_str() {
                    Some(reasoning) if !reasoning.is_empty() => {
                        chunks.push(ApiStreamChunk::reasoning(reasoning))
                    }
                    _ => {}
                }
            }
            if let Some(fragments) = delta["tool_calls"].as_array() {
                chunks.extend(fragments.iter().filter_map(|f| self.tool_calls.push(f)));
            }
            if choice["finish_reason"].as_str() == Some("tool_calls") {
                chunks.extend(self.tool_calls.flush());
            }
        }

        match event.get("usage") {
            Some(usage) if usage.is_object() => chunks.push(usage_chunk(usage)),
            _ => {}
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        let mut chunks = self.think.finish();
        chunks.extend(self.tool_calls.flush());
        chunks
    }
}
