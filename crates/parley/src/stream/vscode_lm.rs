//! Normalizer for response parts produced by an IDE-hosted language model.
use serde_json::{json, Value};

use super::{ApiStreamChunk, StreamNormalizer};
use crate::errors::{ProviderError, ProviderResult};

pub const VENDOR: &str = "VSCode LM";

#[derive(Debug, Default)]
pub struct VsCodeLmNormalizer;

fn call_input(input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({"raw": text}),
        },
        _ => json!({}),
    }
}

impl StreamNormalizer for VsCodeLmNormalizer {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>> {
        match event["type"].as_str() {
            Some("text") => Ok(event["value"]
                .as_str()
                .map(|value| vec![ApiStreamChunk::text(value)])
                .unwrap_or_default()),
            Some("tool_call") => {
                let name = event["name"].as_str().unwrap_or_default();
                let id = event["callId"].as_str().unwrap_or_default();
                if name.is_empty() || id.is_empty() {
                    return Err(ProviderError::stream(
                        VENDOR,
                        format!("Invalid tool call part: {}", event),
                    ));
                }
                Ok(vec![ApiStreamChunk::tool_use(id, name, call_input(&event["input"]))])
            }
            other => {
                tracing::warn!("Unknown {} response part type: {:?}", VENDOR, other);
                Ok(Vec::new())
            }
        }
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_tool_call_parts() {
        let mut normalizer = VsCodeLmNormalizer;
        assert_eq!(
            normalizer.process(&json!({"type": "text", "value": "hi"})).unwrap(),
            vec![ApiStreamChunk::text("hi")]
        );
        assert_eq!(
            normalizer
                .process(&json!({"type": "tool_call", "callId": "c1", "name": "read_file", "input": "{\"path\":\"x\"}"}))
                .unwrap(),
            vec![ApiStreamChunk::tool_use("c1", "read_file", json!({"path": "x"}))]
        );
    }

    #[test]
    fn test_tool_call_without_id_fails() {
        let mut normalizer = VsCodeLmNormalizer;
        assert!(normalizer
            .process(&json!({"type": "tool_call", "name": "read_file", "input": {}}))
            .is_err());
    }
}
