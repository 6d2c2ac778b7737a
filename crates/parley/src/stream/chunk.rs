use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting reported by a vendor at some point of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_cache_write(mut self, tokens: Option<u64>) -> Self {
        self.cache_write_tokens = tokens;
        self
    }

    pub fn with_cache_read(mut self, tokens: Option<u64>) -> Self {
        self.cache_read_tokens = tokens;
        self
    }

    pub fn with_total_cost(mut self, cost: Option<f64>) -> Self {
        self.total_cost = cost;
        self
    }
}

/// One canonical streaming event, whatever vendor produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiStreamChunk {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    Usage(Usage),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        content: String,
    },
}

impl ApiStreamChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ApiStreamChunk::Text { text: text.into() }
    }

    pub fn reasoning<S: Into<String>>(text: S) -> Self {
        ApiStreamChunk::Reasoning { text: text.into() }
    }

    pub fn usage(usage: Usage) -> Self {
        ApiStreamChunk::Usage(usage)
    }

    pub fn tool_use<I: Into<String>, N: Into<String>>(id: I, name: N, input: Value) -> Self {
        ApiStreamChunk::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result<I: Into<String>, C: Into<String>>(id: I, content: C) -> Self {
        ApiStreamChunk::ToolResult {
            id: Some(id.into()),
            content: content.into(),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, ApiStreamChunk::ToolUse { .. })
    }
}
