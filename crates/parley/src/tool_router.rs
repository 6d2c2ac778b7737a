//! The boundary to the component that executes tools.
//!
//! Providers never run tools themselves. Every materialized tool call is forwarded, as
//! is, to a [`ToolRouter`] injected at construction, and its output is streamed back as
//! a `tool_result` chunk.
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::errors::ToolResult;
use crate::models::tool::{Tool, ToolCall};

pub mod catalog;
pub mod formats;
pub mod registry;

pub use registry::{LocalToolRouter, ToolRegistry};

/// What a tool produced: plain text or a JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Text as is, anything else serialized to JSON
    pub fn into_content(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Json(value)
    }
}

pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ToolResult<ToolOutput>> + Send + Sync>;

/// A tool the router can dispatch to
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub param_schema: Value,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new<N, D, F, Fut>(name: N, description: D, param_schema: Value, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<ToolOutput>> + Send + 'static,
    {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            param_schema,
            handler: Arc::new(move |input| Box::pin(handler(input))),
        }
    }

    pub fn tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.param_schema.clone())
    }

    pub async fn call(&self, input: Value) -> ToolResult<ToolOutput> {
        (self.handler)(input).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("param_schema", &self.param_schema)
            .finish_non_exhaustive()
    }
}

/// A tool call as handed to the router
#[derive(Debug, Clone, PartialEq)]
pub enum ToolUseRequest {
    /// A call already materialized from a stream
    Structured(ToolCall),
    /// Model output that may carry calls in one of the textual encodings
    Text(String),
}

impl From<ToolCall> for ToolUseRequest {
    fn from(call: ToolCall) -> Self {
        ToolUseRequest::Structured(call)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolUseFormat {
    /// `<tool_name><param>value</param></tool_name>`
    Xml,
    /// `{"type":"tool_use", ...}` written into text
    Json,
    /// `tool_calls` or `function_call` objects
    OpenAi,
    /// A structured `tool_use` call
    Neutral,
}

/// Classify how a request encodes its tool call, if it carries one at all
pub fn detect_format(request: &ToolUseRequest) -> Option<ToolUseFormat> {
    let text = match request {
        ToolUseRequest::Structured(_) => return Some(ToolUseFormat::Neutral),
        ToolUseRequest::Text(text) => text.trim(),
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.get("tool_calls").is_some() || value.get("function_call").is_some() {
            return Some(ToolUseFormat::OpenAi);
        }
        if value["type"].as_str() == Some("tool_use") {
            return Some(ToolUseFormat::Neutral);
        }
    }
    if !formats::extract_xml_tool_calls(text).is_empty() {
        return Some(ToolUseFormat::Xml);
    }
    if !formats::extract_json_tool_calls(text).is_empty() {
        return Some(ToolUseFormat::Json);
    }
    None
}

/// Turn a request into the calls it carries
pub fn parse_request(request: &ToolUseRequest) -> Vec<ToolCall> {
    let text = match request {
        ToolUseRequest::Structured(call) => return vec![call.clone()],
        ToolUseRequest::Text(text) => text.trim(),
    };
    match detect_format(request) {
        Some(ToolUseFormat::OpenAi) => serde_json::from_str::<Value>(text)
            .map(|value| formats::parse_openai_tool_calls(&value))
            .unwrap_or_default(),
        Some(ToolUseFormat::Xml) => formats::extract_xml_tool_calls(text),
        Some(ToolUseFormat::Json) | Some(ToolUseFormat::Neutral) => {
            formats::extract_json_tool_calls(text)
        }
        None => Vec::new(),
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Prepare the router. Calling it again is a no-op.
    async fn initialize(&self) -> ToolResult<()>;

    fn register_tool(&self, descriptor: ToolDescriptor);

    fn has_tool(&self, name: &str) -> bool;

    /// Execute the call carried by `request` and return its output
    async fn route_tool_use(&self, request: ToolUseRequest) -> ToolResult<ToolOutput>;
}
