use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{parse_request, ToolDescriptor, ToolOutput, ToolRouter, ToolUseRequest};
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{Tool, ToolCall};

/// Registered tools by name. Registering a name again replaces the earlier descriptor.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ToolDescriptor>> {
        self.tools.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ToolDescriptor>> {
        self.tools.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, descriptor: ToolDescriptor) -> Option<ToolDescriptor> {
        let replaced = self.write().insert(descriptor.name.clone(), descriptor);
        if let Some(previous) = &replaced {
            tracing::debug!("Replaced tool registration for {}", previous.name);
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.read().get(name).cloned()
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.read().values().map(ToolDescriptor::tool).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// In-process router that executes registered handlers directly
#[derive(Debug, Default)]
pub struct LocalToolRouter {
    registry: ToolRegistry,
    initialized: AtomicBool,
}

impl LocalToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    async fn dispatch(&self, call: ToolCall) -> ToolResult<ToolOutput> {
        let descriptor = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;
        if !call.input.is_object() {
            return Err(ToolError::InvalidParameters(format!(
                "{} expects an object, got {}",
                call.name, call.input
            )));
        }
        tracing::debug!("Dispatching tool {} ({})", call.name, call.id);
        descriptor.call(call.input).await
    }
}

#[async_trait]
impl ToolRouter for LocalToolRouter {
    async fn initialize(&self) -> ToolResult<()> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Tool router ready with {} tools", self.registry.len());
        }
        Ok(())
    }

    fn register_tool(&self, descriptor: ToolDescriptor) {
        self.registry.register(descriptor);
    }

    fn has_tool(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }

    async fn route_tool_use(&self, request: ToolUseRequest) -> ToolResult<ToolOutput> {
        self.initialize().await?;

        let mut calls = parse_request(&request);
        if calls.is_empty() {
            let shown = match &request {
                ToolUseRequest::Text(text) => text.chars().take(80).collect(),
                ToolUseRequest::Structured(call) => call.name.clone(),
            };
            return Err(ToolError::UnrecognizedFormat(shown));
        }
        if calls.len() == 1 {
            return self.dispatch(calls.remove(0)).await;
        }

        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = self.dispatch(call).await?;
            outputs.push(Value::String(output.into_content()));
        }
        Ok(ToolOutput::Json(Value::Array(outputs)))
    }
}
