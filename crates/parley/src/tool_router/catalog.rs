//! Descriptors for the tools a coding assistant offers the model.
//!
//! Only the schemas live here. Execution belongs to the router, so every handler in
//! this catalog fails with [`ToolError::ExecutionDelegated`] when invoked directly.
use serde_json::{json, Value};

use super::{ToolDescriptor, ToolRouter};
use crate::errors::ToolError;

fn delegated(name: &'static str, description: &'static str, param_schema: Value) -> ToolDescriptor {
    ToolDescriptor::new(name, description, param_schema, move |_input| async move {
        Err(ToolError::ExecutionDelegated(name.to_string()))
    })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn catalog() -> Vec<ToolDescriptor> {
    vec![
        delegated(
            "read_file",
            "Read the contents of a file, optionally limited to a line range.",
            object_schema(
                json!({
                    "path": {"type": "string", "description": "Path relative to the workspace"},
                    "start_line": {"type": "integer"},
                    "end_line": {"type": "integer"}
                }),
                &["path"],
            ),
        ),
        delegated(
            "write_to_file",
            "Write complete content to a file, creating it and its directories if needed.",
            object_schema(
                json!({
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "line_count": {"type": "integer"}
                }),
                &["path", "content"],
            ),
        ),
        delegated(
            "list_files",
            "List files and directories under a path.",
            object_schema(
                json!({
                    "path": {"type": "string"},
                    "recursive": {"type": "boolean"}
                }),
                &["path"],
            ),
        ),
        delegated(
            "search_files",
            "Search files under a path with a regular expression.",
            object_schema(
                json!({
                    "path": {"type": "string"},
                    "regex": {"type": "string"},
                    "file_pattern": {"type": "string", "description": "Glob filter such as *.rs"}
                }),
                &["path", "regex"],
            ),
        ),
        delegated(
            "execute_command",
            "Run a shell command in the workspace.",
            object_schema(
                json!({
                    "command": {"type": "string"},
                    "cwd": {"type": "string"}
                }),
                &["command"],
            ),
        ),
        delegated(
            "ask_followup_question",
            "Ask the user a question when information is missing.",
            object_schema(
                json!({
                    "question": {"type": "string"},
                    "follow_up": {"type": "array", "items": {"type": "string"}}
                }),
                &["question"],
            ),
        ),
        delegated(
            "attempt_completion",
            "Present the result of the task to the user.",
            object_schema(
                json!({
                    "result": {"type": "string"},
                    "command": {"type": "string"}
                }),
                &["result"],
            ),
        ),
    ]
}

/// Register the catalog descriptors `router` does not already have a tool for.
/// Handlers registered by the embedder are never replaced.
pub fn register_catalog(router: &dyn ToolRouter) {
    for descriptor in catalog() {
        if router.has_tool(&descriptor.name) {
            tracing::debug!("Keeping registered handler for {}", descriptor.name);
            continue;
        }
        router.register_tool(descriptor);
    }
}
