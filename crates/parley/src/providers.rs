//! Provider handlers: one uniform façade over every supported vendor.
//!
//! Each handler composes a format converter, a stream normalizer, a transport and the
//! token counter behind [`base::Provider`], and forwards tool calls to the injected
//! [`crate::tool_router::ToolRouter`].
pub mod anthropic;
pub mod base;
pub mod bedrock;
pub mod configs;
pub mod dispatch;
pub mod factory;
pub mod gemini;
pub mod mistral;
pub mod mock;
pub mod openai;
pub mod utils;
pub mod vertex;
pub mod vscode_lm;
