//! These models represent the provider-neutral conversation passed through the crate
//!
//! Every vendor has its own wire format for messages, images, tool calls and tool results:
//! - anthropic (and claude on vertex) content blocks
//! - openai chat completions, shared by most compatible hosts
//! - gemini contents/parts
//! - mistral chat messages
//! - bedrock converse messages
//! - the IDE-hosted language model API
//!
//! Histories are kept in the neutral shape and only converted at the edge, inside
//! `formats`. The neutral types serialize to the same `type`-tagged json the
//! orchestrator produces, so they can be loaded straight from its payloads.
pub mod content;
pub mod message;
pub mod model_info;
pub mod role;
pub mod tool;
