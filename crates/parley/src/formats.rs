//! Converters between the neutral conversation model and each vendor's wire format
//!
//! Every `to_*` function takes the history by reference and builds fresh vendor values;
//! the input is never modified. Blocks a vendor cannot represent are replaced by a text
//! placeholder, so conversion itself never fails.
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::message::NeutralMessage;
use crate::models::role::Role;

pub mod anthropic;
pub mod bedrock;
pub mod cache;
pub mod gemini;
pub mod mistral;
pub mod openai;
pub mod vertex;
pub mod vscode_lm;

pub const IMAGE_NOT_SUPPORTED: &str = "[Image content not supported in this format]";

pub fn unsupported_placeholder(block_type: &str) -> String {
    format!("[Unsupported content type: {}]", block_type)
}

lazy_static! {
    static ref DATA_URI: Regex = Regex::new(r"^data:([^;,]+);base64,(.+)$").unwrap();
}

pub fn to_data_uri(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

/// Split a `data:<media>;base64,<payload>` uri into its media type and payload
pub fn parse_data_uri(uri: &str) -> Option<(String, String)> {
    DATA_URI
        .captures(uri)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Lift system messages out of the history.
///
/// Vendors without a message-level system role take the joined text through a
/// dedicated field instead.
pub fn split_system(history: &[NeutralMessage]) -> (Option<String>, Vec<&NeutralMessage>) {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in history {
        if message.role == Role::System {
            system.push(message.text());
        } else {
            rest.push(message);
        }
    }
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

/// Join a caller-supplied system prompt with any system messages lifted from the history
pub fn combine_system(prompt: &str, lifted: Option<String>) -> String {
    match lifted {
        Some(lifted) if prompt.is_empty() => lifted,
        Some(lifted) => format!("{}\n\n{}", prompt, lifted),
        None => prompt.to_string(),
    }
}
