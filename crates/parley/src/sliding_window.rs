//! Context window management by dropping the oldest exchanges.
//!
//! The first message (the task) is always kept. Messages are dropped in pairs so a
//! user/assistant exchange, and the tool_result that answers a tool_use, leave together.
use std::borrow::Cow;

use crate::models::content::{NeutralContentBlock, NeutralMessageContent};
use crate::models::message::NeutralMessage;
use crate::providers::base::Provider;
use crate::token_counter::IMAGE_URL_TOKENS;

/// Share of the context window kept free as a safety margin
pub const TOKEN_BUFFER_PERCENTAGE: f64 = 0.1;
/// Share of the context window reserved for the response when no max is configured
pub const DEFAULT_RESERVE_PERCENTAGE: f64 = 0.2;
pub const TRUNCATION_FRACTION: f64 = 0.5;

/// Estimate the tokens of one message's content with the provider's counter.
///
/// Base64 images are priced at `ceil(sqrt(len)) * 1.5` and URL images at a flat cost.
/// These image heuristics are local to truncation; [`crate::token_counter`] prices
/// images differently.
pub async fn estimate_token_count(content: &NeutralMessageContent, provider: &dyn Provider) -> usize {
    let blocks = content.blocks();
    let mut total = 0f64;
    for block in blocks.iter() {
        total += match block {
            NeutralContentBlock::Text { .. } => {
                provider.count_tokens(std::slice::from_ref(block)).await as f64
            }
            NeutralContentBlock::ImageBase64 { source } => {
                (source.data.len() as f64).sqrt().ceil() * 1.5
            }
            NeutralContentBlock::ImageUrl { .. } => IMAGE_URL_TOKENS as f64,
            other => {
                let json = serde_json::to_string(other).unwrap_or_default();
                provider
                    .count_tokens(&[NeutralContentBlock::text(json)])
                    .await as f64
            }
        };
    }
    total.ceil() as usize
}

/// Keep message 0 and drop the `floor((len - 1) * fraction)` oldest messages after it,
/// rounded down to an even count. `fraction` is clamped to `[0, 1]`.
pub fn truncate_conversation(history: &[NeutralMessage], fraction: f64) -> Vec<NeutralMessage> {
    let Some(first) = history.first() else {
        return Vec::new();
    };
    let raw = ((history.len() - 1) as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
    let remove = raw - raw % 2;

    let mut truncated = Vec::with_capacity(history.len() - remove);
    truncated.push(first.clone());
    truncated.extend_from_slice(&history[1 + remove..]);
    truncated
}

pub struct TruncateOptions<'a> {
    pub history: &'a [NeutralMessage],
    /// Tokens of every message except the last
    pub total_tokens: usize,
    pub context_window: u32,
    pub max_tokens: Option<u32>,
    pub provider: &'a dyn Provider,
}

/// Truncate only when the conversation plus the incoming last message would not fit.
///
/// Returns the input slice itself, borrowed, when no truncation is needed.
pub async fn truncate_conversation_if_needed<'a>(
    options: TruncateOptions<'a>,
) -> Cow<'a, [NeutralMessage]> {
    let TruncateOptions {
        history,
        total_tokens,
        context_window,
        max_tokens,
        provider,
    } = options;

    let Some(last) = history.last() else {
        return Cow::Borrowed(history);
    };

    let context_window = context_window as f64;
    let reserved = max_tokens
        .filter(|max| *max > 0)
        .map(f64::from)
        .unwrap_or(context_window * DEFAULT_RESERVE_PERCENTAGE);
    let last_tokens = estimate_token_count(&last.content, provider).await;
    let effective = (total_tokens + last_tokens) as f64;
    let allowed = context_window * (1.0 - TOKEN_BUFFER_PERCENTAGE) - reserved;

    if effective > allowed {
        tracing::debug!(
            "Truncating history: {} tokens exceed {} allowed",
            effective,
            allowed
        );
        Cow::Owned(truncate_conversation(history, TRUNCATION_FRACTION))
    } else {
        Cow::Borrowed(history)
    }
}
