use lazy_static::lazy_static;
use tiktoken_rs::CoreBPE;

use crate::models::content::NeutralContentBlock;

/// Every estimate is inflated by this factor so callers err on the side of truncating early
pub const TOKEN_FUDGE_FACTOR: f64 = 1.5;
/// Flat cost of an inline (base64) image
pub const IMAGE_TOKENS: usize = 258;
/// Flat cost of an image referenced by url
pub const IMAGE_URL_TOKENS: usize = 1000;

lazy_static! {
    // Built on first use and shared read-only afterwards.
    static ref ENCODER: Option<CoreBPE> = match tiktoken_rs::o200k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("Failed to load o200k_base encoder, using length estimate: {}", e);
            None
        }
    };
}

#[derive(Clone, Copy)]
pub struct TokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoder_loaded", &self.encoder.is_some())
            .finish()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        TokenCounter {
            encoder: ENCODER.as_ref(),
        }
    }

    /// Raw BPE token count of `text`
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.encoder {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len().div_ceil(4),
        }
    }

    /// Raw cost of one block, before the fudge factor
    pub fn count_block(&self, block: &NeutralContentBlock) -> usize {
        match block {
            NeutralContentBlock::Text { text } | NeutralContentBlock::Reasoning { text } => {
                self.count_text(text)
            }
            NeutralContentBlock::ImageBase64 { .. } => IMAGE_TOKENS,
            NeutralContentBlock::ImageUrl { .. } => IMAGE_URL_TOKENS,
            other => match serde_json::to_string(other) {
                Ok(serialized) => self.count_text(&serialized),
                Err(e) => {
                    tracing::warn!("Failed to serialize {} block for counting: {}", other.type_name(), e);
                    0
                }
            },
        }
    }

    /// Estimated tokens for a run of content, scaled by `TOKEN_FUDGE_FACTOR` and rounded up
    pub fn count_content(&self, content: &[NeutralContentBlock]) -> usize {
        let raw: usize = content.iter().map(|block| self.count_block(block)).sum();
        (raw as f64 * TOKEN_FUDGE_FACTOR).ceil() as usize
    }
}

/// Count `content` with the shared encoder
pub fn count_tokens(content: &[NeutralContentBlock]) -> usize {
    TokenCounter::new().count_content(content)
}
