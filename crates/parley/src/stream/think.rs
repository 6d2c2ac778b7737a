//! Splits `<think>...</think>` sections out of streamed text.
//!
//! Reasoning models served through OpenAI-compatible endpoints often inline their chain
//! of thought in the content. Tags may be split across deltas, so a possible partial tag
//! at the end of the buffer is held back until the next push.
use super::ApiStreamChunk;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
    buffer: String,
    inside: bool,
}

impl ThinkTagSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn chunk(&self, text: &str) -> ApiStreamChunk {
        if self.inside {
            ApiStreamChunk::reasoning(text)
        } else {
            ApiStreamChunk::text(text)
        }
    }

    pub fn push(&mut self, text: &str) -> Vec<ApiStreamChunk> {
        self.buffer.push_str(text);
        let mut chunks = Vec::new();
        loop {
            let tag = if self.inside { CLOSE_TAG } else { OPEN_TAG };
            if let Some(pos) = self.buffer.find(tag) {
                if pos > 0 {
                    chunks.push(self.chunk(&self.buffer[..pos]));
                }
                self.buffer.drain(..pos + tag.len());
                self.inside = !self.inside;
                continue;
            }

            let held = partial_tag_len(&self.buffer, tag);
            let ready = self.buffer.len() - held;
            if ready > 0 {
                chunks.push(self.chunk(&self.buffer[..ready]));
                self.buffer.drain(..ready);
            }
            return chunks;
        }
    }

    /// Emit whatever is held back, in the current mode
    pub fn finish(&mut self) -> Vec<ApiStreamChunk> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let chunk = self.chunk(&self.buffer);
        self.buffer.clear();
        vec![chunk]
    }
}

/// Length of the longest proper prefix of `tag` that `buffer` ends with
fn partial_tag_len(buffer: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| buffer.ends_with(&tag[..n]))
        .unwrap_or(0)
}
