//! Streaming output normalization.
//!
//! Every vendor streams its own event shapes. A [`StreamNormalizer`] holds the per-call
//! accumulation state for one vendor and turns each raw event into zero or more
//! [`ApiStreamChunk`]s; [`normalize`] drives it over an event stream.
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::errors::ProviderResult;

pub mod anthropic;
pub mod bedrock;
pub mod chunk;
pub mod gemini;
pub mod openai;
pub mod sse;
pub mod think;
pub mod vscode_lm;

pub use chunk::{ApiStreamChunk, Usage};

/// A one-shot sequence of canonical chunks. Dropping it aborts the underlying transport.
pub type ApiStream = BoxStream<'static, ProviderResult<ApiStreamChunk>>;

/// Raw vendor events, already framed and parsed
pub type EventStream = BoxStream<'static, ProviderResult<Value>>;

pub trait StreamNormalizer: Send {
    /// Vendor name used in error messages
    fn vendor(&self) -> &str;

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>>;

    /// Called once after the last event; flushes anything still buffered.
    fn finish(&mut self) -> Vec<ApiStreamChunk>;
}

/// Run `normalizer` over `events`, yielding chunks in receipt order.
///
/// An error from either the event stream or the normalizer ends the stream; chunks
/// yielded before it stay valid.
pub fn normalize<S, N>(events: S, mut normalizer: N) -> ApiStream
where
    S: Stream<Item = ProviderResult<Value>> + Send + 'static,
    N: StreamNormalizer + 'static,
{
    let mut events = Box::pin(events);
    Box::pin(async_stream::try_stream! {
        while let Some(event) = events.next().await {
            let event = event?;
            for chunk in normalizer.process(&event)? {
                yield chunk;
            }
        }
        for chunk in normalizer.finish() {
            yield chunk;
        }
    })
}

/// Read a token count field, treating anything missing as zero
pub(crate) fn token_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

pub(crate) fn optional_token_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}
