//! Line framing for vendor response bodies.
//!
//! Handles both SSE (`data: {...}` lines ended by `data: [DONE]`) and newline-delimited
//! JSON event objects.
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;

use super::EventStream;
use crate::errors::ProviderError;

#[derive(Debug, PartialEq)]
enum Line {
    Event(Value),
    Done,
    Skip,
}

fn parse_line(line: &str, vendor: &str) -> Line {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }
    let payload = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None if line.starts_with('{') => line,
        // event:, id:, retry:
        None => return Line::Skip,
    };
    if payload == "[DONE]" {
        return Line::Done;
    }
    match serde_json::from_str(payload) {
        Ok(value) => Line::Event(value),
        Err(e) => {
            tracing::warn!("Skipping malformed {} stream line: {} ({})", vendor, payload, e);
            Line::Skip
        }
    }
}

/// Frame `reader` into JSON events. Ends at `[DONE]` or end of input.
pub fn json_events<R>(reader: R, vendor: &'static str) -> EventStream
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    let mut lines = LinesStream::new(reader.lines());
    Box::pin(async_stream::try_stream! {
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| ProviderError::stream(vendor, e.to_string()))?;
            match parse_line(&line, vendor) {
                Line::Event(value) => yield value,
                Line::Done => break,
                Line::Skip => continue,
            }
        }
    })
}

/// Frame a streaming HTTP response body into JSON events.
pub fn response_events(response: reqwest::Response, vendor: &'static str) -> EventStream {
    let body = response
        .bytes_stream()
        .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
    json_events(StreamReader::new(Box::pin(body)), vendor)
}
