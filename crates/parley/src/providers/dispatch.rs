//! Tool dispatch over a normalized stream.
//!
//! Each `tool_use` chunk is passed through to the consumer and then routed. Production
//! is suspended until the router answers, and the answer is yielded as a `tool_result`
//! carrying the call id. Calls are routed one at a time, in stream order.
use futures::StreamExt;
use std::sync::Arc;

use crate::models::tool::ToolCall;
use crate::stream::{ApiStream, ApiStreamChunk};
use crate::tool_router::ToolRouter;

#[derive(Debug)]
pub enum DispatchState {
    /// Pulling chunks from the vendor stream
    Streaming,
    /// A call was yielded and waits for the router
    AwaitingTool(ToolCall),
    /// The router answered; pull the next chunk
    Resuming,
    Done,
    Failed,
}

/// Route the tool calls of `inner` through `router`.
///
/// A router failure becomes `tool_result{id, "Error: <message>"}` and the stream
/// continues. A vendor failure is yielded and ends the stream.
pub fn with_tool_dispatch(inner: ApiStream, router: Arc<dyn ToolRouter>) -> ApiStream {
    let mut inner = inner;
    Box::pin(async_stream::stream! {
        let mut state = DispatchState::Streaming;
        let mut router_ready = false;
        loop {
            state = match state {
                DispatchState::Streaming | DispatchState::Resuming => match inner.next().await {
                    Some(Ok(ApiStreamChunk::ToolUse { id, name, input })) => {
                        let call = ToolCall::new(id, name, input);
                        yield Ok(ApiStreamChunk::tool_use(
                            call.id.clone(),
                            call.name.clone(),
                            call.input.clone(),
                        ));
                        DispatchState::AwaitingTool(call)
                    }
                    Some(Ok(chunk)) => {
                        yield Ok(chunk);
                        DispatchState::Streaming
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        DispatchState::Failed
                    }
                    None => DispatchState::Done,
                },
                DispatchState::AwaitingTool(call) => {
                    let id = call.id.clone();
                    let name = call.name.clone();
                    if !router_ready {
                        if let Err(e) = router.initialize().await {
                            tracing::warn!("Tool router failed to initialize: {}", e);
                        }
                        router_ready = true;
                    }
                    tracing::debug!("Routing tool call {} ({})", name, id);
                    let content = match router.route_tool_use(call.into()).await {
                        Ok(output) => output.into_content(),
                        Err(e) => {
                            tracing::warn!("Tool {} failed: {}", name, e);
                            format!("Error: {}", e)
                        }
                    };
                    yield Ok(ApiStreamChunk::tool_result(id, content));
                    DispatchState::Resuming
                }
                DispatchState::Done | DispatchState::Failed => break,
            };
        }
    })
}
