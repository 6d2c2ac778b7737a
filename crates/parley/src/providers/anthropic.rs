use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Arc;

use super::base::Provider;
use super::configs::AnthropicProviderConfig;
use super::utils::{check_status, http_client, register_tools, require, stream_response};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::anthropic::{to_anthropic_blocks, to_anthropic_with, ImageSources};
use crate::formats::cache::{annotate_messages, system_blocks};
use crate::formats::{combine_system, split_system};
use crate::models::content::NeutralContentBlock;
use crate::models::message::NeutralMessage;
use crate::models::model_info::{
    ModelInfo, ModelSelection, ANTHROPIC_DEFAULT_MAX_TOKENS, THINKING_SUFFIX,
};
use crate::projection::project_history;
use crate::stream::anthropic::AnthropicNormalizer;
use crate::stream::ApiStream;
use crate::token_counter::TokenCounter;
use crate::tool_router::ToolRouter;

pub const VENDOR: &str = "Anthropic";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
pub const OUTPUT_128K_BETA: &str = "output-128k-2025-02-19";
/// The only virtual id that unlocks the 128k output beta
const OUTPUT_128K_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Build an Anthropic Messages request body.
///
/// The history is projected onto the model's capabilities first. System messages found
/// in the history are appended to `system`. With prompt caching, the system block and
/// the last two user turns carry `cache_control`.
pub(crate) fn messages_body(
    model: &ModelSelection,
    system: &str,
    history: &[NeutralMessage],
    images: ImageSources,
) -> Value {
    let projected = project_history(history, &model.info.capabilities());
    let (lifted, rest) = split_system(&projected);
    let system = combine_system(system, lifted);

    let cache = model.info.supports_prompt_cache;
    let system = system_blocks(&system, cache);
    let mut messages = to_anthropic_with(rest, images);
    if cache {
        messages = annotate_messages(&system, messages);
    }

    let mut body = json!({
        "model": model.id,
        "max_tokens": model.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        "temperature": model.temperature,
        "messages": messages,
        "stream": true,
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if let Some(thinking) = &model.thinking {
        body["thinking"] = thinking.to_anthropic();
    }
    body
}

/// Body of a one-shot, non-streaming completion
pub(crate) fn prompt_body(model: &ModelSelection, prompt: &str) -> Value {
    let mut body = json!({
        "model": model.id,
        "max_tokens": model.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        "temperature": model.temperature,
        "messages": [{"role": "user", "content": prompt}],
        "stream": false,
    });
    if let Some(thinking) = &model.thinking {
        body["thinking"] = thinking.to_anthropic();
    }
    body
}

/// Join the text blocks of a non-streaming Messages response
pub(crate) fn response_text(response: &Value) -> String {
    response["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect()
        })
        .unwrap_or_default()
}

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        require(&config.api_key, "API key", VENDOR)?;
        let model = ModelSelection::resolve(
            &config.model,
            ModelInfo::for_model(&config.model),
            &config.overrides,
            Some(ANTHROPIC_DEFAULT_MAX_TOKENS),
        );
        register_tools(&router);

        Ok(Self {
            client: http_client()?,
            config,
            model,
            router,
        })
    }

    /// Value of the `anthropic-beta` header, if any beta applies
    fn betas(&self) -> Option<String> {
        let mut betas = Vec::new();
        if self.model.info.supports_prompt_cache {
            betas.push(PROMPT_CACHING_BETA);
        }
        if self.model.virtual_id == format!("{}{}", OUTPUT_128K_MODEL, THINKING_SUFFIX) {
            betas.push(OUTPUT_128K_BETA);
        }
        if betas.is_empty() {
            None
        } else {
            Some(betas.join(","))
        }
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> ProviderResult<Response> {
        let url = format!("{}/{}", self.config.host.trim_end_matches('/'), endpoint);

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload);
        if let Some(betas) = self.betas() {
            request = request.header("anthropic-beta", betas);
        }

        check_status(request.send().await?, VENDOR).await
    }

    async fn count_remote(&self, content: &[NeutralContentBlock]) -> ProviderResult<usize> {
        let payload = json!({
            "model": self.model.id,
            "messages": [{
                "role": "user",
                "content": to_anthropic_blocks(content, ImageSources::Any),
            }],
        });
        let response: Value = self.post("v1/messages/count_tokens", &payload).await?.json().await?;
        response["input_tokens"]
            .as_u64()
            .map(|tokens| tokens as usize)
            .ok_or_else(|| ProviderError::stream(VENDOR, "count_tokens response has no input_tokens"))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let payload = messages_body(&self.model, system, history, ImageSources::Any);
        let response = self.post("v1/messages", &payload).await?;
        Ok(stream_response(
            response,
            VENDOR,
            AnthropicNormalizer::new(VENDOR),
            self.router.clone(),
        ))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn count_tokens(&self, content: &[NeutralContentBlock]) -> usize {
        match self.count_remote(content).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("Anthropic token counting failed, using local estimate: {}", e);
                TokenCounter::new().count_content(content)
            }
        }
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let response: Value = self
            .post("v1/messages", &prompt_body(&self.model, prompt))
            .await?
            .json()
            .await?;
        Ok(response_text(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ApiStreamChunk, Usage};
    use crate::tool_router::{LocalToolRouter, ToolDescriptor, ToolOutput};
    use anyhow::Result;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(events: &[Value]) -> String {
        events
            .iter()
            .map(|event| format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event))
            .collect()
    }

    fn make_provider(server: &MockServer, model: &str, router: Arc<dyn ToolRouter>) -> AnthropicProvider {
        let mut config = AnthropicProviderConfig::new("test_api_key", model);
        config.host = server.uri();
        AnthropicProvider::new(config, router).unwrap()
    }

    fn echo_router() -> Arc<dyn ToolRouter> {
        let router = LocalToolRouter::new();
        router.register_tool(ToolDescriptor::new(
            "echo",
            "Returns its input",
            json!({"type": "object"}),
            |input| async move { Ok(ToolOutput::Json(input)) },
        ));
        Arc::new(router)
    }

    #[test]
    fn test_missing_api_key() {
        let config = AnthropicProviderConfig::new("", "claude-3-5-sonnet-20241022");
        let err = AnthropicProvider::new(config, Arc::new(LocalToolRouter::new()))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_messages_body_caches_and_lifts_system() {
        let model = ModelSelection::resolve(
            "claude-3-5-sonnet-20241022",
            ModelInfo::for_model("claude-3-5-sonnet-20241022"),
            &Default::default(),
            Some(ANTHROPIC_DEFAULT_MAX_TOKENS),
        );
        let history = vec![
            NeutralMessage::system().with_text("Be brief."),
            NeutralMessage::user().with_text("one"),
            NeutralMessage::assistant().with_text("two"),
            NeutralMessage::user().with_text("three"),
        ];
        let body = messages_body(&model, "You help.", &history, ImageSources::Any);

        assert_eq!(body["system"][0]["text"], "You help.\n\nBe brief.");
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][2]["content"][0]["cache_control"]["type"], "ephemeral");
        assert!(body["messages"][1]["content"][0].get("cache_control").is_none());
        assert_eq!(body["max_tokens"], 8192);
        assert!(body.get("thinking").is_none());
    }

    #[tokio::test]
    async fn test_stream_text_and_usage() -> Result<()> {
        let server = MockServer::start().await;
        let body = sse(&[
            json!({"type": "message_start", "message": {"usage": {
                "input_tokens": 10, "output_tokens": 1,
                "cache_creation_input_tokens": 3, "cache_read_input_tokens": 2
            }}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": "Hello"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}}),
            json!({"type": "message_stop"}),
        ]);
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(header("anthropic-beta", PROMPT_CACHING_BETA))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = make_provider(&server, "claude-3-5-sonnet-20241022", echo_router());
        let chunks: Vec<ApiStreamChunk> = provider
            .create_message("You are helpful.", &[NeutralMessage::user().with_text("Hi")])
            .await?
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::usage(
                    Usage::new(10, 1)
                        .with_cache_write(Some(3))
                        .with_cache_read(Some(2))
                ),
                ApiStreamChunk::text("Hello"),
                ApiStreamChunk::text(" world"),
                ApiStreamChunk::usage(Usage::new(0, 5)),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_thinking_model_request() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header(
                "anthropic-beta",
                format!("{},{}", PROMPT_CACHING_BETA, OUTPUT_128K_BETA).as_str(),
            ))
            .and(body_partial_json(json!({
                "model": "claude-3-7-sonnet-20250219",
                "temperature": 1.0,
                "thinking": {"type": "enabled"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                sse(&[
                    json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
                    json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
                ]),
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let provider = make_provider(&server, "claude-3-7-sonnet-20250219:thinking", echo_router());
        assert_eq!(provider.get_model().id, "claude-3-7-sonnet-20250219");
        let chunks: Vec<_> = provider
            .create_message("", &[NeutralMessage::user().with_text("Think")])
            .await?
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &ApiStreamChunk::reasoning("hmm"));
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_use_is_dispatched() -> Result<()> {
        let server = MockServer::start().await;
        let body = sse(&[
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "echo", "input": {}}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"word\":"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "\"hi\"}"}}),
            json!({"type": "content_block_stop", "index": 0}),
        ]);
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = make_provider(&server, "claude-3-5-haiku-20241022", echo_router());
        let chunks: Vec<ApiStreamChunk> = provider
            .create_message("", &[NeutralMessage::user().with_text("Echo hi")])
            .await?
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::tool_use("toolu_1", "echo", json!({"word": "hi"})),
                ApiStreamChunk::tool_result("toolu_1", "{\"word\":\"hi\"}"),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_before_stream() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let provider = make_provider(&server, "claude-3-5-sonnet-20241022", echo_router());
        let Err(err) = provider.create_message("", &[NeutralMessage::user().with_text("Hi")]).await
        else {
            panic!("expected an HTTP error");
        };
        assert_eq!(err.to_string(), "Anthropic API error: 401 invalid x-api-key");
        Ok(())
    }

    #[tokio::test]
    async fn test_count_tokens_remote_and_fallback() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages/count_tokens"))
            .and(body_partial_json(json!({"model": "claude-3-5-sonnet-20241022"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"input_tokens": 42})))
            .mount(&server)
            .await;

        let content = vec![NeutralContentBlock::text("count these words")];
        let provider = make_provider(&server, "claude-3-5-sonnet-20241022", echo_router());
        assert_eq!(provider.count_tokens(&content).await, 42);

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        let provider = make_provider(&failing, "claude-3-5-sonnet-20241022", echo_router());
        assert_eq!(
            provider.count_tokens(&content).await,
            TokenCounter::new().count_content(&content)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_prompt() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_123",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hello! How can I assist you today?"}],
                "usage": {"input_tokens": 12, "output_tokens": 15}
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server, "claude-3-5-sonnet-20241022", echo_router());
        assert_eq!(
            provider.complete_prompt("Hello?").await?,
            "Hello! How can I assist you today?"
        );
        Ok(())
    }
}
