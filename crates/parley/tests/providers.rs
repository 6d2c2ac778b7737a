use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use parley::{
    models::{message::NeutralMessage, tool::ToolCall},
    providers::{
        base::Provider,
        configs::{
            AnthropicProviderConfig, GeminiProviderConfig, MistralProviderConfig, OpenAiFlavor,
            OpenAiProviderConfig, ProviderConfig,
        },
        factory::get_provider,
    },
    stream::ApiStreamChunk,
    tool_router::{LocalToolRouter, ToolDescriptor, ToolOutput, ToolRouter},
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect()
}

fn weather_router() -> Arc<LocalToolRouter> {
    let router = LocalToolRouter::new();
    router.register_tool(ToolDescriptor::new(
        "get_weather",
        "Get the weather for a location",
        json!({
            "type": "object",
            "required": ["location"],
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                }
            }
        }),
        |input| async move {
            Ok(ToolOutput::Json(json!({
                "location": input["location"],
                "forecast": "sunny"
            })))
        },
    ));
    Arc::new(router)
}

/// Generic test harness for any Provider implementation
struct ProviderTester {
    provider: Box<dyn Provider + Send + Sync>,
}

impl ProviderTester {
    fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            provider: get_provider(config, weather_router())?,
        })
    }

    async fn collect(&self, system: &str, text: &str) -> Result<Vec<ApiStreamChunk>> {
        let history = [NeutralMessage::user().with_text(text)];
        let mut stream = self.provider.create_message(system, &history).await?;
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }

    async fn test_basic_response(&self) -> Result<()> {
        let chunks = self
            .collect("You are a helpful assistant.", "Just say hello!")
            .await?;

        let text: String = chunks
            .iter()
            .filter_map(|chunk| match chunk {
                ApiStreamChunk::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello!");
        assert!(
            chunks
                .iter()
                .any(|chunk| matches!(chunk, ApiStreamChunk::Usage(_))),
            "Expected a usage chunk"
        );
        Ok(())
    }

    async fn test_tool_usage(&self) -> Result<()> {
        let chunks = self
            .collect(
                "You are a helpful weather assistant.",
                "What's the weather like in San Francisco?",
            )
            .await?;

        let use_index = chunks
            .iter()
            .position(ApiStreamChunk::is_tool_use)
            .expect("Expected tool use in response");
        let ApiStreamChunk::ToolUse { id, input, .. } = &chunks[use_index] else {
            unreachable!();
        };
        assert_eq!(input["location"], "San Francisco, CA");

        match &chunks[use_index + 1] {
            ApiStreamChunk::ToolResult {
                id: result_id,
                content,
            } => {
                assert_eq!(result_id.as_deref(), Some(id.as_str()));
                let output: Value = serde_json::from_str(content)?;
                assert_eq!(output["forecast"], "sunny");
            }
            other => panic!("Expected tool result after tool use, got {:?}", other),
        }
        Ok(())
    }
}

/// Serve `basic` for the first request and `tool` for every later one
async fn mount(server: &MockServer, route: &str, basic: String, tool: String) {
    Mock::given(method("POST"))
        .and(path_regex(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(basic, "text/event-stream"))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(tool, "text/event-stream"))
        .mount(server)
        .await;
}

fn openai_bodies() -> (String, String) {
    let basic = sse(&[
        json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hello"}}]}),
        json!({"choices": [{"index": 0, "delta": {"content": "!"}, "finish_reason": "stop"}]}),
        json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 2}}),
    ]) + "data: [DONE]\n\n";
    let tool = sse(&[
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "type": "function",
             "function": {"name": "get_weather", "arguments": "{\"location\": "}}
        ]}}]}),
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "\"San Francisco, CA\"}"}}
        ]}, "finish_reason": "tool_calls"}]}),
    ]) + "data: [DONE]\n\n";
    (basic, tool)
}

#[tokio::test]
async fn test_anthropic_provider() -> Result<()> {
    let server = MockServer::start().await;
    let basic = sse(&[
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": "Hello"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "!"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}),
        json!({"type": "message_stop"}),
    ]);
    let tool = sse(&[
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 30, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"location\": \"San Francisco, CA\"}"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_stop"}),
    ]);
    mount(&server, "^/v1/messages$", basic, tool).await;

    let mut config = AnthropicProviderConfig::new("test_api_key", "claude-3-5-sonnet-20241022");
    config.host = server.uri();
    let tester = ProviderTester::new(ProviderConfig::Anthropic(config))?;
    tester.test_basic_response().await?;
    tester.test_tool_usage().await?;
    Ok(())
}

#[tokio::test]
async fn test_openai_provider() -> Result<()> {
    let server = MockServer::start().await;
    let (basic, tool) = openai_bodies();
    mount(&server, "^/chat/completions$", basic, tool).await;

    let mut config = OpenAiProviderConfig::new(OpenAiFlavor::OpenAi, "test_api_key", "gpt-4o");
    config.host = server.uri();
    let tester = ProviderTester::new(ProviderConfig::OpenAi(config))?;
    tester.test_basic_response().await?;
    tester.test_tool_usage().await?;
    Ok(())
}

#[tokio::test]
async fn test_ollama_provider() -> Result<()> {
    let server = MockServer::start().await;
    let (basic, tool) = openai_bodies();
    mount(&server, "^/chat/completions$", basic, tool).await;

    let mut config = OpenAiProviderConfig::new(OpenAiFlavor::Ollama, "", "llama3.2");
    config.host = server.uri();
    let tester = ProviderTester::new(ProviderConfig::OpenAi(config))?;
    tester.test_basic_response().await?;
    tester.test_tool_usage().await?;
    Ok(())
}

#[tokio::test]
async fn test_gemini_provider() -> Result<()> {
    let server = MockServer::start().await;
    let basic = sse(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "!"}]}}],
               "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 2}}),
    ]);
    let tool = sse(&[json!({"candidates": [{"content": {"role": "model", "parts": [
        {"functionCall": {"name": "get_weather", "args": {"location": "San Francisco, CA"}}}
    ]}}]})]);
    mount(&server, ":streamGenerateContent$", basic, tool).await;

    let mut config = GeminiProviderConfig::new("test_api_key", "gemini-2.0-flash-001");
    config.host = server.uri();
    let tester = ProviderTester::new(ProviderConfig::Gemini(config))?;
    tester.test_basic_response().await?;
    tester.test_tool_usage().await?;
    Ok(())
}

#[tokio::test]
async fn test_mistral_provider() -> Result<()> {
    let server = MockServer::start().await;
    let (basic, tool) = openai_bodies();
    mount(&server, "^/v1/chat/completions$", basic, tool).await;

    let mut config = MistralProviderConfig::new("test_api_key", "mistral-large-latest");
    config.host = server.uri();
    let tester = ProviderTester::new(ProviderConfig::Mistral(config))?;
    tester.test_basic_response().await?;
    tester.test_tool_usage().await?;
    Ok(())
}

#[tokio::test]
async fn test_building_a_provider_keeps_embedder_tools() -> Result<()> {
    let router = weather_router();
    router.register_tool(ToolDescriptor::new(
        "read_file",
        "Read a file from the sandbox",
        json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        |input| async move { Ok(ToolOutput::Text(format!("contents of {}", input["path"]))) },
    ));

    let config = AnthropicProviderConfig::new("test_api_key", "claude-3-5-sonnet-20241022");
    let _provider = get_provider(ProviderConfig::Anthropic(config), router.clone())?;

    let output = router
        .route_tool_use(ToolCall::new("toolu_1", "read_file", json!({"path": "src/lib.rs"})).into())
        .await?;
    assert_eq!(output, ToolOutput::Text("contents of \"src/lib.rs\"".to_string()));
    assert!(router.has_tool("attempt_completion"));
    Ok(())
}
