use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

use super::base::Provider;
use super::configs::GeminiProviderConfig;
use super::utils::{check_status, http_client, register_tools, require, stream_response};
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::gemini::{system_instruction, to_gemini_from};
use crate::formats::{combine_system, split_system};
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelSelection};
use crate::projection::project_history;
use crate::stream::gemini::GeminiNormalizer;
use crate::stream::ApiStream;
use crate::tool_router::ToolRouter;

pub const VENDOR: &str = "Gemini";

/// Build a `generateContent` body. Shared with Gemini models on Vertex AI.
pub(crate) fn gemini_body(model: &ModelSelection, system: &str, history: &[NeutralMessage]) -> Value {
    let projected = project_history(history, &model.info.capabilities());
    let (lifted, rest) = split_system(&projected);
    let system = combine_system(system, lifted);

    let mut generation_config = json!({"temperature": model.temperature});
    if let Some(max_tokens) = model.max_tokens {
        generation_config["maxOutputTokens"] = json!(max_tokens);
    }

    let mut body = json!({
        "contents": to_gemini_from(rest),
        "generationConfig": generation_config,
    });
    if !system.is_empty() {
        body["systemInstruction"] = system_instruction(&system);
    }
    body
}

pub(crate) fn prompt_body(model: &ModelSelection, prompt: &str) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        "generationConfig": {"temperature": model.temperature},
    })
}

/// Join the non-thought text parts of every candidate
pub(crate) fn response_text(response: &Value) -> String {
    let candidates = response["candidates"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    candidates
        .iter()
        .filter_map(|candidate| candidate["content"]["parts"].as_array())
        .flatten()
        .filter(|part| !part["thought"].as_bool().unwrap_or(false))
        .filter_map(|part| part["text"].as_str())
        .collect()
}

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        require(&config.api_key, "API key", VENDOR)?;
        let model = ModelSelection::resolve(
            &config.model,
            ModelInfo::for_model(&config.model),
            &config.overrides,
            None,
        );
        register_tools(&router);

        Ok(Self {
            client: http_client()?,
            config,
            model,
            router,
        })
    }

    fn url(&self, method: &str, stream: bool) -> ProviderResult<Url> {
        let base = format!(
            "{}/v1beta/models/{}:{}",
            self.config.host.trim_end_matches('/'),
            self.model.id,
            method
        );
        let mut url = Url::parse(&base)
            .map_err(|e| ProviderError::configuration(format!("Invalid Gemini host: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            if stream {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", &self.config.api_key);
        }
        Ok(url)
    }

    async fn post(&self, url: Url, payload: &Value) -> ProviderResult<Response> {
        let response = self.client.post(url).json(payload).send().await?;
        check_status(response, VENDOR).await
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let url = self.url("streamGenerateContent", true)?;
        let response = self
            .post(url, &gemini_body(&self.model, system, history))
            .await?;
        Ok(stream_response(
            response,
            VENDOR,
            GeminiNormalizer::new(VENDOR),
            self.router.clone(),
        ))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let url = self.url("generateContent", false)?;
        let response: Value = self
            .post(url, &prompt_body(&self.model, prompt))
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
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gemini-2.0-flash-001";

    fn make_provider(server: &MockServer) -> GeminiProvider {
        let mut config = GeminiProviderConfig::new("test_api_key", MODEL);
        config.host = server.uri();
        let router = LocalToolRouter::new();
        router.register_tool(ToolDescriptor::new(
            "calculator",
            "Adds numbers",
            json!({"type": "object"}),
            |input| async move {
                let sum = input["a"].as_i64().unwrap_or(0) + input["b"].as_i64().unwrap_or(0);
                Ok(ToolOutput::Json(json!({"sum": sum})))
            },
        ));
        GeminiProvider::new(config, Arc::new(router)).unwrap()
    }

    #[test]
    fn test_body_has_system_instruction() {
        let model = ModelSelection::resolve(MODEL, ModelInfo::for_model(MODEL), &Default::default(), None);
        let history = vec![
            NeutralMessage::user().with_text("Hi"),
            NeutralMessage::assistant().with_text("Hello"),
        ];
        let body = gemini_body(&model, "Be kind", &history);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);

        let body = gemini_body(&model, "", &history);
        assert!(body.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_stream_with_function_call() -> Result<()> {
        let server = MockServer::start().await;
        let events = [
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Let me add."}]}}]}),
            json!({"candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "calculator", "args": {"a": 2, "b": 3}}}
            ]}}]}),
            json!({"candidates": [], "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 4}}),
        ];
        let body: String = events.iter().map(|event| format!("data: {}\r\n\r\n", event)).collect();
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:streamGenerateContent", MODEL)))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "test_api_key"))
            .and(body_partial_json(json!({"generationConfig": {"temperature": 0.0}})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = make_provider(&server);
        let chunks: Vec<ApiStreamChunk> = provider
            .create_message("", &[NeutralMessage::user().with_text("2+3?")])
            .await?
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![
                ApiStreamChunk::text("Let me add."),
                ApiStreamChunk::tool_use("calculator-1", "calculator", json!({"a": 2, "b": 3})),
                ApiStreamChunk::tool_result("calculator-1", "{\"sum\":5}"),
                ApiStreamChunk::usage(Usage::new(8, 4)),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_prompt() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", MODEL)))
            .and(query_param("key", "test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Paris"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server);
        assert_eq!(provider.complete_prompt("Capital of France?").await?, "Paris");
        Ok(())
    }
}
