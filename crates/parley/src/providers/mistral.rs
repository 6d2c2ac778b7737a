use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Arc;

use super::base::Provider;
use super::configs::MistralProviderConfig;
use super::utils::{check_status, http_client, register_tools, require, stream_response};
use crate::errors::ProviderResult;
use crate::formats::mistral::to_mistral;
use crate::formats::{combine_system, split_system};
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelSelection};
use crate::projection::project_history;
use crate::stream::openai::OpenAiNormalizer;
use crate::stream::{ApiStream, ApiStreamChunk, StreamNormalizer};
use crate::tool_router::ToolRouter;

pub const VENDOR: &str = "Mistral";

/// Mistral streams OpenAI-shaped chunks, except that `delta.content` may be a list of
/// typed parts. Those are flattened to their text before the OpenAI rules apply.
struct MistralNormalizer {
    inner: OpenAiNormalizer,
}

fn flatten_content(event: &Value) -> Option<Value> {
    let choices = event["choices"].as_array()?;
    if !choices.iter().any(|choice| choice["delta"]["content"].is_array()) {
        return None;
    }
    let mut event = event.clone();
    if let Some(choices) = event["choices"].as_array_mut() {
        for choice in choices {
            let text: Option<String> = choice["delta"]["content"].as_array().map(|parts| {
                parts
                    .iter()
                    .filter(|part| part["type"] == "text")
                    .filter_map(|part| part["text"].as_str())
                    .collect()
            });
            if let Some(text) = text {
                choice["delta"]["content"] = json!(text);
            }
        }
    }
    Some(event)
}

impl StreamNormalizer for MistralNormalizer {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn process(&mut self, event: &Value) -> ProviderResult<Vec<ApiStreamChunk>> {
        match flatten_content(event) {
            Some(flattened) => self.inner.process(&flattened),
            None => self.inner.process(event),
        }
    }

    fn finish(&mut self) -> Vec<ApiStreamChunk> {
        self.inner.finish()
    }
}

pub struct MistralProvider {
    client: Client,
    config: MistralProviderConfig,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl MistralProvider {
    pub fn new(config: MistralProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
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

    fn messages(&self, system: &str, history: &[NeutralMessage]) -> Vec<Value> {
        let projected = project_history(history, &self.model.info.capabilities());
        let (lifted, rest) = split_system(&projected);
        let system = combine_system(system, lifted);
        let rest: Vec<NeutralMessage> = rest.into_iter().cloned().collect();

        let mut messages = Vec::with_capacity(rest.len() + 1);
        if !system.is_empty() {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(to_mistral(&rest));
        messages
    }

    async fn post(&self, payload: &Value) -> ProviderResult<Response> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await?;
        check_status(response, VENDOR).await
    }
}

#[async_trait]
impl Provider for MistralProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let payload = json!({
            "model": self.model.id,
            "messages": self.messages(system, history),
            "temperature": self.model.temperature,
            "stream": true,
        });
        let response = self.post(&payload).await?;
        Ok(stream_response(
            response,
            VENDOR,
            MistralNormalizer {
                inner: OpenAiNormalizer::new(VENDOR),
            },
            self.router.clone(),
        ))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let payload = json!({
            "model": self.model.id,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.model.temperature,
        });
        let response: Value = self.post(&payload).await?.json().await?;
        let content = &response["choices"][0]["message"]["content"];
        Ok(match content {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect(),
            _ => String::new(),
        })
    }
}
