use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Arc;

use super::base::Provider;
use super::configs::{OpenAiFlavor, OpenAiProviderConfig};
use super::utils::{check_status, http_client, register_tools, require, stream_response};
use crate::errors::ProviderResult;
use crate::formats::cache::{annotate_messages, system_blocks};
use crate::formats::openai::to_openai;
use crate::formats::{combine_system, split_system};
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelSelection, ReasoningEffort};
use crate::projection::project_history;
use crate::stream::openai::OpenAiNormalizer;
use crate::stream::ApiStream;
use crate::tool_router::ToolRouter;

pub const APP_TITLE: &str = "parley";

/// Build the `messages` list for a chat completions request.
///
/// Where the system prompt goes depends on the model: reasoning models that reject a
/// system role get it as the first user turn, models without temperature support take a
/// `developer` message, and Claude models behind OpenRouter get a cacheable system block
/// plus breakpoints on the last two user turns.
pub(crate) fn chat_messages(
    flavor: OpenAiFlavor,
    model: &ModelSelection,
    system: &str,
    history: &[NeutralMessage],
) -> Vec<Value> {
    let projected = project_history(history, &model.info.capabilities());
    let (lifted, rest) = split_system(&projected);
    let system = combine_system(system, lifted);
    let rest: Vec<NeutralMessage> = rest.into_iter().cloned().collect();
    let mut messages = to_openai(&rest);

    if system.is_empty() {
        return messages;
    }

    if flavor == OpenAiFlavor::OpenRouter && model.id.starts_with("anthropic/") {
        let system = system_blocks(&system, true);
        messages = annotate_messages(&system, messages);
        messages.insert(0, json!({"role": "system", "content": system}));
    } else if model.info.reasoning_effort == Some(ReasoningEffort::High) {
        messages.insert(0, json!({"role": "user", "content": system}));
    } else if !model.info.supports_temperature {
        messages.insert(0, json!({"role": "developer", "content": system}));
    } else {
        messages.insert(0, json!({"role": "system", "content": system}));
    }
    messages
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        if config.flavor.requires_api_key() {
            require(&config.api_key, "API key", config.flavor.vendor())?;
        }
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

    fn vendor(&self) -> &'static str {
        self.config.flavor.vendor()
    }

    fn body(&self, messages: Vec<Value>, stream: bool) -> Value {
        let info = &self.model.info;
        // OpenRouter resolves the variant itself
        let model_id = match self.config.flavor {
            OpenAiFlavor::OpenRouter => self.model.virtual_id.as_str(),
            _ => self.model.id.as_str(),
        };
        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({"include_usage": true});
        }
        if info.supports_temperature {
            body["temperature"] = json!(self.model.temperature);
        }
        if let Some(effort) = info.reasoning_effort {
            if !info.supports_temperature {
                body["reasoning_effort"] = json!(effort.to_string());
            }
        }
        if let Some(max_tokens) = self.model.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if self.config.flavor == OpenAiFlavor::OpenRouter {
            body["transforms"] = json!(["middle-out"]);
            if let Some(thinking) = &self.model.thinking {
                body["thinking"] = thinking.to_anthropic();
            }
        }
        body
    }

    async fn post(&self, payload: &Value) -> ProviderResult<Response> {
        let url = format!(
            "{}/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(payload);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        if self.config.flavor == OpenAiFlavor::OpenRouter {
            request = request.header("X-Title", APP_TITLE);
        }

        check_status(request.send().await?, self.vendor()).await
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let messages = chat_messages(self.config.flavor, &self.model, system, history);
        let response = self.post(&self.body(messages, true)).await?;
        Ok(stream_response(
            response,
            self.vendor(),
            OpenAiNormalizer::new(self.vendor()),
            self.router.clone(),
        ))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let messages = vec![json!({"role": "user", "content": prompt})];
        let response: Value = self.post(&self.body(messages, false)).await?.json().await?;
        Ok(response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}
