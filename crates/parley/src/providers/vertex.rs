//! Vertex AI hosts Claude and Gemini models behind one project/region URL scheme.
//!
//! Claude requests use the Anthropic body with `anthropic_version` in place of `model`.
//! Gemini requests use the `generateContent` body. Both authenticate with a bearer token.
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;

use super::anthropic::{self, messages_body};
use super::base::Provider;
use super::configs::VertexProviderConfig;
use super::gemini::{self, gemini_body};
use super::utils::{check_status, http_client, register_tools, require, stream_response};
use crate::errors::ProviderResult;
use crate::formats::anthropic::ImageSources;
use crate::formats::vertex::{VertexFamily, VERTEX_ANTHROPIC_VERSION};
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelSelection, ANTHROPIC_DEFAULT_MAX_TOKENS};
use crate::stream::anthropic::AnthropicNormalizer;
use crate::stream::gemini::GeminiNormalizer;
use crate::stream::ApiStream;
use crate::tool_router::ToolRouter;

pub const CLAUDE_VENDOR: &str = "Vertex AI Claude";
pub const GEMINI_VENDOR: &str = "Vertex AI Gemini";

/// Swap `model` for the `anthropic_version` Vertex expects
fn vertex_claude_body(mut body: Value) -> Value {
    if let Some(object) = body.as_object_mut() {
        object.remove("model");
        object.insert(
            "anthropic_version".to_string(),
            Value::from(VERTEX_ANTHROPIC_VERSION),
        );
    }
    body
}

pub struct VertexProvider {
    client: Client,
    config: VertexProviderConfig,
    family: VertexFamily,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl VertexProvider {
    pub fn new(config: VertexProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        require(&config.project_id, "Project id", "Vertex AI")?;
        require(&config.region, "Region", "Vertex AI")?;
        require(&config.access_token, "Access token", "Vertex AI")?;

        let family = VertexFamily::for_model(&config.model);
        let default_max_tokens = match family {
            VertexFamily::Claude => Some(ANTHROPIC_DEFAULT_MAX_TOKENS),
            VertexFamily::Gemini => None,
        };
        let model = ModelSelection::resolve(
            &config.model,
            ModelInfo::for_model(&config.model),
            &config.overrides,
            default_max_tokens,
        );
        register_tools(&router);

        Ok(Self {
            client: http_client()?,
            config,
            family,
            model,
            router,
        })
    }

    pub fn family(&self) -> VertexFamily {
        self.family
    }

    fn vendor(&self) -> &'static str {
        match self.family {
            VertexFamily::Claude => CLAUDE_VENDOR,
            VertexFamily::Gemini => GEMINI_VENDOR,
        }
    }

    fn url(&self, method: &str) -> String {
        let publisher = match self.family {
            VertexFamily::Claude => "anthropic",
            VertexFamily::Gemini => "google",
        };
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/{}/models/{}:{}",
            self.config.base_url(),
            self.config.project_id,
            self.config.region,
            publisher,
            self.model.id,
            method
        )
    }

    async fn post(&self, url: &str, payload: &Value) -> ProviderResult<Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(payload)
            .send()
            .await?;
        check_status(response, self.vendor()).await
    }
}

#[async_trait]
impl Provider for VertexProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        match self.family {
            VertexFamily::Claude => {
                let payload = vertex_claude_body(messages_body(
                    &self.model,
                    system,
                    history,
                    ImageSources::Base64Only,
                ));
                let response = self.post(&self.url("streamRawPredict"), &payload).await?;
                Ok(stream_response(
                    response,
                    CLAUDE_VENDOR,
                    AnthropicNormalizer::new(CLAUDE_VENDOR),
                    self.router.clone(),
                ))
            }
            VertexFamily::Gemini => {
                let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
                let payload = gemini_body(&self.model, system, history);
                let response = self.post(&url, &payload).await?;
                Ok(stream_response(
                    response,
                    GEMINI_VENDOR,
                    GeminiNormalizer::new(GEMINI_VENDOR),
                    self.router.clone(),
                ))
            }
        }
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        match self.family {
            VertexFamily::Claude => {
                let payload = vertex_claude_body(anthropic::prompt_body(&self.model, prompt));
                let response: Value = self
                    .post(&self.url("rawPredict"), &payload)
                    .await?
                    .json()
                    .await?;
                Ok(anthropic::response_text(&response))
            }
            VertexFamily::Gemini => {
                let payload = gemini::prompt_body(&self.model, prompt);
                let response: Value = self
                    .post(&self.url("generateContent"), &payload)
                    .await?
                    .json()
                    .await?;
                Ok(gemini::response_text(&response))
            }
        }
    }
}
