//! Amazon Bedrock through the Converse API.
//!
//! Signing and the event-stream framing belong to the AWS client, which embedders
//! supply as a [`BedrockTransport`]. The handler builds typed requests and normalizes the
//! decoded events.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use super::base::Provider;
use super::configs::BedrockProviderConfig;
use super::dispatch::with_tool_dispatch;
use super::utils::register_tools;
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::bedrock::{system_blocks, to_bedrock, BedrockMessage};
use crate::formats::{combine_system, split_system};
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelSelection};
use crate::projection::project_history;
use crate::stream::bedrock::BedrockNormalizer;
use crate::stream::{normalize, ApiStream, EventStream};
use crate::tool_router::ToolRouter;

pub const VENDOR: &str = "Bedrock";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A Converse or ConverseStream request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<BedrockMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<Value>,
    pub inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_model_request_fields: Option<Value>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BedrockTransport: Send + Sync {
    /// Start a ConverseStream call. Events are yielded decoded, one JSON object each.
    async fn converse_stream(&self, request: ConverseRequest) -> ProviderResult<EventStream>;

    /// A single Converse call, answering with the response document
    async fn converse(&self, request: ConverseRequest) -> ProviderResult<Value>;
}

pub struct BedrockProvider {
    transport: Arc<dyn BedrockTransport>,
    model: ModelSelection,
    router: Arc<dyn ToolRouter>,
}

impl BedrockProvider {
    pub fn new(config: BedrockProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        let transport = config.transport.ok_or_else(|| {
            ProviderError::configuration("Bedrock requires a transport (an AWS Converse client)")
        })?;
        let model = ModelSelection::resolve(
            &config.model,
            ModelInfo::for_model(&config.model),
            &config.overrides,
            None,
        );
        register_tools(&router);

        Ok(Self {
            transport,
            model,
            router,
        })
    }

    fn request(&self, system: &str, messages: Vec<BedrockMessage>) -> ConverseRequest {
        let thinking = self
            .model
            .thinking
            .as_ref()
            .map(|thinking| json!({"thinking": thinking.to_anthropic()}));
        ConverseRequest {
            model_id: self.model.id.clone(),
            messages,
            system: system_blocks(system),
            inference_config: InferenceConfig {
                max_tokens: self.model.max_tokens,
                temperature: Some(self.model.temperature),
            },
            additional_model_request_fields: thinking,
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let projected = project_history(history, &self.model.info.capabilities());
        let (lifted, rest) = split_system(&projected);
        let system = combine_system(system, lifted);
        let rest: Vec<NeutralMessage> = rest.into_iter().cloned().collect();

        let events = self
            .transport
            .converse_stream(self.request(&system, to_bedrock(&rest)))
            .await?;
        Ok(with_tool_dispatch(
            normalize(events, BedrockNormalizer::new()),
            self.router.clone(),
        ))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let messages = to_bedrock(&[NeutralMessage::user().with_text(prompt)]);
        let response = self.transport.converse(self.request("", messages)).await?;
        let blocks = response["output"]["message"]["content"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(blocks.iter().filter_map(|block| block["text"].as_str()).collect())
    }
}
