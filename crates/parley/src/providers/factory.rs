use std::str::FromStr;
use std::sync::Arc;

use strum_macros::{Display, EnumIter, EnumString};

use super::{
    anthropic::AnthropicProvider, base::Provider, bedrock::BedrockProvider,
    configs::OpenAiFlavor, configs::ProviderConfig, gemini::GeminiProvider,
    mistral::MistralProvider, openai::OpenAiProvider, vertex::VertexProvider,
    vscode_lm::VsCodeLmProvider,
};
use crate::errors::{ProviderError, ProviderResult};
use crate::tool_router::ToolRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAi,
    OpenRouter,
    DeepSeek,
    Ollama,
    LmStudio,
    Gemini,
    Vertex,
    Mistral,
    Bedrock,
    #[strum(serialize = "vscode-lm")]
    VsCodeLm,
    // Known names without a handler
    Glama,
    Unbound,
    Requesty,
    #[strum(serialize = "human-relay")]
    HumanRelay,
    #[strum(serialize = "fake-ai")]
    FakeAi,
}

impl ProviderType {
    pub fn is_enabled(&self) -> bool {
        !matches!(
            self,
            ProviderType::Glama
                | ProviderType::Unbound
                | ProviderType::Requesty
                | ProviderType::HumanRelay
                | ProviderType::FakeAi
        )
    }

    /// The OpenAI-compatible flavor serving this provider, if it is one
    pub fn openai_flavor(&self) -> Option<OpenAiFlavor> {
        match self {
            ProviderType::OpenAi => Some(OpenAiFlavor::OpenAi),
            ProviderType::OpenRouter => Some(OpenAiFlavor::OpenRouter),
            ProviderType::DeepSeek => Some(OpenAiFlavor::DeepSeek),
            ProviderType::Ollama => Some(OpenAiFlavor::Ollama),
            ProviderType::LmStudio => Some(OpenAiFlavor::LmStudio),
            _ => None,
        }
    }

    /// Parse a provider name, rejecting unknown and disabled providers
    pub fn from_name(name: &str) -> ProviderResult<Self> {
        let provider_type =
            ProviderType::from_str(name).map_err(|_| ProviderError::UnsupportedProvider {
                provider: name.to_string(),
                reason: "unknown provider".to_string(),
            })?;
        if !provider_type.is_enabled() {
            return Err(ProviderError::UnsupportedProvider {
                provider: name.to_string(),
                reason: "no handler is available".to_string(),
            });
        }
        Ok(provider_type)
    }
}

impl From<OpenAiFlavor> for ProviderType {
    fn from(flavor: OpenAiFlavor) -> Self {
        match flavor {
            OpenAiFlavor::OpenAi => ProviderType::OpenAi,
            OpenAiFlavor::OpenRouter => ProviderType::OpenRouter,
            OpenAiFlavor::DeepSeek => ProviderType::DeepSeek,
            OpenAiFlavor::Ollama => ProviderType::Ollama,
            OpenAiFlavor::LmStudio => ProviderType::LmStudio,
        }
    }
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::OpenAi(config) => config.flavor.into(),
            ProviderConfig::Gemini(_) => ProviderType::Gemini,
            ProviderConfig::Vertex(_) => ProviderType::Vertex,
            ProviderConfig::Mistral(_) => ProviderType::Mistral,
            ProviderConfig::Bedrock(_) => ProviderType::Bedrock,
            ProviderConfig::VsCodeLm(_) => ProviderType::VsCodeLm,
        }
    }
}

pub fn get_provider(
    config: ProviderConfig,
    router: Arc<dyn ToolRouter>,
) -> ProviderResult<Box<dyn Provider + Send + Sync>> {
    tracing::debug!("Building provider for {:?}", config);
    match config {
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config, router)?))
        }
        ProviderConfig::OpenAi(openai_config) => {
            Ok(Box::new(OpenAiProvider::new(openai_config, router)?))
        }
        ProviderConfig::Gemini(gemini_config) => {
            Ok(Box::new(GeminiProvider::new(gemini_config, router)?))
        }
        ProviderConfig::Vertex(vertex_config) => {
            Ok(Box::new(VertexProvider::new(vertex_config, router)?))
        }
        ProviderConfig::Mistral(mistral_config) => {
            Ok(Box::new(MistralProvider::new(mistral_config, router)?))
        }
        ProviderConfig::Bedrock(bedrock_config) => {
            Ok(Box::new(BedrockProvider::new(bedrock_config, router)?))
        }
        ProviderConfig::VsCodeLm(vscode_config) => {
            Ok(Box::new(VsCodeLmProvider::new(vscode_config, router)?))
        }
    }
}
