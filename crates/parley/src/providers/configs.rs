use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::bedrock::BedrockTransport;
use super::vscode_lm::{LanguageModelHost, LmModelSelector};
use crate::models::model_info::ModelOverrides;

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
pub const MISTRAL_HOST: &str = "https://api.mistral.ai";
pub const CODESTRAL_HOST: &str = "https://codestral.mistral.ai";
pub const MISTRAL_DEFAULT_MODEL: &str = "codestral-latest";
pub const VERTEX_DEFAULT_MODEL: &str = "claude-3-7-sonnet@20250219";
pub const VERTEX_DEFAULT_REGION: &str = "us-east5";
pub const BEDROCK_DEFAULT_MODEL: &str = "anthropic.claude-3-7-sonnet-20250219-v1:0";

// Unified enum to wrap different provider configurations
#[derive(Clone)]
pub enum ProviderConfig {
    Anthropic(AnthropicProviderConfig),
    OpenAi(OpenAiProviderConfig),
    Gemini(GeminiProviderConfig),
    Vertex(VertexProviderConfig),
    Mistral(MistralProviderConfig),
    Bedrock(BedrockProviderConfig),
    VsCodeLm(VsCodeLmProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> String {
        match self {
            ProviderConfig::Anthropic(config) => config.model.clone(),
            ProviderConfig::OpenAi(config) => config.model.clone(),
            ProviderConfig::Gemini(config) => config.model.clone(),
            ProviderConfig::Vertex(config) => config.model.clone(),
            ProviderConfig::Mistral(config) => config.model.clone(),
            ProviderConfig::Bedrock(config) => config.model.clone(),
            ProviderConfig::VsCodeLm(config) => config.selector.model_id(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    // credentials stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ProviderConfig::Anthropic(_) => "Anthropic",
            ProviderConfig::OpenAi(config) => config.flavor.vendor(),
            ProviderConfig::Gemini(_) => "Gemini",
            ProviderConfig::Vertex(_) => "Vertex",
            ProviderConfig::Mistral(_) => "Mistral",
            ProviderConfig::Bedrock(_) => "Bedrock",
            ProviderConfig::VsCodeLm(_) => "VsCodeLm",
        };
        f.debug_struct("ProviderConfig")
            .field("provider", &kind)
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub overrides: ModelOverrides,
}

impl AnthropicProviderConfig {
    pub fn new<K: Into<String>, M: Into<String>>(api_key: K, model: M) -> Self {
        Self {
            host: ANTHROPIC_HOST.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            overrides: ModelOverrides::default(),
        }
    }
}

/// The services reached through the OpenAI chat completions protocol
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OpenAiFlavor {
    #[default]
    OpenAi,
    OpenRouter,
    DeepSeek,
    Ollama,
    LmStudio,
}

impl OpenAiFlavor {
    pub fn default_host(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "https://api.openai.com/v1",
            OpenAiFlavor::OpenRouter => "https://openrouter.ai/api/v1",
            OpenAiFlavor::DeepSeek => "https://api.deepseek.com/v1",
            OpenAiFlavor::Ollama => "http://localhost:11434/v1",
            OpenAiFlavor::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "gpt-4o",
            OpenAiFlavor::OpenRouter => "anthropic/claude-3.7-sonnet",
            OpenAiFlavor::DeepSeek => "deepseek-chat",
            OpenAiFlavor::Ollama => "llama3.2",
            OpenAiFlavor::LmStudio => "local-model",
        }
    }

    /// Name used in error messages
    pub fn vendor(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OpenAI",
            OpenAiFlavor::OpenRouter => "OpenRouter",
            OpenAiFlavor::DeepSeek => "DeepSeek",
            OpenAiFlavor::Ollama => "Ollama",
            OpenAiFlavor::LmStudio => "LM Studio",
        }
    }

    /// Local servers run without credentials
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, OpenAiFlavor::Ollama | OpenAiFlavor::LmStudio)
    }
}

#[derive(Clone)]
pub struct OpenAiProviderConfig {
    pub flavor: OpenAiFlavor,
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub overrides: ModelOverrides,
}

impl OpenAiProviderConfig {
    pub fn new<K: Into<String>, M: Into<String>>(flavor: OpenAiFlavor, api_key: K, model: M) -> Self {
        Self {
            flavor,
            host: flavor.default_host().to_string(),
            api_key: api_key.into(),
            model: model.into(),
            overrides: ModelOverrides::default(),
        }
    }
}

#[derive(Clone)]
pub struct GeminiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub overrides: ModelOverrides,
}

impl GeminiProviderConfig {
    pub fn new<K: Into<String>, M: Into<String>>(api_key: K, model: M) -> Self {
        Self {
            host: GEMINI_HOST.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            overrides: ModelOverrides::default(),
        }
    }
}

#[derive(Clone)]
pub struct VertexProviderConfig {
    pub project_id: String,
    pub region: String,
    /// OAuth bearer token. Minting and refreshing it is left to the caller.
    pub access_token: String,
    pub model: String,
    /// Replaces `https://{region}-aiplatform.googleapis.com` when set
    pub host: Option<String>,
    pub overrides: ModelOverrides,
}

impl VertexProviderConfig {
    pub fn new<P, T, M>(project_id: P, access_token: T, model: M) -> Self
    where
        P: Into<String>,
        T: Into<String>,
        M: Into<String>,
    {
        Self {
            project_id: project_id.into(),
            region: VERTEX_DEFAULT_REGION.to_string(),
            access_token: access_token.into(),
            model: model.into(),
            host: None,
            overrides: ModelOverrides::default(),
        }
    }

    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.region),
        }
    }
}

#[derive(Clone)]
pub struct MistralProviderConfig {
    pub host: String,
    /// Used instead of `host` for `codestral-` models
    pub codestral_host: String,
    pub api_key: String,
    pub model: String,
    pub overrides: ModelOverrides,
}

impl MistralProviderConfig {
    pub fn new<K: Into<String>, M: Into<String>>(api_key: K, model: M) -> Self {
        Self {
            host: MISTRAL_HOST.to_string(),
            codestral_host: CODESTRAL_HOST.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            overrides: ModelOverrides::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        let host = if self.model.starts_with("codestral-") {
            &self.codestral_host
        } else {
            &self.host
        };
        host.trim_end_matches('/')
    }
}

#[derive(Clone)]
pub struct BedrockProviderConfig {
    pub model: String,
    pub overrides: ModelOverrides,
    /// The AWS client. Settings loaded from the environment leave it unset and the
    /// embedder attaches one with [`BedrockProviderConfig::with_transport`].
    pub transport: Option<Arc<dyn BedrockTransport>>,
}

impl BedrockProviderConfig {
    pub fn new<M: Into<String>>(model: M) -> Self {
        Self {
            model: model.into(),
            overrides: ModelOverrides::default(),
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn BedrockTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

#[derive(Clone)]
pub struct VsCodeLmProviderConfig {
    pub selector: LmModelSelector,
    pub overrides: ModelOverrides,
    pub host: Option<Arc<dyn LanguageModelHost>>,
}

impl VsCodeLmProviderConfig {
    pub fn new(selector: LmModelSelector) -> Self {
        Self {
            selector,
            overrides: ModelOverrides::default(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: Arc<dyn LanguageModelHost>) -> Self {
        self.host = Some(host);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_flavor_names() {
        assert_eq!(OpenAiFlavor::from_str("openrouter").unwrap(), OpenAiFlavor::OpenRouter);
        assert_eq!(OpenAiFlavor::LmStudio.to_string(), "lmstudio");
        assert!(!OpenAiFlavor::Ollama.requires_api_key());
        assert!(OpenAiFlavor::DeepSeek.requires_api_key());
    }

    #[test]
    fn test_vertex_base_url() {
        let mut config = VertexProviderConfig::new("proj", "token", VERTEX_DEFAULT_MODEL);
        config.region = "europe-west1".to_string();
        assert_eq!(config.base_url(), "https://europe-west1-aiplatform.googleapis.com");
        config.host = Some("http://127.0.0.1:9000/".to_string());
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_mistral_base_url() {
        let config = MistralProviderConfig::new("key", "codestral-latest");
        assert_eq!(config.base_url(), CODESTRAL_HOST);
        let config = MistralProviderConfig::new("key", "mistral-large-latest");
        assert_eq!(config.base_url(), MISTRAL_HOST);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ProviderConfig::Anthropic(AnthropicProviderConfig::new(
            "sk-secret",
            ANTHROPIC_DEFAULT_MODEL,
        ));
        let shown = format!("{:?}", config);
        assert!(shown.contains(ANTHROPIC_DEFAULT_MODEL));
        assert!(!shown.contains("sk-secret"));
    }
}
