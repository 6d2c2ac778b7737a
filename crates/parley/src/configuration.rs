//! Provider settings loaded from `PARLEY_`-prefixed environment variables or TOML.
//!
//! `PARLEY_PROVIDER__TYPE=anthropic` selects the provider and the remaining
//! `PARLEY_PROVIDER__*` variables fill its fields.
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

use crate::errors::{to_env_var, ConfigError};
use crate::models::model_info::ModelOverrides;
use crate::providers::configs::{
    AnthropicProviderConfig, BedrockProviderConfig, GeminiProviderConfig, MistralProviderConfig,
    OpenAiFlavor, OpenAiProviderConfig, ProviderConfig, VertexProviderConfig,
    VsCodeLmProviderConfig, ANTHROPIC_DEFAULT_MODEL, ANTHROPIC_HOST, BEDROCK_DEFAULT_MODEL,
    CODESTRAL_HOST, GEMINI_DEFAULT_MODEL, GEMINI_HOST, MISTRAL_DEFAULT_MODEL, MISTRAL_HOST,
    VERTEX_DEFAULT_MODEL, VERTEX_DEFAULT_REGION,
};
use crate::providers::factory::ProviderType;
use crate::providers::vscode_lm::LmModelSelector;

lazy_static! {
    static ref MISSING_FIELD: Regex = Regex::new(r"missing field `([^`]+)`").unwrap();
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        max_thinking_tokens: Option<u32>,
    },
    /// Any OpenAI-compatible service; `flavor` picks defaults and request quirks
    OpenAi {
        #[serde(default)]
        flavor: OpenAiFlavor,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        max_thinking_tokens: Option<u32>,
    },
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Vertex {
        project_id: String,
        #[serde(default = "default_vertex_region")]
        region: String,
        access_token: String,
        #[serde(default = "default_vertex_model")]
        model: String,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        max_thinking_tokens: Option<u32>,
    },
    Mistral {
        #[serde(default = "default_mistral_host")]
        host: String,
        #[serde(default = "default_codestral_host")]
        codestral_host: String,
        api_key: String,
        #[serde(default = "default_mistral_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
    },
    /// The AWS client is attached afterwards with `BedrockProviderConfig::with_transport`
    Bedrock {
        #[serde(default = "default_bedrock_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        max_thinking_tokens: Option<u32>,
    },
    /// The host is attached afterwards with `VsCodeLmProviderConfig::with_host`
    #[serde(rename = "vscode-lm")]
    VsCodeLm {
        #[serde(default)]
        vendor: Option<String>,
        #[serde(default)]
        family: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::OpenAi { flavor, .. } => (*flavor).into(),
            ProviderSettings::Gemini { .. } => ProviderType::Gemini,
            ProviderSettings::Vertex { .. } => ProviderType::Vertex,
            ProviderSettings::Mistral { .. } => ProviderType::Mistral,
            ProviderSettings::Bedrock { .. } => ProviderType::Bedrock,
            ProviderSettings::VsCodeLm { .. } => ProviderType::VsCodeLm,
        }
    }

    // Convert to the handler configuration
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                max_thinking_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                overrides: ModelOverrides {
                    max_tokens,
                    max_thinking_tokens,
                    temperature,
                },
            }),
            ProviderSettings::OpenAi {
                flavor,
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                max_thinking_tokens,
            } => {
                let mut config = OpenAiProviderConfig::new(
                    flavor,
                    api_key,
                    model.unwrap_or_else(|| flavor.default_model().to_string()),
                );
                if let Some(host) = host {
                    config.host = host;
                }
                config.overrides = ModelOverrides {
                    max_tokens,
                    max_thinking_tokens,
                    temperature,
                };
                ProviderConfig::OpenAi(config)
            }
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key,
                model,
                overrides: ModelOverrides {
                    max_tokens,
                    temperature,
                    ..Default::default()
                },
            }),
            ProviderSettings::Vertex {
                project_id,
                region,
                access_token,
                model,
                host,
                temperature,
                max_tokens,
                max_thinking_tokens,
            } => ProviderConfig::Vertex(VertexProviderConfig {
                project_id,
                region,
                access_token,
                model,
                host,
                overrides: ModelOverrides {
                    max_tokens,
                    max_thinking_tokens,
                    temperature,
                },
            }),
            ProviderSettings::Mistral {
                host,
                codestral_host,
                api_key,
                model,
                temperature,
            } => ProviderConfig::Mistral(MistralProviderConfig {
                host,
                codestral_host,
                api_key,
                model,
                overrides: ModelOverrides {
                    temperature,
                    ..Default::default()
                },
            }),
            ProviderSettings::Bedrock {
                model,
                temperature,
                max_tokens,
                max_thinking_tokens,
            } => {
                let mut config = BedrockProviderConfig::new(model);
                config.overrides = ModelOverrides {
                    max_tokens,
                    max_thinking_tokens,
                    temperature,
                };
                ProviderConfig::Bedrock(config)
            }
            ProviderSettings::VsCodeLm {
                vendor,
                family,
                version,
                id,
            } => ProviderConfig::VsCodeLm(VsCodeLmProviderConfig::new(LmModelSelector {
                vendor,
                family,
                version,
                id,
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
}

impl Settings {
    /// Load from the environment
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate(Config::builder())
    }

    /// Load from inline TOML, with the environment layered on top
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::load_and_validate(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    /// Load from a TOML file, with the environment layered on top
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_and_validate(
            Config::builder().add_source(File::from(path.as_ref()).format(FileFormat::Toml)),
        )
    }

    fn load_and_validate(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let builder = builder.add_source(
            Environment::with_prefix("PARLEY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        let mut config = builder.clone().build()?;

        // Every OpenAI-compatible name is served by the `openai` settings variant
        if let Ok(name) = config.get_string("provider.type") {
            let provider_type = ProviderType::from_name(&name)?;
            match provider_type.openai_flavor() {
                Some(flavor) if provider_type != ProviderType::OpenAi => {
                    config = builder
                        .set_override("provider.type", "openai")?
                        .set_override("provider.flavor", flavor.to_string())?
                        .build()?;
                }
                _ => {}
            }
        }

        let result: Result<Self, config::ConfigError> = config.try_deserialize();
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let field = match &err {
                    config::ConfigError::NotFound(field) => Some(field.clone()),
                    other => MISSING_FIELD
                        .captures(&other.to_string())
                        .and_then(|caps| caps.get(1))
                        .map(|field| field.as_str().to_string()),
                };
                match field.as_deref() {
                    // nothing under provider at all: the type is what is missing
                    Some("provider") => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var("type"),
                    }),
                    Some(field) => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }),
                    None => Err(ConfigError::Other(err)),
                }
            }
        }
    }
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_DEFAULT_MODEL.to_string()
}

fn default_gemini_host() -> String {
    GEMINI_HOST.to_string()
}

fn default_gemini_model() -> String {
    GEMINI_DEFAULT_MODEL.to_string()
}

fn default_vertex_region() -> String {
    VERTEX_DEFAULT_REGION.to_string()
}

fn default_vertex_model() -> String {
    VERTEX_DEFAULT_MODEL.to_string()
}

fn default_mistral_host() -> String {
    MISTRAL_HOST.to_string()
}

fn default_codestral_host() -> String {
    CODESTRAL_HOST.to_string()
}

fn default_mistral_model() -> String {
    MISTRAL_DEFAULT_MODEL.to_string()
}

fn default_bedrock_model() -> String {
    BEDROCK_DEFAULT_MODEL.to_string()
}
