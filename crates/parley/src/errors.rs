use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by provider handlers and their transports.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A required credential or setting is missing. Raised at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{provider} provider is unavailable: {reason}")]
    UnsupportedProvider { provider: String, reason: String },

    /// The vendor answered with a non-2xx status.
    #[error("{vendor} API error: {status} {body}")]
    VendorHttp {
        vendor: String,
        status: u16,
        body: String,
    },

    /// The vendor stream broke or reported an error after it started.
    #[error("{vendor} stream error: {message}")]
    VendorStream { vendor: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn stream<V: Into<String>, M: Into<String>>(vendor: V, message: M) -> Self {
        ProviderError::VendorStream {
            vendor: vendor.into(),
            message: message.into(),
        }
    }

    pub fn configuration<M: Into<String>>(message: M) -> Self {
        ProviderError::Configuration(message.into())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    /// Raised by catalog descriptors whose execution lives in the router.
    #[error("Tool '{0}' must be executed by the tool router")]
    ExecutionDelegated(String),

    #[error("Unrecognized tool call format: {0}")]
    UnrecognizedFormat(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Structural problems found in a conversation history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("tool_result at message {message_index} references unknown tool_use id '{tool_use_id}'")]
    OrphanToolResult {
        message_index: usize,
        tool_use_id: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    /// The configured provider name is unknown or has no handler
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Maps a dotted settings path such as `provider.api_key` to its environment variable.
pub fn to_env_var(field: &str) -> String {
    let field = field.trim_start_matches("provider.");
    format!("PARLEY_PROVIDER__{}", field.replace('.', "__").to_uppercase())
}
