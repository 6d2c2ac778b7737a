use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};

/// Default response budget for Claude models when the table does not name one
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 8192;
pub const MIN_THINKING_BUDGET: u32 = 1024;
/// Anthropic only accepts this temperature while extended thinking is enabled
pub const THINKING_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const THINKING_SUFFIX: &str = ":thinking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Static capabilities and limits of one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub max_tokens: Option<u32>,
    pub context_window: u32,
    pub supports_images: bool,
    pub supports_prompt_cache: bool,
    pub supports_computer_use: bool,
    pub supports_temperature: bool,
    pub thinking: bool,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub cache_writes_price: Option<f64>,
    pub cache_reads_price: Option<f64>,
}

/// The subset of model capabilities that shapes conversation content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub supports_images: bool,
    pub supports_prompt_cache: bool,
    pub supports_computer_use: bool,
}

const SANE_DEFAULTS: ModelInfo = ModelInfo {
    max_tokens: None,
    context_window: 128_000,
    supports_images: true,
    supports_prompt_cache: false,
    supports_computer_use: false,
    supports_temperature: true,
    thinking: false,
    reasoning_effort: None,
    input_price: None,
    output_price: None,
    cache_writes_price: None,
    cache_reads_price: None,
};

const CLAUDE: ModelInfo = ModelInfo {
    max_tokens: Some(ANTHROPIC_DEFAULT_MAX_TOKENS),
    context_window: 200_000,
    supports_prompt_cache: true,
    input_price: Some(3.0),
    output_price: Some(15.0),
    cache_writes_price: Some(3.75),
    cache_reads_price: Some(0.3),
    ..SANE_DEFAULTS
};

const GEMINI: ModelInfo = ModelInfo {
    max_tokens: Some(8192),
    context_window: 1_048_576,
    ..SANE_DEFAULTS
};

const MISTRAL: ModelInfo = ModelInfo {
    max_tokens: Some(8192),
    context_window: 131_000,
    supports_images: false,
    ..SANE_DEFAULTS
};

/// Known models keyed by exact id. Virtual ids (`:thinking`) have their own rows.
static MODEL_TABLE: &[(&str, ModelInfo)] = &[
    (
        "claude-3-7-sonnet-20250219:thinking",
        ModelInfo {
            max_tokens: Some(128_000),
            supports_computer_use: true,
            thinking: true,
            ..CLAUDE
        },
    ),
    (
        "claude-3-7-sonnet-20250219",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "claude-3-5-sonnet-20241022",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "claude-3-5-haiku-20241022",
        ModelInfo {
            supports_images: false,
            input_price: Some(1.0),
            output_price: Some(5.0),
            cache_writes_price: Some(1.25),
            cache_reads_price: Some(0.1),
            ..CLAUDE
        },
    ),
    (
        "claude-3-opus-20240229",
        ModelInfo {
            max_tokens: Some(4096),
            input_price: Some(15.0),
            output_price: Some(75.0),
            cache_writes_price: Some(18.75),
            cache_reads_price: Some(1.5),
            ..CLAUDE
        },
    ),
    (
        "claude-3-haiku-20240307",
        ModelInfo {
            max_tokens: Some(4096),
            input_price: Some(0.25),
            output_price: Some(1.25),
            cache_writes_price: Some(0.3),
            cache_reads_price: Some(0.03),
            ..CLAUDE
        },
    ),
    (
        "claude-3-7-sonnet@20250219:thinking",
        ModelInfo {
            max_tokens: Some(64_000),
            supports_computer_use: true,
            thinking: true,
            ..CLAUDE
        },
    ),
    (
        "claude-3-7-sonnet@20250219",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "claude-3-5-sonnet-v2@20241022",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "anthropic.claude-3-7-sonnet-20250219-v1:0",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "anthropic.claude-3-5-sonnet-20241022-v2:0",
        ModelInfo {
            supports_computer_use: true,
            ..CLAUDE
        },
    ),
    (
        "amazon.nova-pro-v1:0",
        ModelInfo {
            max_tokens: Some(5000),
            context_window: 300_000,
            input_price: Some(0.8),
            output_price: Some(3.2),
            ..SANE_DEFAULTS
        },
    ),
    (
        "gpt-4o",
        ModelInfo {
            max_tokens: Some(16_384),
            input_price: Some(2.5),
            output_price: Some(10.0),
            ..SANE_DEFAULTS
        },
    ),
    (
        "gpt-4o-mini",
        ModelInfo {
            max_tokens: Some(16_384),
            input_price: Some(0.15),
            output_price: Some(0.6),
            ..SANE_DEFAULTS
        },
    ),
    (
        "o3-mini",
        ModelInfo {
            max_tokens: Some(100_000),
            context_window: 200_000,
            supports_images: false,
            supports_temperature: false,
            reasoning_effort: Some(ReasoningEffort::Medium),
            ..SANE_DEFAULTS
        },
    ),
    ("gemini-2.0-flash-001", GEMINI),
    (
        "gemini-2.0-flash-thinking-exp-01-21",
        ModelInfo {
            max_tokens: Some(65_536),
            ..GEMINI
        },
    ),
    (
        "gemini-1.5-pro-002",
        ModelInfo {
            context_window: 2_097_152,
            ..GEMINI
        },
    ),
    (
        "codestral-latest",
        ModelInfo {
            context_window: 256_000,
            ..MISTRAL
        },
    ),
    (
        "mistral-large-latest",
        ModelInfo {
            max_tokens: Some(131_000),
            ..MISTRAL
        },
    ),
    (
        "pixtral-large-latest",
        ModelInfo {
            max_tokens: Some(131_000),
            supports_images: true,
            ..MISTRAL
        },
    ),
];

/// Capability changes applied when a model id matches a pattern
#[derive(Debug, Clone, Copy, Default)]
struct CapabilityOverride {
    thinking: Option<bool>,
    supports_prompt_cache: Option<bool>,
    supports_computer_use: Option<bool>,
    supports_temperature: Option<bool>,
    max_tokens: Option<u32>,
    thinking_max_tokens: Option<u32>,
    reasoning_effort: Option<ReasoningEffort>,
    cache_prices: Option<(f64, f64)>,
}

impl CapabilityOverride {
    fn apply(&self, info: &mut ModelInfo) {
        if let Some(thinking) = self.thinking {
            info.thinking = thinking;
        }
        if let Some(cache) = self.supports_prompt_cache {
            info.supports_prompt_cache = cache;
        }
        if let Some(computer_use) = self.supports_computer_use {
            info.supports_computer_use = computer_use;
        }
        if let Some(temperature) = self.supports_temperature {
            info.supports_temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            info.max_tokens = Some(match (info.thinking, self.thinking_max_tokens) {
                (true, Some(thinking_max)) => thinking_max,
                _ => max_tokens,
            });
        }
        if let Some(effort) = self.reasoning_effort {
            info.reasoning_effort = Some(effort);
        }
        if let Some((writes, reads)) = self.cache_prices {
            info.cache_writes_price = Some(writes);
            info.cache_reads_price = Some(reads);
        }
    }
}

lazy_static! {
    /// Ordered pattern table for ids missing from `MODEL_TABLE`. Later rows win.
    static ref MODEL_PATTERNS: Vec<(Regex, CapabilityOverride)> = {
        let rows: Vec<(&str, CapabilityOverride)> = vec![
            (
                r"(:thinking|-thinking$)",
                CapabilityOverride {
                    thinking: Some(true),
                    ..Default::default()
                },
            ),
            (
                r"claude",
                CapabilityOverride {
                    supports_prompt_cache: Some(true),
                    cache_prices: Some((3.75, 0.3)),
                    ..Default::default()
                },
            ),
            (
                r"claude.*opus",
                CapabilityOverride {
                    cache_prices: Some((18.75, 1.5)),
                    ..Default::default()
                },
            ),
            (
                r"claude.*haiku",
                CapabilityOverride {
                    cache_prices: Some((1.25, 0.1)),
                    ..Default::default()
                },
            ),
            (
                r"claude.*sonnet",
                CapabilityOverride {
                    supports_computer_use: Some(true),
                    ..Default::default()
                },
            ),
            (
                r"claude.*sonnet.*20240620",
                CapabilityOverride {
                    supports_computer_use: Some(false),
                    ..Default::default()
                },
            ),
            (
                r"claude-3[.-]7",
                CapabilityOverride {
                    supports_computer_use: Some(true),
                    max_tokens: Some(8192),
                    thinking_max_tokens: Some(64_000),
                    ..Default::default()
                },
            ),
            (
                r"claude-3[.-]5",
                CapabilityOverride {
                    max_tokens: Some(8192),
                    ..Default::default()
                },
            ),
            (
                r"(^o3-mini|openai/o3-mini)",
                CapabilityOverride {
                    supports_temperature: Some(false),
                    ..Default::default()
                },
            ),
            (
                r"(^deepseek/deepseek-r1|^perplexity/sonar-reasoning$)",
                CapabilityOverride {
                    reasoning_effort: Some(ReasoningEffort::High),
                    ..Default::default()
                },
            ),
        ];
        rows.into_iter()
            .filter_map(|(pattern, capability)| {
                Regex::new(pattern).ok().map(|regex| (regex, capability))
            })
            .collect()
    };
}

impl Default for ModelInfo {
    fn default() -> Self {
        SANE_DEFAULTS
    }
}

impl ModelInfo {
    /// Look up a model by exact id, falling back to pattern detection over sane defaults
    pub fn for_model(model_id: &str) -> Self {
        Self::from_table(model_id).unwrap_or_else(|| Self::from_patterns(model_id, SANE_DEFAULTS))
    }

    pub fn from_table(model_id: &str) -> Option<Self> {
        MODEL_TABLE
            .iter()
            .find(|(id, _)| *id == model_id)
            .map(|(_, info)| *info)
    }

    /// Apply the pattern table to `base`
    pub fn from_patterns(model_id: &str, base: ModelInfo) -> Self {
        let mut info = base;
        for (pattern, capability) in MODEL_PATTERNS.iter() {
            if pattern.is_match(model_id) {
                capability.apply(&mut info);
            }
        }
        info
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_images: self.supports_images,
            supports_prompt_cache: self.supports_prompt_cache,
            supports_computer_use: self.supports_computer_use,
        }
    }
}

/// Strip a virtual variant suffix, leaving the id the vendor knows
pub fn base_model_id(model_id: &str) -> &str {
    model_id.strip_suffix(THINKING_SUFFIX).unwrap_or(model_id)
}

pub fn is_thinking_model(model_id: &str) -> bool {
    model_id.ends_with(THINKING_SUFFIX) || model_id.ends_with("-thinking")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn to_anthropic(&self) -> Value {
        json!({"type": "enabled", "budget_tokens": self.budget_tokens})
    }
}

/// Caller-supplied overrides for response parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverrides {
    pub max_tokens: Option<u32>,
    pub max_thinking_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// The resolved model a handler talks to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSelection {
    /// The concrete id sent to the vendor
    pub id: String,
    /// The id as configured, possibly carrying a variant suffix
    pub virtual_id: String,
    pub info: ModelInfo,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    pub thinking: Option<ThinkingConfig>,
}

impl ModelSelection {
    pub fn resolve(
        model_id: &str,
        info: ModelInfo,
        overrides: &ModelOverrides,
        default_max_tokens: Option<u32>,
    ) -> Self {
        let mut max_tokens = info.max_tokens.or(default_max_tokens);
        let mut temperature = overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        let mut thinking = None;

        if info.thinking {
            // custom max tokens are honored only for thinking models
            max_tokens = overrides.max_tokens.or(max_tokens);
            let ceiling =
                (max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS) as f64 * 0.8).floor() as u32;
            let budget = overrides
                .max_thinking_tokens
                .unwrap_or(ceiling)
                .min(ceiling)
                .max(MIN_THINKING_BUDGET);
            thinking = Some(ThinkingConfig {
                budget_tokens: budget,
            });
            temperature = THINKING_TEMPERATURE;
        }

        ModelSelection {
            id: base_model_id(model_id).to_string(),
            virtual_id: model_id.to_string(),
            info,
            max_tokens,
            temperature,
            thinking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup_and_pattern_fallback() {
        let info = ModelInfo::for_model("claude-3-5-haiku-20241022");
        assert!(!info.supports_images);
        assert_eq!(info.cache_reads_price, Some(0.1));

        let info = ModelInfo::for_model("anthropic/claude-3.7-sonnet:thinking");
        assert!(info.thinking);
        assert!(info.supports_prompt_cache);
        assert!(info.supports_computer_use);
        assert_eq!(info.max_tokens, Some(64_000));

        let info = ModelInfo::for_model("anthropic/claude-3.5-sonnet-20240620");
        assert!(!info.supports_computer_use);
        assert_eq!(info.max_tokens, Some(8192));

        let info = ModelInfo::for_model("openai/o3-mini-high");
        assert!(!info.supports_temperature);

        let info = ModelInfo::for_model("deepseek/deepseek-r1-distill");
        assert_eq!(info.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn test_base_model_id() {
        assert_eq!(
            base_model_id("claude-3-7-sonnet-20250219:thinking"),
            "claude-3-7-sonnet-20250219"
        );
        assert_eq!(
            base_model_id("anthropic.claude-3-7-sonnet-20250219-v1:0"),
            "anthropic.claude-3-7-sonnet-20250219-v1:0"
        );
    }

    #[test]
    fn test_thinking_resolution() {
        let id = "claude-3-7-sonnet-20250219:thinking";
        let selection = ModelSelection::resolve(
            id,
            ModelInfo::for_model(id),
            &ModelOverrides {
                temperature: Some(0.2),
                ..Default::default()
            },
            Some(ANTHROPIC_DEFAULT_MAX_TOKENS),
        );
        assert_eq!(selection.id, "claude-3-7-sonnet-20250219");
        assert_eq!(selection.virtual_id, id);
        assert_eq!(selection.max_tokens, Some(128_000));
        assert_eq!(selection.temperature, THINKING_TEMPERATURE);
        assert_eq!(
            selection.thinking,
            Some(ThinkingConfig {
                budget_tokens: 102_400
            })
        );
    }

    #[test]
    fn test_thinking_budget_clamps() {
        let info = ModelInfo {
            thinking: true,
            ..ModelInfo::default()
        };

        let overrides = ModelOverrides {
            max_tokens: Some(16_384),
            max_thinking_tokens: Some(100_000),
            temperature: None,
        };
        let selection = ModelSelection::resolve("m", info, &overrides, None);
        assert_eq!(selection.thinking.unwrap().budget_tokens, 13_107);

        let overrides = ModelOverrides {
            max_tokens: Some(16_384),
            max_thinking_tokens: Some(10),
            temperature: None,
        };
        let selection = ModelSelection::resolve("m", info, &overrides, None);
        assert_eq!(selection.thinking.unwrap().budget_tokens, MIN_THINKING_BUDGET);

        // lower bound wins when the ceiling is below it
        let overrides = ModelOverrides {
            max_tokens: Some(1000),
            ..Default::default()
        };
        let selection = ModelSelection::resolve("m", info, &overrides, None);
        assert_eq!(selection.thinking.unwrap().budget_tokens, MIN_THINKING_BUDGET);
    }

    #[test]
    fn test_non_thinking_defaults() {
        let selection = ModelSelection::resolve(
            "gpt-4o",
            ModelInfo::for_model("gpt-4o"),
            &ModelOverrides {
                max_tokens: Some(10),
                ..Default::default()
            },
            None,
        );
        assert_eq!(selection.max_tokens, Some(16_384));
        assert_eq!(selection.temperature, DEFAULT_TEMPERATURE);
        assert!(selection.thinking.is_none());
    }
}
