//! Language models hosted by the IDE.
//!
//! The host API is reached through a [`LanguageModelHost`] supplied by the embedder. The
//! handler picks a model with the configured selector on first use and keeps it.
use async_trait::async_trait;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[cfg(test)]
use mockall::automock;

use super::base::Provider;
use super::configs::VsCodeLmProviderConfig;
use super::dispatch::with_tool_dispatch;
use super::utils::register_tools;
use crate::errors::{ProviderError, ProviderResult};
use crate::formats::vscode_lm::{to_vscode_lm_message, LmChatMessage, LmPart};
use crate::formats::{combine_system, split_system};
use crate::models::content::NeutralContentBlock;
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelOverrides, ModelSelection};
use crate::projection::project_history;
use crate::stream::vscode_lm::{VsCodeLmNormalizer, VENDOR};
use crate::stream::{normalize, ApiStream, ApiStreamChunk, EventStream, Usage};
use crate::token_counter::TokenCounter;
use crate::tool_router::ToolRouter;

const SELECTOR_SEPARATOR: &str = "/";
const FALLBACK_MODEL_ID: &str = "vscode-lm";

/// Filter used to pick a chat model from the host. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmModelSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LmModelSelector {
    pub fn model_id(&self) -> String {
        let parts: Vec<&str> = [&self.vendor, &self.family, &self.version, &self.id]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            FALLBACK_MODEL_ID.to_string()
        } else {
            parts.join(SELECTOR_SEPARATOR)
        }
    }
}

/// A chat model the host offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LmChatModel {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub version: String,
    pub max_input_tokens: u32,
}

impl LmChatModel {
    pub fn model_id(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        [&self.vendor, &self.family, &self.version]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(SELECTOR_SEPARATOR)
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            max_tokens: None,
            context_window: self.max_input_tokens,
            supports_images: false,
            supports_prompt_cache: true,
            input_price: Some(0.0),
            output_price: Some(0.0),
            ..ModelInfo::default()
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LanguageModelHost: Send + Sync {
    /// The first model matching `selector`, if any
    async fn select_model(&self, selector: &LmModelSelector)
        -> ProviderResult<Option<LmChatModel>>;

    /// Send a chat request. Response parts are yielded as `{type: text, value}` or
    /// `{type: tool_call, callId, name, input}` objects.
    async fn send_request(
        &self,
        model: &LmChatModel,
        messages: Vec<LmChatMessage>,
    ) -> ProviderResult<EventStream>;

    async fn count_tokens(&self, model: &LmChatModel, text: &str) -> ProviderResult<usize>;
}

lazy_static! {
    static ref ESCAPE_SEQUENCES: Vec<Regex> = vec![
        // OSC, then DCS/APC/PM strings, then CSI and single-character escapes
        Regex::new(r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)").unwrap(),
        Regex::new(r"\x1B[PD_^].*?\x1B\\").unwrap(),
        Regex::new(r"\x1B\[[\d;]*[HfABCDEFGJKST]").unwrap(),
        Regex::new(r"\x1B(?:[@-Z\\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap(),
        Regex::new(r"\x{9B}[0-?]*[ -/]*[@-~]").unwrap(),
    ];
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x09\x0B\x0C\x0E-\x1F\x7F]").unwrap();
    static ref SHELL_NOISE: Regex = Regex::new(r"(?m)^(?:(?:PS )?[A-Z]:\\[^\n]*|;?Cwd=.*)$").unwrap();
    static ref ESCAPED_CODES: Regex = Regex::new(r"\\x[0-9a-fA-F]{2}|\\u[0-9a-fA-F]{4}").unwrap();
    static ref BLANK_RUNS: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// Strip terminal escape sequences and shell prompt noise from captured output.
pub fn clean_terminal_output(text: &str) -> String {
    let mut cleaned = text.replace("\r\n", "\n").replace('\r', "\n");
    for pattern in ESCAPE_SEQUENCES.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = CONTROL_CHARS.replace_all(&cleaned, "");
    let cleaned = SHELL_NOISE.replace_all(&cleaned, "");
    let cleaned = ESCAPED_CODES.replace_all(&cleaned, "");
    BLANK_RUNS.replace_all(&cleaned, "\n\n").trim().to_string()
}

fn clean_message(mut message: LmChatMessage) -> LmChatMessage {
    for part in message.parts.iter_mut() {
        match part {
            LmPart::Text { value } => *value = clean_terminal_output(value),
            LmPart::ToolResult { content, .. } => {
                for value in content.iter_mut() {
                    *value = clean_terminal_output(value);
                }
            }
            LmPart::ToolCall { .. } => {}
        }
    }
    message
}

/// The text the host tokenizes for one message
fn message_text(message: &LmChatMessage) -> String {
    message
        .parts
        .iter()
        .map(|part| match part {
            LmPart::Text { value } => value.clone(),
            LmPart::ToolCall { name, input, .. } => format!("{}{}", name, input),
            LmPart::ToolResult { content, .. } => content.concat(),
        })
        .collect()
}

/// Count with the host, falling back to the local estimate
async fn host_count(host: &dyn LanguageModelHost, model: &LmChatModel, text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match host.count_tokens(model, text).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("{} token counting failed, estimating locally: {}", VENDOR, e);
            TokenCounter::new().count_content(&[NeutralContentBlock::text(text)])
        }
    }
}

/// Follow the response with a usage chunk: the host reports none, so input and output
/// are counted with the host tokenizer once the response ends.
fn with_usage(
    mut inner: ApiStream,
    host: Arc<dyn LanguageModelHost>,
    model: LmChatModel,
    input_tokens: usize,
) -> ApiStream {
    Box::pin(async_stream::try_stream! {
        let mut output = String::new();
        while let Some(chunk) = inner.next().await {
            let chunk = chunk?;
            match &chunk {
                ApiStreamChunk::Text { text } => output.push_str(text),
                ApiStreamChunk::ToolUse { id, name, input } => output.push_str(
                    &json!({"type": "tool_call", "name": name, "arguments": input, "callId": id})
                        .to_string(),
                ),
                _ => {}
            }
            yield chunk;
        }
        let output_tokens = host_count(host.as_ref(), &model, &output).await;
        yield ApiStreamChunk::usage(Usage::new(input_tokens as u64, output_tokens as u64));
    })
}

pub struct VsCodeLmProvider {
    host: Arc<dyn LanguageModelHost>,
    selector: LmModelSelector,
    overrides: ModelOverrides,
    client: OnceCell<LmChatModel>,
    router: Arc<dyn ToolRouter>,
}

impl VsCodeLmProvider {
    pub fn new(config: VsCodeLmProviderConfig, router: Arc<dyn ToolRouter>) -> ProviderResult<Self> {
        let host = config.host.ok_or_else(|| {
            ProviderError::configuration("VS Code LM requires a language model host")
        })?;
        register_tools(&router);

        Ok(Self {
            host,
            selector: config.selector,
            overrides: config.overrides,
            client: OnceCell::new(),
            router,
        })
    }

    async fn client(&self) -> ProviderResult<&LmChatModel> {
        self.client
            .get_or_try_init(|| async {
                let model = self.host.select_model(&self.selector).await?;
                let model = model.ok_or_else(|| {
                    ProviderError::configuration(format!(
                        "No language model matches selector {}",
                        self.selector.model_id()
                    ))
                })?;
                tracing::debug!("Selected {} model {}", VENDOR, model.model_id());
                Ok(model)
            })
            .await
    }

    fn messages(&self, system: &str, history: &[NeutralMessage]) -> Vec<LmChatMessage> {
        let projected = project_history(history, &self.get_model().info.capabilities());
        let (lifted, rest) = split_system(&projected);
        let system = combine_system(system, lifted);

        // the host has no system role; the prompt leads as an assistant message
        let mut messages = Vec::with_capacity(rest.len() + 1);
        messages.push(LmChatMessage::assistant(vec![LmPart::text(
            clean_terminal_output(&system),
        )]));
        messages.extend(
            rest.into_iter()
                .map(|message| clean_message(to_vscode_lm_message(message))),
        );
        messages
    }
}

#[async_trait]
impl Provider for VsCodeLmProvider {
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        let model = self.client().await?.clone();
        let messages = self.messages(system, history);

        let mut input_tokens = 0;
        for message in &messages {
            input_tokens += host_count(self.host.as_ref(), &model, &message_text(message)).await;
        }

        let events = self.host.send_request(&model, messages).await?;
        let stream = with_usage(
            normalize(events, VsCodeLmNormalizer),
            self.host.clone(),
            model,
            input_tokens,
        );
        Ok(with_tool_dispatch(stream, self.router.clone()))
    }

    fn get_model(&self) -> ModelSelection {
        match self.client.get() {
            Some(model) => {
                ModelSelection::resolve(&model.model_id(), model.info(), &self.overrides, None)
            }
            None => {
                tracing::debug!("No {} model selected yet, using fallback model info", VENDOR);
                ModelSelection::resolve(
                    &self.selector.model_id(),
                    ModelInfo::default(),
                    &self.overrides,
                    None,
                )
            }
        }
    }

    async fn count_tokens(&self, content: &[NeutralContentBlock]) -> usize {
        let text: String = content
            .iter()
            .map(|block| match block {
                NeutralContentBlock::Text { text } => text.as_str(),
                block if block.is_image() => "[IMAGE]",
                _ => "",
            })
            .collect();
        if text.is_empty() {
            return TokenCounter::new().count_content(content);
        }
        let counted = match self.client().await {
            Ok(model) => self.host.count_tokens(model, &text).await,
            Err(e) => Err(e),
        };
        match counted {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("{} token counting unavailable, estimating locally: {}", VENDOR, e);
                TokenCounter::new().count_content(content)
            }
        }
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let model = self.client().await?;
        let mut events = self
            .host
            .send_request(model, vec![LmChatMessage::user(vec![LmPart::text(prompt)])])
            .await?;
        let mut result = String::new();
        while let Some(event) = events.next().await {
            let event = event?;
            if event["type"] == "text" {
                if let Some(value) = event["value"].as_str() {
                    result.push_str(value);
                }
            }
        }
        Ok(result)
    }
}
