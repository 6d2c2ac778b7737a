use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

use crate::errors::ProviderResult;
use crate::models::content::NeutralContentBlock;
use crate::models::message::NeutralMessage;
use crate::models::model_info::{ModelInfo, ModelOverrides, ModelSelection};
use crate::providers::base::Provider;
use crate::stream::{ApiStream, ApiStreamChunk};
use crate::token_counter::TokenCounter;

pub const MOCK_MODEL: &str = "mock-model";

/// A mock provider that replays pre-configured chunks for testing
pub struct MockProvider {
    chunks: Vec<ApiStreamChunk>,
    model: ModelSelection,
    requests: Arc<Mutex<Vec<Vec<NeutralMessage>>>>,
}

impl MockProvider {
    /// Every call to `create_message` yields `chunks`
    pub fn new(chunks: Vec<ApiStreamChunk>) -> Self {
        Self::with_model(chunks, ModelInfo::default())
    }

    pub fn with_model(chunks: Vec<ApiStreamChunk>, info: ModelInfo) -> Self {
        Self {
            chunks,
            model: ModelSelection::resolve(MOCK_MODEL, info, &ModelOverrides::default(), None),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The histories passed to `create_message`, oldest first
    pub fn requests(&self) -> Vec<Vec<NeutralMessage>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn create_message(
        &self,
        _system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(history.to_vec());
        let chunks: Vec<ProviderResult<ApiStreamChunk>> =
            self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn get_model(&self) -> ModelSelection {
        self.model.clone()
    }

    async fn count_tokens(&self, content: &[NeutralContentBlock]) -> usize {
        TokenCounter::new().count_content(content)
    }

    async fn complete_prompt(&self, _prompt: &str) -> ProviderResult<String> {
        Ok(self
            .chunks
            .iter()
            .filter_map(|chunk| match chunk {
                ApiStreamChunk::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect())
    }
}
