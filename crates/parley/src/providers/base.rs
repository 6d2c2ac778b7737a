use async_trait::async_trait;

use crate::errors::ProviderResult;
use crate::models::content::NeutralContentBlock;
use crate::models::message::NeutralMessage;
use crate::models::model_info::ModelSelection;
use crate::stream::ApiStream;
use crate::token_counter::TokenCounter;

/// Base trait for LLM providers (Anthropic, OpenAI, Gemini, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stream a response to `history`. Tool calls in the response are routed as they
    /// complete and their results are part of the stream.
    async fn create_message(
        &self,
        system: &str,
        history: &[NeutralMessage],
    ) -> ProviderResult<ApiStream>;

    /// The resolved model this provider talks to
    fn get_model(&self) -> ModelSelection;

    /// Estimate the tokens `content` will cost. Never fails; handlers with a vendor
    /// counting endpoint fall back to this default when it errors.
    async fn count_tokens(&self, content: &[NeutralContentBlock]) -> usize {
        TokenCounter::new().count_content(content)
    }

    /// A single non-streaming completion of `prompt`
    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::stream::ApiStreamChunk;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_default_count_tokens() {
        let provider = MockProvider::new(Vec::new());
        let content = vec![NeutralContentBlock::text("count me")];
        assert_eq!(
            provider.count_tokens(&content).await,
            TokenCounter::new().count_content(&content)
        );
    }

    #[tokio::test]
    async fn test_provider_as_trait_object() -> anyhow::Result<()> {
        let provider: Box<dyn Provider> =
            Box::new(MockProvider::new(vec![ApiStreamChunk::text("hi")]));
        let chunks: Vec<_> = provider
            .create_message("", &[NeutralMessage::user().with_text("hello")])
            .await?
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(provider.complete_prompt("x").await?, "hi");
        Ok(())
    }
}
