use std::borrow::Cow;

use anyhow::Result;
use futures::{stream, StreamExt};
use parley::{
    errors::ProviderError,
    formats::{anthropic, gemini, openai},
    models::{
        content::{NeutralContentBlock, NeutralMessageContent},
        message::{validate_history, NeutralMessage},
        model_info::ModelInfo,
        role::Role,
    },
    projection::{project, project_history, IMAGE_PLACEHOLDER},
    providers::{base::Provider, mock::MockProvider},
    sliding_window::{truncate_conversation, truncate_conversation_if_needed, TruncateOptions},
    stream::{anthropic::AnthropicNormalizer, normalize, ApiStreamChunk, Usage},
};
use serde_json::{json, Value};

/// A task conversation as the orchestrator stores it
fn task_history() -> Vec<NeutralMessage> {
    serde_json::from_value(json!([
        {"role": "user", "content": [
            {"type": "text", "text": "Fix the failing test in src/lib.rs"},
            {"type": "image_base64", "source": {"media_type": "image/png", "data": "iVBORw0KGgo="}}
        ]},
        {"role": "assistant", "content": [
            {"type": "text", "text": "Reading the file first."},
            {"type": "tool_use", "id": "toolu_01", "name": "read_file", "input": {"path": "src/lib.rs"}}
        ]},
        {"role": "user", "content": [
            {"type": "tool_result", "tool_use_id": "toolu_01", "content": "pub fn add(a: i32, b: i32) -> i32 { a - b }"}
        ]},
        {"role": "assistant", "content": "The subtraction should be an addition."}
    ]))
    .expect("history fixture parses")
}

fn exchange(len: usize) -> Vec<NeutralMessage> {
    (0..len)
        .map(|i| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            NeutralMessage::new(role, format!("turn {}", i))
        })
        .collect()
}

#[test]
fn test_history_fixture_is_valid() {
    let history = task_history();
    assert_eq!(history.len(), 4);
    assert!(validate_history(&history).is_ok());
    assert!(history[1].has_tool_use());
}

#[test]
fn test_projection_for_text_only_model() {
    let info = ModelInfo::for_model("claude-3-5-haiku-20241022");
    let caps = info.capabilities();
    assert!(!caps.supports_images);

    let projected = project_history(&task_history(), &caps);
    let first = projected[0].content.blocks();
    assert_eq!(first[1], NeutralContentBlock::text(IMAGE_PLACEHOLDER));
    assert_eq!(project_history(&projected, &caps), projected);
}

#[test]
fn test_lone_image_becomes_placeholder() {
    let content = vec![NeutralContentBlock::image_base64("image/jpeg", "/9j/4AAQ")];
    let caps = ModelInfo::for_model("claude-3-5-haiku-20241022").capabilities();
    assert_eq!(
        project(&content, &caps),
        vec![NeutralContentBlock::text(IMAGE_PLACEHOLDER)]
    );
}

#[test]
fn test_vendor_round_trips_keep_tool_payloads() {
    let history = project_history(
        &task_history(),
        &ModelInfo::for_model("claude-3-5-haiku-20241022").capabilities(),
    );

    let restored = anthropic::from_anthropic(&anthropic::to_anthropic(&history));
    for (original, back) in history.iter().zip(restored.iter()) {
        assert_eq!(original.role, back.role);
        assert_eq!(original.content, back.content);
    }

    let restored = openai::from_openai(&openai::to_openai(&history));
    let tool_use = restored
        .iter()
        .flat_map(|message| message.content.blocks().into_owned())
        .find(|block| matches!(block, NeutralContentBlock::ToolUse { .. }))
        .expect("tool use survives the OpenAI round trip");
    assert_eq!(
        tool_use,
        NeutralContentBlock::tool_use("toolu_01", "read_file", json!({"path": "src/lib.rs"}))
    );

    let contents: Vec<Value> = gemini::to_gemini(&history);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(
        contents[1]["parts"][1]["functionCall"],
        json!({"name": "read_file", "args": {"path": "src/lib.rs"}})
    );
}

#[tokio::test]
async fn test_anthropic_stream_keeps_usage_first() -> Result<()> {
    let events = vec![
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 5, "output_tokens": 0}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": "Hello"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
    ];
    let chunks: Vec<ApiStreamChunk> = normalize(
        stream::iter(events.into_iter().map(Ok::<Value, ProviderError>)),
        AnthropicNormalizer::new("Anthropic"),
    )
    .map(|chunk| chunk.unwrap())
    .collect()
    .await;

    assert_eq!(
        chunks,
        vec![
            ApiStreamChunk::usage(Usage::new(5, 0)),
            ApiStreamChunk::text("Hello"),
            ApiStreamChunk::text(" world"),
        ]
    );
    Ok(())
}

#[test]
fn test_truncate_eleven_messages() {
    let history = exchange(11);
    let truncated = truncate_conversation(&history, 0.5);
    assert_eq!(truncated.len(), 7);
    assert_eq!(truncated[0], history[0]);
    assert_eq!(&truncated[1..], &history[5..]);
}

#[tokio::test]
async fn test_truncate_if_needed_with_provider_counter() -> Result<()> {
    let provider = MockProvider::new(Vec::new());
    let history = exchange(9);

    let fits = truncate_conversation_if_needed(TruncateOptions {
        history: &history,
        total_tokens: 100,
        context_window: 128_000,
        max_tokens: None,
        provider: &provider,
    })
    .await;
    assert!(matches!(fits, Cow::Borrowed(_)));
    assert!(std::ptr::eq(fits.as_ptr(), history.as_ptr()));

    let overflow = truncate_conversation_if_needed(TruncateOptions {
        history: &history,
        total_tokens: 7_000,
        context_window: 8_192,
        max_tokens: Some(2_048),
        provider: &provider,
    })
    .await;
    assert_eq!(overflow.len(), 5);
    assert_eq!(overflow[0], history[0]);
    assert_eq!(overflow.last(), history.last());
    Ok(())
}

#[tokio::test]
async fn test_token_counts_grow_with_content() {
    let provider = MockProvider::new(Vec::new());
    let mut content = vec![NeutralContentBlock::text("Summarize the diff")];
    let mut previous = provider.count_tokens(&content).await;

    for block in [
        NeutralContentBlock::text(" and list risky changes"),
        NeutralContentBlock::image_url("https://example.com/diagram.png"),
        NeutralContentBlock::tool_use("toolu_9", "list_files", json!({"path": "."})),
    ] {
        content.push(block);
        let count = provider.count_tokens(&content).await;
        assert!(count >= previous);
        previous = count;
    }

    let empty = NeutralMessageContent::Blocks(Vec::new());
    assert!(empty.is_empty());
}
