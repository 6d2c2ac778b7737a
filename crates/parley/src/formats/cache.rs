//! Prompt-cache annotation for Anthropic-style requests
//!
//! Anthropic accepts at most four `cache_control` breakpoints per request. The system prompt
//! gets one, and the last text block of each of the final two user messages gets one, so
//! the previous turn is read from cache and the newest turn is written for the next call.
//! Assistant messages are never marked.
use serde_json::{json, Value};

pub const MAX_CACHE_MARKERS: usize = 4;
/// How many trailing user messages receive a breakpoint
pub const CACHED_USER_MESSAGES: usize = 2;

pub fn ephemeral() -> Value {
    json!({"type": "ephemeral"})
}

/// The system prompt as a single text block, optionally marked cacheable
pub fn system_blocks(system: &str, cache: bool) -> Vec<Value> {
    if system.is_empty() {
        return Vec::new();
    }
    let mut block = json!({"type": "text", "text": system});
    if cache {
        block["cache_control"] = ephemeral();
    }
    vec![block]
}

fn is_marked(block: &Value) -> bool {
    block.get("cache_control").is_some()
}

/// Count the breakpoints already present in a request
pub fn count_cache_markers(system: &[Value], messages: &[Value]) -> usize {
    let in_messages: usize = messages
        .iter()
        .filter_map(|message| message["content"].as_array())
        .map(|blocks| blocks.iter().filter(|block| is_marked(block)).count())
        .sum();
    system.iter().filter(|block| is_marked(block)).count() + in_messages
}

/// Mark the last text block of the final two user messages, never exceeding
/// `MAX_CACHE_MARKERS` across `system` and `messages` together.
pub fn annotate_messages(system: &[Value], mut messages: Vec<Value>) -> Vec<Value> {
    let mut budget = MAX_CACHE_MARKERS.saturating_sub(count_cache_markers(system, &messages));

    let user_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message["role"] == "user")
        .map(|(index, _)| index)
        .collect();

    for &index in user_indices.iter().rev().take(CACHED_USER_MESSAGES) {
        if budget == 0 {
            break;
        }
        let message = &mut messages[index];
        if let Some(text) = message["content"].as_str().map(str::to_string) {
            message["content"] = json!([{
                "type": "text",
                "text": text,
                "cache_control": ephemeral(),
            }]);
            budget -= 1;
            continue;
        }
        if let Some(blocks) = message["content"].as_array_mut() {
            let last_text = blocks.iter().rposition(|block| block["type"] == "text");
            if let Some(position) = last_text {
                if !is_marked(&blocks[position]) {
                    blocks[position]["cache_control"] = ephemeral();
                    budget -= 1;
                }
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> Value {
        json!({"role": "user", "content": text})
    }

    fn assistant(text: &str) -> Value {
        json!({"role": "assistant", "content": [{"type": "text", "text": text}]})
    }

    #[test]
    fn test_marks_system_and_last_two_user_messages() {
        let system = system_blocks("You are helpful", true);
        let messages = vec![
            user("one"),
            assistant("a"),
            user("two"),
            assistant("b"),
            json!({"role": "user", "content": [
                {"type": "text", "text": "three"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AA"}}
            ]}),
        ];

        let annotated = annotate_messages(&system, messages);

        assert_eq!(annotated[0]["content"], "one");
        assert!(annotated[1]["content"][0].get("cache_control").is_none());
        assert_eq!(annotated[2]["content"][0]["cache_control"], ephemeral());
        assert!(annotated[3]["content"][0].get("cache_control").is_none());
        assert_eq!(annotated[4]["content"][0]["cache_control"], ephemeral());
        assert!(annotated[4]["content"][1].get("cache_control").is_none());
        assert_eq!(count_cache_markers(&system, &annotated), 3);
    }

    #[test]
    fn test_never_exceeds_cap() {
        let system = system_blocks("sys", true);
        let pre_marked = json!({"role": "user", "content": [
            {"type": "text", "text": "a", "cache_control": {"type": "ephemeral"}},
            {"type": "text", "text": "b", "cache_control": {"type": "ephemeral"}}
        ]});
        let messages = vec![pre_marked, user("x"), user("y")];

        let annotated = annotate_messages(&system, messages);
        assert!(count_cache_markers(&system, &annotated) <= MAX_CACHE_MARKERS);
        assert_eq!(count_cache_markers(&system, &annotated), MAX_CACHE_MARKERS);

        // a second pass changes nothing
        let again = annotate_messages(&system, annotated.clone());
        assert_eq!(again, annotated);
    }

    #[test]
    fn test_tool_result_only_turn_is_not_marked() {
        let messages = vec![json!({"role": "user", "content": [
            {"type": "tool_result", "tool_use_id": "t1", "content": "ok"}
        ]})];
        let annotated = annotate_messages(&[], messages);
        assert_eq!(count_cache_markers(&[], &annotated), 0);
    }
}
