//! Recovering tool calls from the encodings models use for them.
//!
//! Besides structured `tool_calls`, some models write calls into their text either as an
//! XML envelope (`<read_file><path>a.rs</path></read_file>`) or as an embedded
//! `{"type":"tool_use", ...}` object.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::formats::openai::parse_arguments;
use crate::models::tool::ToolCall;

/// Tags that wrap other content and never name a tool
const RESERVED_TAGS: &[&str] = &["think", "tool_result", "tool_use"];

lazy_static! {
    static ref TOOL_TAG: Regex = Regex::new(r"<([A-Za-z_][\w-]*)>").unwrap();
    static ref PARAM_TAG: Regex = Regex::new(r"<(\w+)>").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^-?\d+(\.\d+)?$").unwrap();
    static ref TOOL_USE_TYPE: Regex = Regex::new(r#""type"\s*:\s*"tool_use""#).unwrap();
}

pub fn mint_id(name: &str) -> String {
    format!("{}-{}", name, uuid::Uuid::new_v4().simple())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Parameter values are JSON when they parse, then numbers and booleans, else strings
fn coerce(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    if NUMBER.is_match(raw) {
        if let Ok(number) = raw.parse::<f64>() {
            return json!(number);
        }
    }
    match raw {
        "true" => json!(true),
        "false" => json!(false),
        _ => json!(raw),
    }
}

fn xml_params(inner: &str, tool_name: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let mut cursor = 0;
    while let Some(caps) = PARAM_TAG.captures(&inner[cursor..]) {
        let (whole, name) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(name)) => (whole, name.as_str()),
            _ => break,
        };
        let body_start = cursor + whole.end();
        let closing = format!("</{}>", name);
        match inner[body_start..].find(&closing) {
            Some(offset) => {
                if name != tool_name {
                    let raw = decode_entities(inner[body_start..body_start + offset].trim());
                    params.insert(name.to_string(), coerce(&raw));
                }
                cursor = body_start + offset + closing.len();
            }
            None => cursor = body_start,
        }
    }
    params
}

/// Find `<tool_name>...</tool_name>` blocks and read their child tags as parameters.
pub fn extract_xml_tool_calls(content: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut cursor = 0;
    while let Some(caps) = TOOL_TAG.captures(&content[cursor..]) {
        let (whole, tag) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(tag)) => (whole, tag.as_str()),
            _ => break,
        };
        let body_start = cursor + whole.end();
        let closing = format!("</{}>", tag);
        let Some(offset) = content[body_start..].find(&closing) else {
            cursor = body_start;
            continue;
        };
        let inner = &content[body_start..body_start + offset];
        cursor = body_start + offset + closing.len();

        if RESERVED_TAGS.contains(&tag) {
            continue;
        }
        calls.push(ToolCall::new(
            mint_id(tag),
            tag,
            Value::Object(xml_params(inner, tag)),
        ));
    }
    calls
}

/// End of the JSON object starting at `start`, honoring strings and escapes
fn matching_brace(content: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, byte) in content.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn tool_use_object(object: &Value) -> Option<ToolCall> {
    if object["type"].as_str() != Some("tool_use") {
        return None;
    }
    let name = object["name"].as_str().filter(|name| !name.is_empty())?;
    let id = object["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| mint_id(name));
    let input = match object.get("input") {
        Some(Value::String(arguments)) => parse_arguments(arguments),
        Some(input) => input.clone(),
        None => json!({}),
    };
    Some(ToolCall::new(id, name, input))
}

/// Find `{"type":"tool_use", ...}` objects embedded in text.
pub fn extract_json_tool_calls(content: &str) -> Vec<ToolCall> {
    let bytes = content.as_bytes();
    let mut calls = Vec::new();
    let mut cursor = 0;
    while let Some(found) = TOOL_USE_TYPE.find(&content[cursor..]) {
        let marker = cursor + found.start();
        let Some(start) = content[..marker].rfind('{') else {
            cursor = marker + found.len();
            continue;
        };
        let Some(end) = matching_brace(bytes, start) else {
            cursor = marker + found.len();
            continue;
        };
        if let Ok(object) = serde_json::from_str::<Value>(&content[start..end]) {
            calls.extend(tool_use_object(&object));
        }
        cursor = end.max(marker + found.len());
    }
    calls
}

/// Read OpenAI `tool_calls` (or a legacy `function_call`) from a message or delta.
pub fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let legacy;
    let entries: &[Value] = match (&message["tool_calls"], message.get("function_call")) {
        (Value::Array(calls), _) => calls,
        (_, Some(function_call)) => {
            legacy = [json!({"function": function_call})];
            &legacy
        }
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| {
            let function = &entry["function"];
            let name = function["name"].as_str().filter(|name| !name.is_empty())?;
            let id = entry["id"]
                .as_str()
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| mint_id(name));
            let input = match &function["arguments"] {
                Value::String(arguments) => parse_arguments(arguments),
                Value::Null => json!({}),
                other => other.clone(),
            };
            Some(ToolCall::new(id, name, input))
        })
        .collect()
}

/// Tool calls written into text: XML envelopes first, then embedded JSON objects
pub fn extract_tool_calls(content: &str) -> Vec<ToolCall> {
    let xml = extract_xml_tool_calls(content);
    if !xml.is_empty() {
        return xml;
    }
    extract_json_tool_calls(content)
}
