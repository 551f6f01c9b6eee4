//! Lenient parsing of whatever a provider printed on stdout.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::search::{ProviderItem, RawCandidate};

lazy_static! {
    static ref JSON_FENCE_RE: Regex = Regex::new(r"(?i)```json\s*([\s\S]*?)```").unwrap();
    static ref ANY_FENCE_RE: Regex = Regex::new(r"```\s*([\s\S]*?)```").unwrap();
}

const RESULT_KEYS: &[&str] = &["results", "songs", "recommendations", "tracks"];
const SUMMARY_KEYS: &[&str] = &["summary", "overview", "rationale"];

fn try_parse(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate.trim()).ok()
}

/// Outermost `open ... close` span, first opener to last closer.
fn json_block(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| text[start..=end].trim())
}

fn strip_fences(text: &str) -> &str {
    let mut candidate = text.trim();
    if let Some(rest) = candidate.strip_prefix("```json") {
        candidate = rest;
    } else if let Some(rest) = candidate.strip_prefix("```") {
        candidate = rest;
    }
    if let Some(rest) = candidate.strip_suffix("```") {
        candidate = rest;
    }
    candidate.trim()
}

/// Finds a JSON document in provider output.
///
/// Tries, in order: the whole output with code fences stripped, a fenced
/// `json` block, any fenced block, the outermost object, the outermost list.
pub fn parse_json_output(text: &str) -> Option<Value> {
    let stripped = strip_fences(text);
    let looks_like_json = (stripped.starts_with('{') && stripped.ends_with('}'))
        || (stripped.starts_with('[') && stripped.ends_with(']'));
    if looks_like_json {
        if let Some(value) = try_parse(stripped) {
            return Some(value);
        }
    }
    if let Some(value) = try_parse(text) {
        return Some(value);
    }

    for re in [&*JSON_FENCE_RE, &*ANY_FENCE_RE] {
        if let Some(value) = re
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| try_parse(m.as_str()))
        {
            return Some(value);
        }
    }

    [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|(open, close)| json_block(text, *open, *close))
        .find_map(try_parse)
}

fn non_empty<'a>(output: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| output.get(*k)).find(|v| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    })
}

/// Result items and summary from a parsed document. Items that are neither
/// objects nor `"song by artist"` strings are discarded.
pub fn extract_output(output: Value) -> (Vec<RawCandidate>, String) {
    let (items, summary) = match output {
        Value::Object(map) => {
            let summary = non_empty(&map, SUMMARY_KEYS)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            let items = match non_empty(&map, RESULT_KEYS) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            (items, summary)
        }
        Value::Array(items) => (items, String::new()),
        _ => return (Vec::new(), String::new()),
    };

    let results = items
        .into_iter()
        .filter_map(|item| ProviderItem::from_value(item).into_candidate())
        .collect();
    (results, summary)
}

/// Removes every occurrence of `flag` (and its value, if it takes one).
pub fn strip_flag(args: &[String], flag: &str, takes_value: bool) -> Vec<String> {
    let mut cleaned = Vec::with_capacity(args.len());
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == flag {
            skip_next = takes_value;
            continue;
        }
        cleaned.push(arg.clone());
    }
    cleaned
}
