//! Content-addressed cache key for a query.
//!
//! The key is `sha256(normalized_query + "|" + constraints_json)` in lowercase
//! hex, where the constraints are serialized with sorted keys, no whitespace
//! and non-ASCII characters escaped as `\uXXXX`. Existing cache databases
//! depend on this exact byte layout.

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io;

/// Lowercases and collapses runs of whitespace into single spaces.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compact JSON that escapes every non-ASCII character.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Canonical serialization of a constraint map. An empty map serializes to `""`.
pub fn canonical_json(constraints: &Map<String, Value>) -> String {
    if constraints.is_empty() {
        return String::new();
    }
    canonical_value_json(&Value::Object(constraints.clone()))
}

pub(crate) fn canonical_value_json(value: &Value) -> String {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, AsciiFormatter);
    // Serializing a Value into memory cannot fail and the output is ASCII.
    if sort_keys(value).serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn query_hash(query_text: &str, constraints: &Map<String, Value>) -> String {
    let payload = format!("{}|{}", normalize_query(query_text), canonical_json(constraints));
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_query("  Dreamy\t  Indie \n"), "dreamy indie");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn hash_ignores_case_whitespace_and_key_order() {
        let a = query_hash("Dreamy Indie", &map(json!({"max": 10, "min": 2})));
        let b = query_hash("  dreamy   indie ", &map(json!({"min": 2, "max": 10})));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_depends_on_constraints() {
        let plain = query_hash("late night jazz", &map(json!({"expanded": false})));
        let expanded = query_hash("late night jazz", &map(json!({"expanded": true})));
        assert_ne!(plain, expanded);
    }

    #[test]
    fn hash_matches_known_digest() {
        // sha256 of `late night jazz|{"expanded":false}`
        let hash = query_hash("Late  Night Jazz", &map(json!({"expanded": false})));
        let mut hasher = Sha256::new();
        hasher.update(br#"late night jazz|{"expanded":false}"#);
        assert_eq!(hash, format!("{:x}", hasher.finalize()));
    }

    #[test]
    fn canonical_json_is_compact_and_sorted() {
        let json = canonical_json(&map(json!({"b": [1, {"z": 1, "a": 2}], "a": "x"})));
        assert_eq!(json, r#"{"a":"x","b":[1,{"a":2,"z":1}]}"#);
    }

    #[test]
    fn canonical_json_escapes_non_ascii() {
        let json = canonical_json(&map(json!({"mood": "café 🎷"})));
        assert_eq!(json, r#"{"mood":"caf\u00e9 \ud83c\udfb7"}"#);
    }

    #[test]
    fn empty_constraints_serialize_to_empty_string() {
        assert_eq!(canonical_json(&Map::new()), "");
    }
}
