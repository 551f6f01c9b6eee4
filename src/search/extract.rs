//! Turns a provider result into named context fields, split into strict
//! (cited) and lenient (uncited) evidence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::candidate::{string_list, value_as_f64, value_as_text, RawCandidate};

const STRICT_DEFAULT_CONFIDENCE: f64 = 0.9;
const LENIENT_DEFAULT_CONFIDENCE: f64 = 0.75;
/// Mood and genre guesses found under `metrics` are never cited.
const METRIC_FIELD_CONFIDENCE: f64 = 0.7;

/// Descriptive keys read from an item's nested `context` object, in order.
const CONTEXT_KEYS: &[&str] = &[
    "moods",
    "genres",
    "instrumentation",
    "comparisons",
    "era",
    "themes",
    "lyrics",
    "scene",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    #[serde(rename = "field")]
    pub name: String,
    pub value: String,
    pub strict: bool,
    pub confidence: f64,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContext {
    pub fields: Vec<ExtractedField>,
    /// Every source seen while collecting fields, first-seen order, no repeats.
    pub sources: Vec<String>,
    /// Set when no field survived; diagnostic only.
    pub context_missing: bool,
}

impl ExtractedContext {
    pub fn strict_count(&self) -> usize {
        self.fields.iter().filter(|f| f.strict).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionThresholds {
    /// Strict share of fields at which lenient fields are dropped.
    pub strict_threshold: f64,
    /// Minimum confidence for an uncited field.
    pub lenient_threshold: f64,
}

impl Default for ExtractionThresholds {
    fn default() -> Self {
        Self {
            strict_threshold: 0.6,
            lenient_threshold: 0.75,
        }
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => value_as_text(other),
    }
}

fn make_field(
    name: &str,
    value: &Value,
    sources: Vec<String>,
    confidence: Option<f64>,
    strict_hint: Option<bool>,
) -> Option<ExtractedField> {
    let text = field_text(value);
    if text.is_empty() {
        return None;
    }
    let strict = strict_hint.unwrap_or(!sources.is_empty());
    let confidence = confidence.unwrap_or(if strict {
        STRICT_DEFAULT_CONFIDENCE
    } else {
        LENIENT_DEFAULT_CONFIDENCE
    });
    Some(ExtractedField {
        name: name.to_string(),
        value: text,
        strict,
        confidence,
        sources,
    })
}

/// First truthy value among `keys`.
fn first_of<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| map.get(*k)).find(|v| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) | Value::Bool(true) => true,
    })
}

struct Collector {
    lenient_threshold: f64,
    fields: Vec<ExtractedField>,
    sources: Vec<String>,
}

impl Collector {
    fn push(&mut self, field: Option<ExtractedField>) {
        let Some(field) = field else {
            return;
        };
        if !field.strict && field.confidence < self.lenient_threshold {
            return;
        }
        self.sources.extend(field.sources.iter().cloned());
        self.fields.push(field);
    }
}

/// Collects context fields from an item, in this order: the explicit
/// `context.fields` list, the summary (or why) text, the descriptive keys of
/// `context`, then mood and genre under `metrics`.
pub fn extract_context(item: &RawCandidate, thresholds: ExtractionThresholds) -> ExtractedContext {
    let mut collector = Collector {
        lenient_threshold: thresholds.lenient_threshold,
        fields: Vec::new(),
        sources: Vec::new(),
    };
    let empty = Map::new();
    let context = item.context.as_ref().unwrap_or(&empty);

    if let Some(Value::Array(raw_fields)) = context.get("fields") {
        for raw in raw_fields.iter().filter_map(Value::as_object) {
            let name = first_of(raw, &["field", "name"])
                .map(value_as_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "note".to_string());
            collector.push(make_field(
                &name,
                first_of(raw, &["value", "text"]).unwrap_or(&Value::Null),
                first_of(raw, &["sources", "source"])
                    .map(string_list)
                    .unwrap_or_default(),
                raw.get("confidence").and_then(value_as_f64),
                raw.get("strict").and_then(Value::as_bool),
            ));
        }
    }

    let summary = item
        .summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(item.why.as_deref())
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null);
    collector.push(make_field("summary", &summary, item.sources.clone(), None, None));

    let context_sources = first_of(context, &["sources"])
        .map(string_list)
        .unwrap_or_else(|| item.sources.clone());
    let context_confidence = context.get("confidence").and_then(value_as_f64);
    for key in CONTEXT_KEYS {
        if let Some(value) = context.get(*key) {
            collector.push(make_field(
                key,
                value,
                context_sources.clone(),
                context_confidence,
                None,
            ));
        }
    }

    for key in ["mood", "genre"] {
        if let Some(value) = item.metrics.get(key) {
            collector.push(make_field(
                key,
                value,
                item.sources.clone(),
                Some(METRIC_FIELD_CONFIDENCE),
                Some(false),
            ));
        }
    }

    let mut sources: Vec<String> = Vec::new();
    for source in collector.sources {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    let mut fields = collector.fields;
    let strict_count = fields.iter().filter(|f| f.strict).count();
    if strict_count == 0 {
        fields.retain(|f| f.confidence >= thresholds.lenient_threshold);
    } else {
        let strict_ratio = strict_count as f64 / fields.len().max(1) as f64;
        if strict_ratio >= thresholds.strict_threshold {
            fields.retain(|f| f.strict);
        }
    }

    ExtractedContext {
        context_missing: fields.is_empty(),
        fields,
        sources,
    }
}
