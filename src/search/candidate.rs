//! Typed view over the loosely-shaped items search providers return.
//!
//! Providers answer with whatever JSON their model produced. Every alias we
//! know about is folded into [`RawCandidate`]; anything else rides along in
//! `extra` and is never required downstream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metric keys that providers sometimes put at the top level of an item
/// instead of under `metrics`.
const TOP_LEVEL_METRIC_KEYS: &[&str] = &[
    "bpm",
    "tempo",
    "energy",
    "danceability",
    "valence",
    "acousticness",
    "instrumentalness",
    "liveness",
    "popularity",
    "monthly_listeners",
    "genre",
    "mood",
    "language",
    "region",
    "similarity",
    "key",
    "mode",
];

const SONG_KEYS: &[&str] = &["song", "title", "track", "name"];
const ARTIST_KEYS: &[&str] = &["artist", "artist_name"];
const YEAR_KEYS: &[&str] = &["year", "release_year", "released"];
const WHY_KEYS: &[&str] = &["why", "reason", "rationale", "notes"];
const SOURCE_KEYS: &[&str] = &["sources", "source_urls", "links"];
const SCORE_KEYS: &[&str] = &["score", "confidence"];

/// Keys consumed by [`RawCandidate::from_map`]; everything else lands in `extra`.
const KNOWN_KEYS: &[&str] = &[
    "song",
    "title",
    "track",
    "name",
    "artist",
    "artist_name",
    "artists",
    "year",
    "release_year",
    "released",
    "why",
    "reason",
    "rationale",
    "notes",
    "summary",
    "sources",
    "source_urls",
    "links",
    "source_details",
    "metrics",
    "providers",
    "mentions",
    "score",
    "confidence",
    "context",
    "spotify_uri",
    "spotify_url",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetail {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A provider result with every recognized alias resolved.
///
/// Song and artist may still be empty or unnormalized here; the canonicalizer
/// decides whether the item survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawCandidate {
    pub song: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_details: Vec<SourceDetail>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metrics: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub mentions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// One element of a provider's result list.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderItem {
    Known(RawCandidate),
    /// Neither an object nor a parseable `"song by artist"` string.
    Opaque(Value),
}

impl ProviderItem {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => ProviderItem::Known(RawCandidate::from_map(map)),
            Value::String(text) => match split_song_artist(&text) {
                (song, artist) if !song.is_empty() && !artist.is_empty() => {
                    ProviderItem::Known(RawCandidate {
                        song,
                        artist,
                        ..Default::default()
                    })
                }
                _ => ProviderItem::Opaque(Value::String(text)),
            },
            other => ProviderItem::Opaque(other),
        }
    }

    pub fn into_candidate(self) -> Option<RawCandidate> {
        match self {
            ProviderItem::Known(candidate) => Some(candidate),
            ProviderItem::Opaque(_) => None,
        }
    }
}

impl RawCandidate {
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut song = first_text(&map, SONG_KEYS).unwrap_or_default();
        let mut artist = first_text(&map, ARTIST_KEYS)
            .or_else(|| first_listed_artist(&map))
            .unwrap_or_default();
        if artist.is_empty() && !song.is_empty() {
            let (split_song, split_artist) = split_song_artist(&song);
            song = split_song;
            artist = split_artist;
        }

        let mut metrics = match map.get("metrics") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        for key in TOP_LEVEL_METRIC_KEYS {
            if let Some(value) = map.get(*key) {
                if !value.is_null() {
                    metrics.insert(key.to_string(), value.clone());
                }
            }
        }

        let candidate = RawCandidate {
            song,
            artist,
            year: first_text(&map, YEAR_KEYS),
            why: first_text(&map, WHY_KEYS),
            summary: first_text(&map, &["summary"]),
            sources: first_present(&map, SOURCE_KEYS)
                .map(string_list)
                .unwrap_or_default(),
            source_details: map
                .get("source_details")
                .map(parse_source_details)
                .unwrap_or_default(),
            metrics,
            providers: map.get("providers").map(string_list).unwrap_or_default(),
            mentions: map
                .get("mentions")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            score: first_present(&map, SCORE_KEYS).and_then(value_as_f64),
            context: match map.get("context") {
                Some(Value::Object(c)) => Some(c.clone()),
                _ => None,
            },
            spotify_uri: first_text(&map, &["spotify_uri"]),
            spotify_url: first_text(&map, &["spotify_url"]),
            extra: Map::new(),
        };

        map.retain(|key, _| !KNOWN_KEYS.contains(&key.as_str()));
        RawCandidate {
            extra: map,
            ..candidate
        }
    }

    /// Serializes back into the canonical key layout.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Renders a scalar JSON value as text; empty for null, arrays and objects.
pub(crate) fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A string or list of strings, dropping empty entries.
pub(crate) fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            let text = value_as_text(other);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    }
}

/// First key whose value is "truthy": not null, not an empty string or list.
fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| map.get(*k)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    })
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(map, keys)
        .map(value_as_text)
        .filter(|s| !s.is_empty())
}

/// `artists: [{"name": ...}]` or `artists: ["..."]`.
fn first_listed_artist(map: &Map<String, Value>) -> Option<String> {
    let name = match map.get("artists")?.as_array()?.first()? {
        Value::Object(artist) => artist.get("name").map(value_as_text),
        other => Some(value_as_text(other)),
    };
    name.filter(|s| !s.is_empty())
}

fn parse_source_details(value: &Value) -> Vec<SourceDetail> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let url = obj.get("url").map(value_as_text)?;
            if url.is_empty() {
                return None;
            }
            let text = |key: &str| {
                obj.get(key)
                    .map(value_as_text)
                    .filter(|s| !s.is_empty())
            };
            Some(SourceDetail {
                url,
                title: text("title"),
                snippet: text("snippet"),
            })
        })
        .collect()
}

/// Splits `"Song by Artist"` or `"Song - Artist"`. Returns an empty artist
/// when neither separator is present.
pub fn split_song_artist(value: &str) -> (String, String) {
    for separator in [" by ", " - "] {
        let mut parts = value.split(separator);
        if let (Some(song), Some(artist)) = (parts.next(), parts.next()) {
            return (song.trim().to_string(), artist.trim().to_string());
        }
    }
    (value.trim().to_string(), String::new())
}
