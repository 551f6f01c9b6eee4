//! Hints pulled out of the free-text query: target year, listener
//! constraints, result limit and the metrics the user cares about.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 30;
/// Extra results requested by an expanded search.
pub const EXPANDED_LIMIT_BONUS: usize = 5;

lazy_static! {
    static ref YEAR_RE: Regex = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
    static ref DECADE_RE: Regex = Regex::new(r"\b((?:19|20)?\d{2})s\b").unwrap();
    static ref MAX_LISTENERS_RE: Regex = Regex::new(
        r"(less than|under|below|at most|no more than)\s+([0-9][0-9,.]*\s*[km]?)\s+monthly listeners"
    )
    .unwrap();
    static ref MIN_LISTENERS_RE: Regex = Regex::new(
        r"(more than|over|above|at least)\s+([0-9][0-9,.]*\s*[km]?)\s+monthly listeners"
    )
    .unwrap();
    static ref LIMIT_RES: Vec<Regex> = vec![
        Regex::new(r"(?i)\btop\s+(\d+)\b").unwrap(),
        Regex::new(r"(?i)\b(\d+)\s+(songs|tracks|results|recommendations)\b").unwrap(),
        Regex::new(r"(?i)\b(\d+)\s+new\s+(songs|tracks)\b").unwrap(),
    ];
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9']+").unwrap();
}

/// Metric name and the keywords that ask for it. Keywords containing a space
/// match as substrings, the others as whole tokens.
const KNOWN_METRICS: &[(&str, &[&str])] = &[
    ("bpm", &["bpm", "tempo"]),
    ("energy", &["energy", "energetic"]),
    ("danceability", &["danceable", "danceability"]),
    ("valence", &["valence", "happy", "sad", "uplifting", "melancholy"]),
    ("acousticness", &["acoustic", "acousticness"]),
    ("instrumentalness", &["instrumental", "instrumentalness"]),
    ("liveness", &["live", "liveness"]),
    ("popularity", &["popularity", "mainstream", "underground", "obscure"]),
    (
        "monthly_listeners",
        &["monthly listeners", "monthly listener", "listeners"],
    ),
    (
        "release_year",
        &[
            "year",
            "release year",
            "released",
            "era",
            "decade",
            "90s",
            "80s",
            "00s",
            "2010s",
        ],
    ),
    (
        "language",
        &["language", "spanish", "french", "german", "italian", "portuguese"],
    ),
    (
        "region",
        &["region", "scene", "uk", "us", "japan", "korea", "brazil"],
    ),
    (
        "mood",
        &["mood", "vibe", "atmospheric", "chill", "dark", "bright"],
    ),
    ("genre", &["genre", "style"]),
    ("similarity", &["similar", "like", "in the style", "in the vein"]),
];

/// Representative year for the query: an explicit year, or the middle of a
/// decade phrase. Two-digit decades from 50 up belong to the 1900s.
pub fn extract_year_target(query: &str) -> Option<i64> {
    if let Some(m) = YEAR_RE.find(query) {
        return m.as_str().parse().ok();
    }
    let lowered = query.to_lowercase();
    let token = DECADE_RE.captures(&lowered)?.get(1)?.as_str().to_string();
    let value: i64 = token.parse().ok()?;
    let base = if token.len() == 2 {
        if value >= 50 {
            1900 + value
        } else {
            2000 + value
        }
    } else {
        value
    };
    Some(base + 5)
}

/// Parses `"50k"`, `"2m"`, `"1,200"` or `"1.5m"` into a whole number.
pub fn parse_number(value: &str) -> Option<i64> {
    let cleaned = value.trim().to_lowercase().replace(',', "");
    let (digits, multiplier) = if let Some(rest) = cleaned.strip_suffix('k') {
        (rest, 1_000.0)
    } else if let Some(rest) = cleaned.strip_suffix('m') {
        (rest, 1_000_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };
    let number: f64 = digits.trim().parse().ok()?;
    Some((number * multiplier) as i64)
}

fn listener_bound(re: &Regex, lowered: &str) -> Option<i64> {
    re.captures(lowered)
        .and_then(|c| c.get(2))
        .and_then(|m| parse_number(m.as_str()))
        .filter(|n| *n != 0)
}

/// Listener bounds and the similarity flag. Zero bounds are dropped.
pub fn extract_constraints(query: &str) -> Map<String, Value> {
    let lowered = query.to_lowercase();
    let mut constraints = Map::new();

    if let Some(max) = listener_bound(&MAX_LISTENERS_RE, &lowered) {
        constraints.insert("max_monthly_listeners".to_string(), Value::from(max));
    }
    if let Some(min) = listener_bound(&MIN_LISTENERS_RE, &lowered) {
        constraints.insert("min_monthly_listeners".to_string(), Value::from(min));
    }

    if ["similar", "like ", "in the style", "in the vein"]
        .iter()
        .any(|needle| lowered.contains(*needle))
    {
        constraints.insert("similarity_requested".to_string(), Value::Bool(true));
    }
    constraints
}

/// Result count requested in the query, clamped to `[1, max_limit]`.
pub fn extract_limit(query: &str, default: usize, max_limit: usize) -> usize {
    for re in LIMIT_RES.iter() {
        let parsed = re
            .captures(query)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok());
        if let Some(value) = parsed {
            return value.clamp(1, max_limit);
        }
    }
    default
}

/// Limit for one search, with the expanded bonus applied.
pub fn resolve_limit(query: &str, explicit: Option<usize>, expanded: bool) -> usize {
    let limit = explicit.unwrap_or_else(|| extract_limit(query, DEFAULT_LIMIT, MAX_LIMIT));
    if expanded {
        (limit + EXPANDED_LIMIT_BONUS).min(MAX_LIMIT)
    } else {
        limit
    }
}

pub fn extract_requested_metrics(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let tokens: Vec<&str> = TOKEN_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    KNOWN_METRICS
        .iter()
        .filter(|(_, keywords)| {
            keywords.iter().any(|keyword| {
                if keyword.contains(' ') {
                    lowered.contains(*keyword)
                } else {
                    tokens.contains(keyword)
                }
            })
        })
        .map(|(metric, _)| metric.to_string())
        .collect()
}

/// Requested metrics, plus whatever the constraints imply.
pub fn metrics_for(query: &str, constraints: &Map<String, Value>) -> Vec<String> {
    let mut metrics = extract_requested_metrics(query);
    let mut force = |name: &str| {
        if !metrics.iter().any(|m| m == name) {
            metrics.push(name.to_string());
        }
    };
    if constraints.contains_key("max_monthly_listeners")
        || constraints.contains_key("min_monthly_listeners")
    {
        force("monthly_listeners");
    }
    if constraints.contains_key("similarity_requested") {
        force("similarity");
    }
    metrics
}
