//! The JSON request written to every provider's stdin.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub const DEFAULT_INSTRUCTIONS: &str = "You are a music research assistant. Use web search to \
find new songs that match the user's criteria. Follow the provided source_policy (tiers, \
requirements) and any constraints (e.g., max monthly listeners). Return JSON only with a \
top-level 'summary' and a 'results' list. The summary should explain why these recommendations \
fit the user's criteria. Each result must include: song, artist, year (if known), why (short \
rationale), sources (list of URLs), and metrics (object) for any user-requested metrics. If the \
query implies similarity (e.g., 'like X'), include a 'similarity' metric (0-1). If the query \
includes monthly listeners constraints, include a 'monthly_listeners' metric and cite sources. \
Optionally include a score 0-1 indicating fit confidence.";

/// Evidence requirements handed to providers. Expanded searches accept
/// weaker evidence.
pub fn build_source_policy(expanded: bool) -> Value {
    let (required_tiers, reject_if_only_tier3) = if expanded {
        ("Tier1>=1 OR Tier2>=1 OR Tier3>=2", false)
    } else {
        ("Tier1>=1 OR (Tier2>=2)", true)
    };
    json!({
        "path": "hybrid",
        "min_sources": 2,
        "required_tiers": required_tiers,
        "tiers": {
            "tier1": [
                "official artist/label sites",
                "MusicBrainz",
                "Discogs",
                "AllMusic",
            ],
            "tier2": [
                "reputable music press",
                "label rosters",
                "artist interviews",
                "festival lineups",
            ],
            "tier3": [
                "Bandcamp",
                "SoundCloud",
                "YouTube live sessions",
                "community blogs",
                "Reddit (low weight)",
            ],
        },
        "reject_if_only_tier3": reject_if_only_tier3,
        "expanded": expanded,
    })
}

pub fn build_search_payload(
    query: &str,
    limit: usize,
    requested_metrics: &[String],
    constraints: &Map<String, Value>,
    expanded: bool,
) -> Value {
    json!({
        "query": query,
        "limit": limit,
        "requested_at": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        "instructions": DEFAULT_INSTRUCTIONS,
        "requested_metrics": requested_metrics,
        "constraints": constraints,
        "source_policy": build_source_policy(expanded),
        "expanded_search": expanded,
        "output_schema": {
            "results": [{
                "song": "string",
                "artist": "string",
                "year": "string or int",
                "why": "string",
                "sources": ["url"],
                "metrics": {"metric_name": "value"},
                "score": "float 0-1 (optional)",
            }]
        },
    })
}

/// Codex command used when only an OpenAI key is configured.
pub const DEFAULT_CODEX_COMMAND: &str = "codex exec --search -";

/// Provider commands found in the environment, as `(label, command)` pairs.
///
/// The generic command is only used when no named provider was found.
pub fn detect_search_commands<F>(env: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    let mut commands = Vec::new();

    if let Some(cmd) = var("WEB_SEARCH_CLAUDE_CMD").or_else(|| var("WEB_SCORE_CLAUDE_CMD")) {
        commands.push(("claude".to_string(), cmd));
    } else if var("ANTHROPIC_API_KEY").is_some() || var("CLAUDE_API_KEY").is_some() {
        commands.push(("claude".to_string(), "claude".to_string()));
    }

    if let Some(cmd) = var("WEB_SEARCH_CODEX_CMD").or_else(|| var("WEB_SCORE_CODEX_CMD")) {
        commands.push(("codex".to_string(), cmd));
    } else if var("OPENAI_API_KEY").is_some() {
        commands.push(("codex".to_string(), DEFAULT_CODEX_COMMAND.to_string()));
    }

    if commands.is_empty() {
        if let Some(cmd) = var("WEB_SEARCH_CMD").or_else(|| var("WEB_SCORE_CMD")) {
            commands.push(("web".to_string(), cmd));
        }
    }
    commands
}
