//! Data models for the search cache database.

use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog entities
// =============================================================================

/// Lifecycle of a candidate track. Tracks are never deleted, only moved
/// between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Candidate,
    Accepted,
    Rejected,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Candidate => "candidate",
            TrackStatus::Accepted => "accepted",
            TrackStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(TrackStatus::Candidate),
            "accepted" => Some(TrackStatus::Accepted),
            "rejected" => Some(TrackStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRecord {
    /// Lowercased artist name.
    pub artist_id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: Option<i64>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// `lower(artist)|||lower(song)`.
    pub track_id: String,
    pub spotify_id: Option<String>,
    pub name: String,
    pub artist_id: Option<String>,
    pub album_name: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: Option<i64>,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub spotify_url: Option<String>,
    pub status: TrackStatus,
    pub last_decision: Option<String>,
    pub decision_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Context card persisted for a track. Overwritten on every fresh run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackContextRecord {
    pub track_id: String,
    pub context_text: String,
    pub strict_text: String,
    pub lenient_text: String,
    pub fields_json: String,
    pub sources_json: String,
    pub strict_ratio: f64,
    pub context_version: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEmbeddingRecord {
    pub track_id: String,
    pub model_name: String,
    pub vector: Vec<f32>,
    pub norm: f32,
    /// Strict ratio of the context card the vector was computed from.
    pub strict_ratio: f64,
    pub created_at: String,
}

/// Evidence URL attached to a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSourceRecord {
    pub source_id: String,
    pub track_id: String,
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub provider: Option<String>,
    pub is_strict: bool,
    pub retrieved_at: String,
}

/// Listening history entry, written by the rotation tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenEventRecord {
    pub event_id: String,
    pub track_id: String,
    pub spotify_id: Option<String>,
    pub played_at: String,
    pub source: Option<String>,
    pub created_at: String,
}

// =============================================================================
// Queries and runs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_hash: String,
    pub query_text: String,
    pub constraints_json: String,
    pub embedding: Option<Vec<f32>>,
    pub model_name: Option<String>,
    pub created_at: String,
    pub last_used_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(RunStatus::Ok),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One cache-miss execution against live providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRunRecord {
    pub run_id: String,
    pub query_hash: String,
    pub provider: String,
    pub expanded: bool,
    pub status: RunStatus,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub score_config_hash: Option<String>,
    pub results_count: usize,
}

/// Ranked membership of a track in a run. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidateRecord {
    pub run_id: String,
    pub track_id: String,
    /// 1-based.
    pub rank: usize,
    pub score_text: Option<f64>,
    pub score_audio: Option<f64>,
    pub score_final: f64,
    pub strict_ratio: f64,
    pub lenient_ratio: f64,
    pub sources_count: usize,
}

/// A candidate row joined with its track, artist and context, as needed to
/// serve a cached run without touching providers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCandidateRow {
    pub track_id: String,
    pub rank: usize,
    pub song: String,
    pub artist: Option<String>,
    pub release_date: Option<String>,
    pub score_final: f64,
    pub strict_ratio: f64,
    pub sources: Vec<String>,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub artists: usize,
    pub tracks: usize,
    pub contexts: usize,
    pub embeddings: usize,
    pub queries: usize,
    pub search_runs: usize,
    pub candidates: usize,
    pub sources: usize,
    pub listen_events: usize,
}
