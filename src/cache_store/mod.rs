//! Persistent cache of tracks, context cards, embeddings and ranked search runs.

mod models;
mod query_hash;
mod schema;
mod store;
mod trait_def;
mod vectors;

pub use models::{
    ArtistRecord, CacheStats, CachedCandidateRow, ListenEventRecord, QueryRecord, RunStatus,
    SearchCandidateRecord, SearchRunRecord, TrackContextRecord, TrackEmbeddingRecord,
    TrackRecord, TrackSourceRecord, TrackStatus,
};
pub use query_hash::{canonical_json, normalize_query, query_hash};
pub(crate) use query_hash::canonical_value_json;
pub use schema::CACHE_VERSIONED_SCHEMAS;
pub use store::SqliteCacheStore;
pub use trait_def::CacheStore;
pub use vectors::{decode_vector, encode_vector, normalize_vector, vector_norm};

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Current UTC time as RFC 3339 with fixed microsecond precision, so stored
/// timestamps sort chronologically as plain strings.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Stable id for a track's evidence URL.
pub fn derive_source_id(track_id: &str, url: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}|{}", track_id, url).as_bytes(),
    )
    .simple()
    .to_string()
}
