//! CacheStore trait definition.

use super::models::{
    ArtistRecord, CacheStats, CachedCandidateRow, ListenEventRecord, QueryRecord, RunStatus,
    SearchCandidateRecord, SearchRunRecord, TrackContextRecord, TrackEmbeddingRecord,
    TrackRecord, TrackSourceRecord, TrackStatus,
};
use anyhow::Result;

/// Persistent store behind the search pipeline.
///
/// Every write is an idempotent upsert keyed by the entity's natural key;
/// search candidates are the exception and are written once per run.
pub trait CacheStore: Send + Sync {
    // =========================================================================
    // Artists and tracks
    // =========================================================================

    fn get_artist(&self, artist_id: &str) -> Result<Option<ArtistRecord>>;

    fn upsert_artist(&self, artist: &ArtistRecord) -> Result<()>;

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRecord>>;

    /// Looks a track up by its streaming platform id.
    fn get_track_by_platform_id(&self, spotify_id: &str) -> Result<Option<TrackRecord>>;

    /// Inserts or refreshes a track's metadata.
    ///
    /// An existing track keeps its status, decision and creation time; use
    /// [`CacheStore::update_track_status`] to move it through its lifecycle.
    fn upsert_track(&self, track: &TrackRecord) -> Result<()>;

    /// Returns false when the track does not exist.
    fn update_track_status(
        &self,
        track_id: &str,
        status: TrackStatus,
        reason: Option<&str>,
    ) -> Result<bool>;

    // =========================================================================
    // Context, embeddings and sources
    // =========================================================================

    fn get_track_context(&self, track_id: &str) -> Result<Option<TrackContextRecord>>;

    fn upsert_track_context(&self, context: &TrackContextRecord) -> Result<()>;

    fn get_track_embedding(&self, track_id: &str) -> Result<Option<TrackEmbeddingRecord>>;

    fn upsert_track_embedding(&self, embedding: &TrackEmbeddingRecord) -> Result<()>;

    fn upsert_track_source(&self, source: &TrackSourceRecord) -> Result<()>;

    fn list_sources(&self, track_id: &str) -> Result<Vec<TrackSourceRecord>>;

    // =========================================================================
    // Listening history
    // =========================================================================

    fn upsert_listen_event(&self, event: &ListenEventRecord) -> Result<()>;

    /// Newest first.
    fn list_listen_events(&self, track_id: &str) -> Result<Vec<ListenEventRecord>>;

    // =========================================================================
    // Queries and runs
    // =========================================================================

    fn get_query(&self, query_hash: &str) -> Result<Option<QueryRecord>>;

    /// Inserts or refreshes a query. A `None` embedding keeps the stored one
    /// and the original creation time is preserved.
    fn upsert_query(&self, query: &QueryRecord) -> Result<()>;

    fn insert_search_run(&self, run: &SearchRunRecord) -> Result<()>;

    fn get_search_run(&self, run_id: &str) -> Result<Option<SearchRunRecord>>;

    fn update_run_status(&self, run_id: &str, status: RunStatus, error: Option<&str>)
        -> Result<()>;

    /// Most recent run with status `ok` for the query hash.
    fn latest_successful_run(&self, query_hash: &str) -> Result<Option<String>>;

    /// Writes all candidates of a run in a single transaction.
    fn insert_candidates(&self, candidates: &[SearchCandidateRecord]) -> Result<()>;

    /// Rank order.
    fn list_candidates(&self, run_id: &str) -> Result<Vec<SearchCandidateRecord>>;

    /// Candidates of a run joined with track, artist and context, in rank order.
    fn load_ranked_results(&self, run_id: &str) -> Result<Vec<CachedCandidateRow>>;

    // =========================================================================
    // Statistics
    // =========================================================================

    fn stats(&self) -> Result<CacheStats>;
}
