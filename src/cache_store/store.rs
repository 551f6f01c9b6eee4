//! SQLite-backed cache store implementation.

use super::models::{
    ArtistRecord, CacheStats, CachedCandidateRow, ListenEventRecord, QueryRecord, RunStatus,
    SearchCandidateRecord, SearchRunRecord, TrackContextRecord, TrackEmbeddingRecord,
    TrackRecord, TrackSourceRecord, TrackStatus,
};
use super::now_timestamp;
use super::schema::CACHE_VERSIONED_SCHEMAS;
use super::trait_def::CacheStore;
use super::vectors::{decode_vector, encode_vector, vector_norm};
use crate::sqlite_persistence::{configure_connection, ensure_schema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// SQLite-backed cache store.
///
/// Owns the single connection to the cache database; clones share it.
#[derive(Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Opens (creating if needed) the cache database at `db_path` and brings
    /// its schema to the latest version.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache database directory {:?}", parent)
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database at {:?}", path))?;
        Self::from_connection(conn)
    }

    /// Non-persistent store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        let version = ensure_schema(&mut conn, CACHE_VERSIONED_SCHEMAS, "cache")?;

        let stats = Self::count_rows(&conn)?;
        info!(
            "Cache store ready (schema v{}): {} tracks, {} queries, {} search runs",
            version, stats.tracks, stats.queries, stats.search_runs
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn count_rows(conn: &Connection) -> Result<CacheStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(CacheStats {
            artists: count("artists")?,
            tracks: count("tracks")?,
            contexts: count("track_context")?,
            embeddings: count("track_embeddings")?,
            queries: count("queries")?,
            search_runs: count("search_runs")?,
            candidates: count("search_candidates")?,
            sources: count("track_sources")?,
            listen_events: count("listen_events")?,
        })
    }

    fn row_to_track(row: &Row) -> rusqlite::Result<TrackRecord> {
        let status: Option<String> = row.get("status")?;
        Ok(TrackRecord {
            track_id: row.get("track_id")?,
            spotify_id: row.get("spotify_id")?,
            name: row.get("name")?,
            artist_id: row.get("artist_id")?,
            album_name: row.get("album_name")?,
            release_date: row.get("release_date")?,
            duration_ms: row.get("duration_ms")?,
            explicit: int_to_bool(row.get("explicit")?),
            popularity: row.get("popularity")?,
            spotify_url: row.get("spotify_url")?,
            status: status
                .as_deref()
                .and_then(TrackStatus::parse)
                .unwrap_or(TrackStatus::Candidate),
            last_decision: row.get("last_decision")?,
            decision_reason: row.get("decision_reason")?,
            created_at: row.get::<_, Option<String>>("created_at")?.unwrap_or_default(),
            updated_at: row.get::<_, Option<String>>("updated_at")?.unwrap_or_default(),
        })
    }

    fn row_to_search_run(row: &Row) -> rusqlite::Result<SearchRunRecord> {
        let status: Option<String> = row.get("status")?;
        Ok(SearchRunRecord {
            run_id: row.get("run_id")?,
            query_hash: row.get("query_hash")?,
            provider: row.get("provider")?,
            expanded: row.get::<_, Option<i64>>("expanded")?.unwrap_or(0) != 0,
            status: status
                .as_deref()
                .and_then(RunStatus::parse)
                .unwrap_or(RunStatus::Error),
            error: row.get("error")?,
            started_at: row.get::<_, Option<String>>("started_at")?.unwrap_or_default(),
            finished_at: row.get("finished_at")?,
            score_config_hash: row.get("score_config_hash")?,
            results_count: row.get::<_, Option<i64>>("results_count")?.unwrap_or(0) as usize,
        })
    }

    fn row_to_candidate(row: &Row) -> rusqlite::Result<SearchCandidateRecord> {
        Ok(SearchCandidateRecord {
            run_id: row.get("run_id")?,
            track_id: row.get("track_id")?,
            rank: row.get::<_, Option<i64>>("rank")?.unwrap_or(0) as usize,
            score_text: row.get("score_text")?,
            score_audio: row.get("score_audio")?,
            score_final: row.get::<_, Option<f64>>("score_final")?.unwrap_or(0.0),
            strict_ratio: row.get::<_, Option<f64>>("strict_ratio")?.unwrap_or(0.0),
            lenient_ratio: row.get::<_, Option<f64>>("lenient_ratio")?.unwrap_or(0.0),
            sources_count: row.get::<_, Option<i64>>("sources_count")?.unwrap_or(0) as usize,
        })
    }

    fn row_to_source(row: &Row) -> rusqlite::Result<TrackSourceRecord> {
        Ok(TrackSourceRecord {
            source_id: row.get("source_id")?,
            track_id: row.get("track_id")?,
            url: row.get::<_, Option<String>>("url")?.unwrap_or_default(),
            title: row.get("title")?,
            snippet: row.get("snippet")?,
            provider: row.get("provider")?,
            is_strict: row.get::<_, Option<i64>>("is_strict")?.unwrap_or(1) != 0,
            retrieved_at: row.get::<_, Option<String>>("retrieved_at")?.unwrap_or_default(),
        })
    }
}

// Helper: serialize a string list to a JSON array
fn json_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

// Helper: deserialize a JSON array or NULL into a string list
fn parse_json_list(s: Option<String>) -> Vec<String> {
    match s {
        None => Vec::new(),
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Malformed JSON array in cache db: {}: {}", json, e);
            Vec::new()
        }),
    }
}

fn bool_to_int(v: Option<bool>) -> Option<i32> {
    v.map(|b| if b { 1 } else { 0 })
}

fn int_to_bool(v: Option<i32>) -> Option<bool> {
    v.map(|i| i != 0)
}

impl CacheStore for SqliteCacheStore {
    // =========================================================================
    // Artists and tracks
    // =========================================================================

    fn get_artist(&self, artist_id: &str) -> Result<Option<ArtistRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id, name, genres_json, popularity, updated_at
             FROM artists WHERE artist_id = ?1",
        )?;
        let result = stmt
            .query_row(params![artist_id], |row| {
                Ok(ArtistRecord {
                    artist_id: row.get(0)?,
                    name: row.get(1)?,
                    genres: parse_json_list(row.get(2)?),
                    popularity: row.get(3)?,
                    updated_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })
            .optional()?;
        Ok(result)
    }

    fn upsert_artist(&self, artist: &ArtistRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artists (artist_id, name, genres_json, popularity, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(artist_id) DO UPDATE SET
               name = excluded.name,
               genres_json = excluded.genres_json,
               popularity = COALESCE(excluded.popularity, artists.popularity),
               updated_at = excluded.updated_at",
            params![
                artist.artist_id,
                artist.name,
                json_list(&artist.genres),
                artist.popularity,
                artist.updated_at,
            ],
        )
        .with_context(|| format!("Failed to upsert artist {}", artist.artist_id))?;
        Ok(())
    }

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM tracks WHERE track_id = ?1")?;
        Ok(stmt
            .query_row(params![track_id], Self::row_to_track)
            .optional()?)
    }

    fn get_track_by_platform_id(&self, spotify_id: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT * FROM tracks WHERE spotify_id = ?1 LIMIT 1")?;
        Ok(stmt
            .query_row(params![spotify_id], Self::row_to_track)
            .optional()?)
    }

    fn upsert_track(&self, track: &TrackRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tracks
             (track_id, spotify_id, name, artist_id, album_name, release_date, duration_ms,
              explicit, popularity, spotify_url, status, last_decision, decision_reason,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(track_id) DO UPDATE SET
               spotify_id = COALESCE(excluded.spotify_id, tracks.spotify_id),
               name = excluded.name,
               artist_id = COALESCE(excluded.artist_id, tracks.artist_id),
               album_name = COALESCE(excluded.album_name, tracks.album_name),
               release_date = COALESCE(excluded.release_date, tracks.release_date),
               duration_ms = COALESCE(excluded.duration_ms, tracks.duration_ms),
               explicit = COALESCE(excluded.explicit, tracks.explicit),
               popularity = COALESCE(excluded.popularity, tracks.popularity),
               spotify_url = COALESCE(excluded.spotify_url, tracks.spotify_url),
               updated_at = excluded.updated_at",
            params![
                track.track_id,
                track.spotify_id,
                track.name,
                track.artist_id,
                track.album_name,
                track.release_date,
                track.duration_ms,
                bool_to_int(track.explicit),
                track.popularity,
                track.spotify_url,
                track.status.as_str(),
                track.last_decision,
                track.decision_reason,
                track.created_at,
                track.updated_at,
            ],
        )
        .with_context(|| format!("Failed to upsert track {}", track.track_id))?;
        Ok(())
    }

    fn update_track_status(
        &self,
        track_id: &str,
        status: TrackStatus,
        reason: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE tracks
             SET status = ?1, last_decision = ?1, decision_reason = ?2, updated_at = ?3
             WHERE track_id = ?4",
            params![status.as_str(), reason, now_timestamp(), track_id],
        )?;
        Ok(updated > 0)
    }

    // =========================================================================
    // Context, embeddings and sources
    // =========================================================================

    fn get_track_context(&self, track_id: &str) -> Result<Option<TrackContextRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id, context_text, strict_text, lenient_text, fields_json,
                    sources_json, strict_ratio, context_version, generated_at
             FROM track_context WHERE track_id = ?1",
        )?;
        let result = stmt
            .query_row(params![track_id], |row| {
                Ok(TrackContextRecord {
                    track_id: row.get(0)?,
                    context_text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    strict_text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    lenient_text: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    fields_json: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    sources_json: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    strict_ratio: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    context_version: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    generated_at: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                })
            })
            .optional()?;
        Ok(result)
    }

    fn upsert_track_context(&self, context: &TrackContextRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO track_context
             (track_id, context_text, strict_text, lenient_text, fields_json, sources_json,
              strict_ratio, context_version, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(track_id) DO UPDATE SET
               context_text = excluded.context_text,
               strict_text = excluded.strict_text,
               lenient_text = excluded.lenient_text,
               fields_json = excluded.fields_json,
               sources_json = excluded.sources_json,
               strict_ratio = excluded.strict_ratio,
               context_version = excluded.context_version,
               generated_at = excluded.generated_at",
            params![
                context.track_id,
                context.context_text,
                context.strict_text,
                context.lenient_text,
                context.fields_json,
                context.sources_json,
                context.strict_ratio,
                context.context_version,
                context.generated_at,
            ],
        )
        .with_context(|| format!("Failed to upsert context for {}", context.track_id))?;
        Ok(())
    }

    fn get_track_embedding(&self, track_id: &str) -> Result<Option<TrackEmbeddingRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id, model_name, embedding_blob, embedding_dim, embedding_norm,
                    strict_ratio, created_at
             FROM track_embeddings WHERE track_id = ?1",
        )?;
        let row = stmt
            .query_row(params![track_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .optional()?;
        let Some((track_id, model_name, blob, dim, norm, strict_ratio, created_at)) = row else {
            return Ok(None);
        };
        let vector = decode_vector(&blob, dim as usize)
            .with_context(|| format!("Corrupt embedding for track {}", track_id))?;
        Ok(Some(TrackEmbeddingRecord {
            track_id,
            model_name,
            norm: norm.map(|n| n as f32).unwrap_or_else(|| vector_norm(&vector)),
            vector,
            strict_ratio: strict_ratio.unwrap_or(0.0),
            created_at: created_at.unwrap_or_default(),
        }))
    }

    fn upsert_track_embedding(&self, embedding: &TrackEmbeddingRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO track_embeddings
             (track_id, model_name, embedding_blob, embedding_dim, embedding_norm,
              strict_ratio, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(track_id) DO UPDATE SET
               model_name = excluded.model_name,
               embedding_blob = excluded.embedding_blob,
               embedding_dim = excluded.embedding_dim,
               embedding_norm = excluded.embedding_norm,
               strict_ratio = excluded.strict_ratio,
               created_at = excluded.created_at",
            params![
                embedding.track_id,
                embedding.model_name,
                encode_vector(&embedding.vector),
                embedding.vector.len() as i64,
                embedding.norm as f64,
                embedding.strict_ratio,
                embedding.created_at,
            ],
        )
        .with_context(|| format!("Failed to upsert embedding for {}", embedding.track_id))?;
        Ok(())
    }

    fn upsert_track_source(&self, source: &TrackSourceRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO track_sources
             (source_id, track_id, url, title, snippet, provider, is_strict, retrieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_id) DO UPDATE SET
               track_id = excluded.track_id,
               url = excluded.url,
               title = COALESCE(excluded.title, track_sources.title),
               snippet = COALESCE(excluded.snippet, track_sources.snippet),
               provider = excluded.provider,
               is_strict = excluded.is_strict,
               retrieved_at = excluded.retrieved_at",
            params![
                source.source_id,
                source.track_id,
                source.url,
                source.title,
                source.snippet,
                source.provider,
                source.is_strict as i32,
                source.retrieved_at,
            ],
        )
        .with_context(|| format!("Failed to upsert source {} for {}", source.url, source.track_id))?;
        Ok(())
    }

    fn list_sources(&self, track_id: &str) -> Result<Vec<TrackSourceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM track_sources WHERE track_id = ?1 ORDER BY retrieved_at DESC, url",
        )?;
        let rows = stmt
            .query_map(params![track_id], Self::row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Listening history
    // =========================================================================

    fn upsert_listen_event(&self, event: &ListenEventRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO listen_events (event_id, track_id, spotify_id, played_at, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(event_id) DO UPDATE SET
               track_id = excluded.track_id,
               spotify_id = excluded.spotify_id,
               played_at = excluded.played_at,
               source = excluded.source,
               created_at = excluded.created_at",
            params![
                event.event_id,
                event.track_id,
                event.spotify_id,
                event.played_at,
                event.source,
                event.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_listen_events(&self, track_id: &str) -> Result<Vec<ListenEventRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT event_id, track_id, spotify_id, played_at, source, created_at
             FROM listen_events WHERE track_id = ?1 ORDER BY played_at DESC",
        )?;
        let rows = stmt
            .query_map(params![track_id], |row| {
                Ok(ListenEventRecord {
                    event_id: row.get(0)?,
                    track_id: row.get(1)?,
                    spotify_id: row.get(2)?,
                    played_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    source: row.get(4)?,
                    created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Queries and runs
    // =========================================================================

    fn get_query(&self, query_hash: &str) -> Result<Option<QueryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT query_hash, query_text, constraints_json, embedding_blob, embedding_dim,
                    model_name, created_at, last_used_at
             FROM queries WHERE query_hash = ?1",
        )?;
        let row = stmt
            .query_row(params![query_hash], |row| {
                Ok((
                    QueryRecord {
                        query_hash: row.get(0)?,
                        query_text: row.get(1)?,
                        constraints_json: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        embedding: None,
                        model_name: row.get(5)?,
                        created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        last_used_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    },
                    row.get::<_, Option<Vec<u8>>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })
            .optional()?;
        let Some((mut query, blob, dim)) = row else {
            return Ok(None);
        };
        if let (Some(blob), Some(dim)) = (blob, dim) {
            query.embedding = Some(
                decode_vector(&blob, dim as usize)
                    .with_context(|| format!("Corrupt embedding for query {}", query_hash))?,
            );
        }
        Ok(Some(query))
    }

    fn upsert_query(&self, query: &QueryRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let blob = query.embedding.as_deref().map(encode_vector);
        let dim = query.embedding.as_ref().map(|v| v.len() as i64);
        conn.execute(
            "INSERT INTO queries
             (query_hash, query_text, constraints_json, embedding_blob, embedding_dim,
              model_name, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(query_hash) DO UPDATE SET
               query_text = excluded.query_text,
               constraints_json = excluded.constraints_json,
               embedding_blob = COALESCE(excluded.embedding_blob, queries.embedding_blob),
               embedding_dim = COALESCE(excluded.embedding_dim, queries.embedding_dim),
               model_name = COALESCE(excluded.model_name, queries.model_name),
               last_used_at = excluded.last_used_at",
            params![
                query.query_hash,
                query.query_text,
                query.constraints_json,
                blob,
                dim,
                query.model_name,
                query.created_at,
                query.last_used_at,
            ],
        )
        .with_context(|| format!("Failed to upsert query {}", query.query_hash))?;
        Ok(())
    }

    fn insert_search_run(&self, run: &SearchRunRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_runs
             (run_id, query_hash, provider, expanded, status, error, started_at, finished_at,
              results_count, score_config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.run_id,
                run.query_hash,
                run.provider,
                run.expanded as i32,
                run.status.as_str(),
                run.error,
                run.started_at,
                run.finished_at,
                run.results_count as i64,
                run.score_config_hash,
            ],
        )
        .with_context(|| format!("Failed to insert search run {}", run.run_id))?;
        Ok(())
    }

    fn get_search_run(&self, run_id: &str) -> Result<Option<SearchRunRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM search_runs WHERE run_id = ?1")?;
        Ok(stmt
            .query_row(params![run_id], Self::row_to_search_run)
            .optional()?)
    }

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE search_runs SET status = ?1, error = ?2, finished_at = ?3 WHERE run_id = ?4",
            params![status.as_str(), error, now_timestamp(), run_id],
        )?;
        Ok(())
    }

    fn latest_successful_run(&self, query_hash: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT run_id FROM search_runs
             WHERE query_hash = ?1 AND status = 'ok'
             ORDER BY started_at DESC, rowid DESC
             LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![query_hash], |row| row.get(0))
            .optional()?)
    }

    fn insert_candidates(&self, candidates: &[SearchCandidateRecord]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO search_candidates
                 (run_id, track_id, rank, score_text, score_audio, score_final, strict_ratio,
                  lenient_ratio, sources_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for c in candidates {
                stmt.execute(params![
                    c.run_id,
                    c.track_id,
                    c.rank as i64,
                    c.score_text,
                    c.score_audio,
                    c.score_final,
                    c.strict_ratio,
                    c.lenient_ratio,
                    c.sources_count as i64,
                ])
                .with_context(|| {
                    format!("Failed to insert candidate {} for run {}", c.track_id, c.run_id)
                })?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn list_candidates(&self, run_id: &str) -> Result<Vec<SearchCandidateRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM search_candidates WHERE run_id = ?1 ORDER BY rank ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_candidate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn load_ranked_results(&self, run_id: &str) -> Result<Vec<CachedCandidateRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT c.track_id, c.rank, t.name, a.name, t.release_date, c.score_final,
                    c.strict_ratio, ctx.sources_json
             FROM search_candidates c
             JOIN tracks t ON t.track_id = c.track_id
             LEFT JOIN artists a ON a.artist_id = t.artist_id
             LEFT JOIN track_context ctx ON ctx.track_id = c.track_id
             WHERE c.run_id = ?1
             ORDER BY c.rank ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(CachedCandidateRow {
                    track_id: row.get(0)?,
                    rank: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as usize,
                    song: row.get(2)?,
                    artist: row.get(3)?,
                    release_date: row.get(4)?,
                    score_final: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                    strict_ratio: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    sources: parse_json_list(row.get(7)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn.lock().unwrap();
        Self::count_rows(&conn)
    }
}
