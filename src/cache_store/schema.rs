//! SQLite schema definitions for the search cache database.
//!
//! Version 1 holds the catalog, context, embedding and run tables. Version 2
//! adds listening history and version 3 records which scoring configuration
//! produced a run.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "track_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const QUERY_FK: ForeignKey = ForeignKey {
    foreign_table: "queries",
    foreign_column: "query_hash",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SEARCH_RUN_FK: ForeignKey = ForeignKey {
    foreign_table: "search_runs",
    foreign_column: "run_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

// =============================================================================
// Version 1 - Catalog, context, embeddings, queries and runs
// =============================================================================

const ARTISTS_TABLE_V1: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("genres_json", &SqlType::Text),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("updated_at", &SqlType::Text),
    ],
    indices: &[],
};

const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, foreign_key = Some(&ARTIST_FK)),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("explicit", &SqlType::Integer),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("spotify_url", &SqlType::Text),
        sqlite_column!(
            "status",
            &SqlType::Text,
            default_value = Some("'candidate'")
        ),
        sqlite_column!("last_decision", &SqlType::Text),
        sqlite_column!("decision_reason", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text),
        sqlite_column!("updated_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_tracks_spotify_id", "spotify_id"),
        ("idx_tracks_artist_id", "artist_id"),
    ],
};

const TRACK_CONTEXT_TABLE_V1: Table = Table {
    name: "track_context",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Text,
            is_primary_key = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("context_text", &SqlType::Text),
        sqlite_column!("strict_text", &SqlType::Text),
        sqlite_column!("lenient_text", &SqlType::Text),
        sqlite_column!("fields_json", &SqlType::Text),
        sqlite_column!("sources_json", &SqlType::Text),
        sqlite_column!("strict_ratio", &SqlType::Real),
        sqlite_column!("context_version", &SqlType::Text),
        sqlite_column!("generated_at", &SqlType::Text),
    ],
    indices: &[("idx_context_strict_ratio", "strict_ratio")],
};

/// One vector per track; re-embedding under another model replaces it.
const TRACK_EMBEDDINGS_TABLE_V1: Table = Table {
    name: "track_embeddings",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Text,
            is_primary_key = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("model_name", &SqlType::Text, non_null = true),
        sqlite_column!("embedding_blob", &SqlType::Blob, non_null = true),
        sqlite_column!("embedding_dim", &SqlType::Integer, non_null = true),
        sqlite_column!("embedding_norm", &SqlType::Real),
        sqlite_column!("strict_ratio", &SqlType::Real),
        sqlite_column!("created_at", &SqlType::Text),
    ],
    indices: &[],
};

const QUERIES_TABLE_V1: Table = Table {
    name: "queries",
    columns: &[
        sqlite_column!("query_hash", &SqlType::Text, is_primary_key = true),
        sqlite_column!("query_text", &SqlType::Text, non_null = true),
        sqlite_column!("constraints_json", &SqlType::Text),
        sqlite_column!("embedding_blob", &SqlType::Blob),
        sqlite_column!("embedding_dim", &SqlType::Integer),
        sqlite_column!("model_name", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text),
        sqlite_column!("last_used_at", &SqlType::Text),
    ],
    indices: &[],
};

const SEARCH_RUNS_TABLE_V1: Table = Table {
    name: "search_runs",
    columns: &[
        sqlite_column!("run_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "query_hash",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&QUERY_FK)
        ),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("expanded", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!("status", &SqlType::Text),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("results_count", &SqlType::Integer),
    ],
    indices: &[("idx_search_runs_query", "query_hash")],
};

const SEARCH_CANDIDATES_TABLE_V1: Table = Table {
    name: "search_candidates",
    columns: &[
        sqlite_column!(
            "run_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            foreign_key = Some(&SEARCH_RUN_FK)
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("rank", &SqlType::Integer),
        sqlite_column!("score_text", &SqlType::Real),
        sqlite_column!("score_audio", &SqlType::Real),
        sqlite_column!("score_final", &SqlType::Real),
        sqlite_column!("strict_ratio", &SqlType::Real),
        sqlite_column!("lenient_ratio", &SqlType::Real),
        sqlite_column!("sources_count", &SqlType::Integer),
    ],
    indices: &[("idx_search_candidates_track", "track_id")],
};

/// Source ids are derived from track id and URL so repeated runs update in place.
const TRACK_SOURCES_TABLE_V1: Table = Table {
    name: "track_sources",
    columns: &[
        sqlite_column!("source_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "track_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("snippet", &SqlType::Text),
        sqlite_column!("provider", &SqlType::Text),
        sqlite_column!("is_strict", &SqlType::Integer, default_value = Some("1")),
        sqlite_column!("retrieved_at", &SqlType::Text),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Listening history
// =============================================================================

const LISTEN_EVENTS_TABLE_V2: Table = Table {
    name: "listen_events",
    columns: &[
        sqlite_column!("event_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "track_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("played_at", &SqlType::Text),
        sqlite_column!("source", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text),
    ],
    indices: &[
        ("idx_listen_events_track", "track_id"),
        ("idx_listen_events_played_at", "played_at"),
    ],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    LISTEN_EVENTS_TABLE_V2.create(conn)
}

// =============================================================================
// Version 3 - Scoring configuration per run
// =============================================================================

const SEARCH_RUNS_TABLE_V3: Table = Table {
    name: "search_runs",
    columns: &[
        sqlite_column!("run_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "query_hash",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&QUERY_FK)
        ),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("expanded", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!("status", &SqlType::Text),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("started_at", &SqlType::Text),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("results_count", &SqlType::Integer),
        sqlite_column!("score_config_hash", &SqlType::Text),
    ],
    indices: &[("idx_search_runs_query", "query_hash")],
};

fn migrate_v2_to_v3(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE search_runs ADD COLUMN score_config_hash TEXT",
        [],
    )?;
    Ok(())
}

pub const CACHE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE_V1,
            TRACKS_TABLE_V1,
            TRACK_CONTEXT_TABLE_V1,
            TRACK_EMBEDDINGS_TABLE_V1,
            QUERIES_TABLE_V1,
            SEARCH_RUNS_TABLE_V1,
            SEARCH_CANDIDATES_TABLE_V1,
            TRACK_SOURCES_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            ARTISTS_TABLE_V1,
            TRACKS_TABLE_V1,
            TRACK_CONTEXT_TABLE_V1,
            TRACK_EMBEDDINGS_TABLE_V1,
            QUERIES_TABLE_V1,
            SEARCH_RUNS_TABLE_V1,
            SEARCH_CANDIDATES_TABLE_V1,
            TRACK_SOURCES_TABLE_V1,
            LISTEN_EVENTS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
    VersionedSchema {
        version: 3,
        tables: &[
            ARTISTS_TABLE_V1,
            TRACKS_TABLE_V1,
            TRACK_CONTEXT_TABLE_V1,
            TRACK_EMBEDDINGS_TABLE_V1,
            QUERIES_TABLE_V1,
            SEARCH_RUNS_TABLE_V3,
            SEARCH_CANDIDATES_TABLE_V1,
            TRACK_SOURCES_TABLE_V1,
            LISTEN_EVENTS_TABLE_V2,
        ],
        migration: Some(migrate_v2_to_v3),
    },
];
