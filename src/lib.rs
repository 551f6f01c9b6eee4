//! tunr search library
//!
//! Query → provider search → canonicalize → context → embed → score → cache.
//! The binary is a thin CLI over [`SearchPipeline`].

pub mod cache_store;
pub mod config;
pub mod embedding;
pub mod providers;
pub mod search;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use cache_store::{CacheStore, SqliteCacheStore};
pub use embedding::{Embedder, EmbeddingError, LocalEmbedder};
pub use providers::{CommandProviderRunner, ProviderError, ProviderRun, ProviderRunner};
pub use search::{
    PipelineSettings, SearchError, SearchOutcome, SearchPipeline, SearchResult,
    SearchSessionState,
};
