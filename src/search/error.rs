use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Run-level failures of the search pipeline.
///
/// Provider items without a song or artist are not errors; they are dropped.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No provider could be run or none returned results. Nothing is
    /// persisted, so the query can be retried later.
    #[error("Provider search failed: {0}")]
    ProviderFailure(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
