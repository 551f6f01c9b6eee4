//! Query-to-ranked-tracks search: provider result normalization,
//! canonicalization, context extraction, scoring and the pipeline that ties
//! them to the cache.

mod candidate;
mod canonicalize;
mod context_card;
mod error;
mod extract;
mod pipeline;
pub mod query_analysis;
mod scoring;

pub use candidate::{split_song_artist, ProviderItem, RawCandidate, SourceDetail};
pub use canonicalize::{canonical_track_id, canonicalize, normalize_text, CanonicalCandidate};
pub use context_card::{build_context_card, ContextCard};
pub use error::SearchError;
pub use extract::{extract_context, ExtractedContext, ExtractedField, ExtractionThresholds};
pub use pipeline::{
    PipelineSettings, ProgressCallback, ResultCallback, SearchOutcome, SearchPipeline,
    SearchResult, SearchSessionState,
};
pub use scoring::{
    cosine_similarity, parse_year, rank_scores, score_candidates, year_similarity, CandidateMeta,
    ScoreConfig,
};
