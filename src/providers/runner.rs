use serde_json::{Map, Value};
use thiserror::Error;

use crate::search::RawCandidate;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No search providers configured.")]
    NoProvidersConfigured,

    #[error("No results returned by providers.")]
    NoResults,

    #[error("Provider runtime error: {0}")]
    Runtime(String),
}

/// Merged output of every provider invocation for one query.
#[derive(Debug, Clone, Default)]
pub struct ProviderRun {
    pub results: Vec<RawCandidate>,
    /// Labels of the providers that returned at least one result.
    pub providers: Vec<String>,
    pub summary: String,
    pub constraints: Map<String, Value>,
    pub requested_metrics: Vec<String>,
    pub policy: Value,
}

/// Fans a query out to external search providers.
pub trait ProviderRunner: Send + Sync {
    fn run_providers(&self, query: &str, expanded: bool) -> Result<ProviderRun, ProviderError>;
}
