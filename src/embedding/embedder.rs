use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding backend cannot be constructed in this build or
    /// environment. Not retried.
    #[error("Embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Embedding model not found: {0}")]
    ModelNotFound(String),

    #[error("Embedding failed: {0}")]
    Inference(String),

    #[error("Embedder returned {actual} vectors for {expected} texts")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Maps text to fixed-length, unit-normalized vectors.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input text. Empty input yields empty output.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Like [`Embedder::embed`], but fails unless exactly one vector comes
    /// back per text.
    fn embed_exact(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}
