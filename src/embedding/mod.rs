//! Text embedding backends.

mod embedder;
mod local;

pub use embedder::{Embedder, EmbeddingError};
pub use local::{LocalEmbedder, DEFAULT_MODEL_NAME};
