//! On-device sentence embeddings through fastembed (ONNX runtime).
//!
//! Compiled in with the `local-embeddings` feature, on by default. Builds
//! with `--no-default-features` leave it out, and [`LocalEmbedder::new`]
//! then fails with [`EmbeddingError::BackendUnavailable`].

use super::{Embedder, EmbeddingError};

pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

#[cfg(feature = "local-embeddings")]
mod backend {
    use std::sync::Mutex;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tracing::info;

    use crate::embedding::EmbeddingError;

    pub struct Backend {
        model: Mutex<TextEmbedding>,
    }

    fn parse_model_name(model_name: &str) -> Result<EmbeddingModel, EmbeddingError> {
        match model_name {
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            "sentence-transformers/all-MiniLM-L12-v2" | "all-MiniLM-L12-v2" => {
                Ok(EmbeddingModel::AllMiniLML12V2)
            }
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "nomic-ai/nomic-embed-text-v1.5" | "nomic-embed-text-v1.5" => {
                Ok(EmbeddingModel::NomicEmbedTextV15)
            }
            _ => Err(EmbeddingError::ModelNotFound(format!(
                "Unknown model: {}. Supported: all-MiniLM-L6-v2, all-MiniLM-L12-v2, \
                bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
                model_name
            ))),
        }
    }

    impl Backend {
        pub fn load(model_name: &str, show_progress: bool) -> Result<Self, EmbeddingError> {
            let model = parse_model_name(model_name)?;
            info!("Loading embedding model {}", model_name);
            let options = InitOptions::new(model).with_show_download_progress(show_progress);
            let model = TextEmbedding::try_new(options).map_err(|e| {
                EmbeddingError::BackendUnavailable(format!("{}: {}", model_name, e))
            })?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }

        pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut model = self.model.lock().unwrap();
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))
        }
    }
}

#[cfg(not(feature = "local-embeddings"))]
mod backend {
    use crate::embedding::EmbeddingError;

    pub struct Backend;

    impl Backend {
        pub fn load(model_name: &str, _show_progress: bool) -> Result<Self, EmbeddingError> {
            Err(EmbeddingError::BackendUnavailable(format!(
                "cannot load {}: built without the `local-embeddings` feature",
                model_name
            )))
        }

        pub fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::BackendUnavailable(
                "built without the `local-embeddings` feature".to_string(),
            ))
        }
    }
}

pub struct LocalEmbedder {
    model_name: String,
    backend: backend::Backend,
}

impl LocalEmbedder {
    pub fn new(model_name: &str, show_progress: bool) -> Result<Self, EmbeddingError> {
        let backend = backend::Backend::load(model_name, show_progress)?;
        Ok(Self {
            model_name: model_name.to_string(),
            backend,
        })
    }
}

impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.backend.embed(texts)
    }
}
