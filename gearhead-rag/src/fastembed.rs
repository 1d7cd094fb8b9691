//! Local sentence-transformer embeddings through `fastembed`.
//!
//! This module is only available when the `fastembed` feature is enabled.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, error, info};

use crate::embedding::{Embedder, check_embedding, require_text};
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

/// Known model identifiers, their `fastembed` model, and output dimensions.
const MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("all-MiniLM-L12-v2", EmbeddingModel::AllMiniLML12V2, 384),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

/// Resolve a model identifier such as `sentence-transformers/all-MiniLM-L6-v2`.
fn resolve_model(model_id: &str) -> Result<(&'static str, EmbeddingModel, usize)> {
    let name = model_id
        .trim()
        .trim_start_matches("sentence-transformers/")
        .trim_start_matches("BAAI/");
    MODELS
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(name))
        .map(|(known, model, dims)| (*known, model.clone(), *dims))
        .ok_or_else(|| {
            let supported: Vec<&str> = MODELS.iter().map(|(known, _, _)| *known).collect();
            RagError::ConfigError(format!(
                "unsupported embedding model '{model_id}' (supported: {})",
                supported.join(", ")
            ))
        })
}

/// An [`Embedder`] running an ONNX sentence-transformer on the local CPU.
///
/// The loaded model is owned by this value; clone the surrounding `Arc` to
/// share it between the ingestion pipeline and the retriever.
///
/// # Example
///
/// ```rust,ignore
/// use gearhead_rag::fastembed::FastEmbedEmbedder;
///
/// let embedder = FastEmbedEmbedder::load("all-MiniLM-L6-v2", None).await?;
/// let embedding = embedder.embed("swing motor noise").await?;
/// assert_eq!(embedding.len(), 384);
/// ```
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimensions: usize,
}

impl FastEmbedEmbedder {
    /// Load the model, downloading it into `cache_dir` on first use.
    ///
    /// This blocks the calling thread; prefer [`FastEmbedEmbedder::load`]
    /// inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown model id and
    /// [`RagError::EmbeddingError`] if the model cannot be loaded.
    pub fn new(model_id: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let (name, model, dimensions) = resolve_model(model_id)?;

        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let embedding = TextEmbedding::try_new(options).map_err(|e| {
            error!(provider = PROVIDER, model = name, error = %e, "failed to load model");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to load model '{name}': {e}"),
            }
        })?;

        info!(provider = PROVIDER, model = name, dimensions, "embedding model loaded");
        Ok(Self { model: Arc::new(Mutex::new(embedding)), model_id: name.to_string(), dimensions })
    }

    /// Load the model on a blocking thread.
    pub async fn load(model_id: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model_id = model_id.to_string();
        tokio::task::spawn_blocking(move || Self::new(&model_id, cache_dir)).await.map_err(|e| {
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("model loading task failed: {e}"),
            }
        })?
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().map_err(|_| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: "model lock poisoned".into(),
            })?;
            guard.embed(texts, None).map_err(|e| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("inference failed: {e}"),
            })
        })
        .await
        .map_err(|e| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: format!("inference task failed: {e}"),
        })??;

        for embedding in &embeddings {
            check_embedding(PROVIDER, self.dimensions, embedding)?;
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        require_text(PROVIDER, text)?;
        let results = self.run(vec![text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "model returned no embedding".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            require_text(PROVIDER, text)?;
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model_id,
            "embedding batch"
        );
        let results = self.run(texts.iter().map(|t| (*t).to_string()).collect()).await?;
        if results.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("expected {} embeddings, got {}", texts.len(), results.len()),
            });
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_models_with_prefixes() {
        let (name, _, dims) = resolve_model("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(name, "all-MiniLM-L6-v2");
        assert_eq!(dims, 384);

        let (_, _, dims) = resolve_model("BAAI/bge-base-en-v1.5").unwrap();
        assert_eq!(dims, 768);
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        let err = resolve_model("text-embedding-3-small").unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("all-MiniLM-L6-v2")));
    }
}
