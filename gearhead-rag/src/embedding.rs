//! Embedder trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that maps text to a fixed-length dense vector.
///
/// Implementations must be deterministic for a fixed model version. The
/// default [`embed_batch`](Embedder::embed_batch) implementation calls
/// [`embed`](Embedder::embed) sequentially; backends that support native
/// batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use gearhead_rag::{Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::new(384);
/// let embedding = embedder.embed("hydraulic pump").await?;
/// assert_eq!(embedding.len(), embedder.dimensions());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding vector for a single text input.
    ///
    /// Fails with [`RagError::EmbeddingError`] on empty input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Identifier of the model behind this embedder.
    fn model_id(&self) -> &str;
}

/// Reject empty or whitespace-only input before it reaches a model.
pub(crate) fn require_text(provider: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: "input text must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Check that an embedding has the advertised dimension and finite values.
pub(crate) fn check_embedding(provider: &str, expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: format!("expected {expected} dimensions, got {}", embedding.len()),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: "embedding contains non-finite values".to_string(),
        });
    }
    Ok(())
}

/// Deterministic, model-free embeddings derived from a hash of the text.
///
/// Each token contributes to a few hashed buckets, so texts that share words
/// land closer together than unrelated texts. Vectors are L2-normalised.
/// Intended for tests and offline demos.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Create a hash embedder producing vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace().map(str::to_lowercase) {
            let hash = fnv1a(token.as_bytes());
            for round in 0..3u64 {
                let mixed = hash.rotate_left((round * 21) as u32) ^ round.wrapping_mul(0x9e37_79b9);
                let bucket = (mixed % self.dimensions as u64) as usize;
                let sign = if mixed & (1 << 40) == 0 { 1.0 } else { -1.0 };
                embedding[bucket] += sign;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        } else {
            embedding[0] = 1.0;
        }
        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        require_text("hash", text)?;
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "hash"
    }
}
