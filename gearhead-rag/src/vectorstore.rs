//! Vector index trait for storing and searching embeddings.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Match, Metadata, VectorRecord};
use crate::error::Result;

/// Metadata filter passed to [`VectorIndex::query`].
///
/// Uses the MongoDB-style operator syntax understood by the remote service,
/// e.g. `{"equipment_type": {"$eq": "mini_excavator"}}`.
pub type Filter = Metadata;

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Euclidean distance, reported so that higher is more similar.
    Euclidean,
    /// Raw dot product.
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dotproduct",
        })
    }
}

/// The shape an index must have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: Metric,
}

impl IndexSpec {
    /// Create an index spec.
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self { name: name.into(), dimension, metric }
    }
}

/// Summary counters reported by an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Vector dimensionality of the index.
    pub dimension: usize,
    /// Number of stored vectors.
    pub total_vector_count: u64,
}

/// A similarity-search backend holding [`VectorRecord`]s.
///
/// This is the narrow contract the rest of the crate depends on, so that the
/// managed service can be swapped for an in-memory index in tests.
///
/// # Example
///
/// ```rust,ignore
/// use gearhead_rag::{InMemoryIndex, IndexSpec, Metric, VectorIndex};
///
/// let index = InMemoryIndex::new();
/// index.ensure_index(&IndexSpec::new("docs", 384, Metric::Cosine)).await?;
/// index.upsert(&records).await?;
/// let matches = index.query(&query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Create the index if it does not exist.
    ///
    /// Fails with [`RagError::IndexConfigError`](crate::RagError::IndexConfigError)
    /// if an existing index has a different dimension or metric.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Insert or replace records by id in a single request.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Return at most `top_k` matches ordered by descending score.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Match>>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[&str]) -> Result<()>;

    /// Report the index dimension and vector count.
    async fn stats(&self) -> Result<IndexStats>;
}
