//! Ingestion pipeline.
//!
//! The [`IngestionPipeline`] runs the offline batch job that populates the
//! index: chunk every document, embed the chunks in batches, and upsert the
//! vectors in batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use gearhead_rag::{IngestionPipeline, IndexClient, InMemoryIndex, HashEmbedder, RagConfig};
//!
//! let pipeline = IngestionPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedder(Arc::new(HashEmbedder::new(384)))
//!     .index(IndexClient::new(Arc::new(InMemoryIndex::new()), "gearhead-docs"))
//!     .build()?;
//!
//! pipeline.ensure_index().await?;
//! let report = pipeline.ingest(&documents).await?;
//! ```

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::client::IndexClient;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, VectorRecord};
use crate::embedding::{Embedder, check_embedding};
use crate::error::{RagError, Result};

/// A chunk that was left out of the index because it could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Id of the skipped chunk.
    pub id: String,
    /// Why the chunk was skipped.
    pub reason: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of documents read.
    pub documents: usize,
    /// Number of chunks written to the index.
    pub chunks_written: usize,
    /// Chunks skipped because embedding failed.
    pub skipped: Vec<ChunkFailure>,
}

impl IngestReport {
    /// Returns `true` if every chunk was written.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Orchestrates chunk → embed → upsert for a corpus of documents.
///
/// Chunk ids are derived from each document's position in the input slice,
/// so re-ingesting the same corpus in the same order overwrites the same
/// records instead of adding new ones. Reordering the corpus breaks that
/// guarantee. Construct one via [`IngestionPipeline::builder()`].
pub struct IngestionPipeline {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    index: IndexClient,
    chunker: Arc<dyn Chunker>,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the index client.
    pub fn index(&self) -> &IndexClient {
        &self.index
    }

    /// Create the index with the embedder's dimension and the configured
    /// metric, or verify that an existing index matches them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexConfigError`] on a mismatch.
    pub async fn ensure_index(&self) -> Result<()> {
        self.index.ensure_index(self.embedder.dimensions(), self.config.metric).await
    }

    /// Split documents into chunks without embedding them.
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(document_index, document)| self.chunker.chunk(document, document_index))
            .collect()
    }

    /// Ingest a corpus: chunk → embed → upsert.
    ///
    /// Chunks whose embedding fails are skipped, logged, and listed in the
    /// returned report. Upsert failures are not skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UpsertError`] or [`RagError::IndexConfigError`] if
    /// the vectors cannot be written.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let chunks = self.chunk_all(documents);
        let chunk_count = chunks.len();
        info!(documents = documents.len(), chunk_count, "chunked corpus");

        let embedder = &self.embedder;
        let embedded: Vec<Vec<Embedded>> = stream::iter(chunks)
            .chunks(self.config.embed_batch_size)
            .map(|batch| async move { embed_batch(embedder.as_ref(), batch).await })
            .buffered(self.config.embed_concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(chunk_count);
        let mut skipped = Vec::new();
        for (chunk, embedding) in embedded.into_iter().flatten() {
            match embedding {
                Ok(values) => records.push(VectorRecord::from_chunk(chunk, values)),
                Err(e) => {
                    warn!(chunk.id = %chunk.id, error = %e, "skipping chunk that failed to embed");
                    skipped.push(ChunkFailure { id: chunk.id, reason: e.to_string() });
                }
            }
        }

        let chunks_written = self.index.upsert(&records).await?;

        info!(
            documents = documents.len(),
            chunks_written,
            skipped = skipped.len(),
            "ingestion completed"
        );

        Ok(IngestReport { documents: documents.len(), chunks_written, skipped })
    }
}

/// A chunk paired with its embedding, or the reason it has none.
type Embedded = (Chunk, Result<Vec<f32>>);

/// Embed a group of chunks with one `embed_batch` call. When that call
/// fails, every chunk in the group is embedded on its own instead.
async fn embed_batch(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Vec<Embedded> {
    let batch = {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        embedder.embed_batch(&texts).await
    };

    match batch {
        Ok(embeddings) if embeddings.len() == chunks.len() => chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let checked =
                    check_embedding(embedder.model_id(), embedder.dimensions(), &embedding)
                        .map(|()| embedding);
                (chunk, checked)
            })
            .collect(),
        Ok(embeddings) => {
            warn!(
                expected = chunks.len(),
                returned = embeddings.len(),
                "embedder returned the wrong number of vectors, retrying chunks one at a time"
            );
            embed_each(embedder, chunks).await
        }
        Err(e) => {
            debug!(
                batch_size = chunks.len(),
                error = %e,
                "batch embedding failed, retrying chunks one at a time"
            );
            embed_each(embedder, chunks).await
        }
    }
}

async fn embed_each(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Vec<Embedded> {
    let mut results = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let embedding = embed_chunk(embedder, &chunk.text).await;
        results.push((chunk, embedding));
    }
    results
}

async fn embed_chunk(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let embedding = embedder.embed(text).await?;
    check_embedding(embedder.model_id(), embedder.dimensions(), &embedding)?;
    Ok(embedding)
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// `embedder` and `index` are required. The configuration defaults to
/// [`RagConfig::default()`] and the chunker to a [`RecursiveChunker`] sized
/// from the configuration.
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<IndexClient>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl IngestionPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedder.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the index client.
    pub fn index(mut self, index: IndexClient) -> Self {
        self.index = Some(index);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`IngestionPipeline`], validating the configuration.
    ///
    /// The index client is configured with the batch size from the
    /// configuration and the embedder's dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedder =
            self.embedder.ok_or_else(|| RagError::ConfigError("embedder is required".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| RagError::ConfigError("index is required".to_string()))?
            .with_batch_size(config.upsert_batch_size)?
            .with_dimension(embedder.dimensions());
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::from_config(&config)?),
        };

        Ok(IngestionPipeline { config, embedder, index, chunker })
    }
}
