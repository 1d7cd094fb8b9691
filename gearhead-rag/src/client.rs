//! Batching and degradation policy on top of a [`VectorIndex`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::document::{Match, VectorRecord};
use crate::error::{BatchFailure, RagError, Result};
use crate::vectorstore::{Filter, IndexSpec, IndexStats, Metric, VectorIndex};

/// Default number of records per upsert request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Client used by ingestion and retrieval to talk to a [`VectorIndex`].
///
/// Upserts are split into fixed-size batches because the remote service
/// bounds request size. Batching is best-effort: every batch is attempted,
/// and if any failed the call returns [`RagError::UpsertError`] listing each
/// failed batch. Nothing is rolled back.
///
/// [`query`](IndexClient::query) never fails on an unreachable or empty
/// index; it returns no matches so the assistant can answer without context.
#[derive(Clone)]
pub struct IndexClient {
    index: Arc<dyn VectorIndex>,
    name: String,
    dimension: Option<usize>,
    batch_size: usize,
}

impl IndexClient {
    /// Wrap a vector index.
    ///
    /// `name` is the index name used by [`ensure_index`](Self::ensure_index)
    /// and in error messages.
    pub fn new(index: Arc<dyn VectorIndex>, name: impl Into<String>) -> Self {
        Self { index, name: name.into(), dimension: None, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Set the number of records per upsert request.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `batch_size` is zero.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::ConfigError("batch size must be greater than zero".to_string()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Declare the vector dimension of the index so that mismatched records
    /// are rejected before any request is sent.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Name of the wrapped index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records per upsert request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The wrapped backend.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Create the index if absent, or verify an existing one has the
    /// requested dimension and metric.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexConfigError`] on a mismatch and
    /// [`RagError::IndexUnavailable`] if the service cannot be reached.
    pub async fn ensure_index(&self, dimension: usize, metric: Metric) -> Result<()> {
        let spec = IndexSpec::new(self.name.clone(), dimension, metric);
        self.index.ensure_index(&spec).await.map_err(|e| {
            error!(index = %self.name, dimension, %metric, error = %e, "failed to ensure index");
            e
        })?;
        info!(
            index = %self.name,
            dimension,
            %metric,
            backend = self.index.backend(),
            "index ready"
        );
        Ok(())
    }

    /// Upsert records in batches, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexConfigError`] before sending anything if a
    /// record has the wrong dimension, and [`RagError::UpsertError`] after all
    /// batches were attempted if any of them failed.
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        self.check_records(records)?;

        let mut upserted = 0;
        let mut failures = Vec::new();

        for (batch_index, batch) in records.chunks(self.batch_size).enumerate() {
            match self.index.upsert(batch).await {
                Ok(()) => {
                    upserted += batch.len();
                    debug!(index = %self.name, batch_index, count = batch.len(), "upserted batch");
                }
                Err(e) => {
                    error!(
                        index = %self.name,
                        batch_index,
                        count = batch.len(),
                        error = %e,
                        "upsert batch failed"
                    );
                    failures.push(BatchFailure {
                        batch_index,
                        records: batch.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(RagError::UpsertError { failures, upserted });
        }

        info!(index = %self.name, upserted, "upsert completed");
        Ok(upserted)
    }

    fn check_records(&self, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            if record.values.is_empty() {
                return Err(RagError::IndexConfigError {
                    index: self.name.clone(),
                    message: format!("record '{}' has an empty vector", record.id),
                });
            }
            if let Some(dimension) = self.dimension {
                if record.values.len() != dimension {
                    return Err(RagError::IndexConfigError {
                        index: self.name.clone(),
                        message: format!(
                            "record '{}' has {} dimensions, index expects {dimension}",
                            record.id,
                            record.values.len()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Query for the `top_k` nearest records, failing if the index is
    /// unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] on service failure.
    pub async fn try_query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Match>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut matches = self.index.query(vector, top_k, filter).await?;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        debug!(index = %self.name, top_k, result_count = matches.len(), "query completed");
        Ok(matches)
    }

    /// Query for the `top_k` nearest records, returning no matches when the
    /// index is empty, missing, or unreachable.
    pub async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Vec<Match> {
        match self.try_query(vector, top_k, filter).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(index = %self.name, error = %e, "query failed, continuing without context");
                Vec::new()
            }
        }
    }

    /// Report the index dimension and vector count.
    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }

    /// Delete records by id.
    pub async fn delete(&self, ids: &[&str]) -> Result<()> {
        for batch in ids.chunks(self.batch_size) {
            self.index.delete(batch).await?;
        }
        Ok(())
    }
}
