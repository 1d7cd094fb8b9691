//! Error types for the `gearhead-rag` crate.

use std::fmt;

use thiserror::Error;

/// Errors that can occur in retrieval and ingestion operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credentials or invalid parameters. Fatal, never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An existing index disagrees with the requested dimension or metric,
    /// or a vector does not match the index dimension.
    #[error("Index configuration error ({index}): {message}")]
    IndexConfigError {
        /// The index the mismatch was detected on.
        index: String,
        /// A description of the mismatch.
        message: String,
    },

    /// The embedding model is unavailable or the input was rejected.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index backend could not be reached or returned a failure.
    #[error("Index unavailable ({backend}): {message}")]
    IndexUnavailable {
        /// The vector index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// One or more upsert batches failed. Every batch was attempted.
    #[error(
        "Upsert failed for {count} batch(es) ({upserted} records written): {list}",
        count = .failures.len(),
        list = BatchFailures(.failures)
    )]
    UpsertError {
        /// The batches that failed, in submission order.
        failures: Vec<BatchFailure>,
        /// Number of records written by the batches that succeeded.
        upserted: usize,
    },

    /// The document corpus could not be read or parsed.
    #[error("Document error ({path}): {message}")]
    DocumentError {
        /// Path of the corpus file.
        path: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Returns `true` if this error means the index backend could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. })
    }
}

/// A single failed upsert batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based index of the batch within the upsert call.
    pub batch_index: usize,
    /// Number of records in the failed batch.
    pub records: usize,
    /// The backend's failure description.
    pub message: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {} ({} records): {}", self.batch_index, self.records, self.message)
    }
}

struct BatchFailures<'a>(&'a [BatchFailure]);

impl fmt::Display for BatchFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
