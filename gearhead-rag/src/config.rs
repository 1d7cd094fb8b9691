//! Configuration for chunking, retrieval, and the remote index.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::vectorstore::Metric;

/// Environment variable holding the vector index API key.
pub const ENV_API_KEY: &str = "PINECONE_API_KEY";
/// Environment variable holding the index name.
pub const ENV_INDEX_NAME: &str = "PINECONE_INDEX_NAME";
/// Environment variable holding the serverless cloud.
pub const ENV_CLOUD: &str = "PINECONE_CLOUD";
/// Environment variable holding the serverless region.
pub const ENV_REGION: &str = "PINECONE_REGION";
/// Environment variable holding the optional namespace.
pub const ENV_NAMESPACE: &str = "PINECONE_NAMESPACE";
/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "PINECONE_TIMEOUT_SECS";
/// Environment variable holding the embedding model identifier.
pub const ENV_EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
/// Environment variable holding the base URL for relative PDF paths.
pub const ENV_BASE_PDF_URL: &str = "BASE_PDF_URL";

/// Default index name.
pub const DEFAULT_INDEX_NAME: &str = "gearhead-docs";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Configuration parameters for chunking, ingestion, and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of matches returned when the caller does not specify one.
    pub top_k: usize,
    /// Number of records submitted per upsert request.
    pub upsert_batch_size: usize,
    /// Number of chunks sent to the embedder in one call during ingestion.
    pub embed_batch_size: usize,
    /// Number of embedding batches in flight during ingestion.
    pub embed_concurrency: usize,
    /// Similarity metric used when creating the index.
    pub metric: Metric,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            upsert_batch_size: 100,
            embed_batch_size: 32,
            embed_concurrency: 4,
            metric: Metric::Cosine,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k`, a batch size, or `embed_concurrency` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.upsert_batch_size == 0 {
            return Err(RagError::ConfigError(
                "upsert_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of matches returned per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of records per upsert request.
    pub fn upsert_batch_size(mut self, size: usize) -> Self {
        self.config.upsert_batch_size = size;
        self
    }

    /// Set how many chunks are passed to the embedder per call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many embedding batches run concurrently during ingestion.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Set the similarity metric used when the index is created.
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connection and model settings read from the environment.
#[derive(Clone, PartialEq)]
pub struct IndexSettings {
    /// API key for the vector index service.
    pub api_key: String,
    /// Name of the index holding the manual chunks.
    pub index_name: String,
    /// Serverless cloud used when the index has to be created.
    pub cloud: String,
    /// Serverless region used when the index has to be created.
    pub region: String,
    /// Optional namespace within the index.
    pub namespace: Option<String>,
    /// Per-request network timeout.
    pub timeout: Duration,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Base URL used to turn relative PDF paths into citation links.
    pub base_pdf_url: Option<String>,
}

impl fmt::Debug for IndexSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSettings")
            .field("api_key", &"<redacted>")
            .field("index_name", &self.index_name)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("embedding_model", &self.embedding_model)
            .field("base_pdf_url", &self.base_pdf_url)
            .finish()
    }
}

impl IndexSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Same as [`IndexSettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(ENV_API_KEY).ok_or_else(|| {
            RagError::ConfigError(format!("{ENV_API_KEY} environment variable not set"))
        })?;

        let timeout = match get(ENV_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    RagError::ConfigError(format!(
                        "{ENV_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(30),
        };

        Ok(Self {
            api_key,
            index_name: get(ENV_INDEX_NAME).unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            cloud: get(ENV_CLOUD).unwrap_or_else(|| "aws".to_string()),
            region: get(ENV_REGION).unwrap_or_else(|| "us-east-1".to_string()),
            namespace: get(ENV_NAMESPACE),
            timeout,
            embedding_model: get(ENV_EMBEDDING_MODEL)
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            base_pdf_url: get(ENV_BASE_PDF_URL),
        })
    }
}
