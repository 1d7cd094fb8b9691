//! Pinecone vector index backend.
//!
//! Provides [`PineconeIndex`], which implements [`VectorIndex`] over the
//! Pinecone REST API using `reqwest`. This module is only available when the
//! `pinecone` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use gearhead_rag::pinecone::{PineconeConfig, PineconeIndex};
//!
//! let index = PineconeIndex::new(PineconeConfig::new(api_key, "gearhead-docs"))?;
//! index.ensure_index(&IndexSpec::new("gearhead-docs", 384, Metric::Cosine)).await?;
//! let matches = index.query(&query_embedding, 3, None).await?;
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::IndexSettings;
use crate::document::{Match, Metadata, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{Filter, IndexSpec, IndexStats, Metric, VectorIndex};

const BACKEND: &str = "pinecone";

/// The Pinecone control-plane endpoint.
pub const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";

/// API version sent with every request.
const API_VERSION: &str = "2024-07";

/// Connection settings for [`PineconeIndex`].
#[derive(Clone)]
pub struct PineconeConfig {
    api_key: String,
    index_name: String,
    cloud: String,
    region: String,
    namespace: Option<String>,
    timeout: Duration,
    control_url: String,
    host: Option<String>,
}

impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("index_name", &self.index_name)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("control_url", &self.control_url)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl PineconeConfig {
    /// Create settings for the given API key and index with serverless
    /// defaults (`aws`, `us-east-1`).
    pub fn new(api_key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            index_name: index_name.into(),
            cloud: "aws".into(),
            region: "us-east-1".into(),
            namespace: None,
            timeout: Duration::from_secs(30),
            control_url: DEFAULT_CONTROL_URL.into(),
            host: None,
        }
    }

    /// Build settings from environment-derived [`IndexSettings`].
    pub fn from_settings(settings: &IndexSettings) -> Self {
        Self {
            cloud: settings.cloud.clone(),
            region: settings.region.clone(),
            namespace: settings.namespace.clone(),
            timeout: settings.timeout,
            ..Self::new(settings.api_key.clone(), settings.index_name.clone())
        }
    }

    /// Set the serverless cloud and region used when creating the index.
    pub fn with_serverless(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    /// Restrict all data operations to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the control-plane URL.
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into();
        self
    }

    /// Use a known data-plane host instead of resolving it from the control
    /// plane.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// A [`VectorIndex`] backed by a [Pinecone](https://www.pinecone.io/) index.
///
/// The data-plane host is resolved once through the describe-index call and
/// cached for the lifetime of this value.
pub struct PineconeIndex {
    client: reqwest::Client,
    config: PineconeConfig,
    host: OnceCell<String>,
}

impl PineconeIndex {
    /// Create a client for the configured index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Pinecone API key must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        let host = match &config.host {
            Some(host) => OnceCell::new_with(Some(normalize_host(host))),
            None => OnceCell::new(),
        };

        Ok(Self { client, config, host })
    }

    /// Name of the index this client talks to.
    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn index_url(&self) -> String {
        let control = self.config.control_url.trim_end_matches('/');
        format!("{control}/indexes/{}", self.config.index_name)
    }

    async fn describe(&self) -> Result<Option<IndexDescription>> {
        let response =
            self.request(Method::GET, &self.index_url()).send().await.map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &self.config.index_name).await?;
        response.json().await.map(Some).map_err(unavailable)
    }

    async fn create(&self, spec: &IndexSpec) -> Result<Option<IndexDescription>> {
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: Serverless { cloud: &self.config.cloud, region: &self.config.region },
            },
        };
        let url = format!("{}/indexes", self.config.control_url.trim_end_matches('/'));
        let response =
            self.request(Method::POST, &url).json(&body).send().await.map_err(unavailable)?;

        if response.status() == StatusCode::CONFLICT {
            debug!(index = %spec.name, "index created concurrently, describing instead");
            return self.describe().await;
        }
        let response = check_status(response, &spec.name).await?;
        response.json().await.map(Some).map_err(unavailable)
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let description = self.describe().await?.ok_or_else(|| {
                    RagError::IndexUnavailable {
                        backend: BACKEND.into(),
                        message: format!("index '{}' does not exist", self.config.index_name),
                    }
                })?;
                description.ready_host().ok_or_else(|| RagError::IndexUnavailable {
                    backend: BACKEND.into(),
                    message: format!("index '{}' has no host yet", self.config.index_name),
                })
            })
            .await?;
        Ok(host.as_str())
    }

    async fn data_request<B, R>(&self, path: &str, body: &B) -> Result<Option<R>>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.host().await?);
        let response = self.request(Method::POST, &url).json(body).send().await.map_err(|e| {
            error!(backend = BACKEND, path, error = %e, "request failed");
            unavailable(e)
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &self.config.index_name).await?;
        response.json().await.map(Some).map_err(unavailable)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn unavailable(e: reqwest::Error) -> RagError {
    RagError::IndexUnavailable { backend: BACKEND.into(), message: e.to_string() }
}

/// Turn a non-success response into an error, keeping the service's message.
async fn check_status(response: Response, index: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .and_then(ErrorResponse::into_message)
        .unwrap_or(body);

    error!(backend = BACKEND, %status, index, "API error");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RagError::ConfigError(format!(
            "Pinecone rejected the API key ({status}): {detail}"
        ))),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(RagError::IndexConfigError { index: index.to_string(), message: detail })
        }
        _ => Err(RagError::IndexUnavailable {
            backend: BACKEND.into(),
            message: format!("API returned {status}: {detail}"),
        }),
    }
}

// ── Pinecone API request/response types ────────────────────────────

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    serverless: Serverless<'a>,
}

#[derive(Serialize)]
struct Serverless<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct IndexDescription {
    dimension: usize,
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
}

impl IndexDescription {
    fn ready_host(&self) -> Option<String> {
        self.host.as_deref().filter(|h| !h.is_empty()).map(normalize_host)
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

#[derive(Deserialize)]
struct ScoredVector {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Serialize)]
struct StatsRequest {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: u64,
}

/// Error bodies differ between the control plane (`{"error": {...}}`) and the
/// data plane (`{"message": ...}`).
#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.error.map(|e| e.message).or(self.message)
    }
}

// ── VectorIndex implementation ─────────────────────────────────────

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let description = match self.describe().await? {
            Some(existing) => {
                if existing.dimension != spec.dimension || existing.metric != spec.metric {
                    return Err(RagError::IndexConfigError {
                        index: spec.name.clone(),
                        message: format!(
                            "index exists with dimension {} and metric {}, requested {} and {}",
                            existing.dimension, existing.metric, spec.dimension, spec.metric
                        ),
                    });
                }
                debug!(index = %spec.name, "pinecone index already exists, skipping creation");
                Some(existing)
            }
            None => {
                let created = self.create(spec).await?;
                info!(
                    index = %spec.name,
                    dimension = spec.dimension,
                    metric = %spec.metric,
                    "created pinecone index"
                );
                created
            }
        };

        if let Some(host) = description.as_ref().and_then(IndexDescription::ready_host) {
            let _ = self.host.set(host);
        }
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = UpsertRequest { vectors: records, namespace: self.config.namespace.as_deref() };
        let response: Option<UpsertResponse> = self.data_request("vectors/upsert", &body).await?;
        let response = response.ok_or_else(|| RagError::IndexUnavailable {
            backend: BACKEND.into(),
            message: format!("index '{}' does not exist", self.config.index_name),
        })?;

        debug!(
            backend = BACKEND,
            count = records.len(),
            upserted = response.upserted_count,
            "upserted vectors"
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Match>> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            filter,
            namespace: self.config.namespace.as_deref(),
        };
        let response: Option<QueryResponse> = self.data_request("query", &body).await?;
        let Some(response) = response else {
            debug!(backend = BACKEND, "index not found during query, returning no matches");
            return Ok(Vec::new());
        };

        Ok(response
            .matches
            .into_iter()
            .map(|m| Match::new(m.id, m.score, m.metadata.unwrap_or_default()))
            .collect())
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = DeleteRequest { ids, namespace: self.config.namespace.as_deref() };
        let _: Option<serde_json::Value> = self.data_request("vectors/delete", &body).await?;
        debug!(backend = BACKEND, count = ids.len(), "deleted vectors");
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response: Option<StatsResponse> =
            self.data_request("describe_index_stats", &StatsRequest {}).await?;
        let response = response.ok_or_else(|| RagError::IndexUnavailable {
            backend: BACKEND.into(),
            message: format!("index '{}' does not exist", self.config.index_name),
        })?;
        Ok(IndexStats {
            dimension: response.dimension,
            total_vector_count: response.total_vector_count,
        })
    }
}
