//! In-memory vector index.
//!
//! This module provides [`InMemoryIndex`], a dependency-free [`VectorIndex`]
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for tests, demos, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::{Match, VectorRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{Filter, IndexSpec, IndexStats, Metric, VectorIndex};

const BACKEND: &str = "in-memory";

#[derive(Debug, Default)]
struct State {
    spec: Option<IndexSpec>,
    records: HashMap<String, VectorRecord>,
}

/// An in-memory vector index.
///
/// Holds a single index whose shape is fixed by the first
/// [`ensure_index`](VectorIndex::ensure_index) call. Upserts replace records
/// with the same id.
///
/// # Example
///
/// ```rust,ignore
/// use gearhead_rag::{InMemoryIndex, IndexSpec, Metric, VectorIndex};
///
/// let index = InMemoryIndex::new();
/// index.ensure_index(&IndexSpec::new("docs", 384, Metric::Cosine)).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    /// Create an index that does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index that already has the given shape.
    pub fn with_spec(spec: IndexSpec) -> Self {
        Self { state: RwLock::new(State { spec: Some(spec), records: HashMap::new() }) }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns `true` if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up a stored record by id.
    pub async fn get(&self, id: &str) -> Option<VectorRecord> {
        self.state.read().await.records.get(id).cloned()
    }
}

fn missing_index() -> RagError {
    RagError::IndexUnavailable {
        backend: BACKEND.to_string(),
        message: "index does not exist".to_string(),
    }
}

fn check_dimension(spec: &IndexSpec, len: usize, what: &str) -> Result<()> {
    if len != spec.dimension {
        return Err(RagError::IndexConfigError {
            index: spec.name.clone(),
            message: format!("{what} has {len} dimensions, index expects {}", spec.dimension),
        });
    }
    Ok(())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::DotProduct => dot_product(a, b),
        Metric::Euclidean => {
            let distance: f32 =
                a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Evaluate a metadata filter against a record's metadata.
///
/// Supports plain equality and the `$eq`, `$ne`, `$in` and `$nin` operators.
fn matches_filter(metadata: &serde_json::Map<String, Value>, filter: &Filter) -> Result<bool> {
    for (field, condition) in filter {
        let actual = metadata.get(field);
        let operators = match condition {
            Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => ops,
            expected => {
                if !actual.is_some_and(|v| values_equal(v, expected)) {
                    return Ok(false);
                }
                continue;
            }
        };

        for (op, operand) in operators {
            let listed = |operand: &Value| match (operand.as_array(), actual) {
                (Some(items), Some(v)) => Ok(items.iter().any(|item| values_equal(item, v))),
                (Some(_), None) => Ok(false),
                (None, _) => {
                    Err(RagError::ConfigError(format!("{op} on '{field}' expects an array")))
                }
            };
            let ok = match op.as_str() {
                "$eq" => actual.is_some_and(|v| values_equal(v, operand)),
                "$ne" => !actual.is_some_and(|v| values_equal(v, operand)),
                "$in" => listed(operand)?,
                "$nin" => !listed(operand)?,
                other => {
                    return Err(RagError::ConfigError(format!(
                        "unsupported filter operator '{other}' on '{field}'"
                    )));
                }
            };
            if !ok {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = &state.spec {
            if existing.dimension != spec.dimension || existing.metric != spec.metric {
                return Err(RagError::IndexConfigError {
                    index: existing.name.clone(),
                    message: format!(
                        "index exists with dimension {} and metric {}, requested {} and {}",
                        existing.dimension, existing.metric, spec.dimension, spec.metric
                    ),
                });
            }
            return Ok(());
        }
        state.spec = Some(spec.clone());
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        let spec = state.spec.clone().ok_or_else(missing_index)?;
        for record in records {
            check_dimension(&spec, record.values.len(), &format!("record '{}'", record.id))?;
        }
        for record in records {
            state.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Match>> {
        let state = self.state.read().await;
        let spec = state.spec.as_ref().ok_or_else(missing_index)?;
        check_dimension(spec, vector.len(), "query vector")?;

        let mut scored = Vec::new();
        for record in state.records.values() {
            if let Some(filter) = filter {
                if !matches_filter(&record.metadata, filter)? {
                    continue;
                }
            }
            let score = score(spec.metric, &record.values, vector);
            scored.push(Match::new(record.id.clone(), score, record.metadata.clone()));
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[&str]) -> Result<()> {
        let mut state = self.state.write().await;
        if state.spec.is_none() {
            return Err(missing_index());
        }
        for id in ids {
            state.records.remove(*id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().await;
        let spec = state.spec.as_ref().ok_or_else(missing_index)?;
        Ok(IndexStats { dimension: spec.dimension, total_vector_count: state.records.len() as u64 })
    }
}
