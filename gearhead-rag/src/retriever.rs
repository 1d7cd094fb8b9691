//! Query-time retrieval: embed a question and fetch the nearest chunks.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::citation::{Citation, CitationFormatter};
use crate::client::IndexClient;
use crate::config::RagConfig;
use crate::document::Match;
use crate::embedding::{Embedder, check_embedding};
use crate::error::Result;
use crate::vectorstore::Filter;

/// The chunks retrieved for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    /// The question that was asked.
    pub question: String,
    /// Matches ordered by descending score.
    pub matches: Vec<Match>,
    /// Set when the index could not be queried and retrieval fell back to no
    /// context. Holds the reason.
    pub degraded: Option<String>,
}

impl Retrieval {
    /// Returns `true` if the index was unavailable.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Returns `true` if nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matched texts as numbered `[Source N]` blocks for a prompt.
    pub fn context(&self) -> String {
        self.matches
            .iter()
            .enumerate()
            .map(|(i, m)| format!("[Source {}]\n{}", i + 1, m.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Format a citation for every match, numbered from 1.
    pub fn citations(&self, formatter: &CitationFormatter) -> Vec<Citation> {
        self.matches
            .iter()
            .enumerate()
            .map(|(i, m)| formatter.format_citation(m, i + 1))
            .collect()
    }
}

/// Embeds questions and queries the index for the most similar chunks.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: IndexClient,
    top_k: usize,
}

impl Retriever {
    /// Create a retriever that returns `config.top_k` matches by default.
    pub fn new(embedder: Arc<dyn Embedder>, index: IndexClient, config: &RagConfig) -> Self {
        Self { embedder, index, top_k: config.top_k }
    }

    /// Default number of matches.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve with the default `top_k` and no filter.
    pub async fn retrieve_default(&self, question: &str) -> Result<Retrieval> {
        self.retrieve(question, self.top_k, None).await
    }

    /// Retrieve the `top_k` chunks most similar to `question`.
    ///
    /// An unreachable or missing index is not an error: the result is empty
    /// and [`Retrieval::is_degraded`] returns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`](crate::RagError::EmbeddingError)
    /// if the question is empty or cannot be embedded. Other index errors,
    /// such as a filter the backend rejects, are returned as-is.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Retrieval> {
        let vector = self.embedder.embed(question).await?;
        check_embedding(self.embedder.model_id(), self.embedder.dimensions(), &vector)?;

        match self.index.try_query(&vector, top_k, filter).await {
            Ok(matches) => {
                debug!(top_k, result_count = matches.len(), "retrieved context");
                Ok(Retrieval { question: question.to_string(), matches, degraded: None })
            }
            Err(e) if e.is_unavailable() => {
                warn!(
                    index = %self.index.name(),
                    error = %e,
                    "index unavailable, answering without context"
                );
                Ok(Retrieval {
                    question: question.to_string(),
                    matches: Vec::new(),
                    degraded: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}
