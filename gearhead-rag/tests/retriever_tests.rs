//! Query-time retrieval tests.

use std::sync::Arc;

use async_trait::async_trait;
use gearhead_rag::{
    CitationFormatter, Embedder, HashEmbedder, InMemoryIndex, IndexClient, IndexSpec,
    IngestionPipeline, Metadata, Metric, RagConfig, RagError, Result, Retriever, VectorIndex,
    VectorRecord, render_sources,
};
use serde_json::json;

/// Maps every question to the same unit vector.
struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}

/// Always fails, like a model that could not be loaded.
struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError {
            provider: "broken".into(),
            message: "model missing".into(),
        })
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model_id(&self) -> &str {
        "broken"
    }
}

fn record(id: &str, values: Vec<f32>, metadata: serde_json::Value) -> VectorRecord {
    let metadata: Metadata = metadata.as_object().cloned().unwrap();
    VectorRecord { id: id.into(), values, metadata }
}

async fn seeded_index() -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::with_spec(IndexSpec::new("docs", 3, Metric::Cosine)));
    index
        .upsert(&[
            record(
                "near",
                vec![1.0, 0.0, 0.0],
                json!({"text": "Drain the coolant.", "source": "a.pdf", "page": 4}),
            ),
            record(
                "middle",
                vec![0.7, 0.7, 0.0],
                json!({"text": "Refill the coolant.", "source": "b.pdf", "page": 2.0}),
            ),
            record(
                "far",
                vec![0.0, 0.0, 1.0],
                json!({"text": "Check tyre pressure.", "filename": "c.pdf"}),
            ),
        ])
        .await
        .unwrap();
    index
}

fn retriever(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Retriever {
    Retriever::new(embedder, IndexClient::new(index, "docs"), &RagConfig::default())
}

#[tokio::test]
async fn returns_matches_by_descending_similarity() {
    let index = seeded_index().await;
    let retriever = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), index);

    let retrieval = retriever.retrieve("how do I drain coolant?", 2, None).await.unwrap();
    assert!(!retrieval.is_degraded());
    let ids: Vec<&str> = retrieval.matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "middle"]);
    assert!(retrieval.matches[0].score > retrieval.matches[1].score);
    assert_eq!(retrieval.matches[0].text, "Drain the coolant.");

    let all = retriever.retrieve_default("coolant").await.unwrap();
    assert_eq!(all.matches.len(), 3);
    assert_eq!(all.matches[2].id, "far");
}

#[tokio::test]
async fn filter_narrows_matches() {
    let index = seeded_index().await;
    let retriever = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), index);

    let filter = json!({"source": {"$eq": "b.pdf"}}).as_object().cloned().unwrap();
    let retrieval = retriever.retrieve("coolant", 3, Some(&filter)).await.unwrap();
    assert_eq!(retrieval.matches.len(), 1);
    assert_eq!(retrieval.matches[0].id, "middle");
}

#[tokio::test]
async fn retrieval_feeds_context_and_citations() {
    let index = seeded_index().await;
    let retriever = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])), index);

    let retrieval = retriever.retrieve_default("coolant").await.unwrap();
    assert!(retrieval.context().starts_with("[Source 1]\nDrain the coolant."));

    let formatter = CitationFormatter::new();
    let citations = retrieval.citations(&formatter);
    let rendered: Vec<String> = citations.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["a.pdf, p.4", "b.pdf, p.2", "c.pdf, p.1"]);
    assert!(render_sources(&citations).starts_with("\n\n---\n**Sources:**\n- a.pdf, p.4"));
}

#[tokio::test]
async fn missing_index_degrades_to_no_context() {
    let retriever = retriever(Arc::new(HashEmbedder::new(3)), Arc::new(InMemoryIndex::new()));

    let retrieval = retriever.retrieve("what oil does the D6 use?", 3, None).await.unwrap();
    assert!(retrieval.is_empty());
    assert!(retrieval.is_degraded());
    assert_eq!(retrieval.context(), "");
}

#[tokio::test]
async fn empty_index_is_empty_but_not_degraded() {
    let index = Arc::new(InMemoryIndex::with_spec(IndexSpec::new("docs", 3, Metric::Cosine)));
    let retriever = retriever(Arc::new(HashEmbedder::new(3)), index);

    let retrieval = retriever.retrieve("anything", 3, None).await.unwrap();
    assert!(retrieval.is_empty());
    assert!(!retrieval.is_degraded());
}

#[tokio::test]
async fn embedding_failures_are_errors() {
    let index = seeded_index().await;

    let broken = retriever(Arc::new(BrokenEmbedder), index.clone());
    let err = broken.retrieve("coolant", 3, None).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));

    let hash = retriever(Arc::new(HashEmbedder::new(3)), index);
    let err = hash.retrieve("   ", 3, None).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
}

#[tokio::test]
async fn ingested_corpus_is_retrievable() {
    let index = Arc::new(InMemoryIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let client = IndexClient::new(index.clone(), "docs");

    let pipeline = IngestionPipeline::builder()
        .embedder(embedder.clone())
        .index(client.clone())
        .build()
        .unwrap();
    pipeline.ensure_index().await.unwrap();
    pipeline
        .ingest(&[
            gearhead_rag::Document::new("replace hydraulic filter element", "hyd.pdf"),
            gearhead_rag::Document::new("adjust seat height lever", "cab.pdf"),
        ])
        .await
        .unwrap();

    let retriever = Retriever::new(embedder, client, &RagConfig::default());
    let retrieval = retriever.retrieve("hydraulic filter", 1, None).await.unwrap();
    assert_eq!(retrieval.matches.len(), 1);
    assert_eq!(retrieval.matches[0].metadata["source"], "hyd.pdf");
}
