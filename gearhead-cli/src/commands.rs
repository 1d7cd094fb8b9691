use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use gearhead_rag::pinecone::{PineconeConfig, PineconeIndex};
use gearhead_rag::{
    CitationFormatter, Embedder, FastEmbedEmbedder, Filter, IndexClient, IndexSettings,
    IngestionPipeline, RagConfig, Retriever, load_documents, render_sources,
};
use tracing::info;

const PREVIEW_CHARS: usize = 100;

/// Services wired from environment configuration.
///
/// The embedding model is only loaded by commands that embed text.
pub struct App {
    config: RagConfig,
    index: IndexClient,
    formatter: CitationFormatter,
    model: String,
    model_cache: Option<PathBuf>,
}

impl App {
    pub fn from_env(model_cache: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = IndexSettings::from_env().context("failed to read index settings")?;
        info!(?settings, "loaded settings");
        Self::from_settings(&settings, model_cache)
    }

    fn from_settings(
        settings: &IndexSettings,
        model_cache: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let config = RagConfig::default();
        let pinecone = PineconeIndex::new(PineconeConfig::from_settings(settings))?;
        let index = IndexClient::new(Arc::new(pinecone), settings.index_name.clone())
            .with_batch_size(config.upsert_batch_size)?;

        let formatter = match &settings.base_pdf_url {
            Some(base) => CitationFormatter::new().with_base_url(base.clone()),
            None => CitationFormatter::new(),
        };

        Ok(Self {
            config,
            index,
            formatter,
            model: settings.embedding_model.clone(),
            model_cache,
        })
    }

    async fn load_embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder = FastEmbedEmbedder::load(&self.model, self.model_cache.clone())
            .await
            .with_context(|| format!("failed to load embedding model {}", self.model))?;
        Ok(Arc::new(embedder))
    }

    fn pipeline(&self, embedder: Arc<dyn Embedder>) -> anyhow::Result<IngestionPipeline> {
        Ok(IngestionPipeline::builder()
            .config(self.config.clone())
            .embedder(embedder)
            .index(self.index.clone())
            .build()?)
    }

    pub async fn ingest(&self, file: &Path) -> anyhow::Result<()> {
        let documents = load_documents(file).await?;
        println!("Loaded {} documents from {}", documents.len(), file.display());

        let pipeline = self.pipeline(self.load_embedder().await?)?;
        pipeline.ensure_index().await?;
        let report = pipeline.ingest(&documents).await?;

        println!("Upserted {} chunks to '{}'", report.chunks_written, self.index.name());
        if !report.is_complete() {
            println!("Skipped {} chunks that could not be embedded:", report.skipped.len());
            for failure in &report.skipped {
                println!("  {}: {}", failure.id, failure.reason);
            }
        }
        Ok(())
    }

    pub async fn ensure_index(&self) -> anyhow::Result<()> {
        let embedder = self.load_embedder().await?;
        let dimensions = embedder.dimensions();
        self.pipeline(embedder)?.ensure_index().await?;
        println!(
            "Index '{}' is ready ({} dimensions, {} metric)",
            self.index.name(),
            dimensions,
            self.config.metric
        );
        Ok(())
    }

    /// Without `top_k`, the configured default is used.
    pub async fn query(
        &self,
        question: &str,
        top_k: Option<usize>,
        filter: Option<&str>,
    ) -> anyhow::Result<()> {
        let filter = filter.map(parse_filter).transpose()?;
        let embedder = self.load_embedder().await?;
        let index = self.index.clone().with_dimension(embedder.dimensions());
        let retriever = Retriever::new(embedder, index, &self.config);
        let top_k = top_k.unwrap_or(retriever.top_k());
        let retrieval = retriever.retrieve(question, top_k, filter.as_ref()).await?;

        println!("Query: '{question}'");
        if let Some(reason) = &retrieval.degraded {
            println!("Index unavailable, no context retrieved: {reason}");
            return Ok(());
        }
        println!("Found {} results", retrieval.matches.len());

        let citations = retrieval.citations(&self.formatter);
        for (i, (m, citation)) in retrieval.matches.iter().zip(&citations).enumerate() {
            println!("\n--- Result {} ---", i + 1);
            println!("ID: {}", m.id);
            println!("Score: {:.4}", m.score);
            println!("Text preview: {}...", preview(&m.text));
            println!("Metadata: {}", serde_json::to_string_pretty(&m.metadata)?);
            println!("Citation: {citation}");
        }
        print!("{}", render_sources(&citations));
        println!();
        Ok(())
    }

    pub async fn stats(&self) -> anyhow::Result<()> {
        let stats = self.index.stats().await?;
        println!("Index: {}", self.index.name());
        println!("Dimension: {}", stats.dimension);
        println!("Vectors: {}", stats.total_vector_count);
        Ok(())
    }
}

fn parse_filter(raw: &str) -> anyhow::Result<Filter> {
    let value: serde_json::Value = serde_json::from_str(raw).context("filter is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("filter must be a JSON object"),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
