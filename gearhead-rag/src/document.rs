//! Data types for source documents, chunks, vector records, and matches.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RagError, Result};

/// Metadata attached to chunks and returned with matches.
///
/// Values keep their JSON type so that page numbers stored as numbers come
/// back as numbers.
pub type Metadata = serde_json::Map<String, Value>;

/// A page of a source manual, as read from the corpus file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the page.
    pub text: String,
    /// Filename or path of the source PDF.
    #[serde(default = "default_source")]
    pub source: String,
    /// Human-readable document title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// One-based page number within the source.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Absolute URL of the source PDF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Equipment category the manual belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
}

fn default_source() -> String {
    "unknown".to_string()
}

fn default_page() -> u32 {
    1
}

impl Document {
    /// Create a document with the given text and source and default fields.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            title: None,
            page: 1,
            pdf_url: None,
            equipment_type: None,
        }
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Set the absolute PDF URL.
    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    /// Set the equipment type.
    pub fn with_equipment_type(mut self, equipment_type: impl Into<String>) -> Self {
        self.equipment_type = Some(equipment_type.into());
        self
    }

    /// Metadata shared by every chunk of this document.
    ///
    /// Blank optional fields are left out, and `title` falls back to `source`.
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), Value::String(self.source.clone()));
        let title = non_blank(self.title.as_deref()).unwrap_or(&self.source);
        metadata.insert("title".into(), Value::String(title.to_string()));
        metadata.insert("page".into(), Value::from(self.page.max(1)));
        if let Some(url) = non_blank(self.pdf_url.as_deref()) {
            metadata.insert("pdf_url".into(), Value::String(url.to_string()));
        }
        if let Some(kind) = non_blank(self.equipment_type.as_deref()) {
            metadata.insert("equipment_type".into(), Value::String(kind.to_string()));
        }
        metadata
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Read a JSON array of [`Document`]s from disk.
///
/// # Errors
///
/// Returns [`RagError::DocumentError`] if the file cannot be read or is not a
/// JSON array of objects with a `text` field.
pub async fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| RagError::DocumentError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_documents(&raw).map_err(|e| RagError::DocumentError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Parse a JSON array of [`Document`]s.
pub fn parse_documents(raw: &str) -> serde_json::Result<Vec<Document>> {
    serde_json::from_str(raw)
}

/// A passage of a [`Document`] ready to be embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier: `doc_{document_index}_chunk_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Document metadata plus the chunk's own text and position.
    pub metadata: Metadata,
}

/// Build the identifier of a chunk from its document and chunk positions.
pub fn chunk_id(document_index: usize, chunk_index: usize) -> String {
    format!("doc_{document_index}_chunk_{chunk_index}")
}

/// A vector and its metadata as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Record identifier, equal to the originating [`Chunk::id`].
    pub id: String,
    /// The embedding.
    pub values: Vec<f32>,
    /// Metadata stored alongside the vector.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl VectorRecord {
    /// Pair a chunk with its embedding.
    pub fn from_chunk(chunk: Chunk, values: Vec<f32>) -> Self {
        Self { id: chunk.id, values, metadata: chunk.metadata }
    }
}

/// A retrieved record paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    /// Identifier of the matched record.
    pub id: String,
    /// Similarity score (higher is more relevant).
    pub score: f32,
    /// The chunk text, taken from the `text` metadata field.
    pub text: String,
    /// All metadata stored with the record.
    pub metadata: Metadata,
}

impl Match {
    /// Build a match from a record id, score, and its stored metadata.
    pub fn new(id: impl Into<String>, score: f32, metadata: Metadata) -> Self {
        let text = metadata.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
        Self { id: id.into(), score, text, metadata }
    }
}
