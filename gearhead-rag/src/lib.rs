//! Retrieval and citation layer for equipment-manual question answering.
//!
//! This crate provides:
//! - Recursive, overlap-preserving document chunking
//! - Text embedding behind the [`Embedder`] trait (local fastembed models, or
//!   a deterministic hash embedder for tests)
//! - Vector storage behind the [`VectorIndex`] trait (Pinecone, or in-memory)
//! - An ingestion pipeline with batched, idempotent upserts
//! - Query-time retrieval that degrades to "no context" when the index is down
//! - Deterministic citations that link to the exact page of the source PDF
//!
//! # Features
//!
//! - `pinecone`: the Pinecone REST backend
//! - `fastembed`: local sentence-transformer embeddings
//! - `full`: both

pub mod chunking;
pub mod citation;
pub mod client;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod pipeline;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "fastembed")]
pub mod fastembed;
#[cfg(feature = "pinecone")]
pub mod pinecone;

pub use chunking::{Chunker, RecursiveChunker};
pub use citation::{Citation, CitationFormatter, render_sources};
pub use client::IndexClient;
pub use config::{IndexSettings, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Match, Metadata, VectorRecord, load_documents};
pub use embedding::{Embedder, HashEmbedder};
pub use error::{BatchFailure, RagError, Result};
pub use inmemory::InMemoryIndex;
pub use pipeline::{ChunkFailure, IngestReport, IngestionPipeline, IngestionPipelineBuilder};
pub use retriever::{Retrieval, Retriever};
pub use vectorstore::{Filter, IndexSpec, IndexStats, Metric, VectorIndex};

#[cfg(feature = "fastembed")]
pub use crate::fastembed::FastEmbedEmbedder;
#[cfg(feature = "pinecone")]
pub use pinecone::{PineconeConfig, PineconeIndex};
