//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text on the coarsest boundary that keeps pieces under the size
//! limit: paragraph break, line break, sentence end, word boundary, and
//! finally single characters.
//!
//! Sizes are measured in characters (Unicode scalar values), never bytes.

use std::collections::VecDeque;

use serde_json::Value;

use crate::config::RagConfig;
use crate::document::{Chunk, Document, chunk_id};
use crate::error::{RagError, Result};

/// Separators in the order they are tried. The empty separator splits into
/// single characters.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document at the same
/// position always yields the same chunks, which keeps re-ingestion
/// idempotent.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// `document_index` is the document's position in the ingested corpus and
    /// becomes part of every chunk id.
    fn chunk(&self, document: &Document, document_index: usize) -> Vec<Chunk>;
}

/// Splits text hierarchically with overlap between adjacent chunks.
///
/// A separator stays attached to the start of the piece that follows it, so
/// a chunk cut at a sentence end can begin with `". "` (trimmed to `"."` when
/// nothing follows it).
///
/// # Example
///
/// ```rust,ignore
/// use gearhead_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50)?;
/// let pieces = chunker.split_text(&page_text);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the sizes in a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split text into trimmed, non-empty pieces of at most `chunk_size`
    /// characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut chunks, piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily merge small pieces into chunks, carrying up to
    /// `chunk_overlap` characters of the previous chunk into the next one.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, window.iter().map(|(p, _)| *p).collect());

                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut chunks, window.iter().map(|(p, _)| *p).collect());
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document, document_index: usize) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        let base = document.metadata();
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| {
                let mut metadata = base.clone();
                metadata.insert("text".into(), Value::String(text.clone()));
                metadata.insert("document_index".into(), Value::from(document_index));
                metadata.insert("chunk_index".into(), Value::from(chunk_index));
                Chunk { id: chunk_id(document_index, chunk_index), text, metadata }
            })
            .collect()
    }
}

/// Pick the first separator present in `text`, returning it along with the
/// finer separators to fall back to.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split text before each occurrence of `separator`, so the separator stays
/// at the start of the following piece. An empty separator yields single
/// characters.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        pieces.push(&text[start..pos]);
        start = pos;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn push_trimmed(chunks: &mut Vec<String>, text: String) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
