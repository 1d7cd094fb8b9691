//! Citation formatting.
//!
//! Turns the metadata of a retrieved [`Match`] into a human-readable
//! citation that links back to the exact page of the source PDF. Formatting
//! is pure and total: missing or malformed metadata falls back to defaults
//! instead of failing.
//!
//! # Resolution rules
//!
//! | Field  | Lookup order                                             | Default            |
//! |--------|----------------------------------------------------------|--------------------|
//! | source | `source`, `filename`                                     | `"Unknown Source"` |
//! | page   | `page`, `page_number`                                    | `1`                |
//! | link   | `pdf_url`, then base URL + `path`                        | none               |
//! | title  | `title`                                                  | resolved source    |
//!
//! Empty strings and nulls count as absent. Page numbers may be stored as
//! integers, floats (truncated), or numeric strings; zero and non-numeric
//! values fall through to the next field.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Match, Metadata};

const UNKNOWN_SOURCE: &str = "Unknown Source";

/// A formatted reference to a page of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Position of the cited match in the source list, starting at 1.
    pub ordinal: usize,
    /// Display title of the document.
    pub title: String,
    /// One-based page number.
    pub page: u32,
    /// URL of the PDF, without the page anchor.
    pub link: Option<String>,
}

impl Citation {
    /// The link with a `#page=N` anchor so PDF viewers open the cited page.
    pub fn anchored_link(&self) -> Option<String> {
        self.link.as_ref().map(|link| format!("{link}#page={}", self.page))
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchored_link() {
            Some(link) => write!(f, "[{}, p.{}]({link})", self.title, self.page),
            None => write!(f, "{}, p.{}", self.title, self.page),
        }
    }
}

/// Builds [`Citation`]s from match metadata.
///
/// The optional base URL is used to build links for records that only carry
/// a relative `path`.
#[derive(Debug, Clone, Default)]
pub struct CitationFormatter {
    base_url: Option<String>,
}

impl CitationFormatter {
    /// A formatter without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL that relative `path` metadata is resolved against.
    /// A blank value clears it.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = if base_url.trim().is_empty() { None } else { Some(base_url) };
        self
    }

    /// The configured base URL.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Format the citation for a match at the given position.
    pub fn format_citation(&self, m: &Match, ordinal: usize) -> Citation {
        self.format_metadata(&m.metadata, ordinal)
    }

    /// Format a citation directly from record metadata.
    pub fn format_metadata(&self, metadata: &Metadata, ordinal: usize) -> Citation {
        let source = string_field(metadata, "source")
            .or_else(|| string_field(metadata, "filename"))
            .unwrap_or(UNKNOWN_SOURCE);
        let page = page_field(metadata, "page").or_else(|| page_field(metadata, "page_number"));
        let title = string_field(metadata, "title").unwrap_or(source);

        Citation {
            ordinal,
            title: title.to_string(),
            page: page.unwrap_or(1),
            link: self.resolve_link(metadata),
        }
    }

    fn resolve_link(&self, metadata: &Metadata) -> Option<String> {
        if let Some(url) = string_field(metadata, "pdf_url") {
            return Some(url.to_string());
        }
        let path = string_field(metadata, "path")?;
        let base = self.base_url.as_deref()?;
        let relative = path.trim_start_matches('/');
        let relative = relative.strip_prefix("pdfs/").unwrap_or(relative);
        Some(format!("{}/{relative}", base.trim_end_matches('/')))
    }
}

/// Render the markdown source list appended to assistant answers.
///
/// Returns an empty string when there is nothing to cite.
pub fn render_sources(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n---\n**Sources:**");
    for citation in citations {
        out.push_str("\n- ");
        out.push_str(&citation.to_string());
    }
    out
}

fn string_field<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str).map(str::trim).filter(|v| !v.is_empty())
}

fn page_field(metadata: &Metadata, key: &str) -> Option<u32> {
    let value = metadata.get(key)?;
    let page = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(truncate_page)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(truncate_page))
        }
        _ => None,
    }?;
    u32::try_from(page).ok().filter(|p| *p > 0)
}

fn truncate_page(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 1.0).then(|| value.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn format(value: Value) -> String {
        CitationFormatter::new().format_metadata(&meta(value), 1).to_string()
    }

    #[test]
    fn pdf_url_produces_anchored_link() {
        let rendered = format(json!({
            "source": "CAT_Manual.pdf",
            "page": 42,
            "pdf_url": "https://x/y.pdf",
            "title": "CAT 320"
        }));
        assert_eq!(rendered, "[CAT 320, p.42](https://x/y.pdf#page=42)");
    }

    #[test]
    fn filename_and_page_number_fallbacks() {
        assert_eq!(format(json!({"filename": "M.pdf", "page_number": 7})), "M.pdf, p.7");
    }

    #[test]
    fn empty_metadata_uses_defaults() {
        assert_eq!(format(json!({})), "Unknown Source, p.1");
    }

    #[test]
    fn float_page_is_truncated() {
        assert_eq!(format(json!({"source": "a.pdf", "page": 42.0})), "a.pdf, p.42");
        assert_eq!(format(json!({"source": "a.pdf", "page": 3.9})), "a.pdf, p.3");
    }

    #[test]
    fn numeric_string_page_is_parsed() {
        assert_eq!(format(json!({"source": "a.pdf", "page": " 12 "})), "a.pdf, p.12");
        assert_eq!(format(json!({"source": "a.pdf", "page": "12.0"})), "a.pdf, p.12");
    }

    #[test]
    fn unusable_page_falls_through() {
        assert_eq!(format(json!({"source": "a.pdf", "page": 0, "page_number": 5})), "a.pdf, p.5");
        assert_eq!(format(json!({"source": "a.pdf", "page": null})), "a.pdf, p.1");
        assert_eq!(format(json!({"source": "a.pdf", "page": "n/a"})), "a.pdf, p.1");
        assert_eq!(format(json!({"source": "a.pdf", "page": -4})), "a.pdf, p.1");
    }

    #[test]
    fn blank_strings_count_as_absent() {
        let rendered = format(json!({
            "source": "",
            "filename": "b.pdf",
            "title": "  ",
            "pdf_url": ""
        }));
        assert_eq!(rendered, "b.pdf, p.1");
    }

    #[test]
    fn path_is_resolved_against_base_url() {
        let formatter = CitationFormatter::new().with_base_url("http://cdn/");
        let metadata = meta(json!({"source": "manual.pdf", "page": 3, "path": "pdfs/manual.pdf"}));
        let citation = formatter.format_metadata(&metadata, 1);
        assert_eq!(citation.to_string(), "[manual.pdf, p.3](http://cdn/manual.pdf#page=3)");

        let citation = formatter.format_metadata(&meta(json!({"path": "/docs/a.pdf"})), 1);
        assert_eq!(citation.link.as_deref(), Some("http://cdn/docs/a.pdf"));
    }

    #[test]
    fn path_without_base_url_has_no_link() {
        let metadata = meta(json!({"path": "pdfs/a.pdf"}));
        let citation = CitationFormatter::new().format_metadata(&metadata, 1);
        assert!(citation.link.is_none());

        let blank = CitationFormatter::new().with_base_url("   ");
        assert!(blank.base_url().is_none());
    }

    #[test]
    fn pdf_url_wins_over_path() {
        let formatter = CitationFormatter::new().with_base_url("http://cdn");
        let metadata = meta(json!({"pdf_url": "https://x/y.pdf", "path": "pdfs/z.pdf"}));
        let citation = formatter.format_metadata(&metadata, 1);
        assert_eq!(citation.link.as_deref(), Some("https://x/y.pdf"));
    }

    #[test]
    fn format_citation_is_deterministic() {
        let m = Match::new("doc_0_chunk_0", 0.8, meta(json!({"source": "a.pdf", "page": 2})));
        let formatter = CitationFormatter::new();
        assert_eq!(formatter.format_citation(&m, 2), formatter.format_citation(&m, 2));
        assert_eq!(formatter.format_citation(&m, 2).ordinal, 2);
    }

    #[test]
    fn render_sources_lists_citations() {
        let formatter = CitationFormatter::new();
        let citations = vec![
            formatter.format_metadata(&meta(json!({"source": "a.pdf", "page": 1})), 1),
            formatter.format_metadata(
                &meta(json!({"source": "b.pdf", "page": 9, "pdf_url": "https://x/b.pdf"})),
                2,
            ),
        ];
        assert_eq!(
            render_sources(&citations),
            "\n\n---\n**Sources:**\n- a.pdf, p.1\n- [b.pdf, p.9](https://x/b.pdf#page=9)"
        );
        assert_eq!(render_sources(&[]), "");
    }
}
