//! Core data models shared by the extraction and retrieval pipeline.
//!
//! A [`LoadedDocument`] is built once per upload and then only read: its
//! chunks feed [`search`](crate::search::search) and its text plus the
//! optional [`DocumentDigest`] feed [`locate`](crate::citation::locate).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunk::{build_chunks, normalize_newlines};
use crate::error::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Input format tag supplied by the caller alongside the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Xlsx => "xlsx",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::UnknownFormat(path.display().to_string()))?;
        ext.parse()
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    /// Accepts short tags (`pdf`), extensions (`.pdf`) and MIME types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match tag.as_str() {
            "pdf" | MIME_PDF => Ok(DocumentFormat::Pdf),
            "docx" | MIME_DOCX => Ok(DocumentFormat::Docx),
            "xlsx" | MIME_XLSX => Ok(DocumentFormat::Xlsx),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

/// An addressable excerpt of a document's flat text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagChunk {
    /// Opaque unique id (UUID v4).
    pub id: String,
    /// Byte offset of the paragraph in the parent document's text.
    pub start: usize,
    /// At most 600 characters of the paragraph.
    pub text: String,
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredHit {
    pub chunk_id: String,
    /// Estimated 1-based page.
    pub page: usize,
    pub score: f64,
    pub text: String,
}

/// A supporting clause for an answer span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// At most 220 characters.
    pub clause: String,
    /// Estimated 1-based page.
    pub page: usize,
}

/// Externally produced summary of one document section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionDigest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub compliance_notes: Vec<String>,
}

/// Summary material generated outside the engine (e.g. by an LLM) and
/// attached to a document so citations can point at it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDigest {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub sections: Vec<SectionDigest>,
}

/// The fully extracted and indexed form of one document.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedDocument {
    /// Flat text with `\n` line endings.
    pub text: String,
    pub chunks: Vec<RagChunk>,
    /// Estimated page count.
    pub page_count: usize,
    /// Caller-supplied extraction warnings (e.g. `ocr-fallback`).
    pub warnings: Vec<String>,
    pub digest: DocumentDigest,
}

impl LoadedDocument {
    /// Normalise line endings and index the text.
    pub fn new(text: &str, page_count: usize) -> Self {
        let text = normalize_newlines(text);
        let chunks = build_chunks(&text);
        Self {
            text,
            chunks,
            page_count: page_count.max(1),
            warnings: Vec::new(),
            digest: DocumentDigest::default(),
        }
    }

    /// Record a warning once.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
        self
    }

    pub fn with_digest(mut self, digest: DocumentDigest) -> Self {
        self.digest = digest;
        self
    }

    /// Rank this document's chunks against `query`.
    pub fn search(&self, query: &str, k: Option<usize>) -> Vec<ScoredHit> {
        crate::search::search(&self.chunks, query, k)
    }

    /// Find the clause that best supports `answer_span`.
    pub fn locate(&self, answer_span: &str) -> Citation {
        crate::citation::locate(self, answer_span)
    }
}
