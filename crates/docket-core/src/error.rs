//! Error types for extraction and retrieval.

use thiserror::Error;

use crate::models::DocumentFormat;

/// Errors produced by the engine.
///
/// Container-level structural failures propagate to the caller. Failures of a
/// single unit inside a document (one PDF stream, one worksheet) are logged and
/// swallowed by the extractors instead of surfacing here.
#[derive(Error, Debug)]
pub enum Error {
    /// The container is structurally broken (missing end-of-central-directory
    /// record, bad header signature, truncated entry).
    #[error("invalid container: {0}")]
    Format(String),

    /// A container entry uses a compression method other than stored/deflate.
    #[error("unsupported compression method {method} for entry '{name}'")]
    UnsupportedCompression {
        /// Entry name as recorded in the central directory.
        name: String,
        /// Raw compression method number.
        method: u16,
    },

    /// The entry is encrypted; password-protected containers are not read.
    #[error("entry '{0}' is encrypted")]
    Encrypted(String),

    /// Extraction ran but recovered too little text to be useful.
    #[error("no searchable text found in {format} ({chars} chars, need {min})")]
    EmptyExtraction {
        /// Format that was extracted.
        format: DocumentFormat,
        /// Number of non-whitespace-trimmed characters recovered.
        chars: usize,
        /// Minimum accepted.
        min: usize,
    },

    /// Caller passed a format tag the engine does not know.
    #[error("unknown document format: '{0}'. Use pdf, docx, or xlsx.")]
    UnknownFormat(String),

    /// Malformed retrieval argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Decompression failure surfaced to the caller.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when extraction succeeded mechanically but produced no usable text.
    pub fn is_empty_extraction(&self) -> bool {
        matches!(self, Error::EmptyExtraction { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
