//! Format dispatch for text extraction.
//!
//! Callers supply bytes plus a [`DocumentFormat`]; this module returns plain
//! UTF-8 text and an estimated page count. No network or filesystem access
//! happens here.

use tracing::debug;

use crate::container::DEFAULT_MAX_ENTRY_BYTES;
use crate::error::{Error, Result};
use crate::models::DocumentFormat;
use crate::search::CHARS_PER_PAGE;
use crate::{docx, pdf, xlsx};

/// Below this many characters a PDF is treated as having no text layer.
pub const DEFAULT_MIN_PDF_CHARS: usize = 20;

/// Extraction limits.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub min_pdf_chars: usize,
    pub max_entry_bytes: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_pdf_chars: DEFAULT_MIN_PDF_CHARS,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

/// Output of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub page_count: usize,
}

/// Extract text from `bytes` interpreted as `format`.
///
/// PDFs yielding fewer than `min_pdf_chars` characters fail with
/// [`Error::EmptyExtraction`] so the caller can try OCR.
pub fn extract(bytes: &[u8], format: DocumentFormat, opts: &ExtractOptions) -> Result<Extracted> {
    let extracted = match format {
        DocumentFormat::Pdf => {
            let text = match pdf::extract_text(bytes) {
                Ok(text) => text,
                Err(Error::EmptyExtraction { .. }) => String::new(),
                Err(e) => return Err(e),
            };
            let chars = text.trim().chars().count();
            if chars < opts.min_pdf_chars {
                return Err(Error::EmptyExtraction {
                    format,
                    chars,
                    min: opts.min_pdf_chars,
                });
            }
            let pages = pdf::count_pages(bytes);
            Extracted {
                page_count: if pages > 0 { pages } else { estimate_pages(&text) },
                text,
            }
        }
        DocumentFormat::Docx => {
            let text = docx::extract_text(bytes, opts.max_entry_bytes)?;
            Extracted {
                page_count: estimate_pages(&text),
                text,
            }
        }
        DocumentFormat::Xlsx => {
            let text = xlsx::extract_sheets(bytes, opts.max_entry_bytes)?;
            Extracted {
                page_count: estimate_pages(&text),
                text,
            }
        }
    };
    debug!(
        %format,
        chars = extracted.text.len(),
        pages = extracted.page_count,
        "extracted document"
    );
    Ok(extracted)
}

/// Pages implied by text length at [`CHARS_PER_PAGE`], at least 1.
pub fn estimate_pages(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_PAGE).max(1)
}

/// Trim and collapse every whitespace run to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::build_zip;

    #[test]
    fn collapse_whitespace_trims_and_joins() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace(" \n "), "");
    }

    #[test]
    fn page_estimate_is_at_least_one() {
        assert_eq!(estimate_pages(""), 1);
        assert_eq!(estimate_pages(&"x".repeat(1800)), 1);
        assert_eq!(estimate_pages(&"x".repeat(1801)), 2);
    }

    #[test]
    fn short_pdf_is_empty_extraction() {
        let pdf = b"%PDF-1.4\n(tiny) Tj\n%%EOF";
        let err = extract(pdf, DocumentFormat::Pdf, &ExtractOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::EmptyExtraction { chars: 4, min: 20, .. }
        ));
    }

    #[test]
    fn pdf_without_text_is_empty_extraction() {
        let err = extract(b"%PDF-1.4\n%%EOF", DocumentFormat::Pdf, &ExtractOptions::default())
            .unwrap_err();
        assert!(err.is_empty_extraction());
    }

    #[test]
    fn pdf_page_count_prefers_page_objects() {
        let pdf = b"%PDF-1.4\n<< /Type /Page >>\n<< /Type /Page >>\n(A sentence that is long enough to keep) Tj\n%%EOF";
        let out = extract(pdf, DocumentFormat::Pdf, &ExtractOptions::default()).unwrap();
        assert_eq!(out.page_count, 2);
        assert_eq!(out.text, "A sentence that is long enough to keep");
    }

    #[test]
    fn docx_dispatches_to_body_reader() {
        let zip = build_zip(&[(
            "word/document.xml",
            b"<w:document><w:body><w:p><w:r><w:t>hello docx</w:t></w:r></w:p></w:body></w:document>",
            true,
        )]);
        let out = extract(&zip, DocumentFormat::Docx, &ExtractOptions::default()).unwrap();
        assert_eq!(out.text, "hello docx");
        assert_eq!(out.page_count, 1);
    }

    #[test]
    fn container_errors_propagate() {
        let err = extract(b"garbage", DocumentFormat::Xlsx, &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
