//! Paragraph-boundary chunk indexer.
//!
//! Splits a document's flat text into [`RagChunk`]s, one per paragraph, each
//! tagged with the byte offset where the paragraph starts.
//!
//! # Algorithm
//!
//! 1. Normalise `\r\n` and lone `\r` to `\n`.
//! 2. Split on runs of two or more newlines.
//! 3. For every non-empty trimmed paragraph, search for it starting at the
//!    end of the previous chunk. Searching forward keeps offsets correct
//!    when the same paragraph text appears more than once.
//! 4. Store at most [`MAX_CHUNK_CHARS`] characters of the paragraph.
//! 5. Stop after [`MAX_CHUNKS`] chunks.
//! 6. If nothing was produced for non-empty text, emit one chunk at offset 0.
//!
//! # Example
//!
//! ```rust
//! use docket_core::chunk::build_chunks;
//!
//! let chunks = build_chunks("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].start, 14);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::models::RagChunk;

/// Characters kept per chunk excerpt.
pub const MAX_CHUNK_CHARS: usize = 600;
/// Chunk cap for pathological inputs.
pub const MAX_CHUNKS: usize = 500;

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split text into paragraph chunks.
///
/// Offsets refer to the newline-normalised text, which is what
/// [`LoadedDocument`](crate::models::LoadedDocument) stores.
///
/// # Guarantees
///
/// - Non-empty text always yields at least one chunk.
/// - `start` is non-decreasing across the returned chunks.
/// - Every chunk except the single fallback chunk has non-empty trimmed text.
pub fn build_chunks(text: &str) -> Vec<RagChunk> {
    let normalized = normalize_newlines(text);
    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    for para in PARAGRAPH_BREAK.split(&normalized) {
        if chunks.len() >= MAX_CHUNKS {
            break;
        }
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let start = normalized[cursor..]
            .find(trimmed)
            .map(|pos| cursor + pos)
            .unwrap_or(cursor);
        cursor = start + trimmed.len();
        chunks.push(make_chunk(start, trimmed));
    }

    if chunks.is_empty() && !normalized.is_empty() {
        chunks.push(make_chunk(0, &normalized));
    }

    chunks
}

fn make_chunk(start: usize, text: &str) -> RagChunk {
    RagChunk {
        id: Uuid::new_v4().to_string(),
        start,
        text: text.chars().take(MAX_CHUNK_CHARS).collect(),
    }
}
