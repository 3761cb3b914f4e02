//! Lexical chunk retrieval.
//!
//! # Scoring
//!
//! 1. Tokenise the query: lower-case, split on everything except letters,
//!    digits and `%`, keep tokens of 3..=39 characters.
//! 2. Overlap: fraction of query tokens found as substrings of the
//!    lower-cased chunk text.
//! 3. Positional boost: `0.05 * (n - index) / n`. Earlier chunks get the
//!    larger boost.
//! 4. Keep chunks with overlap > 0, sort by score (desc, stable), truncate
//!    to `k`.
//! 5. If no chunk overlaps at all, return the first `k` chunks with score 0.
//!
//! Pages are estimated from byte offsets at [`CHARS_PER_PAGE`].

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{RagChunk, ScoredHit};

/// Assumed average characters per page for page estimates.
pub const CHARS_PER_PAGE: usize = 1800;
pub const DEFAULT_K: usize = 8;
pub const MAX_K: usize = 32;

const MIN_TOKEN_CHARS: usize = 3;
const MAX_TOKEN_CHARS: usize = 39;
const POSITION_BOOST: f64 = 0.05;

/// Split `text` into lower-cased query tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '%'))
        .filter(|t| {
            let n = t.chars().count();
            (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&n)
        })
        .map(str::to_string)
        .collect()
}

/// Fraction of `tokens` occurring in `text` (case-insensitive substring).
pub fn overlap_score(tokens: &[String], text: &str) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / tokens.len() as f64
}

/// Estimated 1-based page for a byte offset.
pub fn page_for_offset(offset: usize) -> usize {
    (offset / CHARS_PER_PAGE + 1).max(1)
}

/// Clamp a result count into `[1, MAX_K]`, defaulting to [`DEFAULT_K`].
pub fn clamp_k(k: Option<usize>) -> usize {
    k.unwrap_or(DEFAULT_K).clamp(1, MAX_K)
}

/// Parse a caller-supplied `k`. Non-numeric input is an argument error;
/// numeric values are clamped.
pub fn parse_k(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<i64>()
        .map(|k| k.clamp(1, MAX_K as i64) as usize)
        .map_err(|_| Error::InvalidArgument(format!("k must be an integer, got '{}'", raw)))
}

/// Rank `chunks` against `query`.
pub fn search(chunks: &[RagChunk], query: &str, k: Option<usize>) -> Vec<ScoredHit> {
    let k = clamp_k(k);
    let tokens = tokenize(query);
    let total = chunks.len();

    let mut scored: Vec<(f64, &RagChunk)> = chunks
        .iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let overlap = overlap_score(&tokens, &chunk.text);
            if overlap <= 0.0 {
                return None;
            }
            let boost = POSITION_BOOST * (total - index) as f64 / total as f64;
            Some((overlap + boost, chunk))
        })
        .collect();

    if scored.is_empty() {
        return chunks
            .iter()
            .take(k)
            .map(|chunk| hit(chunk, 0.0))
            .collect();
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored
        .into_iter()
        .take(k)
        .map(|(score, chunk)| hit(chunk, score))
        .collect()
}

fn hit(chunk: &RagChunk, score: f64) -> ScoredHit {
    ScoredHit {
        chunk_id: chunk.id.clone(),
        page: page_for_offset(chunk.start),
        score,
        text: chunk.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::build_chunks;

    fn chunk(id: &str, start: usize, text: &str) -> RagChunk {
        RagChunk {
            id: id.to_string(),
            start,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_tokenize_filters_length_and_punctuation() {
        assert_eq!(tokenize("GST obligations, 10% of it!"), vec!["gst", "obligations", "10%"]);
        assert!(tokenize("a an to").is_empty());
        assert!(tokenize(&"x".repeat(40)).is_empty());
        assert_eq!(tokenize(&"y".repeat(39)).len(), 1);
    }

    #[test]
    fn test_overlap_score() {
        let tokens = tokenize("invoice total amount");
        assert!((overlap_score(&tokens, "The Invoice TOTAL is due") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(overlap_score(&[], "anything"), 0.0);
    }

    #[test]
    fn test_relevant_chunk_ranks_first() {
        let chunks = vec![
            chunk("c0", 0, "Company overview and directors."),
            chunk("c1", 100, "Revenue grew this year."),
            chunk("c2", 200, "Payroll summary."),
            chunk("c3", 4000, "Our GST obligations are lodged quarterly."),
            chunk("c4", 5000, "Appendix."),
        ];
        let hits = search(&chunks, "GST obligations", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c3");
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].page, 3);
    }

    #[test]
    fn test_position_boost_breaks_ties_toward_front() {
        let chunks = vec![
            chunk("a", 0, "tax return"),
            chunk("b", 10, "tax return"),
        ];
        let hits = search(&chunks, "tax return", None);
        assert_eq!(hits[0].chunk_id, "a");
        assert!((hits[0].score - 1.05).abs() < 1e-9);
        assert!((hits[1].score - 1.025).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_returns_first_k_with_zero_score() {
        let text = (0..20)
            .map(|i| format!("Paragraph {}", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = build_chunks(&text);
        for query in ["", "?? !!", "zzzzqqq"] {
            let hits = search(&chunks, query, Some(5));
            assert_eq!(hits.len(), 5);
            assert!(hits.iter().all(|h| h.score == 0.0));
            assert_eq!(hits[0].chunk_id, chunks[0].id);
        }
    }

    #[test]
    fn test_k_is_clamped() {
        let chunks: Vec<RagChunk> = (0..40).map(|i| chunk(&i.to_string(), i, "ledger")).collect();
        assert_eq!(search(&chunks, "ledger", Some(0)).len(), 1);
        assert_eq!(search(&chunks, "ledger", Some(100)).len(), MAX_K);
        assert_eq!(search(&chunks, "ledger", None).len(), DEFAULT_K);
    }

    #[test]
    fn test_parse_k() {
        assert_eq!(parse_k("5").unwrap(), 5);
        assert_eq!(parse_k("-3").unwrap(), 1);
        assert_eq!(parse_k("99").unwrap(), MAX_K);
        assert!(matches!(parse_k("five"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_page_for_offset() {
        assert_eq!(page_for_offset(0), 1);
        assert_eq!(page_for_offset(1799), 1);
        assert_eq!(page_for_offset(1800), 2);
    }

    #[test]
    fn test_empty_chunk_list() {
        assert!(search(&[], "anything", None).is_empty());
    }
}
