//! Citation lookup: find the clause that best supports an answer span.
//!
//! Candidates come from the document digest (each section's summary, facts
//! and compliance notes, placed at `section index * CHARS_PER_PAGE`) followed
//! by up to [`MAX_SENTENCES`] sentences of the full text at their real
//! offsets. Every candidate is scored with the same overlap function the
//! retriever uses; the first candidate with the highest score wins, so the
//! result is deterministic for identical inputs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Citation, LoadedDocument};
use crate::search::{overlap_score, page_for_offset, tokenize, CHARS_PER_PAGE};

/// Longest clause returned.
pub const MAX_CLAUSE_CHARS: usize = 220;
/// Length of the summary excerpt used for low-confidence fallbacks.
pub const FALLBACK_CHARS: usize = 200;
pub const MAX_SENTENCES: usize = 800;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("valid regex"));

/// A sentence of the source text and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    pub start: usize,
}

/// Split on sentence-ending punctuation followed by whitespace. The
/// punctuation stays with its sentence; offsets point into `text`.
pub fn split_sentences(text: &str, limit: usize) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut begin = 0;
    let ends = SENTENCE_END
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((text.len(), text.len())));
    for (end, next) in ends {
        if sentences.len() >= limit {
            break;
        }
        let punct_len = text[end..next].trim_end().len();
        let raw = &text[begin..end + punct_len];
        let lead = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            sentences.push(Sentence {
                text: trimmed,
                start: begin + lead,
            });
        }
        begin = next;
        if begin >= text.len() {
            break;
        }
    }
    sentences
}

/// Locate the best supporting clause for `answer_span` in `doc`.
pub fn locate(doc: &LoadedDocument, answer_span: &str) -> Citation {
    let tokens = tokenize(answer_span);
    if tokens.is_empty() {
        return summary_fallback(doc);
    }

    let mut candidates: Vec<(&str, usize)> = Vec::new();
    for (index, section) in doc.digest.sections.iter().enumerate() {
        let offset = index * CHARS_PER_PAGE;
        candidates.push((section.summary.as_str(), offset));
        candidates.extend(section.facts.iter().map(|f| (f.as_str(), offset)));
        candidates.extend(section.compliance_notes.iter().map(|n| (n.as_str(), offset)));
    }
    candidates.extend(
        split_sentences(&doc.text, MAX_SENTENCES)
            .into_iter()
            .map(|s| (s.text, s.start)),
    );

    let mut best: Option<(f64, &str, usize)> = None;
    for (text, offset) in candidates {
        if text.trim().is_empty() {
            continue;
        }
        let score = overlap_score(&tokens, text);
        if best.map_or(true, |(top, _, _)| score > top) {
            best = Some((score, text, offset));
        }
    }

    match best {
        Some((score, text, offset)) if score > 0.0 => Citation {
            clause: truncate(text.trim(), MAX_CLAUSE_CHARS),
            page: page_for_offset(offset),
        },
        _ => match doc.digest.highlights.iter().find(|h| !h.trim().is_empty()) {
            Some(highlight) => Citation {
                clause: truncate(highlight.trim(), MAX_CLAUSE_CHARS),
                page: 1,
            },
            None => summary_fallback(doc),
        },
    }
}

/// First [`FALLBACK_CHARS`] of the summary (or of the text when the
/// document has no summary) at page 1.
fn summary_fallback(doc: &LoadedDocument) -> Citation {
    let source = if doc.digest.summary.trim().is_empty() {
        doc.text.trim()
    } else {
        doc.digest.summary.trim()
    };
    Citation {
        clause: truncate(source, FALLBACK_CHARS),
        page: 1,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
