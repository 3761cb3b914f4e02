//! Best-effort PDF text recovery by scanning content streams.
//!
//! No object graph is built: there is no cross-reference walking and no
//! font or encoding table lookup. Every `stream ... endstream` block is
//! decoded with the first compressed [`StreamDecoder`] that succeeds, or
//! taken as plain content when neither inflater accepts it, and scanned for
//! string literals shown by `Tj`, `'`, `"` or inside a `[...] TJ` array.
//! Bytes outside stream blocks are scanned too, to catch inline content.
//! Scanned or image-only PDFs yield little or nothing; callers fall back to
//! OCR in that case.

use std::io;
use std::ops::Range;

use flate2::{Decompress, FlushDecompress, Status};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::collapse_whitespace;
use crate::models::DocumentFormat;

static STREAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s-u)stream\r?\n(.*?)\r?\n?endstream").expect("valid regex"));

/// `[ ... ] TJ` arrays (group 1) or a single string shown by `Tj`, `'` or
/// `"` (group 2).
static SHOW_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s-u)\[((?:\\.|[^\\\]])*)\]\s*TJ|\(((?:\\.|[^\\)])*)\)\s*(?:Tj|'|")"#)
        .expect("valid regex")
});

static ARRAY_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s-u)\(((?:\\.|[^\\)])*)\)").expect("valid regex"));

static PAGE_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)/Type\s*/Page\b").expect("valid regex"));

/// One way of turning raw stream bytes into content-stream operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDecoder {
    /// zlib-wrapped deflate (`/FlateDecode`).
    Zlib,
    /// Deflate without the zlib header.
    RawDeflate,
    /// Already-plain content.
    Plain,
}

/// Strategies in the order they are tried.
pub const DECODERS: [StreamDecoder; 3] = [
    StreamDecoder::Zlib,
    StreamDecoder::RawDeflate,
    StreamDecoder::Plain,
];

/// Compressed strategies tried on every stream. [`StreamDecoder::Plain`] is
/// the terminal fallback after these.
const COMPRESSED_DECODERS: [StreamDecoder; 2] = [StreamDecoder::Zlib, StreamDecoder::RawDeflate];

/// Upper bound on one decoded stream.
const MAX_STREAM_BYTES: u64 = 64 * 1024 * 1024;

impl StreamDecoder {
    pub fn decode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            StreamDecoder::Zlib => inflate(data, true),
            StreamDecoder::RawDeflate => inflate(data, false),
            StreamDecoder::Plain => Ok(data.to_vec()),
        }
    }
}

/// Inflate a complete deflate stream. Input that ends before the final
/// block is an error, so plain text is not mistaken for compressed data.
fn inflate(data: &[u8], zlib_header: bool) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(zlib_header);
    let mut out: Vec<u8> = Vec::with_capacity(initial_capacity(data.len()));
    loop {
        if out.len() == out.capacity() {
            if out.len() as u64 >= MAX_STREAM_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "decoded stream exceeds size limit",
                ));
            }
            out.reserve(out.capacity());
        }
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let consumed = (in_before as usize).min(data.len());
        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled =
                    inflater.total_in() == in_before && inflater.total_out() == out_before;
                if stalled && out.len() < out.capacity() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated deflate stream",
                    ));
                }
            }
        }
    }
}

/// Output buffer size to start inflating `input_len` bytes with.
fn initial_capacity(input_len: usize) -> usize {
    input_len
        .saturating_mul(4)
        .clamp(1024, MAX_STREAM_BYTES as usize)
}

/// Try each strategy in turn; the last failure is returned if none succeed.
pub fn decode_stream(data: &[u8], decoders: &[StreamDecoder]) -> io::Result<Vec<u8>> {
    let mut last = io::Error::new(io::ErrorKind::InvalidInput, "no stream decoders given");
    for decoder in decoders {
        match decoder.decode(data) {
            Ok(out) => return Ok(out),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// Extract text fragments, one per line.
///
/// Fails with [`Error::EmptyExtraction`] when nothing was recovered.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    let mut fragments = Vec::new();
    let mut stream_spans: Vec<Range<usize>> = Vec::new();

    for caps in STREAM_RE.captures_iter(bytes) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        stream_spans.push(whole.range());
        match decode_stream(body.as_bytes(), &COMPRESSED_DECODERS) {
            Ok(content) => scan_content(&content, &mut fragments),
            Err(e) => {
                debug!(offset = whole.start(), error = %e, "stream not deflated; scanning as plain");
                scan_content(body.as_bytes(), &mut fragments);
            }
        }
    }

    let mut cursor = 0;
    for span in &stream_spans {
        scan_content(&bytes[cursor..span.start], &mut fragments);
        cursor = span.end;
    }
    scan_content(&bytes[cursor..], &mut fragments);

    debug!(
        streams = stream_spans.len(),
        fragments = fragments.len(),
        "scanned pdf content"
    );
    let text = fragments.join("\n");
    if text.is_empty() {
        return Err(Error::EmptyExtraction {
            format: DocumentFormat::Pdf,
            chars: 0,
            min: 1,
        });
    }
    Ok(text)
}

/// Count `/Type /Page` objects. Zero when the file has none in plain sight
/// (e.g. pages inside compressed object streams).
pub fn count_pages(bytes: &[u8]) -> usize {
    PAGE_OBJECT_RE.find_iter(bytes).count()
}

fn scan_content(content: &[u8], fragments: &mut Vec<String>) {
    for caps in SHOW_TEXT_RE.captures_iter(content) {
        let raw = if let Some(array) = caps.get(1) {
            ARRAY_STRING_RE
                .captures_iter(array.as_bytes())
                .filter_map(|c| c.get(1))
                .flat_map(|m| decode_literal(m.as_bytes()))
                .collect::<Vec<u8>>()
        } else if let Some(single) = caps.get(2) {
            decode_literal(single.as_bytes())
        } else {
            continue;
        };
        let fragment = collapse_whitespace(&latin1(&raw));
        if !fragment.is_empty() {
            fragments.push(fragment);
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode the escapes of a PDF string literal body.
pub fn decode_literal(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let Some(&next) = raw.get(i + 1) else {
            break;
        };
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'f' => out.push(0x0c),
            b'b' => out.push(0x08),
            b'(' | b')' | b'\\' => out.push(next),
            b'0'..=b'7' => {
                let mut code = u32::from(next - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            }
            // Line continuation.
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }
    out
}
