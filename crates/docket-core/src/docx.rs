//! DOCX body text extraction.
//!
//! Reads `word/document.xml` and concatenates the contents of every `<w:t>`
//! text run, separated by single spaces, with whitespace collapsed.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::container::{list_entries, read_named};
use crate::error::Result;
use crate::extract::collapse_whitespace;

const BODY_ENTRY: &str = "word/document.xml";

/// Extract flat text from a DOCX container.
///
/// A container without a document body yields an empty string.
pub fn extract_text(bytes: &[u8], max_entry_bytes: u64) -> Result<String> {
    let entries = list_entries(bytes)?;
    let Some(body) = read_named(bytes, &entries, BODY_ENTRY, max_entry_bytes)? else {
        debug!("docx has no {}", BODY_ENTRY);
        return Ok(String::new());
    };
    let runs = text_runs(&body);
    Ok(collapse_whitespace(&runs.join(" ")))
}

/// Collect the decoded text of every `<*:t>` element in document order.
///
/// Malformed XML stops the scan; runs read up to that point are kept.
pub(crate) fn text_runs(xml: &[u8]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                current = Some(String::new());
            }
            Ok(Event::Text(te)) => {
                if let Some(run) = current.as_mut() {
                    match te.unescape() {
                        Ok(text) => run.push_str(&text),
                        Err(_) => run.push_str(&String::from_utf8_lossy(&te)),
                    }
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed XML in text runs; keeping partial text");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    runs
}
