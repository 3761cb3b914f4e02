//! Minimal ZIP container reader used by DOCX and XLSX extraction.
//!
//! Reads the central directory to list entries, then slices each entry's
//! payload out of its local file header and either copies it (stored) or
//! inflates it (deflate). Nothing else of the ZIP format is supported: no
//! ZIP64, no encryption, no multi-disk archives.
//!
//! ```text
//! ┌──────────────┬─────┬──────────────┬───────────────────┬──────┐
//! │ local hdr+data│ ... │ local hdr+data│ central directory │ EOCD │
//! └──────────────┴─────┴──────────────┴───────────────────┴──────┘
//! ```

use std::io::Read;

use flate2::read::DeflateDecoder;
use tracing::warn;

use crate::error::{Error, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_LEN: usize = 22;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;
/// The EOCD record may be followed by a comment of up to 65535 bytes.
const MAX_COMMENT_LEN: usize = 0xFFFF;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// Default cap on the decompressed size of one entry (zip-bomb protection).
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// One central-directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub compression_method: u16,
    pub local_header_offset: u32,
    pub encrypted: bool,
}

fn u16_at(buf: &[u8], at: usize) -> Result<u16> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::Format(format!("truncated record at offset {}", at)))
}

fn u32_at(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Format(format!("truncated record at offset {}", at)))
}

/// Scan backward from the end of the buffer for the EOCD record.
fn find_eocd(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < EOCD_LEN {
        return Err(Error::Format(
            "buffer too small to hold an end-of-central-directory record".to_string(),
        ));
    }
    let last = bytes.len() - EOCD_LEN;
    let first = last.saturating_sub(MAX_COMMENT_LEN);
    (first..=last)
        .rev()
        .find(|&at| u32_at(bytes, at).map(|sig| sig == EOCD_SIGNATURE).unwrap_or(false))
        .ok_or_else(|| Error::Format("end-of-central-directory signature not found".to_string()))
}

/// Parse the central directory and list every entry.
pub fn list_entries(bytes: &[u8]) -> Result<Vec<ContainerEntry>> {
    let eocd = find_eocd(bytes)?;
    let total = u16_at(bytes, eocd + 10)? as usize;
    let mut cursor = u32_at(bytes, eocd + 16)? as usize;

    let mut entries = Vec::with_capacity(total);
    for index in 0..total {
        let signature = u32_at(bytes, cursor)?;
        if signature != CENTRAL_SIGNATURE {
            return Err(Error::Format(format!(
                "bad central directory signature for entry {} at offset {}",
                index, cursor
            )));
        }
        let flags = u16_at(bytes, cursor + 8)?;
        let compression_method = u16_at(bytes, cursor + 10)?;
        let compressed_size = u32_at(bytes, cursor + 20)?;
        let uncompressed_size = u32_at(bytes, cursor + 24)?;
        let name_len = u16_at(bytes, cursor + 28)? as usize;
        let extra_len = u16_at(bytes, cursor + 30)? as usize;
        let comment_len = u16_at(bytes, cursor + 32)? as usize;
        let local_header_offset = u32_at(bytes, cursor + 42)?;

        let name_start = cursor + CENTRAL_HEADER_LEN;
        let name = bytes
            .get(name_start..name_start + name_len)
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .ok_or_else(|| Error::Format(format!("truncated file name for entry {}", index)))?;

        entries.push(ContainerEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            local_header_offset,
            encrypted: flags & 0x1 != 0,
        });
        cursor = name_start + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

/// Materialise one entry's bytes, bounded by [`DEFAULT_MAX_ENTRY_BYTES`].
pub fn read_entry(bytes: &[u8], entry: &ContainerEntry) -> Result<Vec<u8>> {
    read_entry_bounded(bytes, entry, DEFAULT_MAX_ENTRY_BYTES)
}

/// Materialise one entry's bytes, failing if it inflates past `max_bytes`.
pub fn read_entry_bounded(bytes: &[u8], entry: &ContainerEntry, max_bytes: u64) -> Result<Vec<u8>> {
    if entry.encrypted {
        return Err(Error::Encrypted(entry.name.clone()));
    }
    let at = entry.local_header_offset as usize;
    if u32_at(bytes, at)? != LOCAL_SIGNATURE {
        return Err(Error::Format(format!(
            "bad local header signature for entry '{}'",
            entry.name
        )));
    }
    // Local name/extra lengths may differ from the central directory copy.
    let name_len = u16_at(bytes, at + 26)? as usize;
    let extra_len = u16_at(bytes, at + 28)? as usize;
    let data_start = at + LOCAL_HEADER_LEN + name_len + extra_len;
    let data_end = data_start + entry.compressed_size as usize;
    let data = bytes.get(data_start..data_end).ok_or_else(|| {
        Error::Format(format!("entry '{}' runs past the end of the buffer", entry.name))
    })?;

    let out = match entry.compression_method {
        METHOD_STORED => data.to_vec(),
        METHOD_DEFLATE => {
            let mut out = Vec::with_capacity((entry.uncompressed_size as usize).min(1 << 20));
            DeflateDecoder::new(data)
                .take(max_bytes.saturating_add(1))
                .read_to_end(&mut out)?;
            out
        }
        method => {
            return Err(Error::UnsupportedCompression {
                name: entry.name.clone(),
                method,
            })
        }
    };

    if out.len() as u64 > max_bytes {
        return Err(Error::Format(format!(
            "entry '{}' exceeds size limit ({} bytes)",
            entry.name, max_bytes
        )));
    }
    if out.len() != entry.uncompressed_size as usize {
        warn!(
            entry = %entry.name,
            expected = entry.uncompressed_size,
            actual = out.len(),
            "container entry size mismatch"
        );
    }
    Ok(out)
}

pub fn find_entry<'a>(entries: &'a [ContainerEntry], name: &str) -> Option<&'a ContainerEntry> {
    entries.iter().find(|e| e.name == name)
}

/// Read the entry called `name`, or `None` when the container lacks it.
pub fn read_named(
    bytes: &[u8],
    entries: &[ContainerEntry],
    name: &str,
    max_bytes: u64,
) -> Result<Option<Vec<u8>>> {
    match find_entry(entries, name) {
        Some(entry) => read_entry_bounded(bytes, entry, max_bytes).map(Some),
        None => Ok(None),
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::build_zip;
    use super::*;

    #[test]
    fn stored_and_deflated_entries_round_trip() {
        let stored = b"plain stored payload";
        let deflated = b"deflated payload deflated payload deflated payload";
        let zip = build_zip(&[("a.txt", stored, false), ("dir/b.xml", deflated, true)]);

        let entries = list_entries(&zip).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].compression_method, METHOD_STORED);
        assert_eq!(entries[1].compression_method, METHOD_DEFLATE);
        assert_eq!(entries[1].name, "dir/b.xml");

        assert_eq!(read_entry(&zip, &entries[0]).unwrap(), stored);
        assert_eq!(read_entry(&zip, &entries[1]).unwrap(), deflated);
    }

    #[test]
    fn reads_archives_written_by_the_zip_crate() {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file("word/document.xml", opts).unwrap();
            zip.write_all(b"<w:t>hello</w:t>").unwrap();
            zip.finish().unwrap();
        }
        let entries = list_entries(&buf).unwrap();
        let body = read_named(&buf, &entries, "word/document.xml", DEFAULT_MAX_ENTRY_BYTES)
            .unwrap()
            .unwrap();
        assert_eq!(body, b"<w:t>hello</w:t>");
        assert!(read_named(&buf, &entries, "missing.xml", DEFAULT_MAX_ENTRY_BYTES)
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_eocd_is_format_error() {
        let err = list_entries(b"definitely not a zip archive at all").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert!(matches!(list_entries(b"PK").unwrap_err(), Error::Format(_)));
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let zip = build_zip(&[("a.txt", b"data", false)]);
        let mut entry = list_entries(&zip).unwrap().remove(0);
        entry.compression_method = 12;
        let err = read_entry(&zip, &entry).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression { method: 12, .. }));
    }

    #[test]
    fn bad_local_signature_is_format_error() {
        let mut zip = build_zip(&[("a.txt", b"data", false)]);
        zip[0] = b'X';
        let entries = list_entries(&zip).unwrap();
        assert!(matches!(read_entry(&zip, &entries[0]).unwrap_err(), Error::Format(_)));
    }

    #[test]
    fn encrypted_entry_is_rejected() {
        let zip = build_zip(&[("a.txt", b"data", false)]);
        let mut entry = list_entries(&zip).unwrap().remove(0);
        entry.encrypted = true;
        assert!(matches!(read_entry(&zip, &entry).unwrap_err(), Error::Encrypted(_)));
    }

    #[test]
    fn entry_over_limit_is_rejected() {
        let payload = vec![b'a'; 4096];
        let zip = build_zip(&[("big.txt", &payload, true)]);
        let entries = list_entries(&zip).unwrap();
        let err = read_entry_bounded(&zip, &entries[0], 1024).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn entry_exactly_at_limit_is_accepted() {
        let payload = vec![b'a'; 1024];
        let zip = build_zip(&[("stored.txt", &payload, false), ("deflated.txt", &payload, true)]);
        let entries = list_entries(&zip).unwrap();
        for entry in &entries {
            assert_eq!(read_entry_bounded(&zip, entry, 1024).unwrap().len(), 1024);
            assert!(read_entry_bounded(&zip, entry, 1023).is_err());
        }
    }
}
