//! Ingestion service: extraction → indexing → cache, with OCR fallback.
//!
//! [`DocumentService`] is the entry point for callers holding raw document
//! bytes. Extraction runs on tokio's blocking pool; the cache serialises
//! loads per key so one document is only extracted once even when several
//! requests for it arrive together.

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use docket_core::cache::DocumentCache;
use docket_core::extract::{estimate_pages, extract, ExtractOptions};
use docket_core::{Citation, DocumentDigest, DocumentFormat, LoadedDocument, ScoredHit};

use crate::config::Config;
use crate::ocr::{create_provider, OcrProvider};

/// Warning attached to documents whose text came from OCR.
pub const OCR_FALLBACK_WARNING: &str = "ocr-fallback";

/// Message surfaced when neither extraction nor OCR produced text.
pub const NO_TEXT_MESSAGE: &str =
    "no searchable text found - this file may be scanned, corrupted, or password protected";

pub struct DocumentService {
    config: Config,
    cache: Arc<DocumentCache>,
    ocr: Arc<dyn OcrProvider>,
}

impl DocumentService {
    /// Build a service with the OCR provider named in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let ocr: Arc<dyn OcrProvider> = Arc::from(create_provider(&config.ocr)?);
        let cache = Arc::new(DocumentCache::new(config.cache.ttl()));
        Ok(Self::with_parts(config, cache, ocr))
    }

    pub fn with_parts(config: Config, cache: Arc<DocumentCache>, ocr: Arc<dyn OcrProvider>) -> Self {
        Self { config, cache, ocr }
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the cached document for `key`, extracting `bytes` on a miss
    /// or when `force_reload` is set. Nothing is cached on failure.
    pub async fn load(
        &self,
        key: &str,
        bytes: Vec<u8>,
        format: DocumentFormat,
        force_reload: bool,
    ) -> Result<Arc<LoadedDocument>> {
        let cache = Arc::clone(&self.cache);
        let ocr = Arc::clone(&self.ocr);
        let options = self.config.extraction.options();
        let handle = Handle::current();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            cache.get_or_try_load(&key, force_reload, || {
                build_document(&key, &bytes, format, &options, ocr.as_ref(), &handle)
            })
        })
        .await
        .context("extraction task panicked")?
    }

    /// Rank the chunks of a loaded document against `query`.
    pub fn search(&self, key: &str, query: &str, k: Option<usize>) -> Result<Vec<ScoredHit>> {
        let k = k.or(Some(self.config.retrieval.default_k));
        Ok(self.document(key)?.search(query, k))
    }

    /// Find the clause of a loaded document that best supports `answer_span`.
    pub fn locate(&self, key: &str, answer_span: &str) -> Result<Citation> {
        Ok(self.document(key)?.locate(answer_span))
    }

    /// Replace the summary digest of a loaded document. The entry's TTL is
    /// refreshed. Waits for a reload of the same key to finish first.
    pub async fn attach_digest(
        &self,
        key: &str,
        digest: DocumentDigest,
    ) -> Result<Arc<LoadedDocument>> {
        let cache = Arc::clone(&self.cache);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            cache
                .update(&key, |current| current.clone().with_digest(digest))
                .ok_or_else(|| anyhow!("document '{}' is not loaded or has expired", key))
        })
        .await
        .context("digest task panicked")?
    }

    fn document(&self, key: &str) -> Result<Arc<LoadedDocument>> {
        self.cache
            .get(key)
            .ok_or_else(|| anyhow!("document '{}' is not loaded or has expired", key))
    }
}

/// SHA-256 hex digest of `bytes`, for callers without their own identifier.
pub fn document_key(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn build_document(
    key: &str,
    bytes: &[u8],
    format: DocumentFormat,
    options: &ExtractOptions,
    ocr: &dyn OcrProvider,
    handle: &Handle,
) -> Result<LoadedDocument> {
    match extract(bytes, format, options) {
        Ok(extracted) if !extracted.text.trim().is_empty() => {
            info!(key, %format, pages = extracted.page_count, "document loaded");
            Ok(LoadedDocument::new(&extracted.text, extracted.page_count))
        }
        Ok(_) => ocr_fallback(key, bytes, format, ocr, handle),
        Err(e) if e.is_empty_extraction() => {
            info!(key, %format, reason = %e, "falling back to OCR");
            ocr_fallback(key, bytes, format, ocr, handle)
        }
        Err(e) => Err(e.into()),
    }
}

// Runs on a blocking-pool thread, so blocking on the runtime handle is allowed.
fn ocr_fallback(
    key: &str,
    bytes: &[u8],
    format: DocumentFormat,
    ocr: &dyn OcrProvider,
    handle: &Handle,
) -> Result<LoadedDocument> {
    match handle.block_on(ocr.recognize(bytes, format)) {
        Ok(text) if !text.trim().is_empty() => {
            info!(key, provider = ocr.name(), "document loaded via OCR");
            Ok(LoadedDocument::new(&text, estimate_pages(&text)).with_warning(OCR_FALLBACK_WARNING))
        }
        Ok(_) => {
            warn!(key, provider = ocr.name(), "OCR returned no text");
            bail!(NO_TEXT_MESSAGE)
        }
        Err(e) => {
            warn!(key, provider = ocr.name(), error = %e, "OCR failed");
            bail!(NO_TEXT_MESSAGE)
        }
    }
}
