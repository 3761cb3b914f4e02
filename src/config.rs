//! TOML configuration.
//!
//! Every section is optional; missing values take the defaults below.
//!
//! ```toml
//! [extraction]
//! min_pdf_chars = 20
//! max_entry_bytes = 52428800
//!
//! [retrieval]
//! default_k = 8
//!
//! [cache]
//! ttl_secs = 300
//!
//! [ocr]
//! provider = "http"
//! endpoint = "http://127.0.0.1:8089/ocr"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use docket_core::container::DEFAULT_MAX_ENTRY_BYTES;
use docket_core::extract::{ExtractOptions, DEFAULT_MIN_PDF_CHARS};
use docket_core::search::{DEFAULT_K, MAX_K};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_pdf_chars")]
    pub min_pdf_chars: usize,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_pdf_chars: default_min_pdf_chars(),
            max_entry_bytes: default_max_entry_bytes(),
        }
    }
}

impl ExtractionConfig {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            min_pdf_chars: self.min_pdf_chars,
            max_entry_bytes: self.max_entry_bytes,
        }
    }
}

fn default_min_pdf_chars() -> usize {
    DEFAULT_MIN_PDF_CHARS
}
fn default_max_entry_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.extraction.min_pdf_chars == 0 {
        anyhow::bail!("extraction.min_pdf_chars must be > 0");
    }
    if config.extraction.max_entry_bytes == 0 {
        anyhow::bail!("extraction.max_entry_bytes must be > 0");
    }

    if !(1..=MAX_K).contains(&config.retrieval.default_k) {
        anyhow::bail!("retrieval.default_k must be in [1, {}]", MAX_K);
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    match config.ocr.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.ocr.endpoint.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("ocr.endpoint must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown OCR provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.extraction.min_pdf_chars, 20);
        assert_eq!(config.retrieval.default_k, 8);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert!(!config.ocr.is_enabled());
    }

    #[test]
    fn full_config_parses() {
        let config = parse_config(
            r#"
[extraction]
min_pdf_chars = 50

[retrieval]
default_k = 4

[cache]
ttl_secs = 60

[ocr]
provider = "http"
endpoint = "http://localhost:9000/ocr"
max_retries = 1
"#,
        )
        .unwrap();
        assert_eq!(config.extraction.options().min_pdf_chars, 50);
        assert_eq!(config.retrieval.default_k, 4);
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(config.ocr.is_enabled());
        assert_eq!(config.ocr.timeout_secs, 60);
    }

    #[test]
    fn out_of_range_k_is_rejected() {
        let err = parse_config("[retrieval]\ndefault_k = 40\n").unwrap_err();
        assert!(err.to_string().contains("default_k"));
    }

    #[test]
    fn http_ocr_requires_endpoint() {
        assert!(parse_config("[ocr]\nprovider = \"http\"\n").is_err());
        assert!(parse_config("[ocr]\nprovider = \"tesseract\"\n").is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(parse_config("[cache]\nttl_secs = 0\n").is_err());
    }
}
