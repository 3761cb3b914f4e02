//! OCR fallback for documents without a usable text layer.
//!
//! The OCR service is an external collaborator: it receives the raw document
//! and returns plain text. Two providers exist:
//! - **[`DisabledOcr`]** always fails. Used when `ocr.provider = "disabled"`.
//! - **[`HttpOcr`]** posts the document to an HTTP endpoint.
//!
//! # Wire format
//!
//! ```text
//! POST <endpoint>
//! {"format": "pdf", "data": "<base64 bytes>"}
//!
//! 200 OK
//! {"text": "recognised text"}
//! ```
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - Other 4xx → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use docket_core::DocumentFormat;

use crate::config::OcrConfig;

/// Turns a document into text when extraction found none.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Short provider name for logs and warnings.
    fn name(&self) -> &str;

    /// Recognise the text of `bytes`.
    async fn recognize(&self, bytes: &[u8], format: DocumentFormat) -> Result<String>;
}

/// Instantiate the provider selected by `config.provider`.
pub fn create_provider(config: &OcrConfig) -> Result<Box<dyn OcrProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOcr)),
        "http" => Ok(Box::new(HttpOcr::new(config)?)),
        other => bail!("Unknown OCR provider: {}", other),
    }
}

// ============ Disabled Provider ============

pub struct DisabledOcr;

#[async_trait]
impl OcrProvider for DisabledOcr {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn recognize(&self, _bytes: &[u8], _format: DocumentFormat) -> Result<String> {
        bail!("OCR provider is disabled")
    }
}

// ============ HTTP Provider ============

#[derive(Serialize)]
struct OcrRequest<'a> {
    format: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

/// OCR through a JSON-over-HTTP service.
pub struct HttpOcr {
    endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpOcr {
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not set or the HTTP client cannot
    /// be built.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ocr.endpoint required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint,
            client,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl OcrProvider for HttpOcr {
    fn name(&self) -> &str {
        "http"
    }

    async fn recognize(&self, bytes: &[u8], format: DocumentFormat) -> Result<String> {
        let body = OcrRequest {
            format: format.as_str(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying OCR request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&self.endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: OcrResponse = response.json().await?;
                        return Ok(parsed.text);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, "OCR service error, will retry");
                        last_err = Some(anyhow::anyhow!("OCR service error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OCR service error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OCR failed after retries")))
    }
}
