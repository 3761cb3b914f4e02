//! # Docket
//!
//! Document ingestion and retrieval for uploaded office files. Wraps the
//! pure [`docket_core`] engine with configuration, an OCR fallback for
//! scanned documents, and a cache-backed service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐
//! │ bytes+format │──▶│ DocumentService │──▶│ DocumentCache │
//! └──────────────┘   └───────┬─────────┘   └───────┬───────┘
//!                            │ empty text          │
//!                            ▼                     ▼
//!                      ┌───────────┐     ┌──────────────────┐
//!                      │    OCR    │     │ search, citation │
//!                      └───────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docket extract report.pdf
//! docket search report.pdf "GST obligations" -k 4
//! docket cite report.pdf "lodged quarterly" --digest digest.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`ocr`] | OCR provider abstraction |

pub mod config;
pub mod ocr;
pub mod service;
