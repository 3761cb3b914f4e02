//! # Docket Core
//!
//! Document ingestion and retrieval engine: reads office documents from raw
//! bytes, indexes their text into paragraph chunks, answers lexical queries
//! and locates supporting clauses for citations.
//!
//! This crate has no tokio, network, or filesystem dependencies. Everything
//! is a synchronous computation over an immutable buffer, except the
//! [`cache`], which is the only shared mutable state.
//!
//! ```text
//!  bytes + format
//!        │
//!        ▼
//!  ┌───────────┐   ┌────────────┐
//!  │ container │──▶│ docx, xlsx │──┐
//!  └───────────┘   └────────────┘  │   ┌───────┐   ┌──────────────────┐
//!                  ┌────────────┐  ├──▶│ chunk │──▶│ search, citation │
//!                  │    pdf     │──┘   └───────┘   └──────────────────┘
//!                  └────────────┘
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`container`] | ZIP central directory and entry reader |
//! | [`docx`] | DOCX body text |
//! | [`xlsx`] | XLSX sheets as delimited rows |
//! | [`pdf`] | PDF content-stream text scan |
//! | [`extract`] | Format dispatch and page estimates |
//! | [`chunk`] | Paragraph chunk indexer |
//! | [`search`] | Lexical retriever |
//! | [`citation`] | Citation locator |
//! | [`cache`] | TTL document cache |

pub mod cache;
pub mod chunk;
pub mod citation;
pub mod container;
pub mod docx;
pub mod error;
pub mod extract;
pub mod models;
pub mod pdf;
pub mod search;
pub mod xlsx;

pub use error::{Error, Result};
pub use models::{
    Citation, DocumentDigest, DocumentFormat, LoadedDocument, RagChunk, ScoredHit, SectionDigest,
};
