//! # Docket CLI (`docket`)
//!
//! Extract, chunk, search and cite office documents from the command line.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docket extract <file>` | Print the extracted text |
//! | `docket chunks <file>` | Print the chunk index as JSON |
//! | `docket search <file> "<query>"` | Print ranked chunks as JSON |
//! | `docket cite <file> "<span>"` | Print the supporting clause as JSON |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use docket::config::{self, Config};
use docket::service::{document_key, DocumentService};
use docket_core::search::parse_k;
use docket_core::{DocumentDigest, DocumentFormat, LoadedDocument};

const DEFAULT_CONFIG_PATH: &str = "./config/docket.toml";

/// Docket: document ingestion and retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. If the default file is missing, built-in defaults apply; an
/// explicitly named file must exist.
#[derive(Parser)]
#[command(
    name = "docket",
    about = "Docket: extract, index, search and cite PDF, DOCX and XLSX documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the plain text extracted from a document.
    Extract {
        file: PathBuf,
        /// Format override (`pdf`, `docx`, `xlsx` or a MIME type).
        #[arg(long)]
        format: Option<String>,
    },

    /// Print the chunk index of a document as JSON.
    Chunks {
        file: PathBuf,
        #[arg(long)]
        format: Option<String>,
    },

    /// Rank the chunks of a document against a query.
    Search {
        file: PathBuf,
        query: String,
        /// Number of results, clamped to [1, 32].
        #[arg(short, long, value_parser = parse_k, allow_negative_numbers = true)]
        k: Option<usize>,
        #[arg(long)]
        format: Option<String>,
    },

    /// Find the clause that best supports an answer span.
    Cite {
        file: PathBuf,
        span: String,
        /// JSON file with an externally produced summary digest.
        #[arg(long)]
        digest: Option<PathBuf>,
        #[arg(long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docket=info,docket_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    // Only the built-in default path may be absent.
    let cfg = if cli.config.exists() || cli.config != Path::new(DEFAULT_CONFIG_PATH) {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    let service = DocumentService::new(cfg)?;

    match cli.command {
        Commands::Extract { file, format } => {
            let (_, doc) = load(&service, &file, format.as_deref()).await?;
            println!("{}", doc.text);
        }
        Commands::Chunks { file, format } => {
            let (_, doc) = load(&service, &file, format.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&doc.chunks)?);
        }
        Commands::Search {
            file,
            query,
            k,
            format,
        } => {
            let (key, _) = load(&service, &file, format.as_deref()).await?;
            let hits = service.search(&key, &query, k)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Cite {
            file,
            span,
            digest,
            format,
        } => {
            let (key, _) = load(&service, &file, format.as_deref()).await?;
            if let Some(path) = digest {
                service.attach_digest(&key, read_digest(&path)?).await?;
            }
            let citation = service.locate(&key, &span)?;
            println!("{}", serde_json::to_string_pretty(&citation)?);
        }
    }

    Ok(())
}

async fn load(
    service: &DocumentService,
    file: &Path,
    format: Option<&str>,
) -> Result<(String, std::sync::Arc<LoadedDocument>)> {
    let format = match format {
        Some(tag) => tag.parse::<DocumentFormat>()?,
        None => DocumentFormat::from_path(file)?,
    };
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let key = document_key(&bytes);
    let doc = service.load(&key, bytes, format, false).await?;
    for warning in &doc.warnings {
        tracing::warn!(file = %file.display(), warning, "extraction warning");
    }
    Ok((key, doc))
}

fn read_digest(path: &Path) -> Result<DocumentDigest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read digest file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse digest file: {}", path.display()))
}
