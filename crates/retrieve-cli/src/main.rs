//! Bulk-ingestion CLI (C12): the only component permitted to call
//! `std::process::exit` directly. All document-level logic is delegated to
//! `retrieve_core::ingest::bulk_put`; this binary owns argument parsing,
//! environment/flag precedence, and the exit-code policy of §6.4.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use retrieve_core::embedder::default_embedder;
use retrieve_core::ingest::{bulk_put, BulkError, BulkOptions};
use retrieve_core::tokenizer::default_tokenizer;
use retrieve_core::vector_store::{resolve_persist_dir, DistanceMetric, VectorStore};
use std::path::PathBuf;
use std::process::ExitCode;

/// Bulk-register files into the hybrid retrieval store.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files, directories, or glob patterns (`*` / `**`) to ingest.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Prefix prepended to every generated id as `"{prefix}:{path}"`.
    #[arg(long = "id-prefix")]
    id_prefix: Option<String>,

    /// Tag recorded as `metadata.file_type` for every ingested document.
    #[arg(long = "file-type", default_value = "none")]
    file_type: String,

    /// Skip files whose mtime is older than this date (`YYYY-MM-DD` or ISO-8601).
    #[arg(long = "filter-from-date")]
    filter_from_date: Option<String>,

    /// Glob pattern of paths to skip; may be repeated.
    #[arg(long = "ignore")]
    ignore: Vec<String>,

    /// Persistence directory override; falls back to `SEMCHE_CHROMA_DIR` then `./chroma_db`.
    #[arg(long = "chroma-dir")]
    chroma_dir: Option<PathBuf>,

    /// Use the path relative to the current working directory instead of the absolute path.
    #[arg(long = "use-relative-path", default_value_t = false)]
    use_relative_path: bool,
}

/// Parse a `YYYY-MM-DD` or full ISO-8601 timestamp into a UTC instant at
/// the start of that day (date-only) or the instant itself (ISO-8601).
fn parse_date_filter(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("--filter-from-date must be YYYY-MM-DD or ISO-8601, got {raw:?}"))?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date {raw:?}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let filter_from_date = match cli.filter_from_date.as_deref().map(parse_date_filter) {
        Some(Ok(dt)) => Some(dt),
        Some(Err(e)) => {
            tracing::error!(error = %e, "invalid --filter-from-date");
            return ExitCode::FAILURE;
        }
        None => None,
    };

    let persist_dir = resolve_persist_dir(cli.chroma_dir.as_deref());
    let tokenizer = match default_tokenizer() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize tokenizer");
            return ExitCode::FAILURE;
        }
    };
    drop(tokenizer);

    let embedder = match default_embedder() {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize embedder");
            return ExitCode::FAILURE;
        }
    };

    let store = match VectorStore::open(persist_dir.clone(), "documents", DistanceMetric::Cosine).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, persist_dir = %persist_dir.display(), "failed to open vector store");
            return ExitCode::FAILURE;
        }
    };

    let opts = BulkOptions {
        id_prefix: cli.id_prefix,
        file_type: cli.file_type,
        filter_from_date,
        ignore: cli.ignore,
        use_relative_path: cli.use_relative_path,
        normalize: false,
    };

    match bulk_put(&store, embedder.as_ref(), &cli.inputs, &opts).await {
        Ok(summary) if summary.registered > 0 => {
            tracing::info!(registered = summary.registered, skipped = summary.skipped, "bulk ingestion complete");
            println!("registered {} document(s), skipped {}", summary.registered, summary.skipped);
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            tracing::warn!(skipped = summary.skipped, "no documents were registered");
            eprintln!("no documents were registered ({} skipped)", summary.skipped);
            ExitCode::FAILURE
        }
        Err(BulkError::NoInputsResolved) => {
            tracing::error!("no files matched the given inputs after filtering");
            eprintln!("no files matched the given inputs after filtering");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "bulk ingestion failed");
            eprintln!("bulk ingestion failed: {e}");
            ExitCode::FAILURE
        }
    }
}
