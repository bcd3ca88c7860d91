//! Document ingestion (C7): single-document `put` and the bulk CLI variant.

use crate::embedder::{EmbeddingError, Embedder};
use crate::vector_store::{VectorStore, VectorStoreError};
use chrono::Utc;
use glob::{glob, Pattern};
use std::fmt;
use std::path::{Path, PathBuf};

const BINARY_SNIFF_BYTES: usize = 8192;

#[derive(Debug)]
pub enum IngestError {
    Validation(String),
    Embedding(EmbeddingError),
    Store(VectorStoreError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Validation(msg) => write!(f, "validation error: {msg}"),
            IngestError::Embedding(e) => write!(f, "ingestion embedding failed: {e}"),
            IngestError::Store(e) => write!(f, "ingestion store write failed: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

pub struct PutOutcome {
    pub id: String,
    pub vector_dimension: usize,
}

/// Ingest a single `(text, id)` pair: validate, embed, optionally
/// L2-normalize, stamp, upsert.
pub async fn put(
    store: &VectorStore,
    embedder: &dyn Embedder,
    text: &str,
    id: &str,
    file_type: Option<&str>,
    normalize: bool,
) -> Result<PutOutcome, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::Validation("text must not be empty".to_string()));
    }
    if id.trim().is_empty() {
        return Err(IngestError::Validation("id must not be empty".to_string()));
    }

    let mut rows = embedder.embed_many(&[text.to_string()]).map_err(IngestError::Embedding)?;
    if rows.is_empty() {
        return Err(IngestError::Embedding(EmbeddingError::BackendFailure(
            "embedder returned no rows for a single input".to_string(),
        )));
    }
    let mut v = rows.swap_remove(0);
    let vector_dimension = v.len();

    if normalize {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
    }

    let updated_at = Utc::now().to_rfc3339();
    store
        .upsert(
            &[v],
            &[text.to_string()],
            &[id.to_string()],
            Some(&[Some(updated_at)]),
            Some(&[file_type.map(|s| s.to_string())]),
        )
        .await
        .map_err(IngestError::Store)?;

    Ok(PutOutcome { id: id.to_string(), vector_dimension })
}

pub struct BulkOptions {
    pub id_prefix: Option<String>,
    pub file_type: String,
    pub filter_from_date: Option<chrono::DateTime<Utc>>,
    pub ignore: Vec<String>,
    pub use_relative_path: bool,
    pub normalize: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            id_prefix: None,
            file_type: "none".to_string(),
            filter_from_date: None,
            ignore: Vec::new(),
            use_relative_path: false,
            normalize: false,
        }
    }
}

pub struct BulkSummary {
    pub registered: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum BulkError {
    NoInputsResolved,
    Io(String),
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::NoInputsResolved => write!(f, "no files matched the given inputs after filtering"),
            BulkError::Io(msg) => write!(f, "bulk ingestion io error: {msg}"),
        }
    }
}

impl std::error::Error for BulkError {}

/// Expand `inputs` (files, directories, or glob patterns) into a sorted,
/// deduplicated list of candidate file paths.
fn resolve_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, BulkError> {
    let mut found: Vec<PathBuf> = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let pattern = format!("{}/**/*", path.display());
            for entry in glob(&pattern).map_err(|e| BulkError::Io(e.to_string()))? {
                let entry = entry.map_err(|e| BulkError::Io(e.to_string()))?;
                if entry.is_file() {
                    found.push(entry);
                }
            }
        } else if path.is_file() {
            found.push(path.to_path_buf());
        } else {
            for entry in glob(input).map_err(|e| BulkError::Io(e.to_string()))? {
                let entry = entry.map_err(|e| BulkError::Io(e.to_string()))?;
                if entry.is_file() {
                    found.push(entry);
                }
            }
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn is_ignored(path: &Path, ignore_patterns: &[String]) -> bool {
    ignore_patterns.iter().any(|p| {
        Pattern::new(p)
            .map(|pat| pat.matches_path(path))
            .unwrap_or(false)
    })
}

fn is_binary(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut file) = std::fs::File::open(path) else { return true };
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let Ok(n) = file.read(&mut buf) else { return true };
    buf[..n].contains(&0)
}

fn passes_date_filter(path: &Path, cutoff: Option<chrono::DateTime<Utc>>) -> bool {
    let Some(cutoff) = cutoff else { return true };
    let Ok(meta) = std::fs::metadata(path) else { return false };
    let Ok(modified) = meta.modified() else { return false };
    let modified: chrono::DateTime<Utc> = modified.into();
    modified >= cutoff
}

fn generate_id(path: &Path, cwd: &Path, opts: &BulkOptions) -> String {
    let base = if opts.use_relative_path {
        path.strip_prefix(cwd).unwrap_or(path).to_path_buf()
    } else {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    };
    let normalized = base.to_string_lossy().replace('\\', "/");
    match &opts.id_prefix {
        Some(prefix) => format!("{prefix}:{normalized}"),
        None => normalized,
    }
}

/// Ingest every file resolved from `inputs`, skipping binary/empty/ignored/
/// stale files and counting per-file embedding failures as skips rather than
/// aborting the batch.
pub async fn bulk_put(
    store: &VectorStore,
    embedder: &dyn Embedder,
    inputs: &[String],
    opts: &BulkOptions,
) -> Result<BulkSummary, BulkError> {
    let candidates = resolve_inputs(inputs)?;
    let cwd = std::env::current_dir().map_err(|e| BulkError::Io(e.to_string()))?;

    let mut registered = 0usize;
    let mut skipped = 0usize;
    let mut any_candidate = false;

    for path in &candidates {
        if is_ignored(path, &opts.ignore) {
            continue;
        }
        if !passes_date_filter(path, opts.filter_from_date) {
            continue;
        }
        any_candidate = true;

        if is_binary(path) {
            tracing::warn!(file = %path.display(), "skipping binary file during bulk ingestion");
            skipped += 1;
            continue;
        }
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file during bulk ingestion");
                skipped += 1;
                continue;
            }
        };
        if text.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let id = generate_id(path, &cwd, opts);
        match put(store, embedder, &text, &id, Some(&opts.file_type), opts.normalize).await {
            Ok(_) => registered += 1,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping file after embedding failure");
                skipped += 1;
            }
        }
    }

    if !any_candidate {
        return Err(BulkError::NoInputsResolved);
    }

    Ok(BulkSummary { registered, skipped })
}
