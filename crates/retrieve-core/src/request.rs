//! Request Surface (C8): the pure-function operations of §6.1, each
//! returning a tagged result that carries `status` and serializes to the
//! flat schemas the host tool-calling layer expects.
//!
//! This is the only module that stringifies a typed error into the
//! `error_type` taxonomy of §7 — every other component keeps its own typed
//! error enum.

use crate::handle::RetrieveHandle;
use crate::hybrid::HybridRetrieveError;
use crate::ingest::IngestError;
use crate::vector_store::VectorStoreError;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
#[serde(untagged)]
pub enum RequestResult<T> {
    Success(T),
    Error(ErrorPayload),
}

#[derive(Serialize)]
pub struct ErrorPayload {
    pub status: &'static str,
    pub message: String,
    pub error_type: &'static str,
}

fn error(message: impl Into<String>, error_type: &'static str) -> ErrorPayload {
    ErrorPayload { status: "error", message: message.into(), error_type }
}

fn validation_error(message: impl Into<String>) -> ErrorPayload {
    error(message, "ValidationError")
}

impl From<IngestError> for ErrorPayload {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Validation(msg) => validation_error(msg),
            IngestError::Embedding(inner) => error(format!("failed to generate embedding: {inner}"), "EmbeddingError"),
            IngestError::Store(inner) => error(format!("vector store write failed: {inner}"), "BackendFailure"),
        }
    }
}

impl From<VectorStoreError> for ErrorPayload {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::InvalidArgument(msg) => validation_error(msg),
            VectorStoreError::DimensionMismatch { .. } => error(e.to_string(), "DimensionMismatch"),
            VectorStoreError::BackendFailure(_) => error(e.to_string(), "BackendFailure"),
        }
    }
}

impl From<HybridRetrieveError> for ErrorPayload {
    fn from(e: HybridRetrieveError) -> Self {
        error(e.to_string(), "HybridRetrieverError")
    }
}

#[derive(Serialize)]
pub struct PutDocumentDetails {
    pub count: usize,
    pub collection: String,
    pub filepath: String,
    pub vector_dimension: usize,
    pub persist_directory: String,
    pub normalized: bool,
}

#[derive(Serialize)]
pub struct PutDocumentSuccess {
    pub status: &'static str,
    pub message: &'static str,
    pub details: PutDocumentDetails,
}

pub async fn put_document(
    handle: &RetrieveHandle,
    text: &str,
    filepath: &str,
    file_type: Option<&str>,
    normalize: bool,
) -> RequestResult<PutDocumentSuccess> {
    if text.trim().is_empty() {
        return RequestResult::Error(validation_error("text must not be empty"));
    }
    if filepath.trim().is_empty() {
        return RequestResult::Error(validation_error("filepath must not be empty"));
    }

    match handle.put_document(text, filepath, file_type, normalize).await {
        Ok(outcome) => RequestResult::Success(PutDocumentSuccess {
            status: "success",
            message: "document registered",
            details: PutDocumentDetails {
                count: 1,
                collection: handle.collection().to_string(),
                filepath: outcome.id,
                vector_dimension: outcome.vector_dimension,
                persist_directory: handle.persist_dir().to_string_lossy().to_string(),
                normalized: normalize,
            },
        }),
        Err(e) => RequestResult::Error(e.into()),
    }
}

#[derive(Serialize)]
pub struct SearchResultRow {
    pub filepath: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

#[derive(Serialize)]
pub struct SearchSuccess {
    pub status: &'static str,
    pub message: &'static str,
    pub results: Vec<SearchResultRow>,
    pub count: usize,
    pub query_vector_dimension: usize,
    pub persist_directory: String,
}

pub struct SearchArgs<'a> {
    pub query: &'a str,
    pub top_k: usize,
    pub file_type: Option<&'a str>,
    pub include_documents: bool,
    pub max_content_length: Option<usize>,
    pub min_score: Option<f32>,
    pub filepath_prefix: Option<&'a str>,
}

pub async fn search(handle: &RetrieveHandle, args: SearchArgs<'_>) -> RequestResult<SearchSuccess> {
    if args.query.trim().is_empty() {
        return RequestResult::Error(validation_error("query must not be empty"));
    }
    if args.top_k == 0 {
        return RequestResult::Error(validation_error("top_k must be at least 1"));
    }
    if let Some(min_score) = args.min_score {
        if !(0.0..=1.0).contains(&min_score) {
            return RequestResult::Error(validation_error("min_score must be in the range 0.0..=1.0"));
        }
    }

    match handle.search(&args).await {
        Ok((hits, query_vector_dimension)) => {
            let results: Vec<SearchResultRow> = hits
                .into_iter()
                .map(|h| {
                    let document = if args.include_documents {
                        h.document.map(|doc| truncate(doc, args.max_content_length))
                    } else {
                        None
                    };
                    SearchResultRow { filepath: h.id, score: h.score, document, metadata: h.metadata }
                })
                .collect();
            RequestResult::Success(SearchSuccess {
                status: "success",
                message: "search completed",
                count: results.len(),
                results,
                query_vector_dimension,
                persist_directory: handle.persist_dir().to_string_lossy().to_string(),
            })
        }
        Err(e) => RequestResult::Error(e.into()),
    }
}

fn truncate(doc: String, max_len: Option<usize>) -> String {
    match max_len {
        Some(max_len) if doc.chars().count() > max_len => {
            let mut truncated: String = doc.chars().take(max_len).collect();
            truncated.push_str("...");
            truncated
        }
        _ => doc,
    }
}

#[derive(Serialize)]
pub struct DeleteDocumentSuccess {
    pub status: &'static str,
    pub message: String,
    pub deleted_count: usize,
    pub filepath: String,
    pub collection: String,
    pub persist_directory: String,
}

pub async fn delete_document(handle: &RetrieveHandle, filepath: &str) -> RequestResult<DeleteDocumentSuccess> {
    if filepath.trim().is_empty() {
        return RequestResult::Error(validation_error("filepath must not be empty"));
    }

    match handle.delete_document(filepath).await {
        Ok(deleted_count) => {
            let message = if deleted_count == 0 {
                "削除対象が見つかりませんでした".to_string()
            } else {
                "ドキュメントを削除しました".to_string()
            };
            RequestResult::Success(DeleteDocumentSuccess {
                status: "success",
                message,
                deleted_count,
                filepath: filepath.to_string(),
                collection: handle.collection().to_string(),
                persist_directory: handle.persist_dir().to_string_lossy().to_string(),
            })
        }
        Err(e) => RequestResult::Error(e.into()),
    }
}

#[derive(Serialize)]
pub struct PrefixResultRow {
    pub id: String,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

#[derive(Serialize)]
pub struct GetByPrefixSuccess {
    pub status: &'static str,
    pub prefix: String,
    pub file_type: String,
    pub include_documents: bool,
    pub top_k: Option<usize>,
    pub count: usize,
    pub results: Vec<PrefixResultRow>,
}

pub async fn get_documents_by_prefix(
    handle: &RetrieveHandle,
    prefix: &str,
    file_type: &str,
    include_documents: bool,
    top_k: Option<usize>,
) -> RequestResult<GetByPrefixSuccess> {
    if prefix.trim().is_empty() {
        return RequestResult::Error(validation_error("prefix must not be empty"));
    }
    if file_type.trim().is_empty() {
        return RequestResult::Error(validation_error("file_type must not be empty"));
    }
    if let Some(k) = top_k {
        if k == 0 {
            return RequestResult::Error(validation_error("top_k must be at least 1"));
        }
    }

    let records = handle.get_documents_by_prefix(prefix, file_type, include_documents, top_k).await;
    let results: Vec<PrefixResultRow> = records
        .into_iter()
        .map(|r| PrefixResultRow { id: r.id, document: r.document, metadata: r.metadata })
        .collect();

    RequestResult::Success(GetByPrefixSuccess {
        status: "success",
        prefix: prefix.to_string(),
        file_type: file_type.to_string(),
        include_documents,
        top_k,
        count: results.len(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_appends_ellipsis_when_over_limit() {
        let doc = "abcdefgh".to_string();
        assert_eq!(truncate(doc, Some(4)), "abcd...");
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        let doc = "abc".to_string();
        assert_eq!(truncate(doc, Some(10)), "abc");
    }

    #[test]
    fn truncate_is_noop_without_limit() {
        let doc = "abcdefgh".to_string();
        assert_eq!(truncate(doc, None), "abcdefgh");
    }
}
