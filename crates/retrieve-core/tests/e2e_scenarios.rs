//! End-to-end scenarios straight off the testable-properties list: each test
//! name below the line cites which numbered scenario it exercises.

use retrieve_core::embedder::{Embedder, EmbeddingError};
use retrieve_core::handle::RetrieveHandle;
use retrieve_core::request::{self, RequestResult, SearchArgs};
use retrieve_core::tokenizer::WhitespaceTokenizer;
use retrieve_core::vector_store::{DistanceMetric, VectorStore};
use std::sync::Arc;

/// Stand-in for a real embedding model: tags each text with which of a
/// fixed set of semantic categories it belongs to, by substring match.
/// Lets these tests exercise genuine dense-vector cosine ranking without
/// depending on a downloaded model.
struct CategoryEmbedder {
    categories: Vec<Vec<&'static str>>,
}

impl Embedder for CategoryEmbedder {
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                self.categories
                    .iter()
                    .map(|triggers| if triggers.iter().any(|trig| t.contains(trig)) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

async fn japanese_handle() -> (tempfile::TempDir, RetrieveHandle) {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::open(dir.path().to_path_buf(), "documents", DistanceMetric::Cosine)
        .await
        .unwrap();
    let embedder = CategoryEmbedder {
        categories: vec![
            vec!["猫", "犬", "かわいい", "ペット"],
            vec!["プログラミング", "Python", "python"],
        ],
    };
    #[cfg(feature = "morphological-tokenizer")]
    let tokenizer: Arc<dyn retrieve_core::tokenizer::Tokenizer> =
        Arc::new(retrieve_core::tokenizer::MorphologicalTokenizer::new().expect("lindera backend available in test build"));
    #[cfg(not(feature = "morphological-tokenizer"))]
    let tokenizer: Arc<dyn retrieve_core::tokenizer::Tokenizer> = Arc::new(WhitespaceTokenizer);

    let handle = RetrieveHandle::with_components(tokenizer, Box::new(embedder), store);
    (dir, handle)
}

async fn ascii_handle() -> (tempfile::TempDir, RetrieveHandle) {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::open(dir.path().to_path_buf(), "documents", DistanceMetric::Cosine)
        .await
        .unwrap();
    struct ZeroEmbedder;
    impl Embedder for ZeroEmbedder {
        fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0, 0.0]).collect())
        }
    }
    let handle = RetrieveHandle::with_components(Arc::new(WhitespaceTokenizer), Box::new(ZeroEmbedder), store);
    (dir, handle)
}

#[tokio::test]
async fn scenario_1_upsert_and_read_back() {
    let (_dir, h) = japanese_handle().await;

    let first = request::put_document(&h, "これはテストです", "/a.md", Some("spec"), false).await;
    let RequestResult::Success(first) = first else { panic!("expected success") };
    assert_eq!(first.details.count, 1);

    let second = request::put_document(&h, "これはテストです", "/a.md", Some("spec"), false).await;
    let RequestResult::Success(second) = second else { panic!("expected success") };
    assert_eq!(second.details.count, 1);

    let rows = h.get_documents_by_prefix("/a.md", "spec", true, None).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].document.as_deref(), Some("これはテストです"));
    assert_eq!(rows[0].metadata.get("file_type").cloned().flatten().as_deref(), Some("spec"));
}

#[tokio::test]
async fn scenario_2_delete_existing() {
    let (_dir, h) = ascii_handle().await;
    request::put_document(&h, "body text", "/b.md", None, false).await;

    let deleted = request::delete_document(&h, "/b.md").await;
    let RequestResult::Success(deleted) = deleted else { panic!("expected success") };
    assert_eq!(deleted.deleted_count, 1);

    let rows = h.get_documents_by_prefix("/b.md", "none", true, None).await;
    assert!(rows.is_empty());
}

#[tokio::test]
async fn scenario_3_delete_nonexistent() {
    let (_dir, h) = ascii_handle().await;
    let result = request::delete_document(&h, "/does-not-exist").await;
    let RequestResult::Success(result) = result else { panic!("expected success") };
    assert_eq!(result.deleted_count, 0);
    assert!(result.message.contains("見つかりません"));
}

#[tokio::test]
async fn scenario_4_corpus_and_hybrid_search() {
    let (_dir, h) = japanese_handle().await;
    request::put_document(&h, "猫は可愛い動物です。", "/docs/cat.txt", Some("animal"), false).await;
    request::put_document(&h, "犬は忠実なペットです。", "/docs/dog.txt", Some("animal"), false).await;
    request::put_document(&h, "Pythonはプログラミング言語です。", "/docs/python.txt", Some("tech"), false).await;

    let args = SearchArgs {
        query: "かわいいペット",
        top_k: 3,
        file_type: None,
        include_documents: true,
        max_content_length: None,
        min_score: None,
        filepath_prefix: None,
    };
    let result = request::search(&h, args).await;
    let RequestResult::Success(success) = result else { panic!("expected success") };
    assert!(success.count >= 1);
    let ids: Vec<String> = success.results.iter().map(|r| r.filepath.clone()).collect();
    assert!(ids.contains(&"/docs/cat.txt".to_string()) || ids.contains(&"/docs/dog.txt".to_string()), "{ids:?}");
}

#[tokio::test]
async fn scenario_5_metadata_filter() {
    let (_dir, h) = japanese_handle().await;
    request::put_document(&h, "猫は可愛い動物です。", "/docs/cat.txt", Some("animal"), false).await;
    request::put_document(&h, "犬は忠実なペットです。", "/docs/dog.txt", Some("animal"), false).await;
    request::put_document(&h, "Pythonはプログラミング言語です。", "/docs/python.txt", Some("tech"), false).await;

    let args = SearchArgs {
        query: "プログラミング",
        top_k: 5,
        file_type: Some("tech"),
        include_documents: true,
        max_content_length: None,
        min_score: None,
        filepath_prefix: None,
    };
    let result = request::search(&h, args).await;
    let RequestResult::Success(success) = result else { panic!("expected success") };
    assert!(success
        .results
        .iter()
        .all(|r| r.metadata.get("file_type").cloned().flatten().as_deref() == Some("tech")));
}

#[tokio::test]
async fn scenario_6_body_truncation() {
    let (_dir, h) = ascii_handle().await;
    let body: String = std::iter::repeat('x').take(1000).collect();
    request::put_document(&h, &body, "/long.md", Some("test"), false).await;

    let truncated_args = SearchArgs {
        query: &body,
        top_k: 1,
        file_type: None,
        include_documents: true,
        max_content_length: Some(100),
        min_score: None,
        filepath_prefix: None,
    };
    let truncated = request::search(&h, truncated_args).await;
    let RequestResult::Success(truncated) = truncated else { panic!("expected success") };
    let doc = truncated.results[0].document.as_ref().expect("document included");
    assert_eq!(doc.chars().count(), 103);
    assert!(doc.ends_with("..."));

    let full_args = SearchArgs {
        query: &body,
        top_k: 1,
        file_type: None,
        include_documents: true,
        max_content_length: Some(2000),
        min_score: None,
        filepath_prefix: None,
    };
    let full = request::search(&h, full_args).await;
    let RequestResult::Success(full) = full else { panic!("expected success") };
    let doc = full.results[0].document.as_ref().expect("document included");
    assert_eq!(doc.chars().count(), 1000);
    assert!(!doc.ends_with("..."));
}

#[tokio::test]
async fn scenario_7_validation_empty_query() {
    let (_dir, h) = ascii_handle().await;
    let args = SearchArgs {
        query: "",
        top_k: 3,
        file_type: None,
        include_documents: true,
        max_content_length: None,
        min_score: None,
        filepath_prefix: None,
    };
    let result = request::search(&h, args).await;
    let RequestResult::Error(err) = result else { panic!("expected error") };
    assert_eq!(err.error_type, "ValidationError");
}

#[tokio::test]
async fn scenario_7_validation_zero_top_k() {
    let (_dir, h) = ascii_handle().await;
    let args = SearchArgs {
        query: "abc",
        top_k: 0,
        file_type: None,
        include_documents: true,
        max_content_length: None,
        min_score: None,
        filepath_prefix: None,
    };
    let result = request::search(&h, args).await;
    let RequestResult::Error(err) = result else { panic!("expected error") };
    assert_eq!(err.error_type, "ValidationError");
}
