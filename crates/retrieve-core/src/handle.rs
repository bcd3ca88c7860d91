//! Service Handle & Configuration (C10).
//!
//! Owns every long-lived resource (tokenizer, embedder, vector store) and
//! the one piece of derived state worth caching across calls: the BM25
//! corpus snapshot. The cache is keyed by the vector store's write
//! generation counter, not a time-to-live — a counter can't go stale under
//! a slow clock the way a TTL can, so a search issued right after a write
//! always sees that write (I5).

use crate::bm25::Bm25Index;
use crate::dense::{self, DenseHit};
use crate::embedder::{default_embedder, Embedder, EmbeddingError};
use crate::hybrid::{self, HybridHit};
use crate::ingest::{self, IngestError};
use crate::request::SearchArgs;
use crate::sparse::SparseHit;
use crate::tokenizer::{default_tokenizer, Tokenizer, TokenizerError};
use crate::vector_store::{resolve_persist_dir, DistanceMetric, MetadataPredicate, VectorStore, VectorStoreError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const EPS: f32 = 1e-12;
const DEFAULT_COLLECTION: &str = "documents";
/// Each leg is queried for `2 * top_k` candidates before fusion, per §4.6:
/// "Each underlying retriever is queried for 2k results to widen the fusion
/// pool."
const CANDIDATE_POOL_MULTIPLIER: usize = 2;

#[derive(Debug)]
pub enum HandleInitError {
    Tokenizer(TokenizerError),
    Embedder(EmbeddingError),
    Store(VectorStoreError),
}

impl fmt::Display for HandleInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleInitError::Tokenizer(e) => write!(f, "failed to initialize tokenizer: {e}"),
            HandleInitError::Embedder(e) => write!(f, "failed to initialize embedder: {e}"),
            HandleInitError::Store(e) => write!(f, "failed to open vector store: {e}"),
        }
    }
}

impl std::error::Error for HandleInitError {}

struct SparseCache {
    generation: u64,
    index: Bm25Index,
    metadata_by_id: HashMap<String, HashMap<String, Option<String>>>,
}

pub struct PutDocumentOutcome {
    pub id: String,
    pub vector_dimension: usize,
}

pub struct DocumentRow {
    pub id: String,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

/// Process-wide handle a host embeds once and calls repeatedly; there is no
/// requirement that only one exist, but every operation in §6.1 is modeled
/// as a method on this type rather than a free function touching globals.
pub struct RetrieveHandle {
    tokenizer: Arc<dyn Tokenizer>,
    embedder: Box<dyn Embedder>,
    store: VectorStore,
    sparse_cache: Mutex<Option<SparseCache>>,
}

impl RetrieveHandle {
    pub async fn open(persist_dir: Option<PathBuf>) -> Result<Self, HandleInitError> {
        let tokenizer: Arc<dyn Tokenizer> = default_tokenizer().map_err(HandleInitError::Tokenizer)?.into();
        let embedder = default_embedder().map_err(HandleInitError::Embedder)?;
        let dir = resolve_persist_dir(persist_dir.as_deref());
        let store = VectorStore::open(dir, DEFAULT_COLLECTION, DistanceMetric::Cosine)
            .await
            .map_err(HandleInitError::Store)?;
        Ok(Self { tokenizer, embedder, store, sparse_cache: Mutex::new(None) })
    }

    pub fn with_components(
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Box<dyn Embedder>,
        store: VectorStore,
    ) -> Self {
        Self { tokenizer, embedder, store, sparse_cache: Mutex::new(None) }
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    pub fn persist_dir(&self) -> &Path {
        self.store.persist_dir()
    }

    pub async fn put_document(
        &self,
        text: &str,
        filepath: &str,
        file_type: Option<&str>,
        normalize: bool,
    ) -> Result<PutDocumentOutcome, IngestError> {
        let outcome = ingest::put(&self.store, self.embedder.as_ref(), text, filepath, file_type, normalize).await?;
        Ok(PutDocumentOutcome { id: outcome.id, vector_dimension: outcome.vector_dimension })
    }

    pub async fn delete_document(&self, filepath: &str) -> Result<usize, VectorStoreError> {
        let summary = self.store.delete(&[filepath.to_string()]).await?;
        Ok(summary.deleted_count)
    }

    pub async fn get_documents_by_prefix(
        &self,
        prefix: &str,
        file_type: &str,
        include_documents: bool,
        top_k: Option<usize>,
    ) -> Vec<DocumentRow> {
        self.store
            .get_by_prefix(prefix, file_type, include_documents, top_k)
            .await
            .into_iter()
            .map(|r| DocumentRow { id: r.id, document: r.document, metadata: r.metadata })
            .collect()
    }

    /// Rebuild the cached BM25 corpus only if the vector store has been
    /// written to since the cache was last populated.
    async fn refresh_sparse_cache(&self) {
        let current_generation = self.store.generation().await;
        let mut guard = self.sparse_cache.lock().await;
        let needs_rebuild = match guard.as_ref() {
            Some(cache) => cache.generation != current_generation,
            None => true,
        };
        if !needs_rebuild {
            return;
        }

        let corpus = self.store.get_all(None, true).await;
        let mut metadata_by_id = HashMap::new();
        let mut documents = Vec::with_capacity(corpus.len());
        let mut ids = Vec::with_capacity(corpus.len());
        for row in corpus {
            metadata_by_id.insert(row.id.clone(), row.metadata);
            documents.push(row.document.unwrap_or_default());
            ids.push(row.id);
        }

        let mut index = Bm25Index::new(Arc::clone(&self.tokenizer));
        if !documents.is_empty() {
            // `build` only errors on length mismatch or an empty corpus, both
            // already ruled out here.
            let _ = index.build(&documents, &ids);
        }

        *guard = Some(SparseCache { generation: current_generation, index, metadata_by_id });
    }

    async fn sparse_search(
        &self,
        query: &str,
        top_k: usize,
        predicate: Option<&MetadataPredicate>,
    ) -> Vec<SparseHit> {
        self.refresh_sparse_cache().await;
        let guard = self.sparse_cache.lock().await;
        let Some(cache) = guard.as_ref() else { return Vec::new() };
        if cache.index.is_empty() {
            return Vec::new();
        }

        let Ok(hits) = cache.index.search(query, cache.index.len()) else {
            return Vec::new();
        };

        hits.into_iter()
            .filter(|h| h.score > EPS)
            .filter_map(|h| {
                let metadata = cache.metadata_by_id.get(&h.id)?.clone();
                if let Some(predicate) = predicate {
                    let matches = predicate
                        .iter()
                        .all(|(k, v)| metadata.get(k).map(|stored| stored.as_deref() == Some(v.as_str())).unwrap_or(false));
                    if !matches {
                        return None;
                    }
                }
                Some(SparseHit { id: h.id, score: h.score, document: Some(h.text), metadata })
            })
            .take(top_k)
            .collect()
    }

    pub async fn search(
        &self,
        args: &SearchArgs<'_>,
    ) -> Result<(Vec<HybridHit>, usize), crate::hybrid::HybridRetrieveError> {
        let predicate: Option<MetadataPredicate> =
            args.file_type.map(|ft| HashMap::from([("file_type".to_string(), ft.to_string())]));
        let candidate_pool = args.top_k.saturating_mul(CANDIDATE_POOL_MULTIPLIER).max(args.top_k);

        let query_embedding = self
            .embedder
            .embed_one(args.query)
            .map_err(|e| crate::hybrid::HybridRetrieveError::Dense(crate::dense::DenseRetrieveError::Embedding(e)))?;
        let query_vector_dimension = query_embedding.len();

        let (dense_result, sparse_hits): (Result<Vec<DenseHit>, _>, Vec<SparseHit>) = tokio::join!(
            dense::retrieve_with_vector(&self.store, &query_embedding, candidate_pool, predicate.as_ref()),
            self.sparse_search(args.query, candidate_pool, predicate.as_ref())
        );
        let dense_hits = dense_result.map_err(crate::hybrid::HybridRetrieveError::Dense)?;

        let fused = hybrid::fuse(&dense_hits, &sparse_hits, args.top_k, args.min_score, args.filepath_prefix);
        Ok((fused, query_vector_dimension))
    }
}
