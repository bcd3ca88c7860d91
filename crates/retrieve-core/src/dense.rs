//! Dense (embedding-similarity) retrieval (C4).
//!
//! A thin adapter: hand an already-embedded query vector to the vector
//! store and reshape the result. All ranking and similarity math lives in
//! `vector_store`; this module owns none of it. The query is embedded once
//! by the caller ([`crate::handle::RetrieveHandle::search`]), which also
//! needs the vector's dimension for the response payload and would
//! otherwise have to embed the same query text twice.

use crate::embedder::EmbeddingError;
use crate::vector_store::{MetadataPredicate, VectorStore, VectorStoreError};
use std::fmt;

#[derive(Debug)]
pub enum DenseRetrieveError {
    Embedding(EmbeddingError),
    Store(VectorStoreError),
}

impl fmt::Display for DenseRetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenseRetrieveError::Embedding(e) => write!(f, "dense retrieval embedding failed: {e}"),
            DenseRetrieveError::Store(e) => write!(f, "dense retrieval store query failed: {e}"),
        }
    }
}

impl std::error::Error for DenseRetrieveError {}

#[derive(Clone, Debug)]
pub struct DenseHit {
    pub id: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: std::collections::HashMap<String, Option<String>>,
}

pub async fn retrieve_with_vector(
    store: &VectorStore,
    query_embedding: &[f32],
    top_k: usize,
    predicate: Option<&MetadataPredicate>,
) -> Result<Vec<DenseHit>, DenseRetrieveError> {
    let summary = store
        .query(query_embedding, top_k, predicate, true)
        .await
        .map_err(DenseRetrieveError::Store)?;
    Ok(summary
        .results
        .into_iter()
        .map(|r| DenseHit {
            id: r.id,
            score: r.score,
            document: r.document,
            metadata: r.metadata,
        })
        .collect())
}
