//! Sparse (BM25) retrieval (C5).
//!
//! Building a fresh `Bm25Index` over the current corpus and the EPS-filtered
//! scoring described in §4.5 live in
//! [`crate::handle::RetrieveHandle::sparse_search`], which caches the built
//! index across queries keyed by the vector store's write generation (C10)
//! rather than rebuilding on every call. This module only carries the result
//! shape both that cached search and [`crate::hybrid::fuse`] operate on.

use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct SparseHit {
    pub id: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}
