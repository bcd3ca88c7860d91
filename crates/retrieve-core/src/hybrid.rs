//! Hybrid retrieval via Reciprocal Rank Fusion (C6).
//!
//! ```text
//! RRF(r) = 1 / (C + r)
//! score(id) = w_d * RRF(rank_dense(id)) + w_s * RRF(rank_sparse(id))
//! ```
//!
//! Dense and sparse retrieval run concurrently (see
//! [`crate::handle::RetrieveHandle::search`]); a document absent from one
//! ranking contributes zero from that side rather than being excluded. This
//! module owns only the pure fusion step: the handle fetches each leg itself
//! (the sparse leg through its write-generation-cached BM25 snapshot, see
//! C10) and passes both hit lists to [`fuse`].

use crate::dense::DenseHit;
use crate::dense::DenseRetrieveError;
use crate::sparse::SparseHit;
use std::collections::HashMap;
use std::fmt;

const W_DENSE: f32 = 0.5;
const W_SPARSE: f32 = 0.5;
const RRF_C: f32 = 60.0;

#[derive(Debug)]
pub enum HybridRetrieveError {
    Dense(DenseRetrieveError),
}

impl fmt::Display for HybridRetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HybridRetrieveError::Dense(e) => write!(f, "hybrid retrieval dense leg failed: {e}"),
        }
    }
}

impl std::error::Error for HybridRetrieveError {}

#[derive(Clone, Debug)]
pub struct HybridHit {
    pub id: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

fn rrf(rank: usize) -> f32 {
    1.0 / (RRF_C + rank as f32)
}

/// Pure RRF fusion over two already-fetched, already-ranked hit lists. Takes
/// the hit lists rather than performing retrieval itself so a caller holding
/// its own cached sparse leg (see C10) can fuse without forcing a rebuild of
/// that leg.
pub fn fuse(
    dense_hits: &[DenseHit],
    sparse_hits: &[SparseHit],
    top_k: usize,
    min_score: Option<f32>,
    filepath_prefix: Option<&str>,
) -> Vec<HybridHit> {
    // Ranks are 1-based positions within each leg's already-sorted output.
    let dense_rank: HashMap<&str, usize> = dense_hits.iter().enumerate().map(|(i, h)| (h.id.as_str(), i + 1)).collect();
    let sparse_rank: HashMap<&str, usize> = sparse_hits.iter().enumerate().map(|(i, h)| (h.id.as_str(), i + 1)).collect();

    let mut documents: HashMap<String, (Option<String>, HashMap<String, Option<String>>)> = HashMap::new();
    for h in dense_hits {
        documents.insert(h.id.clone(), (h.document.clone(), h.metadata.clone()));
    }
    for h in sparse_hits {
        documents.entry(h.id.clone()).or_insert_with(|| (h.document.clone(), h.metadata.clone()));
    }

    let mut fused: Vec<HybridHit> = documents
        .into_iter()
        .map(|(id, (document, metadata))| {
            let d_rank = dense_rank.get(id.as_str()).copied();
            let s_rank = sparse_rank.get(id.as_str()).copied();
            let score = d_rank.map(rrf).unwrap_or(0.0) * W_DENSE + s_rank.map(rrf).unwrap_or(0.0) * W_SPARSE;
            HybridHit { id, score, document, metadata }
        })
        .collect();

    fused.sort_unstable_by(|a, b| {
        let a_d = dense_rank.get(a.id.as_str()).copied().unwrap_or(usize::MAX);
        let b_d = dense_rank.get(b.id.as_str()).copied().unwrap_or(usize::MAX);
        let a_s = sparse_rank.get(a.id.as_str()).copied().unwrap_or(usize::MAX);
        let b_s = sparse_rank.get(b.id.as_str()).copied().unwrap_or(usize::MAX);
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_d.cmp(&b_d))
            .then_with(|| a_s.cmp(&b_s))
            .then_with(|| a.id.cmp(&b.id))
    });

    if let Some(min_score) = min_score {
        fused.retain(|h| h.score >= min_score);
    }
    if let Some(prefix) = filepath_prefix {
        fused.retain(|h| h.id.starts_with(prefix));
    }
    fused.truncate(top_k);

    fused
}
