//! Durable `(id → embedding, body, metadata)` store (C3).
//!
//! The only component that owns durable state; every other component holds
//! ephemeral, recomputable state derived from this one. Guarded by a single
//! reader-writer lock: writers (`upsert`, `delete`) take it exclusively,
//! readers may run concurrently with one another but never alongside a
//! writer, so a concurrent reader never observes a torn record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const PERSIST_DIR_ENV: &str = "SEMCHE_CHROMA_DIR";
const DEFAULT_PERSIST_DIR: &str = "./chroma_db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Ip,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub enum VectorStoreError {
    InvalidArgument(String),
    DimensionMismatch { expected: usize, got: usize },
    BackendFailure(String),
}

impl fmt::Display for VectorStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorStoreError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            VectorStoreError::DimensionMismatch { expected, got } => {
                write!(f, "embedding dimension {got} does not match collection dimension {expected}")
            }
            VectorStoreError::BackendFailure(msg) => write!(f, "vector store backend failure: {msg}"),
        }
    }
}

impl std::error::Error for VectorStoreError {}

/// A conjunction of metadata equality conditions.
pub type MetadataPredicate = HashMap<String, String>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRecord {
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: HashMap<String, Option<String>>,
}

#[derive(Clone, Debug)]
pub struct DocumentRecord {
    pub id: String,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

pub struct UpsertSummary {
    pub count: usize,
    pub collection: String,
    pub persist_dir: PathBuf,
    pub distance: DistanceMetric,
}

pub struct DeleteSummary {
    pub deleted_count: usize,
}

#[derive(Clone, Debug)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: HashMap<String, Option<String>>,
}

pub struct QuerySummary {
    pub results: Vec<ScoredRecord>,
    pub distance: DistanceMetric,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    dimension: Option<usize>,
    records: HashMap<String, StoredRecord>,
}

struct Inner {
    dimension: Option<usize>,
    records: HashMap<String, StoredRecord>,
    generation: u64,
}

/// Resolve the persistence directory by the priority order of §4.3:
/// explicit argument → `SEMCHE_CHROMA_DIR` → `./chroma_db`.
pub fn resolve_persist_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(from_env) = env::var(PERSIST_DIR_ENV) {
        if !from_env.is_empty() {
            return PathBuf::from(from_env);
        }
    }
    PathBuf::from(DEFAULT_PERSIST_DIR)
}

pub struct VectorStore {
    collection: String,
    distance: DistanceMetric,
    persist_dir: PathBuf,
    snapshot_path: PathBuf,
    inner: RwLock<Inner>,
}

impl VectorStore {
    pub async fn open(
        persist_dir: PathBuf,
        collection: impl Into<String>,
        distance: DistanceMetric,
    ) -> Result<Self, VectorStoreError> {
        let collection = collection.into();
        let collection_dir = persist_dir.join(&collection);
        tokio::fs::create_dir_all(&collection_dir)
            .await
            .map_err(|e| VectorStoreError::BackendFailure(e.to_string()))?;
        let snapshot_path = collection_dir.join("store.json");

        let (dimension, records) = if snapshot_path.exists() {
            let raw = tokio::fs::read_to_string(&snapshot_path)
                .await
                .map_err(|e| VectorStoreError::BackendFailure(e.to_string()))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .map_err(|e| VectorStoreError::BackendFailure(e.to_string()))?;
            (snapshot.dimension, snapshot.records)
        } else {
            (None, HashMap::new())
        };

        Ok(Self {
            collection,
            distance,
            persist_dir,
            snapshot_path,
            inner: RwLock::new(Inner {
                dimension,
                records,
                generation: 0,
            }),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    pub fn distance(&self) -> DistanceMetric {
        self.distance
    }

    /// Monotonically increasing counter bumped on every write, used by C10
    /// to detect whether a cached sparse snapshot is stale.
    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    async fn flush(&self, inner: &Inner) -> Result<(), VectorStoreError> {
        let snapshot = Snapshot {
            dimension: inner.dimension,
            records: inner.records.clone(),
        };
        let json = serde_json::to_string(&snapshot).map_err(|e| VectorStoreError::BackendFailure(e.to_string()))?;
        let path = self.snapshot_path.clone();
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| VectorStoreError::BackendFailure(e.to_string()))
    }

    pub async fn upsert(
        &self,
        embeddings: &[Vec<f32>],
        documents: &[String],
        ids: &[String],
        updated_at: Option<&[Option<String>]>,
        file_types: Option<&[Option<String>]>,
    ) -> Result<UpsertSummary, VectorStoreError> {
        let n = documents.len();
        if n == 0 {
            return Err(VectorStoreError::InvalidArgument("empty input".to_string()));
        }
        if embeddings.len() != n || ids.len() != n {
            return Err(VectorStoreError::InvalidArgument(
                "embeddings/documents/ids length mismatch".to_string(),
            ));
        }
        if let Some(u) = updated_at {
            if u.len() != n {
                return Err(VectorStoreError::InvalidArgument("updated_at length mismatch".to_string()));
            }
        }
        if let Some(f) = file_types {
            if f.len() != n {
                return Err(VectorStoreError::InvalidArgument("file_types length mismatch".to_string()));
            }
        }

        let mut inner = self.inner.write().await;
        let established_dim = inner.dimension;
        for emb in embeddings {
            if let Some(d) = established_dim {
                if emb.len() != d {
                    return Err(VectorStoreError::DimensionMismatch { expected: d, got: emb.len() });
                }
            }
        }
        if established_dim.is_none() {
            inner.dimension = Some(embeddings[0].len());
        }

        for i in 0..n {
            let mut metadata: HashMap<String, Option<String>> = HashMap::new();
            metadata.insert("filepath".to_string(), Some(ids[i].clone()));
            metadata.insert(
                "updated_at".to_string(),
                updated_at.and_then(|u| u[i].clone()),
            );
            metadata.insert("file_type".to_string(), file_types.and_then(|f| f[i].clone()));

            inner.records.insert(
                ids[i].clone(),
                StoredRecord {
                    embedding: embeddings[i].clone(),
                    document: documents[i].clone(),
                    metadata,
                },
            );
        }
        inner.generation += 1;
        self.flush(&inner).await?;

        Ok(UpsertSummary {
            count: n,
            collection: self.collection.clone(),
            persist_dir: self.persist_dir.clone(),
            distance: self.distance,
        })
    }

    pub async fn get_by_ids(&self, ids: &[String]) -> Vec<DocumentRecord> {
        let inner = self.inner.read().await;
        ids.iter()
            .filter_map(|id| {
                inner.records.get(id).map(|rec| DocumentRecord {
                    id: id.clone(),
                    document: Some(rec.document.clone()),
                    metadata: rec.metadata.clone(),
                })
            })
            .collect()
    }

    pub async fn delete(&self, ids: &[String]) -> Result<DeleteSummary, VectorStoreError> {
        let mut inner = self.inner.write().await;
        let deleted_count = ids.iter().filter(|id| inner.records.remove(*id).is_some()).count();
        if deleted_count > 0 {
            inner.generation += 1;
            self.flush(&inner).await?;
        }
        Ok(DeleteSummary { deleted_count })
    }

    fn matches_predicate(metadata: &HashMap<String, Option<String>>, predicate: &MetadataPredicate) -> bool {
        predicate.iter().all(|(k, v)| {
            metadata
                .get(k)
                .map(|stored| stored.as_deref() == Some(v.as_str()))
                .unwrap_or(false)
        })
    }

    pub async fn get_all(&self, predicate: Option<&MetadataPredicate>, include_documents: bool) -> Vec<DocumentRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .filter(|(_, rec)| predicate.map(|p| Self::matches_predicate(&rec.metadata, p)).unwrap_or(true))
            .map(|(id, rec)| DocumentRecord {
                id: id.clone(),
                document: if include_documents { Some(rec.document.clone()) } else { None },
                metadata: rec.metadata.clone(),
            })
            .collect()
    }

    pub async fn query(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        predicate: Option<&MetadataPredicate>,
        include_documents: bool,
    ) -> Result<QuerySummary, VectorStoreError> {
        let inner = self.inner.read().await;
        if let Some(d) = inner.dimension {
            if query_embedding.len() != d {
                return Err(VectorStoreError::DimensionMismatch { expected: d, got: query_embedding.len() });
            }
        }

        let mut scored: Vec<ScoredRecord> = inner
            .records
            .iter()
            .filter(|(_, rec)| predicate.map(|p| Self::matches_predicate(&rec.metadata, p)).unwrap_or(true))
            .map(|(id, rec)| ScoredRecord {
                id: id.clone(),
                score: similarity(self.distance, query_embedding, &rec.embedding),
                document: if include_documents { Some(rec.document.clone()) } else { None },
                metadata: rec.metadata.clone(),
            })
            .collect();

        scored.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);

        Ok(QuerySummary { results: scored, distance: self.distance })
    }

    pub async fn get_by_prefix(
        &self,
        prefix: &str,
        file_type: &str,
        include_documents: bool,
        top_k: Option<usize>,
    ) -> Vec<DocumentRecord> {
        let inner = self.inner.read().await;
        let mut results: Vec<DocumentRecord> = inner
            .records
            .iter()
            .filter(|(id, rec)| {
                id.starts_with(prefix) && rec.metadata.get("file_type").map(|v| v.as_deref()) == Some(Some(file_type))
            })
            .map(|(id, rec)| DocumentRecord {
                id: id.clone(),
                document: if include_documents { Some(rec.document.clone()) } else { None },
                metadata: rec.metadata.clone(),
            })
            .collect();
        results.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        if let Some(k) = top_k {
            results.truncate(k);
        }
        results
    }
}

/// Cosine distance `d = 1 - cos_sim`; for `cosine` similarity is `1 - d = cos_sim`.
/// L2 similarity is `1 / (1 + euclidean_distance)`. Inner-product similarity is
/// the raw dot product (already similarity-shaped, per §4.3).
fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::L2 => 1.0 / (1.0 + euclidean_distance(a, b)),
        DistanceMetric::Ip => dot(a, b),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}
