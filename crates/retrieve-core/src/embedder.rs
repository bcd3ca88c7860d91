//! Dense embedding backend (C9).
//!
//! The embedder is a capability, not a fixed implementation: anything that
//! can turn text into fixed-length float vectors qualifies. The default
//! backend runs entirely on the local CPU so the crate is runnable without
//! an external embedding service.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug)]
pub enum EmbeddingError {
    BackendUnavailable(String),
    BackendFailure(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::BackendUnavailable(msg) => write!(f, "embedding backend unavailable: {msg}"),
            EmbeddingError::BackendFailure(msg) => write!(f, "embedding backend failure: {msg}"),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// `embed_many` must preserve input order and return exactly one vector per
/// input text, all of the same dimension.
pub trait Embedder: Send + Sync {
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_many(&[text.to_string()])?.into_iter().next().unwrap())
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Local CPU embedder over `fastembed`. The underlying model is loaded lazily
/// on first use and cached for the lifetime of the process, since model
/// initialization is the expensive part and every subsequent call only runs
/// inference.
#[cfg(feature = "local-embedder")]
pub struct LocalEmbedder {
    model: Mutex<Option<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embedder")]
impl LocalEmbedder {
    pub fn new() -> Self {
        Self { model: Mutex::new(None) }
    }

    fn with_model<R>(&self, f: impl FnOnce(&fastembed::TextEmbedding) -> Result<R, EmbeddingError>) -> Result<R, EmbeddingError> {
        let mut guard = self.model.lock().expect("embedder mutex poisoned");
        if guard.is_none() {
            let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
                fastembed::EmbeddingModel::AllMiniLML6V2,
            ))
            .map_err(|e| EmbeddingError::BackendUnavailable(e.to_string()))?;
            *guard = Some(model);
        }
        f(guard.as_ref().unwrap())
    }
}

#[cfg(feature = "local-embedder")]
impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "local-embedder")]
impl Embedder for LocalEmbedder {
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.with_model(|model| {
            let docs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            model
                .embed(docs, None)
                .map_err(|e| EmbeddingError::BackendFailure(e.to_string()))
        })
    }
}

/// Construct the default embedder, or fail with `BackendUnavailable` when
/// the local backend cannot initialize and no custom embedder has been
/// supplied.
pub fn default_embedder() -> Result<Box<dyn Embedder>, EmbeddingError> {
    #[cfg(feature = "local-embedder")]
    {
        Ok(Box::new(LocalEmbedder::new()))
    }
    #[cfg(not(feature = "local-embedder"))]
    {
        Err(EmbeddingError::BackendUnavailable(
            "local embedder backend not compiled in".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder {
        dim: usize,
    }

    impl Embedder for StubEmbedder {
        fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dim]).collect())
        }
    }

    #[test]
    fn embed_one_delegates_to_embed_many() {
        let e = StubEmbedder { dim: 3 };
        let v = e.embed_one("abc").unwrap();
        assert_eq!(v, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn embed_many_preserves_order() {
        let e = StubEmbedder { dim: 1 };
        let v = e.embed_many(&["a".into(), "bb".into(), "ccc".into()]).unwrap();
        assert_eq!(v, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }
}
