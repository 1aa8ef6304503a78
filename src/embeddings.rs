//! Replaceable embedding backend (spec §1: "Embedding generation itself ...
//! treated as replaceable backend"). Default implementation wraps
//! `model2vec-rs`, exactly as this crate's ancestor does for its own local
//! hybrid search.

use crate::errors::{CoreError, CoreResult};
use model2vec_rs::model::StaticModel;
use std::sync::Mutex;

/// Prefix applied before embedding a stored chunk. `potion-retrieval-32M` is
/// E5-style and asymmetric: passage and query text must carry distinct
/// prefixes or retrieval ranking quality degrades silently.
pub const PASSAGE_PREFIX: &str = "passage: ";
/// Prefix applied before embedding a query string; see `PASSAGE_PREFIX`.
pub const QUERY_PREFIX: &str = "query: ";

pub trait EmbeddingBackend: Send + Sync {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// `model2vec-rs`'s `StaticModel` is not `Sync` by construction guarantees in
/// its public API, so access is serialized behind a mutex — consistent with
/// this crate's "coarse mutual exclusion is acceptable" stance on read-mostly
/// shared resources (spec §4.K).
pub struct Model2VecBackend {
    model: Mutex<StaticModel>,
}

impl Model2VecBackend {
    pub fn from_pretrained(model_id: &str) -> CoreResult<Self> {
        let model = StaticModel::from_pretrained(model_id, None, None, None)
            .map_err(|e| CoreError::dependency(format!("loading embedding model {model_id}: {e}")))?;
        Ok(Self { model: Mutex::new(model) })
    }

    pub const DEFAULT_MODEL: &'static str = "minishlab/potion-retrieval-32M";
}

impl EmbeddingBackend for Model2VecBackend {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let model = self
            .model
            .lock()
            .map_err(|_| CoreError::internal("embedding model lock poisoned"))?;
        Ok(model.encode_single(text))
    }
}

/// Deterministic in-memory backend used by tests so the retrieval/indexer
/// unit tests don't depend on network access or a downloaded model.
#[cfg(test)]
pub struct FakeEmbeddingBackend;

#[cfg(test)]
impl EmbeddingBackend for FakeEmbeddingBackend {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        // A crude bag-of-characters hash projected into a fixed small space —
        // enough to make semantically-similar strings land close together
        // for test fixtures without pulling in a real model.
        const DIM: usize = 16;
        let mut v = vec![0f32; DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[(byte as usize + i) % DIM] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
