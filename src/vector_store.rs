//! Vector Store Adapter (spec §4.F): persistent embedding store over cosine
//! distance with `[0,1]`-normalized relevance scores.
//!
//! Grounded in this crate's ancestor `vector_store.rs::IndexStore` — a
//! flat-file JSON index with whole-file load/save and a rebuild-on-corruption
//! fallback — generalized from per-file AST chunks to vault chunks, and with
//! the brute-force cosine search promoted to the documented contract (spec:
//! "Any backend satisfying these contracts is acceptable; the cosine metric
//! and [0,1] normalization are non-negotiable").

use crate::embeddings::{EmbeddingBackend, PASSAGE_PREFIX, QUERY_PREFIX};
use crate::errors::{CoreError, CoreResult};
use crate::loader::Chunk;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    /// Relevance in `[0,1]`, higher is better.
    pub score: f32,
}

/// `A · B / (|A| |B|)`, mapped from `[-1,1]` into `[0,1]` so callers never see
/// a negative relevance score (spec §4.F: "relevance score in [0,1]").
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

pub trait VectorStore: Send + Sync {
    fn add(&self, chunks: &[Chunk]) -> CoreResult<()>;
    /// Delete every stored chunk whose metadata matches all `filter` entries.
    fn delete(&self, filter: &HashMap<String, String>) -> CoreResult<usize>;
    fn similarity_search(
        &self,
        text: &str,
        k: usize,
        filter: Option<&HashMap<String, String>>,
    ) -> CoreResult<Vec<ScoredChunk>>;
    fn dump(&self) -> Vec<StoredChunk>;
    fn persist(&self) -> CoreResult<()>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    chunks: Vec<StoredChunk>,
}

pub struct FlatFileVectorStore {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingBackend>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl FlatFileVectorStore {
    pub fn db_path(vault_root: &Path) -> PathBuf {
        vault_root.join(".obsidianrag").join("db").join("embeddings.json")
    }

    /// Open (or initialize empty) the flat-file store at `path`.
    pub fn open(path: PathBuf, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        let chunks = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<StoreFile>(&text).ok())
            .map(|f| f.chunks)
            .unwrap_or_default();
        Self {
            path,
            embedder,
            chunks: RwLock::new(chunks),
        }
    }

    fn matches(metadata: &HashMap<String, String>, filter: &HashMap<String, String>) -> bool {
        filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

impl VectorStore for FlatFileVectorStore {
    fn add(&self, new_chunks: &[Chunk]) -> CoreResult<()> {
        // Embedding is the expensive part; fan it out across threads the same
        // way the ancestor of this store parallelizes its own read+hash phase.
        let out: CoreResult<Vec<StoredChunk>> = new_chunks
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let embedding = self.embedder.embed(&format!("{PASSAGE_PREFIX}{}", chunk.text))?;
                let source = chunk.source.to_string_lossy().to_string();
                Ok(StoredChunk {
                    id: format!("{}#{i}-{}", source, chunk.text.len()),
                    text: chunk.text.clone(),
                    source,
                    metadata: chunk.metadata.clone(),
                    embedding,
                })
            })
            .collect();
        let out = out?;

        let mut guard = self.chunks.write().map_err(|_| CoreError::internal("vector store lock poisoned"))?;
        guard.extend(out);
        Ok(())
    }

    fn delete(&self, filter: &HashMap<String, String>) -> CoreResult<usize> {
        let mut guard = self.chunks.write().map_err(|_| CoreError::internal("vector store lock poisoned"))?;
        let before = guard.len();
        guard.retain(|c| !Self::matches(&c.metadata, filter));
        Ok(before - guard.len())
    }

    fn similarity_search(
        &self,
        text: &str,
        k: usize,
        filter: Option<&HashMap<String, String>>,
    ) -> CoreResult<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed(&format!("{QUERY_PREFIX}{text}"))?;
        let guard = self.chunks.read().map_err(|_| CoreError::internal("vector store lock poisoned"))?;

        let mut scored: Vec<ScoredChunk> = guard
            .iter()
            .filter(|c| filter.map(|f| Self::matches(&c.metadata, f)).unwrap_or(true))
            .map(|c| ScoredChunk {
                chunk: c.clone(),
                score: cosine_similarity(&query_vec, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn dump(&self) -> Vec<StoredChunk> {
        self.chunks.read().map(|g| g.clone()).unwrap_or_default()
    }

    fn persist(&self) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CoreError::from)?;
        }
        let guard = self.chunks.read().map_err(|_| CoreError::internal("vector store lock poisoned"))?;
        let file = StoreFile { chunks: guard.clone() };
        let text = serde_json::to_string(&file).map_err(|e| CoreError::internal(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(CoreError::from)?;
        std::fs::rename(&tmp, &self.path).map_err(CoreError::from)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.chunks.read().map(|g| g.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbeddingBackend;
    use tempfile::TempDir;

    fn chunk(source: &str, text: &str) -> Chunk {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        Chunk { source: PathBuf::from(source), text: text.to_string(), metadata }
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_scores_zero_not_nan() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn add_then_search_returns_matches() {
        let tmp = TempDir::new().unwrap();
        let store = FlatFileVectorStore::open(tmp.path().join("db.json"), Arc::new(FakeEmbeddingBackend));
        store.add(&[chunk("a.md", "rust programming"), chunk("b.md", "baking bread")]).unwrap();
        let results = store.similarity_search("rust programming", 1, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source, "a.md");
        assert!(results[0].score >= 0.0 && results[0].score <= 1.0);
    }

    #[test]
    fn delete_by_source_removes_only_matching() {
        let tmp = TempDir::new().unwrap();
        let store = FlatFileVectorStore::open(tmp.path().join("db.json"), Arc::new(FakeEmbeddingBackend));
        store.add(&[chunk("a.md", "one"), chunk("b.md", "two")]).unwrap();
        let mut filter = HashMap::new();
        filter.insert("source".to_string(), "a.md".to_string());
        let removed = store.delete(&filter).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.dump()[0].source, "b.md");
    }

    #[test]
    fn persist_then_open_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        let store = FlatFileVectorStore::open(path.clone(), Arc::new(FakeEmbeddingBackend));
        store.add(&[chunk("a.md", "hello")]).unwrap();
        store.persist().unwrap();

        let reopened = FlatFileVectorStore::open(path, Arc::new(FakeEmbeddingBackend));
        assert_eq!(reopened.len(), 1);
    }
}
