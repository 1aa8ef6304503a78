//! Hybrid Retriever (spec §4.G): BM25 over in-memory chunks + dense retrieval
//! via the Vector Store Adapter, fused by weighted reciprocal rank, with an
//! optional cross-encoder re-rank pass. Mirrors `create_hybrid_retriever`/
//! `create_retriever_with_reranker` from the system this crate's retrieval
//! core is patterned on: build BM25 once per store generation, fuse with
//! fixed ensemble weights, degrade gracefully when the re-ranker backend is
//! unavailable (spec §7 `dependency` fallback).

use crate::bm25::Bm25Index;
use crate::embeddings::EmbeddingBackend;
use crate::errors::CoreResult;
use crate::vector_store::{cosine_similarity, ScoredChunk, StoredChunk, VectorStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

pub const DEFAULT_BM25_K: usize = 10;
pub const DEFAULT_VECTOR_K: usize = 12;
pub const DEFAULT_RERANK_TOP_N: usize = 6;
const BM25_WEIGHT: f32 = 0.4;
const VECTOR_WEIGHT: f32 = 0.6;
const RRF_CONST: f32 = 60.0;

pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, chunk_text: &str) -> CoreResult<f32>;
}

/// Default re-ranker backend: cosine of query/chunk embeddings from the same
/// static model used for dense retrieval. A real cross-encoder can replace
/// this via the `Reranker` trait without touching the retriever itself.
pub struct LocalReranker {
    embedder: Arc<dyn EmbeddingBackend>,
}

impl LocalReranker {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { embedder }
    }
}

impl Reranker for LocalReranker {
    fn score(&self, query: &str, chunk_text: &str) -> CoreResult<f32> {
        let q = self.embedder.embed(query)?;
        let c = self.embedder.embed(chunk_text)?;
        Ok(cosine_similarity(&q, &c))
    }
}

pub struct RetrievedChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

struct Bm25Cache {
    index: Bm25Index,
    /// Store length at build time; a crude generation marker — any add/delete
    /// invalidates the cache, matching spec §5 ("a store rebuild invalidates
    /// cached BM25 state, which must be rebuilt on next query").
    built_at_len: usize,
    order: Vec<String>,
}

pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    bm25: RwLock<Option<Bm25Cache>>,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn VectorStore>, reranker: Option<Arc<dyn Reranker>>) -> Self {
        Self { store, reranker, bm25: RwLock::new(None) }
    }

    pub fn invalidate_cache(&self) {
        if let Ok(mut guard) = self.bm25.write() {
            *guard = None;
        }
    }

    fn ensure_bm25(&self) -> CoreResult<()> {
        let current_len = self.store.len();
        {
            let guard = self.bm25.read().map_err(|_| crate::errors::CoreError::internal("bm25 cache poisoned"))?;
            if let Some(cache) = guard.as_ref() {
                if cache.built_at_len == current_len {
                    return Ok(());
                }
            }
        }
        let dump = self.store.dump();
        let order: Vec<String> = dump.iter().map(|c| c.id.clone()).collect();
        let texts: Vec<String> = dump.iter().map(|c| c.text.clone()).collect();
        let index = Bm25Index::build(&texts);
        let mut guard = self.bm25.write().map_err(|_| crate::errors::CoreError::internal("bm25 cache poisoned"))?;
        *guard = Some(Bm25Cache { index, built_at_len: current_len, order });
        Ok(())
    }

    pub fn retrieve(
        &self,
        text: &str,
        filter: Option<&HashMap<String, String>>,
    ) -> CoreResult<Vec<RetrievedChunk>> {
        if let Some(filter) = filter {
            if !filter.is_empty() {
                let hits = self.store.similarity_search(text, 10, Some(filter))?;
                return Ok(hits.into_iter().map(|h| RetrievedChunk { chunk: h.chunk, score: h.score }).collect());
            }
        }

        self.ensure_bm25()?;
        let bm25_order: Vec<(usize, f32)> = {
            let guard = self.bm25.read().map_err(|_| crate::errors::CoreError::internal("bm25 cache poisoned"))?;
            let cache = guard.as_ref().expect("ensure_bm25 populated the cache");
            cache.index.top_k(text, DEFAULT_BM25_K)
        };
        let bm25_ids: Vec<String> = {
            let guard = self.bm25.read().map_err(|_| crate::errors::CoreError::internal("bm25 cache poisoned"))?;
            let cache = guard.as_ref().expect("ensure_bm25 populated the cache");
            bm25_order.iter().map(|(i, _)| cache.order[*i].clone()).collect()
        };

        let vector_hits: Vec<ScoredChunk> = self.store.similarity_search(text, DEFAULT_VECTOR_K, None)?;

        let fused = fuse(&bm25_ids, &vector_hits);

        let candidates: Vec<RetrievedChunk> = match &self.reranker {
            None => fused,
            Some(reranker) => {
                match rerank(reranker.as_ref(), text, &fused) {
                    Ok(reranked) => reranked.into_iter().take(DEFAULT_RERANK_TOP_N).collect(),
                    Err(_) => fused, // dependency failure: fall back to the fused list
                }
            }
        };

        Ok(candidates)
    }
}

/// Weighted Reciprocal Rank Fusion. Insertion order (bm25 list first, then
/// vector-only ids) breaks ties, per spec §4.G ("Ordering within ensemble
/// fusion is stable with respect to insertion order at equal scores").
fn fuse(bm25_ids: &[String], vector_hits: &[ScoredChunk]) -> Vec<RetrievedChunk> {
    let mut chunk_by_id: HashMap<String, StoredChunk> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut fused_score: HashMap<String, f32> = HashMap::new();

    for (rank, id) in bm25_ids.iter().enumerate() {
        fused_score.insert(id.clone(), BM25_WEIGHT / (RRF_CONST + rank as f32 + 1.0));
        if seen.insert(id.clone()) {
            order.push(id.clone());
        }
    }
    for (rank, hit) in vector_hits.iter().enumerate() {
        let id = hit.chunk.id.clone();
        chunk_by_id.entry(id.clone()).or_insert_with(|| hit.chunk.clone());
        *fused_score.entry(id.clone()).or_insert(0.0) += VECTOR_WEIGHT / (RRF_CONST + rank as f32 + 1.0);
        if seen.insert(id.clone()) {
            order.push(id);
        }
    }

    let mut results: Vec<RetrievedChunk> = order
        .into_iter()
        .filter_map(|id| {
            let score = *fused_score.get(&id)?;
            let chunk = chunk_by_id.get(&id).cloned()?;
            Some(RetrievedChunk { chunk, score })
        })
        .collect();

    // Stable sort: ties keep their original (insertion-order) position.
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

fn rerank(reranker: &dyn Reranker, query: &str, fused: &[RetrievedChunk]) -> CoreResult<Vec<RetrievedChunk>> {
    let mut scored = Vec::with_capacity(fused.len());
    for item in fused {
        let score = reranker.score(query, &item.chunk.text)?;
        scored.push(RetrievedChunk { chunk: item.chunk.clone(), score });
    }
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored)
}
