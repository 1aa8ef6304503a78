//! Hand-rolled BM25 sparse index over in-memory chunk text.
//!
//! No crate in the dependency stack this core follows provides BM25 scoring,
//! so it's implemented directly the way this crate's ancestor hand-rolls its
//! own scoring primitives (cosine, symbol matching) rather than reaching for
//! a search-engine dependency for one well-understood formula.

use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub struct Bm25Index {
    doc_tokens: Vec<Vec<String>>,
    doc_len: Vec<usize>,
    avg_doc_len: f32,
    doc_freq: HashMap<String, usize>,
    n_docs: usize,
}

impl Bm25Index {
    pub fn build(documents: &[String]) -> Self {
        let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let doc_len: Vec<usize> = doc_tokens.iter().map(|t| t.len()).collect();
        let n_docs = doc_tokens.len();
        let avg_doc_len = if n_docs == 0 {
            0.0
        } else {
            doc_len.iter().sum::<usize>() as f32 / n_docs as f32
        };

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let unique: std::collections::HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        Self { doc_tokens, doc_len, avg_doc_len, doc_freq, n_docs }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.n_docs as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score every document against `query`, return the indices of the top-`k`
    /// scoring documents (score > 0) ordered descending, ties by original
    /// insertion order (stable sort).
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        if self.n_docs == 0 {
            return vec![];
        }
        let query_terms = tokenize(query);
        let mut scores: Vec<(usize, f32)> = (0..self.n_docs)
            .map(|i| (i, self.score_doc(i, &query_terms)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);
        scores
    }

    fn score_doc(&self, doc_idx: usize, query_terms: &[String]) -> f32 {
        let tokens = &self.doc_tokens[doc_idx];
        let doc_len = self.doc_len[doc_idx] as f32;

        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }

        let mut score = 0.0f32;
        for term in query_terms {
            let tf = *term_freq.get(term.as_str()).unwrap_or(&0) as f32;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(term);
            let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_len.max(1.0));
            score += idf * (tf * (K1 + 1.0)) / denom;
        }
        score
    }
}
