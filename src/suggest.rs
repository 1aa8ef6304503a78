//! Folder Suggester (spec §4.J) plus the keyword-map fallback supplemented
//! from `suggest_folder_location` in the system this crate's write path is
//! patterned on, used when the semantic suggester has nothing to vote on
//! (cold index or an embedding-backend `dependency` failure, spec §7).

use crate::retriever::HybridRetriever;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SuggestionCandidate {
    pub folder: String,
    pub votes: usize,
    pub confidence: f32,
    pub similar_notes: Vec<String>,
}

/// Query the retriever with `content`, tally the parent folders of the first
/// `limit` results, and return the top `top_k` by vote count.
pub fn suggest_folder(retriever: &HybridRetriever, content: &str, limit: usize, top_k: usize) -> Vec<SuggestionCandidate> {
    let hits = match retriever.retrieve(content, None) {
        Ok(h) => h,
        Err(_) => return vec![],
    };

    let mut votes: HashMap<String, usize> = HashMap::new();
    let mut examples: HashMap<String, Vec<String>> = HashMap::new();
    let mut total_votes = 0usize;

    for hit in hits.into_iter().take(limit) {
        let folder = Path::new(&hit.chunk.source)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|s| !s.is_empty() && s != ".")
            .unwrap_or_default();
        if folder.is_empty() {
            continue;
        }
        *votes.entry(folder.clone()).or_insert(0) += 1;
        total_votes += 1;

        let stem = Path::new(&hit.chunk.source)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let entry = examples.entry(folder).or_default();
        if entry.len() < 3 && !stem.is_empty() {
            entry.push(stem);
        }
    }

    if total_votes == 0 {
        return vec![];
    }

    let mut candidates: Vec<SuggestionCandidate> = votes
        .into_iter()
        .map(|(folder, v)| SuggestionCandidate {
            confidence: v as f32 / total_votes as f32,
            similar_notes: examples.remove(&folder).unwrap_or_default(),
            votes: v,
            folder,
        })
        .collect();

    candidates.sort_by(|a, b| b.votes.cmp(&a.votes));
    candidates.truncate(top_k);
    candidates
}

/// Fixed keyword → folder hints, consulted only when the semantic suggester
/// returns nothing.
const KEYWORD_FOLDERS: &[(&[&str], &str)] = &[
    (&["ai", "machine learning", "neural", "model", "llm"], "02_Learning/AI-ML"),
    (&["poem", "poetry", "verse", "stanza"], "05_Creative/Poetry"),
    (&["reflection", "journal", "diary", "feelings"], "03_Journal"),
    (&["code", "function", "bug", "programming", "algorithm"], "02_Learning/Code"),
    (&["system", "architecture", "infrastructure", "design"], "02_Learning/Systems"),
    (&["philosophy", "ethics", "metaphysics", "epistemology"], "02_Learning/Philosophy"),
    (&["psychology", "behavior", "cognition", "emotion"], "02_Learning/Psychology"),
];

/// Keyword-only fallback (spec §7 `dependency` recovery: "keyword-only folder
/// suggestion"). Falls further back to an inbox-like folder at the vault
/// root, and finally `None` when nothing matches.
pub fn keyword_folder_hint(content: &str, vault_root: &Path) -> Option<String> {
    let lower = content.to_lowercase();
    for (keywords, folder) in KEYWORD_FOLDERS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(folder.to_string());
        }
    }

    std::fs::read_dir(vault_root).ok()?.flatten().find_map(|entry| {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) && name.contains("inbox") {
            Some(entry.file_name().to_string_lossy().to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbeddingBackend;
    use crate::loader::Chunk;
    use crate::vector_store::{FlatFileVectorStore, VectorStore};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn votes_tally_parent_folders() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(FakeEmbeddingBackend);
        let store = FlatFileVectorStore::open(tmp.path().join("db.json"), embedder);
        store
            .add(&[
                Chunk { source: PathBuf::from("02_Learning/Python/a.md"), text: "python list comprehension".into(), metadata: HashMap::new() },
                Chunk { source: PathBuf::from("02_Learning/Python/b.md"), text: "python generator".into(), metadata: HashMap::new() },
                Chunk { source: PathBuf::from("03_Journal/c.md"), text: "unrelated entry".into(), metadata: HashMap::new() },
            ])
            .unwrap();
        let retriever = HybridRetriever::new(Arc::new(store), None);
        let candidates = suggest_folder(&retriever, "python list comprehension generator", 5, 3);
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].folder, "02_Learning/Python");
        assert!(candidates[0].confidence >= 0.6);
    }

    #[test]
    fn keyword_fallback_matches_ai_keywords() {
        let tmp = TempDir::new().unwrap();
        let hint = keyword_folder_hint("a note about neural networks and llms", tmp.path());
        assert_eq!(hint.as_deref(), Some("02_Learning/AI-ML"));
    }

    #[test]
    fn keyword_fallback_finds_inbox_folder() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Inbox")).unwrap();
        let hint = keyword_folder_hint("nothing matches any keyword at all", tmp.path());
        assert_eq!(hint.as_deref(), Some("Inbox"));
    }
}
