//! Indexer (spec §4.H): orchestrates the Tracker, Loader/Splitter, and Vector
//! Store through full-rebuild and incremental update paths, grounded in
//! `load_or_create_db`'s rebuild-vs-incremental branching from the system
//! this crate's retrieval core is patterned on.

use crate::loader::{load_documents, split_documents};
use crate::retriever::HybridRetriever;
use crate::scanner::VaultScanOptions;
use crate::tracker::Tracker;
use crate::vector_store::VectorStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub docs_processed: usize,
    pub docs_new: usize,
    pub docs_modified: usize,
    pub docs_deleted: usize,
    pub is_incremental: bool,
    pub time_seconds: f64,
    pub success: bool,
}

/// Serializes all index builds behind one mutex (spec §5: "Indexer H
/// serializes itself with a single mutex ... concurrent `ensure_index` calls
/// coalesce"). The mutex itself provides the coalescing: a second caller
/// blocks until the first's build finishes, then immediately sees the result
/// of that build (tracker state + store are shared, not redone).
pub struct Indexer {
    vault_root: std::path::PathBuf,
    scan_opts: VaultScanOptions,
    store: Arc<dyn VectorStore>,
    retriever: Arc<HybridRetriever>,
    tracker: Mutex<Tracker>,
    build_lock: Mutex<()>,
}

impl Indexer {
    pub fn new(
        vault_root: std::path::PathBuf,
        scan_opts: VaultScanOptions,
        store: Arc<dyn VectorStore>,
        retriever: Arc<HybridRetriever>,
    ) -> Self {
        let tracker = Tracker::open(&vault_root);
        Self {
            vault_root,
            scan_opts,
            store,
            retriever,
            tracker: Mutex::new(tracker),
            build_lock: Mutex::new(()),
        }
    }

    pub fn ensure_index(&self, force_rebuild: bool) -> IndexStats {
        let _guard = self.build_lock.lock().unwrap_or_else(|p| p.into_inner());
        let start = Instant::now();

        let should_rebuild = {
            let tracker = self.tracker.lock().unwrap_or_else(|p| p.into_inner());
            force_rebuild || self.store.is_empty() || tracker.should_rebuild(&self.vault_root)
        };

        let mut stats = if should_rebuild {
            self.full_build()
        } else {
            self.incremental_update()
        };

        stats.time_seconds = start.elapsed().as_secs_f64();
        stats
    }

    fn full_build(&self) -> IndexStats {
        let docs = match load_documents(&self.scan_opts) {
            Ok(d) => d,
            Err(e) => {
                crate::debug_log!("[obsidianrag] full build load failed: {e}");
                return IndexStats { success: false, ..Default::default() };
            }
        };
        let chunks = split_documents(&docs);

        // Clear existing content only after we have a successfully loaded
        // replacement set — a load failure must leave any pre-existing store
        // untouched (spec §4.H failure policy).
        if let Err(e) = self.store.delete(&HashMap::new()) {
            crate::debug_log!("[obsidianrag] clearing store before rebuild failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }
        if let Err(e) = self.store.add(&chunks) {
            crate::debug_log!("[obsidianrag] full build add failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }
        if let Err(e) = self.store.persist() {
            crate::debug_log!("[obsidianrag] persisting store failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }

        let mut tracker = self.tracker.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = tracker.update_metadata(&self.vault_root, &self.scan_opts) {
            crate::debug_log!("[obsidianrag] tracker persist failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }

        self.retriever.invalidate_cache();

        IndexStats {
            docs_processed: docs.len(),
            docs_new: docs.len(),
            docs_modified: 0,
            docs_deleted: 0,
            is_incremental: false,
            time_seconds: 0.0,
            success: true,
        }
    }

    fn incremental_update(&self) -> IndexStats {
        let changes = {
            let tracker = self.tracker.lock().unwrap_or_else(|p| p.into_inner());
            match tracker.detect_changes(&self.scan_opts) {
                Ok(c) => c,
                Err(e) => {
                    crate::debug_log!("[obsidianrag] detect_changes failed: {e}");
                    return IndexStats { success: false, ..Default::default() };
                }
            }
        };

        if changes.is_empty() {
            return IndexStats { is_incremental: true, success: true, ..Default::default() };
        }

        for path in changes.deleted.iter().chain(changes.modified.iter()) {
            let mut filter = HashMap::new();
            let abs = self.vault_root.join(path);
            filter.insert("source".to_string(), abs.to_string_lossy().to_string());
            if let Err(e) = self.store.delete(&filter) {
                crate::debug_log!("[obsidianrag] incremental delete failed for {}: {e}", path.display());
                return IndexStats { success: false, ..Default::default() };
            }
        }

        let to_reload: Vec<_> = changes.new.iter().chain(changes.modified.iter()).cloned().collect();
        let reload_opts = VaultScanOptions {
            vault_root: self.vault_root.clone(),
            excluded_folders: self.scan_opts.excluded_folders.clone(),
            excluded_patterns: self.scan_opts.excluded_patterns.clone(),
        };
        let all_docs = match load_documents(&reload_opts) {
            Ok(d) => d,
            Err(e) => {
                crate::debug_log!("[obsidianrag] incremental load failed: {e}");
                return IndexStats { success: false, ..Default::default() };
            }
        };
        let docs: Vec<_> = all_docs
            .into_iter()
            .filter(|d| {
                let rel = d.source.strip_prefix(&self.vault_root).unwrap_or(&d.source);
                to_reload.iter().any(|p| p == rel)
            })
            .collect();
        let chunks = split_documents(&docs);

        if let Err(e) = self.store.add(&chunks) {
            crate::debug_log!("[obsidianrag] incremental add failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }
        if let Err(e) = self.store.persist() {
            crate::debug_log!("[obsidianrag] persisting store failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }

        let mut tracker = self.tracker.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = tracker.update_metadata(&self.vault_root, &self.scan_opts) {
            crate::debug_log!("[obsidianrag] tracker persist failed: {e}");
            return IndexStats { success: false, ..Default::default() };
        }

        self.retriever.invalidate_cache();

        IndexStats {
            docs_processed: changes.new.len() + changes.modified.len(),
            docs_new: changes.new.len(),
            docs_modified: changes.modified.len(),
            docs_deleted: changes.deleted.len(),
            is_incremental: true,
            time_seconds: 0.0,
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbeddingBackend;
    use crate::vector_store::FlatFileVectorStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn make_indexer(vault: &std::path::Path) -> Indexer {
        let embedder = Arc::new(FakeEmbeddingBackend);
        let store: Arc<dyn VectorStore> =
            Arc::new(FlatFileVectorStore::open(vault.join(".obsidianrag/db/embeddings.json"), embedder.clone()));
        let retriever = Arc::new(HybridRetriever::new(store.clone(), None));
        let scan_opts = VaultScanOptions {
            vault_root: vault.to_path_buf(),
            excluded_folders: vec![".obsidianrag".to_string()],
            excluded_patterns: vec![],
        };
        Indexer::new(vault.to_path_buf(), scan_opts, store, retriever)
    }

    #[test]
    fn full_then_incremental_scenario_from_spec() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "a".repeat(2000)).unwrap();
        std::fs::write(tmp.path().join("b.md"), "b".repeat(3000)).unwrap();

        let indexer = make_indexer(tmp.path());
        let stats = indexer.ensure_index(true);
        assert!(stats.success);
        assert!(!stats.is_incremental);
        assert_eq!(stats.docs_processed, 2);

        std::fs::write(tmp.path().join("a.md"), "a".repeat(2500)).unwrap();
        let stats = indexer.ensure_index(false);
        assert!(stats.success);
        assert!(stats.is_incremental);
        assert_eq!(stats.docs_modified, 1);
        assert_eq!(stats.docs_new, 0);
        assert_eq!(stats.docs_deleted, 0);

        std::fs::remove_file(tmp.path().join("b.md")).unwrap();
        let stats = indexer.ensure_index(false);
        assert_eq!(stats.docs_deleted, 1);
    }

    #[test]
    fn no_changes_is_a_cheap_noop() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "hello").unwrap();
        let indexer = make_indexer(tmp.path());
        indexer.ensure_index(true);
        let stats = indexer.ensure_index(false);
        assert!(stats.success);
        assert_eq!(stats.docs_processed, 0);
    }
}
