//! Vault-scoped context (spec §9 redesign note: "Replace module-level mutable
//! singletons with a vault-scoped context struct passed explicitly"). Bundles
//! everything a single vault needs: config, path policy, caches, and handles
//! to the Indexer/Tracker/Store/Retriever — one instance per opened vault,
//! no process-global state.

use crate::cache::{NoteNameCache, SkillCache};
use crate::config::{self, ServerSettings, VaultConfig};
use crate::embeddings::EmbeddingBackend;
use crate::errors::CoreResult;
use crate::indexer::Indexer;
use crate::retriever::{HybridRetriever, LocalReranker};
use crate::scanner::VaultScanOptions;
use crate::security::ForbiddenPatterns;
use crate::skills::{load_skills, Skill};
use crate::vector_store::{FlatFileVectorStore, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct VaultContext {
    pub root: PathBuf,
    pub config: VaultConfig,
    pub settings: ServerSettings,
    pub forbidden: ForbiddenPatterns,
    pub note_cache: NoteNameCache,
    pub skill_cache: SkillCache,
    pub store: Arc<dyn VectorStore>,
    pub retriever: Arc<HybridRetriever>,
    pub indexer: Indexer,
}

impl VaultContext {
    pub fn open(root: &Path, embedder: Arc<dyn EmbeddingBackend>) -> CoreResult<Self> {
        let root = std::fs::canonicalize(root)
            .map_err(|e| crate::errors::CoreError::config_error(format!("cannot open vault: {e}")))?;
        let config = config::load_vault_config(&root);
        let settings = ServerSettings::from_env();
        let forbidden = ForbiddenPatterns::load(&root, &config.private_paths)?;

        let mut excluded_folders: Vec<String> =
            config::default_excluded_folders().into_iter().map(String::from).collect();
        excluded_folders.extend(config.excluded_folders.clone());
        let mut excluded_patterns: Vec<String> =
            config::default_excluded_patterns().into_iter().map(String::from).collect();
        excluded_patterns.extend(config.excluded_patterns.clone());

        let scan_opts = VaultScanOptions { vault_root: root.clone(), excluded_folders, excluded_patterns };

        let db_path = root.join(".obsidianrag").join("db").join("embeddings.json");
        let store: Arc<dyn VectorStore> = Arc::new(FlatFileVectorStore::open(db_path, embedder.clone()));
        let reranker = Arc::new(LocalReranker::new(embedder));
        let retriever = Arc::new(HybridRetriever::new(store.clone(), Some(reranker)));
        let indexer = Indexer::new(root.clone(), scan_opts, store.clone(), retriever.clone());

        Ok(Self {
            root,
            config,
            settings,
            forbidden,
            note_cache: NoteNameCache::new(Duration::from_secs(settings.cache_ttl_secs)),
            skill_cache: SkillCache::default(),
            store,
            retriever,
            indexer,
        })
    }

    pub fn templates_folder(&self) -> Option<PathBuf> {
        if let Some(name) = &self.config.templates_folder {
            return Some(self.root.join(name));
        }
        config::detect_templates_folder(&self.root)
    }

    pub fn resolve_note(&self, name: &str) -> CoreResult<PathBuf> {
        self.note_cache
            .lookup(name, |n| crate::write_path::resolve_note(&self.root, n).ok())
            .ok_or_else(|| crate::errors::CoreError::not_found(format!("no note named '{name}'")))
    }

    pub fn skills(&self) -> Vec<Skill> {
        self.skill_cache.get_or_load(|| load_skills(&self.root))
    }

    pub fn global_rules(&self) -> CoreResult<String> {
        let path = config::agent_dir(&self.root).join("REGLAS_GLOBALES.md");
        std::fs::read_to_string(&path)
            .map_err(|_| crate::errors::CoreError::not_found("no global rules document configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::FakeEmbeddingBackend;
    use tempfile::TempDir;

    #[test]
    fn open_applies_default_exclusions() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".agents")).unwrap();
        let ctx = VaultContext::open(tmp.path(), Arc::new(FakeEmbeddingBackend)).unwrap();
        assert_eq!(ctx.config, VaultConfig::default());
        assert!(ctx.templates_folder().is_none());
    }

    #[test]
    fn global_rules_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let ctx = VaultContext::open(tmp.path(), Arc::new(FakeEmbeddingBackend)).unwrap();
        let err = ctx.global_rules().unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::NotFound);
    }
}
