//! File Metadata Tracker (spec §4.D): persistent `path → (mtime, size,
//! fingerprint)` map, used to detect new/modified/deleted notes between
//! indexing runs without re-hashing unchanged files.
//!
//! Grounded in the flat-file JSON persistence pattern of this crate's
//! ancestor `vector_store.rs::IndexStore` (write-whole-file JSON, rebuild on
//! schema mismatch) — generalized here to vault-wide state keyed by relative
//! path instead of per-file chunk entries, with a SHA-256 content fingerprint
//! computed only when the cheap `(mtime, size)` pre-screen can't settle it.

use crate::scanner::{scan_vault, VaultScanOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerEntry {
    pub mtime_nanos: u128,
    pub size_bytes: u64,
    pub content_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerFile {
    schema_version: u32,
    vault_root: String,
    entries: HashMap<String, TrackerEntry>,
}

pub struct Tracker {
    path: PathBuf,
    state: TrackerFile,
}

#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub new: HashSet<PathBuf>,
    pub modified: HashSet<PathBuf>,
    pub deleted: HashSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

fn tracker_path(vault_root: &Path) -> PathBuf {
    vault_root.join(".obsidianrag").join("metadata.json")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl Tracker {
    pub fn open(vault_root: &Path) -> Self {
        let path = tracker_path(vault_root);
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<TrackerFile>(&text).ok())
            .unwrap_or_default();
        Self { path, state }
    }

    /// True when the tracker file is absent, the schema is stale, or the
    /// recorded vault root no longer matches — any of these force a full
    /// rebuild rather than a (potentially wrong) incremental update.
    pub fn should_rebuild(&self, vault_root: &Path) -> bool {
        self.state.schema_version != SCHEMA_VERSION
            || self.state.vault_root.is_empty()
            || self.state.vault_root != vault_root.to_string_lossy()
    }

    /// Walk the vault (honoring §4.E exclusions) and classify every file as
    /// new, modified (mtime/size or content hash differs), or still-known.
    /// Files present in the tracker but absent on disk are `deleted`.
    pub fn detect_changes(&self, scan_opts: &VaultScanOptions) -> std::io::Result<ChangeSet> {
        let mut changes = ChangeSet::default();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in scan_vault(scan_opts)? {
            let rel_key = entry.rel_path.to_string_lossy().replace('\\', "/");
            seen.insert(rel_key.clone());

            let metadata = std::fs::metadata(&entry.abs_path)?;
            let mtime_nanos = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let size_bytes = metadata.len();

            match self.state.entries.get(&rel_key) {
                None => {
                    changes.new.insert(entry.rel_path.clone());
                }
                Some(prev) => {
                    if prev.mtime_nanos == mtime_nanos && prev.size_bytes == size_bytes {
                        continue; // pre-screen passes: skip fingerprint work entirely
                    }
                    let bytes = std::fs::read(&entry.abs_path)?;
                    let hash = sha256_hex(&bytes);
                    if hash != prev.content_hash {
                        changes.modified.insert(entry.rel_path.clone());
                    }
                }
            }
        }

        for known in self.state.entries.keys() {
            if !seen.contains(known) {
                changes.deleted.insert(PathBuf::from(known));
            }
        }

        Ok(changes)
    }

    /// Overwrite the persisted document with a fresh walk result, atomically
    /// (write-temp-then-rename on the same filesystem, per spec §4.D/§8.1).
    pub fn update_metadata(&mut self, vault_root: &Path, scan_opts: &VaultScanOptions) -> std::io::Result<()> {
        let mut entries = HashMap::new();
        for entry in scan_vault(scan_opts)? {
            let bytes = std::fs::read(&entry.abs_path)?;
            let metadata = std::fs::metadata(&entry.abs_path)?;
            let mtime_nanos = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let rel_key = entry.rel_path.to_string_lossy().replace('\\', "/");
            entries.insert(
                rel_key,
                TrackerEntry {
                    mtime_nanos,
                    size_bytes: metadata.len(),
                    content_hash: sha256_hex(&bytes),
                },
            );
        }

        self.state = TrackerFile {
            schema_version: SCHEMA_VERSION,
            vault_root: vault_root.to_string_lossy().to_string(),
            entries,
        };
        self.persist()
    }

    fn persist(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, text)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
