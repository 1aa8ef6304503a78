//! Cache Layer (spec §4.K): TTL'd note-name lookup and memoized skill
//! definitions. Grounded in `_note_cache`/`invalidate_note_cache` from the
//! system this crate's vault context is patterned on, replacing the original
//! module-level singleton with state owned by `VaultContext` (spec §9
//! "single-threaded caches" redesign note).

use crate::skills::Skill;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct NoteCacheEntry {
    inserted_at: Instant,
    resolved: Option<PathBuf>,
}

/// Key = lowercased file stem. Value = `(timestamp, resolved_path_or_none)`.
/// A miss performs a vault-wide walk via `resolver`; a hit still re-verifies
/// the file exists before returning it (spec testable property 7).
pub struct NoteNameCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, NoteCacheEntry>>,
}

impl NoteNameCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn lookup(&self, name: &str, resolver: impl FnOnce(&str) -> Option<PathBuf>) -> Option<PathBuf> {
        let key = name.to_lowercase();
        {
            let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(entry) = guard.get(&key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return match &entry.resolved {
                        Some(path) if path.exists() => Some(path.clone()),
                        Some(_) => {
                            // Stale: file was deleted since caching. Evict and fall through.
                            guard.remove(&key);
                            None
                        }
                        None => None,
                    };
                }
                guard.remove(&key);
            }
        }

        let resolved = resolver(&key);
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(key, NoteCacheEntry { inserted_at: Instant::now(), resolved: resolved.clone() });
        resolved
    }

    pub fn invalidate(&self, name: &str) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(&name.to_lowercase());
    }

    pub fn invalidate_all(&self) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.clear();
    }
}

/// Loaded on demand, memoized per vault root until explicitly invalidated.
pub struct SkillCache {
    skills: Mutex<Option<Vec<Skill>>>,
}

impl Default for SkillCache {
    fn default() -> Self {
        Self { skills: Mutex::new(None) }
    }
}

impl SkillCache {
    pub fn get_or_load(&self, loader: impl FnOnce() -> Vec<Skill>) -> Vec<Skill> {
        let mut guard = self.skills.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(loader());
        }
        guard.clone().unwrap_or_default()
    }

    pub fn invalidate_all(&self) {
        let mut guard = self.skills.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn miss_then_hit_does_not_call_resolver_again() {
        let cache = NoteNameCache::new(Duration::from_secs(60));
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        std::fs::write(&path, "x").unwrap();

        let mut calls = 0;
        let resolved = cache.lookup("note", |_| {
            calls += 1;
            Some(path.clone())
        });
        assert_eq!(resolved, Some(path.clone()));

        let resolved2 = cache.lookup("note", |_| {
            calls += 1;
            Some(path.clone())
        });
        assert_eq!(resolved2, Some(path));
        assert_eq!(calls, 1, "second lookup must be served from cache");
    }

    #[test]
    fn stale_entry_is_not_returned_after_deletion() {
        let cache = NoteNameCache::new(Duration::from_secs(60));
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        std::fs::write(&path, "x").unwrap();
        cache.lookup("note", |_| Some(path.clone()));

        std::fs::remove_file(&path).unwrap();
        let resolved = cache.lookup("note", |_| Some(path.clone()));
        assert_eq!(resolved, None, "cache must re-verify existence before returning a hit");
    }

    #[test]
    fn invalidate_forces_resolver_rerun() {
        let cache = NoteNameCache::new(Duration::from_secs(60));
        let mut calls = 0;
        cache.lookup("x", |_| {
            calls += 1;
            None
        });
        cache.invalidate("x");
        cache.lookup("x", |_| {
            calls += 1;
            None
        });
        assert_eq!(calls, 2);
    }

    #[test]
    fn skill_cache_loads_once() {
        let cache = SkillCache::default();
        let mut calls = 0;
        cache.get_or_load(|| {
            calls += 1;
            vec![]
        });
        cache.get_or_load(|| {
            calls += 1;
            vec![]
        });
        assert_eq!(calls, 1);
        cache.invalidate_all();
        cache.get_or_load(|| {
            calls += 1;
            vec![]
        });
        assert_eq!(calls, 2);
    }
}
