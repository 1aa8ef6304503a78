//! Path Policy (spec §4.A): vault confinement, forbidden globs, restricted
//! folders. The single entry point is [`check_access`] — every read/write in
//! the Write Path and every file the Indexer touches goes through it.

use crate::errors::{CoreError, CoreResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// A compiled set of forbidden glob patterns, loaded once and cached.
/// `reload()` is the test/ops primitive to pick up a changed `.forbidden_paths`.
pub struct ForbiddenPatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ForbiddenPatterns {
    fn compile(patterns: Vec<String>) -> CoreResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for p in &patterns {
            let glob = Glob::new(p)
                .map_err(|e| CoreError::internal(format!("invalid forbidden pattern {p}: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| CoreError::internal(format!("compiling forbidden patterns: {e}")))?;
        Ok(Self { patterns, set })
    }

    /// Load `<vault>/.forbidden_paths` (newline-delimited globs, `#` comments)
    /// plus the configured private-folder globs (always included).
    pub fn load(vault_root: &Path, private_paths: &[String]) -> CoreResult<Self> {
        let mut patterns: Vec<String> = private_paths.to_vec();

        let list_path = vault_root.join(".forbidden_paths");
        if let Ok(text) = std::fs::read_to_string(&list_path) {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                patterns.push(line.to_string());
            }
        }

        Self::compile(patterns)
    }

    pub fn reload(&mut self, vault_root: &Path, private_paths: &[String]) -> CoreResult<()> {
        *self = Self::load(vault_root, private_paths)?;
        Ok(())
    }

    /// Returns `(is_forbidden, matched_pattern)` against a vault-relative path.
    pub fn is_forbidden(&self, vault_relative: &Path) -> (bool, Option<&str>) {
        let candidate = vault_relative.to_string_lossy().replace('\\', "/");
        for (idx, matched) in self.set.matches(candidate.as_str()).into_iter().enumerate() {
            let _ = idx;
            return (true, Some(self.patterns[matched].as_str()));
        }
        (false, None)
    }
}

/// Resolve `candidate` to a canonical absolute path and verify it is a
/// descendant of the canonical vault root. Fails closed: any I/O error during
/// canonicalization (broken symlink, missing parent) is a deny, not a pass.
pub fn validate_within_vault(vault_root: &Path, candidate: &Path) -> CoreResult<PathBuf> {
    let abs = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        vault_root.join(candidate)
    };

    let canon_root = std::fs::canonicalize(vault_root)
        .map_err(|e| CoreError::internal(format!("vault root unreadable: {e}")))?;

    // The target file may not exist yet (e.g. `create`). Canonicalize the
    // deepest existing ancestor and re-append the remaining components so a
    // not-yet-created path is still checked against `..`/symlink escapes.
    let canon = canonicalize_best_effort(&abs)
        .map_err(|e| CoreError::forbidden(format!("cannot resolve path: {e}")))?;

    if !canon.starts_with(&canon_root) {
        return Err(CoreError::forbidden(
            "path escapes the vault root".to_string(),
        ));
    }

    Ok(canon)
}

fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(c) = std::fs::canonicalize(path) {
        return Ok(c);
    }
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "path has no parent")
    })?;
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let canon_parent = canonicalize_best_effort(parent)?;
    Ok(canon_parent.join(file_name))
}

/// Returns true if `path` (vault-relative) falls under one of `restricted_globs`.
pub fn is_in_restricted(vault_relative: &Path, restricted_globs: &[String]) -> bool {
    let mut builder = GlobSetBuilder::new();
    for g in restricted_globs {
        if let Ok(glob) = Glob::new(g) {
            builder.add(glob);
        }
    }
    let Ok(set) = builder.build() else { return false };
    let candidate = vault_relative.to_string_lossy().replace('\\', "/");
    set.is_match(candidate.as_str())
}

/// The single composed entry point: vault confinement + forbidden-pattern
/// check. `operation_label` is used only in the error message, never the path
/// itself — forbidden errors must never leak the denied path (spec §7).
pub fn check_access(
    vault_root: &Path,
    candidate: &Path,
    forbidden: &ForbiddenPatterns,
    operation_label: &str,
) -> CoreResult<PathBuf> {
    let canon = validate_within_vault(vault_root, candidate)?;

    let canon_root = std::fs::canonicalize(vault_root)
        .map_err(|e| CoreError::internal(format!("vault root unreadable: {e}")))?;
    let rel = canon.strip_prefix(&canon_root).map_err(|_| {
        CoreError::forbidden("path escapes the vault root".to_string())
    })?;

    let (forbidden_hit, _pattern) = forbidden.is_forbidden(rel);
    if forbidden_hit {
        return Err(CoreError::forbidden(format!(
            "{operation_label} denied by vault policy"
        )));
    }

    Ok(canon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn within_vault_passes() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("note.md"), "hi").unwrap();
        let result = validate_within_vault(tmp.path(), Path::new("note.md"));
        assert!(result.is_ok());
    }

    #[test]
    fn escaping_vault_is_denied() {
        let tmp = TempDir::new().unwrap();
        let outside = tmp.path().join("..").join("escaped.md");
        let result = validate_within_vault(tmp.path(), &outside);
        assert!(result.is_err());
    }

    #[test]
    fn forbidden_glob_matches_double_star() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Private").join("nested")).unwrap();
        let forbidden = ForbiddenPatterns::load(tmp.path(), &["**/Private/**".to_string()]).unwrap();
        let (hit, _) = forbidden.is_forbidden(Path::new("Private/nested/secret.md"));
        assert!(hit);
    }

    #[test]
    fn forbidden_error_never_echoes_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Private")).unwrap();
        let forbidden = ForbiddenPatterns::load(tmp.path(), &["**/Private/*".to_string()]).unwrap();
        let err = check_access(
            tmp.path(),
            Path::new("Private/secret.md"),
            &forbidden,
            "create_note",
        )
        .unwrap_err();
        assert!(!err.message.contains("secret"));
        assert_eq!(err.kind, crate::errors::ErrorKind::Forbidden);
    }

    #[test]
    fn forbidden_paths_file_is_loaded() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".forbidden_paths"), "# comment\n**/Secret/*\n").unwrap();
        let forbidden = ForbiddenPatterns::load(tmp.path(), &[]).unwrap();
        let (hit, pattern) = forbidden.is_forbidden(Path::new("Secret/a.md"));
        assert!(hit);
        assert_eq!(pattern, Some("**/Secret/*"));
    }
}
