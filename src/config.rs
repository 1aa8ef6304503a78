//! Vault configuration: `<vault>/.agent(s)/vault.yaml` and server-level settings
//! sourced from the environment. Follows the same `#[serde(default)]` shape the
//! rest of this crate's ancestry uses for its on-disk config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional per-vault overrides. Every field is defaulted so a vault with no
/// `vault.yaml` at all behaves exactly like one with an empty mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    pub version: u32,
    pub templates_folder: Option<String>,
    pub private_paths: Vec<String>,
    pub excluded_folders: Vec<String>,
    pub excluded_patterns: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            version: 1,
            templates_folder: None,
            private_paths: vec![],
            excluded_folders: vec![],
            excluded_patterns: vec![],
        }
    }
}

/// Default excluded folders and patterns applied in addition to whatever
/// `vault.yaml` configures (spec §6 "Default exclusions used by retrieval & analysis").
pub fn default_excluded_folders() -> Vec<&'static str> {
    vec![
        "00_Sistema",
        "ZZ_Plantillas",
        "04_Recursos/Obsidian",
        ".agent",
        ".agents",
        ".trash",
        ".git",
        ".obsidian",
        ".obsidianrag",
    ]
}

pub fn default_excluded_patterns() -> Vec<&'static str> {
    vec![
        r".*MOC\.md",
        r".*Home\.md",
        r".*Inbox\.md",
        r".*Panel.*\.md",
        r".*\.agent\.md",
        r"copilot-instructions\.md",
    ]
}

/// Locate `.agent` or `.agents` under the vault root, preferring `.agents` when
/// both exist (open question in spec.md §9 — the source varies across forks).
pub fn agent_dir_name(vault_root: &Path) -> &'static str {
    if vault_root.join(".agents").is_dir() {
        ".agents"
    } else {
        ".agent"
    }
}

pub fn agent_dir(vault_root: &Path) -> PathBuf {
    vault_root.join(agent_dir_name(vault_root))
}

/// Auto-detect the templates folder when `vault.yaml` doesn't name one: scan
/// the vault root (non-recursively) for a directory whose lowercased name
/// contains "template" or "plantilla".
pub fn detect_templates_folder(vault_root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(vault_root).ok()?;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains("template") || name.contains("plantilla") {
            return Some(entry.path());
        }
    }
    None
}

pub fn load_vault_config(vault_root: &Path) -> VaultConfig {
    let path = agent_dir(vault_root).join("vault.yaml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return VaultConfig::default();
    };
    serde_yaml::from_str(&text).unwrap_or_else(|e| {
        crate::debug_log!("[obsidianrag] vault.yaml parse error ({e}), using defaults");
        VaultConfig::default()
    })
}

/// Server-level settings, clamped to the ranges spec.md §6 specifies.
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub search_timeout_secs: u64,
    pub max_results: usize,
    pub cache_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            search_timeout_secs: 180,
            max_results: 20,
            cache_ttl_secs: 300,
        }
    }
}

fn clamp_env(var: &str, min: u64, max: u64, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self {
            search_timeout_secs: clamp_env("OBSIDIANRAG_SEARCH_TIMEOUT", 30, 600, 180),
            max_results: clamp_env("OBSIDIANRAG_MAX_RESULTS", 5, 100, 20) as usize,
            cache_ttl_secs: clamp_env("OBSIDIANRAG_CACHE_TTL", 60, 3600, 300),
        }
    }
}

/// Log levels accepted by `LOG_LEVEL`, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").unwrap_or_default().to_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }
}

/// Resolve the vault root from `OBSIDIAN_VAULT_PATH`, failing closed with a
/// `config_error` when unset or not a directory.
pub fn resolve_vault_root() -> crate::errors::CoreResult<PathBuf> {
    let raw = std::env::var("OBSIDIAN_VAULT_PATH").map_err(|_| {
        crate::errors::CoreError::config_error("OBSIDIAN_VAULT_PATH is not set")
    })?;
    let path = PathBuf::from(raw);
    if !path.is_dir() {
        return Err(crate::errors::CoreError::config_error(format!(
            "OBSIDIAN_VAULT_PATH does not point to a directory: {}",
            path.display()
        )));
    }
    std::fs::canonicalize(&path).map_err(|e| {
        crate::errors::CoreError::config_error(format!("cannot canonicalize vault root: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_when_no_yaml() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_vault_config(tmp.path());
        assert_eq!(cfg, VaultConfig::default());
    }

    #[test]
    fn detects_templates_folder_by_substring() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("ZZ_Plantillas")).unwrap();
        let found = detect_templates_folder(tmp.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "ZZ_Plantillas");
    }

    #[test]
    fn agent_dir_prefers_agents_plural() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".agents")).unwrap();
        assert_eq!(agent_dir_name(tmp.path()), ".agents");
    }

    #[test]
    fn agent_dir_falls_back_to_singular() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(agent_dir_name(tmp.path()), ".agent");
    }
}
