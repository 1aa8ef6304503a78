//! Vault walk used by the Tracker (§4.D) and Document Loader (§4.E).
//!
//! Adapted from this crate's ancestor `scanner.rs`, which walked a source
//! tree with `ignore::WalkBuilder` + a repomix-style `Override` noise list;
//! here the noise list is the vault's excluded folders/patterns instead of
//! build artifacts, and only `.md` files are ever yielded.

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct VaultFile {
    pub abs_path: PathBuf,
    pub rel_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VaultScanOptions {
    pub vault_root: PathBuf,
    pub excluded_folders: Vec<String>,
    pub excluded_patterns: Vec<String>,
}

/// Filenames whose lowercased stem/name contains any of these substrings are
/// skipped outright (spec §4.E), in addition to folder and pattern exclusion.
const SKIPPED_NAME_SUBSTRINGS: [&str; 3] = [".excalidraw.md", ".canvas", "untitled"];

fn build_overrides(vault_root: &Path, excluded_folders: &[String]) -> ignore::Result<Override> {
    let mut ob = OverrideBuilder::new(vault_root);
    for folder in excluded_folders {
        let folder = folder.trim().trim_matches('/');
        if folder.is_empty() {
            continue;
        }
        ob.add(&format!("!{folder}"))?;
        ob.add(&format!("!{folder}/**"))?;
        ob.add(&format!("!**/{folder}"))?;
        ob.add(&format!("!**/{folder}/**"))?;
    }
    ob.build()
}

fn name_is_skipped(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    SKIPPED_NAME_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

fn rel_path_matches_any(rel: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| {
        regex::Regex::new(p)
            .map(|re| re.is_match(rel))
            .unwrap_or(false)
    })
}

/// Walk the vault, yielding every `.md` file not excluded by folder name,
/// filename substring, or configured path pattern.
pub fn scan_vault(opts: &VaultScanOptions) -> std::io::Result<Vec<VaultFile>> {
    let overrides = build_overrides(&opts.vault_root, &opts.excluded_folders)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let walker = WalkBuilder::new(&opts.vault_root)
        .hidden(false)
        .overrides(overrides)
        .build();

    let mut out = Vec::new();
    for entry in walker {
        let Ok(dent) = entry else { continue };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let abs_path = dent.into_path();
        if abs_path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let file_name = abs_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name_is_skipped(file_name) {
            continue;
        }
        let rel_path = match abs_path.strip_prefix(&opts.vault_root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };
        let rel_str = rel_path.to_string_lossy().replace('\\', "/");
        if rel_path_matches_any(&rel_str, &opts.excluded_patterns) {
            continue;
        }
        out.push(VaultFile { abs_path, rel_path });
    }

    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}
