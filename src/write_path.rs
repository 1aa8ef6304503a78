//! Write Path (spec §4.L): the only component that mutates Notes on disk.
//! Every target path runs through the Path Policy first; every single-file
//! write lands via write-temp-then-rename, grounded in the same atomic-save
//! pattern the Tracker and Vector Store persistence use. Per-path locks
//! implement the spec §5 concurrency rule ("Writes ... serialize per-path:
//! hold a per-path exclusive lock for the read-modify-write window").

use crate::cache::NoteNameCache;
use crate::errors::{CoreError, CoreResult};
use crate::frontmatter::{self, merge_on_create};
use crate::security::{check_access, ForbiddenPatterns};
use crate::suggest::{keyword_folder_hint, suggest_folder};
use crate::template::{expand, CivilDate};
use crate::retriever::HybridRetriever;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Exclusive per-path locks keyed on the canonical path string. Distinct
/// paths progress in parallel; the same path serializes.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, std::sync::Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn guard(&self, path: &Path) -> std::sync::Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(path.to_path_buf()).or_insert_with(|| std::sync::Arc::new(Mutex::new(()))).clone()
    }
}

fn sanitize_filename(title: &str) -> String {
    let mut name: String = title
        .chars()
        .map(|c| if "/\\<>:\"|?*".contains(c) { '-' } else { c })
        .collect();
    name = name.trim().to_string();
    if name.is_empty() {
        name = "Untitled".to_string();
    }
    if !name.to_lowercase().ends_with(".md") {
        name.push_str(".md");
    }
    name
}

fn atomic_write(path: &Path, content: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("md")
    ));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Locate a note by stem (case-insensitive) anywhere under `vault_root`,
/// ignoring `.obsidianrag`/`.agent(s)`. The uncached vault walk behind
/// `resolve_cached`; call that (or `VaultContext::resolve_note`) instead of
/// this directly so repeated resolves hit the note-name cache.
pub fn resolve_note(vault_root: &Path, name: &str) -> CoreResult<PathBuf> {
    let target_stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| name.to_lowercase());

    let mut found: Option<PathBuf> = None;
    for entry in walkdir_files(vault_root) {
        let stem = entry.file_stem().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
        if stem == target_stem {
            found = Some(entry);
            break;
        }
    }
    found.ok_or_else(|| CoreError::not_found(format!("no note named '{name}'")))
}

/// Resolve `name` via the note-name cache (spec §4.L: "via the note-name
/// cache and vault walk"), falling back to a fresh `resolve_note` walk on a
/// cache miss or stale entry.
fn resolve_cached(vault_root: &Path, note_cache: &NoteNameCache, name: &str) -> CoreResult<PathBuf> {
    note_cache
        .lookup(name, |n| resolve_note(vault_root, n).ok())
        .ok_or_else(|| CoreError::not_found(format!("no note named '{name}'")))
}

fn walkdir_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".obsidianrag") || name == ".agent" || name == ".agents" || name == ".git" {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                out.push(path);
            }
        }
    }
    out
}

pub struct CreateArgs<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub folder: Option<&'a str>,
    pub tags_csv: &'a str,
    pub template_name: Option<&'a str>,
    pub agent: Option<&'a str>,
}

/// `create` (spec §4.L). Folder resolution order: caller value, then the
/// semantic Folder Suggester, then the keyword-map fallback, then the vault
/// root itself.
pub fn create(
    vault_root: &Path,
    forbidden: &ForbiddenPatterns,
    retriever: Option<&HybridRetriever>,
    templates_folder: Option<&Path>,
    args: CreateArgs,
) -> CoreResult<PathBuf> {
    let filename = sanitize_filename(args.title);

    let folder = match args.folder {
        Some(f) => f.to_string(),
        None => {
            let semantic = retriever.and_then(|r| {
                suggest_folder(r, args.body, 10, 1).into_iter().next().map(|c| c.folder)
            });
            semantic
                .or_else(|| keyword_folder_hint(args.body, vault_root))
                .unwrap_or_default()
        }
    };

    let rel_path = if folder.is_empty() { PathBuf::from(&filename) } else { Path::new(&folder).join(&filename) };
    let abs_path = check_access(vault_root, &rel_path, forbidden, "create_note")?;

    if abs_path.exists() {
        return Err(CoreError::conflict(format!("a note named '{filename}' already exists")));
    }

    let now = CivilDate::now_utc();
    let tags: Vec<String> = args.tags_csv.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();

    let content = if let Some(template_name) = args.template_name {
        let templates_dir = templates_folder.ok_or_else(|| CoreError::not_found("no templates folder configured"))?;
        let template_path = templates_dir.join(format!("{template_name}.md"));
        let template_text = std::fs::read_to_string(&template_path)
            .map_err(|_| CoreError::not_found(format!("template '{template_name}' not found")))?;

        let mut values = HashMap::new();
        values.insert("title".to_string(), args.title.to_string());
        values.insert("folder".to_string(), folder.clone());
        values.insert("tags".to_string(), tags.join(", "));
        if let Some(agent) = args.agent {
            values.insert("agent".to_string(), agent.to_string());
        }
        let expanded_template = expand(&template_text, &values, &now);

        let (_caller_fm, caller_body) = frontmatter::split(args.body);
        if caller_body.trim().is_empty() {
            expanded_template
        } else {
            format!("{}\n\n{}", expanded_template.trim_end(), caller_body.trim_start())
        }
    } else {
        let (caller_fm, caller_body) = frontmatter::split(args.body);
        let merged = merge_on_create(args.title, &now.ymd(), &tags, args.agent, caller_fm);
        let heading = if caller_body.trim_start().starts_with('#') {
            String::new()
        } else {
            format!("# {}\n\n", args.title)
        };
        format!("{}{}{}", frontmatter::build(&merged), heading, caller_body)
    };

    atomic_write(&abs_path, &content)?;
    Ok(abs_path)
}

/// `edit` (spec §4.L): resolve via the note-name cache, expand date
/// placeholders, touch `updated:`, write.
pub fn edit(
    vault_root: &Path,
    forbidden: &ForbiddenPatterns,
    locks: &PathLocks,
    note_cache: &NoteNameCache,
    name: &str,
    new_content: &str,
) -> CoreResult<()> {
    let resolved = resolve_cached(vault_root, note_cache, name)?;
    let abs = check_access(vault_root, &resolved, forbidden, "edit_note")?;
    let guard = locks.guard(&abs);
    let _lock = guard.lock().unwrap_or_else(|p| p.into_inner());

    let now = CivilDate::now_utc();
    let expanded = expand(new_content, &HashMap::new(), &now);
    let touched = frontmatter::touch_updated_on_edit(&expanded, &now.ymd());
    atomic_write(&abs, &touched)
}

/// `append` (spec §4.L): concatenate with a blank-line separator. When
/// `at_end` is `true`, `content` is added after the existing text; when
/// `false`, it's prepended before it (mirrors `al_final=False` in the
/// creation logic this is grounded on).
pub fn append(
    vault_root: &Path,
    forbidden: &ForbiddenPatterns,
    locks: &PathLocks,
    note_cache: &NoteNameCache,
    name: &str,
    content: &str,
    at_end: bool,
) -> CoreResult<()> {
    let resolved = resolve_cached(vault_root, note_cache, name)?;
    let abs = check_access(vault_root, &resolved, forbidden, "append_to_note")?;
    let guard = locks.guard(&abs);
    let _lock = guard.lock().unwrap_or_else(|p| p.into_inner());

    let existing = std::fs::read_to_string(&abs)?;
    let combined = if at_end {
        let separator = if existing.ends_with("\n\n") || existing.is_empty() { "" } else if existing.ends_with('\n') { "\n" } else { "\n\n" };
        format!("{existing}{separator}{content}")
    } else {
        let separator = if content.ends_with("\n\n") || existing.is_empty() { "" } else if content.ends_with('\n') { "\n" } else { "\n\n" };
        format!("{content}{separator}{existing}")
    };
    atomic_write(&abs, &combined)
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(#{1,6})\s+(.*)$").unwrap())
}

/// `append_to_section` (spec §4.L): insert before the next heading of
/// equal-or-shallower depth, or append a new `##` section when missing and
/// `create_if_missing`. No grounding source names this operation verbatim;
/// it follows the heading-scan idiom the Connection Analyzer already uses
/// for section extraction.
pub fn append_to_section(
    vault_root: &Path,
    forbidden: &ForbiddenPatterns,
    locks: &PathLocks,
    note_cache: &NoteNameCache,
    name: &str,
    section_title: &str,
    content: &str,
    create_if_missing: bool,
) -> CoreResult<()> {
    let resolved = resolve_cached(vault_root, note_cache, name)?;
    let abs = check_access(vault_root, &resolved, forbidden, "append_to_section")?;
    let guard = locks.guard(&abs);
    let _lock = guard.lock().unwrap_or_else(|p| p.into_inner());

    let existing = std::fs::read_to_string(&abs)?;
    let headings: Vec<(usize, usize, usize)> = heading_re()
        .captures_iter(&existing)
        .map(|c| {
            let m = c.get(0).unwrap();
            let depth = c[1].len();
            (m.start(), m.end(), depth)
        })
        .collect();

    let target_idx = headings.iter().position(|(start, end, _)| {
        heading_re().captures(&existing[*start..*end]).map(|c| c[2].trim().eq_ignore_ascii_case(section_title)).unwrap_or(false)
    });

    let updated = match target_idx {
        Some(idx) => {
            let (_, section_end, depth) = headings[idx];
            let next_boundary = headings[idx + 1..]
                .iter()
                .find(|(_, _, d)| *d <= depth)
                .map(|(start, _, _)| *start)
                .unwrap_or(existing.len());

            let mut out = String::new();
            out.push_str(&existing[..section_end]);
            out.push_str("\n\n");
            out.push_str(content.trim());
            out.push('\n');
            if next_boundary < existing.len() {
                out.push('\n');
            }
            out.push_str(&existing[next_boundary..]);
            out
        }
        None => {
            if !create_if_missing {
                return Err(CoreError::not_found(format!("section '{section_title}' not found")));
            }
            format!("{}\n\n## {section_title}\n\n{content}\n", existing.trim_end())
        }
    };

    atomic_write(&abs, &updated)
}

/// `move` (spec §4.L).
pub fn move_note(vault_root: &Path, forbidden: &ForbiddenPatterns, src: &Path, dst: &Path, create_parents: bool) -> CoreResult<PathBuf> {
    let src_abs = check_access(vault_root, src, forbidden, "move_note_src")?;
    let dst_abs = check_access(vault_root, dst, forbidden, "move_note_dst")?;

    if dst_abs.exists() {
        return Err(CoreError::conflict("destination already exists".to_string()));
    }
    if create_parents {
        if let Some(parent) = dst_abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::rename(&src_abs, &dst_abs)?;
    Ok(dst_abs)
}

/// `delete` (spec §4.L): requires explicit confirmation.
pub fn delete(vault_root: &Path, forbidden: &ForbiddenPatterns, note_cache: &NoteNameCache, name: &str, confirm: bool) -> CoreResult<()> {
    if !confirm {
        return Err(CoreError::validation("delete requires confirm=true".to_string()));
    }
    let resolved = resolve_cached(vault_root, note_cache, name)?;
    let abs = check_access(vault_root, &resolved, forbidden, "delete_note")?;
    std::fs::remove_file(&abs)?;
    Ok(())
}

pub struct ReplaceMatch {
    pub path: PathBuf,
    pub occurrences: usize,
}

/// `search_and_replace` (spec §4.L). Preview mode counts without writing;
/// otherwise each matching file is rewritten atomically.
pub fn search_and_replace(
    vault_root: &Path,
    forbidden: &ForbiddenPatterns,
    find: &str,
    replace: &str,
    folder: Option<&str>,
    preview: bool,
    limit: usize,
) -> CoreResult<Vec<ReplaceMatch>> {
    if find.is_empty() {
        return Err(CoreError::validation("find must be non-empty".to_string()));
    }

    let scan_root = match folder {
        Some(f) => check_access(vault_root, Path::new(f), forbidden, "search_and_replace")?,
        None => vault_root.to_path_buf(),
    };

    let mut results = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    for path in walkdir_files(&scan_root) {
        if results.len() >= limit {
            break;
        }
        if !seen.insert(path.clone()) {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        let occurrences = text.matches(find).count();
        if occurrences == 0 {
            continue;
        }
        if !preview {
            let replaced = text.replace(find, replace);
            atomic_write(&path, &replaced)?;
        }
        results.push(ReplaceMatch { path, occurrences });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn forbidden(vault: &Path) -> ForbiddenPatterns {
        ForbiddenPatterns::load(vault, &[]).unwrap()
    }

    fn note_cache() -> NoteNameCache {
        NoteNameCache::new(Duration::from_secs(60))
    }

    #[test]
    fn create_without_template_synthesizes_frontmatter_and_heading() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let path = create(
            tmp.path(),
            &f,
            None,
            None,
            CreateArgs { title: "My Note", body: "Some body text.", folder: Some(""), tags_csv: "ai, rust", template_name: None, agent: None },
        )
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("---\n"));
        assert!(content.contains("title: My Note"));
        assert!(content.contains("# My Note"));
        assert!(content.contains("Some body text."));
    }

    #[test]
    fn create_refuses_existing_target() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        std::fs::write(tmp.path().join("Dup.md"), "x").unwrap();
        let err = create(
            tmp.path(),
            &f,
            None,
            None,
            CreateArgs { title: "Dup", body: "x", folder: Some(""), tags_csv: "", template_name: None, agent: None },
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Conflict);
    }

    #[test]
    fn edit_touches_updated_and_preserves_created() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let locks = PathLocks::default();
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "---\ncreated: 2020-01-01\n---\n\nOld body\n").unwrap();
        edit(tmp.path(), &f, &locks, &cache, "note", "---\ncreated: 2020-01-01\n---\n\nNew body\n").unwrap();
        let content = std::fs::read_to_string(tmp.path().join("note.md")).unwrap();
        assert!(content.contains("created: 2020-01-01"));
        assert!(content.contains("updated:"));
        assert!(content.contains("New body"));
    }

    #[test]
    fn append_at_end_adds_content_after_existing() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let locks = PathLocks::default();
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "Old body\n").unwrap();
        append(tmp.path(), &f, &locks, &cache, "note", "New tail", true).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("note.md")).unwrap();
        assert!(content.find("Old body").unwrap() < content.find("New tail").unwrap());
    }

    #[test]
    fn append_not_at_end_prepends_content_before_existing() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let locks = PathLocks::default();
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "Old body\n").unwrap();
        append(tmp.path(), &f, &locks, &cache, "note", "New head", false).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("note.md")).unwrap();
        assert!(content.find("New head").unwrap() < content.find("Old body").unwrap());
    }

    #[test]
    fn append_to_section_inserts_before_next_heading() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let locks = PathLocks::default();
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "# Title\n\n## Section A\n\nexisting\n\n## Section B\n\nother\n").unwrap();
        append_to_section(tmp.path(), &f, &locks, &cache, "note", "Section A", "new line", true).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("note.md")).unwrap();
        let a_pos = content.find("## Section A").unwrap();
        let b_pos = content.find("## Section B").unwrap();
        let new_pos = content.find("new line").unwrap();
        assert!(a_pos < new_pos && new_pos < b_pos);
    }

    #[test]
    fn append_to_section_creates_when_missing() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let locks = PathLocks::default();
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "# Title\n\nbody\n").unwrap();
        append_to_section(tmp.path(), &f, &locks, &cache, "note", "New Section", "content", true).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("note.md")).unwrap();
        assert!(content.contains("## New Section"));
        assert!(content.contains("content"));
    }

    #[test]
    fn delete_requires_confirm() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        let cache = note_cache();
        std::fs::write(tmp.path().join("note.md"), "x").unwrap();
        let err = delete(tmp.path(), &f, &cache, "note", false).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Validation);
        assert!(tmp.path().join("note.md").exists());
    }

    #[test]
    fn search_and_replace_preview_does_not_write() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        std::fs::write(tmp.path().join("a.md"), "hello world hello").unwrap();
        let results = search_and_replace(tmp.path(), &f, "hello", "hi", None, true, 100).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].occurrences, 2);
        let content = std::fs::read_to_string(tmp.path().join("a.md")).unwrap();
        assert_eq!(content, "hello world hello");
    }

    #[test]
    fn search_and_replace_writes_when_not_preview() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        std::fs::write(tmp.path().join("a.md"), "hello world").unwrap();
        search_and_replace(tmp.path(), &f, "hello", "hi", None, false, 100).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("a.md")).unwrap();
        assert_eq!(content, "hi world");
    }

    #[test]
    fn move_refuses_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let f = forbidden(tmp.path());
        std::fs::write(tmp.path().join("src.md"), "x").unwrap();
        std::fs::write(tmp.path().join("dst.md"), "y").unwrap();
        let err = move_note(tmp.path(), &f, Path::new("src.md"), Path::new("dst.md"), true).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Conflict);
    }
}
