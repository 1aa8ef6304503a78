//! Connection Analyzer (spec §4.I): an all-pairs cosine sweep over filtered
//! chunks reporting high-similarity notes that aren't already linked,
//! grounded in `suggest_connections` from the system this crate's retrieval
//! core is patterned on.

use crate::loader::{extract_links, normalize_wikilink_target};
use crate::vector_store::{cosine_similarity, VectorStore};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ConnectionSuggestion {
    pub note_a: String,
    pub note_b: String,
    pub similarity: f32,
    pub folder_a: String,
    pub folder_b: String,
    pub words_a: usize,
    pub words_b: usize,
    pub section_a: String,
    pub section_b: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub threshold: f32,
    pub limit: usize,
    pub include_folders: Vec<String>,
    pub exclude_mocs: bool,
    pub min_words: usize,
    pub deadline: Duration,
    pub excluded_folders: Vec<String>,
    pub excluded_patterns: Vec<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            threshold: 0.70,
            limit: 10,
            include_folders: vec![],
            exclude_mocs: true,
            min_words: 100,
            deadline: Duration::from_secs(180),
            excluded_folders: vec![],
            excluded_patterns: vec![],
        }
    }
}

fn section_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6} (.*)$").unwrap())
}

fn extract_section_header(text: &str) -> String {
    section_header_re()
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "(no heading)".to_string())
}

fn folder_of(source: &str) -> String {
    Path::new(source)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|s| !s.is_empty() && s != ".")
        .unwrap_or_default()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_excluded(rel_or_abs: &str, folders: &[String], patterns: &[String]) -> bool {
    let normalized = rel_or_abs.replace('\\', "/");
    if folders.iter().any(|f| normalized.contains(f.as_str())) {
        return true;
    }
    patterns.iter().any(|p| {
        Regex::new(p).map(|re| re.is_match(&normalized)).unwrap_or(false)
    })
}

/// Run the wall-clock-bounded sweep described in spec §4.I. On deadline
/// expiry, returns the single sentinel suggestion rather than a partial
/// result (spec: "do not raise", §7 `timeout`).
pub fn suggest_connections(store: &dyn VectorStore, opts: &ConnectionOptions) -> Vec<ConnectionSuggestion> {
    let start = Instant::now();
    let timeout_sentinel = || {
        vec![ConnectionSuggestion {
            note_a: String::new(),
            note_b: String::new(),
            similarity: 0.0,
            folder_a: String::new(),
            folder_b: String::new(),
            words_a: 0,
            words_b: 0,
            section_a: String::new(),
            section_b: String::new(),
            reason: "timeout".to_string(),
        }]
    };

    let all_chunks = store.dump();
    let filtered: Vec<_> = all_chunks
        .into_iter()
        .filter(|c| !c.embedding.is_empty())
        .filter(|c| word_count(&c.text) >= opts.min_words)
        .filter(|c| !is_excluded(&c.source, &opts.excluded_folders, &opts.excluded_patterns))
        .filter(|c| {
            if opts.include_folders.is_empty() {
                return true;
            }
            opts.include_folders.iter().any(|f| c.source.replace('\\', "/").starts_with(f.as_str()))
        })
        .filter(|c| {
            if !opts.exclude_mocs {
                return true;
            }
            !c.source.to_lowercase().ends_with("moc.md")
        })
        .collect();

    if start.elapsed() > opts.deadline {
        return timeout_sentinel();
    }

    let n = filtered.len();

    let mut suggestions = Vec::new();
    'outer: for i in 0..n {
        if start.elapsed() > opts.deadline {
            return timeout_sentinel();
        }
        for j in (i + 1)..n {
            let sim = cosine_similarity(&filtered[i].embedding, &filtered[j].embedding);
            if sim < opts.threshold {
                continue;
            }
            let a = &filtered[i];
            let b = &filtered[j];
            if a.source == b.source {
                continue;
            }

            let stem_a = Path::new(&a.source).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let stem_b = Path::new(&b.source).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

            let links_a: Vec<String> = extract_links(&a.text).into_iter().map(|l| normalize_wikilink_target(&l)).collect();
            let links_b: Vec<String> = extract_links(&b.text).into_iter().map(|l| normalize_wikilink_target(&l)).collect();
            // a.metadata["links"] is the authoritative comma-joined list from the whole note,
            // not just this chunk; prefer it when present.
            let note_links_a: Vec<String> = a.metadata.get("links").map(|s| s.split(',').map(|x| x.trim().to_string()).collect()).unwrap_or(links_a);
            let note_links_b: Vec<String> = b.metadata.get("links").map(|s| s.split(',').map(|x| x.trim().to_string()).collect()).unwrap_or(links_b);

            if note_links_a.iter().any(|l| l == &stem_b) || note_links_b.iter().any(|l| l == &stem_a) {
                continue;
            }

            if start.elapsed() > opts.deadline {
                break 'outer;
            }

            suggestions.push(ConnectionSuggestion {
                note_a: stem_a,
                note_b: stem_b,
                similarity: sim,
                folder_a: folder_of(&a.source),
                folder_b: folder_of(&b.source),
                words_a: word_count(&a.text),
                words_b: word_count(&b.text),
                section_a: extract_section_header(&a.text),
                section_b: extract_section_header(&b.text),
                reason: "unlinked high similarity".to_string(),
            });
        }
    }

    if start.elapsed() > opts.deadline {
        return timeout_sentinel();
    }

    suggestions.sort_by(|x, y| y.similarity.partial_cmp(&x.similarity).unwrap_or(std::cmp::Ordering::Equal));
    suggestions.truncate(opts.limit);
    suggestions
}
