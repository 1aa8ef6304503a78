//! Document Loader & Splitter (spec §4.E). Reads vault notes into `Document`s
//! with flattened front-matter metadata and extracted wikilinks/captions,
//! then chunks each into overlapping windows with a recursive character
//! splitter grounded in the `RecursiveCharacterTextSplitter` shape used by
//! `load_documents_from_paths`/`get_text_splitter` in the system this crate's
//! retrieval core is patterned on — there is no Rust crate equivalent in the
//! dependency stack, so it's hand-rolled here exactly like the rest of this
//! crate hand-rolls its matching/search primitives rather than reaching for a
//! heavyweight NLP dependency.

use crate::frontmatter;
use crate::scanner::{scan_vault, VaultScanOptions};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const CHUNK_SIZE: usize = 1500;
pub const CHUNK_OVERLAP: usize = 300;
const SEPARATORS: [&str; 8] = ["#", "##", "###", "####", "\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    pub page_content: String,
    /// Flattened metadata: every front-matter scalar/list as a string, plus
    /// `links` (comma-joined wikilink targets, alias/anchor stripped).
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub source: PathBuf,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[(.*?)\]\]").unwrap())
}

fn embed_caption_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[\[([^|\]]+)\|([^\]]+)\]\]").unwrap())
}

fn md_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]+)\]\([^)]+\)").unwrap())
}

/// Strip a trailing `|alias` and `#anchor` from a wikilink target, so
/// `[[Note#Section|shown text]]` normalizes to `Note` — resolves the aliasing
/// open question in spec.md §9.
pub fn normalize_wikilink_target(raw: &str) -> String {
    let without_alias = raw.split('|').next().unwrap_or(raw);
    let without_anchor = without_alias.split('#').next().unwrap_or(without_alias);
    without_anchor.trim().to_string()
}

/// Extract deduplicated, order-preserving wikilink targets from `text`.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for caps in wikilink_re().captures_iter(text) {
        let target = normalize_wikilink_target(&caps[1]);
        if !target.is_empty() && seen.insert(target.clone()) {
            out.push(target);
        }
    }
    out
}

/// Append non-empty image captions as paragraphs so embedded images become
/// searchable, per spec §4.E.
fn append_image_captions(content: &str) -> String {
    let mut extra = Vec::new();
    for caps in embed_caption_re().captures_iter(content) {
        let caption = caps[2].trim();
        if !caption.is_empty() {
            extra.push(caption.to_string());
        }
    }
    for caps in md_image_re().captures_iter(content) {
        let alt = caps[1].trim();
        if !alt.is_empty() {
            extra.push(alt.to_string());
        }
    }
    if extra.is_empty() {
        return content.to_string();
    }
    format!("{content}\n\n{}", extra.join("\n\n"))
}

fn flatten_frontmatter(fm: &frontmatter::FrontMatter) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in fm {
        let Some(key) = k.as_str() else { continue };
        let value = match v {
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.to_string()).or_else(|| i.as_i64().map(|n| n.to_string())))
                .collect::<Vec<_>>()
                .join(","),
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => String::new(),
            other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
        };
        out.insert(key.to_string(), value);
    }
    out
}

/// Load every eligible vault file into a `Document` (spec §4.E). Empty files
/// are dropped.
pub fn load_documents(opts: &VaultScanOptions) -> std::io::Result<Vec<Document>> {
    let mut docs = Vec::new();
    for file in scan_vault(opts)? {
        let text = match std::fs::read_to_string(&file.abs_path) {
            Ok(t) => t,
            Err(_) => continue, // not valid UTF-8; skip per spec
        };
        if text.is_empty() {
            continue;
        }

        let (fm, body) = frontmatter::split(&text);
        let mut metadata = flatten_frontmatter(&fm);
        metadata.insert("source".to_string(), file.abs_path.to_string_lossy().to_string());
        metadata.insert("links".to_string(), extract_links(&text).join(","));

        docs.push(Document {
            source: file.abs_path,
            page_content: append_image_captions(&body),
            metadata,
        });
    }
    Ok(docs)
}

/// Recursive character splitter: try each separator in order, keep
/// recursively splitting oversized pieces on the next separator, then
/// reassemble piece-by-piece into windows of `CHUNK_SIZE` with `CHUNK_OVERLAP`
/// carried from the tail of the previous window.
fn split_text(text: &str) -> Vec<String> {
    let pieces = recursive_split(text, 0);
    merge_pieces(pieces)
}

fn recursive_split(text: &str, sep_idx: usize) -> Vec<String> {
    if text.len() <= CHUNK_SIZE || sep_idx >= SEPARATORS.len() {
        return vec![text.to_string()];
    }
    let sep = SEPARATORS[sep_idx];
    let raw_pieces: Vec<&str> = if sep.is_empty() {
        text.split("").filter(|s| !s.is_empty()).collect()
    } else {
        text.split(sep).collect()
    };

    let mut out = Vec::new();
    for (i, piece) in raw_pieces.iter().enumerate() {
        let with_sep = if i + 1 < raw_pieces.len() && !sep.is_empty() {
            format!("{piece}{sep}")
        } else {
            piece.to_string()
        };
        if with_sep.is_empty() {
            continue;
        }
        if with_sep.len() > CHUNK_SIZE {
            out.extend(recursive_split(&with_sep, sep_idx + 1));
        } else {
            out.push(with_sep);
        }
    }
    out
}

fn merge_pieces(pieces: Vec<String>) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > CHUNK_SIZE {
            windows.push(current.clone());
            // Carry the overlap tail into the next window.
            let tail_start = current.len().saturating_sub(CHUNK_OVERLAP);
            current = current[tail_start..].to_string();
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        windows.push(current);
    }
    if windows.is_empty() {
        windows.push(String::new());
    }
    windows
}

/// Split every document into chunks inheriting the parent's metadata.
pub fn split_documents(docs: &[Document]) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| {
            split_text(&doc.page_content)
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .map(|text| Chunk {
                    source: doc.source.clone(),
                    text,
                    metadata: doc.metadata.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
