//! Front-matter Codec (spec §4.B): split/build the leading YAML block, merge
//! metadata deterministically on create, touch `updated:` on edit.

use regex::Regex;
use serde_yaml::Value as YamlValue;
use std::sync::OnceLock;

pub const RESERVED_KEYS: [&str; 5] = ["title", "tags", "created", "updated", "agente_creador"];

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A---\n(.*?)\n---\n?").unwrap())
}

/// An ordered front-matter mapping. `serde_yaml::Mapping` already preserves
/// insertion order, so it is used directly rather than re-inventing one.
pub type FrontMatter = serde_yaml::Mapping;

/// Split `text` into `(front_matter, body)`. On any parse failure, or if the
/// matched block doesn't parse to a mapping, returns an empty map and the
/// original text untouched (spec: "return `({}, original_text)`").
pub fn split(text: &str) -> (FrontMatter, String) {
    let Some(caps) = frontmatter_re().captures(text) else {
        return (FrontMatter::new(), text.to_string());
    };
    let yaml_block = &caps[1];
    let parsed: Result<YamlValue, _> = serde_yaml::from_str(yaml_block);
    match parsed {
        Ok(YamlValue::Mapping(map)) => {
            let matched_len = caps.get(0).unwrap().end();
            let mut rest = &text[matched_len..];
            // Trim exactly one leading blank line, per spec.
            if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }
            (map, rest.to_string())
        }
        _ => (FrontMatter::new(), text.to_string()),
    }
}

/// Emit `---\n<yaml>\n---\n\n` from a mapping, preserving insertion order.
pub fn build(metadata: &FrontMatter) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let yaml = serde_yaml::to_string(&YamlValue::Mapping(metadata.clone()))
        .unwrap_or_default();
    format!("---\n{}---\n\n", yaml)
}

fn key(k: &str) -> YamlValue {
    YamlValue::String(k.to_string())
}

/// Normalize a tags value: comma-split strings are split/trimmed, each tag has
/// its leading `#` stripped. Already-list values pass each element through the
/// same per-tag cleanup.
pub fn normalize_tags(value: &YamlValue) -> Vec<String> {
    let raw: Vec<String> = match value {
        YamlValue::String(s) => s.split(',').map(|t| t.to_string()).collect(),
        YamlValue::Sequence(seq) => seq
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => vec![],
    };
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn tags_to_yaml(tags: &[String]) -> YamlValue {
    YamlValue::Sequence(tags.iter().map(|t| YamlValue::String(t.clone())).collect())
}

/// Build the front-matter for a newly created note.
///
/// Starts from `extra` (front-matter parsed out of caller-supplied body, if
/// any), then unconditionally overwrites `title` and `created`, unions tags
/// preserving order of first occurrence, and sets `agente_creador` only when
/// non-empty.
pub fn merge_on_create(
    title: &str,
    now_date: &str,
    explicit_tags: &[String],
    agent: Option<&str>,
    extra: FrontMatter,
) -> FrontMatter {
    let mut merged = extra;

    let mut tags: Vec<String> = merged
        .get(&key("tags"))
        .map(normalize_tags)
        .unwrap_or_default();
    for t in explicit_tags {
        let t = t.trim().trim_start_matches('#').trim().to_string();
        if !t.is_empty() && !tags.contains(&t) {
            tags.push(t);
        }
    }
    if !tags.is_empty() {
        merged.insert(key("tags"), tags_to_yaml(&tags));
    }

    merged.insert(key("title"), YamlValue::String(title.to_string()));
    merged.insert(key("created"), YamlValue::String(now_date.to_string()));

    if let Some(agent) = agent {
        if !agent.is_empty() {
            merged.insert(key("agente_creador"), YamlValue::String(agent.to_string()));
        }
    }

    // created/title must lead for readability; rebuild in canonical order
    // followed by whatever else the caller supplied.
    let mut ordered = FrontMatter::new();
    for k in ["title", "created", "tags", "agente_creador"] {
        if let Some(v) = merged.remove(&key(k)) {
            ordered.insert(key(k), v);
        }
    }
    for (k, v) in merged {
        ordered.insert(k, v);
    }
    ordered
}

/// Replace (or insert) `updated:` with `now_date`. Operates on raw text so it
/// can be applied even when the caller passes whole-file content rather than
/// a parsed mapping, matching the spec's text-level description.
pub fn touch_updated_on_edit(text: &str, now_date: &str) -> String {
    if frontmatter_re().find(text).is_none() {
        return text.to_string();
    }
    let (mut fm, body) = split(text);
    fm.insert(key("updated"), YamlValue::String(now_date.to_string()));
    // created must stay put if present; insertion order already preserves it
    // since `insert` on an existing key doesn't move it, and `updated` is a
    // new key appended at the end (or kept in place if pre-existing).
    format!("{}{}", build(&fm), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_roundtrip_preserves_body() {
        let text = "---\ntitle: Hello\ntags: a, b\n---\n\nBody text.\n";
        let (fm, body) = split(text);
        assert_eq!(fm.get(&key("title")).unwrap().as_str(), Some("Hello"));
        assert_eq!(body, "Body text.\n");
        let rebuilt = format!("{}{}", build(&fm), body);
        // Up to whitespace normalization of the YAML block (spec property 5).
        assert!(rebuilt.contains("title: Hello"));
        assert!(rebuilt.ends_with("Body text.\n"));
    }

    #[test]
    fn split_with_no_frontmatter_returns_original() {
        let text = "Just a plain note.\n";
        let (fm, body) = split(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn split_with_malformed_yaml_falls_back() {
        let text = "---\n: : not yaml : :\n---\nBody\n";
        let (fm, body) = split(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn normalize_tags_strips_hash_and_trims() {
        let v = YamlValue::String(" #rust, python ,  #ai".to_string());
        assert_eq!(normalize_tags(&v), vec!["rust", "python", "ai"]);
    }

    #[test]
    fn merge_on_create_unions_tags_in_order() {
        let mut extra = FrontMatter::new();
        extra.insert(key("tags"), YamlValue::String("python".to_string()));
        let merged = merge_on_create(
            "Title",
            "2024-06-03",
            &["ai".to_string(), "python".to_string()],
            None,
            extra,
        );
        let tags = normalize_tags(merged.get(&key("tags")).unwrap());
        assert_eq!(tags, vec!["python", "ai"]);
        assert_eq!(merged.get(&key("created")).unwrap().as_str(), Some("2024-06-03"));
    }

    #[test]
    fn touch_updated_inserts_new_key() {
        let text = "---\ncreated: 2024-01-01\n---\n\nBody\n";
        let updated = touch_updated_on_edit(text, "2024-06-03");
        assert!(updated.contains("updated: 2024-06-03"));
        assert!(updated.contains("created: 2024-01-01"));
        assert!(updated.ends_with("Body\n"));
    }

    #[test]
    fn touch_updated_replaces_existing_key() {
        let text = "---\ncreated: 2024-01-01\nupdated: 2024-01-02\n---\n\nBody\n";
        let updated = touch_updated_on_edit(text, "2024-06-03");
        assert!(updated.contains("updated: 2024-06-03"));
        assert!(!updated.contains("2024-01-02"));
    }

    #[test]
    fn touch_updated_noop_without_frontmatter() {
        let text = "No front matter here.\n";
        assert_eq!(touch_updated_on_edit(text, "2024-06-03"), text);
    }
}
