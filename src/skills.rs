//! Skill definitions: `<vault>/.agent(s)/skills/<name>/SKILL.md`, front-matter
//! parsed via the Front-matter Codec. Grounded in the `load_config`
//! read-through-with-defaults pattern: a malformed or missing file degrades to
//! an absent skill rather than a panic.

use crate::config::agent_dir;
use crate::errors::{CoreError, CoreResult};
use crate::frontmatter::split;
use serde_yaml::Value as YamlValue;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub tools: Option<Vec<String>>,
}

fn str_field(fm: &serde_yaml::Mapping, key: &str) -> Option<String> {
    fm.get(&YamlValue::String(key.to_string()))?.as_str().map(|s| s.to_string())
}

fn list_field(fm: &serde_yaml::Mapping, key: &str) -> Option<Vec<String>> {
    let value = fm.get(&YamlValue::String(key.to_string()))?;
    match value {
        YamlValue::Sequence(seq) => Some(seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
        YamlValue::String(s) => Some(s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()),
        _ => None,
    }
}

/// Parse a single `SKILL.md` file's front-matter into a `Skill`. A missing
/// `name` or `description` field, or malformed YAML, is a `validation` error
/// (spec §4.K: "malformed front-matter must surface as a `validation` error,
/// not a panic").
pub fn parse_skill_file(path: &Path) -> CoreResult<Skill> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CoreError::validation(format!("cannot read skill file {}: {e}", path.display()))
    })?;
    let (fm, _body) = split(&text);
    if fm.is_empty() {
        return Err(CoreError::validation(format!(
            "skill file has no front-matter: {}",
            path.display()
        )));
    }
    let name = str_field(&fm, "name")
        .ok_or_else(|| CoreError::validation(format!("skill file missing 'name': {}", path.display())))?;
    let description = str_field(&fm, "description")
        .ok_or_else(|| CoreError::validation(format!("skill file missing 'description': {}", path.display())))?;
    let tools = list_field(&fm, "tools");
    Ok(Skill { name, description, tools })
}

/// Load every `SKILL.md` under `<vault>/.agent(s)/skills/*/`. Individual
/// malformed skills are skipped (logged) rather than failing the whole load,
/// so one bad skill directory doesn't take every other skill down with it.
pub fn load_skills(vault_root: &Path) -> Vec<Skill> {
    let skills_dir = agent_dir(vault_root).join("skills");
    let Ok(entries) = std::fs::read_dir(&skills_dir) else {
        return vec![];
    };

    let mut skills = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let skill_file = entry.path().join("SKILL.md");
        if !skill_file.is_file() {
            continue;
        }
        match parse_skill_file(&skill_file) {
            Ok(skill) => skills.push(skill),
            Err(e) => crate::debug_log!("[obsidianrag] skipping malformed skill {}: {e}", skill_file.display()),
        }
    }
    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir.join(name)).unwrap();
        std::fs::write(dir.join(name).join("SKILL.md"), body).unwrap();
    }

    #[test]
    fn parses_valid_skill_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("SKILL.md");
        std::fs::write(&file, "---\nname: summarize\ndescription: Summarize a note\ntools: search, read\n---\n\nBody\n").unwrap();
        let skill = parse_skill_file(&file).unwrap();
        assert_eq!(skill.name, "summarize");
        assert_eq!(skill.tools, Some(vec!["search".to_string(), "read".to_string()]));
    }

    #[test]
    fn missing_frontmatter_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("SKILL.md");
        std::fs::write(&file, "no frontmatter here\n").unwrap();
        let err = parse_skill_file(&file).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Validation);
    }

    #[test]
    fn load_skills_skips_malformed_and_keeps_valid() {
        let tmp = TempDir::new().unwrap();
        let skills_dir = tmp.path().join(".agents").join("skills");
        write_skill(&skills_dir, "good", "---\nname: good\ndescription: ok\n---\n");
        write_skill(&skills_dir, "bad", "no frontmatter\n");
        let skills = load_skills(tmp.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "good");
    }
}
