//! Skill catalogue
//!
//! Skills are markdown instruction bundles found under `<workspace>/skills/`.
//! Two layouts are recognised:
//!
//! - directory skills: `skills/<name>/SKILL.md`, optionally shipping
//!   `scripts/` and `references/` next to it
//! - flat skills: `skills/<name>.md`
//!
//! A leading YAML frontmatter block may set `name` and `description`.
//! The active set lives behind an [`ArcSwap`], so a reload replaces it in one
//! step while prompt builders keep reading the snapshot they loaded.

use arc_swap::ArcSwap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Bodies up to this many characters are inlined into the system prompt.
pub const DEFAULT_INLINE_LIMIT: usize = 2000;

/// A loaded skill
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Markdown body without frontmatter
    pub body: String,
    /// The file the skill was read from
    pub file_path: PathBuf,
    /// Directory holding the skill and its auxiliary files
    pub skill_dir: PathBuf,
    pub has_scripts: bool,
    pub has_references: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

impl Skill {
    /// Parse skill text. `fallback_name` is used when the frontmatter has no name.
    pub fn parse(raw: &str, fallback_name: &str, file_path: &Path) -> Result<Self> {
        let (meta, body) = split_frontmatter(raw);
        let meta: Frontmatter = match meta {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml).map_err(|e| {
                AgentError::Skill(format!("{}: bad frontmatter: {e}", file_path.display()))
            })?,
            _ => Frontmatter::default(),
        };

        let name = meta
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_name.to_string());
        let description = meta
            .description
            .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        Ok(Self {
            name,
            description,
            body: body.trim().to_string(),
            file_path: file_path.to_path_buf(),
            skill_dir: file_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            has_scripts: false,
            has_references: false,
        })
    }

    /// Prompt section for this skill
    pub fn render(&self, inline_limit: usize) -> String {
        if self.body.chars().count() <= inline_limit {
            let mut out = format!("### Skill: {}", self.name);
            if !self.description.is_empty() {
                out.push_str(&format!(" ({})", self.description));
            }
            out.push('\n');
            out.push_str(&self.body);
            return out;
        }

        let mut out = format!("### Skill: {}", self.name);
        if !self.description.is_empty() {
            out.push('\n');
            out.push_str(&self.description);
        }
        out.push_str(&format!(
            "\n> Full instructions: {} (open it with read_file when needed)",
            self.file_path.display()
        ));
        if self.has_scripts {
            out.push_str(&format!("\n> Scripts: {}/scripts/", self.skill_dir.display()));
        }
        if self.has_references {
            out.push_str(&format!(
                "\n> References: {}/references/",
                self.skill_dir.display()
            ));
        }
        out
    }
}

/// Split `---\n<yaml>\n---\n<body>`; text without frontmatter is all body.
fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let normalized = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(rest) = normalized
        .strip_prefix("---\n")
        .or_else(|| normalized.strip_prefix("---\r\n"))
    else {
        return (None, normalized);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, normalized)
}

/// Process-wide skill set with atomic reload
pub struct SkillCatalog {
    root: PathBuf,
    skills: ArcSwap<Vec<Skill>>,
}

impl SkillCatalog {
    /// Empty catalogue rooted at `root` (nothing is read until `reload`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skills: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Create a catalogue and load it once
    pub async fn load(root: impl Into<PathBuf>) -> Self {
        let catalog = Self::new(root);
        catalog.reload().await;
        catalog
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-scan the skills directory and publish the new set. Returns the
    /// number of skills now active.
    pub async fn reload(&self) -> usize {
        let skills = scan(&self.root).await;
        let count = skills.len();
        for skill in &skills {
            tracing::debug!(
                skill = %skill.name,
                scripts = skill.has_scripts,
                references = skill.has_references,
                "Loaded skill"
            );
        }
        self.skills.store(Arc::new(skills));
        tracing::info!(root = %self.root.display(), count, "Skills loaded");
        count
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Vec<Skill>> {
        self.skills.load_full()
    }

    pub fn len(&self) -> usize {
        self.skills.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.load().is_empty()
    }

    /// Render the whole catalogue for the system prompt. Empty when no
    /// skills are loaded.
    pub fn render_prompt(&self, inline_limit: usize) -> String {
        let skills = self.snapshot();
        if skills.is_empty() {
            return String::new();
        }

        let sections: Vec<String> = skills.iter().map(|s| s.render(inline_limit)).collect();
        format!(
            "## Loaded skills\n\
             These are specialised skills you have learned; apply them when relevant.\n\
             For skills marked \"Full instructions\", read the file with read_file when you need the details.\n\n{}",
            sections.join("\n\n")
        )
    }
}

async fn scan(root: &Path) -> Vec<Skill> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::info!(root = %root.display(), error = %e, "Skills directory not readable, skipping");
            return Vec::new();
        }
    };

    let mut skills = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read skills directory entry");
                break;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };

        if file_type.is_dir() {
            let skill_md = path.join("SKILL.md");
            if !tokio::fs::try_exists(&skill_md).await.unwrap_or(false) {
                continue;
            }
            let fallback = entry.file_name().to_string_lossy().into_owned();
            if let Some(mut skill) = read_skill(&skill_md, &fallback).await {
                skill.skill_dir.clone_from(&path);
                skill.has_scripts = tokio::fs::try_exists(path.join("scripts")).await.unwrap_or(false);
                skill.has_references = tokio::fs::try_exists(path.join("references"))
                    .await
                    .unwrap_or(false);
                skills.push(skill);
            }
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            let fallback = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(skill) = read_skill(&path, &fallback).await {
                skills.push(skill);
            }
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

async fn read_skill(path: &Path, fallback: &str) -> Option<Skill> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read skill");
            return None;
        }
    };
    match Skill::parse(&raw, fallback, path) {
        Ok(skill) => Some(skill),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping skill");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frontmatter() {
        let raw = "---\nname: weather\ndescription: |\n  Look up\n  forecasts\n---\n# Weather\nUse curl.\n";
        let skill = Skill::parse(raw, "fallback", Path::new("/s/weather/SKILL.md")).unwrap();
        assert_eq!(skill.name, "weather");
        assert_eq!(skill.description, "Look up forecasts");
        assert_eq!(skill.body, "# Weather\nUse curl.");
        assert_eq!(skill.skill_dir, PathBuf::from("/s/weather"));
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let skill = Skill::parse("Just text", "notes", Path::new("/s/notes.md")).unwrap();
        assert_eq!(skill.name, "notes");
        assert!(skill.description.is_empty());
        assert_eq!(skill.body, "Just text");
    }

    #[test]
    fn test_parse_rejects_bad_yaml() {
        let raw = "---\nname: [unclosed\n---\nbody";
        assert!(Skill::parse(raw, "x", Path::new("/s/x.md")).is_err());
    }

    #[test]
    fn test_render_long_body_points_to_file() {
        let mut skill = Skill::parse("short", "tiny", Path::new("/s/tiny/SKILL.md")).unwrap();
        assert!(skill.render(DEFAULT_INLINE_LIMIT).contains("short"));

        skill.body = "x".repeat(DEFAULT_INLINE_LIMIT + 1);
        skill.has_scripts = true;
        let rendered = skill.render(DEFAULT_INLINE_LIMIT);
        assert!(!rendered.contains("xxxx"));
        assert!(rendered.contains("/s/tiny/SKILL.md"));
        assert!(rendered.contains("/s/tiny/scripts/"));
        assert!(!rendered.contains("references"));
    }

    #[tokio::test]
    async fn test_load_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("skills");
        std::fs::create_dir_all(root.join("weather/scripts")).unwrap();
        std::fs::write(
            root.join("weather/SKILL.md"),
            "---\nname: weather\ndescription: Forecasts\n---\nCall the API.",
        )
        .unwrap();
        std::fs::write(root.join("notes.md"), "Keep notes tidy.").unwrap();
        std::fs::write(root.join("readme.txt"), "ignored").unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();

        let catalog = SkillCatalog::load(&root).await;
        let skills = catalog.snapshot();
        assert_eq!(skills.len(), 2);
        let weather = skills.iter().find(|s| s.name == "weather").unwrap();
        assert!(weather.has_scripts);
        assert!(!weather.has_references);

        let prompt = catalog.render_prompt(DEFAULT_INLINE_LIMIT);
        assert!(prompt.contains("### Skill: weather (Forecasts)"));
        assert!(prompt.contains("Keep notes tidy."));

        std::fs::write(root.join("extra.md"), "More.").unwrap();
        assert_eq!(catalog.reload().await, 3);
        // The earlier snapshot is unaffected by the swap.
        assert_eq!(skills.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SkillCatalog::load(dir.path().join("nope")).await;
        assert!(catalog.is_empty());
        assert!(catalog.render_prompt(DEFAULT_INLINE_LIMIT).is_empty());
    }
}
