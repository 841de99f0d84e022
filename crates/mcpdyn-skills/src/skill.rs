//! Skill documents and their frontmatter

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File every skill directory must contain
pub const SKILL_FILE: &str = "SKILL.md";

const MAX_NAME_LENGTH: usize = 64;
const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Frontmatter of a `SKILL.md`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SkillMetadata {
    /// Lowercase letters, digits and hyphens
    pub name: String,
    /// What the skill does and when to use it
    pub description: String,
    /// Optional version string
    #[serde(default)]
    pub version: Option<String>,
    /// Search keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// License identifier
    #[serde(default)]
    pub license: Option<String>,
}

/// A discovered skill
#[derive(Debug, Clone)]
pub struct Skill {
    /// Parsed frontmatter
    pub metadata: SkillMetadata,
    /// Skill directory
    pub path: PathBuf,
    /// Full `SKILL.md`, present once activated
    pub content: Option<String>,
}

impl Skill {
    /// Load a skill with its full content
    ///
    /// # Errors
    /// Fails when `SKILL.md` is missing, unreadable or has invalid frontmatter
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let (metadata, content) = read_skill(dir)?;
        Ok(Self {
            metadata,
            path: dir.to_path_buf(),
            content: Some(content),
        })
    }

    /// Load only the frontmatter
    ///
    /// # Errors
    /// Same as [`Skill::from_dir`]
    pub fn metadata_from_dir(dir: &Path) -> Result<Self> {
        let (metadata, _) = read_skill(dir)?;
        Ok(Self {
            metadata,
            path: dir.to_path_buf(),
            content: None,
        })
    }

    /// Read the full document if it is not loaded yet
    ///
    /// # Errors
    /// Fails when the file can no longer be read
    pub fn load_content(&mut self) -> Result<()> {
        if self.content.is_none() {
            let file = self.path.join(SKILL_FILE);
            self.content = Some(
                fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?,
            );
        }
        Ok(())
    }

    /// Skill name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Skill description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    /// Document body without the frontmatter, once loaded
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        let content = self.content.as_deref()?;
        Some(split_frontmatter(content).map_or(content, |(_, body)| body))
    }

    /// Catalog line: `- name (vX): description`
    #[must_use]
    pub fn to_summary(&self) -> String {
        match &self.metadata.version {
            Some(version) => format!(
                "- {} (v{}): {}",
                self.metadata.name,
                version.trim_start_matches('v'),
                self.metadata.description
            ),
            None => format!("- {}: {}", self.metadata.name, self.metadata.description),
        }
    }
}

fn read_skill(dir: &Path) -> Result<(SkillMetadata, String)> {
    let file = dir.join(SKILL_FILE);
    if !file.is_file() {
        return Err(anyhow!("{} not found in {}", SKILL_FILE, dir.display()));
    }
    let content =
        fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let metadata = parse_frontmatter(&content)
        .with_context(|| format!("Failed to parse skill from {}", file.display()))?;
    validate_metadata(&metadata)?;
    Ok((metadata, content))
}

fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let re = Regex::new(r"^---\s*\r?\n([\s\S]*?)\r?\n---\s*(?:\r?\n([\s\S]*))?$").ok()?;
    let captures = re.captures(content)?;
    let yaml = captures.get(1)?.as_str();
    let body = captures.get(2).map_or("", |m| m.as_str());
    Some((yaml, body))
}

fn parse_frontmatter(content: &str) -> Result<SkillMetadata> {
    let (yaml, _) =
        split_frontmatter(content).ok_or_else(|| anyhow!("No valid YAML frontmatter found"))?;
    serde_yaml::from_str(yaml).context("Failed to parse YAML frontmatter")
}

fn validate_metadata(metadata: &SkillMetadata) -> Result<()> {
    if metadata.name.is_empty() {
        return Err(anyhow!("Skill name cannot be empty"));
    }
    if metadata.name.len() > MAX_NAME_LENGTH {
        warn!(
            "Skill name '{}' is longer than {} characters",
            metadata.name, MAX_NAME_LENGTH
        );
    }

    let name_re = Regex::new(r"^[a-z0-9-]+$")
        .map_err(|e| anyhow!("Failed to compile name validation regex: {}", e))?;
    if !name_re.is_match(&metadata.name) {
        return Err(anyhow!(
            "Skill name '{}' must contain only lowercase letters, numbers, and hyphens",
            metadata.name
        ));
    }

    if metadata.description.trim().is_empty() {
        return Err(anyhow!("Skill '{}' has an empty description", metadata.name));
    }
    if metadata.description.len() > MAX_DESCRIPTION_LENGTH {
        warn!(
            "Skill '{}' description is longer than {} characters",
            metadata.name, MAX_DESCRIPTION_LENGTH
        );
    }
    Ok(())
}
