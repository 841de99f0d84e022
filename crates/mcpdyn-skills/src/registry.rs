//! Skills catalog over several directories
//!
//! Discovery reads frontmatter only; [`SkillsRegistry::load_skill`] reads the
//! full document on demand.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::skill::Skill;

/// All skills found in the configured directories
pub struct SkillsRegistry {
    skills: HashMap<String, Skill>,
    directories: Vec<PathBuf>,
}

/// Match quality for [`SkillsRegistry::search`], best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    ExactKeyword,
    Name,
    Keyword,
    Description,
}

impl SkillsRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            directories: Vec::new(),
        }
    }

    /// Add a directory whose subfolders are skills
    #[must_use]
    pub fn add_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directories.push(dir.into());
        self
    }

    /// Add a marketplace checkout: `root/skills` and every `root/plugins/*/skills`
    #[must_use]
    pub fn add_marketplace(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.directories.push(root.join("skills"));

        let plugins = root.join("plugins");
        match std::fs::read_dir(&plugins) {
            Ok(entries) => {
                let mut plugin_dirs: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .map(|p| p.join("skills"))
                    .collect();
                plugin_dirs.sort();
                self.directories.extend(plugin_dirs);
            }
            Err(e) => debug!("No plugins in {}: {}", plugins.display(), e),
        }
        self
    }

    /// Add `~/.mcpdyn/skills`
    #[must_use]
    pub fn with_personal_skills(self) -> Self {
        if let Some(home) = dirs::home_dir() {
            self.add_directory(home.join(".mcpdyn").join("skills"))
        } else {
            warn!("Could not find home directory for personal skills");
            self
        }
    }

    /// Add `./.mcpdyn/skills`
    #[must_use]
    pub fn with_project_skills(self) -> Self {
        self.add_directory(PathBuf::from(".mcpdyn/skills"))
    }

    /// Directories that will be scanned
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Scan every directory one level deep and read skill metadata
    ///
    /// Missing directories are skipped. When two directories hold a skill
    /// with the same name the first one wins.
    ///
    /// # Errors
    /// Fails when an existing directory cannot be listed
    pub fn discover(&mut self) -> Result<()> {
        info!(
            "Starting skills discovery in {} directories",
            self.directories.len()
        );

        let directories = self.directories.clone();
        for dir in &directories {
            if !dir.exists() {
                debug!("Skills directory does not exist: {}", dir.display());
                continue;
            }
            if !dir.is_dir() {
                warn!("Skills path is not a directory: {}", dir.display());
                continue;
            }
            self.scan_directory(dir)?;
        }

        info!("Discovered {} skills", self.skills.len());
        Ok(())
    }

    fn scan_directory(&mut self, dir: &Path) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }

            match Skill::metadata_from_dir(&path) {
                Ok(skill) => {
                    let name = skill.name().to_string();
                    if let Some(existing) = self.skills.get(&name) {
                        warn!(
                            "Skill '{}' at {} shadowed by {}",
                            name,
                            path.display(),
                            existing.path.display()
                        );
                        continue;
                    }
                    debug!("Discovered skill: {} at {}", name, path.display());
                    self.skills.insert(name, skill);
                }
                Err(e) => debug!("Skipping {}: {:#}", path.display(), e),
            }
        }
        Ok(())
    }

    /// Skill by name, possibly without content
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// Load a skill's full document
    ///
    /// # Errors
    /// Fails for unknown skills or unreadable files
    pub fn load_skill(&mut self, name: &str) -> Result<&Skill> {
        let skill = self
            .skills
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("Skill '{}' not found", name))?;
        skill.load_content()?;
        Ok(skill)
    }

    /// Number of skills
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether no skills were found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills sorted by name
    #[must_use]
    pub fn sorted(&self) -> Vec<&Skill> {
        let mut skills: Vec<_> = self.skills.values().collect();
        skills.sort_by(|a, b| a.name().cmp(b.name()));
        skills
    }

    /// Case-insensitive search over names, keywords and descriptions
    ///
    /// Ranked by exact keyword, then name, then partial keyword, then
    /// description; ties by name.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Skill> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.sorted();
        }

        let mut hits: Vec<(MatchRank, &Skill)> = self
            .skills
            .values()
            .filter_map(|skill| rank(skill, &query).map(|r| (r, skill)))
            .collect();
        hits.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name().cmp(b.name())));
        hits.into_iter().map(|(_, skill)| skill).collect()
    }

    /// Catalog listing, one `- name (vX): description` line per skill
    #[must_use]
    pub fn render_catalog(&self) -> String {
        if self.skills.is_empty() {
            return "No skills available".to_string();
        }
        self.sorted()
            .iter()
            .map(|s| s.to_summary())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn rank(skill: &Skill, query: &str) -> Option<MatchRank> {
    let keywords: Vec<String> = skill
        .metadata
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .collect();

    if keywords.iter().any(|k| k == query) {
        Some(MatchRank::ExactKeyword)
    } else if skill.name().to_lowercase().contains(query) {
        Some(MatchRank::Name)
    } else if keywords.iter().any(|k| k.contains(query)) {
        Some(MatchRank::Keyword)
    } else if skill.description().to_lowercase().contains(query) {
        Some(MatchRank::Description)
    } else {
        None
    }
}

impl Default for SkillsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
