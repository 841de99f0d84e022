//! `mcpdyn` skills catalog
//!
//! Skill documents are folders with a `SKILL.md` file carrying YAML
//! frontmatter. They are loaded in two phases:
//!
//! - Discovery: at startup only the frontmatter (name, description, version,
//!   keywords, license) is read from each `SKILL.md`
//! - Activation: the full document is read when a skill is requested
//!
//! Skills come from plain directories or from marketplace checkouts, where
//! they live under `skills/` and `plugins/*/skills/`.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod registry;
pub mod skill;

pub use registry::SkillsRegistry;
pub use skill::{Skill, SkillMetadata};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Skill, SkillMetadata, SkillsRegistry};
}
