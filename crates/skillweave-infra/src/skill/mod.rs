//! Skill infrastructure implementations.
//!
//! Manifest loading from the skills directory and the prompt-backed skill
//! that turns a manifest into a registered [`Skill`](skillweave_core::skill::Skill).

pub mod manifest;
pub mod prompt_skill;

pub use manifest::{OutputFormat, PromptSkillManifest, load_manifests_dir};
pub use prompt_skill::{PromptSkill, register_prompt_skills};
