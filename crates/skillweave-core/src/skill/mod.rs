//! Skill system: the `Skill` trait, its boxed form, keyword scoring, the
//! registry, and request dispatch.

pub mod box_skill;
pub mod chaining;
pub mod handler;
pub mod registry;
pub mod scoring;

pub use box_skill::BoxSkill;
pub use chaining::Dispatcher;
pub use handler::Skill;
pub use registry::{RegistryError, SkillRegistry};
