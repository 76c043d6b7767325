//! Skill trait definition.
//!
//! A skill is a closed capability: it advertises [`SkillMetadata`], scores how
//! well it matches a request, executes against an [`ExecutionContext`], and may
//! validate its own output. Uses RPITIT for `execute`; the registry stores
//! skills behind [`BoxSkill`](super::box_skill::BoxSkill) for dynamic dispatch.

use serde_json::Value;

use skillweave_types::skill::{ExecutionContext, SkillError, SkillMetadata, SkillResult};

use super::scoring::keyword_confidence;

/// A unit of work the registry can dispatch to.
///
/// Implementations must be stateless across invocations; the registry owns
/// exactly one instance per id and may call it from several workflows at once.
pub trait Skill: Send + Sync {
    /// Immutable metadata (id, triggers, capabilities).
    fn metadata(&self) -> &SkillMetadata;

    /// Confidence in `[0, 100]` that this skill should handle `request`.
    ///
    /// Defaults to keyword scoring over `metadata().triggers`.
    fn can_handle(&self, request: &str, _context: &ExecutionContext) -> f64 {
        keyword_confidence(&self.metadata().triggers, request)
    }

    /// Run the skill once.
    ///
    /// Returning `Err` and returning `Ok` with `success = false` are treated
    /// the same by the execution wrapper: both count as a failed attempt.
    fn execute(
        &self,
        context: &ExecutionContext,
    ) -> impl std::future::Future<Output = Result<SkillResult, SkillError>> + Send;

    /// Check the output of an accepted attempt.
    ///
    /// Returns the list of problems found. The default accepts everything.
    fn validate_output(&self, _output: &Value) -> Result<(), Vec<String>> {
        Ok(())
    }
}
