//! Span and event field names shared across the workspace.
//!
//! Workflow and skill code logs with these names so that a subscriber (or an
//! OpenTelemetry backend) can correlate events from the same run.

/// Workflow instance id (UUID v7).
pub const WORKFLOW_ID: &str = "workflow_id";

/// Workflow type from the definition (e.g. "game", "chain").
pub const WORKFLOW_TYPE: &str = "workflow_type";

/// 1-based step ordinal within a workflow.
pub const STEP: &str = "step";

/// Registry id of the skill being run.
pub const SKILL_ID: &str = "skill_id";

/// 1-based attempt number inside the retry wrapper.
pub const ATTEMPT: &str = "attempt";

/// Detection confidence in `[0, 100]`.
pub const CONFIDENCE: &str = "confidence";

/// Machine-readable skill error code (e.g. "TIMEOUT").
pub const ERROR_CODE: &str = "error_code";

// --- Span names ---

pub const SPAN_WORKFLOW_RUN: &str = "workflow.run";
pub const SPAN_STEP_RUN: &str = "workflow.step";
pub const SPAN_SKILL_DISPATCH: &str = "skill.dispatch";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_distinct() {
        let mut names = vec![WORKFLOW_ID, WORKFLOW_TYPE, STEP, SKILL_ID, ATTEMPT, CONFIDENCE, ERROR_CODE];
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 7);
    }
}
