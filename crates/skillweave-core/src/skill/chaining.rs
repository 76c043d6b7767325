//! Request dispatch: run the auto-selected skill, or fall back to a chain.
//!
//! Chaining is sequential composition. Each skill in the chain sees the
//! outputs of the skills before it through
//! [`ExecutionContext::previous_outputs`]; the context is derived afresh per
//! link and never mutated in place.

use std::sync::Arc;

use serde_json::json;

use skillweave_types::config::DetectionConfig;
use skillweave_types::skill::{
    DetectedSkill, ExecutionContext, SkillError, SkillErrorCode, SkillResult,
};

use crate::workflow::retry::{RetryHandler, RetryPolicy};

use super::registry::SkillRegistry;

/// Routes free-text requests to skills through the execution wrapper.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SkillRegistry>,
    detection: DetectionConfig,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<SkillRegistry>, detection: DetectionConfig, retry: RetryPolicy) -> Self {
        Self {
            registry,
            detection,
            retry,
        }
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    /// Handle `context.request`.
    ///
    /// 1. An auto-selected top candidate runs alone.
    /// 2. Otherwise the ranked chain runs in order.
    /// 3. With neither, a `NO_SKILL_MATCHED` failure lists the suggestions.
    pub async fn handle(&self, context: &ExecutionContext) -> SkillResult {
        let request = context.request.as_str();
        let candidates = self.registry.detect(request, context, &self.detection);

        if let Some(top) = candidates.first().filter(|c| c.auto_select) {
            tracing::info!(
                skill_id = %top.skill_id,
                confidence = top.confidence,
                "auto-selected skill"
            );
            let suggested = suggestions_after(&candidates, 1);
            return self
                .run_single(&top.skill_id, context)
                .await
                .with_confidence(top.confidence)
                .with_suggested_next(suggested);
        }

        let chain = self.registry.chain(
            request,
            context,
            &self.detection,
            self.detection.max_chain,
        );
        if !chain.is_empty() {
            tracing::info!(chain = ?chain, "no auto-selected skill, running chain");
            let confidence = candidates.first().map(|c| c.confidence);
            let suggested = suggestions_after(&candidates, chain.len());
            let mut result = self.run_chain(&chain, context).await;
            if let Some(confidence) = confidence {
                result = result.with_confidence(confidence);
            }
            return result.with_suggested_next(suggested);
        }

        tracing::info!(
            suggestions = candidates.len(),
            "no skill matched request"
        );
        let suggestions: Vec<String> = candidates.iter().map(|c| c.skill_id.clone()).collect();
        SkillResult::failure(
            SkillError::new(
                SkillErrorCode::NoSkillMatched,
                "no skill is confident enough to handle this request",
            )
            .with_details(json!({ "suggestions": candidates })),
        )
        .with_suggested_next(suggestions)
    }

    /// Run one registered skill through the execution wrapper.
    pub async fn run_single(&self, skill_id: &str, context: &ExecutionContext) -> SkillResult {
        match self.registry.get(skill_id) {
            Some(skill) => RetryHandler::execute_with_retry(skill, context, &self.retry).await,
            None => SkillResult::failure(SkillError::new(
                SkillErrorCode::SkillNotFound,
                format!("skill '{skill_id}' is not registered"),
            )),
        }
    }

    /// Run `chain` in order, layering each output into the next context.
    ///
    /// Stops at the first failure; the error message names the failing
    /// position and skill. The final result carries the last output.
    pub async fn run_chain(&self, chain: &[String], context: &ExecutionContext) -> SkillResult {
        if chain.is_empty() {
            return SkillResult::failure(SkillError::new(
                SkillErrorCode::InvalidInput,
                "skill chain must contain at least one skill",
            ));
        }

        let mut current = context.clone();
        let mut total_ms: u64 = 0;
        let mut last: Option<SkillResult> = None;

        for (position, skill_id) in chain.iter().enumerate() {
            let mut result = self.run_single(skill_id, &current).await;
            total_ms = total_ms.saturating_add(result.metadata.duration_ms);

            if !result.success {
                let cause = result.failure_summary();
                let code = result
                    .error
                    .as_ref()
                    .map(|e| e.code)
                    .unwrap_or(SkillErrorCode::ExecutionFailed);
                tracing::warn!(position, skill_id = %skill_id, "skill chain failed");
                result.error = Some(
                    SkillError::new(
                        code,
                        format!("skill chain failed at position {position} (skill '{skill_id}'): {cause}"),
                    )
                    .with_details(json!({ "position": position, "skill_id": skill_id })),
                );
                result.metadata.duration_ms = total_ms;
                return result;
            }

            current = current.with_previous_output(skill_id, result.output.clone());
            last = Some(result);
        }

        let mut result = last.unwrap_or_else(|| SkillResult::success(json!(null), ""));
        result.metadata.duration_ms = total_ms;
        result
    }
}

fn suggestions_after(candidates: &[DetectedSkill], skip: usize) -> Vec<String> {
    candidates
        .iter()
        .skip(skip)
        .map(|c| c.skill_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::Value;
    use skillweave_types::skill::SkillMetadata;

    use crate::skill::handler::Skill;

    /// Appends its id to whatever the previous skills produced.
    struct Appender {
        meta: SkillMetadata,
        confidence: f64,
        fail: bool,
    }

    impl Skill for Appender {
        fn metadata(&self) -> &SkillMetadata {
            &self.meta
        }

        fn can_handle(&self, _request: &str, _context: &ExecutionContext) -> f64 {
            self.confidence
        }

        async fn execute(&self, context: &ExecutionContext) -> Result<SkillResult, SkillError> {
            if self.fail {
                return Err(SkillError::execution("skill execution error"));
            }
            let trail = context
                .previous_outputs
                .values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let seen = context.previous_outputs.len();
            Ok(SkillResult::success(
                json!(format!("{}[{seen}:{trail}]", self.meta.id)),
                "appended",
            ))
        }
    }

    fn appender(id: &str, confidence: f64) -> Appender {
        Appender {
            meta: SkillMetadata::new(id, id),
            confidence,
            fail: false,
        }
    }

    fn dispatcher(skills: Vec<Appender>) -> Dispatcher {
        let mut registry = SkillRegistry::new();
        for skill in skills {
            registry.register(skill).unwrap();
        }
        Dispatcher::new(
            registry.into_shared(),
            DetectionConfig::default(),
            RetryPolicy::default()
                .with_max_attempts(1)
                .with_base_delay(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn auto_selected_skill_runs_alone() {
        let d = dispatcher(vec![appender("top", 90.0), appender("other", 70.0)]);
        let result = d.handle(&ExecutionContext::new("x")).await;

        assert!(result.success);
        assert_eq!(result.output, json!("top[0:]"));
        assert_eq!(result.metadata.confidence, Some(90.0));
        assert_eq!(result.metadata.suggested_next, vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn chain_runs_when_nothing_auto_selects() {
        let d = dispatcher(vec![appender("a", 75.0), appender("b", 65.0), appender("c", 55.0)]);
        let result = d.handle(&ExecutionContext::new("x")).await;

        assert!(result.success);
        // b sees a's output layered into its context
        assert_eq!(result.output, json!("b[1:a[0:]]"));
        assert_eq!(result.metadata.confidence, Some(75.0));
        assert_eq!(result.metadata.suggested_next, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn no_match_reports_suggestions() {
        let d = dispatcher(vec![appender("weak", 55.0), appender("none", 0.0)]);
        let result = d.handle(&ExecutionContext::new("x")).await;

        assert!(!result.success);
        let err = result.error.unwrap();
        assert_eq!(err.code, SkillErrorCode::NoSkillMatched);
        assert_eq!(err.details.unwrap()["suggestions"][0]["skill_id"], json!("weak"));
        assert_eq!(result.metadata.suggested_next, vec!["weak".to_string()]);
    }

    #[tokio::test]
    async fn chain_does_not_mutate_caller_context() {
        let d = dispatcher(vec![appender("a", 70.0), appender("b", 70.0)]);
        let ctx = ExecutionContext::new("x");
        let chain = vec!["a".to_string(), "b".to_string()];

        let result = d.run_chain(&chain, &ctx).await;
        assert!(result.success);
        assert!(ctx.previous_outputs.is_empty());
    }

    #[tokio::test]
    async fn chain_error_names_position_and_skill() {
        let mut failing = appender("beta", 70.0);
        failing.fail = true;
        let d = dispatcher(vec![appender("alpha", 70.0), failing]);
        let chain = vec!["alpha".to_string(), "beta".to_string()];

        let result = d.run_chain(&chain, &ExecutionContext::new("x")).await;
        assert!(!result.success);
        let err = result.error.unwrap();
        assert!(err.message.contains("position 1"), "{}", err.message);
        assert!(err.message.contains("beta"), "{}", err.message);
        assert_eq!(err.code, SkillErrorCode::RetriesExhausted);
    }

    #[tokio::test]
    async fn empty_chain_is_rejected() {
        let d = dispatcher(vec![]);
        let result = d.run_chain(&[], &ExecutionContext::new("x")).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, SkillErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn unknown_skill_is_not_found() {
        let d = dispatcher(vec![]);
        let result = d.run_single("ghost", &ExecutionContext::new("x")).await;
        assert_eq!(result.error.unwrap().code, SkillErrorCode::SkillNotFound);
    }
}
