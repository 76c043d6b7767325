//! Skill registry: explicit registration and confidence-ranked detection.
//!
//! The registry is built once at startup (`register` takes `&mut self`) and
//! then shared immutably, typically behind an `Arc`, for concurrent lookups.
//! Skills keep their registration order, which also breaks confidence ties.

use std::collections::HashMap;
use std::sync::Arc;

use skillweave_types::config::DetectionConfig;
use skillweave_types::skill::{DetectedSkill, ExecutionContext, SkillMetadata};

use super::box_skill::BoxSkill;
use super::handler::Skill;
use super::scoring::keyword_match;

/// Errors raised while registering skills.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("skill '{0}' is already registered")]
    Duplicate(String),

    #[error("skill id must not be empty")]
    EmptyId,
}

/// Registry of all skills, keyed by stable id.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: Vec<BoxSkill>,
    index: HashMap<String, usize>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete skill.
    pub fn register<S: Skill + 'static>(&mut self, skill: S) -> Result<(), RegistryError> {
        self.register_boxed(BoxSkill::new(skill))
    }

    /// Register an already boxed skill. Ids must be unique and non-empty.
    pub fn register_boxed(&mut self, skill: BoxSkill) -> Result<(), RegistryError> {
        let id = skill.id().to_string();
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.index.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        tracing::debug!(skill_id = %id, "registered skill");
        self.index.insert(id, self.skills.len());
        self.skills.push(skill);
        Ok(())
    }

    /// Freeze the registry for sharing across tasks.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn get(&self, id: &str) -> Option<&BoxSkill> {
        self.index.get(id).map(|&idx| &self.skills[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Skill ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.id()).collect()
    }

    pub fn metadata(&self) -> impl Iterator<Item = &SkillMetadata> {
        self.skills.iter().map(|s| s.metadata())
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Rank every skill against `request`.
    ///
    /// Keeps candidates at or above `config.suggestion_threshold` (a zero score
    /// is always excluded) sorted by non-increasing confidence.
    pub fn detect(
        &self,
        request: &str,
        context: &ExecutionContext,
        config: &DetectionConfig,
    ) -> Vec<DetectedSkill> {
        let mut candidates: Vec<DetectedSkill> = self
            .skills
            .iter()
            .filter_map(|skill| {
                let raw = skill.can_handle(request, context);
                if raw.is_nan() {
                    tracing::warn!(skill_id = %skill.id(), "skill reported NaN confidence");
                    return None;
                }
                let confidence = raw.clamp(0.0, 100.0);
                if confidence <= 0.0 || confidence < config.suggestion_threshold {
                    return None;
                }

                let matched = keyword_match(&skill.metadata().triggers, request).matched;
                let reason = if matched.is_empty() {
                    format!("{} reported confidence {confidence:.1}", skill.id())
                } else {
                    format!("matched keywords: {}", matched.join(", "))
                };

                Some(DetectedSkill {
                    skill_id: skill.id().to_string(),
                    confidence,
                    reason,
                    matched_keywords: matched,
                    auto_select: confidence >= config.auto_select_threshold,
                })
            })
            .collect();

        // Stable sort keeps registration order among equal scores.
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        tracing::debug!(
            request_len = request.len(),
            candidates = candidates.len(),
            top = candidates.first().map(|c| c.skill_id.as_str()).unwrap_or("-"),
            "detected skills"
        );

        candidates
    }

    /// The auto-selected skill for `request`, if the top candidate clears the
    /// auto-select threshold.
    pub fn best(
        &self,
        request: &str,
        context: &ExecutionContext,
        config: &DetectionConfig,
    ) -> Option<String> {
        self.detect(request, context, config)
            .into_iter()
            .next()
            .filter(|c| c.auto_select)
            .map(|c| c.skill_id)
    }

    /// Up to `max_skills` top-ranked skills with confidence at or above
    /// `config.chain_min_confidence`, in ranked order.
    pub fn chain(
        &self,
        request: &str,
        context: &ExecutionContext,
        config: &DetectionConfig,
        max_skills: usize,
    ) -> Vec<String> {
        self.detect(request, context, config)
            .into_iter()
            .filter(|c| c.confidence >= config.chain_min_confidence)
            .take(max_skills)
            .map(|c| c.skill_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillweave_types::skill::{SkillError, SkillResult};

    struct KeywordSkill {
        meta: SkillMetadata,
    }

    impl KeywordSkill {
        fn new(id: &str, triggers: &[&str]) -> Self {
            Self {
                meta: SkillMetadata::new(id, id).with_triggers(triggers.iter().copied()),
            }
        }
    }

    impl Skill for KeywordSkill {
        fn metadata(&self) -> &SkillMetadata {
            &self.meta
        }

        async fn execute(&self, _context: &ExecutionContext) -> Result<SkillResult, SkillError> {
            Ok(SkillResult::success(json!(self.meta.id), "ok"))
        }
    }

    /// Ignores keywords and always reports a fixed confidence.
    struct FixedSkill {
        meta: SkillMetadata,
        confidence: f64,
    }

    impl Skill for FixedSkill {
        fn metadata(&self) -> &SkillMetadata {
            &self.meta
        }

        fn can_handle(&self, _request: &str, _context: &ExecutionContext) -> f64 {
            self.confidence
        }

        async fn execute(&self, _context: &ExecutionContext) -> Result<SkillResult, SkillError> {
            Ok(SkillResult::success(json!(null), "ok"))
        }
    }

    fn fixed(id: &str, confidence: f64) -> FixedSkill {
        FixedSkill {
            meta: SkillMetadata::new(id, id),
            confidence,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::default()
    }

    #[test]
    fn register_rejects_duplicates_and_empty_ids() {
        let mut registry = SkillRegistry::new();
        registry.register(KeywordSkill::new("quiz", &["quiz"])).unwrap();

        let dup = registry.register(KeywordSkill::new("quiz", &["test"]));
        assert!(matches!(dup, Err(RegistryError::Duplicate(id)) if id == "quiz"));

        let empty = registry.register(KeywordSkill::new(" ", &[]));
        assert!(matches!(empty, Err(RegistryError::EmptyId)));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("quiz"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn ids_keep_registration_order() {
        let mut registry = SkillRegistry::new();
        for id in ["b", "a", "c"] {
            registry.register(KeywordSkill::new(id, &[])).unwrap();
        }
        assert_eq!(registry.ids(), vec!["b", "a", "c"]);
    }

    #[test]
    fn single_trigger_hit_is_detected_but_not_auto_selected() {
        let mut registry = SkillRegistry::new();
        registry
            .register(KeywordSkill::new("game-builder", &["build game"]))
            .unwrap();

        let config = DetectionConfig::default();
        let detected = registry.detect("please build game now", &ctx(), &config);
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].confidence, 75.0);
        assert!(detected[0].confidence >= 65.0);
        assert!(!detected[0].auto_select);
        assert_eq!(detected[0].matched_keywords, vec!["build game".to_string()]);
        assert!(detected[0].reason.contains("build game"));

        assert_eq!(registry.best("please build game now", &ctx(), &config), None);
    }

    #[test]
    fn multiple_hits_auto_select() {
        let mut registry = SkillRegistry::new();
        registry
            .register(KeywordSkill::new("game-builder", &["build", "game", "level"]))
            .unwrap();

        let config = DetectionConfig::default();
        let best = registry.best("build a game", &ctx(), &config);
        assert_eq!(best.as_deref(), Some("game-builder"));
    }

    #[test]
    fn detect_sorts_and_filters_by_threshold() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("low", 40.0)).unwrap();
        registry.register(fixed("mid", 70.0)).unwrap();
        registry.register(fixed("high", 90.0)).unwrap();
        registry.register(fixed("edge", 50.0)).unwrap();
        registry.register(fixed("zero", 0.0)).unwrap();

        let config = DetectionConfig::default();
        let detected = registry.detect("anything", &ctx(), &config);
        let ids: Vec<&str> = detected.iter().map(|d| d.skill_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "edge"]);

        assert!(detected.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(detected
            .iter()
            .all(|d| d.confidence >= config.suggestion_threshold));
    }

    #[test]
    fn zero_confidence_excluded_even_with_zero_threshold() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("zero", 0.0)).unwrap();
        let config = DetectionConfig {
            suggestion_threshold: 0.0,
            ..DetectionConfig::default()
        };
        assert!(registry.detect("x", &ctx(), &config).is_empty());
    }

    #[test]
    fn nan_confidence_is_never_suggested() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("nan", f64::NAN)).unwrap();
        registry.register(fixed("high", 90.0)).unwrap();
        registry.register(fixed("huge", f64::INFINITY)).unwrap();

        let detected = registry.detect("x", &ctx(), &DetectionConfig::default());
        let ids: Vec<&str> = detected.iter().map(|d| d.skill_id.as_str()).collect();
        assert_eq!(ids, vec!["huge", "high"]);
        assert_eq!(detected[0].confidence, 100.0);
        assert!(detected.iter().all(|d| d.confidence.is_finite()));
    }

    #[test]
    fn ties_keep_registration_order() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("first", 70.0)).unwrap();
        registry.register(fixed("second", 70.0)).unwrap();

        let detected = registry.detect("x", &ctx(), &DetectionConfig::default());
        assert_eq!(detected[0].skill_id, "first");
        assert_eq!(detected[1].skill_id, "second");
    }

    #[test]
    fn custom_confidence_is_clamped() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("loud", 250.0)).unwrap();
        let detected = registry.detect("x", &ctx(), &DetectionConfig::default());
        assert_eq!(detected[0].confidence, 100.0);
        assert!(detected[0].reason.contains("reported confidence"));
    }

    #[test]
    fn chain_takes_top_skills_above_chain_minimum() {
        let mut registry = SkillRegistry::new();
        registry.register(fixed("a", 95.0)).unwrap();
        registry.register(fixed("b", 55.0)).unwrap();
        registry.register(fixed("c", 75.0)).unwrap();
        registry.register(fixed("d", 65.0)).unwrap();
        registry.register(fixed("e", 61.0)).unwrap();

        let config = DetectionConfig::default();
        assert_eq!(registry.chain("x", &ctx(), &config, 3), vec!["a", "c", "d"]);
        assert_eq!(registry.chain("x", &ctx(), &config, 10), vec!["a", "c", "d", "e"]);
        assert!(registry.chain("x", &ctx(), &config, 0).is_empty());
    }
}
