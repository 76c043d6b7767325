//! BoxSkill -- object-safe dynamic dispatch wrapper for [`Skill`].
//!
//! Same blanket-impl pattern as the LLM provider box:
//! 1. Define an object-safe `SkillDyn` trait with boxed futures
//! 2. Blanket-impl `SkillDyn` for all `T: Skill`
//! 3. `BoxSkill` wraps `Arc<dyn SkillDyn>` and delegates
//!
//! `BoxSkill` is cheap to clone so a step can move its skill into a spawned task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use skillweave_types::skill::{ExecutionContext, SkillError, SkillMetadata, SkillResult};

use super::handler::Skill;

/// Object-safe version of [`Skill`] with a boxed `execute` future.
pub trait SkillDyn: Send + Sync {
    fn metadata(&self) -> &SkillMetadata;

    fn can_handle(&self, request: &str, context: &ExecutionContext) -> f64;

    fn execute_boxed<'a>(
        &'a self,
        context: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<SkillResult, SkillError>> + Send + 'a>>;

    fn validate_output(&self, output: &Value) -> Result<(), Vec<String>>;
}

impl<T: Skill> SkillDyn for T {
    fn metadata(&self) -> &SkillMetadata {
        Skill::metadata(self)
    }

    fn can_handle(&self, request: &str, context: &ExecutionContext) -> f64 {
        Skill::can_handle(self, request, context)
    }

    fn execute_boxed<'a>(
        &'a self,
        context: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<SkillResult, SkillError>> + Send + 'a>> {
        Box::pin(self.execute(context))
    }

    fn validate_output(&self, output: &Value) -> Result<(), Vec<String>> {
        Skill::validate_output(self, output)
    }
}

/// Type-erased, shareable skill handle.
#[derive(Clone)]
pub struct BoxSkill {
    inner: Arc<dyn SkillDyn>,
}

impl BoxSkill {
    pub fn new<T: Skill + 'static>(skill: T) -> Self {
        Self {
            inner: Arc::new(skill),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.metadata().id
    }

    pub fn metadata(&self) -> &SkillMetadata {
        self.inner.metadata()
    }

    pub fn can_handle(&self, request: &str, context: &ExecutionContext) -> f64 {
        self.inner.can_handle(request, context)
    }

    pub async fn execute(&self, context: &ExecutionContext) -> Result<SkillResult, SkillError> {
        self.inner.execute_boxed(context).await
    }

    pub fn validate_output(&self, output: &Value) -> Result<(), Vec<String>> {
        self.inner.validate_output(output)
    }
}

impl std::fmt::Debug for BoxSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxSkill").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo {
        meta: SkillMetadata,
    }

    impl Skill for Echo {
        fn metadata(&self) -> &SkillMetadata {
            &self.meta
        }

        async fn execute(&self, context: &ExecutionContext) -> Result<SkillResult, SkillError> {
            Ok(SkillResult::success(json!(context.request), "echoed"))
        }

        fn validate_output(&self, output: &Value) -> Result<(), Vec<String>> {
            if output.is_string() {
                Ok(())
            } else {
                Err(vec!["expected a string".to_string()])
            }
        }
    }

    fn echo() -> BoxSkill {
        BoxSkill::new(Echo {
            meta: SkillMetadata::new("echo", "Echo").with_triggers(["echo", "repeat"]),
        })
    }

    #[tokio::test]
    async fn box_delegates_execute() {
        let skill = echo();
        let result = skill.execute(&ExecutionContext::new("hello")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, json!("hello"));
    }

    #[test]
    fn box_delegates_metadata_and_scoring() {
        let skill = echo();
        assert_eq!(skill.id(), "echo");
        let ctx = ExecutionContext::default();
        assert!(skill.can_handle("please echo this", &ctx) > 0.0);
        assert_eq!(skill.can_handle("unrelated", &ctx), 0.0);
    }

    #[test]
    fn box_delegates_validation() {
        let skill = echo();
        assert!(skill.validate_output(&json!("ok")).is_ok());
        assert_eq!(skill.validate_output(&json!(1)).unwrap_err().len(), 1);
    }

    #[test]
    fn clone_shares_instance() {
        let a = echo();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert!(format!("{b:?}").contains("echo"));
    }
}
