//! Workflow engine: execution wrapper, template resolution, definition files,
//! and the orchestrator.
//!
//! - `retry` -- retry/backoff/timeout wrapper shared by every skill invocation
//! - `template` -- `{{ steps.N.output.path }}` substitution over JSON values
//! - `definition` -- YAML definition files: parse, validate, load, discover
//! - `orchestrator` -- workflow lifecycle, sequential driving, pause/resume/cancel

pub mod definition;
pub mod orchestrator;
pub mod retry;
pub mod template;

pub use orchestrator::{OrchestratorError, WorkflowOrchestrator};
pub use retry::{RetryHandler, RetryPolicy};
pub use template::TemplateResolver;
