//! Execution wrapper: retry with exponential backoff and output validation.
//!
//! Every skill invocation -- a single dispatch, a chain link, or a workflow
//! step -- goes through [`RetryHandler::execute_with_retry`]:
//!
//! - An `Err` from the skill and an `Ok` result with `success = false` both
//!   count as a failed attempt.
//! - After failed attempt `n` (1-based) the wrapper sleeps `base_delay * 2^n`,
//!   unless it was the last attempt.
//! - An optional per-attempt timeout abandons a slow attempt and counts it as
//!   a failure.
//! - The accepted attempt's output is checked once with the skill's validator;
//!   validation failures flip `success` but are never retried.
//! - The result's duration is overwritten with the wall-clock time spent.

use std::time::Duration;

use tokio::time::Instant;

use skillweave_types::config::RetryConfig;
use skillweave_types::skill::{ExecutionContext, SkillError, SkillErrorCode, SkillResult};

use crate::skill::box_skill::BoxSkill;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt budget, backoff unit, and optional per-attempt timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (a value of 0 is treated as 1).
    pub max_attempts: u32,
    /// Backoff unit: the sleep after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sleep that follows failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry handler; all logic is in associated functions.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt follows `attempt` (1-based).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < policy.attempts()
    }

    /// Execute `skill` under `policy`.
    ///
    /// Always returns a [`SkillResult`]; exhausting every attempt yields a
    /// failure with [`SkillErrorCode::RetriesExhausted`] whose details carry
    /// the last underlying error.
    pub async fn execute_with_retry(
        skill: &BoxSkill,
        context: &ExecutionContext,
        policy: &RetryPolicy,
    ) -> SkillResult {
        let started = Instant::now();
        let max_attempts = policy.attempts();
        let mut last_error: Option<SkillError> = None;

        for attempt in 1..=max_attempts {
            let outcome = Self::attempt_once(skill, context, policy.timeout, attempt).await;

            match outcome {
                Ok(mut result) if result.success => {
                    Self::apply_validation(skill, &mut result);
                    result.metadata.duration_ms = elapsed_ms(started);
                    result.metadata.attempts = attempt;

                    tracing::debug!(
                        skill_id = skill.id(),
                        attempt,
                        success = result.success,
                        duration_ms = result.metadata.duration_ms,
                        "skill attempt accepted"
                    );
                    return result;
                }
                Ok(result) => {
                    let err = result
                        .error
                        .unwrap_or_else(|| SkillError::execution(result.message));
                    last_error = Some(err);
                }
                Err(err) => last_error = Some(err),
            }

            let retrying = Self::should_retry(policy, attempt);
            tracing::warn!(
                skill_id = skill.id(),
                attempt,
                max_attempts,
                will_retry = retrying,
                error = %last_error.as_ref().map(ToString::to_string).unwrap_or_default(),
                "skill attempt failed"
            );

            if retrying {
                tokio::time::sleep(policy.backoff_delay(attempt)).await;
            }
        }

        let last = last_error.unwrap_or_else(|| SkillError::execution("no attempt was made"));
        let mut result = SkillResult::failure(SkillError {
            code: SkillErrorCode::RetriesExhausted,
            message: format!(
                "skill '{}' failed after {max_attempts} attempt(s): {last}",
                skill.id()
            ),
            details: serde_json::to_value(&last).ok(),
        });
        result.metadata.duration_ms = elapsed_ms(started);
        result.metadata.attempts = max_attempts;
        result
    }

    async fn attempt_once(
        skill: &BoxSkill,
        context: &ExecutionContext,
        timeout: Option<Duration>,
        attempt: u32,
    ) -> Result<SkillResult, SkillError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, skill.execute(context)).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(SkillError::new(
                    SkillErrorCode::Timeout,
                    format!("attempt {attempt} exceeded {}ms", limit.as_millis()),
                )),
            },
            None => skill.execute(context).await,
        }
    }

    /// Run the skill's validator over an accepted result.
    fn apply_validation(skill: &BoxSkill, result: &mut SkillResult) {
        let Err(problems) = skill.validate_output(&result.output) else {
            return;
        };
        if problems.is_empty() {
            return;
        }

        tracing::warn!(
            skill_id = skill.id(),
            problems = problems.len(),
            "skill output failed validation"
        );
        result.success = false;
        result.error = Some(
            SkillError::new(
                SkillErrorCode::OutputValidation,
                format!("output validation failed: {}", problems.join("; ")),
            )
            .with_details(serde_json::json!(problems)),
        );
        result.validation_errors.extend(problems);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
