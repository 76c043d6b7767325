//! Workflow orchestrator: lifecycle, sequential step driving, and control.
//!
//! The orchestrator owns every workflow record in a concurrent map keyed by
//! id. Each workflow has at most one active driver, tracked by a
//! [`CancellationToken`] in `active_runs`. Steps within a workflow run
//! strictly in order; separate workflows run fully in parallel.
//!
//! # Step flow
//!
//! 1. Pick the first non-completed step, resolve its input against the
//!    results so far, mark it running, emit `step_started`.
//! 2. Run the skill through the execution wrapper in its own task, raced
//!    against the cancellation token. A panic becomes a step failure.
//! 3. On success store `results[ordinal]` and emit `step_completed`; on
//!    failure mark the step and the workflow failed and stop.
//!
//! Map entries are never held across an await, and events are published
//! after the entry is released so listeners may query the orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use skillweave_types::event::{WorkflowEvent, WorkflowEventType};
use skillweave_types::skill::{ExecutionContext, SkillError, SkillErrorCode, SkillResult};
use skillweave_types::workflow::{
    StepSpec, StepStatus, Workflow, WorkflowErrorRecord, WorkflowFile, WorkflowProgress,
    WorkflowStatus, WorkflowStep,
};

use crate::event::hub::WorkflowEventHub;
use crate::skill::box_skill::BoxSkill;
use crate::skill::registry::SkillRegistry;

use super::retry::{RetryHandler, RetryPolicy};
use super::template::TemplateResolver;

/// Workflow type used by [`WorkflowOrchestrator::create_chain_workflow`].
pub const CHAIN_WORKFLOW_TYPE: &str = "chain";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from orchestrator control operations.
///
/// Step and skill failures are not errors here; they are recorded on the
/// workflow and reported through its status and events.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("workflow {0} not found")]
    NotFound(Uuid),

    #[error("workflow {id} is {status}, expected {expected}")]
    InvalidState {
        id: Uuid,
        status: WorkflowStatus,
        expected: WorkflowStatus,
    },

    #[error("workflow {0} already has an active driver")]
    AlreadyRunning(Uuid),

    #[error("workflow must contain at least one step")]
    EmptyWorkflow,
}

// ---------------------------------------------------------------------------
// Internal driver types
// ---------------------------------------------------------------------------

/// Releases the driver slot when the driver exits, however it exits.
///
/// A driver dropped while its workflow is still `running` (for example a
/// caller-side timeout) leaves no one to finish the in-flight step, so the
/// workflow is failed the same way an explicit cancel would.
struct RunGuard<'a> {
    orchestrator: &'a WorkflowOrchestrator,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, token)) = self.orchestrator.active_runs.remove(&self.id) {
            token.cancel();
        }
        let abandoned = self
            .orchestrator
            .workflows
            .get(&self.id)
            .is_some_and(|wf| {
                wf.status == WorkflowStatus::Running
                    || (!wf.status.is_terminal() && wf.steps.iter().any(|s| s.status == StepStatus::Running))
            });
        if abandoned {
            tracing::warn!(workflow_id = %self.id, "workflow driver dropped mid-run");
            self.orchestrator.abort_run(self.id, "workflow driver dropped");
        }
    }
}

/// Aborts the spawned step task when dropped, so a dropped driver never
/// leaves a detached skill call behind.
struct StepTask<T>(JoinHandle<T>);

impl<T> Drop for StepTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A step ready to run, captured while the workflow entry was locked.
struct PreparedStep {
    ordinal: u32,
    skill_id: String,
    description: String,
    skill: Option<BoxSkill>,
    context: ExecutionContext,
}

enum NextAction {
    Run(PreparedStep),
    Finished(Workflow),
    Stopped(Workflow),
}

enum StepRun {
    Done(SkillResult),
    Cancelled,
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

/// Owns workflows and drives them through their steps.
pub struct WorkflowOrchestrator {
    registry: Arc<SkillRegistry>,
    retry_policy: RetryPolicy,
    workflows: DashMap<Uuid, Workflow>,
    events: WorkflowEventHub,
    active_runs: DashMap<Uuid, CancellationToken>,
}

impl WorkflowOrchestrator {
    pub fn new(registry: Arc<SkillRegistry>, retry_policy: RetryPolicy) -> Self {
        Self {
            registry,
            retry_policy,
            workflows: DashMap::new(),
            events: WorkflowEventHub::new(),
            active_runs: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    // -- creation ----------------------------------------------------------

    /// Create a pending workflow with ordinals `1..=n` and emit `started`.
    pub fn create_workflow(
        &self,
        workflow_type: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<StepSpec>,
    ) -> Result<Workflow, OrchestratorError> {
        if steps.is_empty() {
            return Err(OrchestratorError::EmptyWorkflow);
        }

        let workflow = Workflow::new(workflow_type, name, steps);
        let id = workflow.id;
        self.workflows.insert(id, workflow.clone());

        tracing::info!(
            workflow_id = %id,
            workflow_type = %workflow.workflow_type,
            steps = workflow.steps.len(),
            "created workflow"
        );
        self.events.publish(
            WorkflowEvent::new(id, WorkflowEventType::Started, format!("workflow '{}' created", workflow.name))
                .with_data(json!({ "total_steps": workflow.steps.len() })),
        );

        Ok(workflow)
    }

    /// Create a workflow from a parsed definition file.
    pub fn create_from_file(&self, file: WorkflowFile) -> Result<Workflow, OrchestratorError> {
        self.create_workflow(file.workflow_type, file.name, file.steps)
    }

    /// Create one workflow per definition. Nothing is created if any
    /// definition is empty.
    pub fn create_batch(&self, files: Vec<WorkflowFile>) -> Result<Vec<Workflow>, OrchestratorError> {
        if files.iter().any(|f| f.steps.is_empty()) {
            return Err(OrchestratorError::EmptyWorkflow);
        }
        files
            .into_iter()
            .map(|file| self.create_from_file(file))
            .collect()
    }

    /// Turn a ranked skill chain into a workflow. Step `k` receives the
    /// request and, from step 2 on, the previous step's output.
    pub fn create_chain_workflow(
        &self,
        request: &str,
        chain: &[String],
    ) -> Result<Workflow, OrchestratorError> {
        let steps = chain
            .iter()
            .enumerate()
            .map(|(idx, skill_id)| {
                let input = if idx == 0 {
                    json!({ "request": request })
                } else {
                    json!({
                        "request": request,
                        "previous": format!("{{{{ steps.{idx}.output }}}}"),
                    })
                };
                StepSpec::new(skill_id.clone(), format!("run {skill_id}"), input)
            })
            .collect();

        self.create_workflow(CHAIN_WORKFLOW_TYPE, chain_name(request), steps)
    }

    // -- execution ---------------------------------------------------------

    /// Drive a pending workflow until it completes, fails, or is paused.
    pub async fn execute_workflow(&self, id: Uuid) -> Result<Workflow, OrchestratorError> {
        let (token, _guard) = self.claim(id, WorkflowStatus::Pending)?;
        tracing::info!(workflow_id = %id, "executing workflow");
        self.drive(id, token).await
    }

    /// Drive every workflow in `ids` concurrently.
    pub async fn execute_batch(&self, ids: &[Uuid]) -> Vec<Result<Workflow, OrchestratorError>> {
        join_all(ids.iter().map(|&id| self.execute_workflow(id))).await
    }

    /// Request a pause. Only a running workflow can be paused; the in-flight
    /// step finishes first.
    pub fn pause_workflow(&self, id: Uuid) -> bool {
        let Some(mut wf) = self.workflows.get_mut(&id) else {
            return false;
        };
        if wf.status != WorkflowStatus::Running {
            return false;
        }
        set_status(&mut wf, WorkflowStatus::Paused);
        tracing::info!(workflow_id = %id, step = wf.current_step + 1, "pause requested");
        true
    }

    /// Continue a paused workflow from its first non-completed step.
    ///
    /// Fails with [`OrchestratorError::AlreadyRunning`] while the previous
    /// driver is still finishing its in-flight step.
    pub async fn resume_workflow(&self, id: Uuid) -> Result<Workflow, OrchestratorError> {
        let (token, _guard) = self.claim(id, WorkflowStatus::Paused)?;
        tracing::info!(workflow_id = %id, "resuming workflow");
        self.drive(id, token).await
    }

    /// Cancel a non-terminal workflow.
    ///
    /// The workflow becomes `failed` with a non-recoverable `CANCELLED`
    /// error; the in-flight step (if any) is aborted and marked failed.
    /// Returns `false` for unknown or already terminal workflows.
    pub fn cancel_workflow(&self, id: Uuid) -> bool {
        self.abort_run(id, "workflow cancelled")
    }

    /// Fail a non-terminal workflow with a non-recoverable `CANCELLED`
    /// record, stop its driver and publish `failed`.
    fn abort_run(&self, id: Uuid, message: &str) -> bool {
        let cancelled_step = {
            let Some(mut wf) = self.workflows.get_mut(&id) else {
                return false;
            };
            if wf.status.is_terminal() {
                return false;
            }

            let now = Utc::now();
            let error = SkillError::new(SkillErrorCode::Cancelled, message);
            let mut running_step = None;
            for step in wf.steps.iter_mut().filter(|s| s.status == StepStatus::Running) {
                set_step_status(step, StepStatus::Failed);
                step.error = Some(error.clone());
                step.completed_at = Some(now);
                running_step = Some(step.ordinal);
            }

            wf.errors.push(WorkflowErrorRecord {
                step: running_step,
                code: SkillErrorCode::Cancelled.to_string(),
                message: message.to_string(),
                recoverable: false,
                timestamp: now,
            });
            finish(&mut wf, WorkflowStatus::Failed);
            running_step
        };

        if let Some(token) = self.active_runs.get(&id) {
            token.cancel();
        }

        tracing::info!(workflow_id = %id, step = ?cancelled_step, "{message}");
        let mut event = WorkflowEvent::new(id, WorkflowEventType::Failed, message)
            .with_data(json!({ "code": SkillErrorCode::Cancelled, "recoverable": false }));
        if let Some(ordinal) = cancelled_step {
            event = event.for_step(ordinal);
        }
        self.events.publish(event);
        true
    }

    // -- queries -----------------------------------------------------------

    pub fn get_workflow(&self, id: Uuid) -> Option<Workflow> {
        self.workflows.get(&id).map(|wf| wf.clone())
    }

    pub fn get_progress(&self, id: Uuid) -> Option<WorkflowProgress> {
        self.workflows.get(&id).map(|wf| wf.progress())
    }

    /// All workflows, oldest first.
    pub fn get_all_workflows(&self) -> Vec<Workflow> {
        let mut all: Vec<Workflow> = self.workflows.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|wf| (wf.created_at, wf.id));
        all
    }

    pub fn get_workflows_by_status(&self, status: WorkflowStatus) -> Vec<Workflow> {
        self.get_all_workflows()
            .into_iter()
            .filter(|wf| wf.status == status)
            .collect()
    }

    /// Remove completed workflows together with their events and listeners.
    pub fn clear_completed_workflows(&self) -> usize {
        let completed: Vec<Uuid> = self
            .workflows
            .iter()
            .filter(|e| e.status == WorkflowStatus::Completed)
            .map(|e| *e.key())
            .collect();

        for id in &completed {
            self.workflows.remove(id);
            self.events.remove(*id);
        }

        tracing::debug!(cleared = completed.len(), "cleared completed workflows");
        completed.len()
    }

    // -- events ------------------------------------------------------------

    /// Register a synchronous callback for one workflow's events.
    pub fn add_event_listener<F>(&self, id: Uuid, listener: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(id, listener);
    }

    /// Subscribe to one workflow's future events.
    pub fn subscribe(&self, id: Uuid) -> mpsc::UnboundedReceiver<WorkflowEvent> {
        self.events.subscribe(id)
    }

    /// Full event log of one workflow.
    pub fn events(&self, id: Uuid) -> Vec<WorkflowEvent> {
        self.events.events(id)
    }

    // -- driver ------------------------------------------------------------

    /// Claim the single driver slot for `id` and move it to `running`.
    fn claim(
        &self,
        id: Uuid,
        expected: WorkflowStatus,
    ) -> Result<(CancellationToken, RunGuard<'_>), OrchestratorError> {
        let mut wf = self
            .workflows
            .get_mut(&id)
            .ok_or(OrchestratorError::NotFound(id))?;

        let token = match self.active_runs.entry(id) {
            Entry::Occupied(_) => return Err(OrchestratorError::AlreadyRunning(id)),
            Entry::Vacant(slot) => {
                if wf.status != expected {
                    return Err(OrchestratorError::InvalidState {
                        id,
                        status: wf.status,
                        expected,
                    });
                }
                let token = CancellationToken::new();
                slot.insert(token.clone());
                token
            }
        };

        set_status(&mut wf, WorkflowStatus::Running);
        if wf.started_at.is_none() {
            wf.started_at = Some(Utc::now());
        }

        Ok((
            token,
            RunGuard {
                orchestrator: self,
                id,
            },
        ))
    }

    async fn drive(&self, id: Uuid, token: CancellationToken) -> Result<Workflow, OrchestratorError> {
        loop {
            let prepared = match self.prepare_next(id)? {
                NextAction::Run(prepared) => prepared,
                NextAction::Finished(workflow) => {
                    tracing::info!(
                        workflow_id = %id,
                        duration_ms = workflow.total_duration_ms.unwrap_or(0),
                        "workflow completed"
                    );
                    self.events.publish(
                        WorkflowEvent::new(id, WorkflowEventType::Completed, "workflow completed")
                            .with_data(json!({ "results": workflow.results })),
                    );
                    return Ok(workflow);
                }
                NextAction::Stopped(workflow) => {
                    tracing::info!(workflow_id = %id, status = %workflow.status, "workflow driver stopped");
                    return Ok(workflow);
                }
            };

            self.events.publish(
                WorkflowEvent::new(
                    id,
                    WorkflowEventType::StepStarted,
                    format!("step {}: {}", prepared.ordinal, prepared.description),
                )
                .for_step(prepared.ordinal)
                .with_data(json!({ "skill_id": prepared.skill_id })),
            );

            let ordinal = prepared.ordinal;
            let run = self.run_step(prepared, &token).await;
            if let StepRun::Done(result) = run {
                if !self.record_step(id, ordinal, result)? {
                    return self.get_workflow(id).ok_or(OrchestratorError::NotFound(id));
                }
            }
            // A cancelled run was already recorded by cancel_workflow; the
            // next prepare_next call sees the failed status and stops.
        }
    }

    /// Select and prepare the next step, or report why driving stops.
    fn prepare_next(&self, id: Uuid) -> Result<NextAction, OrchestratorError> {
        let mut wf = self
            .workflows
            .get_mut(&id)
            .ok_or(OrchestratorError::NotFound(id))?;

        if wf.status != WorkflowStatus::Running {
            return Ok(NextAction::Stopped(wf.clone()));
        }

        let Some(idx) = wf.steps.iter().position(|s| s.status != StepStatus::Completed) else {
            finish(&mut wf, WorkflowStatus::Completed);
            return Ok(NextAction::Finished(wf.clone()));
        };

        let ordinal = wf.steps[idx].ordinal;
        let resolved = TemplateResolver::resolve_with_results(&wf.steps[idx].input, &wf.results, ordinal);

        let mut previous_outputs = BTreeMap::new();
        for step in wf.steps.iter().filter(|s| s.status == StepStatus::Completed) {
            if let Some(output) = &step.output {
                previous_outputs.insert(step.skill_id.clone(), output.clone());
            }
        }

        let request = step_request(&resolved, &wf.steps[idx].description, &wf.name);
        let mut context = ExecutionContext::new(request).with_input(resolved.clone());
        context.previous_outputs = previous_outputs;

        wf.current_step = idx;
        let step = &mut wf.steps[idx];
        set_step_status(step, StepStatus::Running);
        step.started_at = Some(Utc::now());
        step.resolved_input = Some(resolved);

        let skill_id = step.skill_id.clone();
        tracing::info!(workflow_id = %id, step = ordinal, skill_id = %skill_id, "step started");

        Ok(NextAction::Run(PreparedStep {
            ordinal,
            skill: self.registry.get(&skill_id).cloned(),
            skill_id,
            description: step.description.clone(),
            context,
        }))
    }

    /// Run one step's skill in its own task, raced against cancellation.
    async fn run_step(&self, prepared: PreparedStep, token: &CancellationToken) -> StepRun {
        let Some(skill) = prepared.skill else {
            return StepRun::Done(SkillResult::failure(SkillError::new(
                SkillErrorCode::SkillNotFound,
                format!("skill '{}' is not registered", prepared.skill_id),
            )));
        };

        let policy = self.retry_policy.clone();
        let context = prepared.context;
        let mut task = StepTask(tokio::spawn(async move {
            RetryHandler::execute_with_retry(&skill, &context, &policy).await
        }));

        tokio::select! {
            biased;
            _ = token.cancelled() => StepRun::Cancelled,
            joined = &mut task.0 => match joined {
                Ok(result) => StepRun::Done(result),
                Err(err) if err.is_panic() => StepRun::Done(SkillResult::failure(SkillError::new(
                    SkillErrorCode::Panicked,
                    format!("skill '{}' panicked: {}", prepared.skill_id, panic_message(err)),
                ))),
                Err(_) => StepRun::Cancelled,
            },
        }
    }

    /// Store a finished step. Returns `false` when the workflow stops here.
    fn record_step(&self, id: Uuid, ordinal: u32, result: SkillResult) -> Result<bool, OrchestratorError> {
        let event = {
            let mut wf = self
                .workflows
                .get_mut(&id)
                .ok_or(OrchestratorError::NotFound(id))?;

            // Cancelled while the step was finishing: keep the cancellation.
            if wf.status == WorkflowStatus::Failed {
                return Ok(false);
            }

            let now = Utc::now();
            let Some(step) = wf.step_mut(ordinal) else {
                return Ok(false);
            };
            step.duration_ms = Some(result.metadata.duration_ms);
            step.completed_at = Some(now);

            if result.success {
                set_step_status(step, StepStatus::Completed);
                step.output = Some(result.output.clone());
                wf.results.insert(ordinal, result.output.clone());
                wf.current_step = ordinal as usize;

                tracing::info!(
                    workflow_id = %id,
                    step = ordinal,
                    duration_ms = result.metadata.duration_ms,
                    "step completed"
                );
                WorkflowEvent::new(id, WorkflowEventType::StepCompleted, format!("step {ordinal} completed"))
                    .for_step(ordinal)
                    .with_data(json!({ "output": result.output, "duration_ms": result.metadata.duration_ms }))
            } else {
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| SkillError::execution(result.failure_summary()));
                set_step_status(step, StepStatus::Failed);
                step.error = Some(error.clone());

                wf.errors.push(WorkflowErrorRecord {
                    step: Some(ordinal),
                    code: error.code.to_string(),
                    message: error.message.clone(),
                    recoverable: is_recoverable(error.code),
                    timestamp: now,
                });
                finish(&mut wf, WorkflowStatus::Failed);

                tracing::warn!(
                    workflow_id = %id,
                    step = ordinal,
                    code = %error.code,
                    error = %error.message,
                    "step failed"
                );
                WorkflowEvent::new(id, WorkflowEventType::StepFailed, format!("step {ordinal} failed: {}", error.message))
                    .for_step(ordinal)
                    .with_data(json!({ "error": error, "validation_errors": result.validation_errors }))
            }
        };

        let failed = event.event_type == WorkflowEventType::StepFailed;
        self.events.publish(event);
        if failed {
            self.events.publish(
                WorkflowEvent::new(id, WorkflowEventType::Failed, format!("workflow failed at step {ordinal}"))
                    .for_step(ordinal),
            );
        }
        Ok(!failed)
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("skills", &self.registry.len())
            .field("workflows", &self.workflows.len())
            .field("active_runs", &self.active_runs.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The only writer of `Workflow::status`. Illegal transitions are bugs in
/// this module.
fn set_status(wf: &mut Workflow, next: WorkflowStatus) {
    debug_assert!(
        wf.status.can_transition_to(next),
        "illegal workflow transition {} -> {next}",
        wf.status
    );
    wf.status = next;
}

/// The only writer of `WorkflowStep::status`.
fn set_step_status(step: &mut WorkflowStep, next: StepStatus) {
    debug_assert!(
        step.status.can_transition_to(next),
        "illegal transition of step {}: {} -> {next}",
        step.ordinal,
        step.status
    );
    step.status = next;
}

/// Move to a terminal status and stamp completion time and duration.
fn finish(wf: &mut Workflow, status: WorkflowStatus) {
    let now = Utc::now();
    set_status(wf, status);
    wf.completed_at = Some(now);
    wf.total_duration_ms = wf
        .started_at
        .map(|started| (now - started).num_milliseconds().max(0) as u64);
}

/// Request text for a step: `input.request`, else the step description,
/// else the workflow name.
fn step_request(resolved: &Value, description: &str, workflow_name: &str) -> String {
    resolved
        .get("request")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .or(Some(description).filter(|s| !s.trim().is_empty()))
        .unwrap_or(workflow_name)
        .to_string()
}

fn is_recoverable(code: SkillErrorCode) -> bool {
    !matches!(
        code,
        SkillErrorCode::SkillNotFound | SkillErrorCode::Cancelled | SkillErrorCode::Panicked
    )
}

fn chain_name(request: &str) -> String {
    const MAX_CHARS: usize = 60;
    let trimmed = request.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{head}...")
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(err) => err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
