//! Workflow domain types for Skillweave.
//!
//! A [`Workflow`] is an ordered list of [`WorkflowStep`]s, each bound to one
//! skill, plus a results map keyed by step ordinal. This module also holds the
//! status state machines, the construction input ([`StepSpec`]), the YAML file
//! shape ([`WorkflowFile`]) and progress snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::skill::SkillError;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall workflow status.
///
/// `pending -> running -> {completed | failed | paused}`, `paused -> running`.
/// Cancellation moves any non-terminal status to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow status '{other}'")),
        }
    }
}

/// Status of a single step: `pending -> running -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Construction input
// ---------------------------------------------------------------------------

/// Caller-supplied description of one step.
///
/// `input` may embed `{{ steps.N.output.path }}` placeholders referencing any
/// ordinal strictly less than the step's own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub skill_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: Value,
}

impl StepSpec {
    pub fn new(skill_id: impl Into<String>, description: impl Into<String>, input: Value) -> Self {
        Self {
            skill_id: skill_id.into(),
            description: description.into(),
            input,
        }
    }
}

/// On-disk workflow definition (YAML).
///
/// ```yaml
/// type: game
/// name: Fractions game
/// steps:
///   - skill_id: curriculum
///     description: Outline the topic
///     input: { topic: fractions }
///   - skill_id: game-builder
///     input: { outline: "{{ steps.1.output }}" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFile {
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub name: String,
    pub steps: Vec<StepSpec>,
}

// ---------------------------------------------------------------------------
// Workflow + steps
// ---------------------------------------------------------------------------

/// One step of a workflow, with its execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based ordinal; defines execution order and the template namespace.
    pub ordinal: u32,
    pub skill_id: String,
    pub description: String,
    /// Declared input, possibly containing unresolved placeholders.
    pub input: Value,
    /// Input after template resolution (set when the step starts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SkillError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn from_spec(ordinal: u32, spec: StepSpec) -> Self {
        Self {
            ordinal,
            skill_id: spec.skill_id,
            description: spec.description,
            input: spec.input,
            resolved_input: None,
            output: None,
            status: StepStatus::Pending,
            error: None,
            duration_ms: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// A workflow-level error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub code: String,
    pub message: String,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

/// A workflow instance: declared steps plus accumulated execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 workflow ID.
    pub id: Uuid,
    /// Free-form workflow kind (e.g. "game", "curriculum").
    pub workflow_type: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    /// 0-based index of the step being (or next to be) executed.
    pub current_step: usize,
    /// Outputs of successfully completed steps keyed by ordinal.
    pub results: BTreeMap<u32, Value>,
    pub errors: Vec<WorkflowErrorRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
}

impl Workflow {
    /// Build a pending workflow, assigning ordinals 1..=n in declaration order.
    pub fn new(workflow_type: impl Into<String>, name: impl Into<String>, specs: Vec<StepSpec>) -> Self {
        let steps = specs
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| WorkflowStep::from_spec(idx as u32 + 1, spec))
            .collect();

        Self {
            id: Uuid::now_v7(),
            workflow_type: workflow_type.into(),
            name: name.into(),
            steps,
            status: WorkflowStatus::Pending,
            current_step: 0,
            results: BTreeMap::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_duration_ms: None,
        }
    }

    pub fn step(&self, ordinal: u32) -> Option<&WorkflowStep> {
        let idx = ordinal.checked_sub(1)? as usize;
        self.steps.get(idx)
    }

    pub fn step_mut(&mut self, ordinal: u32) -> Option<&mut WorkflowStep> {
        let idx = ordinal.checked_sub(1)? as usize;
        self.steps.get_mut(idx)
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Progress snapshot for observers.
    pub fn progress(&self) -> WorkflowProgress {
        let total = self.steps.len();
        let completed = self.completed_steps();
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let current_ordinal = (self.current_step + 1).min(total) as u32;

        let activity = match self.status {
            WorkflowStatus::Running => self
                .steps
                .iter()
                .find(|s| s.status == StepStatus::Running)
                .map(|s| s.description.clone())
                .unwrap_or_else(|| "between steps".to_string()),
            WorkflowStatus::Pending => "waiting to start".to_string(),
            WorkflowStatus::Paused => format!("paused before step {current_ordinal}"),
            WorkflowStatus::Completed => "all steps completed".to_string(),
            WorkflowStatus::Failed => self
                .errors
                .last()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "failed".to_string()),
        };

        WorkflowProgress {
            current_step: current_ordinal,
            total_steps: total as u32,
            percent_complete: percent,
            status: self.status,
            current_activity: activity,
        }
    }
}

/// Point-in-time progress of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    /// 1-based ordinal of the current step.
    pub current_step: u32,
    pub total_steps: u32,
    pub percent_complete: f64,
    pub status: WorkflowStatus,
    pub current_activity: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
