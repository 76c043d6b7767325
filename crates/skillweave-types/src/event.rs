//! Workflow lifecycle event types.
//!
//! `WorkflowEvent` is delivered to per-workflow listeners in emission order.
//! All fields are Clone + Send + Sync so events can cross task boundaries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventType {
    Started,
    StepStarted,
    StepCompleted,
    StepFailed,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::StepStarted => write!(f, "step_started"),
            Self::StepCompleted => write!(f, "step_completed"),
            Self::StepFailed => write!(f, "step_failed"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single lifecycle event for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub workflow_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: WorkflowEventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WorkflowEvent {
    pub fn new(workflow_id: Uuid, event_type: WorkflowEventType, message: impl Into<String>) -> Self {
        Self {
            workflow_id,
            event_type,
            message: message.into(),
            step: None,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn for_step(mut self, ordinal: u32) -> Self {
        self.step = Some(ordinal);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
