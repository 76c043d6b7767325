//! Skill domain types.
//!
//! Defines the metadata a skill advertises, the [`ExecutionContext`] handed
//! to a skill for one invocation, the [`SkillResult`] it returns, and the
//! typed [`SkillError`] carried on failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of conversation turns retained in an execution context.
pub const MAX_HISTORY_TURNS: usize = 20;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Immutable description of a skill, advertised to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Stable identifier (slug format, e.g. "game-builder").
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Short description of what the skill produces.
    #[serde(default)]
    pub description: String,
    /// Trigger keywords matched case-insensitively against requests.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Capability tags (e.g. "game", "assessment").
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Example requests this skill handles well.
    #[serde(default)]
    pub examples: Vec<String>,
}

impl SkillMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            triggers: Vec::new(),
            capabilities: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single turn of prior conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Append-only conversation history capped at a fixed number of turns.
///
/// When the cap is exceeded the oldest turns are dropped. Deserialized
/// histories are held to the same cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredHistory")]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    capacity: usize,
}

#[derive(Deserialize)]
struct StoredHistory {
    #[serde(default)]
    turns: Vec<ConversationTurn>,
    #[serde(default = "default_history_capacity")]
    capacity: usize,
}

fn default_history_capacity() -> usize {
    MAX_HISTORY_TURNS
}

impl From<StoredHistory> for ConversationHistory {
    fn from(stored: StoredHistory) -> Self {
        let mut history = Self::with_capacity(stored.capacity);
        let skip = stored.turns.len().saturating_sub(history.capacity);
        history.turns = stored.turns.into_iter().skip(skip).collect();
        history
    }
}

impl ConversationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
        });
        if self.turns.len() > self.capacity {
            let overflow = self.turns.len() - self.capacity;
            self.turns.drain(..overflow);
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY_TURNS)
    }
}

/// Reference to a file uploaded alongside a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// User preference flags (e.g. `simplified_language`, `include_answers`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl UserPreferences {
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// Everything a skill can see during one invocation.
///
/// Built fresh per top-level request. Chaining never mutates a context in
/// place: [`ExecutionContext::with_previous_output`] returns a new value with
/// one more entry in `previous_outputs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// The original request text.
    pub request: String,
    /// Structured step input (resolved templates for workflow steps, `null` otherwise).
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub history: ConversationHistory,
    /// Prior outputs keyed by the skill id that produced them.
    #[serde(default)]
    pub previous_outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    #[serde(default)]
    pub preferences: UserPreferences,
}

impl ExecutionContext {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_files(mut self, files: Vec<UploadedFile>) -> Self {
        self.files = files;
        self
    }

    /// Derive a new context layering one more prior output on top of this one.
    pub fn with_previous_output(&self, skill_id: &str, output: Value) -> Self {
        let mut derived = self.clone();
        derived.previous_outputs.insert(skill_id.to_string(), output);
        derived
    }

    pub fn previous_output(&self, skill_id: &str) -> Option<&Value> {
        self.previous_outputs.get(skill_id)
    }

    /// Read a required string field from the structured input.
    ///
    /// A missing field, a `null` (unresolved template) or a non-string value
    /// is reported as [`SkillErrorCode::InvalidInput`].
    pub fn require_input_str(&self, field: &str) -> Result<&str, SkillError> {
        match self.input.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(Value::Null) | None => Err(SkillError::new(
                SkillErrorCode::InvalidInput,
                format!("missing required input field '{field}'"),
            )),
            Some(other) => Err(SkillError::new(
                SkillErrorCode::InvalidInput,
                format!("input field '{field}' must be a non-empty string"),
            )
            .with_details(other.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Machine-readable failure category carried by a [`SkillError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillErrorCode {
    ExecutionFailed,
    InvalidInput,
    OutputValidation,
    Timeout,
    RetriesExhausted,
    SkillNotFound,
    NoSkillMatched,
    Cancelled,
    Panicked,
    Provider,
}

impl SkillErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::OutputValidation => "OUTPUT_VALIDATION",
            Self::Timeout => "TIMEOUT",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::SkillNotFound => "SKILL_NOT_FOUND",
            Self::NoSkillMatched => "NO_SKILL_MATCHED",
            Self::Cancelled => "CANCELLED",
            Self::Panicked => "PANICKED",
            Self::Provider => "PROVIDER",
        }
    }
}

impl fmt::Display for SkillErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error reported by a skill (or by the wrapper around it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SkillError {
    pub code: SkillErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl SkillError {
    pub fn new(code: SkillErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(SkillErrorCode::ExecutionFailed, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Execution metadata attached to every [`SkillResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Wall-clock duration in milliseconds (set by the execution wrapper).
    pub duration_ms: u64,
    /// Number of attempts the execution wrapper made.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Skill ids worth running next.
    #[serde(default)]
    pub suggested_next: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Outcome of one skill invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    /// Opaque output payload.
    pub output: Value,
    pub message: String,
    #[serde(default)]
    pub metadata: ResultMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SkillError>,
    /// Messages from the skill's output validator.
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl SkillResult {
    pub fn success(output: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            output,
            message: message.into(),
            metadata: ResultMetadata::default(),
            error: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn failure(error: SkillError) -> Self {
        Self {
            success: false,
            output: Value::Null,
            message: error.message.clone(),
            metadata: ResultMetadata::default(),
            error: Some(error),
            validation_errors: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = Some(confidence);
        self
    }

    pub fn with_suggested_next(mut self, ids: Vec<String>) -> Self {
        self.metadata.suggested_next = ids;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.metadata.warnings.push(warning.into());
        self
    }

    /// Short description of why this result failed (for logs and step errors).
    pub fn failure_summary(&self) -> String {
        match &self.error {
            Some(err) => err.to_string(),
            None if !self.validation_errors.is_empty() => {
                format!("output validation failed: {}", self.validation_errors.join("; "))
            }
            None => self.message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A registry candidate for a free-text request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSkill {
    pub skill_id: String,
    pub confidence: f64,
    pub reason: String,
    pub matched_keywords: Vec<String>,
    /// Whether the confidence clears the auto-select threshold.
    pub auto_select: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
