//! Configuration types for Skillweave.
//!
//! `SkillweaveConfig` is the top-level `config.toml`: detection thresholds,
//! retry policy, the generative text service, and where skill manifests live.
//! Every field has a default so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillweaveConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Directory of skill manifest files (`*.yaml`). `None` = `{data_dir}/skills`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Confidence cutoffs used by the skill registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Candidates below this confidence are dropped (default 50).
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: f64,
    /// A top candidate at or above this confidence is auto-selected (default 80).
    #[serde(default = "default_auto_select_threshold")]
    pub auto_select_threshold: f64,
    /// Minimum confidence for a skill to join a chain (default 60).
    #[serde(default = "default_chain_min_confidence")]
    pub chain_min_confidence: f64,
    /// Maximum chain length (default 3).
    #[serde(default = "default_max_chain")]
    pub max_chain: usize,
}

fn default_suggestion_threshold() -> f64 {
    50.0
}

fn default_auto_select_threshold() -> f64 {
    80.0
}

fn default_chain_min_confidence() -> f64 {
    60.0
}

fn default_max_chain() -> usize {
    3
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            suggestion_threshold: default_suggestion_threshold(),
            auto_select_threshold: default_auto_select_threshold(),
            chain_min_confidence: default_chain_min_confidence(),
            max_chain: default_max_chain(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Retry policy for the execution wrapper.
///
/// After failed attempt `n` the wrapper sleeps `base_delay * 2^n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit in milliseconds (default 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Per-attempt timeout in seconds (None = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: None,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Generative text service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}
