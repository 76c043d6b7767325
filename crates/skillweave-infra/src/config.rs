//! Configuration loader for Skillweave.
//!
//! Reads `config.toml` from the data directory (`~/.skillweave/` by default)
//! or an explicit path, and deserializes it into [`SkillweaveConfig`]. Falls
//! back to defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use skillweave_types::config::SkillweaveConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SKILLWEAVE_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SKILLWEAVE_DATA_DIR` environment variable
/// 2. `~/.skillweave`
/// 3. `.skillweave` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".skillweave");
    }

    PathBuf::from(".skillweave")
}

/// `{data_dir}/config.toml`.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Directory holding skill manifests: `skills_dir` from the config, else
/// `{data_dir}/skills`.
pub fn resolve_skills_dir(config: &SkillweaveConfig, data_dir: &Path) -> PathBuf {
    config
        .skills_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("skills"))
}

/// Load configuration from `path`.
///
/// - Missing file: [`SkillweaveConfig::default()`].
/// - Unreadable or unparseable file: a warning and the default.
pub async fn load_config(path: &Path) -> SkillweaveConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return SkillweaveConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return SkillweaveConfig::default();
        }
    };

    match toml::from_str::<SkillweaveConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            SkillweaveConfig::default()
        }
    }
}
