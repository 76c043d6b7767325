//! Application state wiring all services together.
//!
//! AppState loads the configuration and skill manifests, pins the prompt
//! skills to the Anthropic client, and builds the dispatcher and the workflow
//! orchestrator over one shared registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;

use skillweave_core::skill::{Dispatcher, SkillRegistry};
use skillweave_core::workflow::{RetryPolicy, WorkflowOrchestrator};
use skillweave_infra::config::{default_config_path, load_config, resolve_data_dir, resolve_skills_dir};
use skillweave_infra::llm::anthropic::AnthropicClient;
use skillweave_infra::skill::{load_manifests_dir, register_prompt_skills};
use skillweave_types::config::SkillweaveConfig;
use skillweave_types::llm::LlmError;

/// Shared application state used by every command.
pub struct AppState {
    pub config: SkillweaveConfig,
    pub skills_dir: PathBuf,
    pub registry: Arc<SkillRegistry>,
    pub dispatcher: Dispatcher,
    pub orchestrator: Arc<WorkflowOrchestrator>,
}

impl AppState {
    /// Initialize the application state.
    ///
    /// `needs_generator` is set by commands that execute skills; for those a
    /// missing API key is an error. Listing and detection only need metadata.
    pub async fn init(config_path: Option<&Path>, needs_generator: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_config_path(&data_dir));
        let config = load_config(&config_path).await;

        Self::from_config(config, &data_dir, needs_generator)
    }

    pub fn from_config(
        config: SkillweaveConfig,
        data_dir: &Path,
        needs_generator: bool,
    ) -> anyhow::Result<Self> {
        let skills_dir = resolve_skills_dir(&config, data_dir);
        let manifests = load_manifests_dir(&skills_dir)?;
        tracing::debug!(count = manifests.len(), dir = %skills_dir.display(), "loaded skill manifests");

        let generator = Arc::new(build_client(&config, needs_generator)?);

        let mut registry = SkillRegistry::new();
        register_prompt_skills(
            &mut registry,
            manifests.into_iter().map(|(_, manifest)| manifest),
            generator,
            config.llm.max_tokens,
        )
        .context("failed to register skills")?;
        let registry = registry.into_shared();

        let retry = RetryPolicy::from(&config.retry);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), config.detection.clone(), retry.clone());
        let orchestrator = Arc::new(WorkflowOrchestrator::new(Arc::clone(&registry), retry));

        Ok(Self {
            config,
            skills_dir,
            registry,
            dispatcher,
            orchestrator,
        })
    }
}

/// Build the text generator. Without a key, commands that never call the
/// service get a client that would be rejected by the server.
fn build_client(config: &SkillweaveConfig, needs_generator: bool) -> anyhow::Result<AnthropicClient> {
    match AnthropicClient::from_config(&config.llm) {
        Ok(client) => Ok(client),
        Err(LlmError::MissingApiKey(var)) if !needs_generator => {
            tracing::debug!("{var} is not set; skills can be listed but not run");
            Ok(AnthropicClient::new(SecretString::from(String::new()), config.llm.model.clone())?
                .with_base_url(config.llm.base_url.clone()))
        }
        Err(e) => Err(e).context("cannot reach the text generation service"),
    }
}
