//! Prompt skill manifests.
//!
//! A prompt skill is declared in one of two forms:
//!
//! - `SKILL.md` (or any `*.md`): YAML frontmatter delimited by `---`,
//!   followed by a markdown body that is the prompt template.
//! - `*.yaml` / `*.yml`: the same fields with the template under `prompt`.
//!
//! ```text
//! ---
//! id: quiz-maker
//! name: Quiz maker
//! triggers: [quiz, assessment, test]
//! required-inputs: [topic]
//! output: json
//! required-fields: [questions]
//! ---
//! Write a quiz about {{ input.topic }} for: {{ request }}
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use skillweave_types::skill::SkillMetadata;

/// How a prompt skill's generated text becomes its output value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The trimmed text as a JSON string.
    #[default]
    Text,
    /// The text parsed as JSON (code fences are stripped first).
    Json,
}

/// Declarative description of a prompt-backed skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PromptSkillManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Fields that must be present (and non-empty strings) in the step input.
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub output: OutputFormat,
    /// Top-level fields a JSON output must contain.
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Prompt template. Filled from the markdown body for `.md` manifests.
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl PromptSkillManifest {
    /// Registry metadata for this manifest.
    pub fn metadata(&self) -> SkillMetadata {
        let mut meta = SkillMetadata::new(&self.id, &self.name)
            .with_description(&self.description)
            .with_triggers(self.triggers.iter().cloned())
            .with_capabilities(self.capabilities.iter().cloned());
        meta.examples = self.examples.clone();
        meta
    }
}

/// Extract YAML frontmatter and markdown body from a `.md` manifest.
///
/// Content must start with `---`, and a closing `\n---` separates the YAML
/// from the body. Returns `(yaml, body)` with the body's leading blank lines
/// removed.
pub fn extract_frontmatter(content: &str) -> anyhow::Result<(&str, &str)> {
    let Some(after_open) = content.strip_prefix("---") else {
        bail!("skill manifest must start with YAML frontmatter delimiter '---'");
    };
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    let closing_pos = after_open
        .find("\n---")
        .context("skill manifest missing closing frontmatter delimiter '---'")?;

    let yaml = &after_open[..closing_pos];
    let remainder = &after_open[closing_pos + 4..];
    let body = remainder
        .strip_prefix('\n')
        .unwrap_or(remainder)
        .trim_start_matches('\n');

    Ok((yaml, body))
}

/// Parse a `.md` manifest: frontmatter fields plus the body as the prompt.
pub fn parse_skill_md(content: &str) -> anyhow::Result<PromptSkillManifest> {
    let (yaml, body) = extract_frontmatter(content)?;
    let mut manifest: PromptSkillManifest =
        serde_yaml_ng::from_str(yaml).context("failed to parse skill manifest frontmatter")?;
    if manifest.prompt.trim().is_empty() {
        manifest.prompt = body.trim_end().to_string();
    }
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Parse a `.yaml` manifest.
pub fn parse_skill_yaml(content: &str) -> anyhow::Result<PromptSkillManifest> {
    let manifest: PromptSkillManifest =
        serde_yaml_ng::from_str(content).context("failed to parse skill manifest YAML")?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Validate a parsed manifest.
///
/// Checks:
/// - `id` is a slug (lowercase letters, digits, hyphens; no leading or
///   trailing hyphen)
/// - `name` and `prompt` are non-empty
/// - `required-fields` is only used with JSON output
pub fn validate_manifest(manifest: &PromptSkillManifest) -> anyhow::Result<()> {
    if manifest.id.is_empty() {
        bail!("skill id must not be empty");
    }

    let is_valid_slug = manifest
        .id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !is_valid_slug {
        bail!(
            "skill id '{}' must contain only lowercase letters, digits, and hyphens",
            manifest.id
        );
    }
    if manifest.id.starts_with('-') || manifest.id.ends_with('-') {
        bail!("skill id '{}' must not start or end with a hyphen", manifest.id);
    }

    if manifest.name.trim().is_empty() {
        bail!("skill '{}' has an empty name", manifest.id);
    }
    if manifest.prompt.trim().is_empty() {
        bail!("skill '{}' has an empty prompt template", manifest.id);
    }

    if manifest.output == OutputFormat::Text && !manifest.required_fields.is_empty() {
        bail!(
            "skill '{}' declares required-fields but its output format is text",
            manifest.id
        );
    }

    if manifest.triggers.is_empty() {
        tracing::warn!(skill_id = %manifest.id, "skill has no triggers and will never be detected");
    }

    Ok(())
}

/// Load one manifest file, choosing the parser by extension.
pub fn load_manifest(path: &Path) -> anyhow::Result<PromptSkillManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("md") => parse_skill_md(&content),
        Some("yaml" | "yml") => parse_skill_yaml(&content),
        _ => bail!("unsupported manifest file {}", path.display()),
    };
    parsed.with_context(|| format!("invalid skill manifest {}", path.display()))
}

/// Load every manifest under `dir`.
///
/// Picks up `*.yaml`, `*.yml`, and `*.md` files directly in `dir` plus
/// `<subdir>/SKILL.md`. Results are sorted by path so registration order is
/// stable. A missing directory yields an empty list; any invalid manifest
/// is an error.
pub fn load_manifests_dir(dir: &Path) -> anyhow::Result<Vec<(PathBuf, PromptSkillManifest)>> {
    if !dir.exists() {
        tracing::debug!("No skills directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            let nested = path.join("SKILL.md");
            if nested.is_file() {
                paths.push(nested);
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "md")
        {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| load_manifest(&path).map(|manifest| (path, manifest)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ_MD: &str = r#"---
id: quiz-maker
name: Quiz maker
description: Builds multiple-choice quizzes
triggers: [quiz, assessment, test]
capabilities: [assessment]
required-inputs: [topic]
output: json
required-fields: [questions]
max-tokens: 2048
---

Write a quiz about {{ input.topic }}.

Request: {{ request }}
"#;

    const STORY_YAML: &str = r#"
id: story-writer
name: Story writer
triggers: [story]
prompt: "Tell a story about {{ request }}"
"#;

    #[test]
    fn parse_md_uses_body_as_prompt() {
        let manifest = parse_skill_md(QUIZ_MD).unwrap();
        assert_eq!(manifest.id, "quiz-maker");
        assert_eq!(manifest.output, OutputFormat::Json);
        assert_eq!(manifest.required_inputs, vec!["topic"]);
        assert_eq!(manifest.required_fields, vec!["questions"]);
        assert_eq!(manifest.max_tokens, Some(2048));
        assert!(manifest.prompt.starts_with("Write a quiz about {{ input.topic }}."));
        assert!(manifest.prompt.ends_with("Request: {{ request }}"));
    }

    #[test]
    fn parse_yaml_defaults_to_text_output() {
        let manifest = parse_skill_yaml(STORY_YAML).unwrap();
        assert_eq!(manifest.output, OutputFormat::Text);
        assert!(manifest.required_inputs.is_empty());
        assert_eq!(manifest.prompt, "Tell a story about {{ request }}");
    }

    #[test]
    fn metadata_carries_registry_fields() {
        let meta = parse_skill_md(QUIZ_MD).unwrap().metadata();
        assert_eq!(meta.id, "quiz-maker");
        assert_eq!(meta.triggers, vec!["quiz", "assessment", "test"]);
        assert_eq!(meta.capabilities, vec!["assessment"]);
    }

    #[test]
    fn frontmatter_is_required() {
        let err = parse_skill_md("id: x\n").unwrap_err();
        assert!(err.to_string().contains("frontmatter"));

        let err = parse_skill_md("---\nid: x\nname: y\n").unwrap_err();
        assert!(err.to_string().contains("closing"));
    }

    #[test]
    fn validation_rejects_bad_manifests() {
        let bad_id = STORY_YAML.replace("story-writer", "Story_Writer");
        assert!(parse_skill_yaml(&bad_id).is_err());

        let hyphen = STORY_YAML.replace("story-writer", "-story");
        assert!(parse_skill_yaml(&hyphen).is_err());

        let no_prompt = "id: a\nname: A\n";
        let err = parse_skill_yaml(no_prompt).unwrap_err();
        assert!(err.to_string().contains("empty prompt"));

        let fields_on_text = format!("{STORY_YAML}required-fields: [title]\n");
        assert!(parse_skill_yaml(&fields_on_text).is_err());
    }

    #[test]
    fn load_dir_collects_all_forms_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("story.yaml"), STORY_YAML).unwrap();
        std::fs::create_dir(dir.path().join("quiz")).unwrap();
        std::fs::write(dir.path().join("quiz").join("SKILL.md"), QUIZ_MD).unwrap();
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let loaded = load_manifests_dir(dir.path()).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|(_, m)| m.id.as_str()).collect();
        assert_eq!(ids, vec!["quiz-maker", "story-writer"]);
    }

    #[test]
    fn load_dir_reports_invalid_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "id: [").unwrap();

        let err = load_manifests_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.yaml"));
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifests_dir(&dir.path().join("nope")).unwrap().is_empty());
    }
}
