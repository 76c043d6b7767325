//! Workflow definition files: YAML parsing, validation, and discovery.
//!
//! A definition file is a [`WorkflowFile`]:
//!
//! ```yaml
//! type: game
//! name: Fractions adventure
//! steps:
//!   - skill_id: game-designer
//!     description: design the game
//!     input: { request: "a fractions game" }
//!   - skill_id: game-builder
//!     input: { design: "{{ steps.1.output }}" }
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use skillweave_types::workflow::WorkflowFile;

use crate::skill::registry::SkillRegistry;

use super::template::TemplateResolver;

/// Errors raised while loading or validating a definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Parse and validate a YAML definition.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowFile, DefinitionError> {
    let file: WorkflowFile =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_definition(&file)?;
    Ok(file)
}

pub fn serialize_workflow_yaml(file: &WorkflowFile) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(file).map_err(|e| DefinitionError::ParseError(e.to_string()))
}

/// Structural checks:
/// - the name is not blank
/// - there is at least one step
/// - every step names a skill
/// - step inputs only reference earlier steps
pub fn validate_definition(file: &WorkflowFile) -> Result<(), DefinitionError> {
    if file.name.trim().is_empty() {
        return Err(DefinitionError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if file.steps.is_empty() {
        return Err(DefinitionError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    for (idx, step) in file.steps.iter().enumerate() {
        let ordinal = idx as u32 + 1;
        if step.skill_id.trim().is_empty() {
            return Err(DefinitionError::ValidationError(format!(
                "step {ordinal} has no skill_id"
            )));
        }
        if let Some(bad) = TemplateResolver::referenced_steps(&step.input)
            .into_iter()
            .find(|&r| r == 0 || r >= ordinal)
        {
            return Err(DefinitionError::ValidationError(format!(
                "step {ordinal} references step {bad}, only earlier steps may be referenced"
            )));
        }
    }

    Ok(())
}

/// Skill ids referenced by `file` that `registry` does not know, in step order.
pub fn unknown_skills(file: &WorkflowFile, registry: &SkillRegistry) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for step in &file.steps {
        if !registry.contains(&step.skill_id) && !unknown.contains(&step.skill_id) {
            unknown.push(step.skill_id.clone());
        }
    }
    unknown
}

pub fn load_workflow_file(path: &Path) -> Result<WorkflowFile, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a definition, creating parent directories as needed.
pub fn save_workflow_file(path: &Path, file: &WorkflowFile) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_workflow_yaml(file)?)?;
    Ok(())
}

/// Load every `.yaml`/`.yml` definition directly under `dir`, sorted by path.
///
/// Files that fail to parse are skipped with a warning. A missing directory
/// yields an empty list.
pub fn discover_workflows(dir: &Path) -> Result<Vec<(PathBuf, WorkflowFile)>, DefinitionError> {
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !path.is_file() || !is_yaml {
            continue;
        }
        match load_workflow_file(&path) {
            Ok(file) => found.push((path, file)),
            Err(e) => tracing::warn!(?path, error = %e, "skipping unparseable workflow file"),
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillweave_types::workflow::StepSpec;

    const GAME_YAML: &str = r#"
type: game
name: Fractions adventure
steps:
  - skill_id: game-designer
    description: design the game
    input:
      request: a fractions game
  - skill_id: game-builder
    input:
      design: "{{ steps.1.output }}"
"#;

    #[test]
    fn parses_valid_definition() {
        let file = parse_workflow_yaml(GAME_YAML).unwrap();
        assert_eq!(file.workflow_type, "game");
        assert_eq!(file.steps.len(), 2);
        assert_eq!(file.steps[1].input["design"], json!("{{ steps.1.output }}"));
        assert_eq!(file.steps[1].description, "");
    }

    #[test]
    fn rejects_forward_and_self_references() {
        let yaml = r#"
type: game
name: loops
steps:
  - skill_id: a
    input: { x: "{{ steps.1.output }}" }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("references step 1"), "{err}");

        let yaml = r#"
type: game
name: forward
steps:
  - skill_id: a
  - skill_id: b
    input: { x: "{{ steps.3.output }}" }
  - skill_id: c
"#;
        assert!(matches!(parse_workflow_yaml(yaml), Err(DefinitionError::ValidationError(_))));
    }

    #[test]
    fn rejects_empty_steps_and_blank_skill() {
        assert!(parse_workflow_yaml("type: game\nname: x\nsteps: []\n").is_err());
        let yaml = "type: game\nname: x\nsteps:\n  - skill_id: ' '\n";
        assert!(parse_workflow_yaml(yaml).unwrap_err().to_string().contains("no skill_id"));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        assert!(matches!(
            parse_workflow_yaml("type: [unclosed"),
            Err(DefinitionError::ParseError(_))
        ));
    }

    #[test]
    fn reports_unknown_skills_once() {
        let registry = SkillRegistry::new();
        let file = WorkflowFile {
            workflow_type: "game".into(),
            name: "x".into(),
            steps: vec![
                StepSpec::new("a", "", json!({})),
                StepSpec::new("a", "", json!({})),
                StepSpec::new("b", "", json!({})),
            ],
        };
        assert_eq!(unknown_skills(&file, &registry), vec!["a", "b"]);
    }

    #[test]
    fn save_load_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let file = parse_workflow_yaml(GAME_YAML).unwrap();

        save_workflow_file(&dir.path().join("nested/game.yaml"), &file).unwrap();
        save_workflow_file(&dir.path().join("b.yml"), &file).unwrap();
        std::fs::write(dir.path().join("a.yaml"), "not: [valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_workflow_file(&dir.path().join("nested/game.yaml")).unwrap();
        assert_eq!(loaded, file);

        let found = discover_workflows(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("b.yml"));

        assert!(discover_workflows(&dir.path().join("missing")).unwrap().is_empty());
    }
}
