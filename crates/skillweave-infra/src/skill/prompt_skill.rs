//! PromptSkill -- a [`Skill`] backed by a manifest and a [`TextGenerator`].
//!
//! The manifest's prompt template is rendered against the execution context,
//! sent to the generator, and the response is turned into the skill output
//! according to the manifest's output format.
//!
//! Template placeholders:
//! - `{{ request }}` -- the request text
//! - `{{ input }}` / `{{ input.<path> }}` -- the structured input
//! - `{{ previous.<skill_id> }}` -- output of an earlier skill in a chain
//! - `{{ history }}` -- prior conversation turns, one per line
//!
//! Missing values render as empty text; unknown placeholders are left as-is.

use std::sync::Arc;

use serde_json::Value;

use skillweave_core::llm::provider::TextGenerator;
use skillweave_core::skill::handler::Skill;
use skillweave_core::skill::registry::{RegistryError, SkillRegistry};
use skillweave_types::llm::GenerationRequest;
use skillweave_types::skill::{
    ExecutionContext, SkillError, SkillErrorCode, SkillMetadata, SkillResult, TurnRole,
};

use super::manifest::{OutputFormat, PromptSkillManifest};

/// A skill whose behavior is entirely described by a manifest.
pub struct PromptSkill<G> {
    manifest: PromptSkillManifest,
    metadata: SkillMetadata,
    generator: Arc<G>,
    default_max_tokens: u32,
}

impl<G: TextGenerator> PromptSkill<G> {
    pub fn new(manifest: PromptSkillManifest, generator: Arc<G>, default_max_tokens: u32) -> Self {
        let metadata = manifest.metadata();
        Self {
            manifest,
            metadata,
            generator,
            default_max_tokens,
        }
    }

    pub fn manifest(&self) -> &PromptSkillManifest {
        &self.manifest
    }

    /// Render the prompt template for `context`.
    pub fn render_prompt(&self, context: &ExecutionContext) -> String {
        let template = self.manifest.prompt.as_str();
        let mut out = String::with_capacity(template.len());
        let mut cursor = 0;

        while let Some(open) = template[cursor..].find("{{") {
            let start = cursor + open;
            let Some(close) = template[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + close + 2;

            out.push_str(&template[cursor..start]);
            match render_placeholder(template[start + 2..end - 2].trim(), context) {
                Some(text) => out.push_str(&text),
                None => out.push_str(&template[start..end]),
            }
            cursor = end;
        }

        out.push_str(&template[cursor..]);
        out
    }

    fn check_required_inputs(&self, context: &ExecutionContext) -> Result<(), SkillError> {
        let missing: Vec<&str> = self
            .manifest
            .required_inputs
            .iter()
            .map(String::as_str)
            .filter(|field| is_missing(&context.input, field))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        Err(SkillError::new(
            SkillErrorCode::InvalidInput,
            format!("missing required input: {}", missing.join(", ")),
        )
        .with_details(serde_json::json!({ "missing": missing })))
    }

    fn parse_output(&self, text: &str) -> Result<Value, SkillError> {
        match self.manifest.output {
            OutputFormat::Text => Ok(Value::String(text.trim().to_string())),
            OutputFormat::Json => {
                let body = strip_code_fences(text);
                serde_json::from_str(body).map_err(|e| {
                    let preview: String = body.chars().take(200).collect();
                    SkillError::execution(format!("model returned invalid JSON: {e}"))
                        .with_details(serde_json::json!({ "preview": preview }))
                })
            }
        }
    }
}

impl<G: TextGenerator + 'static> Skill for PromptSkill<G> {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<SkillResult, SkillError> {
        self.check_required_inputs(context)?;

        let mut request = GenerationRequest::new(
            self.render_prompt(context),
            self.manifest.max_tokens.unwrap_or(self.default_max_tokens),
        );
        request.system = self.manifest.system.clone();
        request.temperature = self.manifest.temperature;

        let response = self.generator.generate(&request).await.map_err(|e| {
            SkillError::new(
                SkillErrorCode::Provider,
                format!("{} request failed: {e}", self.generator.name()),
            )
        })?;

        tracing::debug!(
            skill_id = %self.metadata.id,
            model = %response.model,
            output_tokens = response.output_tokens,
            "prompt skill generated response"
        );

        let output = self.parse_output(&response.content)?;
        Ok(SkillResult::success(
            output,
            format!("{} generated a response", self.metadata.name),
        ))
    }

    fn validate_output(&self, output: &Value) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        match self.manifest.output {
            OutputFormat::Text => {
                if output.as_str().is_none_or(|s| s.trim().is_empty()) {
                    problems.push("output is empty".to_string());
                }
            }
            OutputFormat::Json => {
                if !self.manifest.required_fields.is_empty() {
                    match output.as_object() {
                        Some(map) => problems.extend(
                            self.manifest
                                .required_fields
                                .iter()
                                .filter(|field| map.get(*field).is_none_or(Value::is_null))
                                .map(|field| format!("missing required field '{field}'")),
                        ),
                        None => problems.push("output is not a JSON object".to_string()),
                    }
                }
            }
        }

        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }
}

/// Register one [`PromptSkill`] per manifest, in order.
pub fn register_prompt_skills<G: TextGenerator + 'static>(
    registry: &mut SkillRegistry,
    manifests: impl IntoIterator<Item = PromptSkillManifest>,
    generator: Arc<G>,
    default_max_tokens: u32,
) -> Result<usize, RegistryError> {
    let mut count = 0;
    for manifest in manifests {
        registry.register(PromptSkill::new(manifest, Arc::clone(&generator), default_max_tokens))?;
        count += 1;
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn render_placeholder(expr: &str, context: &ExecutionContext) -> Option<String> {
    let mut segments = expr.split('.');
    let head = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match head {
        "request" if rest.is_empty() => Some(context.request.clone()),
        "history" if rest.is_empty() => Some(
            context
                .history
                .turns()
                .iter()
                .map(|turn| {
                    let role = match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Assistant => "assistant",
                    };
                    format!("{role}: {}", turn.content)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        "input" => Some(lookup(&context.input, &rest).map(value_text).unwrap_or_default()),
        "previous" => {
            let (skill_id, path) = rest.split_first()?;
            Some(
                context
                    .previous_output(skill_id)
                    .and_then(|v| lookup(v, path))
                    .map(value_text)
                    .unwrap_or_default(),
            )
        }
        _ => None,
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_missing(input: &Value, field: &str) -> bool {
    match input.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;
    use skillweave_types::llm::{GenerationResponse, LlmError};
    use skillweave_types::skill::ConversationHistory;

    use super::super::manifest::parse_skill_yaml;

    /// Records requests and replies with a fixed text.
    struct ScriptedGenerator {
        reply: Result<String, ()>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.seen.lock().unwrap().last().unwrap().prompt.clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(GenerationResponse {
                    content: text.clone(),
                    model: "scripted-1".to_string(),
                    input_tokens: 1,
                    output_tokens: 1,
                }),
                Err(()) => Err(LlmError::RateLimited),
            }
        }
    }

    fn manifest(yaml: &str) -> PromptSkillManifest {
        parse_skill_yaml(yaml).unwrap()
    }

    const QUIZ: &str = r#"
id: quiz-maker
name: Quiz maker
triggers: [quiz]
required-inputs: [topic]
output: json
required-fields: [questions]
system: You write quizzes.
max-tokens: 512
prompt: "Quiz on {{ input.topic }} ({{ input.level.name }}) for {{ request }}. Outline: {{ previous.curriculum.units.0 }} {{ unknown.thing }}"
"#;

    const ECHO: &str = r#"
id: echo
name: Echo
triggers: [echo]
prompt: "{{ history }}|{{ request }}"
"#;

    #[test]
    fn render_fills_known_placeholders() {
        let skill = PromptSkill::new(manifest(QUIZ), ScriptedGenerator::replying("{}"), 1024);
        let ctx = ExecutionContext::new("grade 4")
            .with_input(json!({ "topic": "fractions", "level": { "name": "easy" } }))
            .with_previous_output("curriculum", json!({ "units": ["halves", "quarters"] }));

        assert_eq!(
            skill.render_prompt(&ctx),
            "Quiz on fractions (easy) for grade 4. Outline: halves {{ unknown.thing }}"
        );
    }

    #[test]
    fn render_missing_values_as_empty() {
        let skill = PromptSkill::new(manifest(QUIZ), ScriptedGenerator::replying("{}"), 1024);
        let ctx = ExecutionContext::new("r").with_input(json!({ "topic": "t" }));
        assert_eq!(skill.render_prompt(&ctx), "Quiz on t () for r. Outline:  {{ unknown.thing }}");
    }

    #[test]
    fn render_history() {
        let skill = PromptSkill::new(manifest(ECHO), ScriptedGenerator::replying("x"), 1024);
        let mut history = ConversationHistory::default();
        history.push(TurnRole::User, "hi");
        history.push(TurnRole::Assistant, "hello");
        let ctx = ExecutionContext::new("again").with_history(history);
        assert_eq!(skill.render_prompt(&ctx), "user: hi\nassistant: hello|again");
    }

    #[tokio::test]
    async fn execute_parses_fenced_json() {
        let generator = ScriptedGenerator::replying("```json\n{\"questions\": [1, 2]}\n```");
        let skill = PromptSkill::new(manifest(QUIZ), Arc::clone(&generator), 1024);
        let ctx = ExecutionContext::new("quiz me").with_input(json!({ "topic": "fractions" }));

        let result = skill.execute(&ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, json!({ "questions": [1, 2] }));
        assert!(skill.validate_output(&result.output).is_ok());

        let sent = generator.seen.lock().unwrap()[0].clone();
        assert_eq!(sent.max_tokens, 512);
        assert_eq!(sent.system.as_deref(), Some("You write quizzes."));
        assert!(generator.last_prompt().contains("fractions"));
    }

    #[tokio::test]
    async fn execute_rejects_missing_required_input() {
        let generator = ScriptedGenerator::replying("{}");
        let skill = PromptSkill::new(manifest(QUIZ), Arc::clone(&generator), 1024);

        let err = skill.execute(&ExecutionContext::new("quiz me")).await.unwrap_err();
        assert_eq!(err.code, SkillErrorCode::InvalidInput);
        assert!(err.message.contains("topic"));
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn execute_reports_invalid_json() {
        let skill = PromptSkill::new(manifest(QUIZ), ScriptedGenerator::replying("not json"), 1024);
        let ctx = ExecutionContext::new("q").with_input(json!({ "topic": "t" }));

        let err = skill.execute(&ctx).await.unwrap_err();
        assert_eq!(err.code, SkillErrorCode::ExecutionFailed);
        assert!(err.message.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn execute_maps_provider_errors() {
        let skill = PromptSkill::new(manifest(ECHO), ScriptedGenerator::failing(), 1024);
        let err = skill.execute(&ExecutionContext::new("q")).await.unwrap_err();
        assert_eq!(err.code, SkillErrorCode::Provider);
        assert!(err.message.contains("scripted"));
    }

    #[tokio::test]
    async fn text_output_is_trimmed_and_uses_default_tokens() {
        let generator = ScriptedGenerator::replying("  a story  \n");
        let skill = PromptSkill::new(manifest(ECHO), Arc::clone(&generator), 777);

        let result = skill.execute(&ExecutionContext::new("q")).await.unwrap();
        assert_eq!(result.output, json!("a story"));
        assert_eq!(generator.seen.lock().unwrap()[0].max_tokens, 777);
    }

    #[test]
    fn validation_lists_missing_fields() {
        let skill = PromptSkill::new(manifest(QUIZ), ScriptedGenerator::replying("{}"), 1024);
        let problems = skill.validate_output(&json!({ "questions": null })).unwrap_err();
        assert_eq!(problems, vec!["missing required field 'questions'"]);
        assert_eq!(
            skill.validate_output(&json!([1])).unwrap_err(),
            vec!["output is not a JSON object"]
        );

        let text = PromptSkill::new(manifest(ECHO), ScriptedGenerator::replying(""), 1024);
        assert!(text.validate_output(&json!("  ")).is_err());
        assert!(text.validate_output(&json!("ok")).is_ok());
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn registers_every_manifest() {
        let mut registry = SkillRegistry::new();
        let count = register_prompt_skills(
            &mut registry,
            vec![manifest(QUIZ), manifest(ECHO)],
            ScriptedGenerator::replying("x"),
            1024,
        )
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.ids(), vec!["quiz-maker", "echo"]);

        let dup = register_prompt_skills(&mut registry, vec![manifest(ECHO)], ScriptedGenerator::replying("x"), 1024);
        assert!(matches!(dup, Err(RegistryError::Duplicate(_))));
    }
}
