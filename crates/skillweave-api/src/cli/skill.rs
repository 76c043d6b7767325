//! CLI skill subcommands: list, detect, and run.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tracing::Instrument;

use skillweave_observe::attrs;
use skillweave_types::skill::{DetectedSkill, ExecutionContext, SkillResult};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub fn list_skills(state: &AppState, json: bool) -> Result<()> {
    let skills: Vec<_> = state.registry.metadata().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
        return Ok(());
    }

    if skills.is_empty() {
        println!();
        println!("  No skills registered.");
        println!(
            "  Add manifests to: {}",
            style(state.skills_dir.display()).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Id").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Triggers"),
            Cell::new("Capabilities"),
        ]);

    for meta in &skills {
        table.add_row(vec![
            Cell::new(&meta.id),
            Cell::new(&meta.name),
            Cell::new(meta.triggers.join(", ")),
            Cell::new(meta.capabilities.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Detect
// ---------------------------------------------------------------------------

pub fn detect(state: &AppState, request: &str, json: bool) -> Result<()> {
    let context = ExecutionContext::new(request);
    let candidates = state
        .registry
        .detect(request, &context, &state.config.detection);

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    if candidates.is_empty() {
        println!();
        println!("  No skill matched '{}'.", style(request).cyan());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", detection_table(&candidates));
    println!();

    Ok(())
}

fn detection_table(candidates: &[DetectedSkill]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Skill").fg(Color::Cyan),
            Cell::new("Confidence"),
            Cell::new("Auto"),
            Cell::new("Reason"),
        ]);

    for candidate in candidates {
        let auto = if candidate.auto_select {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("-")
        };
        table.add_row(vec![
            Cell::new(&candidate.skill_id),
            Cell::new(format!("{:.0}", candidate.confidence)),
            auto,
            Cell::new(&candidate.reason),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn run(state: &AppState, request: &str, input: Option<&str>, json: bool) -> Result<()> {
    let input = parse_input(input)?;
    let context = ExecutionContext::new(request).with_input(input);

    let span = tracing::info_span!(attrs::SPAN_SKILL_DISPATCH, request_len = request.len());
    let result = state.dispatcher.handle(&context).instrument(span).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        bail!("{}", result.failure_summary());
    }
    Ok(())
}

/// Parse `--input`; absent means an empty object.
fn parse_input(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value = serde_json::from_str(raw).context("--input must be valid JSON")?;
    if !value.is_object() {
        bail!("--input must be a JSON object");
    }
    Ok(value)
}

fn print_result(result: &SkillResult) {
    println!();
    if result.success {
        println!("{} {}", style("*").green().bold(), result.message);
    } else {
        println!("{} {}", style("x").red().bold(), style(&result.message).red());
    }

    let meta = &result.metadata;
    let mut facts = vec![format!("{} ms", meta.duration_ms), format!("{} attempt(s)", meta.attempts)];
    if let Some(confidence) = meta.confidence {
        facts.push(format!("confidence {confidence:.0}"));
    }
    println!("  {}", style(facts.join(" | ")).dim());

    if !meta.suggested_next.is_empty() {
        println!("  Also matched: {}", style(meta.suggested_next.join(", ")).cyan());
    }
    for warning in &meta.warnings {
        println!("  {} {warning}", style("!").yellow());
    }
    for problem in &result.validation_errors {
        println!("  {} {problem}", style("!").yellow());
    }

    if result.success {
        println!();
        match &result.output {
            Value::String(text) => println!("{text}"),
            other => println!(
                "{}",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }
    println!();
}
