//! CLI workflow subcommands: run a definition file, or run a detected skill
//! chain as a tracked workflow.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tracing::Instrument;
use uuid::Uuid;

use skillweave_core::workflow::definition::{load_workflow_file, unknown_skills};
use skillweave_observe::attrs;
use skillweave_types::event::{WorkflowEvent, WorkflowEventType};
use skillweave_types::skill::ExecutionContext;
use skillweave_types::workflow::{StepStatus, Workflow, WorkflowStatus};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Definition files
// ---------------------------------------------------------------------------

pub async fn run_workflow_file(state: &AppState, path: &Path, check: bool, json: bool) -> Result<()> {
    let file = load_workflow_file(path)
        .with_context(|| format!("failed to load workflow {}", path.display()))?;
    let unknown = unknown_skills(&file, &state.registry);

    if check {
        if json {
            let report = serde_json::json!({
                "name": file.name,
                "type": file.workflow_type,
                "steps": file.steps.len(),
                "unknown_skills": unknown,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!();
            println!(
                "{} '{}' ({} steps) is well-formed",
                style("*").green().bold(),
                style(&file.name).cyan(),
                file.steps.len()
            );
        }
        if !unknown.is_empty() {
            bail!("unknown skills: {}", unknown.join(", "));
        }
        return Ok(());
    }

    if !unknown.is_empty() && !json {
        println!(
            "  {} not registered: {} (the workflow will fail at that step)",
            style("!").yellow(),
            unknown.join(", ")
        );
    }

    let workflow = state.orchestrator.create_from_file(file)?;
    drive(state, workflow, json).await
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

/// Detect a chain for `request` and run it as a workflow.
pub async fn run_chain_workflow(state: &AppState, request: &str, json: bool) -> Result<()> {
    let detection = &state.config.detection;
    let chain = state.registry.chain(
        request,
        &ExecutionContext::new(request),
        detection,
        detection.max_chain,
    );
    if chain.is_empty() {
        bail!("no skill chain matched '{request}'");
    }

    let workflow = state.orchestrator.create_chain_workflow(request, &chain)?;
    drive(state, workflow, json).await
}

// ---------------------------------------------------------------------------
// Driving and display
// ---------------------------------------------------------------------------

async fn drive(state: &AppState, workflow: Workflow, json: bool) -> Result<()> {
    let id = workflow.id;
    let orchestrator = &state.orchestrator;

    if !json {
        println!();
        println!(
            "{} {}",
            style("Workflow:").bold(),
            style(short_id(id)).cyan()
        );
        for event in orchestrator.events(id) {
            print_event(&event);
        }
        orchestrator.add_event_listener(id, print_event);
    }

    let span = tracing::info_span!(
        attrs::SPAN_WORKFLOW_RUN,
        workflow_id = %id,
        workflow_type = %workflow.workflow_type
    );
    let driver = orchestrator.execute_workflow(id).instrument(span);
    tokio::pin!(driver);
    let outcome = tokio::select! {
        result = &mut driver => result?,
        _ = tokio::signal::ctrl_c() => {
            // Cancel first so the driver observes it and returns the
            // recorded workflow.
            orchestrator.cancel_workflow(id);
            driver.await?
        }
    };

    if json {
        let out = serde_json::json!({
            "workflow": outcome,
            "events": orchestrator.events(id),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_summary(&outcome);
    }

    if let Some(message) = failure_message(&outcome) {
        bail!(message);
    }
    Ok(())
}

/// Error line for a failed workflow, `None` otherwise.
fn failure_message(workflow: &Workflow) -> Option<String> {
    if workflow.status != WorkflowStatus::Failed {
        return None;
    }
    let reason = workflow
        .errors
        .last()
        .map(|e| {
            let place = e
                .step
                .map_or_else(|| "workflow level".to_string(), |s| format!("step {s}"));
            format!("{place}: {}", e.message)
        })
        .unwrap_or_else(|| "unknown error".to_string());
    Some(format!("workflow '{}' failed at {reason}", workflow.name))
}

fn print_event(event: &WorkflowEvent) {
    let marker = match event.event_type {
        WorkflowEventType::Started | WorkflowEventType::StepStarted => style(">").blue(),
        WorkflowEventType::StepCompleted | WorkflowEventType::Completed => style("*").green(),
        WorkflowEventType::StepFailed | WorkflowEventType::Failed => style("x").red(),
    };
    let step = event.step.map(|s| format!("[{s}] ")).unwrap_or_default();
    println!("  {marker} {}{}", style(step).dim(), event.message);
}

fn print_summary(workflow: &Workflow) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Skill"),
            Cell::new("Status"),
            Cell::new("Duration"),
        ]);

    for step in &workflow.steps {
        table.add_row(vec![
            Cell::new(step.ordinal),
            Cell::new(&step.skill_id),
            format_step_status(step.status),
            Cell::new(
                step.duration_ms
                    .map(|ms| format!("{ms} ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  Status: {}  {}",
        format_status(workflow.status),
        style(
            workflow
                .total_duration_ms
                .map(|ms| format!("({ms} ms)"))
                .unwrap_or_default()
        )
        .dim()
    );

    if let Some((ordinal, output)) = workflow.results.iter().next_back() {
        println!();
        println!("  {}", style(format!("Output of step {ordinal}:")).bold());
        match output {
            serde_json::Value::String(text) => println!("{text}"),
            other => println!(
                "{}",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }
    println!();
}

fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn format_status(status: WorkflowStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        WorkflowStatus::Pending => style(text).yellow(),
        WorkflowStatus::Running => style(text).blue(),
        WorkflowStatus::Paused => style(text).magenta(),
        WorkflowStatus::Completed => style(text).green(),
        WorkflowStatus::Failed => style(text).red(),
    }
}

fn format_step_status(status: StepStatus) -> Cell {
    match status {
        StepStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        StepStatus::Running => Cell::new("running").fg(Color::Blue),
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_workflow(step: Option<u32>) -> Workflow {
        let mut workflow = Workflow::new(
            "game",
            "demo",
            vec![skillweave_types::workflow::StepSpec::new("a", "", serde_json::json!({}))],
        );
        workflow.status = WorkflowStatus::Failed;
        workflow.errors.push(skillweave_types::workflow::WorkflowErrorRecord {
            step,
            code: "CANCELLED".to_string(),
            message: "workflow cancelled".to_string(),
            recoverable: false,
            timestamp: chrono::Utc::now(),
        });
        workflow
    }

    #[test]
    fn failure_message_without_step() {
        assert_eq!(
            failure_message(&failed_workflow(None)).as_deref(),
            Some("workflow 'demo' failed at workflow level: workflow cancelled")
        );
    }

    #[test]
    fn failure_message_names_step() {
        assert_eq!(
            failure_message(&failed_workflow(Some(1))).as_deref(),
            Some("workflow 'demo' failed at step 1: workflow cancelled")
        );
    }

    #[test]
    fn no_failure_message_for_pending() {
        let workflow = Workflow::new(
            "game",
            "demo",
            vec![skillweave_types::workflow::StepSpec::new("a", "", serde_json::json!({}))],
        );
        assert!(failure_message(&workflow).is_none());
    }

    #[test]
    fn short_id_is_eight_chars() {
        assert_eq!(short_id(Uuid::now_v7()).len(), 8);
    }

    #[test]
    fn summary_renders_pending_steps() {
        let workflow = Workflow::new(
            "game",
            "demo",
            vec![skillweave_types::workflow::StepSpec::new("a", "", serde_json::json!({}))],
        );
        print_summary(&workflow);
        assert_eq!(workflow.steps[0].status, StepStatus::Pending);
    }
}
