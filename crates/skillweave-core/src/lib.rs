//! Business logic for Skillweave.
//!
//! This crate owns the orchestration core: the skill trait and registry, the
//! retry/backoff execution wrapper, the template resolution engine, and the
//! workflow orchestrator with its per-workflow event hub. It depends only on
//! `skillweave-types` -- HTTP clients and file loading live in
//! `skillweave-infra`.

pub mod event;
pub mod llm;
pub mod skill;
pub mod workflow;
