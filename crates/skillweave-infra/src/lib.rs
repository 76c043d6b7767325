//! Infrastructure layer for Skillweave.
//!
//! Contains the concrete adapters behind the traits defined in
//! `skillweave-core`: configuration loading, the Anthropic text generator,
//! and prompt skills loaded from manifest files.

pub mod config;
pub mod llm;
pub mod skill;
