//! Shared domain types for Skillweave.
//!
//! This crate contains the domain types used across the Skillweave workspace:
//! skills and their execution context/results, workflows and steps, lifecycle
//! events, and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod event;
pub mod llm;
pub mod skill;
pub mod workflow;
