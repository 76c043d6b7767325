//! Per-workflow lifecycle event delivery.
//!
//! `WorkflowEventHub` keeps an append-only log per workflow id and fans each
//! event out to synchronous callbacks and unbounded channel subscribers.

pub mod hub;

pub use hub::{EventListener, WorkflowEventHub};
