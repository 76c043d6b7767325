//! Observability for Skillweave: subscriber setup and shared field names.

pub mod attrs;
pub mod tracing_setup;

pub use tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
