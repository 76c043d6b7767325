//! Generative text service abstraction.
//!
//! - `TextGenerator`: RPITIT trait implemented by concrete clients in
//!   skillweave-infra and by mocks in tests.

pub mod provider;

pub use provider::TextGenerator;
