//! Generative text service clients.
//!
//! Concrete implementations of the `TextGenerator` trait from
//! skillweave-core.

pub mod anthropic;
