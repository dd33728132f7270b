//! Core deterministic primitives.
//!
//! Nothing in here reads the clock or touches I/O.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_event_seed};
