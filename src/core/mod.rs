//! Core deterministic primitives.
//!
//! The round loop's randomness lives here behind the [`rng::RoundRng`] trait
//! so the state machine can be driven deterministically in tests.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, RoundRng};
