//! Round Logic Module
//!
//! The round state machine and the types it publishes.
//!
//! - `round`: phases, snapshots, lifecycle events, cadence configuration
//! - `engine`: transition functions and the supervised forever-loop

pub mod engine;
pub mod round;

// Re-export key types
pub use engine::{spawn_round_loop, FlightOutcome, RoundEngine, RoundHandle};
pub use round::{RoundConfig, RoundEvent, RoundPhase, RoundSnapshot};
