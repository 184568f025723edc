//! Round Types
//!
//! Phases, published snapshots, lifecycle events, and cadence configuration
//! for the crash-game round.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{COUNTDOWN_SECS, CRASH_PAUSE_SECS, FLIGHT_TICK_MS};

/// Phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Betting window: the countdown is running, wagers are accepted.
    Countdown,
    /// The multiplier is rising; cash-outs are accepted.
    Flight,
    /// The round has crashed; open wagers are forfeited, then a short pause.
    Crash,
}

/// A consistent view of the round state at one instant.
///
/// Produced only by the round engine and published whole on a `watch`
/// channel; readers never see phase and multiplier from different moments.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    /// Current phase.
    pub phase: RoundPhase,
    /// Seconds left in the betting window (0 outside Countdown).
    pub countdown_remaining: u32,
    /// Current multiplier (1.0 at round start, final value during Crash).
    pub multiplier: f64,
}

impl RoundSnapshot {
    /// Snapshot for a process that has not started a round yet.
    pub fn initial(config: &RoundConfig) -> Self {
        Self {
            phase: RoundPhase::Countdown,
            countdown_remaining: config.countdown_secs,
            multiplier: 1.0,
        }
    }

    /// True while the multiplier is rising and cash-outs are admitted.
    pub fn is_running(&self) -> bool {
        self.phase == RoundPhase::Flight
    }

    /// True while wagers are admitted.
    pub fn betting_open(&self) -> bool {
        self.phase == RoundPhase::Countdown
    }
}

/// Lifecycle event emitted by the round engine.
///
/// Converted to wire frames at the network boundary; see
/// [`StreamMessage`](crate::network::protocol::StreamMessage).
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// One countdown tick, carrying the seconds remaining.
    Countdown {
        /// Seconds left in the betting window.
        time: u32,
    },
    /// Flight has begun; emitted exactly once per round.
    Start,
    /// One flight tick, carrying the new multiplier.
    Multiplier {
        /// Multiplier after this tick's increment.
        value: f64,
    },
    /// The round crashed; emitted exactly once per round.
    End {
        /// Multiplier at the moment of the crash.
        final_multiplier: f64,
    },
}

/// Cadence and randomness parameters for a round.
///
/// Defaults reproduce the production game; tests shrink the timings and
/// script the randomness.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Betting window length in seconds.
    pub countdown_secs: u32,
    /// Interval between flight ticks.
    pub flight_tick: Duration,
    /// Pause between the crash and the next countdown.
    pub crash_pause: Duration,
    /// Smallest per-tick multiplier increment.
    pub increment_min: f64,
    /// Largest per-tick multiplier increment.
    pub increment_max: f64,
    /// Probability that any given flight tick ends the round.
    pub crash_probability: f64,
    /// Multiplier above which the round is forced to crash.
    pub multiplier_ceiling: f64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            countdown_secs: COUNTDOWN_SECS,
            flight_tick: Duration::from_millis(FLIGHT_TICK_MS),
            crash_pause: Duration::from_secs(CRASH_PAUSE_SECS),
            increment_min: 0.01,
            increment_max: 0.05,
            crash_probability: 0.01,
            multiplier_ceiling: 100.0,
        }
    }
}
