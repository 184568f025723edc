//! # Aviator Game Server
//!
//! Authoritative server for a continuously repeating crash game: a countdown,
//! a rising multiplier that ends unpredictably, and a settlement step, pushed
//! live to every connected viewer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AVIATOR SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG, pluggable round RNG    │
//! │                                                              │
//! │  game/           - Round logic                               │
//! │  ├── round.rs    - Phases, snapshots, events, cadence config │
//! │  └── engine.rs   - Round state machine + supervised loop     │
//! │                                                              │
//! │  ledger/         - Balances and wagers                       │
//! │  ├── store.rs    - Transactional account/wager tables        │
//! │  └── mod.rs      - Wager ledger facade (atomic operations)   │
//! │                                                              │
//! │  gateway.rs      - Phase-gated bet / cash-out surface        │
//! │                                                              │
//! │  network/        - External interface                        │
//! │  ├── protocol.rs - Wire messages (HTTP bodies, stream frames)│
//! │  ├── hub.rs      - Viewer registry and event fan-out         │
//! │  └── server.rs   - axum router: REST endpoints + /ws         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! One supervised task owns the round state and drives it through
//! Countdown → Flight → Crash forever. Every transition is published as an
//! immutable [`RoundSnapshot`](game::round::RoundSnapshot) on a `watch`
//! channel, so request handlers and viewers always observe a consistent
//! phase/multiplier pair, never a torn read. All balance and wager mutations
//! go through the [`WagerLedger`](ledger::WagerLedger), where each operation
//! is a single store transaction: concurrent cash-outs and the crash-time
//! zero-payout settlement race safely, and exactly one settlement wins.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod gateway;
pub mod ledger;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::{DeterministicRng, RoundRng};
pub use game::engine::{spawn_round_loop, RoundEngine, RoundHandle};
pub use game::round::{RoundConfig, RoundEvent, RoundPhase, RoundSnapshot};
pub use gateway::WagerGateway;
pub use ledger::{LedgerError, WagerLedger};
pub use network::hub::BroadcastHub;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Betting window length (seconds)
pub const COUNTDOWN_SECS: u32 = 10;

/// Flight tick interval (milliseconds)
pub const FLIGHT_TICK_MS: u64 = 100;

/// Pause between crash and the next countdown (seconds)
pub const CRASH_PAUSE_SECS: u64 = 2;
