//! Protocol Messages
//!
//! Wire format for the viewer stream and the HTTP surface. Everything is
//! JSON; the stream frames are a tagged enum so each frame carries its
//! `type` discriminator exactly as clients expect.

use serde::{Deserialize, Serialize};

use crate::game::round::{RoundEvent, RoundSnapshot};

// =============================================================================
// SERVER -> VIEWER STREAM FRAMES
// =============================================================================

/// Frames pushed to viewers over `/ws`.
///
/// The channel is push-only: viewers never send application messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Full state snapshot, sent once immediately after connect so late
    /// joiners reconstruct the round without waiting for the next tick.
    State {
        /// Whether the multiplier is currently rising.
        is_running: bool,
        /// Current multiplier.
        multiplier: f64,
        /// Seconds left in the betting window (0 outside Countdown).
        time: u32,
    },
    /// One countdown tick.
    Countdown {
        /// Seconds left in the betting window.
        time: u32,
    },
    /// Flight has begun.
    Start,
    /// One flight tick.
    Multiplier {
        /// Multiplier after this tick.
        value: f64,
    },
    /// The round crashed.
    End {
        /// Multiplier at the moment of the crash.
        final_multiplier: f64,
    },
}

impl StreamMessage {
    /// Snapshot frame for a newly connected viewer.
    pub fn state(snapshot: &RoundSnapshot) -> Self {
        Self::State {
            is_running: snapshot.is_running(),
            multiplier: snapshot.multiplier,
            time: snapshot.countdown_remaining,
        }
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<RoundEvent> for StreamMessage {
    fn from(event: RoundEvent) -> Self {
        match event {
            RoundEvent::Countdown { time } => Self::Countdown { time },
            RoundEvent::Start => Self::Start,
            RoundEvent::Multiplier { value } => Self::Multiplier { value },
            RoundEvent::End { final_multiplier } => Self::End { final_multiplier },
        }
    }
}

// =============================================================================
// HTTP BODIES
// =============================================================================

/// Body of `POST /topup_balance` and `POST /bet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAction {
    /// Account identifier.
    pub user_id: String,
    /// Amount to deposit or stake.
    pub amount: f64,
}

/// Body of `POST /cashout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutRequest {
    /// Account identifier.
    pub user_id: String,
}

/// Plain status reply (`/topup_balance`, `/bet`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Caller-visible status string.
    pub status: String,
}

impl StatusResponse {
    /// Build a reply from a status string.
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Reply to `GET /balance/{user_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Current balance.
    pub balance: f64,
}

/// Reply to `POST /cashout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutResponse {
    /// Caller-visible status string.
    pub status: String,
    /// Payout, present only on a successful cash-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win: Option<f64>,
}
