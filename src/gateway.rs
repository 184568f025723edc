//! Wager Gateway
//!
//! The externally callable wagering surface. Every action is gated on the
//! latest published round snapshot: wagers are admitted only while the
//! betting window (Countdown) is open, cash-outs only while the multiplier
//! is rising (Flight). Ledger errors are mapped to plain outcomes here;
//! callers never see raw persistence errors.

use std::sync::Arc;

use tokio::sync::watch;

use crate::game::round::RoundSnapshot;
use crate::ledger::{LedgerError, WagerLedger};

/// Result of a bet attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetOutcome {
    /// Stake debited and wager recorded.
    Placed,
    /// Balance below the requested stake.
    InsufficientFunds,
    /// The user already holds an open wager this round.
    AlreadyOpen,
    /// Non-positive stake.
    InvalidAmount,
    /// The round is not in its betting window.
    BettingClosed,
}

/// Result of a cash-out attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CashOutOutcome {
    /// Settled at the multiplier current at call time. `win` is 0 when the
    /// user had no open wager (already settled, or never placed one).
    CashedOut {
        /// Payout credited to the balance.
        win: f64,
    },
    /// The multiplier is not rising; nothing to cash out of.
    NotRunning,
}

/// Phase-gated facade between the request layer and the wager ledger.
pub struct WagerGateway {
    ledger: Arc<WagerLedger>,
    rounds: watch::Receiver<RoundSnapshot>,
}

impl WagerGateway {
    /// Create a gateway over `ledger`, reading round state from `rounds`.
    pub fn new(ledger: Arc<WagerLedger>, rounds: watch::Receiver<RoundSnapshot>) -> Self {
        Self { ledger, rounds }
    }

    /// Credit a top-up to the user's balance.
    pub async fn top_up(&self, user_id: &str, amount: f64) {
        self.ledger.deposit(user_id, amount).await;
    }

    /// Current balance, creating the account on first reference.
    pub async fn query_balance(&self, user_id: &str) -> f64 {
        self.ledger.balance(user_id).await
    }

    /// Place a wager for the current round.
    ///
    /// Admitted only during Countdown, the betting window before Flight
    /// begins; any other phase answers `BettingClosed`.
    pub async fn place_wager(&self, user_id: &str, amount: f64) -> BetOutcome {
        if !self.rounds.borrow().betting_open() {
            return BetOutcome::BettingClosed;
        }

        match self.ledger.open_wager(user_id, amount).await {
            Ok(()) => BetOutcome::Placed,
            Err(LedgerError::InsufficientFunds) => BetOutcome::InsufficientFunds,
            Err(LedgerError::WagerAlreadyOpen) => BetOutcome::AlreadyOpen,
            Err(LedgerError::InvalidAmount) => BetOutcome::InvalidAmount,
            // open_wager never reports a missing wager.
            Err(LedgerError::NoOpenWager) => BetOutcome::BettingClosed,
        }
    }

    /// Cash out at the multiplier current at call time.
    ///
    /// The snapshot is the latest one published, never a value captured
    /// earlier in the request. A crash racing this call settles the wager
    /// first or not at all; either way the ledger pays at most once.
    pub async fn cash_out(&self, user_id: &str) -> CashOutOutcome {
        let snapshot = self.rounds.borrow().clone();
        if !snapshot.is_running() {
            return CashOutOutcome::NotRunning;
        }

        match self.ledger.settle_wager(user_id, snapshot.multiplier).await {
            Ok(win) => CashOutOutcome::CashedOut { win },
            // No wager this round: answer with an empty win rather than an
            // error, matching the response shape callers rely on.
            Err(_) => CashOutOutcome::CashedOut { win: 0.0 },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
