//! Wager Ledger Facade
//!
//! The only access path to the ledger store. Each operation is a single
//! store transaction, which is what upholds the invariants the rest of the
//! system leans on: a debit never commits without its wager row, a user
//! holds at most one open wager per round, and a wager settles exactly once
//! no matter how many settlement attempts race.

pub mod store;

use thiserror::Error;

pub use store::{LedgerStore, LedgerTables, WagerRecord};

/// Ledger operation failures surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Balance is lower than the requested stake.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The user already holds an unsettled wager this round.
    #[error("wager already open")]
    WagerAlreadyOpen,

    /// The user has no wager row this round.
    #[error("no open wager")]
    NoOpenWager,

    /// Stake must be strictly positive.
    #[error("invalid amount")]
    InvalidAmount,
}

/// Counts reported by [`WagerLedger::close_round`] for the round log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSettlement {
    /// Open wagers forfeited at zero payout.
    pub forfeited: usize,
    /// Total wager rows cleared (settled and forfeited).
    pub cleared: usize,
}

/// Facade over the ledger store.
pub struct WagerLedger {
    store: LedgerStore,
}

impl Default for WagerLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl WagerLedger {
    /// Create a facade over an empty store.
    pub fn new() -> Self {
        Self {
            store: LedgerStore::new(),
        }
    }

    /// Current balance, creating the account at zero on first reference.
    pub async fn balance(&self, user_id: &str) -> f64 {
        self.store.write(|t| t.balance_or_create(user_id)).await
    }

    /// Add `amount` to the balance. Used for top-ups.
    pub async fn deposit(&self, user_id: &str, amount: f64) {
        self.store.write(|t| t.credit(user_id, amount)).await
    }

    /// Debit the stake and record an open wager, atomically.
    pub async fn open_wager(&self, user_id: &str, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.store
            .write(|t| {
                if t.has_open_wager(user_id) {
                    return Err(LedgerError::WagerAlreadyOpen);
                }
                if t.balance_or_create(user_id) < amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                t.credit(user_id, -amount);
                t.insert_wager(user_id, amount);
                Ok(())
            })
            .await
    }

    /// Settle the user's wager at `multiplier`, crediting the payout.
    ///
    /// Idempotent: the first settlement wins, and a second call for an
    /// already-settled wager returns a payout of 0 with no balance change.
    /// Fails with [`LedgerError::NoOpenWager`] only when the user has no
    /// wager row at all this round.
    pub async fn settle_wager(&self, user_id: &str, multiplier: f64) -> Result<f64, LedgerError> {
        self.store
            .write(|t| {
                let wager = t.wager_mut(user_id).ok_or(LedgerError::NoOpenWager)?;
                if wager.settled {
                    return Ok(0.0);
                }
                wager.settled = true;
                wager.multiplier = multiplier;
                let payout = wager.amount * multiplier;
                if payout > 0.0 {
                    t.credit(user_id, payout);
                }
                Ok(payout)
            })
            .await
    }

    /// Drop all wager rows for the round. Balances are untouched.
    pub async fn clear_round(&self) -> usize {
        self.store.write(|t| t.clear_wagers()).await
    }

    /// Crash-time settlement: forfeit every open wager at zero payout and
    /// clear all wager rows, in one transaction.
    ///
    /// A cash-out racing with this either settles first (and wins) or finds
    /// its wager gone and pays nothing; it can never be paid twice.
    pub async fn close_round(&self) -> RoundSettlement {
        self.store
            .write(|t| {
                let open = t.open_wager_users();
                for user_id in &open {
                    if let Some(wager) = t.wager_mut(user_id) {
                        wager.settled = true;
                        wager.multiplier = 0.0;
                    }
                }
                RoundSettlement {
                    forfeited: open.len(),
                    cleared: t.clear_wagers(),
                }
            })
            .await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deposit_balance_round_trip() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        assert_eq!(ledger.balance("u").await, 100.0);
    }

    #[tokio::test]
    async fn test_balance_creates_account_once() {
        let ledger = WagerLedger::new();
        assert_eq!(ledger.balance("new").await, 0.0);
        assert_eq!(ledger.balance("new").await, 0.0);
    }

    #[tokio::test]
    async fn test_open_wager_debits_stake() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;

        ledger.open_wager("u", 40.0).await.unwrap();
        assert_eq!(ledger.balance("u").await, 60.0);
    }

    #[tokio::test]
    async fn test_open_wager_insufficient_funds() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 10.0).await;

        let result = ledger.open_wager("u", 40.0).await;
        assert_eq!(result, Err(LedgerError::InsufficientFunds));
        // Failed open must not touch the balance.
        assert_eq!(ledger.balance("u").await, 10.0);
    }

    #[tokio::test]
    async fn test_second_open_wager_rejected() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;

        ledger.open_wager("u", 30.0).await.unwrap();
        let result = ledger.open_wager("u", 30.0).await;
        assert_eq!(result, Err(LedgerError::WagerAlreadyOpen));
        // Only the first stake was debited.
        assert_eq!(ledger.balance("u").await, 70.0);
    }

    #[tokio::test]
    async fn test_non_positive_stake_rejected() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;

        assert_eq!(
            ledger.open_wager("u", 0.0).await,
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            ledger.open_wager("u", -5.0).await,
            Err(LedgerError::InvalidAmount)
        );
    }

    #[tokio::test]
    async fn test_settle_pays_amount_times_multiplier() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        let payout = ledger.settle_wager("u", 2.0).await.unwrap();
        assert_eq!(payout, 60.0);
        assert_eq!(ledger.balance("u").await, 130.0);
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        assert_eq!(ledger.settle_wager("u", 2.0).await.unwrap(), 60.0);
        // Second settlement pays nothing and changes nothing.
        assert_eq!(ledger.settle_wager("u", 3.0).await.unwrap(), 0.0);
        assert_eq!(ledger.balance("u").await, 130.0);
    }

    #[tokio::test]
    async fn test_settle_without_wager_fails() {
        let ledger = WagerLedger::new();
        let result = ledger.settle_wager("u", 2.0).await;
        assert_eq!(result, Err(LedgerError::NoOpenWager));
    }

    #[tokio::test]
    async fn test_close_round_forfeits_open_wagers() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        let settled = ledger.close_round().await;
        assert_eq!(settled.forfeited, 1);
        assert_eq!(settled.cleared, 1);
        // Stake stays lost; no payout was credited.
        assert_eq!(ledger.balance("u").await, 70.0);
        // The round is gone, so a late cash-out finds nothing.
        assert_eq!(
            ledger.settle_wager("u", 5.0).await,
            Err(LedgerError::NoOpenWager)
        );
    }

    #[tokio::test]
    async fn test_close_round_skips_already_settled() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();
        ledger.settle_wager("u", 2.0).await.unwrap();

        let settled = ledger.close_round().await;
        assert_eq!(settled.forfeited, 0);
        assert_eq!(settled.cleared, 1);
        assert_eq!(ledger.balance("u").await, 130.0);
    }

    #[tokio::test]
    async fn test_wagers_do_not_survive_clear() {
        let ledger = WagerLedger::new();
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        ledger.clear_round().await;
        // A new round means a new wager is allowed again.
        ledger.open_wager("u", 30.0).await.unwrap();
        assert_eq!(ledger.balance("u").await, 40.0);
    }

    #[tokio::test]
    async fn test_concurrent_cashouts_pay_once() {
        let ledger = Arc::new(WagerLedger::new());
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.settle_wager("u", 2.0).await.unwrap()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            let payout = task.await.unwrap();
            if payout > 0.0 {
                assert_eq!(payout, 60.0);
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.balance("u").await, 130.0);
    }

    #[tokio::test]
    async fn test_cashout_races_crash_settlement() {
        let ledger = Arc::new(WagerLedger::new());
        ledger.deposit("u", 100.0).await;
        ledger.open_wager("u", 30.0).await.unwrap();

        let cashout = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.settle_wager("u", 2.0).await })
        };
        let crash = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.close_round().await })
        };

        let cashout = cashout.await.unwrap();
        let crash = crash.await.unwrap();

        // Either the cash-out won (paid 60) or the crash forfeited first
        // (cash-out found no wager row). Never both.
        match cashout {
            Ok(payout) => {
                assert_eq!(payout, 60.0);
                assert_eq!(crash.forfeited, 0);
                assert_eq!(ledger.balance("u").await, 130.0);
            }
            Err(LedgerError::NoOpenWager) => {
                assert_eq!(crash.forfeited, 1);
                assert_eq!(ledger.balance("u").await, 70.0);
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
}
