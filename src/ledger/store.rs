//! Ledger Store
//!
//! The account and wager tables behind the wager ledger facade. Logically a
//! transactional key-value store: every caller operation runs as one closure
//! under one lock, so a debit and its wager insert commit together or not at
//! all. In-memory here; a durable store slots in behind the same contract.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

/// One wager row. At most one per user per round.
#[derive(Debug, Clone, PartialEq)]
pub struct WagerRecord {
    /// Stake debited when the wager was opened.
    pub amount: f64,
    /// Whether the wager has been settled (cash-out or crash forfeit).
    pub settled: bool,
    /// Multiplier applied at settlement (0.0 for a crash forfeit).
    pub multiplier: f64,
}

/// The accounts and wagers tables.
///
/// Only reachable through [`LedgerStore::write`], which is what makes each
/// facade operation atomic.
#[derive(Debug, Default)]
pub struct LedgerTables {
    accounts: BTreeMap<String, f64>,
    wagers: BTreeMap<String, WagerRecord>,
}

impl LedgerTables {
    /// Balance of `user_id`, creating the account at zero if absent.
    pub fn balance_or_create(&mut self, user_id: &str) -> f64 {
        *self.accounts.entry(user_id.to_string()).or_insert(0.0)
    }

    /// Add `amount` (any sign) to the balance, creating the account if absent.
    pub fn credit(&mut self, user_id: &str, amount: f64) {
        *self.accounts.entry(user_id.to_string()).or_insert(0.0) += amount;
    }

    /// The user's wager row for this round, if any.
    pub fn wager(&self, user_id: &str) -> Option<&WagerRecord> {
        self.wagers.get(user_id)
    }

    /// True if the user holds an unsettled wager this round.
    pub fn has_open_wager(&self, user_id: &str) -> bool {
        self.wagers.get(user_id).is_some_and(|w| !w.settled)
    }

    /// Insert a fresh open wager row. The facade checks for an existing open
    /// wager before calling this.
    pub fn insert_wager(&mut self, user_id: &str, amount: f64) {
        self.wagers.insert(
            user_id.to_string(),
            WagerRecord {
                amount,
                settled: false,
                multiplier: 1.0,
            },
        );
    }

    /// Mutable access to the user's wager row, if any.
    pub fn wager_mut(&mut self, user_id: &str) -> Option<&mut WagerRecord> {
        self.wagers.get_mut(user_id)
    }

    /// All user ids with an unsettled wager.
    pub fn open_wager_users(&self) -> Vec<String> {
        self.wagers
            .iter()
            .filter(|(_, w)| !w.settled)
            .map(|(user, _)| user.clone())
            .collect()
    }

    /// Drop every wager row (settled or not). Balances are untouched.
    /// Returns the number of rows removed.
    pub fn clear_wagers(&mut self) -> usize {
        let cleared = self.wagers.len();
        self.wagers.clear();
        cleared
    }
}

/// The durable side of the ledger, reduced to its transactional contract.
#[derive(Debug, Default)]
pub struct LedgerStore {
    tables: Mutex<LedgerTables>,
}

impl LedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` as one atomic transaction against the tables.
    ///
    /// No await point exists while the lock is held, so a transaction can
    /// never observe or publish a half-applied write.
    pub async fn write<T>(&self, f: impl FnOnce(&mut LedgerTables) -> T) -> T {
        let mut tables = self.tables.lock().await;
        f(&mut tables)
    }
}
