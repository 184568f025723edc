//! Broadcast Hub
//!
//! The registry of connected viewer sessions and the fan-out path for round
//! lifecycle events. Delivery is best-effort, in-order, at-most-once per
//! viewer: each session gets its own bounded channel, the recipient set is
//! snapshotted before every pass, and a session whose channel is closed or
//! saturated is pruned without disturbing anyone else.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::game::round::{RoundEvent, RoundSnapshot};
use crate::network::protocol::StreamMessage;

/// Unique viewer session identifier.
pub type SessionId = Uuid;

/// Frames buffered per session before the transport counts as dead.
const SESSION_BUFFER: usize = 64;

/// Registry of connected viewers plus the published round state, so a late
/// joiner can be handed a snapshot immediately on register.
pub struct BroadcastHub {
    sessions: RwLock<BTreeMap<SessionId, mpsc::Sender<StreamMessage>>>,
    rounds: watch::Receiver<RoundSnapshot>,
}

impl BroadcastHub {
    /// Create a hub reading round state from `rounds`.
    pub fn new(rounds: watch::Receiver<RoundSnapshot>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            rounds,
        }
    }

    /// Register a new viewer session.
    ///
    /// The current state snapshot is queued before the session becomes
    /// visible to broadcasts, so the viewer's first frame always reconstructs
    /// the round and every later frame follows it in emission order.
    pub async fn register(&self) -> (SessionId, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let snapshot = self.rounds.borrow().clone();
        // Fresh channel with free capacity; this cannot fail.
        let _ = tx.try_send(StreamMessage::state(&snapshot));

        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, tx);
        debug!(%id, "viewer registered");
        (id, rx)
    }

    /// Remove a session on clean disconnect.
    pub async fn unregister(&self, id: &SessionId) {
        if self.sessions.write().await.remove(id).is_some() {
            debug!(%id, "viewer unregistered");
        }
    }

    /// Broadcast a round event to every registered session.
    pub async fn broadcast_event(&self, event: RoundEvent) {
        self.broadcast(StreamMessage::from(event)).await;
    }

    /// Broadcast a frame to every registered session.
    ///
    /// The recipient set is snapshotted first, so sessions can connect or
    /// disconnect mid-pass without corrupting the iteration. A failed send
    /// only ever removes the failing session.
    pub async fn broadcast(&self, message: StreamMessage) {
        let recipients: Vec<(SessionId, mpsc::Sender<StreamMessage>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in recipients {
            // Closed means the viewer task is gone; a full buffer means the
            // transport stopped draining. Either way the session is dead, and
            // it must not hold up the round loop.
            if tx.try_send(message.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in dead {
                if sessions.remove(&id).is_some() {
                    debug!(%id, "viewer pruned after failed send");
                }
            }
        }
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
