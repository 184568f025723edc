//! Round State Machine
//!
//! Pure transition functions plus the supervised loop that drives
//! Countdown → Flight → Crash → Reset forever.
//!
//! The transitions themselves are synchronous and deterministic (given a
//! scripted RNG) so every property of the state machine is testable without
//! timers. The async driver owns the cadence: it publishes a fresh
//! [`RoundSnapshot`] on the watch channel before broadcasting each event, so
//! request handlers never observe a staler phase than viewers do.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};

use crate::core::rng::RoundRng;
use crate::game::round::{RoundConfig, RoundEvent, RoundPhase, RoundSnapshot};
use crate::ledger::WagerLedger;
use crate::network::hub::BroadcastHub;

/// Result of one flight tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightOutcome {
    /// The multiplier rose and the round continues.
    Rising {
        /// Multiplier after this tick.
        value: f64,
    },
    /// The crash roll or the ceiling ended the round.
    Crashed {
        /// Multiplier at the moment of the crash.
        final_multiplier: f64,
    },
}

/// The round state machine.
///
/// Owns the single authoritative round state. Nothing outside this type
/// mutates phase, countdown, or multiplier; everything else reads the
/// snapshots it publishes.
pub struct RoundEngine<R: RoundRng> {
    config: RoundConfig,
    rng: R,
    phase: RoundPhase,
    countdown_remaining: u32,
    multiplier: f64,
}

impl<R: RoundRng> RoundEngine<R> {
    /// Create an engine in the Countdown phase, ready for the first round.
    pub fn new(config: RoundConfig, rng: R) -> Self {
        let countdown_remaining = config.countdown_secs;
        Self {
            config,
            rng,
            phase: RoundPhase::Countdown,
            countdown_remaining,
            multiplier: 1.0,
        }
    }

    /// The cadence configuration this engine runs with.
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// A consistent copy of the current state.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            phase: self.phase,
            countdown_remaining: self.countdown_remaining,
            multiplier: self.multiplier,
        }
    }

    /// Enter Countdown: reset the betting window and the multiplier.
    pub fn begin_countdown(&mut self) -> RoundEvent {
        self.phase = RoundPhase::Countdown;
        self.countdown_remaining = self.config.countdown_secs;
        self.multiplier = 1.0;
        RoundEvent::Countdown {
            time: self.countdown_remaining,
        }
    }

    /// One countdown second elapsed.
    pub fn tick_countdown(&mut self) -> RoundEvent {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        RoundEvent::Countdown {
            time: self.countdown_remaining,
        }
    }

    /// Enter Flight. Emitted exactly once per round.
    pub fn begin_flight(&mut self) -> RoundEvent {
        self.phase = RoundPhase::Flight;
        self.countdown_remaining = 0;
        RoundEvent::Start
    }

    /// One flight tick: raise the multiplier by a random increment in the
    /// configured range, then evaluate the crash roll and the hard ceiling.
    ///
    /// The crash roll is drawn independently every tick, so the crash point
    /// is unknowable in advance even with full access to in-progress state.
    pub fn tick_flight(&mut self) -> FlightOutcome {
        let span = self.config.increment_max - self.config.increment_min;
        let increment = round2(self.config.increment_min + self.rng.next_unit() * span);
        self.multiplier = round2(self.multiplier + increment);

        let crashed = self.rng.next_unit() < self.config.crash_probability
            || self.multiplier > self.config.multiplier_ceiling;

        if crashed {
            self.phase = RoundPhase::Crash;
            FlightOutcome::Crashed {
                final_multiplier: self.multiplier,
            }
        } else {
            FlightOutcome::Rising {
                value: self.multiplier,
            }
        }
    }
}

/// Round to the fixed two-decimal precision of the wire format.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// SUPERVISED DRIVER
// =============================================================================

/// Handle to the spawned round loop.
///
/// Unexpected exit is observable through [`RoundHandle::wait`]; clean
/// shutdown goes through [`RoundHandle::shutdown`], which is only honored at
/// timer suspension points so settlement writes are never torn.
pub struct RoundHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RoundHandle {
    /// Wait for the loop task to exit. The loop runs forever, so completion
    /// here means either a requested shutdown or an unexpected failure.
    pub async fn wait(&mut self) {
        let _ = (&mut self.task).await;
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if !self.task.is_finished() {
            if let Err(e) = self.task.await {
                error!("round loop task failed during shutdown: {}", e);
            }
        }
    }
}

/// Spawn the round loop as a supervised background task.
pub fn spawn_round_loop<R: RoundRng + 'static>(
    engine: RoundEngine<R>,
    ledger: Arc<WagerLedger>,
    hub: Arc<BroadcastHub>,
    state_tx: watch::Sender<RoundSnapshot>,
) -> RoundHandle {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(run_round_loop(engine, ledger, hub, state_tx, shutdown_rx));
    RoundHandle { shutdown_tx, task }
}

/// Publish a transition: snapshot first, then the event, so admission checks
/// in the gateway never lag behind what viewers see.
async fn publish(
    state_tx: &watch::Sender<RoundSnapshot>,
    hub: &BroadcastHub,
    snapshot: RoundSnapshot,
    event: RoundEvent,
) {
    let _ = state_tx.send(snapshot);
    hub.broadcast_event(event).await;
}

async fn run_round_loop<R: RoundRng>(
    mut engine: RoundEngine<R>,
    ledger: Arc<WagerLedger>,
    hub: Arc<BroadcastHub>,
    state_tx: watch::Sender<RoundSnapshot>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("round loop started");

    loop {
        // ---- Countdown: betting window ----
        let event = engine.begin_countdown();
        publish(&state_tx, &hub, engine.snapshot(), event).await;

        for _ in 0..engine.config().countdown_secs {
            tokio::select! {
                _ = sleep(std::time::Duration::from_secs(1)) => {}
                _ = shutdown_rx.recv() => {
                    info!("round loop stopping");
                    return;
                }
            }
            let event = engine.tick_countdown();
            publish(&state_tx, &hub, engine.snapshot(), event).await;
        }

        // ---- Flight: multiplier rises until the crash ----
        let event = engine.begin_flight();
        publish(&state_tx, &hub, engine.snapshot(), event).await;

        let mut ticker = interval(engine.config().flight_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately; consume it so the
        // first increment lands one full tick after the start event.
        ticker.tick().await;

        let final_multiplier = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => {
                    info!("round loop stopping mid-flight");
                    return;
                }
            }
            match engine.tick_flight() {
                FlightOutcome::Rising { value } => {
                    publish(
                        &state_tx,
                        &hub,
                        engine.snapshot(),
                        RoundEvent::Multiplier { value },
                    )
                    .await;
                }
                FlightOutcome::Crashed { final_multiplier } => break final_multiplier,
            }
        };

        // ---- Crash: announce, settle, pause ----
        publish(
            &state_tx,
            &hub,
            engine.snapshot(),
            RoundEvent::End { final_multiplier },
        )
        .await;

        // Settlement runs to completion even if shutdown was requested:
        // the signal is only checked at timer suspension points.
        let settled = ledger.close_round().await;
        info!(
            final_multiplier,
            forfeited = settled.forfeited,
            cleared = settled.cleared,
            "round settled"
        );

        tokio::select! {
            _ = sleep(engine.config().crash_pause) => {}
            _ = shutdown_rx.recv() => {
                info!("round loop stopping");
                return;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::network::protocol::StreamMessage;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a fixed sequence of draws; 0.5 after exhaustion.
    struct ScriptedRng {
        draws: VecDeque<f64>,
    }

    impl ScriptedRng {
        fn new(draws: &[f64]) -> Self {
            Self {
                draws: draws.iter().copied().collect(),
            }
        }
    }

    impl RoundRng for ScriptedRng {
        fn next_unit(&mut self) -> f64 {
            self.draws.pop_front().unwrap_or(0.5)
        }
    }

    fn engine_with(draws: &[f64]) -> RoundEngine<ScriptedRng> {
        RoundEngine::new(RoundConfig::default(), ScriptedRng::new(draws))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_countdown_decreases_to_zero() {
        let mut engine = engine_with(&[]);

        assert_eq!(engine.begin_countdown(), RoundEvent::Countdown { time: 10 });
        let mut last = 10;
        for expected in (0..10).rev() {
            let event = engine.tick_countdown();
            assert_eq!(event, RoundEvent::Countdown { time: expected });
            assert!(expected < last);
            last = expected;
        }
        assert_eq!(engine.snapshot().countdown_remaining, 0);
        assert_eq!(engine.snapshot().phase, RoundPhase::Countdown);
    }

    #[test]
    fn test_flight_entry_resets_multiplier() {
        let mut engine = engine_with(&[]);
        engine.begin_countdown();
        for _ in 0..10 {
            engine.tick_countdown();
        }
        assert_eq!(engine.begin_flight(), RoundEvent::Start);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, RoundPhase::Flight);
        assert!(approx(snapshot.multiplier, 1.0));
    }

    #[test]
    fn test_flight_tick_applies_bounded_increment() {
        // Draw 0.0 -> minimum increment; crash roll 0.99 -> keep flying.
        let mut engine = engine_with(&[0.0, 0.99]);
        engine.begin_flight();

        match engine.tick_flight() {
            FlightOutcome::Rising { value } => assert!(approx(value, 1.01)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_flight_tick_maximum_increment() {
        let mut engine = engine_with(&[0.999_999_999, 0.99]);
        engine.begin_flight();

        match engine.tick_flight() {
            FlightOutcome::Rising { value } => assert!(approx(value, 1.05)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_crash_roll_ends_flight() {
        // Increment draw 0.5 -> +0.03; crash roll 0.005 < 0.01 -> crash.
        let mut engine = engine_with(&[0.5, 0.005]);
        engine.begin_flight();

        match engine.tick_flight() {
            FlightOutcome::Crashed { final_multiplier } => {
                assert!(approx(final_multiplier, 1.03));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(engine.snapshot().phase, RoundPhase::Crash);
    }

    #[test]
    fn test_ceiling_forces_crash() {
        let config = RoundConfig {
            multiplier_ceiling: 1.05,
            ..RoundConfig::default()
        };
        // Two max increments; crash rolls far above the probability, so only
        // the ceiling can end the round.
        let rng = ScriptedRng::new(&[0.999_999_999, 0.99, 0.999_999_999, 0.99]);
        let mut engine = RoundEngine::new(config, rng);
        engine.begin_flight();

        assert!(matches!(
            engine.tick_flight(),
            FlightOutcome::Rising { .. }
        ));
        match engine.tick_flight() {
            FlightOutcome::Crashed { final_multiplier } => {
                assert!(approx(final_multiplier, 1.10));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_full_round_event_sequence() {
        let mut engine = RoundEngine::new(RoundConfig::default(), DeterministicRng::new(7));
        let mut events = Vec::new();

        events.push(engine.begin_countdown());
        for _ in 0..10 {
            events.push(engine.tick_countdown());
        }
        events.push(engine.begin_flight());
        loop {
            match engine.tick_flight() {
                FlightOutcome::Rising { value } => {
                    events.push(RoundEvent::Multiplier { value })
                }
                FlightOutcome::Crashed { final_multiplier } => {
                    events.push(RoundEvent::End { final_multiplier });
                    break;
                }
            }
        }

        let starts = events
            .iter()
            .filter(|e| matches!(e, RoundEvent::Start))
            .count();
        let ends = events
            .iter()
            .filter(|e| matches!(e, RoundEvent::End { .. }))
            .count();
        assert_eq!(starts, 1);
        assert_eq!(ends, 1);

        // Countdown values strictly decrease 10 -> 0 before the start event.
        let countdown: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                RoundEvent::Countdown { time } => Some(*time),
                _ => None,
            })
            .collect();
        assert_eq!(countdown, (0..=10).rev().collect::<Vec<u32>>());

        // Multipliers are monotone non-decreasing.
        let multipliers: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                RoundEvent::Multiplier { value } => Some(*value),
                RoundEvent::End { final_multiplier } => Some(*final_multiplier),
                _ => None,
            })
            .collect();
        assert!(multipliers.windows(2).all(|w| w[1] >= w[0]));
    }

    proptest! {
        /// Any seed: increments stay in bounds, the multiplier never
        /// decreases, and flight terminates within the ceiling bound.
        #[test]
        fn prop_flight_invariants(seed: u64) {
            let config = RoundConfig::default();
            // Enough minimum increments to cross the ceiling, plus slack.
            let max_ticks =
                (config.multiplier_ceiling / config.increment_min) as usize + 10;

            let mut engine =
                RoundEngine::new(config.clone(), DeterministicRng::new(seed));
            engine.begin_flight();

            let mut previous = 1.0;
            let mut crashed = false;
            for _ in 0..max_ticks {
                let value = match engine.tick_flight() {
                    FlightOutcome::Rising { value } => value,
                    FlightOutcome::Crashed { final_multiplier } => {
                        crashed = true;
                        final_multiplier
                    }
                };
                let increment = value - previous;
                prop_assert!(increment >= config.increment_min - 1e-9);
                prop_assert!(increment <= config.increment_max + 1e-9);
                previous = value;
                if crashed {
                    break;
                }
            }
            prop_assert!(crashed, "flight must terminate once past the ceiling");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_loop_broadcasts_lifecycle() {
        let config = RoundConfig {
            countdown_secs: 1,
            crash_pause: Duration::from_millis(10),
            ..RoundConfig::default()
        };
        // One flight tick: +0.03, then a crash roll that hits.
        let engine = RoundEngine::new(config.clone(), ScriptedRng::new(&[0.5, 0.0]));

        let ledger = Arc::new(WagerLedger::new());
        let (state_tx, state_rx) = watch::channel(RoundSnapshot::initial(&config));
        let hub = Arc::new(BroadcastHub::new(state_rx));
        let (_id, mut rx) = hub.register().await;

        let handle = spawn_round_loop(engine, ledger, hub.clone(), state_tx);

        // Snapshot first, then the lifecycle in emission order.
        assert!(matches!(
            rx.recv().await,
            Some(StreamMessage::State { .. })
        ));
        assert_eq!(rx.recv().await, Some(StreamMessage::Countdown { time: 1 }));
        assert_eq!(rx.recv().await, Some(StreamMessage::Countdown { time: 0 }));
        assert_eq!(rx.recv().await, Some(StreamMessage::Start));
        match rx.recv().await {
            Some(StreamMessage::End { final_multiplier }) => {
                assert!(approx(final_multiplier, 1.03));
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        handle.shutdown().await;
    }
}
