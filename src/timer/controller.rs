use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard},
    time::Duration,
};

use log::debug;
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::models::SessionOutcome;

use super::{TickOutcome, TimerState, TimerStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Receives the outcome of every finished session.
pub trait SessionSink: Send + Sync + 'static {
    fn record(&self, outcome: SessionOutcome);
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub remaining_seconds: u32,
    pub configured_minutes: u32,
    pub is_running: bool,
    pub is_editing: bool,
    pub edit_buffer: Option<String>,
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            status: state.status(),
            remaining_seconds: state.remaining_seconds,
            configured_minutes: state.configured_minutes,
            is_running: state.is_running,
            is_editing: state.is_editing,
            edit_buffer: state.edit_buffer.clone(),
        }
    }
}

#[derive(Default)]
struct PulseSlot {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PulseSlot {
    fn is_live(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PulseSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns the countdown and the one-second pulse driving it.
///
/// Cloning yields another handle onto the same timer. The pulse is cancelled
/// on `stop`, on natural completion, on `shutdown`, and when the last handle
/// is dropped.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    sink: Arc<dyn SessionSink>,
    pulse: Arc<StdMutex<PulseSlot>>,
    snapshot_tx: Arc<watch::Sender<TimerSnapshot>>,
    tick_interval: Duration,
}

impl TimerController {
    pub fn new(sink: Arc<dyn SessionSink>, default_minutes: u32, tick_interval: Duration) -> Self {
        let state = TimerState::with_minutes(default_minutes);
        let (snapshot_tx, _) = watch::channel(TimerSnapshot::from(&state));

        Self {
            state: Arc::new(Mutex::new(state)),
            sink,
            pulse: Arc::new(StdMutex::new(PulseSlot::default())),
            snapshot_tx: Arc::new(snapshot_tx),
            tick_interval,
        }
    }

    /// Live view for renderers; updated after every mutation and pulse.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::from(&*self.state.lock().await)
    }

    pub async fn edit(&self, target_minutes: Option<u32>) -> bool {
        let mut guard = self.state.lock().await;
        let changed = guard.edit(target_minutes);
        if changed {
            self.publish(&guard);
        }
        changed
    }

    pub async fn set_edit_buffer(&self, input: &str) -> bool {
        let mut guard = self.state.lock().await;
        let changed = guard.set_edit_buffer(input);
        if changed {
            self.publish(&guard);
        }
        changed
    }

    pub async fn commit_edit(&self, raw: &str) -> bool {
        let mut guard = self.state.lock().await;
        let committed = guard.commit_edit(raw);
        if committed {
            log_info!("timer duration set to {} minutes", guard.configured_minutes);
            self.publish(&guard);
        } else {
            debug!("rejected duration edit {raw:?}");
        }
        committed
    }

    pub async fn start(&self) -> bool {
        let mut guard = self.state.lock().await;
        if !guard.start() {
            return false;
        }

        self.spawn_pulse(guard.run_epoch);
        log_info!(
            "timer started with {}s remaining ({} minute session)",
            guard.remaining_seconds,
            guard.configured_minutes
        );
        self.publish(&guard);
        true
    }

    pub async fn stop(&self) -> Option<SessionOutcome> {
        let mut guard = self.state.lock().await;
        let outcome = guard.stop()?;

        self.cancel_pulse();
        log_info!(
            "timer stopped after {}s of {} minutes",
            outcome.elapsed_seconds,
            outcome.requested_minutes
        );
        self.sink.record(outcome.clone());
        self.publish(&guard);
        Some(outcome)
    }

    pub async fn toggle(&self) -> Option<SessionOutcome> {
        let running = self.state.lock().await.is_running;
        if running {
            self.stop().await
        } else {
            self.start().await;
            None
        }
    }

    /// Advances the countdown by one second outside the pulse.
    ///
    /// Ignored while a pulse is live, so the countdown never loses more than
    /// one second per interval.
    pub async fn tick(&self) -> TickOutcome {
        let mut guard = self.state.lock().await;
        if self.pulse_slot().is_live() {
            debug!("manual tick ignored while the pulse is running");
            return TickOutcome::Ignored;
        }

        let outcome = guard.tick();
        if let TickOutcome::Completed(session) = &outcome {
            self.cancel_pulse();
            log_info!("timer completed {} minute session", session.requested_minutes);
            self.sink.record(session.clone());
        }
        if outcome != TickOutcome::Ignored {
            self.publish(&guard);
        }
        outcome
    }

    /// Cancels any scheduled pulse. The countdown state is left as is.
    pub fn shutdown(&self) {
        self.cancel_pulse();
    }

    fn publish(&self, state: &TimerState) {
        self.snapshot_tx.send_replace(TimerSnapshot::from(state));
    }

    fn pulse_slot(&self) -> MutexGuard<'_, PulseSlot> {
        match self.pulse.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cancel_pulse(&self) {
        self.pulse_slot().cancel();
    }

    fn spawn_pulse(&self, epoch: u64) {
        let mut slot = self.pulse_slot();
        slot.cancel();

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(pulse_loop(
            self.state.clone(),
            self.sink.clone(),
            self.snapshot_tx.clone(),
            self.tick_interval,
            epoch,
            cancel_token.clone(),
        ));

        slot.handle = Some(handle);
        slot.cancel_token = Some(cancel_token);
    }
}

async fn pulse_loop(
    state: Arc<Mutex<TimerState>>,
    sink: Arc<dyn SessionSink>,
    snapshot_tx: Arc<watch::Sender<TimerSnapshot>>,
    tick_interval: Duration,
    epoch: u64,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut guard = state.lock().await;
                if guard.run_epoch != epoch {
                    log_warn!("stale timer pulse for run {epoch} exiting");
                    break;
                }

                let outcome = guard.tick();
                match &outcome {
                    TickOutcome::Ignored => break,
                    TickOutcome::Counting { .. } => {}
                    TickOutcome::Completed(session) => {
                        log_info!("timer completed {} minute session", session.requested_minutes);
                        sink.record(session.clone());
                    }
                }

                snapshot_tx.send_replace(TimerSnapshot::from(&*guard));
                if matches!(outcome, TickOutcome::Completed(_)) {
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }
}
