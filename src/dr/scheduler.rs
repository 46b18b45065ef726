//! Event scheduler: registration, timed transitions, cancellation and the
//! expiry sweep.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::clock::Clock;
use super::control::{ControlHandle, TickCause, TickReport};
use super::event::{Event, EventDescriptor};
use super::registry::RegisterOutcome;
use super::state::{SharedState, Transition};

/// Answer returned to the event source for a delivered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptDecision {
    OptIn,
    OptOut,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Event had not started; its timers were disarmed.
    CancelledPending,
    /// Event was in force; DR state was reset and overrides released.
    CancelledActive,
    /// No event with that id.
    Unknown,
}

/// Owns every event transition.
///
/// Cloned handles share one core state; a single driver task (see
/// [`Scheduler::run_driver`]) fires armed timers in due order, one at a
/// time, waiting for the control tick of each transition before the next.
#[derive(Clone)]
pub struct Scheduler {
    shared: SharedState,
    clock: Arc<dyn Clock>,
    control: ControlHandle,
    wake: Arc<Notify>,
}

impl Scheduler {
    pub fn new(shared: SharedState, clock: Arc<dyn Clock>, control: ControlHandle) -> Self {
        Self {
            shared,
            clock,
            control,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registers one event and arms its timers when accepted.
    pub async fn register(&self, event: Event) -> RegisterOutcome {
        let now = self.clock.now();
        let mut core = self.shared.lock().await;
        let outcome = core.registry.register(event.clone(), now);
        if outcome.needs_arming() {
            core.timers.arm(&event, now);
            self.wake.notify_one();
        }
        drop(core);

        match &outcome {
            RegisterOutcome::Accepted | RegisterOutcome::Replaced => info!(
                "event {} {:?}: {} .. {} payload {}",
                event.id, outcome, event.start, event.end, event.payload
            ),
            RegisterOutcome::Unchanged => debug!("event {} resubmitted unchanged", event.id),
            RegisterOutcome::RejectedOverlap { conflicting } => {
                warn!("event {} rejected: overlaps {conflicting}", event.id)
            }
            RegisterOutcome::RejectedPast => {
                warn!("event {} rejected: ended at {}", event.id, event.end)
            }
            RegisterOutcome::RejectedActive => {
                warn!("event {} rejected: already active with different terms", event.id)
            }
        }
        outcome
    }

    /// Event-source callback: schedules every valid interval of the
    /// descriptor unless the site has opted out.
    pub async fn handle_event(&self, descriptor: &EventDescriptor) -> OptDecision {
        if !self.opt_in().await {
            info!("event {} declined: opted out", descriptor.event_id);
            return OptDecision::OptOut;
        }
        for event in descriptor.events() {
            match event {
                Ok(event) => {
                    self.register(event).await;
                }
                Err(e) => warn!("interval dropped: {e}"),
            }
        }
        OptDecision::OptIn
    }

    /// Cancels an event. Unknown ids are reported, not fatal.
    ///
    /// Cancelling an event in force runs the deactivation and its release
    /// tick before returning.
    pub async fn cancel(&self, event_id: &str) -> CancelOutcome {
        let mut core = self.shared.lock().await;
        let known = core.registry.contains(event_id);
        let transition = core.end_event(event_id);
        drop(core);
        self.wake.notify_one();

        if !known {
            info!("cancel {event_id}: no such event");
            return CancelOutcome::Unknown;
        }
        match transition {
            Some(_) => {
                info!("event {event_id} cancelled while active");
                self.request_tick(TickCause::Cancelled(event_id.to_string())).await;
                CancelOutcome::CancelledActive
            }
            None => {
                info!("event {event_id} cancelled before start");
                CancelOutcome::CancelledPending
            }
        }
    }

    /// Removes events whose end has passed without their deactivation
    /// firing. Returns the removed ids.
    pub async fn sweep(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut core = self.shared.lock().await;
        let expired = core.registry.expired(now);
        let mut deactivated = false;
        for id in &expired {
            deactivated |= core.end_event(id).is_some();
        }
        drop(core);

        if !expired.is_empty() {
            warn!("sweep removed expired events: {}", expired.join(", "));
            self.wake.notify_one();
        }
        if deactivated {
            self.request_tick(TickCause::Swept).await;
        }
        expired
    }

    pub async fn opt_in(&self) -> bool {
        self.shared.lock().await.opt_in
    }

    pub async fn set_opt_in(&self, opt_in: bool) {
        self.shared.lock().await.opt_in = opt_in;
        info!("opt-in set to {opt_in}");
    }

    /// Fires the earliest due timer, if any.
    ///
    /// Returns `true` when a timer was consumed.
    pub async fn fire_due(&self) -> bool {
        let now = self.clock.now();
        let mut core = self.shared.lock().await;
        let Some(timer) = core.timers.pop_due(now) else {
            return false;
        };
        let transition = core.fire(&timer);
        let payload = core.dr.current_payload;
        drop(core);

        match transition {
            Some(Transition::Activated(id)) => {
                info!("event {id} active, payload {payload}");
                self.request_tick(TickCause::Activated(id)).await;
            }
            Some(Transition::Deactivated(id)) => {
                info!("event {id} ended");
                self.request_tick(TickCause::Deactivated(id)).await;
            }
            None => debug!("timer {:?} for {} had nothing to do", timer.action, timer.event_id),
        }
        true
    }

    /// Driver task: sleeps until the next armed timer and fires it. Woken
    /// early whenever timers are armed or disarmed.
    pub async fn run_driver(self) {
        loop {
            while self.fire_due().await {}

            let next_due = self.shared.lock().await.timers.next_due();
            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.clock.until(at)) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    async fn request_tick(&self, cause: TickCause) -> Option<TickReport> {
        match self.control.tick_now(cause).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("transition tick not run: {e}");
                None
            }
        }
    }
}
