//! Shared mutable core: registry, timers and the DR active state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::event::{Event, EventPhase};
use super::registry::EventRegistry;
use super::timers::{Timer, TimerAction, TimerTable};

/// The single authoritative DR signal consumed by the control loop and by
/// status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrActiveState {
    pub active: bool,
    pub current_payload: f64,
    /// Event currently driving the state, `None` while inactive.
    pub event_id: Option<String>,
}

impl DrActiveState {
    pub fn normal(normal_payload: f64) -> Self {
        Self {
            active: false,
            current_payload: normal_payload,
            event_id: None,
        }
    }

    fn activate(&mut self, event: &Event) {
        self.active = true;
        self.current_payload = event.payload;
        self.event_id = Some(event.id.clone());
    }

    /// Returns to normal operations if `event_id` is the event in force.
    fn deactivate(&mut self, event_id: &str, normal_payload: f64) -> bool {
        if self.event_id.as_deref() != Some(event_id) {
            return false;
        }
        *self = Self::normal(normal_payload);
        true
    }
}

/// Registered event as shown in status reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledEventView {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: f64,
    pub phase: EventPhase,
}

/// Point-in-time status published by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub at: DateTime<Utc>,
    pub dr_active: bool,
    pub current_payload: f64,
    pub scheduled_events: Vec<ScheduledEventView>,
    pub override_error: bool,
    pub opt_in: bool,
}

/// What a fired timer did to the DR state.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Activated(String),
    Deactivated(String),
}

/// Everything the scheduler's transitions mutate, guarded by one lock.
#[derive(Debug)]
pub struct CoreState {
    pub registry: EventRegistry,
    pub timers: TimerTable,
    pub dr: DrActiveState,
    pub opt_in: bool,
    pub normal_payload: f64,
}

pub type SharedState = Arc<Mutex<CoreState>>;

impl CoreState {
    pub fn new(opt_in: bool, normal_payload: f64) -> Self {
        Self {
            registry: EventRegistry::new(),
            timers: TimerTable::new(),
            dr: DrActiveState::normal(normal_payload),
            opt_in,
            normal_payload,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Runs the transition of a fired timer.
    ///
    /// Returns `None` when the timer no longer applies (event gone or
    /// already active) and nothing changed.
    pub fn fire(&mut self, timer: &Timer) -> Option<Transition> {
        match timer.action {
            TimerAction::Activate => {
                let event = self.registry.activate(&timer.event_id)?;
                self.dr.activate(event);
                Some(Transition::Activated(timer.event_id.clone()))
            }
            TimerAction::Deactivate => self.end_event(&timer.event_id),
        }
    }

    /// Removes an event and disarms its timers. When the event was in force
    /// the DR state returns to normal and a `Deactivated` transition is
    /// reported.
    pub fn end_event(&mut self, event_id: &str) -> Option<Transition> {
        self.timers.disarm(event_id);
        let removed = self.registry.remove(event_id)?;
        let was_active = removed.phase == EventPhase::Active;
        if was_active && self.dr.deactivate(event_id, self.normal_payload) {
            Some(Transition::Deactivated(event_id.to_string()))
        } else {
            None
        }
    }

    pub fn scheduled_events(&self) -> Vec<ScheduledEventView> {
        self.registry
            .ordered()
            .into_iter()
            .map(|s| ScheduledEventView {
                id: s.event.id.clone(),
                start: s.event.start,
                end: s.event.end,
                payload: s.event.payload,
                phase: s.phase,
            })
            .collect()
    }

    pub fn snapshot(&self, at: DateTime<Utc>, override_error: bool) -> StatusSnapshot {
        StatusSnapshot {
            at,
            dr_active: self.dr.active,
            current_payload: self.dr.current_payload,
            scheduled_events: self.scheduled_events(),
            override_error,
            opt_in: self.opt_in,
        }
    }
}
