//! Pending activation/deactivation actions ordered by due time.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::event::Event;

/// Scheduled transition.
///
/// Declaration order matters: at equal due times a deactivation sorts
/// before an activation, so back-to-back events hand over cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerAction {
    Deactivate,
    Activate,
}

/// One armed timer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timer {
    pub due: DateTime<Utc>,
    pub action: TimerAction,
    pub event_id: String,
}

/// Ordered set of armed timers. Each event has at most one timer per action.
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: BTreeSet<Timer>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms both transitions of `event`, replacing any earlier ones.
    ///
    /// An event that already started activates immediately.
    pub fn arm(&mut self, event: &Event, now: DateTime<Utc>) {
        self.disarm(&event.id);
        self.timers.insert(Timer {
            due: event.start.max(now),
            action: TimerAction::Activate,
            event_id: event.id.clone(),
        });
        self.timers.insert(Timer {
            due: event.end,
            action: TimerAction::Deactivate,
            event_id: event.id.clone(),
        });
    }

    /// Removes every timer belonging to `event_id`; returns how many were armed.
    pub fn disarm(&mut self, event_id: &str) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.event_id != event_id);
        before - self.timers.len()
    }

    /// Earliest due time, if anything is armed.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.timers.first().map(|t| t.due)
    }

    /// Removes and returns the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Timer> {
        match self.timers.first() {
            Some(t) if t.due <= now => self.timers.pop_first(),
            _ => None,
        }
    }

    pub fn is_armed(&self, event_id: &str, action: TimerAction) -> bool {
        self.timers
            .iter()
            .any(|t| t.event_id == event_id && t.action == action)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
