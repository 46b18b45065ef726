//! In-memory store of scheduled and active events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::event::{Event, EventPhase};

/// Result of submitting an event to the registry.
///
/// Rejections are ordinary control flow, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// Stored as a new pending event.
    Accepted,
    /// Pending event with the same id was replaced by the new timing.
    Replaced,
    /// Identical resubmission of an already registered event.
    Unchanged,
    /// Overlaps an earlier registered event; dropped.
    RejectedOverlap { conflicting: String },
    /// Ends at or before `now`; never scheduled.
    RejectedPast,
    /// Same id as an event that is already active but with different
    /// timing or payload; the active event is kept as is.
    RejectedActive,
}

impl RegisterOutcome {
    /// `true` when timers must be (re)armed for the event.
    pub fn needs_arming(&self) -> bool {
        matches!(self, Self::Accepted | Self::Replaced)
    }
}

/// Registered event with its lifecycle phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub event: Event,
    pub phase: EventPhase,
}

/// Events keyed by id whose `[start, end)` intervals are pairwise disjoint.
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: HashMap<String, ScheduledEvent>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `event` unless it is already over or overlaps another
    /// registered event. The earlier registration always wins.
    pub fn register(&mut self, event: Event, now: DateTime<Utc>) -> RegisterOutcome {
        if event.has_ended(now) {
            return RegisterOutcome::RejectedPast;
        }

        let replacing = match self.events.get(&event.id) {
            Some(existing) if existing.event == event => return RegisterOutcome::Unchanged,
            Some(existing) if existing.phase == EventPhase::Active => {
                return RegisterOutcome::RejectedActive;
            }
            Some(_) => true,
            None => false,
        };

        if let Some(conflict) = self
            .events
            .values()
            .filter(|s| s.event.id != event.id && !s.event.has_ended(now))
            .find(|s| s.event.overlaps(&event))
        {
            return RegisterOutcome::RejectedOverlap {
                conflicting: conflict.event.id.clone(),
            };
        }

        self.events.insert(
            event.id.clone(),
            ScheduledEvent {
                event,
                phase: EventPhase::Pending,
            },
        );
        if replacing {
            RegisterOutcome::Replaced
        } else {
            RegisterOutcome::Accepted
        }
    }

    /// Moves a pending event to `Active` and returns it.
    pub fn activate(&mut self, id: &str) -> Option<&Event> {
        let scheduled = self.events.get_mut(id)?;
        if !scheduled.phase.can_transition_to(EventPhase::Active) {
            return None;
        }
        scheduled.phase = EventPhase::Active;
        Some(&scheduled.event)
    }

    /// Removes the event, reporting the phase it was in.
    pub fn remove(&mut self, id: &str) -> Option<ScheduledEvent> {
        self.events.remove(id)
    }

    /// Ids of events whose end has passed.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .events
            .values()
            .filter(|s| s.event.has_ended(now))
            .map(|s| s.event.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledEvent> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Registered events ordered by start time.
    pub fn ordered(&self) -> Vec<&ScheduledEvent> {
        let mut all: Vec<&ScheduledEvent> = self.events.values().collect();
        all.sort_by(|a, b| a.event.start.cmp(&b.event.start).then(a.event.id.cmp(&b.event.id)));
        all
    }

    /// Checks the no-overlap invariant over every pair.
    pub fn is_disjoint(&self) -> bool {
        let all: Vec<&Event> = self.events.values().map(|s| &s.event).collect();
        all.iter().enumerate().all(|(i, a)| all[i + 1..].iter().all(|b| !a.overlaps(b)))
    }
}
