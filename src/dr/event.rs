//! Demand-response events and their lifecycle.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

/// One time interval of an event as delivered by the event source.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInterval {
    pub start: DateTime<Utc>,
    pub duration: TimeDelta,
    pub payload: f64,
}

/// Event descriptor delivered by the event source callback.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescriptor {
    pub event_id: String,
    pub intervals: Vec<EventInterval>,
}

impl EventDescriptor {
    /// Expands the descriptor into one event per interval.
    ///
    /// The first interval keeps the descriptor id; later ones are suffixed
    /// `#n` so each can be cancelled on its own. Invalid intervals are
    /// returned as errors in place.
    pub fn events(&self) -> Vec<Result<Event, InvalidEvent>> {
        self.intervals
            .iter()
            .enumerate()
            .map(|(n, interval)| {
                let id = if n == 0 {
                    self.event_id.clone()
                } else {
                    format!("{}#{n}", self.event_id)
                };
                Event::new(id, interval.start, interval.duration, interval.payload)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidEvent {
    #[error("event {0}: duration must be positive")]
    NonPositiveDuration(String),

    #[error("event {0}: payload must be a finite number")]
    NonFinitePayload(String),

    #[error("event {0}: end lies outside the representable time range")]
    OutOfRange(String),
}

/// A scheduled demand-response event covering `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: f64,
}

impl Event {
    /// Creates an event spanning `[start, start + duration)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEvent` when `duration <= 0` or `payload` is not finite.
    pub fn new(
        id: impl Into<String>,
        start: DateTime<Utc>,
        duration: TimeDelta,
        payload: f64,
    ) -> Result<Self, InvalidEvent> {
        let id = id.into();
        if duration <= TimeDelta::zero() {
            return Err(InvalidEvent::NonPositiveDuration(id));
        }
        if !payload.is_finite() {
            return Err(InvalidEvent::NonFinitePayload(id));
        }
        let Some(end) = start.checked_add_signed(duration) else {
            return Err(InvalidEvent::OutOfRange(id));
        };
        Ok(Self {
            id,
            start,
            end,
            payload,
        })
    }

    /// Half-open overlap test.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns `true` once `now` has reached `end`.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// Lifecycle of a registered event.
///
/// `Pending -> Active -> Ended`, with `Cancelled` reachable from either
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Pending,
    Active,
    Ended,
    Cancelled,
}

impl EventPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: EventPhase) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Ended)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 17, 0, 0).single().unwrap_or_default()
    }

    fn event(id: &str, start_min: i64, dur_min: i64) -> Event {
        Event::new(
            id,
            t0() + TimeDelta::minutes(start_min),
            TimeDelta::minutes(dur_min),
            1.0,
        )
        .expect("valid event")
    }

    #[test]
    fn end_is_start_plus_duration() {
        let e = event("e1", 0, 5);
        assert_eq!(e.end - e.start, TimeDelta::minutes(5));
    }

    #[test]
    fn rejects_empty_duration_and_nan_payload() {
        assert!(matches!(
            Event::new("x", t0(), TimeDelta::zero(), 1.0),
            Err(InvalidEvent::NonPositiveDuration(_))
        ));
        assert!(matches!(
            Event::new("x", t0(), TimeDelta::minutes(1), f64::NAN),
            Err(InvalidEvent::NonFinitePayload(_))
        ));
    }

    #[test]
    fn huge_duration_is_rejected_not_overflowed() {
        let huge = TimeDelta::try_seconds(1_000_000_000_000_000).expect("fits in TimeDelta");
        assert_eq!(
            Event::new("huge", t0(), huge, 1.0),
            Err(InvalidEvent::OutOfRange("huge".to_string()))
        );
        assert_eq!(
            Event::new("max", t0(), TimeDelta::MAX, 1.0),
            Err(InvalidEvent::OutOfRange("max".to_string()))
        );
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let a = event("a", 0, 5);
        let b = event("b", 5, 5);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn nested_and_partial_intervals_overlap() {
        let a = event("a", 0, 10);
        assert!(a.overlaps(&event("b", 2, 3)));
        assert!(a.overlaps(&event("c", 9, 5)));
        assert!(event("d", -3, 4).overlaps(&a));
    }

    #[test]
    fn active_only_inside_window() {
        let e = event("e", 0, 5);
        assert!(!e.is_active_at(t0() - TimeDelta::seconds(1)));
        assert!(e.is_active_at(t0()));
        assert!(!e.is_active_at(e.end));
        assert!(e.has_ended(e.end));
    }

    #[test]
    fn phase_transitions() {
        use EventPhase::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Ended));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Ended.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Ended));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn descriptor_expands_intervals_with_suffixed_ids() {
        let desc = EventDescriptor {
            event_id: "evt".to_string(),
            intervals: vec![
                EventInterval {
                    start: t0(),
                    duration: TimeDelta::minutes(5),
                    payload: 1.0,
                },
                EventInterval {
                    start: t0() + TimeDelta::minutes(10),
                    duration: TimeDelta::minutes(5),
                    payload: 2.0,
                },
            ],
        };
        let ids: Vec<String> = desc
            .events()
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["evt".to_string(), "evt#1".to_string()]);
    }
}
