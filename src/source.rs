//! Scripted inputs for the demo binary: event deliveries into the
//! scheduler and fault windows on the simulated gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{info, warn};
use tokio::time::Instant;

use crate::config::{EventConfig, FaultConfig};
use crate::dr::{EventDescriptor, EventInterval, Scheduler};
use crate::error::PointError;
use crate::points::{PointRef, SimulatedGateway, ZonePoints};

/// One step of the script.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceAction {
    Deliver(EventDescriptor),
    Cancel(String),
}

/// Delivers descriptors and cancellations at fixed offsets from start.
#[derive(Debug, Clone)]
pub struct ScriptedEventSource {
    actions: Vec<(Duration, SourceAction)>,
}

impl ScriptedEventSource {
    /// Builds the script; interval offsets are relative to `anchor`.
    pub fn new(anchor: DateTime<Utc>, events: &[EventConfig]) -> Self {
        let mut actions = Vec::new();
        for event in events {
            let descriptor = EventDescriptor {
                event_id: event.id.clone(),
                intervals: event
                    .intervals
                    .iter()
                    .filter_map(|i| {
                        let interval = TimeDelta::try_seconds(i.start_offset_secs)
                            .and_then(|offset| anchor.checked_add_signed(offset))
                            .zip(TimeDelta::try_seconds(i.duration_secs))
                            .map(|(start, duration)| EventInterval {
                                start,
                                duration,
                                payload: i.payload,
                            });
                        if interval.is_none() {
                            warn!("event {}: interval out of range, dropped", event.id);
                        }
                        interval
                    })
                    .collect(),
            };
            actions.push((
                Duration::from_secs(event.deliver_at_secs),
                SourceAction::Deliver(descriptor),
            ));
            if let Some(at) = event.cancel_at_secs {
                actions.push((Duration::from_secs(at), SourceAction::Cancel(event.id.clone())));
            }
        }
        // Stable: deliveries stay ahead of cancellations at the same offset.
        actions.sort_by_key(|(at, _)| *at);
        Self { actions }
    }

    pub fn actions(&self) -> &[(Duration, SourceAction)] {
        &self.actions
    }

    /// Plays the script against `scheduler`.
    pub async fn run(self, scheduler: Scheduler) {
        let started = Instant::now();
        for (at, action) in self.actions {
            tokio::time::sleep_until(started + at).await;
            match action {
                SourceAction::Deliver(descriptor) => {
                    let decision = scheduler.handle_event(&descriptor).await;
                    info!("source: event {} answered {decision:?}", descriptor.event_id);
                }
                SourceAction::Cancel(id) => {
                    let outcome = scheduler.cancel(&id).await;
                    info!("source: cancel {id}: {outcome:?}");
                }
            }
        }
    }
}

/// Error the gateway returns for a configured fault kind.
pub fn fault_error(kind: &str) -> Option<PointError> {
    match kind {
        "timeout" => Some(PointError::Timeout),
        "no_response" => Some(PointError::NoResponse),
        "rejected" => Some(PointError::Rejected("write-access-denied".to_string())),
        "aborted" => Some(PointError::Aborted("segmentation-not-supported".to_string())),
        "transport" => Some(PointError::Transport("network unreachable".to_string())),
        _ => None,
    }
}

/// Injects and clears gateway faults at fixed offsets from start.
///
/// A `None` error clears the fault on that point.
#[derive(Debug, Clone)]
pub struct FaultScript {
    steps: Vec<(Duration, PointRef, Option<PointError>)>,
}

impl FaultScript {
    /// Resolves each fault's point by role name; unknown names and kinds
    /// are skipped with a warning.
    pub fn new(zone: &ZonePoints, faults: &[FaultConfig]) -> Self {
        let mut steps = Vec::new();
        for fault in faults {
            let Some(descriptor) = zone.all().into_iter().find(|p| p.name == fault.point) else {
                warn!("fault script: unknown point \"{}\"", fault.point);
                continue;
            };
            let Some(error) = fault_error(&fault.kind) else {
                warn!("fault script: unknown fault kind \"{}\"", fault.kind);
                continue;
            };
            let point = descriptor.point.clone();
            steps.push((Duration::from_secs(fault.from_secs), point.clone(), Some(error)));
            if let Some(until) = fault.until_secs {
                steps.push((Duration::from_secs(until), point, None));
            }
        }
        steps.sort_by_key(|(at, _, _)| *at);
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Plays the fault windows against `gateway`.
    pub async fn run(self, gateway: Arc<SimulatedGateway>) {
        let started = Instant::now();
        for (at, point, error) in self.steps {
            tokio::time::sleep_until(started + at).await;
            match error {
                Some(error) => {
                    warn!("fault script: {point} now fails with {error}");
                    gateway.inject_fault(point, error).await;
                }
                None => {
                    info!("fault script: {point} recovered");
                    gateway.clear_fault(&point).await;
                }
            }
        }
    }
}
