//! Zone control algorithm and the control-loop task.
//!
//! Each tick reads the occupancy proxy, HVAC mode and setpoint, derives the
//! new [`ControlState`] with the pure [`decide`] function, applies the
//! resulting batch and settles the state on the batch outcome.

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::config::ControlConfig;
use crate::error::CoordinatorError;
use crate::points::{PointDescriptor, ZonePoints};

use super::applicator::{BatchReport, OverrideApplicator, OverrideRequest};
use super::state::{DrActiveState, SharedState};

/// Operating mode reported by the HVAC controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Heating,
    Cooling,
    /// Raw value outside the configured mapping.
    Unknown,
}

impl HvacMode {
    pub fn from_raw(raw: f64, config: &ControlConfig) -> Self {
        if raw == f64::from(config.heating_mode_value) {
            Self::Heating
        } else if raw == f64::from(config.cooling_mode_value) {
            Self::Cooling
        } else {
            Self::Unknown
        }
    }

    /// Value written to the shading device's mode point.
    pub fn shading_flag(self) -> Option<f64> {
        match self {
            Self::Heating => Some(1.0),
            Self::Cooling => Some(0.0),
            Self::Unknown => None,
        }
    }

    /// DR setpoint shift: cooling raises the setpoint, heating lowers it.
    pub fn setpoint_shift(self, delta: f64) -> Option<f64> {
        match self {
            Self::Heating => Some(-delta),
            Self::Cooling => Some(delta),
            Self::Unknown => None,
        }
    }
}

/// Occupancy with hysteresis.
///
/// Becomes occupied above `threshold`; once occupied, only drops back
/// below `threshold - dead_band`. Inside the band the previous value holds.
pub fn occupied(previous: bool, ppm: f64, threshold: f64, dead_band: f64) -> bool {
    if ppm > threshold {
        true
    } else if previous && ppm < threshold - dead_band {
        false
    } else {
        previous
    }
}

/// Per-zone control state, owned by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlState {
    pub hvac_mode: HvacMode,
    pub occupancy: bool,
    /// Setpoint adjusted during the current active interval.
    pub setpoint_written: bool,
    /// An override sweep ran since the last release.
    pub needs_release: bool,
    pub first_sweep_done: bool,
    /// Setpoint commanded while occupied, computed once per active interval.
    pub adjusted_setpoint: Option<f64>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            hvac_mode: HvacMode::Unknown,
            occupancy: false,
            setpoint_written: false,
            needs_release: false,
            first_sweep_done: false,
            adjusted_setpoint: None,
        }
    }
}

/// Values read at the start of a tick; `None` where the read failed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub co2_ppm: Option<f64>,
    pub raw_mode: Option<f64>,
    pub setpoint: Option<f64>,
}

/// Kind of batch a tick issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sweep {
    /// Nothing changed; no writes.
    Idle,
    /// DR active: shading override plus occupancy-dependent HVAC writes.
    Override,
    /// DR ended: HVAC points back to automatic, shading to normal.
    Release,
    /// DR inactive but occupancy or mode changed: shading only.
    ShadingUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: ControlState,
    pub sweep: Sweep,
    pub requests: Vec<OverrideRequest>,
}

/// Computes the next state and the batch to apply.
///
/// Readings that failed keep the previous occupancy and mode.
pub fn decide(
    previous: &ControlState,
    dr: &DrActiveState,
    readings: &Readings,
    config: &ControlConfig,
    points: &ZonePoints,
) -> Decision {
    let mut next = *previous;
    if let Some(ppm) = readings.co2_ppm {
        next.occupancy = occupied(
            previous.occupancy,
            ppm,
            config.occ_threshold_ppm,
            config.occ_dead_band_ppm,
        );
    }
    if let Some(raw) = readings.raw_mode {
        next.hvac_mode = HvacMode::from_raw(raw, config);
    }
    let changed = next.occupancy != previous.occupancy || next.hvac_mode != previous.hvac_mode;

    let mut adjusted = false;
    if dr.active && !next.setpoint_written {
        if let (Some(current), Some(shift)) = (
            readings.setpoint,
            next.hvac_mode.setpoint_shift(config.setpoint_delta),
        ) {
            next.adjusted_setpoint = Some(current + shift);
            next.setpoint_written = true;
            adjusted = true;
        }
    }

    let sweep = if dr.active {
        if !next.first_sweep_done || changed || adjusted {
            Sweep::Override
        } else {
            Sweep::Idle
        }
    } else if next.needs_release {
        Sweep::Release
    } else if changed {
        Sweep::ShadingUpdate
    } else {
        Sweep::Idle
    };

    let priority = config.write_priority;
    let requests = match sweep {
        Sweep::Idle => Vec::new(),
        Sweep::Override => {
            next.needs_release = true;
            next.first_sweep_done = true;
            let mut batch = shading_batch(points, priority, dr.current_payload, &next);
            if next.occupancy {
                if let Some(setpoint) = next.adjusted_setpoint {
                    batch.push(OverrideRequest::write(&points.setpoint, setpoint, priority));
                }
                batch.push(OverrideRequest::release(&points.air_flow, priority));
                batch.push(OverrideRequest::release(&points.valve, priority));
            } else {
                batch.push(OverrideRequest::release(&points.setpoint, priority));
                batch.push(OverrideRequest::write(&points.air_flow, 0.0, priority));
                batch.push(OverrideRequest::write(&points.valve, 0.0, priority));
            }
            batch
        }
        Sweep::Release => {
            next.setpoint_written = false;
            next.needs_release = false;
            next.first_sweep_done = false;
            next.adjusted_setpoint = None;
            let mut batch = shading_batch(points, priority, config.normal_payload, &next);
            batch.push(OverrideRequest::release(&points.setpoint, priority));
            batch.push(OverrideRequest::release(&points.air_flow, priority));
            batch.push(OverrideRequest::release(&points.valve, priority));
            batch
        }
        Sweep::ShadingUpdate => shading_batch(points, priority, config.normal_payload, &next),
    };

    Decision {
        state: next,
        sweep,
        requests,
    }
}

fn shading_batch(
    points: &ZonePoints,
    priority: u8,
    payload: f64,
    state: &ControlState,
) -> Vec<OverrideRequest> {
    let occupancy = if state.occupancy { 1.0 } else { 0.0 };
    let mut batch = vec![
        OverrideRequest::write(&points.shade_dr_level, payload, priority),
        OverrideRequest::write(&points.shade_occupancy, occupancy, priority),
    ];
    if let Some(flag) = state.hvac_mode.shading_flag() {
        batch.push(OverrideRequest::write(&points.shade_mode, flag, priority));
    }
    batch
}

/// Adjusts the decided state after the batch ran.
///
/// A failed override sweep is redone on the next tick; a failed release
/// stays owed until it completes. A failed shading update falls back to
/// the occupancy and mode of `previous`, so the next tick sees the change
/// again and rewrites the shading points.
pub fn settle(
    previous: &ControlState,
    mut state: ControlState,
    sweep: Sweep,
    report: &BatchReport,
) -> ControlState {
    if report.is_success() {
        return state;
    }
    match sweep {
        Sweep::Override => state.first_sweep_done = false,
        Sweep::Release => state.needs_release = true,
        Sweep::ShadingUpdate => {
            state.occupancy = previous.occupancy;
            state.hvac_mode = previous.hvac_mode;
        }
        Sweep::Idle => {}
    }
    state
}

/// Why a tick ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickCause {
    Periodic,
    Activated(String),
    Deactivated(String),
    Cancelled(String),
    Swept,
    /// Out-of-cadence tick asked for by an operator or a test.
    Requested,
    Shutdown,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub cause: TickCause,
    pub dr_active: bool,
    pub sweep: Sweep,
    pub batch: Option<BatchReport>,
    pub read_failures: usize,
    pub state: ControlState,
}

/// Owns the control state of one zone and runs ticks against the gateway.
pub struct Controller {
    config: ControlConfig,
    points: ZonePoints,
    applicator: OverrideApplicator,
    state: ControlState,
}

impl Controller {
    pub fn new(config: ControlConfig, points: ZonePoints, applicator: OverrideApplicator) -> Self {
        Self {
            config,
            points,
            applicator,
            state: ControlState::default(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    async fn read_point(&self, descriptor: &PointDescriptor) -> Option<f64> {
        match self.applicator.read(&descriptor.point).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("read {} {} failed: {e}", descriptor.name, descriptor.point);
                None
            }
        }
    }

    async fn read_inputs(&self) -> (Readings, usize) {
        let readings = Readings {
            co2_ppm: self.read_point(&self.points.co2).await,
            raw_mode: self.read_point(&self.points.hvac_mode).await,
            setpoint: self.read_point(&self.points.setpoint).await,
        };
        let failures = [readings.co2_ppm, readings.raw_mode, readings.setpoint]
            .iter()
            .filter(|v| v.is_none())
            .count();
        (readings, failures)
    }

    /// Runs one tick against the given DR state.
    pub async fn tick(&mut self, cause: TickCause, dr: &DrActiveState) -> TickReport {
        let (readings, read_failures) = self.read_inputs().await;

        let decision = decide(&self.state, dr, &readings, &self.config, &self.points);
        if decision.state.hvac_mode == HvacMode::Unknown && readings.raw_mode.is_some() {
            warn!(
                "unmapped hvac mode {:?}; setpoint adjustment skipped",
                readings.raw_mode
            );
        }

        let batch = if decision.requests.is_empty() {
            debug!("tick ({cause:?}): no writes");
            None
        } else {
            info!(
                "tick ({cause:?}): {:?} sweep with {} writes, occupied={}, mode={:?}",
                decision.sweep,
                decision.requests.len(),
                decision.state.occupancy,
                decision.state.hvac_mode
            );
            let report = self.applicator.apply(&decision.requests).await;
            if !report.is_success() {
                warn!(
                    "{:?} sweep: {} of {} writes failed ({} transport)",
                    decision.sweep,
                    report.failure_count(),
                    report.outcomes.len(),
                    report.transport_failures()
                );
            }
            Some(report)
        };
        let batch_failed = batch.as_ref().is_some_and(|r| !r.is_success());
        self.applicator
            .error_flag()
            .set(read_failures > 0 || batch_failed);

        self.state = match &batch {
            Some(report) => settle(&self.state, decision.state, decision.sweep, report),
            None => decision.state,
        };

        TickReport {
            cause,
            dr_active: dr.active,
            sweep: decision.sweep,
            batch,
            read_failures,
            state: self.state,
        }
    }

    async fn tick_shared(&mut self, cause: TickCause, shared: &SharedState) -> TickReport {
        let dr = shared.lock().await.dr.clone();
        self.tick(cause, &dr).await
    }
}

/// Request for an immediate tick, answered once the tick completed.
#[derive(Debug)]
pub struct TickRequest {
    pub cause: TickCause,
    pub ack: oneshot::Sender<TickReport>,
}

/// Sender side of the control loop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<TickRequest>,
}

impl ControlHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TickRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Runs a tick now and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::ControlLoopClosed` if the loop has stopped.
    pub async fn tick_now(&self, cause: TickCause) -> Result<TickReport, CoordinatorError> {
        let (ack, report) = oneshot::channel();
        self.tx
            .send(TickRequest { cause, ack })
            .await
            .map_err(|_| CoordinatorError::ControlLoopClosed)?;
        report.await.map_err(|_| CoordinatorError::ControlLoopClosed)
    }
}

/// Control-loop task: a periodic tick plus on-demand ticks, run one at a
/// time. The first periodic tick fires immediately.
pub async fn run_control_loop(
    mut controller: Controller,
    shared: SharedState,
    mut requests: mpsc::Receiver<TickRequest>,
) {
    let mut interval = tokio::time::interval(controller.config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            request = requests.recv() => {
                let Some(request) = request else { break };
                let report = controller.tick_shared(request.cause, &shared).await;
                // The requester may have given up waiting.
                let _ = request.ack.send(report);
            }
            _ = interval.tick() => {
                controller.tick_shared(TickCause::Periodic, &shared).await;
            }
        }
    }
    debug!("control loop stopped");
}
