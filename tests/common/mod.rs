//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;

use dr_coordinator::config::{CoordinatorConfig, ZoneConfig};
use dr_coordinator::dr::{Coordinator, Event, TokioClock};
use dr_coordinator::points::{Priority, SimulatedGateway, ZonePoints};

/// Wall-clock instant the paused test clock starts at.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 17, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Default zone points (HVAC controller 32:18, shading 10.7.6.161/24:47820).
pub fn zone() -> ZonePoints {
    ZonePoints::from_config(&ZoneConfig::default()).expect("default zone parses")
}

/// Priority the coordinator writes at by default.
pub fn write_priority() -> Priority {
    Priority::new(3).expect("valid priority")
}

/// Coordinator configuration with one-minute ticks and no scripted events.
pub fn test_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.control.tick_interval_secs = 60;
    config.scheduler.sweep_interval_secs = 30;
    config.scheduler.report_interval_secs = 10;
    config
}

/// Event starting `start_secs` after [`t0`].
pub fn event(id: &str, start_secs: i64, duration_secs: i64, payload: f64) -> Event {
    Event::new(
        id,
        t0() + TimeDelta::seconds(start_secs),
        TimeDelta::seconds(duration_secs),
        payload,
    )
    .expect("valid event")
}

/// Running coordinator against a simulated zone (cooling, setpoint 72).
pub struct Harness {
    pub coordinator: Coordinator,
    pub gateway: Arc<SimulatedGateway>,
    pub zone: ZonePoints,
    started: Instant,
}

impl Harness {
    /// Starts a coordinator whose clock reads [`t0`] now. Call from a
    /// `start_paused` test.
    pub async fn start(config: &CoordinatorConfig, co2_ppm: f64) -> Self {
        Self::start_in_mode(config, co2_ppm, 4.0).await
    }

    /// Like [`Harness::start`] with the controller reporting `raw_mode`.
    pub async fn start_in_mode(config: &CoordinatorConfig, co2_ppm: f64, raw_mode: f64) -> Self {
        let zone = zone();
        let gateway =
            Arc::new(SimulatedGateway::for_zone(&zone, 7, 72.0, raw_mode, co2_ppm).await);
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let coordinator =
            Coordinator::start(config, gateway.clone(), clock).expect("coordinator starts");
        Self {
            coordinator,
            gateway,
            zone,
            started: Instant::now(),
        }
    }

    /// Sleeps until `secs` after start.
    pub async fn at(&self, secs: u64) {
        tokio::time::sleep_until(self.started + Duration::from_secs(secs)).await;
    }

    pub async fn set_co2(&self, ppm: f64) {
        self.gateway
            .set_relinquish_default(&self.zone.co2.point, ppm)
            .await;
    }

    /// Value the coordinator holds in its priority slot of a point.
    pub async fn held(&self, point: &dr_coordinator::points::PointRef) -> Option<f64> {
        self.gateway.slot(point, write_priority()).await
    }
}
