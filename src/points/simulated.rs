//! In-memory point gateway used by the demo binary and by tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::PointError;

use super::catalog::ZonePoints;
use super::types::{PointGateway, PointRef, Priority, WriteValue};

/// Occupancy-proxy generator: a sinusoidal CO2 profile with Gaussian noise.
///
/// `ppm(t) = base_ppm + amp_ppm * sin(2π t / period) + N(0, noise_std)`
#[derive(Debug, Clone)]
pub struct Co2Profile {
    pub base_ppm: f64,
    pub amp_ppm: f64,
    pub period: Duration,
    pub noise_std: f64,
}

impl Co2Profile {
    fn sample(&self, elapsed: Duration, rng: &mut StdRng) -> f64 {
        let period = self.period.as_secs_f64().max(1.0);
        let angle = 2.0 * std::f64::consts::PI * elapsed.as_secs_f64() / period;
        let ppm = self.base_ppm + self.amp_ppm * angle.sin() + gaussian_noise(rng, self.noise_std);
        ppm.max(0.0)
    }
}

/// Gaussian noise via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// One accepted write, in the order the gateway received it.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub point: PointRef,
    pub value: WriteValue,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone)]
struct SimPoint {
    relinquish_default: f64,
    priority_array: [Option<f64>; 16],
    writable: bool,
}

impl SimPoint {
    fn new(value: f64, writable: bool) -> Self {
        Self {
            relinquish_default: value,
            priority_array: [None; 16],
            writable,
        }
    }

    fn present_value(&self) -> f64 {
        self.priority_array
            .iter()
            .flatten()
            .copied()
            .next()
            .unwrap_or(self.relinquish_default)
    }
}

#[derive(Debug)]
struct SimInner {
    points: HashMap<PointRef, SimPoint>,
    faults: HashMap<PointRef, PointError>,
    co2: Option<(PointRef, Co2Profile)>,
    rng: StdRng,
    journal: Vec<WriteRecord>,
    reads: usize,
}

/// Priority-array device simulator.
///
/// Each point keeps a relinquish default plus sixteen priority slots; the
/// present value is the highest-priority occupied slot. A release clears
/// its slot. Faults injected per point are returned for every read and
/// write of that point until cleared.
#[derive(Debug)]
pub struct SimulatedGateway {
    inner: Mutex<SimInner>,
    started: Instant,
    latency: Duration,
}

impl SimulatedGateway {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(SimInner {
                points: HashMap::new(),
                faults: HashMap::new(),
                co2: None,
                rng: StdRng::seed_from_u64(seed),
                journal: Vec::new(),
                reads: 0,
            }),
            started: Instant::now(),
            latency: Duration::ZERO,
        }
    }

    /// Simulated round-trip time added to every request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Creates a gateway holding every point of `zone` with starting values.
    pub async fn for_zone(zone: &ZonePoints, seed: u64, setpoint: f64, raw_mode: f64, co2_ppm: f64) -> Self {
        let gateway = Self::new(seed);
        for descriptor in zone.all() {
            let initial = if descriptor.point == zone.setpoint.point {
                setpoint
            } else if descriptor.point == zone.hvac_mode.point {
                raw_mode
            } else if descriptor.point == zone.co2.point {
                co2_ppm
            } else {
                0.0
            };
            gateway
                .add_point(descriptor.point.clone(), initial, descriptor.writable)
                .await;
        }
        gateway
    }

    pub async fn add_point(&self, point: PointRef, value: f64, writable: bool) {
        let mut inner = self.inner.lock().await;
        inner.points.insert(point, SimPoint::new(value, writable));
    }

    /// Drives `point` from a CO2 profile instead of its stored value.
    pub async fn set_co2_profile(&self, point: PointRef, profile: Co2Profile) {
        self.inner.lock().await.co2 = Some((point, profile));
    }

    /// Sets the value the device's own control logic would produce.
    pub async fn set_relinquish_default(&self, point: &PointRef, value: f64) {
        let mut inner = self.inner.lock().await;
        if let Some(p) = inner.points.get_mut(point) {
            p.relinquish_default = value;
        }
    }

    pub async fn inject_fault(&self, point: PointRef, error: PointError) {
        self.inner.lock().await.faults.insert(point, error);
    }

    pub async fn clear_fault(&self, point: &PointRef) {
        self.inner.lock().await.faults.remove(point);
    }

    pub async fn present_value(&self, point: &PointRef) -> Option<f64> {
        self.inner
            .lock()
            .await
            .points
            .get(point)
            .map(SimPoint::present_value)
    }

    /// Value held at `priority` for `point`, `None` when the slot is empty.
    pub async fn slot(&self, point: &PointRef, priority: Priority) -> Option<f64> {
        self.inner
            .lock()
            .await
            .points
            .get(point)
            .and_then(|p| p.priority_array[usize::from(priority.level() - 1)])
    }

    pub async fn journal(&self) -> Vec<WriteRecord> {
        self.inner.lock().await.journal.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.journal.len()
    }

    pub async fn read_count(&self) -> usize {
        self.inner.lock().await.reads
    }
}

#[async_trait]
impl PointGateway for SimulatedGateway {
    async fn read(&self, point: &PointRef) -> Result<f64, PointError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let elapsed = self.started.elapsed();
        let mut inner = self.inner.lock().await;
        inner.reads += 1;
        if let Some(err) = inner.faults.get(point) {
            return Err(err.clone());
        }
        let inner = &mut *inner;
        if let Some((co2_point, profile)) = &inner.co2 {
            if co2_point == point {
                return Ok(profile.sample(elapsed, &mut inner.rng));
            }
        }
        inner
            .points
            .get(point)
            .map(SimPoint::present_value)
            .ok_or_else(|| PointError::UnknownPoint(point.to_string()))
    }

    async fn write(
        &self,
        point: &PointRef,
        value: WriteValue,
        priority: Option<Priority>,
    ) -> Result<(), PointError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.faults.get(point) {
            return Err(err.clone());
        }
        let sim = inner
            .points
            .get_mut(point)
            .ok_or_else(|| PointError::UnknownPoint(point.to_string()))?;
        if !sim.writable {
            return Err(PointError::Rejected("write-access-denied".to_string()));
        }
        // Unprioritized writes land in the lowest slot.
        let slot = usize::from(priority.map_or(16, Priority::level) - 1);
        sim.priority_array[slot] = match value {
            WriteValue::Value(v) => Some(v),
            WriteValue::Release => None,
        };
        inner.journal.push(WriteRecord {
            point: point.clone(),
            value,
            priority,
        });
        Ok(())
    }
}
