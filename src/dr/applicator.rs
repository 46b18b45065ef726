//! Turns control decisions into gateway writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, warn};

use crate::error::{ApplyError, ConfigurationError, PointError};
use crate::points::{PointDescriptor, PointGateway, PointRef, Priority, WriteValue};

/// One device write, validated before it reaches the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRequest {
    /// Role name of the point, for logs.
    pub name: &'static str,
    pub point: PointRef,
    pub writable: bool,
    pub value: WriteValue,
    /// Raw priority level; checked against `1..=16` at apply time.
    pub priority: Option<u8>,
}

impl OverrideRequest {
    pub fn write(descriptor: &PointDescriptor, value: f64, priority: u8) -> Self {
        Self::new(descriptor, WriteValue::Value(value), Some(priority))
    }

    pub fn release(descriptor: &PointDescriptor, priority: u8) -> Self {
        Self::new(descriptor, WriteValue::Release, Some(priority))
    }

    pub fn new(descriptor: &PointDescriptor, value: WriteValue, priority: Option<u8>) -> Self {
        Self {
            name: descriptor.name,
            point: descriptor.point.clone(),
            writable: descriptor.writable,
            value,
            priority,
        }
    }

    /// Checks everything that can be checked without the device.
    ///
    /// # Errors
    ///
    /// * `ReleaseWithoutPriority` - a release must name the slot it clears
    /// * `PriorityOutOfRange` - priority outside `1..=16`
    /// * `NotWritable` - the point carries no write capability
    pub fn validate(&self) -> Result<Option<Priority>, ConfigurationError> {
        let priority = self.priority.map(Priority::new).transpose()?;
        if self.value == WriteValue::Release && priority.is_none() {
            return Err(ConfigurationError::ReleaseWithoutPriority);
        }
        if !self.writable {
            return Err(ConfigurationError::NotWritable(self.point.to_string()));
        }
        Ok(priority)
    }
}

/// Result of one request within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub name: &'static str,
    pub point: PointRef,
    pub value: WriteValue,
    pub result: Result<(), ApplyError>,
}

impl RequestOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-item results of one batch, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<RequestOutcome>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(RequestOutcome::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Failures caused by the path to the device rather than the device.
    pub fn transport_failures(&self) -> usize {
        self.failures()
            .filter(|o| matches!(&o.result, Err(ApplyError::Point(e)) if e.is_transport()))
            .count()
    }
}

/// Shared `override_error` status.
///
/// Set by any failed request and cleared by the next batch in which every
/// request succeeded.
#[derive(Debug, Clone, Default)]
pub struct OverrideErrorFlag(Arc<AtomicBool>);

impl OverrideErrorFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// Applies override batches against a gateway with a per-call timeout.
#[derive(Clone)]
pub struct OverrideApplicator {
    gateway: Arc<dyn PointGateway>,
    io_timeout: Duration,
    error_flag: OverrideErrorFlag,
}

impl OverrideApplicator {
    pub fn new(gateway: Arc<dyn PointGateway>, io_timeout: Duration, error_flag: OverrideErrorFlag) -> Self {
        Self {
            gateway,
            io_timeout,
            error_flag,
        }
    }

    pub fn error_flag(&self) -> &OverrideErrorFlag {
        &self.error_flag
    }

    /// Reads one point, bounded by the I/O timeout.
    pub async fn read(&self, point: &PointRef) -> Result<f64, PointError> {
        tokio::time::timeout(self.io_timeout, self.gateway.read(point))
            .await
            .unwrap_or(Err(PointError::Timeout))
    }

    /// Applies every request in order. A failed request never stops the
    /// ones after it.
    pub async fn apply(&self, batch: &[OverrideRequest]) -> BatchReport {
        let mut outcomes = Vec::with_capacity(batch.len());
        for request in batch {
            let result = self.apply_one(request).await;
            match &result {
                Ok(()) => debug!("wrote {} {} = {}", request.name, request.point, request.value),
                Err(ApplyError::Configuration(e)) => {
                    error!("refused {} {}: {e}", request.name, request.point)
                }
                Err(ApplyError::Point(e)) if e.is_transport() => {
                    warn!("write {} {} failed: {e}", request.name, request.point)
                }
                Err(ApplyError::Point(e)) => {
                    error!("write {} {} rejected: {e}", request.name, request.point)
                }
            }
            outcomes.push(RequestOutcome {
                name: request.name,
                point: request.point.clone(),
                value: request.value,
                result,
            });
        }

        let report = BatchReport { outcomes };
        self.error_flag.set(!report.is_success());
        report
    }

    async fn apply_one(&self, request: &OverrideRequest) -> Result<(), ApplyError> {
        let priority = request.validate()?;
        tokio::time::timeout(
            self.io_timeout,
            self.gateway.write(&request.point, request.value, priority),
        )
        .await
        .unwrap_or(Err(PointError::Timeout))?;
        Ok(())
    }
}
