//! API request, response and query types.

use chrono::{DateTime, TimeDelta, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::dr::{CancelOutcome, EventDescriptor, EventInterval, OptDecision};

/// Event descriptor as delivered over HTTP.
#[derive(Debug, Deserialize)]
pub struct DescriptorRequest {
    pub event_id: String,
    pub intervals: Vec<IntervalRequest>,
}

/// One interval; `start` is RFC 3339.
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub start: DateTime<Utc>,
    pub duration_secs: i64,
    pub payload: f64,
}

/// Intervals whose duration does not fit a `TimeDelta` are dropped with a
/// warning.
impl From<DescriptorRequest> for EventDescriptor {
    fn from(req: DescriptorRequest) -> Self {
        let intervals = req
            .intervals
            .into_iter()
            .filter_map(|i| match TimeDelta::try_seconds(i.duration_secs) {
                Some(duration) => Some(EventInterval {
                    start: i.start,
                    duration,
                    payload: i.payload,
                }),
                None => {
                    warn!(
                        "event {}: interval dropped, duration {}s out of range",
                        req.event_id, i.duration_secs
                    );
                    None
                }
            })
            .collect();
        Self {
            event_id: req.event_id,
            intervals,
        }
    }
}

/// Answer to a delivered descriptor.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub event_id: String,
    pub decision: OptDecision,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub event_id: String,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Deserialize)]
pub struct OptInRequest {
    pub opt_in: bool,
}

#[derive(Debug, Serialize)]
pub struct OptInResponse {
    pub opt_in: bool,
}

/// Optional time range for the history endpoint (inclusive, RFC 3339).
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
