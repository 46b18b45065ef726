//! Error taxonomy shared by the point gateway, the override applicator and
//! the coordinator runtime.

use thiserror::Error;

/// Failure of a single read or write round-trip against the point gateway.
///
/// `Rejected`, `Aborted` and `NoResponse` are negative outcomes reported by
/// the device protocol; `Timeout` and `Transport` are faults of the path to
/// the device. Either kind is scoped to the one request that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointError {
    #[error("request rejected by device: {0}")]
    Rejected(String),

    #[error("request aborted by device: {0}")]
    Aborted(String),

    #[error("no response from device")]
    NoResponse,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown point: {0}")]
    UnknownPoint(String),
}

impl PointError {
    /// Returns `true` for outcomes the device protocol itself reported.
    pub fn is_protocol_reject(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::Aborted(_) | Self::NoResponse | Self::UnknownPoint(_)
        )
    }

    /// Returns `true` when the round-trip itself failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

/// Malformed point or write specification. Never sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("property specification incorrect: {0:?}")]
    MalformedProperty(String),

    #[error("object identifier incorrect: {0:?}")]
    MalformedObjectIdentifier(String),

    #[error("device address must not be empty")]
    EmptyAddress,

    #[error("write priority {0} outside 1..=16")]
    PriorityOutOfRange(u8),

    #[error("release is only valid for prioritized overrides")]
    ReleaseWithoutPriority,

    #[error("point {0} is not writable")]
    NotWritable(String),
}

/// Outcome of one override request that did not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Point(#[from] PointError),
}

/// Failures of the coordinator's own wiring.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("control loop is not running")]
    ControlLoopClosed,

    #[error("invalid zone configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}
