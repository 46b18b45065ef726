//! Point addressing, write values and the gateway contract.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConfigurationError, PointError};

/// Network address of a device as understood by the gateway (e.g. `"32:18"`
/// for an MS/TP device behind a router, `"10.7.6.161/24:47820"` for IP).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Wraps a non-empty address string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::EmptyAddress` for blank input.
    pub fn new(address: &str) -> Result<Self, ConfigurationError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(ConfigurationError::EmptyAddress);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object type half of an object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl ObjectType {
    const NAMES: [(&'static str, ObjectType); 9] = [
        ("analog-input", ObjectType::AnalogInput),
        ("analog-output", ObjectType::AnalogOutput),
        ("analog-value", ObjectType::AnalogValue),
        ("binary-input", ObjectType::BinaryInput),
        ("binary-output", ObjectType::BinaryOutput),
        ("binary-value", ObjectType::BinaryValue),
        ("multi-state-input", ObjectType::MultiStateInput),
        ("multi-state-output", ObjectType::MultiStateOutput),
        ("multi-state-value", ObjectType::MultiStateValue),
    ];

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, t)| *t == self)
            .map_or("unknown", |(n, _)| n)
    }
}

/// `(object-type, instance)` pair, written as `"analog-value,27"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }
}

impl FromStr for ObjectIdentifier {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigurationError::MalformedObjectIdentifier(s.to_string());
        let (kind, instance) = s.split_once(',').ok_or_else(malformed)?;
        let kind = kind.trim();
        let object_type = ObjectType::NAMES
            .iter()
            .find(|(n, _)| *n == kind)
            .map(|(_, t)| *t)
            .ok_or_else(malformed)?;
        let instance = instance.trim().parse::<u32>().map_err(|_| malformed())?;
        Ok(Self::new(object_type, instance))
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.object_type.name(), self.instance)
    }
}

/// Property name with an optional array index: `present-value` or
/// `priority-array[8]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyRef {
    pub name: String,
    pub index: Option<u32>,
}

impl PropertyRef {
    pub fn present_value() -> Self {
        Self {
            name: "present-value".to_string(),
            index: None,
        }
    }
}

impl FromStr for PropertyRef {
    type Err = ConfigurationError;

    /// Accepts `^[A-Za-z-]+(\[[0-9]+\])?$`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigurationError::MalformedProperty(s.to_string());
        let (name, index) = match s.split_once('[') {
            Some((name, rest)) => {
                let digits = rest.strip_suffix(']').ok_or_else(malformed)?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                let index = digits.parse::<u32>().map_err(|_| malformed())?;
                (name, Some(index))
            }
            None => (s, None),
        };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-') {
            return Err(malformed());
        }
        Ok(Self {
            name: name.to_string(),
            index,
        })
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{i}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Fully qualified point: device, object and property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PointRef {
    pub address: DeviceAddress,
    pub object: ObjectIdentifier,
    pub property: PropertyRef,
}

impl PointRef {
    /// Parses the three textual parts of a point reference.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the first malformed part.
    pub fn parse(address: &str, object: &str, property: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            address: DeviceAddress::new(address)?,
            object: object.parse()?,
            property: property.parse()?,
        })
    }
}

impl fmt::Display for PointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.address, self.object, self.property)
    }
}

/// Slot in the device's 16-level priority array. 1 is highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Priority(u8);

impl Priority {
    /// # Errors
    ///
    /// Returns `ConfigurationError::PriorityOutOfRange` outside `1..=16`.
    pub fn new(level: u8) -> Result<Self, ConfigurationError> {
        if (1..=16).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ConfigurationError::PriorityOutOfRange(level))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

/// Value carried by a write: a number, or the distinguished release marker
/// that hands the point back to lower-priority writers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WriteValue {
    Value(f64),
    Release,
}

impl fmt::Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Release => f.write_str("null"),
        }
    }
}

/// Read/write access to device points.
///
/// Implementations carry the device protocol; the coordinator only relies
/// on these two calls. `priority: None` means a plain write with no
/// override semantics and is never combined with [`WriteValue::Release`].
#[async_trait]
pub trait PointGateway: Send + Sync {
    async fn read(&self, point: &PointRef) -> Result<f64, PointError>;

    async fn write(
        &self,
        point: &PointRef,
        value: WriteValue,
        priority: Option<Priority>,
    ) -> Result<(), PointError>;
}
