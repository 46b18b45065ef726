//! Named points of one controlled zone.

use serde::Serialize;

use crate::config::ZoneConfig;
use crate::error::ConfigurationError;

use super::types::PointRef;

/// A point plus what the coordinator may do with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointDescriptor {
    /// Short role name used in logs (`"setpoint"`, `"shade-occupancy"`, ...).
    pub name: &'static str,
    pub point: PointRef,
    /// Whether the coordinator may command this point.
    pub writable: bool,
}

impl PointDescriptor {
    fn parse(
        name: &'static str,
        address: &str,
        object: &str,
        property: &str,
        writable: bool,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name,
            point: PointRef::parse(address, object, property)?,
            writable,
        })
    }
}

/// HVAC and shading points of one zone.
///
/// The HVAC setpoint is both read (current value) and commanded; mode and
/// CO2 are read-only; air flow and valve are commanded; the three shading
/// points receive the DR level, occupancy flag and heating/cooling flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePoints {
    pub setpoint: PointDescriptor,
    pub hvac_mode: PointDescriptor,
    pub co2: PointDescriptor,
    pub air_flow: PointDescriptor,
    pub valve: PointDescriptor,
    pub shade_dr_level: PointDescriptor,
    pub shade_occupancy: PointDescriptor,
    pub shade_mode: PointDescriptor,
}

impl ZonePoints {
    /// Resolves every configured point.
    ///
    /// # Errors
    ///
    /// Returns the first malformed address, object identifier or property.
    pub fn from_config(zone: &ZoneConfig) -> Result<Self, ConfigurationError> {
        let hvac = zone.hvac_address.as_str();
        let shade = zone.shading_address.as_str();
        let prop = zone.property.as_str();
        Ok(Self {
            setpoint: PointDescriptor::parse("setpoint", hvac, &zone.setpoint, prop, true)?,
            hvac_mode: PointDescriptor::parse("hvac-mode", hvac, &zone.hvac_mode, prop, false)?,
            co2: PointDescriptor::parse("co2", hvac, &zone.co2, prop, false)?,
            air_flow: PointDescriptor::parse("air-flow", hvac, &zone.air_flow, prop, true)?,
            valve: PointDescriptor::parse("valve", hvac, &zone.valve, prop, true)?,
            shade_dr_level: PointDescriptor::parse(
                "shade-dr-level",
                shade,
                &zone.shade_dr_level,
                prop,
                true,
            )?,
            shade_occupancy: PointDescriptor::parse(
                "shade-occupancy",
                shade,
                &zone.shade_occupancy,
                prop,
                true,
            )?,
            shade_mode: PointDescriptor::parse("shade-mode", shade, &zone.shade_mode, prop, true)?,
        })
    }

    /// All points in declaration order.
    pub fn all(&self) -> [&PointDescriptor; 8] {
        [
            &self.setpoint,
            &self.hvac_mode,
            &self.co2,
            &self.air_flow,
            &self.valve,
            &self.shade_dr_level,
            &self.shade_occupancy,
            &self.shade_mode,
        ]
    }
}
