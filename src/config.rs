//! TOML-based coordinator configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::points::ZonePoints;

/// Top-level coordinator configuration parsed from TOML.
///
/// All fields have defaults matching the baseline preset. Load from
/// TOML with [`CoordinatorConfig::from_toml_file`] or use
/// [`CoordinatorConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Control algorithm thresholds and write parameters.
    #[serde(default)]
    pub control: ControlConfig,
    /// Sweep, reporting and opt-in settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Device points of the controlled zone.
    #[serde(default)]
    pub zone: ZoneConfig,
    /// Simulated gateway used by the binary.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Scripted events replayed by the event source.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// Control algorithm parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Period of the control tick (s, must be > 0).
    pub tick_interval_secs: u64,
    /// CO2 level above which the zone counts as occupied (ppm). 600 pairs
    /// with the 50 ppm dead band; sites tuned without a dead band use 550.
    pub occ_threshold_ppm: f64,
    /// Hysteresis band below the threshold (ppm, must be < threshold).
    pub occ_dead_band_ppm: f64,
    /// Setpoint shift while DR is active (raised when cooling, lowered when heating).
    pub setpoint_delta: f64,
    /// Raw HVAC mode value meaning heating.
    pub heating_mode_value: u32,
    /// Raw HVAC mode value meaning cooling.
    pub cooling_mode_value: u32,
    /// Priority-array slot used for overrides and releases (1..=16).
    pub write_priority: u8,
    /// Payload written to the shading device outside DR events.
    pub normal_payload: f64,
    /// Bound on each gateway round-trip (s, must be > 0).
    pub io_timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            occ_threshold_ppm: 600.0,
            occ_dead_band_ppm: 50.0,
            setpoint_delta: 1.5,
            heating_mode_value: 2,
            cooling_mode_value: 4,
            write_priority: 3,
            normal_payload: 0.0,
            io_timeout_secs: 5,
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Scheduler housekeeping and status reporting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Period of the expired-event sweep (s, must be > 0).
    pub sweep_interval_secs: u64,
    /// Period of the status report (s, must be > 0).
    pub report_interval_secs: u64,
    /// Initial opt-in decision returned to the event source.
    pub opt_in: bool,
    /// Number of status snapshots kept for export.
    pub history_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            report_interval_secs: 10,
            opt_in: true,
            history_capacity: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

/// Addresses and object identifiers of the zone's points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoneConfig {
    /// Device address of the HVAC controller.
    pub hvac_address: String,
    /// Device address of the shading controller.
    pub shading_address: String,
    /// Property read and written on every point.
    pub property: String,
    pub setpoint: String,
    pub hvac_mode: String,
    pub co2: String,
    pub air_flow: String,
    pub valve: String,
    pub shade_dr_level: String,
    pub shade_occupancy: String,
    pub shade_mode: String,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            hvac_address: "32:18".to_string(),
            shading_address: "10.7.6.161/24:47820".to_string(),
            property: "present-value".to_string(),
            setpoint: "analog-value,27".to_string(),
            hvac_mode: "multi-state-value,5".to_string(),
            co2: "analog-input,8".to_string(),
            air_flow: "analog-value,13".to_string(),
            valve: "analog-output,2".to_string(),
            shade_dr_level: "analog-value,99".to_string(),
            shade_occupancy: "analog-value,98".to_string(),
            shade_mode: "analog-value,97".to_string(),
        }
    }
}

/// Simulated gateway parameters for the demo binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Master random seed.
    pub seed: u64,
    /// Mean CO2 level (ppm).
    pub co2_base_ppm: f64,
    /// Sinusoidal CO2 amplitude (ppm).
    pub co2_amp_ppm: f64,
    /// Period of the CO2 cycle (s, must be > 0).
    pub co2_period_secs: u64,
    /// Gaussian noise standard deviation (ppm).
    pub co2_noise_std: f64,
    /// Setpoint held by the HVAC controller's own logic.
    pub initial_setpoint: f64,
    /// Raw HVAC mode reported by the controller.
    pub raw_mode: f64,
    /// Simulated round-trip time per request (ms).
    pub latency_ms: u64,
    /// Run length of the binary (s, must be > 0).
    pub duration_secs: u64,
    /// Faults injected into the gateway during the run.
    pub faults: Vec<FaultConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            co2_base_ppm: 600.0,
            co2_amp_ppm: 120.0,
            co2_period_secs: 1800,
            co2_noise_std: 10.0,
            initial_setpoint: 72.0,
            raw_mode: 4.0,
            latency_ms: 0,
            duration_secs: 900,
            faults: Vec::new(),
        }
    }
}

/// A fault on one zone point, active over `[from_secs, until_secs)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultConfig {
    /// Point role name, e.g. `"co2"` or `"setpoint"`.
    pub point: String,
    /// `"timeout"`, `"no_response"`, `"rejected"`, `"aborted"` or `"transport"`.
    pub kind: String,
    pub from_secs: u64,
    /// Fault stays until shutdown when omitted.
    #[serde(default)]
    pub until_secs: Option<u64>,
}

impl FaultConfig {
    pub const KINDS: &[&str] = &["timeout", "no_response", "rejected", "aborted", "transport"];
}

/// One scripted event descriptor, delivered `deliver_at_secs` after start.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    pub id: String,
    #[serde(default)]
    pub deliver_at_secs: u64,
    /// Cancels the event (first interval) at this offset when set.
    #[serde(default)]
    pub cancel_at_secs: Option<u64>,
    pub intervals: Vec<IntervalConfig>,
}

/// One interval of a scripted event, relative to coordinator start.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalConfig {
    /// May be negative for an interval that already started.
    pub start_offset_secs: i64,
    pub duration_secs: i64,
    pub payload: f64,
}

impl EventConfig {
    fn single(id: &str, start_offset_secs: i64, duration_secs: i64, payload: f64) -> Self {
        Self {
            id: id.to_string(),
            deliver_at_secs: 0,
            cancel_at_secs: None,
            intervals: vec![IntervalConfig {
                start_offset_secs,
                duration_secs,
                payload,
            }],
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"control.write_priority"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl CoordinatorConfig {
    /// Returns the baseline preset: one five-minute event a minute after start.
    pub fn baseline() -> Self {
        Self {
            events: vec![EventConfig::single("dr-1", 60, 300, 1.0)],
            ..Self::default()
        }
    }

    /// Returns the back-to-back preset: two adjacent events plus a late
    /// conflicting submission that must be rejected.
    pub fn back_to_back() -> Self {
        let mut late = EventConfig::single("dr-conflict", 200, 300, 3.0);
        late.deliver_at_secs = 30;
        Self {
            control: ControlConfig {
                tick_interval_secs: 30,
                ..ControlConfig::default()
            },
            simulation: SimulationConfig {
                duration_secs: 1200,
                ..SimulationConfig::default()
            },
            events: vec![
                EventConfig::single("dr-1", 60, 300, 1.0),
                EventConfig::single("dr-2", 360, 300, 2.0),
                late,
            ],
            ..Self::default()
        }
    }

    /// Returns the faulty-gateway preset: a CO2 sensor outage and a
    /// setpoint that refuses writes for part of the event.
    pub fn faulty_gateway() -> Self {
        Self {
            control: ControlConfig {
                tick_interval_secs: 30,
                ..ControlConfig::default()
            },
            simulation: SimulationConfig {
                latency_ms: 50,
                faults: vec![
                    FaultConfig {
                        point: "co2".to_string(),
                        kind: "timeout".to_string(),
                        from_secs: 120,
                        until_secs: Some(240),
                    },
                    FaultConfig {
                        point: "setpoint".to_string(),
                        kind: "rejected".to_string(),
                        from_secs: 50,
                        until_secs: Some(150),
                    },
                ],
                ..SimulationConfig::default()
            },
            events: vec![EventConfig::single("dr-1", 60, 300, 1.0)],
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "back_to_back", "faulty_gateway"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "back_to_back" => Ok(Self::back_to_back()),
            "faulty_gateway" => Ok(Self::faulty_gateway()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        let c = &self.control;
        check(c.tick_interval_secs > 0, "control.tick_interval_secs", "must be > 0");
        check(c.io_timeout_secs > 0, "control.io_timeout_secs", "must be > 0");
        check(
            (1..=16).contains(&c.write_priority),
            "control.write_priority",
            "must be in [1, 16]",
        );
        check(
            c.occ_dead_band_ppm >= 0.0 && c.occ_dead_band_ppm < c.occ_threshold_ppm,
            "control.occ_dead_band_ppm",
            "must be >= 0 and < control.occ_threshold_ppm",
        );
        check(
            c.heating_mode_value != c.cooling_mode_value,
            "control.heating_mode_value",
            "must differ from control.cooling_mode_value",
        );
        check(
            c.setpoint_delta.is_finite() && c.normal_payload.is_finite(),
            "control.setpoint_delta",
            "setpoint_delta and normal_payload must be finite",
        );

        let s = &self.scheduler;
        check(s.sweep_interval_secs > 0, "scheduler.sweep_interval_secs", "must be > 0");
        check(s.report_interval_secs > 0, "scheduler.report_interval_secs", "must be > 0");
        check(s.history_capacity > 0, "scheduler.history_capacity", "must be > 0");

        let sim = &self.simulation;
        check(sim.co2_period_secs > 0, "simulation.co2_period_secs", "must be > 0");
        check(sim.duration_secs > 0, "simulation.duration_secs", "must be > 0");
        check(sim.co2_noise_std >= 0.0, "simulation.co2_noise_std", "must be >= 0");

        for (i, fault) in sim.faults.iter().enumerate() {
            check(
                FaultConfig::KINDS.contains(&fault.kind.as_str()),
                &format!("simulation.faults[{i}].kind"),
                &format!("must be one of {}", FaultConfig::KINDS.join(", ")),
            );
            check(
                fault.until_secs.is_none_or(|until| until > fault.from_secs),
                &format!("simulation.faults[{i}].until_secs"),
                "must be > from_secs",
            );
        }

        for (i, event) in self.events.iter().enumerate() {
            check(!event.id.trim().is_empty(), &format!("events[{i}].id"), "must not be empty");
            check(
                !event.intervals.is_empty(),
                &format!("events[{i}].intervals"),
                "must contain at least one interval",
            );
            for (j, interval) in event.intervals.iter().enumerate() {
                check(
                    interval.duration_secs > 0,
                    &format!("events[{i}].intervals[{j}].duration_secs"),
                    "must be > 0",
                );
            }
        }

        match ZonePoints::from_config(&self.zone) {
            Ok(points) => {
                for fault in &sim.faults {
                    check(
                        points.all().iter().any(|p| p.name == fault.point),
                        "simulation.faults.point",
                        &format!("unknown zone point \"{}\"", fault.point),
                    );
                }
            }
            Err(e) => check(false, "zone", &e.to_string()),
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_valid() {
        let cfg = CoordinatorConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = CoordinatorConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.err();
        assert!(e.is_some_and(|e| e.message.contains("unknown preset")));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in CoordinatorConfig::PRESETS {
            let cfg = CoordinatorConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn defaults_match_site_building() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.control.tick_interval(), Duration::from_secs(60));
        assert_eq!(cfg.control.occ_threshold_ppm, 600.0);
        assert_eq!(cfg.control.write_priority, 3);
        assert_eq!(cfg.zone.setpoint, "analog-value,27");
        assert!(cfg.events.is_empty());
    }

    #[test]
    fn no_dead_band_tuning_is_accepted() {
        let toml_str = r#"
[control]
occ_threshold_ppm = 550.0
occ_dead_band_ppm = 0.0
write_priority = 10
"#;
        let cfg = CoordinatorConfig::from_toml_str(toml_str).expect("parses");
        assert_eq!(cfg.control.occ_threshold_ppm, 550.0);
        assert_eq!(cfg.control.write_priority, 10);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[control]
tick_interval_secs = 30
occ_threshold_ppm = 800.0
occ_dead_band_ppm = 100.0
write_priority = 8

[scheduler]
opt_in = false

[zone]
hvac_address = "12:3"

[simulation]
seed = 7

[[simulation.faults]]
point = "valve"
kind = "no_response"
from_secs = 10

[[events]]
id = "evt-9"
deliver_at_secs = 5
cancel_at_secs = 120

[[events.intervals]]
start_offset_secs = 60
duration_secs = 300
payload = 2.0
"#;
        let cfg = CoordinatorConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.control.write_priority), Some(8));
        assert_eq!(cfg.as_ref().map(|c| c.scheduler.opt_in), Some(false));
        assert_eq!(cfg.as_ref().map(|c| &*c.zone.hvac_address), Some("12:3"));
        assert_eq!(cfg.as_ref().map(|c| &*c.zone.co2), Some("analog-input,8"));
        assert_eq!(
            cfg.as_ref().and_then(|c| c.events.first()).and_then(|e| e.cancel_at_secs),
            Some(120)
        );
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[control]
tick_interval_secs = 60
bogus_field = true
"#;
        assert!(CoordinatorConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_priority_out_of_range() {
        let mut cfg = CoordinatorConfig::baseline();
        cfg.control.write_priority = 17;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "control.write_priority"));
    }

    #[test]
    fn validation_catches_dead_band_wider_than_threshold() {
        let mut cfg = CoordinatorConfig::baseline();
        cfg.control.occ_dead_band_ppm = 700.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "control.occ_dead_band_ppm"));
    }

    #[test]
    fn validation_catches_zero_duration_interval() {
        let mut cfg = CoordinatorConfig::baseline();
        cfg.events[0].intervals[0].duration_secs = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "events[0].intervals[0].duration_secs"));
    }

    #[test]
    fn validation_catches_bad_zone_object() {
        let mut cfg = CoordinatorConfig::baseline();
        cfg.zone.co2 = "analog-input".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "zone"));
    }

    #[test]
    fn validation_catches_unknown_fault_point_and_kind() {
        let mut cfg = CoordinatorConfig::baseline();
        cfg.simulation.faults.push(FaultConfig {
            point: "boiler".to_string(),
            kind: "meltdown".to_string(),
            from_secs: 0,
            until_secs: None,
        });
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.faults.point"));
        assert!(errors.iter().any(|e| e.field == "simulation.faults[0].kind"));
    }

    #[test]
    fn back_to_back_events_touch() {
        let cfg = CoordinatorConfig::back_to_back();
        let first = &cfg.events[0].intervals[0];
        let second = &cfg.events[1].intervals[0];
        assert_eq!(
            first.start_offset_secs + first.duration_secs,
            second.start_offset_secs
        );
    }
}
