//! Demand-response event coordinator for building HVAC and shading points.

#[cfg(feature = "api")]
pub mod api;
pub mod cli;
pub mod config;
/// Event registry, scheduler, control algorithm and override applicator.
pub mod dr;
pub mod error;
pub mod io;
/// Point addressing, gateway contract and simulated devices.
pub mod points;
pub mod reporting;
pub mod source;
