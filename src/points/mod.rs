//! Device-point access: addressing, the gateway contract and adapters.

/// Named HVAC and shading points of a zone.
pub mod catalog;
/// In-memory priority-array simulator.
pub mod simulated;
pub mod types;

pub use catalog::{PointDescriptor, ZonePoints};
pub use simulated::SimulatedGateway;
pub use types::{PointGateway, PointRef, Priority, WriteValue};
