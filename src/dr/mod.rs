//! Demand-response event lifecycle: registry, scheduler, control algorithm
//! and override application.

pub mod applicator;
pub mod clock;
pub mod control;
pub mod event;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod timers;

pub use applicator::{BatchReport, OverrideApplicator, OverrideErrorFlag, OverrideRequest};
pub use clock::{Clock, SystemClock, TokioClock};
pub use control::{ControlState, HvacMode, Sweep, TickCause, TickReport};
pub use event::{Event, EventDescriptor, EventInterval, EventPhase};
pub use registry::{EventRegistry, RegisterOutcome};
pub use runtime::Coordinator;
pub use scheduler::{CancelOutcome, OptDecision, Scheduler};
pub use state::{DrActiveState, ScheduledEventView, StatusSnapshot};
