//! Status reports and the bounded snapshot history.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use log::info;

use crate::dr::state::StatusSnapshot;

/// Most recent status snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct StatusHistory {
    capacity: usize,
    snapshots: VecDeque<StatusSnapshot>,
}

impl StatusHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    /// Appends a snapshot, evicting the oldest once full.
    pub fn push(&mut self, snapshot: StatusSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&StatusSnapshot> {
        self.snapshots.back()
    }

    /// Snapshots taken within `[from, to]`.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<StatusSnapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.at >= from && s.at <= to)
            .cloned()
            .collect()
    }

    pub fn to_vec(&self) -> Vec<StatusSnapshot> {
        self.snapshots.iter().cloned().collect()
    }
}

/// One-line rendering used by the periodic report.
impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dr_active={} payload={} override_error={} opt_in={} events=[",
            self.dr_active, self.current_payload, self.override_error, self.opt_in
        )?;
        for (i, e) in self.scheduled_events.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {:?} {}..{}", e.id, e.phase, e.start.format("%H:%M:%S"), e.end.format("%H:%M:%S"))?;
        }
        f.write_str("]")
    }
}

pub fn log_snapshot(snapshot: &StatusSnapshot) {
    info!("status: {snapshot}");
}

/// Counts printed at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub snapshots: usize,
    pub active_snapshots: usize,
    pub error_snapshots: usize,
}

impl RunSummary {
    pub fn from_history(history: &[StatusSnapshot]) -> Self {
        Self {
            snapshots: history.len(),
            active_snapshots: history.iter().filter(|s| s.dr_active).count(),
            error_snapshots: history.iter().filter(|s| s.override_error).count(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Status snapshots: {}", self.snapshots)?;
        writeln!(f, "With DR active: {}", self.active_snapshots)?;
        write!(f, "With override error: {}", self.error_snapshots)
    }
}
