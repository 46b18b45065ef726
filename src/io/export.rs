//! CSV export for the status history.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::dr::StatusSnapshot;

/// Column header for status history export.
const HEADER: &str = "at,dr_active,current_payload,override_error,opt_in,\
                       scheduled_count,scheduled_ids";

/// Exports status snapshots to a CSV file at the given path.
///
/// Writes a header row followed by one row per snapshot, oldest first.
///
/// # Arguments
///
/// * `history` - Recorded status snapshots
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(history: &[StatusSnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(history, buf)
}

/// Writes status snapshots as CSV to any writer.
///
/// Scheduled event ids are joined with `;` in a single column.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(history: &[StatusSnapshot], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for s in history {
        let ids: Vec<&str> = s.scheduled_events.iter().map(|e| e.id.as_str()).collect();
        wtr.write_record(&[
            s.at.to_rfc3339(),
            s.dr_active.to_string(),
            format!("{:.3}", s.current_payload),
            s.override_error.to_string(),
            s.opt_in.to_string(),
            s.scheduled_events.len().to_string(),
            ids.join(";"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dr::{EventPhase, ScheduledEventView};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 17, 0, 0).single().unwrap_or_default()
    }

    fn make_snapshot(secs: i64) -> StatusSnapshot {
        StatusSnapshot {
            at: t0() + TimeDelta::seconds(secs),
            dr_active: secs >= 60,
            current_payload: if secs >= 60 { 1.0 } else { 0.0 },
            scheduled_events: vec![
                ScheduledEventView {
                    id: "dr-1".to_string(),
                    start: t0() + TimeDelta::seconds(60),
                    end: t0() + TimeDelta::seconds(360),
                    payload: 1.0,
                    phase: EventPhase::Pending,
                },
                ScheduledEventView {
                    id: "dr-2".to_string(),
                    start: t0() + TimeDelta::seconds(360),
                    end: t0() + TimeDelta::seconds(660),
                    payload: 2.0,
                    phase: EventPhase::Pending,
                },
            ],
            override_error: false,
            opt_in: true,
        }
    }

    #[test]
    fn header_matches_columns() {
        let mut buf = Vec::new();
        write_csv(&[make_snapshot(0)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let first_line = output.as_deref().unwrap_or("").lines().next().unwrap_or("");
        assert_eq!(
            first_line,
            "at,dr_active,current_payload,override_error,opt_in,scheduled_count,scheduled_ids"
        );
    }

    #[test]
    fn one_row_per_snapshot() {
        let history: Vec<StatusSnapshot> = (0..12).map(|i| make_snapshot(i * 10)).collect();
        let mut buf = Vec::new();
        write_csv(&history, &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let lines: Vec<&str> = output.as_deref().unwrap_or("").lines().collect();
        // 1 header + 12 data rows
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn rows_parse_back() {
        let history = vec![make_snapshot(0), make_snapshot(90)];
        let mut buf = Vec::new();
        write_csv(&history, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let rows: Vec<csv::StringRecord> = rdr.records().filter_map(Result::ok).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(1), Some("false"));
        assert_eq!(rows[1].get(1), Some("true"));
        assert_eq!(rows[1].get(2), Some("1.000"));
        assert_eq!(rows[1].get(6), Some("dr-1;dr-2"));
        let at = rows[0].get(0).and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        assert_eq!(at.map(|d| d.with_timezone(&Utc)), Some(t0()));
    }
}
