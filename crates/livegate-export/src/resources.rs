//! Per-interval resource CSV records.

use std::io::Write;

use livegate_core::ResourceSnapshot;

use crate::error::ExportResult;

/// Header line for resource files, without the trailing newline.
pub const RESOURCE_HEADER: &str =
    "timestamp,cpu_usage,memory_usage,used_memory_mb,available_memory_mb";

/// Encode one snapshot, percentages to two decimals.
pub fn encode_snapshot(snapshot: &ResourceSnapshot) -> String {
    format!(
        "{},{:.2},{:.2},{},{}",
        snapshot.timestamp_ms,
        snapshot.cpu_percent,
        snapshot.memory_percent,
        snapshot.used_memory_mb,
        snapshot.available_memory_mb
    )
}

/// Appends fresh snapshots under a header. Stale snapshots are skipped so
/// each row is a distinct measurement.
pub struct ResourceCsvWriter<W: Write> {
    out: W,
    rows: u64,
}

impl<W: Write> ResourceCsvWriter<W> {
    /// Write the header immediately.
    pub fn new(mut out: W) -> ExportResult<Self> {
        writeln!(out, "{RESOURCE_HEADER}")?;
        Ok(Self { out, rows: 0 })
    }

    /// Returns whether a row was written.
    pub fn write_snapshot(&mut self, snapshot: &ResourceSnapshot) -> ExportResult<bool> {
        if !snapshot.fresh {
            return Ok(false);
        }
        writeln!(self.out, "{}", encode_snapshot(snapshot))?;
        self.out.flush()?;
        self.rows += 1;
        Ok(true)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(fresh: bool) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp_ms: 1_700_000_000_000,
            cpu_percent: 37.458,
            memory_percent: 61.0,
            used_memory_mb: 9_994,
            available_memory_mb: 6_390,
            fresh,
        }
    }

    #[test]
    fn row_format() {
        assert_eq!(
            encode_snapshot(&snapshot(true)),
            "1700000000000,37.46,61.00,9994,6390"
        );
    }

    #[test]
    fn writer_skips_stale_rows() {
        let mut w = ResourceCsvWriter::new(Vec::new()).unwrap();
        assert!(w.write_snapshot(&snapshot(true)).unwrap());
        assert!(!w.write_snapshot(&snapshot(false)).unwrap());
        assert_eq!(w.rows(), 1);

        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec![RESOURCE_HEADER, "1700000000000,37.46,61.00,9994,6390"]);
    }

    #[test]
    fn writer_targets_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_metrics.csv");
        let file = std::fs::File::create(&path).unwrap();
        let mut w = ResourceCsvWriter::new(file).unwrap();
        w.write_snapshot(&snapshot(true)).unwrap();
        drop(w);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
