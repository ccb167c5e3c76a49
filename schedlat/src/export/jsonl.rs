use anyhow::{Context, Result};
use schedlat_common::LatencyEvent;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One exported latency record
///
/// Thread names are decoded to strings; `preempted_pid` and `preempted_comm`
/// are only present for preemptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEvent {
    pub ts: u64,
    pub pid: u32,
    pub tid: u32,
    pub comm: String,
    pub delay_ns: u64,
    pub cgroup_id: u64,
    pub prev_cgroup_id: u64,
    pub preempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preempted_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preempted_comm: Option<String>,
}

impl From<&LatencyEvent> for ExportedEvent {
    fn from(event: &LatencyEvent) -> Self {
        let preempted = event.is_preemption();
        Self {
            ts: event.ts,
            pid: event.pid,
            tid: event.tid,
            comm: event.comm_str().to_string(),
            delay_ns: event.delay_ns,
            cgroup_id: event.cgroup_id,
            prev_cgroup_id: event.prev_cgroup_id,
            preempted,
            preempted_pid: preempted.then_some(event.preempted_pid),
            preempted_comm: preempted.then(|| event.preempted_comm_str().to_string()),
        }
    }
}

/// Streams latency records to a writer as JSON Lines
pub struct JsonlExporter<W: Write> {
    out: W,
    written: u64,
}

impl JsonlExporter<BufWriter<File>> {
    /// Create (or truncate) `path` for export
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create export file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlExporter<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Append one record
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn write_event(&mut self, event: &LatencyEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, &ExportedEvent::from(event))
            .context("Failed to serialize latency record")?;
        self.out.write_all(b"\n").context("Failed to write latency record")?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush buffered records and hand back the writer
    ///
    /// # Errors
    /// Returns an error if the flush fails
    pub fn finish(mut self) -> Result<W> {
        self.out.flush().context("Failed to flush export file")?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedlat_common::comm_from_bytes;

    fn event(tid: u32, is_preempt: u32) -> LatencyEvent {
        LatencyEvent {
            pid: 40,
            tid,
            delay_ns: 2_500_000,
            ts: 1_000 + u64::from(tid),
            cgroup_id: 900,
            prev_cgroup_id: 0,
            preempted_pid: if is_preempt == 1 { 3 } else { 0 },
            is_preempt,
            comm: comm_from_bytes(b"worker"),
            preempted_comm: if is_preempt == 1 { comm_from_bytes(b"hog") } else { [0; 16] },
        }
    }

    #[test]
    fn test_records_read_back_line_by_line() {
        let records = [event(42, 0), event(43, 1)];
        let mut exporter = JsonlExporter::new(Vec::new());
        for record in &records {
            exporter.write_event(record).unwrap();
        }
        assert_eq!(exporter.written(), 2);
        let bytes = exporter.finish().unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let parsed: Vec<ExportedEvent> =
            text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        let expected: Vec<ExportedEvent> = records.iter().map(ExportedEvent::from).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_blocked_predecessor_omits_preempted_fields() {
        let mut exporter = JsonlExporter::new(Vec::new());
        exporter.write_event(&event(42, 0)).unwrap();
        let text = String::from_utf8(exporter.finish().unwrap()).unwrap();

        assert!(text.contains("\"preempted\":false"));
        assert!(!text.contains("preempted_pid"));
        assert!(text.contains("\"comm\":\"worker\""));
    }

    #[test]
    fn test_preemption_carries_victim() {
        let exported = ExportedEvent::from(&event(43, 1));
        assert!(exported.preempted);
        assert_eq!(exported.preempted_pid, Some(3));
        assert_eq!(exported.preempted_comm.as_deref(), Some("hog"));
    }

    #[test]
    fn test_create_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.jsonl");
        let mut exporter = JsonlExporter::create(&path).unwrap();
        exporter.write_event(&event(42, 0)).unwrap();
        exporter.finish().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let err = JsonlExporter::create(Path::new("/nonexistent/dir/out.jsonl")).err().unwrap();
        assert!(format!("{err:#}").contains("Failed to create export file"));
    }
}
