//! # Event Processing
//!
//! Consumes latency records from either source and routes them to output:
//!
//! - **Live**: raw bytes from the `EVENTS` ring buffer ([`EventProcessor::process_bytes`])
//! - **Replay**: records from the in-process tracer channel ([`EventProcessor::process_event`])
//!
//! Every record feeds the [`LatencySummary`]; unless quiet, each one is also
//! printed to stdout. With an exporter attached, each record is also appended
//! to the export file.

use anyhow::Result;
use log::warn;
use schedlat_common::LatencyEvent;
use std::fs::File;
use std::io::BufWriter;
use std::mem::size_of;

use super::event_display::{display_latency_event, ConsumerStats};
use crate::export::JsonlExporter;
use crate::summary::LatencySummary;

/// Encapsulates event processing logic and state
pub struct EventProcessor {
    quiet: bool,
    pub stats: ConsumerStats,
    summary: LatencySummary,
    exporter: Option<JsonlExporter<BufWriter<File>>>,
    export_error: Option<anyhow::Error>,
}

impl EventProcessor {
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            stats: ConsumerStats::default(),
            summary: LatencySummary::new(),
            exporter: None,
            export_error: None,
        }
    }

    /// Also append every processed record to `exporter`
    #[must_use]
    pub fn with_exporter(mut self, exporter: JsonlExporter<BufWriter<File>>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Decode and process one ring-buffer record
    ///
    /// Records shorter than [`LatencyEvent`] are counted as malformed and skipped.
    pub fn process_bytes(&mut self, bytes: &[u8]) {
        match decode_event(bytes) {
            Some(event) => self.process_event(event),
            None => {
                self.stats.malformed += 1;
                warn!("Received incomplete event ({} bytes)", bytes.len());
            }
        }
    }

    pub fn process_event(&mut self, event: LatencyEvent) {
        self.stats.received += 1;
        self.summary.record(&event);
        if !self.quiet {
            display_latency_event(&event);
        }
        self.export(&event);
    }

    // The first failed write stops the export; the error surfaces from
    // `finish_export`.
    fn export(&mut self, event: &LatencyEvent) {
        let Some(exporter) = self.exporter.as_mut() else {
            return;
        };
        if let Err(e) = exporter.write_event(event) {
            warn!("Export stopped: {e:#}");
            self.exporter = None;
            self.export_error = Some(e);
        }
    }

    /// Flush the exporter, returning how many records it wrote
    ///
    /// Returns `Ok(None)` when no exporter was attached.
    ///
    /// # Errors
    /// Returns the write error that stopped the export, or a flush failure
    pub fn finish_export(&mut self) -> Result<Option<u64>> {
        if let Some(e) = self.export_error.take() {
            return Err(e);
        }
        match self.exporter.take() {
            Some(exporter) => {
                let written = exporter.written();
                exporter.finish()?;
                Ok(Some(written))
            }
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn summary(&self) -> &LatencySummary {
        &self.summary
    }

    #[must_use]
    pub fn into_summary(self) -> LatencySummary {
        self.summary
    }
}

/// Reinterpret a ring-buffer record as a [`LatencyEvent`]
#[must_use]
pub fn decode_event(bytes: &[u8]) -> Option<LatencyEvent> {
    if bytes.len() < size_of::<LatencyEvent>() {
        return None;
    }
    // SAFETY: the length was checked, `LatencyEvent` is `repr(C)` plain data
    // with no invalid bit patterns, and the read tolerates any alignment
    #[allow(unsafe_code)]
    let event = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<LatencyEvent>()) };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;
    use crate::export::ExportedEvent;
    use schedlat_common::comm_from_bytes;

    fn event() -> LatencyEvent {
        LatencyEvent {
            pid: 40,
            tid: 42,
            delay_ns: 3_000_000,
            ts: 99,
            cgroup_id: 5,
            prev_cgroup_id: 6,
            preempted_pid: 7,
            is_preempt: 1,
            comm: comm_from_bytes(b"worker"),
            preempted_comm: comm_from_bytes(b"hog"),
        }
    }

    fn as_bytes(event: &LatencyEvent) -> Vec<u8> {
        let ptr = (event as *const LatencyEvent).cast::<u8>();
        // SAFETY: LatencyEvent has no padding, every byte is initialized
        #[allow(unsafe_code)]
        let bytes = unsafe { std::slice::from_raw_parts(ptr, size_of::<LatencyEvent>()) };
        bytes.to_vec()
    }

    #[test]
    fn test_decode_unaligned_record() {
        let mut buf = vec![0u8];
        buf.extend(as_bytes(&event()));
        assert_eq!(decode_event(&buf[1..]), Some(event()));
    }

    #[test]
    fn test_short_record_counted_as_malformed() {
        let mut processor = EventProcessor::new(true);
        processor.process_bytes(&[0u8; 12]);
        assert_eq!(processor.stats, ConsumerStats { received: 0, malformed: 1 });
        assert!(processor.summary().is_empty());
    }

    #[test]
    fn test_records_feed_summary() {
        let mut processor = EventProcessor::new(true);
        processor.process_bytes(&as_bytes(&event()));
        processor.process_event(event());

        assert_eq!(processor.stats.received, 2);
        let summary = processor.into_summary();
        let row = summary.process(Pid(40)).unwrap();
        assert_eq!(row.events, 2);
        assert_eq!(row.preemptions, 2);
        assert_eq!(summary.top_preempted(1)[0].comm, "hog");
    }

    #[test]
    fn test_exporter_receives_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let exporter = JsonlExporter::create(&path).unwrap();
        let mut processor = EventProcessor::new(true).with_exporter(exporter);

        processor.process_bytes(&as_bytes(&event()));
        processor.process_bytes(&[0u8; 4]);
        processor.process_event(event());
        assert_eq!(processor.finish_export().unwrap(), Some(2));

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<ExportedEvent> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ExportedEvent::from(&event()));
    }

    #[test]
    fn test_finish_without_exporter() {
        let mut processor = EventProcessor::new(true);
        processor.process_event(event());
        assert_eq!(processor.finish_export().unwrap(), None);
    }
}
