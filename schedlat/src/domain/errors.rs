//! Structured error types for schedlat
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The tracing core itself has no error type; these cover setup and input.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("eBPF object not found: {}", .0.display())]
    ObjectNotFound(PathBuf),

    #[error("Failed to load eBPF program: {0}")]
    EbpfLoadFailed(String),

    #[error("Failed to attach {probe}: {error}")]
    ProbeAttachFailed { probe: String, error: String },

    #[error("eBPF map {0} not found")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to parse trace line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_not_found_display() {
        let err = TracerError::ObjectNotFound(PathBuf::from("/tmp/missing.o"));
        assert_eq!(err.to_string(), "eBPF object not found: /tmp/missing.o");
    }

    #[test]
    fn test_probe_attach_error() {
        let err = TracerError::ProbeAttachFailed {
            probe: "sched_switch".to_string(),
            error: "tracepoint not found".to_string(),
        };
        assert!(err.to_string().contains("sched_switch"));
        assert!(err.to_string().contains("tracepoint not found"));
    }

    #[test]
    fn test_replay_parse_error_names_line() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ReplayError::Parse { line: 7, source };
        assert!(err.to_string().starts_with("Failed to parse trace line 7"));
    }
}
