//! Recorded scheduler events (JSON Lines)
//!
//! One event per line:
//!
//! ```text
//! {"type":"wakeup","tid":42,"pid":40,"ts":1000000}
//! {"type":"switch","ts":3000000,"cpu":0,"prev_state":"interruptible",
//!  "prev":{"pid":7,"tid":7,"comm":"kworker"},"next":{"pid":40,"tid":42,"comm":"worker"}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::domain::ReplayError;
use schedlat_common::{
    comm_from_bytes, TaskInfo, TASK_INTERRUPTIBLE, TASK_RUNNING, TASK_UNINTERRUPTIBLE,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A scheduler event as delivered by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedEvent {
    /// A thread became runnable
    Wakeup {
        tid: u32,
        #[serde(default)]
        pid: u32,
        ts: u64,
    },
    /// A CPU switched from `prev` to `next`
    Switch {
        ts: u64,
        #[serde(default)]
        cpu: u32,
        prev: TaskRecord,
        prev_state: PrevState,
        next: TaskRecord,
    },
}

/// One side of a recorded switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub pid: u32,
    pub tid: u32,
    #[serde(default)]
    pub comm: String,
    /// cgroup id, 0 when unknown
    #[serde(default)]
    pub cgroup_id: u64,
}

impl TaskRecord {
    #[must_use]
    pub fn to_task_info(&self) -> TaskInfo {
        TaskInfo { pid: self.pid, tid: self.tid, comm: comm_from_bytes(self.comm.as_bytes()) }
    }
}

/// Scheduler state of the outgoing task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrevState {
    /// Still runnable: the switch is a preemption
    #[serde(alias = "runnable")]
    Running,
    #[serde(alias = "sleeping")]
    Interruptible,
    #[serde(alias = "blocked")]
    Uninterruptible,
}

impl PrevState {
    /// Kernel `prev_state` value
    #[must_use]
    pub fn raw(self) -> i64 {
        match self {
            PrevState::Running => TASK_RUNNING,
            PrevState::Interruptible => TASK_INTERRUPTIBLE,
            PrevState::Uninterruptible => TASK_UNINTERRUPTIBLE,
        }
    }
}

/// Parse a JSON Lines trace
///
/// # Errors
/// Returns [`ReplayError::Parse`] with the 1-based line number of the first
/// malformed event, or [`ReplayError::Io`] if reading fails
pub fn read_trace<R: BufRead>(reader: R) -> Result<Vec<SchedEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|source| ReplayError::Parse { line: index + 1, source })?;
        events.push(event);
    }
    Ok(events)
}

/// Parse a JSON Lines trace file
///
/// # Errors
/// See [`read_trace`]; also fails if the file cannot be opened
pub fn load_trace(path: &Path) -> Result<Vec<SchedEvent>, ReplayError> {
    let file = File::open(path)?;
    read_trace(BufReader::new(file))
}
