//! Latency record export
//!
//! Writes every reported delay to a file for later processing. Currently
//! supports JSON Lines, one object per record.

pub mod jsonl;

pub use jsonl::{ExportedEvent, JsonlExporter};
