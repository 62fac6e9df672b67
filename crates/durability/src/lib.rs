//! Durability layer for shortstore
//!
//! This crate handles everything that touches disk:
//!
//! - Log records: one JSON object per line, live mappings and tombstones
//! - LogFile: append-only file with a tracked read offset
//! - Replay: folding log records into an in-memory store
//! - LogTailer: filesystem watch thread for appends by other processes
//! - FileStore: the Storage backend that ties them together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod log;
pub mod record;
pub mod replay;
pub mod store;
pub mod tailer;

pub use error::LogError;
pub use log::{LogFile, ReplayStats};
pub use record::{encode_lines, LogRecord};
pub use replay::{apply_record, replay};
pub use store::{FileStore, LogOptions};
pub use tailer::LogTailer;
