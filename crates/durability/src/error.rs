//! Error types for the log layer
//!
//! `LogError` covers everything that can go wrong touching the log file.
//! Only construction of a `FileStore` surfaces it (as `Error::Io`); on the
//! background path it is logged and dropped.

use std::io;
use thiserror::Error;

/// Errors from reading or writing the URL log
#[derive(Debug, Error)]
pub enum LogError {
    /// I/O error on the log file
    #[error("log I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line could not be decoded as a record
    #[error("malformed log record at offset {offset}: {source}")]
    Malformed {
        /// File offset of the start of the line
        offset: u64,
        /// Decoder error
        source: serde_json::Error,
    },

    /// A record could not be encoded
    #[error("cannot encode log record: {0}")]
    Encode(#[source] serde_json::Error),
}

impl From<LogError> for shortstore_core::Error {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Io(io_err) => shortstore_core::Error::Io(io_err),
            other => shortstore_core::Error::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
        }
    }
}
