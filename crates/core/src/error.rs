//! Error types for the shortstore
//!
//! Every storage backend surfaces the same four domain errors synchronously.
//! Failures on the asynchronous persistence path never reach this type; they
//! are logged where they happen.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::ShortId;
use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the storage contract
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown id, or no URLs stored for the user
    #[error("not found")]
    NotFound,

    /// The id exists but has been tombstoned
    #[error("deleted")]
    Deleted,

    /// Create attempt against an existing or tombstoned id
    #[error("conflict: short id {id} is already taken")]
    Conflict {
        /// The id that could not be created
        id: ShortId,
    },

    /// No resolvable caller identity
    #[error("unauthenticated")]
    Unauthenticated,

    /// I/O error opening the backing log
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Check if this error is `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// Check if this error is `Deleted`
    pub fn is_deleted(&self) -> bool {
        matches!(self, Error::Deleted)
    }

    /// Check if this error is `Conflict`
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error is `Unauthenticated`
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Error::Unauthenticated)
    }

    /// The conflicting id, if this is a `Conflict`
    pub fn conflicting_id(&self) -> Option<&ShortId> {
        match self {
            Error::Conflict { id } => Some(id),
            _ => None,
        }
    }
}
