//! Core types and traits for shortstore
//!
//! This crate defines the foundational types used throughout the system:
//! - ShortId, FullUrl, User: the stored key, value and owning identity
//! - SavedUrls, BatchRequest, BatchResponse: contract collections
//! - RequestContext: caller identity resolution
//! - Error: domain error kinds shared by all backends
//! - Storage: the capability trait both backends implement

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod shortid;
pub mod traits;
pub mod types;

pub use context::RequestContext;
pub use error::{Error, Result};
pub use shortid::DERIVED_ID_LEN;
pub use traits::Storage;
pub use types::{BatchRequest, BatchResponse, CorrelationId, FullUrl, SavedUrls, ShortId, User};
