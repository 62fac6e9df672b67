//! Shortstore - storage layer for a URL shortener
//!
//! Maps short ids to full URLs with per-user views and irreversible
//! deletion. Two backends implement the same [`Storage`] trait:
//!
//! - [`InMemoryStore`]: process-local tables
//! - [`FileStore`]: the same tables replicated to an append-only log that
//!   several processes can share and tail
//!
//! # Quick Start
//!
//! ```ignore
//! use shortstore::{open_storage, FullUrl, RequestContext, StorageConfig};
//!
//! let storage = open_storage(&StorageConfig::file("data/urls.log"))?;
//! let ctx = RequestContext::for_user(storage.new_user()?);
//! let id = storage.put(&ctx, FullUrl::from("https://example.com"))?;
//! assert_eq!(storage.get(&id)?, FullUrl::from("https://example.com"));
//! ```

pub mod config;

pub use config::{open_storage, ConfigError, OpenError, StorageConfig};

pub use shortstore_core::{
    BatchRequest, BatchResponse, CorrelationId, Error, FullUrl, RequestContext, Result,
    SavedUrls, ShortId, Storage, User, DERIVED_ID_LEN,
};
pub use shortstore_durability::{FileStore, LogOptions};
pub use shortstore_storage::InMemoryStore;
