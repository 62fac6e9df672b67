//! Storage layer for shortstore
//!
//! This crate implements the in-memory backend with:
//! - InMemoryStore: global view, per-user views and tombstones behind one RwLock
//! - UserCounter: lock-free identity allocation and reconciliation
//! - BackgroundScheduler: worker pool for fire-and-forget work
//!
//! The durability crate wraps `InMemoryStore` and shares its scheduler, so
//! log appends queue up behind the same workers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod counter;
pub mod memory;

pub use background::{
    BackgroundScheduler, BackpressureError, SchedulerStats, DEFAULT_MAX_QUEUE_DEPTH,
    DEFAULT_WORKERS,
};
pub use counter::UserCounter;
pub use memory::InMemoryStore;
