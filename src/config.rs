//! Storage configuration and backend selection
//!
//! A `StorageConfig` with no file path selects the in-memory backend;
//! setting a path selects the log-backed one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shortstore_core::Storage;
use shortstore_durability::{FileStore, LogOptions};
use shortstore_storage::{
    BackgroundScheduler, InMemoryStore, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_WORKERS,
};
use thiserror::Error;
use tracing::info;

/// Invalid configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Background work needs at least one worker
    #[error("worker count must be greater than zero")]
    NoWorkers,

    /// A queue that holds nothing rejects every task
    #[error("max queue depth must be greater than zero")]
    NoQueueDepth,

    /// `file_storage_path` is set but empty
    #[error("file storage path is empty")]
    EmptyPath,
}

/// Failure to open a storage backend
#[derive(Debug, Error)]
pub enum OpenError {
    /// The configuration did not validate
    #[error("invalid storage config: {0}")]
    Config(#[from] ConfigError),

    /// The backend could not be opened
    #[error("cannot open storage: {0}")]
    Storage(#[from] shortstore_core::Error),
}

/// Configuration for `open_storage`
///
/// # Example
/// ```ignore
/// let config = StorageConfig::file("data/urls.log").with_workers(4);
/// let storage = open_storage(&config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Log file backing the store; `None` keeps everything in memory
    pub file_storage_path: Option<PathBuf>,
    /// Follow appends made by other processes (file backend only)
    pub live_tailing: bool,
    /// Background worker threads
    pub workers: usize,
    /// Bound on queued background tasks
    pub max_queue_depth: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_storage_path: None,
            live_tailing: true,
            workers: DEFAULT_WORKERS,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

impl StorageConfig {
    /// In-memory storage with default settings
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Log-backed storage at `path` with default settings
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file_storage_path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Set the log file path
    pub fn with_file_storage_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file_storage_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable live tailing
    pub fn with_live_tailing(mut self, enabled: bool) -> Self {
        self.live_tailing = enabled;
        self
    }

    /// Set the number of background workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the background queue bound
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Whether this selects the log-backed store
    pub fn is_persistent(&self) -> bool {
        self.file_storage_path.is_some()
    }

    /// Check the settings
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::NoQueueDepth);
        }
        if let Some(path) = &self.file_storage_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath);
            }
        }
        Ok(())
    }

    fn log_options(&self) -> LogOptions {
        LogOptions::default()
            .with_live_tailing(self.live_tailing)
            .with_workers(self.workers)
            .with_max_queue_depth(self.max_queue_depth)
    }
}

/// Open the backend `config` selects
///
/// # Errors
///
/// `OpenError::Config` for an invalid config, `OpenError::Storage` if the
/// log file cannot be opened or replayed.
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, OpenError> {
    config.validate()?;

    match &config.file_storage_path {
        Some(path) => {
            let store = FileStore::open_with(path, config.log_options())?;
            info!(path = %path.display(), tailing = store.is_tailing(), "using file storage");
            Ok(Arc::new(store))
        }
        None => {
            let scheduler = BackgroundScheduler::new(config.workers, config.max_queue_depth);
            info!(workers = config.workers, "using in-memory storage");
            Ok(Arc::new(InMemoryStore::with_scheduler(Arc::new(scheduler))))
        }
    }
}
