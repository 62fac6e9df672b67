//! FileStore: in-memory store replicated to an append-only log
//!
//! Every mutation lands in the wrapped `InMemoryStore` first, so this
//! process sees it immediately. One record per affected id is then appended
//! to the log on the background scheduler; the caller is never told whether
//! that append succeeded.
//!
//! On open the whole log is replayed into a fresh in-memory store. After
//! that a tail thread replays whatever other processes append. Once its
//! watch is registered the log is read once more, catching lines appended
//! between the startup replay and the watch.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use shortstore_core::{
    BatchRequest, BatchResponse, FullUrl, RequestContext, Result, SavedUrls, ShortId, Storage,
    User,
};
use shortstore_storage::{
    BackgroundScheduler, InMemoryStore, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_WORKERS,
};

use crate::log::LogFile;
use crate::record::LogRecord;
use crate::replay::replay;
use crate::tailer::LogTailer;

/// Options for opening a `FileStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Watch the log for appends from other processes
    pub live_tailing: bool,
    /// Background worker threads for appends and deferred deletes
    pub workers: usize,
    /// Bound on queued background tasks
    pub max_queue_depth: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            live_tailing: true,
            workers: DEFAULT_WORKERS,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

impl LogOptions {
    /// Enable or disable live tailing
    pub fn with_live_tailing(mut self, enabled: bool) -> Self {
        self.live_tailing = enabled;
        self
    }

    /// Set the number of background workers
    ///
    /// 0 runs every background task inline on the calling thread, deferred
    /// deletes included. Meant for tests.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the background queue bound
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }
}

struct FileStoreInner {
    memory: InMemoryStore,
    log: Arc<LogFile>,
}

/// Log-backed storage backend
///
/// Cloning yields another handle to the same store.
///
/// # Example
///
/// ```ignore
/// let store = FileStore::open("data/urls.log")?;
/// let ctx = RequestContext::for_user(store.new_user()?);
/// let id = store.put(&ctx, FullUrl::from("https://example.com"))?;
/// ```
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
    tailing: bool,
}

impl FileStore {
    /// Open the log at `path` with default options
    ///
    /// # Errors
    ///
    /// `Error::Io` if the log cannot be created or read for the startup
    /// replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, LogOptions::default())
    }

    /// Open the log at `path`
    ///
    /// Replays the whole file, then starts the tail thread if enabled. A tail
    /// thread that cannot start is logged and does not fail the open.
    pub fn open_with<P: AsRef<Path>>(path: P, options: LogOptions) -> Result<Self> {
        let log = LogFile::open_or_create(path.as_ref())?;
        let scheduler = Arc::new(BackgroundScheduler::new(
            options.workers,
            options.max_queue_depth,
        ));
        let memory = InMemoryStore::with_scheduler(scheduler);

        let stats = replay(&log, &memory)?;
        info!(
            path = %log.path().display(),
            records = stats.records,
            malformed = stats.malformed,
            offset = log.offset(),
            "url log loaded"
        );

        let inner = Arc::new(FileStoreInner {
            memory,
            log: Arc::new(log),
        });

        let tailing = options.live_tailing && Self::start_tailing(&inner);
        Ok(Self { inner, tailing })
    }

    fn start_tailing(inner: &Arc<FileStoreInner>) -> bool {
        let weak = Arc::downgrade(inner);
        let started = LogTailer::spawn(inner.log.path(), move || match weak.upgrade() {
            Some(inner) => {
                Self::catch_up(&inner);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(()),
        })
        .is_some();

        if started {
            Self::catch_up(inner);
        }
        started
    }

    /// Replay whatever was appended past the tracked offset
    fn catch_up(inner: &FileStoreInner) {
        if let Err(e) = replay(&inner.log, &inner.memory) {
            warn!(error = %e, "url log tail replay failed");
        }
    }

    /// Path of the backing log
    pub fn path(&self) -> &Path {
        self.inner.log.path()
    }

    /// Offset up to which the log has been consumed or written
    pub fn tracked_offset(&self) -> u64 {
        self.inner.log.offset()
    }

    /// Whether live tailing is running
    pub fn is_tailing(&self) -> bool {
        self.tailing
    }

    /// The wrapped in-memory store
    pub fn memory(&self) -> &InMemoryStore {
        &self.inner.memory
    }

    /// Block until queued appends and deferred deletes have run
    pub fn drain(&self) {
        self.inner.memory.drain();
    }

    fn append_later(&self, records: Vec<LogRecord>) {
        if records.is_empty() {
            return;
        }
        let log = Arc::clone(&self.inner.log);
        self.inner.memory.spawn_background("log-append", move || {
            if let Err(e) = log.append(&records) {
                error!(
                    path = %log.path().display(),
                    records = records.len(),
                    error = %e,
                    "cannot append to url log"
                );
            }
        });
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.log.path())
            .field("tailing", &self.tailing)
            .finish_non_exhaustive()
    }
}

impl Storage for FileStore {
    fn get(&self, id: &ShortId) -> Result<FullUrl> {
        self.inner.memory.get(id)
    }

    fn save(&self, ctx: &RequestContext, id: ShortId, url: FullUrl) -> Result<()> {
        let user = ctx.user()?;
        self.inner.memory.save(ctx, id.clone(), url.clone())?;
        self.append_later(vec![LogRecord::live(id, url, user)]);
        Ok(())
    }

    fn put_batch(&self, ctx: &RequestContext, batch: BatchRequest) -> Result<BatchResponse> {
        let user = ctx.user()?;
        let response = self.inner.memory.put_batch(ctx, batch.clone())?;

        let records = response
            .iter()
            .filter_map(|(correlation_id, id)| {
                batch
                    .get(correlation_id)
                    .map(|url| LogRecord::live(id.clone(), url.clone(), user))
            })
            .collect();
        self.append_later(records);
        Ok(response)
    }

    fn get_urls(&self, ctx: &RequestContext) -> Result<SavedUrls> {
        self.inner.memory.get_urls(ctx)
    }

    fn delete_urls(&self, ctx: &RequestContext, ids: Vec<ShortId>) -> Result<()> {
        ctx.user()?;

        let store = self.clone();
        let ctx = ctx.clone();
        self.inner.memory.spawn_background("delete-urls", move || {
            store.async_delete_urls(&ctx, &ids);
        });
        Ok(())
    }

    fn async_delete_urls(&self, ctx: &RequestContext, ids: &[ShortId]) -> Vec<ShortId> {
        let deleted = self.inner.memory.async_delete_urls(ctx, ids);
        if let Ok(user) = ctx.user() {
            self.append_later(
                deleted
                    .iter()
                    .map(|id| LogRecord::tombstone(id.clone(), user))
                    .collect(),
            );
        }
        deleted
    }

    fn new_user(&self) -> Result<User> {
        self.inner.memory.new_user()
    }

    fn add_user(&self, user: User) {
        self.inner.memory.add_user(user);
    }

    fn ping(&self) -> bool {
        self.inner.memory.ping() && self.inner.log.is_writable()
    }
}
