//! InMemoryStore: concurrent short URL tables with per-user views
//!
//! This module implements the Storage trait using:
//! - one `parking_lot::RwLock` over all tables (global view, per-user views,
//!   tombstones); mutations hold the write lock for their whole critical
//!   section, lookups hold the read lock
//! - `UserCounter` for identity allocation, updated lock-free
//! - `BackgroundScheduler` for work the caller must not wait on
//!
//! # Design Notes
//!
//! - **Global view is the uniqueness domain**: every live id is in the
//!   DefaultUser table; per-user tables are subsets of it
//! - **Tombstones are forever**: a deleted id blocks any later create
//! - **Cheap handles**: `InMemoryStore` is an `Arc` handle; clones share state,
//!   which is how background tasks reach the store

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use shortstore_core::{
    BatchRequest, BatchResponse, Error, FullUrl, RequestContext, Result, SavedUrls, ShortId,
    Storage, User,
};

use crate::background::BackgroundScheduler;
use crate::counter::UserCounter;

/// All URL tables, guarded together by one lock
#[derive(Debug, Default)]
struct UrlTables {
    /// DefaultUser view: every live id
    global: SavedUrls,
    /// Per-user views, created lazily on a user's first write
    owners: FxHashMap<User, SavedUrls>,
    /// Permanently deleted ids
    tombstones: FxHashSet<ShortId>,
}

impl UrlTables {
    fn is_taken(&self, id: &ShortId) -> bool {
        self.tombstones.contains(id) || self.global.contains_key(id)
    }

    /// Make sure `user` has a table. Returns true if it was just created.
    ///
    /// DefaultUser's table is the global view and always exists.
    fn ensure_owner(&mut self, user: User) -> bool {
        if user.is_default() || self.owners.contains_key(&user) {
            return false;
        }
        self.owners.insert(user, SavedUrls::default());
        true
    }

    fn insert(&mut self, user: User, id: ShortId, url: FullUrl) {
        if !user.is_default() {
            self.owners
                .entry(user)
                .or_default()
                .insert(id.clone(), url.clone());
        }
        self.global.insert(id, url);
    }

    fn owned_by(&self, user: User) -> Option<&SavedUrls> {
        if user.is_default() {
            Some(&self.global)
        } else {
            self.owners.get(&user)
        }
    }

    /// Tombstone `id` if `user` owns it. Returns true if it was deleted.
    ///
    /// DefaultUser owns the global view, so it can delete any live id; the id
    /// also leaves whichever user table holds it.
    fn delete_owned(&mut self, user: User, id: &ShortId) -> bool {
        if user.is_default() {
            if self.global.remove(id).is_none() {
                return false;
            }
            for table in self.owners.values_mut() {
                if table.remove(id).is_some() {
                    break;
                }
            }
        } else {
            let Some(table) = self.owners.get_mut(&user) else {
                return false;
            };
            if table.remove(id).is_none() {
                return false;
            }
            self.global.remove(id);
        }
        self.tombstones.insert(id.clone());
        true
    }
}

struct MemoryState {
    tables: RwLock<UrlTables>,
    users: UserCounter,
    scheduler: Arc<BackgroundScheduler>,
}

/// Concurrent in-memory storage backend
///
/// Thread-safe through a single `parking_lot::RwLock` and an atomic counter.
/// Cloning yields another handle to the same store.
///
/// # Example
///
/// ```
/// use shortstore_core::{FullUrl, RequestContext, Storage, User};
/// use shortstore_storage::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// let ctx = RequestContext::for_user(User::new(1));
/// let id = store.put(&ctx, FullUrl::from("https://example.com")).unwrap();
/// assert_eq!(store.get(&id).unwrap().as_str(), "https://example.com");
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<MemoryState>,
}

impl InMemoryStore {
    /// Create an empty store with its own default background scheduler
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(BackgroundScheduler::default()))
    }

    /// Create an empty store that runs background work on `scheduler`
    pub fn with_scheduler(scheduler: Arc<BackgroundScheduler>) -> Self {
        Self {
            state: Arc::new(MemoryState {
                tables: RwLock::new(UrlTables::default()),
                users: UserCounter::new(),
                scheduler,
            }),
        }
    }

    /// The scheduler this store submits background work to
    pub fn scheduler(&self) -> &Arc<BackgroundScheduler> {
        &self.state.scheduler
    }

    /// Submit fire-and-forget work
    ///
    /// Waits for queue space when the scheduler is saturated; the work is
    /// never dropped.
    pub fn spawn_background(&self, what: &'static str, work: impl FnOnce() + Send + 'static) {
        let stats = self.state.scheduler.stats();
        if stats.queue_depth >= self.state.scheduler.max_queue_depth() {
            debug!(task = what, queue_depth = stats.queue_depth, "background queue full, waiting");
        }
        self.state.scheduler.submit_wait(work);
    }

    /// Block until all background work submitted so far has finished
    ///
    /// Reports nothing about individual tasks.
    pub fn drain(&self) {
        self.state.scheduler.drain();
    }

    /// Current value of the user counter
    pub fn current_user(&self) -> User {
        self.state.users.current()
    }

    /// Number of live ids in the global view
    pub fn len(&self) -> usize {
        self.state.tables.read().global.len()
    }

    /// Check whether the global view is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned ids
    pub fn tombstone_count(&self) -> usize {
        self.state.tables.read().tombstones.len()
    }

    /// Register a newly seen identity with the counter without blocking
    fn register_user_later(&self, user: User) {
        let store = self.clone();
        self.spawn_background("register-user", move || store.add_user(user));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("users", &self.state.users)
            .finish_non_exhaustive()
    }
}

impl Storage for InMemoryStore {
    fn get(&self, id: &ShortId) -> Result<FullUrl> {
        let tables = self.state.tables.read();
        if tables.tombstones.contains(id) {
            return Err(Error::Deleted);
        }
        tables.global.get(id).cloned().ok_or(Error::NotFound)
    }

    fn save(&self, ctx: &RequestContext, id: ShortId, url: FullUrl) -> Result<()> {
        let user = ctx.user()?;

        let created = {
            let mut tables = self.state.tables.write();
            if tables.is_taken(&id) {
                return Err(Error::Conflict { id });
            }
            let created = tables.ensure_owner(user);
            tables.insert(user, id, url);
            created
        };

        if created {
            self.register_user_later(user);
        }
        Ok(())
    }

    fn put_batch(&self, ctx: &RequestContext, batch: BatchRequest) -> Result<BatchResponse> {
        let user = ctx.user()?;

        let mut response = BatchResponse::with_capacity(batch.len());
        let created = {
            let mut tables = self.state.tables.write();
            let created = tables.ensure_owner(user);
            for (correlation_id, url) in batch {
                let id = ShortId::derive(&url);
                if tables.is_taken(&id) {
                    trace!(%id, "batch entry skipped, id taken");
                    continue;
                }
                tables.insert(user, id.clone(), url);
                response.insert(correlation_id, id);
            }
            created
        };

        if created {
            self.register_user_later(user);
        }
        Ok(response)
    }

    fn get_urls(&self, ctx: &RequestContext) -> Result<SavedUrls> {
        let user = ctx.user()?;
        if user.is_default() {
            return Err(Error::NotFound);
        }

        let tables = self.state.tables.read();
        match tables.owned_by(user) {
            Some(urls) if !urls.is_empty() => Ok(urls.clone()),
            _ => Err(Error::NotFound),
        }
    }

    fn delete_urls(&self, ctx: &RequestContext, ids: Vec<ShortId>) -> Result<()> {
        ctx.user()?;

        let store = self.clone();
        let ctx = ctx.clone();
        self.spawn_background("delete-urls", move || {
            store.async_delete_urls(&ctx, &ids);
        });
        Ok(())
    }

    fn async_delete_urls(&self, ctx: &RequestContext, ids: &[ShortId]) -> Vec<ShortId> {
        let Ok(user) = ctx.user() else {
            return Vec::new();
        };

        let mut tables = self.state.tables.write();
        if tables.owned_by(user).is_none() {
            return Vec::new();
        }

        let deleted: Vec<ShortId> = ids
            .iter()
            .filter(|id| tables.delete_owned(user, id))
            .cloned()
            .collect();
        debug!(%user, requested = ids.len(), deleted = deleted.len(), "urls tombstoned");
        deleted
    }

    fn new_user(&self) -> Result<User> {
        Ok(self.state.users.next())
    }

    fn add_user(&self, user: User) {
        self.state.users.observe(user);
    }

    fn ping(&self) -> bool {
        true
    }
}
