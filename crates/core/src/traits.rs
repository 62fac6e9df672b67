//! Storage capability contract
//!
//! This module defines the Storage trait implemented identically by the
//! in-memory backend and the log-backed backend, so the request layer can
//! swap one for the other without noticing.

use crate::context::RequestContext;
use crate::error::Result;
use crate::types::{BatchRequest, BatchResponse, FullUrl, SavedUrls, ShortId, User};

/// Storage abstraction for short URL backends
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync). The trait is object safe so
/// callers can hold an `Arc<dyn Storage>`.
///
/// Per-id lifecycle: `absent → present → deleted`. Nothing leaves
/// `deleted`, and every create attempt on a non-absent id is a `Conflict`.
pub trait Storage: Send + Sync {
    /// Resolve a short id through the global (DefaultUser) view
    ///
    /// # Errors
    ///
    /// `Deleted` if the id is tombstoned, `NotFound` if it was never stored.
    fn get(&self, id: &ShortId) -> Result<FullUrl>;

    /// Store `url` under `id` for the calling user
    ///
    /// First writer wins: an existing or tombstoned id is never overwritten.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a resolvable identity, `Conflict` if the id
    /// is taken.
    fn save(&self, ctx: &RequestContext, id: ShortId, url: FullUrl) -> Result<()>;

    /// Derive the id from the URL content and save it
    ///
    /// Returns the derived id. A `Conflict` carries the same id, so callers
    /// can still report the existing short link.
    fn put(&self, ctx: &RequestContext, url: FullUrl) -> Result<ShortId> {
        let id = ShortId::derive(&url);
        self.save(ctx, id.clone(), url)?;
        Ok(id)
    }

    /// Store every entry whose derived id is still free
    ///
    /// Best-effort union: taken or tombstoned ids are skipped silently and
    /// only stored entries appear in the response.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a resolvable identity.
    fn put_batch(&self, ctx: &RequestContext, batch: BatchRequest) -> Result<BatchResponse>;

    /// All URLs owned by the calling user
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without identity; `NotFound` for DefaultUser or when
    /// the user owns nothing.
    fn get_urls(&self, ctx: &RequestContext) -> Result<SavedUrls>;

    /// Schedule deletion of the caller's ids and return immediately
    ///
    /// Identity is validated synchronously; the deletion itself runs in the
    /// background and its outcome is not reported.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` without a resolvable identity.
    fn delete_urls(&self, ctx: &RequestContext, ids: Vec<ShortId>) -> Result<()>;

    /// Tombstone the given ids that the caller owns, synchronously
    ///
    /// Returns the subset that was actually deleted. Ids owned by other users
    /// (or unknown) are ignored. Without identity nothing is deleted.
    fn async_delete_urls(&self, ctx: &RequestContext, ids: &[ShortId]) -> Vec<ShortId>;

    /// Allocate the next user identity
    fn new_user(&self) -> Result<User>;

    /// Reconcile the identity counter with an externally observed user
    fn add_user(&self, user: User);

    /// Health check of the backend
    fn ping(&self) -> bool;
}
