//! Log replay into an in-memory store
//!
//! Each record is applied as the operation that produced it, under the
//! identity of its owner: a live record becomes a `save`, a tombstone becomes
//! an `async_delete_urls`. Records that no longer apply (an id already
//! present, a tombstone for an id the owner no longer holds) are expected
//! when a process sees its own history again, and are skipped.

use tracing::{debug, trace};

use shortstore_core::{RequestContext, Storage};
use shortstore_storage::InMemoryStore;

use crate::error::LogError;
use crate::log::{LogFile, ReplayStats};
use crate::record::LogRecord;

/// Apply one record to `store`
pub fn apply_record(store: &InMemoryStore, record: LogRecord) {
    let ctx = RequestContext::for_user(record.user);

    if record.deleted {
        let deleted = store.async_delete_urls(&ctx, std::slice::from_ref(&record.id));
        if deleted.is_empty() {
            trace!(id = %record.id, user = %record.user, "tombstone had nothing to delete");
        }
        return;
    }

    if let Err(e) = store.save(&ctx, record.id, record.url) {
        debug!(error = %e, user = %record.user, "replayed record not applied");
    }
}

/// Replay everything past the log's cursor into `store`
pub fn replay(log: &LogFile, store: &InMemoryStore) -> Result<ReplayStats, LogError> {
    let stats = log.read_new(|record| apply_record(store, record))?;
    if stats.records > 0 || stats.malformed > 0 {
        debug!(
            path = %log.path().display(),
            records = stats.records,
            malformed = stats.malformed,
            bytes = stats.bytes_read,
            offset = log.offset(),
            "replayed url log"
        );
    }
    Ok(stats)
}
