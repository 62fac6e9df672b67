//! Integration tests for log replay and multi-instance convergence
//!
//! These tests verify that a FileStore:
//! 1. Rebuilds the net effect of saves and deletes on restart
//! 2. Folds in records appended by another instance sharing the file
//! 3. Tolerates malformed and partial lines in the log
//! 4. Reconciles the user counter from replayed records

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use shortstore_core::{BatchRequest, FullUrl, RequestContext, ShortId, Storage, User};
use shortstore_durability::{encode_lines, FileStore, LogOptions, LogRecord};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn ctx(user: i64) -> RequestContext {
    RequestContext::for_user(User::new(user))
}

fn no_tail() -> LogOptions {
    LogOptions::default().with_live_tailing(false)
}

/// Poll `check` until it holds or the deadline passes
fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// ============================================================================
// Restart
// ============================================================================

#[test]
fn test_restart_round_trip() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");

    let kept;
    let removed;
    {
        let store = FileStore::open_with(&path, no_tail()).unwrap();
        kept = store.put(&ctx(1), FullUrl::from("https://kept")).unwrap();
        removed = store.put(&ctx(1), FullUrl::from("https://removed")).unwrap();
        store
            .save(&ctx(2), ShortId::from("custom"), FullUrl::from("https://custom"))
            .unwrap();
        store.delete_urls(&ctx(1), vec![removed.clone()]).unwrap();
        store.drain();
    }

    let reopened = FileStore::open_with(&path, no_tail()).unwrap();
    assert_eq!(reopened.get(&kept).unwrap(), FullUrl::from("https://kept"));
    assert!(reopened.get(&removed).unwrap_err().is_deleted());
    assert_eq!(
        reopened.get(&ShortId::from("custom")).unwrap(),
        FullUrl::from("https://custom")
    );

    let user1 = reopened.get_urls(&ctx(1)).unwrap();
    assert_eq!(user1.len(), 1);
    assert!(user1.contains_key(&kept));
    assert_eq!(reopened.get_urls(&ctx(2)).unwrap().len(), 1);

    // tombstones survive the restart
    assert!(reopened
        .put(&ctx(3), FullUrl::from("https://removed"))
        .unwrap_err()
        .is_conflict());
    assert_eq!(reopened.tracked_offset(), std::fs::metadata(&path).unwrap().len());
}

#[test]
fn test_restart_replays_batches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");

    {
        let store = FileStore::open_with(&path, no_tail()).unwrap();
        let mut batch = BatchRequest::new();
        for i in 0..10 {
            batch.insert(i.to_string(), FullUrl::new(format!("https://batch/{}", i)));
        }
        assert_eq!(store.put_batch(&ctx(8), batch).unwrap().len(), 10);
        store.drain();
    }

    let reopened = FileStore::open_with(&path, no_tail()).unwrap();
    assert_eq!(reopened.get_urls(&ctx(8)).unwrap().len(), 10);
}

#[test]
fn test_restart_after_saturated_queue_keeps_every_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");
    let saves = 5000;

    {
        let options = no_tail().with_workers(1).with_max_queue_depth(1);
        let store = FileStore::open_with(&path, options).unwrap();
        for i in 0..saves {
            store
                .save(
                    &ctx(1),
                    ShortId::new(format!("s{}", i)),
                    FullUrl::new(format!("https://saturated/{}", i)),
                )
                .unwrap();
        }
        store.drain();
    }

    let lines = std::fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(lines, saves);

    let reopened = FileStore::open_with(&path, no_tail()).unwrap();
    assert_eq!(reopened.memory().len(), saves);
    assert_eq!(reopened.get_urls(&ctx(1)).unwrap().len(), saves);
}

#[test]
fn test_restart_reconciles_user_counter() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");

    {
        let store = FileStore::open_with(&path, no_tail()).unwrap();
        let user = (0..5).map(|_| store.new_user().unwrap()).last().unwrap();
        assert_eq!(user, User::new(5));
        store
            .save(&ctx(user.as_i64()), ShortId::from("u5"), FullUrl::from("https://u5"))
            .unwrap();
        store.drain();
    }

    let reopened = FileStore::open_with(&path, no_tail()).unwrap();
    reopened.drain();
    assert_eq!(reopened.new_user().unwrap(), User::new(6));
}

#[test]
fn test_startup_skips_malformed_and_partial_lines() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");
    std::fs::File::create(&path).unwrap();

    let good = LogRecord::live(ShortId::from("good"), FullUrl::from("https://good"), User::new(1));
    let late = LogRecord::live(ShortId::from("late"), FullUrl::from("https://late"), User::new(1));
    let late_line = encode_lines(&[late]).unwrap();
    let (late_head, late_tail) = late_line.split_at(12);

    append_raw(&path, b"this is not json\n");
    append_raw(&path, &encode_lines(&[good]).unwrap());
    append_raw(&path, late_head);

    let store = FileStore::open_with(&path, no_tail()).unwrap();
    assert!(store.get(&ShortId::from("good")).is_ok());
    assert!(store.get(&ShortId::from("late")).unwrap_err().is_not_found());

    append_raw(&path, late_tail);
    let reopened = FileStore::open_with(&path, no_tail()).unwrap();
    assert_eq!(
        reopened.get(&ShortId::from("late")).unwrap(),
        FullUrl::from("https://late")
    );
}

#[test]
fn test_numeric_user_field_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");
    std::fs::write(
        &path,
        "{\"id\":\"n\",\"url\":\"https://n\",\"user\":4,\"deleted\":false}\n",
    )
    .unwrap();

    let store = FileStore::open_with(&path, no_tail()).unwrap();
    assert_eq!(store.get_urls(&ctx(4)).unwrap().len(), 1);
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn test_two_instances_converge() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");

    let a = FileStore::open(&path).unwrap();
    let b = FileStore::open(&path).unwrap();
    assert!(b.is_tailing(), "file watching unavailable on this platform");

    let id = a.put(&ctx(1), FullUrl::from("https://shared")).unwrap();
    a.drain();

    assert!(
        eventually(Duration::from_secs(10), || b.get(&id).is_ok()),
        "instance b never saw the save"
    );
    assert_eq!(b.get(&id).unwrap(), FullUrl::from("https://shared"));

    a.delete_urls(&ctx(1), vec![id.clone()]).unwrap();
    a.drain();

    assert!(
        eventually(Duration::from_secs(10), || b
            .get(&id)
            .map_err(|e| e.is_deleted())
            .err()
            .unwrap_or(false)),
        "instance b never saw the tombstone"
    );
}

#[test]
fn test_external_append_is_tailed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");

    let store = FileStore::open(&path).unwrap();
    let record = LogRecord::live(ShortId::from("ext"), FullUrl::from("https://ext"), User::new(77));
    append_raw(&path, &encode_lines(&[record]).unwrap());

    assert!(eventually(Duration::from_secs(10), || store
        .get(&ShortId::from("ext"))
        .is_ok()));
    assert!(eventually(Duration::from_secs(5), || store.memory().current_user()
        == User::new(77)));
}

#[test]
fn test_truncated_log_is_replayed_from_start() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.log");

    let store = FileStore::open(&path).unwrap();
    for i in 0..5 {
        store
            .put(&ctx(1), FullUrl::new(format!("https://old/{}", i)))
            .unwrap();
    }
    store.drain();

    let replacement =
        LogRecord::live(ShortId::from("new"), FullUrl::from("https://new"), User::new(2));
    std::fs::write(&path, encode_lines(&[replacement]).unwrap()).unwrap();

    assert!(eventually(Duration::from_secs(10), || store
        .get(&ShortId::from("new"))
        .is_ok()));
    // memory keeps what it already had
    assert_eq!(store.get_urls(&ctx(1)).unwrap().len(), 5);
}
