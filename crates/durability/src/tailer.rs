//! Live tailing of the URL log
//!
//! A dedicated thread owns a filesystem watcher on the log path and calls
//! back on every data write. This is how processes that share one log file
//! converge without talking to each other.
//!
//! If the watcher cannot be set up, tailing is disabled for the process:
//! the failure is logged and the store keeps working from its startup replay.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

/// Handle to a running tail thread
///
/// There is no shutdown call. The thread stops at the first event after its
/// callback returns `ControlFlow::Break`.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    handle: JoinHandle<()>,
}

impl LogTailer {
    /// Start watching `path`, calling `on_write` after every write event
    ///
    /// The watch is registered before this returns, so writes that land
    /// afterwards are observed. Returns `None` (after logging) if the
    /// watcher or the thread cannot be set up.
    pub fn spawn<F>(path: &Path, mut on_write: F) -> Option<Self>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let path = path.to_path_buf();
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = match RecommendedWatcher::new(tx, Config::default()) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(error = %e, "cannot initialize url log watcher, live tailing disabled");
                return None;
            }
        };
        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            error!(
                path = %path.display(),
                error = %e,
                "cannot watch url log, live tailing disabled"
            );
            return None;
        }

        let thread_path = path.clone();
        let spawned = thread::Builder::new()
            .name("shortstore-log-tail".to_string())
            .spawn(move || {
                // owned here so the watch lives exactly as long as the loop
                let _watcher = watcher;
                for result in rx {
                    match result {
                        Ok(event) if is_write(&event.kind) => {
                            if on_write().is_break() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(path = %thread_path.display(), error = %e, "url log watcher error"),
                    }
                }
                debug!(path = %thread_path.display(), "url log tailing stopped");
            });

        match spawned {
            Ok(handle) => {
                info!(path = %path.display(), "live tailing url log");
                Some(Self { path, handle })
            }
            Err(e) => {
                error!(error = %e, "cannot spawn url log tail thread, live tailing disabled");
                None
            }
        }
    }

    /// Path being watched
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the tail thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, MetadataKind};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn test_is_write() {
        assert!(is_write(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_write(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_write(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!is_write(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_missing_path_disables_tailing() {
        let dir = TempDir::new().unwrap();
        let tailer = LogTailer::spawn(&dir.path().join("absent.log"), || ControlFlow::Continue(()));
        assert!(tailer.is_none());
    }

    #[test]
    fn test_callback_runs_on_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.log");
        std::fs::File::create(&path).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let tailer = LogTailer::spawn(&path, move || {
            h.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(tailer.path(), path.as_path());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"line\n").unwrap();
        file.sync_all().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(hits.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_break_stops_thread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.log");
        std::fs::File::create(&path).unwrap();

        let tailer = LogTailer::spawn(&path, || ControlFlow::Break(())).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"x\n")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !tailer.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(tailer.is_finished());
    }
}
