//! Background task runner for fire-and-forget work.
//!
//! Provides a FIFO task queue drained by a fixed pool of worker threads.
//! Stores submit work here that must not block the caller: identity
//! registration, deferred deletes and log appends. Submitters get no
//! completion signal for an individual task; `drain()` is the only way to
//! wait, and it waits for everything.
//!
//! Two ways in:
//! - `submit()` rejects with `BackpressureError` when the queue is full
//! - `submit_wait()` never loses a task: it waits for queue space, and runs
//!   the task inline once the scheduler is shut down
//!
//! A scheduler with zero workers runs every task inline on the submitting
//! thread. That is meant for tests; nothing is deferred then.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error};

/// Default number of worker threads per scheduler
pub const DEFAULT_WORKERS: usize = 2;

/// Default bound on queued (not yet running) tasks
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 4096;

/// Error returned when a task cannot be queued.
#[derive(Debug)]
pub struct BackpressureError;

impl std::fmt::Display for BackpressureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "background scheduler queue is full or shut down")
    }
}

impl std::error::Error for BackpressureError {}

/// Scheduler metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of tasks waiting in the queue.
    pub queue_depth: usize,
    /// Number of tasks currently being executed by workers.
    pub active_tasks: usize,
    /// Total number of tasks completed since scheduler creation.
    pub tasks_completed: u64,
    /// Number of worker threads.
    pub worker_count: usize,
}

type Task = Box<dyn FnOnce() + Send>;

struct SchedulerInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    space_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
}

/// A pool of worker threads executing submitted closures in FIFO order.
///
/// Dropping the scheduler shuts it down: queued tasks still run, then the
/// workers are joined.
pub struct BackgroundScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    num_threads: usize,
}

impl BackgroundScheduler {
    /// Create a new scheduler with the given number of worker threads.
    ///
    /// Workers are named `shortstore-bg-0`, `shortstore-bg-1`, etc. A worker
    /// that fails to spawn is logged and skipped; with no workers at all,
    /// submitted tasks run inline on the submitting thread.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> Self {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            space_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            match thread::Builder::new()
                .name(format!("shortstore-bg-{}", i))
                .spawn(move || worker_loop(&inner_clone))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => error!(worker = i, error = %e, "failed to spawn background worker"),
            }
        }

        let num_threads = workers.len();
        let worker_ids = workers.iter().map(|h| h.thread().id()).collect();
        debug!(workers = num_threads, max_queue_depth, "background scheduler started");

        Self {
            inner,
            workers: Mutex::new(workers),
            worker_ids,
            num_threads,
        }
    }

    /// Submit a task to the background scheduler.
    ///
    /// Returns `Err(BackpressureError)` if the queue is at capacity or
    /// the scheduler has been shut down.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackpressureError);
        }

        if self.num_threads == 0 {
            self.run_inline(Box::new(work));
            return Ok(());
        }

        {
            let mut queue = self.inner.queue.lock();
            if self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth {
                return Err(BackpressureError);
            }
            queue.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Submit a task, waiting for queue space if the queue is full.
    ///
    /// The task is never dropped. Worker threads of this scheduler skip the
    /// bound. After shutdown the task runs inline on the calling thread.
    pub fn submit_wait(&self, work: impl FnOnce() + Send + 'static) {
        if self.num_threads == 0 || self.inner.shutdown.load(Ordering::Acquire) {
            self.run_inline(Box::new(work));
            return;
        }

        let on_worker = self.worker_ids.contains(&thread::current().id());
        {
            let mut queue = self.inner.queue.lock();
            while !on_worker
                && !self.inner.shutdown.load(Ordering::Acquire)
                && self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth
            {
                self.inner.space_ready.wait(&mut queue);
            }

            if self.inner.shutdown.load(Ordering::Acquire) {
                drop(queue);
                self.run_inline(Box::new(work));
                return;
            }
            queue.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
    }

    fn run_inline(&self, task: Task) {
        run_task(task);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Block until all queued and in-flight tasks have completed.
    ///
    /// Tasks submitted by running tasks are waited for as well. Workers keep
    /// running afterwards; this does NOT signal shutdown. Must not be called
    /// from inside a task.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Shut down the scheduler: signal workers to exit and join all threads.
    ///
    /// Workers drain remaining tasks before exiting. A worker never joins
    /// itself, so this is safe to reach from inside a task.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Notify under the queue lock: a worker between its shutdown check
        // and its wait() holds this lock.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
            self.inner.space_ready.notify_all();
        }

        let current = thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Bound on queued tasks for `submit()`
    pub fn max_queue_depth(&self) -> usize {
        self.inner.max_queue_depth
    }

    /// Return a snapshot of scheduler metrics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_MAX_QUEUE_DEPTH)
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Decrements `active_tasks` and wakes drain waiters on drop, so a
/// panicking task cannot leave `drain()` hanging.
struct ActiveTaskGuard<'a> {
    inner: &'a SchedulerInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    // active before queue_depth drops, so drain() never sees 0/0 mid-handoff
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.space_ready.notify_one();
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        run_task(task);
    }
}

/// Run a task, containing any panic to the task
fn run_task(task: Task) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        error!(
            "background task panicked: {:?}",
            e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_submit_and_drain() {
        let scheduler = BackgroundScheduler::new(2, 4096);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let c = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    c.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }

        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_fifo_order_single_worker() {
        let scheduler = BackgroundScheduler::new(1, 4096);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let o = Arc::clone(&order);
            scheduler.submit(move || o.lock().push(i)).unwrap();
        }

        scheduler.drain();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_backpressure() {
        let scheduler = BackgroundScheduler::new(1, 2);

        let barrier = Arc::new(Barrier::new(2));
        let b = Arc::clone(&barrier);
        scheduler.submit(move || {
            b.wait();
        })
        .unwrap();

        // let the worker take the barrier task off the queue
        thread::sleep(Duration::from_millis(50));

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    c.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }

        assert!(scheduler.submit(|| {}).is_err());

        barrier.wait();
        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_shutdown_runs_remaining_tasks() {
        let scheduler = BackgroundScheduler::new(1, 4096);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let c = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    c.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }

        scheduler.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert!(scheduler.is_shutdown());
        assert!(scheduler.submit(|| {}).is_err());
    }

    #[test]
    fn test_drain_waits_for_nested_submissions() {
        let scheduler = Arc::new(BackgroundScheduler::new(2, 4096));
        let counter = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&scheduler);
        let c = Arc::clone(&counter);
        scheduler
            .submit(move || {
                let c2 = Arc::clone(&c);
                s.submit(move || {
                    thread::sleep(Duration::from_millis(20));
                    c2.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
                c.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_task_panic_does_not_hang_drain() {
        let scheduler = BackgroundScheduler::new(2, 4096);
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.submit(|| panic!("intentional test panic")).unwrap();
        for _ in 0..3 {
            let c = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    c.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }

        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        assert_eq!(scheduler.stats().tasks_completed, 4);
    }

    #[test]
    fn test_zero_workers_runs_inline() {
        let scheduler = BackgroundScheduler::new(0, 4096);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        scheduler
            .submit(move || {
                c.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(scheduler.stats().worker_count, 0);
    }

    #[test]
    fn test_submit_wait_never_drops_on_full_queue() {
        let scheduler = BackgroundScheduler::new(1, 1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..500 {
            let c = Arc::clone(&counter);
            scheduler.submit_wait(move || {
                c.fetch_add(1, Ordering::Relaxed);
            });
        }

        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 500);
        assert_eq!(scheduler.stats().tasks_completed, 500);
    }

    #[test]
    fn test_submit_wait_from_worker_skips_bound() {
        let scheduler = Arc::new(BackgroundScheduler::new(1, 1));
        let counter = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&scheduler);
        let c = Arc::clone(&counter);
        scheduler.submit_wait(move || {
            // single worker, queue bound 1: waiting here would never end
            for _ in 0..10 {
                let c2 = Arc::clone(&c);
                s.submit_wait(move || {
                    c2.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        scheduler.drain();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_submit_wait_after_shutdown_runs_inline() {
        let scheduler = BackgroundScheduler::new(2, 16);
        scheduler.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        scheduler.submit_wait(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_zero_workers_contains_panic() {
        let scheduler = BackgroundScheduler::new(0, 16);
        scheduler.submit_wait(|| panic!("intentional test panic"));
        assert!(scheduler.submit(|| panic!("intentional test panic")).is_ok());
        assert_eq!(scheduler.stats().tasks_completed, 2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let scheduler = BackgroundScheduler::default();
        scheduler.submit(|| {}).unwrap();
        scheduler.drain();
        scheduler.shutdown();
        scheduler.shutdown();
    }
}
