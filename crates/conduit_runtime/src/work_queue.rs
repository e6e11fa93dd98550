//! Lane-based task queue.
//!
//! A lane is an unbounded channel drained by a fixed set of worker threads.
//! Tasks on a single-thread lane run in submission order, which is how a
//! device compute stream is modelled. Nothing orders tasks across lanes.
//!
//! The queue tracks outstanding tasks and the first error. Once a task fails
//! (or [`WorkQueue::abort`] is called) the queue is aborted: tasks that have
//! not started are dropped without running, in-flight tasks finish, and
//! [`WorkQueue::wait_all`] returns the first error and re-arms the queue.
//! Cleanup lanes are the exception: their tasks always run, so work such as
//! returning storage is never lost to an abort.

use crate::error::{ExecutionError, RuntimeResult};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Unit of work
pub type Task = Box<dyn FnOnce() -> RuntimeResult<()> + Send + 'static>;

/// Hook invoked once when the queue aborts
pub type AbortHook = Arc<dyn Fn() + Send + Sync>;

/// Lane identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId(usize);

impl LaneId {
    /// Position in the queue's lane table
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

#[derive(Default)]
struct QueueState {
    outstanding: usize,
    first_error: Option<ExecutionError>,
}

struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
    aborted: AtomicBool,
    executed: AtomicU64,
    dropped: AtomicU64,
    on_abort: Option<AbortHook>,
}

impl Shared {
    /// Record `err` if it is the first; returns whether it was
    fn abort(&self, err: ExecutionError) -> bool {
        let first = {
            let mut state = self.state.lock();
            if state.first_error.is_none() {
                state.first_error = Some(err);
                true
            } else {
                false
            }
        };
        if !self.aborted.swap(true, Ordering::SeqCst) {
            if let Some(hook) = &self.on_abort {
                hook();
            }
        }
        first
    }

    fn finish_one(&self) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        if state.outstanding == 0 {
            self.idle.notify_all();
        }
    }
}

struct Lane {
    name: String,
    threads: usize,
    cleanup: bool,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

/// Builder for [`WorkQueue`]
#[derive(Default)]
pub struct WorkQueueBuilder {
    lanes: Vec<(String, usize, bool)>,
    on_abort: Option<AbortHook>,
}

impl WorkQueueBuilder {
    /// Add a lane served by `threads` workers
    #[must_use]
    pub fn lane(mut self, name: impl Into<String>, threads: usize) -> Self {
        self.lanes.push((name.into(), threads, false));
        self
    }

    /// Add a lane whose tasks run even after an abort
    #[must_use]
    pub fn cleanup_lane(mut self, name: impl Into<String>, threads: usize) -> Self {
        self.lanes.push((name.into(), threads, true));
        self
    }

    /// Run `hook` when the queue aborts
    #[must_use]
    pub fn on_abort(mut self, hook: AbortHook) -> Self {
        self.on_abort = Some(hook);
        self
    }

    /// Spawn the workers
    ///
    /// # Errors
    ///
    /// Returns error if a lane has no threads or a thread cannot be spawned
    pub fn build(self) -> RuntimeResult<WorkQueue> {
        if self.lanes.is_empty() {
            return Err(ExecutionError::InvalidConfig {
                reason: "work queue needs at least one lane".to_string(),
            });
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
            aborted: AtomicBool::new(false),
            executed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            on_abort: self.on_abort,
        });

        let mut queue = WorkQueue {
            lanes: Vec::with_capacity(self.lanes.len()),
            shared,
        };
        for (name, threads, cleanup) in self.lanes {
            queue.spawn_lane(name, threads, cleanup)?;
        }
        Ok(queue)
    }
}

/// Thread-pool task queue with isolated lanes
pub struct WorkQueue {
    lanes: Vec<Lane>,
    shared: Arc<Shared>,
}

impl WorkQueue {
    /// Start building a queue
    #[must_use]
    pub fn builder() -> WorkQueueBuilder {
        WorkQueueBuilder::default()
    }

    fn spawn_lane(&mut self, name: String, threads: usize, cleanup: bool) -> RuntimeResult<LaneId> {
        if threads == 0 {
            return Err(ExecutionError::InvalidConfig {
                reason: format!("lane `{}` needs at least one thread", name),
            });
        }

        let (sender, receiver) = channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let shared = Arc::clone(&self.shared);
            let lane = name.clone();
            let handle = thread::Builder::new()
                .name(format!("conduit-{}-{}", name, i))
                .spawn(move || worker_loop(&lane, cleanup, &receiver, &shared))
                .map_err(|e| ExecutionError::WorkerSpawn {
                    lane: name.clone(),
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }

        let id = LaneId(self.lanes.len());
        self.lanes.push(Lane {
            name,
            threads,
            cleanup,
            sender: Some(sender),
            workers,
        });
        Ok(id)
    }

    /// Lane by name
    #[must_use]
    pub fn lane(&self, name: &str) -> Option<LaneId> {
        self.lanes.iter().position(|l| l.name == name).map(LaneId)
    }

    /// Lane name
    #[must_use]
    pub fn lane_name(&self, lane: LaneId) -> Option<&str> {
        self.lanes.get(lane.0).map(|l| l.name.as_str())
    }

    /// Worker count of a lane
    #[must_use]
    pub fn lane_threads(&self, lane: LaneId) -> Option<usize> {
        self.lanes.get(lane.0).map(|l| l.threads)
    }

    /// Number of lanes
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Queue a task on `lane`.
    ///
    /// Tasks submitted to an ordinary lane while the queue is aborted are
    /// dropped.
    pub fn submit(&self, lane: LaneId, task: Task) {
        let Some(target) = self.lanes.get(lane.0) else {
            self.shared.abort(ExecutionError::InvalidConfig {
                reason: format!("no lane with index {}", lane.0),
            });
            return;
        };
        if self.is_aborted() && !target.cleanup {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(sender) = target.sender.as_ref() else {
            return;
        };

        self.shared.state.lock().outstanding += 1;
        if sender.send(task).is_err() {
            self.shared.finish_one();
            self.shared.abort(ExecutionError::Cancelled);
        }
    }

    /// Abort with `err` unless an earlier error was recorded.
    ///
    /// Returns whether `err` became the first error.
    pub fn abort(&self, err: ExecutionError) -> bool {
        self.shared.abort(err)
    }

    /// Whether the queue is aborted
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Block until no task is outstanding.
    ///
    /// # Errors
    ///
    /// Returns the first error captured since the previous call
    pub fn wait_all(&self) -> RuntimeResult<()> {
        let mut state = self.shared.state.lock();
        while state.outstanding > 0 {
            self.shared.idle.wait(&mut state);
        }
        let first = state.first_error.take();
        self.shared.aborted.store(false, Ordering::SeqCst);
        drop(state);

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tasks run to completion since creation
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    /// Tasks dropped without running since creation
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

fn worker_loop(lane: &str, cleanup: bool, receiver: &Receiver<Task>, shared: &Shared) {
    for task in receiver.iter() {
        if !cleanup && shared.aborted.load(Ordering::SeqCst) {
            drop(task);
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            shared.finish_one();
            continue;
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(result) => result,
            Err(payload) => Err(ExecutionError::WorkerPanic {
                lane: lane.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        };
        shared.executed.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = result {
            if !err.is_cancellation() {
                tracing::debug!(lane, error = %err, "task failed");
            }
            shared.abort(err);
        }
        shared.finish_one();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        for lane in &mut self.lanes {
            lane.sender = None;
        }
        for lane in &mut self.lanes {
            for worker in lane.workers.drain(..) {
                // the last owner may be one of our own tasks
                if worker.thread().id() == thread::current().id() {
                    continue;
                }
                if worker.join().is_err() {
                    tracing::error!(lane = %lane.name, "worker thread panicked outside a task");
                }
            }
        }
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field(
                "lanes",
                &self.lanes.iter().map(|l| (&l.name, l.threads)).collect::<Vec<_>>(),
            )
            .field("aborted", &self.is_aborted())
            .field("executed", &self.executed())
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_wait_all_empty() {
        let queue = WorkQueue::builder().lane("host", 2).build().unwrap();
        assert!(queue.wait_all().is_ok());
        assert_eq!(queue.lane_count(), 1);
        assert_eq!(queue.lane("host"), Some(LaneId(0)));
    }

    #[test]
    fn test_runs_every_task() {
        let queue = WorkQueue::builder().lane("host", 4).build().unwrap();
        let host = queue.lane("host").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            queue.submit(
                host,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        queue.wait_all().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(queue.executed(), 100);
    }

    #[test]
    fn test_single_thread_lane_is_fifo() {
        let queue = WorkQueue::builder().lane("stream", 1).build().unwrap();
        let lane = queue.lane("stream").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let order = Arc::clone(&order);
            queue.submit(
                lane,
                Box::new(move || {
                    order.lock().push(i);
                    Ok(())
                }),
            );
        }
        queue.wait_all().unwrap();
        assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_first_error_wins_and_rest_is_dropped() {
        let queue = WorkQueue::builder().lane("stream", 1).build().unwrap();
        let lane = queue.lane("stream").unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        queue.submit(
            lane,
            Box::new(|| -> RuntimeResult<()> { Err(ExecutionError::MissingFeed { name: "a".to_string() }) }),
        );
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            queue.submit(
                lane,
                Box::new(move || -> RuntimeResult<()> {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Err(ExecutionError::MissingFeed { name: "b".to_string() })
                }),
            );
        }

        let err = queue.wait_all().unwrap_err();
        assert_eq!(err, ExecutionError::MissingFeed { name: "a".to_string() });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.dropped(), 10);

        // re-armed
        assert!(!queue.is_aborted());
        queue.submit(lane, Box::new(|| Ok(())));
        assert!(queue.wait_all().is_ok());
    }

    #[test]
    fn test_tasks_can_submit_tasks() {
        let queue = Arc::new(WorkQueue::builder().lane("host", 2).lane("gc", 1).build().unwrap());
        let host = queue.lane("host").unwrap();
        let gc = queue.lane("gc").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_counter = Arc::clone(&counter);
        queue.submit(
            host,
            Box::new(move || {
                thread::sleep(Duration::from_millis(5));
                let counter = Arc::clone(&inner_counter);
                inner_queue.submit(
                    gc,
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                );
                Ok(())
            }),
        );

        queue.wait_all().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_becomes_error() {
        let queue = WorkQueue::builder().lane("host", 1).build().unwrap();
        let host = queue.lane("host").unwrap();
        queue.submit(host, Box::new(|| -> RuntimeResult<()> { panic!("boom") }));
        let err = queue.wait_all().unwrap_err();
        assert_eq!(
            err,
            ExecutionError::WorkerPanic {
                lane: "host".to_string(),
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_abort_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        let queue = WorkQueue::builder()
            .lane("host", 1)
            .on_abort(Arc::new(move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();

        assert!(queue.abort(ExecutionError::Cancelled));
        assert!(!queue.abort(ExecutionError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.wait_all().unwrap_err(), ExecutionError::Cancelled);
    }

    #[test]
    fn test_cleanup_lane_runs_after_abort() {
        let queue = WorkQueue::builder().lane("host", 1).cleanup_lane("gc", 1).build().unwrap();
        let host = queue.lane("host").unwrap();
        let gc = queue.lane("gc").unwrap();
        let cleaned = Arc::new(AtomicUsize::new(0));

        queue.abort(ExecutionError::Cancelled);
        queue.submit(host, Box::new(|| Ok(())));
        for _ in 0..3 {
            let cleaned = Arc::clone(&cleaned);
            queue.submit(
                gc,
                Box::new(move || {
                    cleaned.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        assert!(queue.wait_all().is_err());
        assert_eq!(cleaned.load(Ordering::SeqCst), 3);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_zero_thread_lane_rejected() {
        let err = WorkQueue::builder().lane("host", 0).build().unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidConfig { .. }));
        assert!(WorkQueue::builder().build().is_err());
    }
}
