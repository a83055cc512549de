//! Typed tasks with explicit dependency edges.
//!
//! - [`WorkerPool`] runs jobs on a fixed set of threads, or inline on the
//!   calling thread when created with [`WorkerPool::inline`]
//! - [`TaskHandle`] is a shared handle to a task's eventual result
//! - [`Prerequisite`] is anything a task can be scheduled after
//!
//! A task spawned with [`WorkerPool::spawn_after`] is queued only once all of
//! its prerequisites have completed, so no worker ever blocks on an edge.
//! Blocking happens only where a caller explicitly asks for it via
//! [`TaskHandle::wait`].
//!
//! # Example
//!
//! ```
//! use skincache_core::task::WorkerPool;
//!
//! let pool = WorkerPool::new(2);
//! let setup = pool.spawn(|| 20);
//! let setup_result = setup.clone();
//! let execute = pool.spawn_after(&[&setup], move || {
//!     setup_result.try_get().unwrap_or_default() + 1
//! });
//! assert_eq!(execute.wait_take(), Ok(21));
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when a task produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFailed {
    /// The task body panicked.
    Panicked,
    /// The value was already taken by another handle.
    AlreadyTaken,
}

impl fmt::Display for TaskFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panicked => f.write_str("task panicked"),
            Self::AlreadyTaken => f.write_str("task result already taken"),
        }
    }
}

impl std::error::Error for TaskFailed {}

enum Slot<T> {
    Pending(Vec<Job>),
    Done(Option<Result<T, TaskFailed>>),
}

struct TaskState<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> TaskState<T> {
    fn complete(&self, result: Result<T, TaskFailed>) {
        let continuations = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Done(Some(result))) {
                Slot::Pending(continuations) => continuations,
                Slot::Done(_) => Vec::new(),
            }
        };
        self.ready.notify_all();
        for continuation in continuations {
            continuation();
        }
    }
}

/// Shared handle to the result of a spawned task.
///
/// Handles are cheap to clone; all clones observe the same task.
pub struct TaskHandle<T> {
    state: Arc<TaskState<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    fn pending() -> Self {
        Self {
            state: Arc::new(TaskState {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                ready: Condvar::new(),
            }),
        }
    }

    /// A handle that is already complete with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            state: Arc::new(TaskState {
                slot: Mutex::new(Slot::Done(Some(Ok(value)))),
                ready: Condvar::new(),
            }),
        }
    }

    /// Returns `true` once the task has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        matches!(*self.state.slot.lock(), Slot::Done(_))
    }

    /// Blocks the calling thread until the task has finished.
    pub fn wait(&self) {
        let mut slot = self.state.slot.lock();
        while matches!(*slot, Slot::Pending(_)) {
            self.state.ready.wait(&mut slot);
        }
    }

    /// Takes the result without blocking.
    ///
    /// Returns `None` while the task is still running.
    pub fn try_take(&self) -> Option<Result<T, TaskFailed>> {
        let mut slot = self.state.slot.lock();
        match &mut *slot {
            Slot::Pending(_) => None,
            Slot::Done(result) => Some(result.take().unwrap_or(Err(TaskFailed::AlreadyTaken))),
        }
    }

    /// Blocks until the task finishes, then takes its result.
    pub fn wait_take(&self) -> Result<T, TaskFailed> {
        self.wait();
        self.try_take().unwrap_or(Err(TaskFailed::AlreadyTaken))
    }
}

impl<T: Clone + Send + 'static> TaskHandle<T> {
    /// Clones the result out without taking it. `None` while running or on failure.
    pub fn try_get(&self) -> Option<T> {
        match &*self.state.slot.lock() {
            Slot::Done(Some(Ok(value))) => Some(value.clone()),
            _ => None,
        }
    }
}

/// Something a task can be ordered after.
pub trait Prerequisite: Send + Sync {
    /// Runs `continuation` once this prerequisite has completed.
    ///
    /// Runs it immediately on the calling thread if already complete.
    fn then(&self, continuation: Box<dyn FnOnce() + Send + 'static>);
}

impl<T: Send + 'static> Prerequisite for TaskHandle<T> {
    fn then(&self, continuation: Box<dyn FnOnce() + Send + 'static>) {
        let mut slot = self.state.slot.lock();
        if let Slot::Pending(continuations) = &mut *slot {
            continuations.push(continuation);
            return;
        }
        drop(slot);
        continuation();
    }
}

struct Queue {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
}

impl Queue {
    fn push(&self, job: Job) {
        let job = match self.sender.lock().as_ref() {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                Err(mpsc::SendError(job)) => job,
            },
            None => job,
        };
        // Inline pools and shut-down pools run the job on this thread, outside the lock.
        job();
    }
}

/// A fixed pool of worker threads executing [`TaskHandle`]-producing jobs.
///
/// Dropping the pool lets queued jobs drain and joins the workers.
pub struct WorkerPool {
    queue: Arc<Queue>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..num_threads.max(1))
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("skincache-worker-{index}"))
                    .spawn(move || {
                        crate::set_thread_name!("skincache worker");
                        loop {
                            let job = receiver.lock().recv();
                            match job {
                                Ok(job) => job(),
                                Err(_) => break,
                            }
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::warn!("WorkerPool: failed to spawn worker thread: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let sender = if workers.is_empty() {
            None
        } else {
            Some(sender)
        };

        log::debug!("WorkerPool: started {} worker threads", workers.len());

        Self {
            queue: Arc::new(Queue {
                sender: Mutex::new(sender),
            }),
            workers,
        }
    }

    /// Creates a pool sized to the number of available CPU cores.
    pub fn default_threads() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Creates a pool that runs every job on the thread that makes it ready.
    ///
    /// Useful for deterministic tests and single-threaded frame loops.
    pub fn inline() -> Self {
        Self {
            queue: Arc::new(Queue {
                sender: Mutex::new(None),
            }),
            workers: Vec::new(),
        }
    }

    /// Number of worker threads (zero for an inline pool).
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Runs `f` as soon as a worker is free.
    pub fn spawn<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.spawn_after(&[], f)
    }

    /// Runs `f` after every prerequisite has completed.
    pub fn spawn_after<T, F>(&self, prerequisites: &[&dyn Prerequisite], f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = TaskHandle::pending();
        let state = Arc::clone(&handle.state);
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(f)).map_err(|_| TaskFailed::Panicked);
            state.complete(result);
        });

        if prerequisites.is_empty() {
            self.queue.push(job);
            return handle;
        }

        let remaining = Arc::new(AtomicUsize::new(prerequisites.len()));
        let job = Arc::new(Mutex::new(Some(job)));
        for prerequisite in prerequisites {
            let remaining = Arc::clone(&remaining);
            let job = Arc::clone(&job);
            let queue = Arc::clone(&self.queue);
            prerequisite.then(Box::new(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(job) = job.lock().take() {
                        queue.push(job);
                    }
                }
            }));
        }
        handle
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::default_threads()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queue.sender.lock().take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.workers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_inline_runs_immediately() {
        let pool = WorkerPool::inline();
        let handle = pool.spawn(|| 7);
        assert!(handle.is_complete());
        assert_eq!(handle.wait_take(), Ok(7));
    }

    #[test]
    fn test_ready_handle() {
        let handle = TaskHandle::ready("done");
        assert!(handle.is_complete());
        assert_eq!(handle.try_get(), Some("done"));
    }

    #[test]
    fn test_result_taken_once() {
        let pool = WorkerPool::inline();
        let handle = pool.spawn(|| String::from("x"));
        let other = handle.clone();
        assert_eq!(handle.wait_take().as_deref(), Ok("x"));
        assert_eq!(other.wait_take(), Err(TaskFailed::AlreadyTaken));
    }

    #[test]
    fn test_dependent_waits_for_prerequisite() {
        let pool = WorkerPool::new(2);
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let gate_setup = Arc::clone(&gate);
        let setup = pool.spawn(move || {
            let (lock, cvar) = &*gate_setup;
            let mut open = lock.lock();
            while !*open {
                cvar.wait(&mut open);
            }
            1
        });

        let setup_value = setup.clone();
        let execute = pool.spawn_after(&[&setup], move || setup_value.try_get().map(|v| v + 1));

        std::thread::sleep(Duration::from_millis(10));
        assert!(!execute.is_complete());

        {
            let (lock, cvar) = &*gate;
            *lock.lock() = true;
            cvar.notify_all();
        }

        assert_eq!(execute.wait_take(), Ok(Some(2)));
    }

    #[test]
    fn test_multiple_prerequisites() {
        let pool = WorkerPool::new(3);
        let a = pool.spawn(|| 1);
        let b = pool.spawn(|| 2);
        let (a2, b2) = (a.clone(), b.clone());
        let sum = pool.spawn_after(&[&a, &b], move || {
            a2.try_get().unwrap_or(0) + b2.try_get().unwrap_or(0)
        });
        assert_eq!(sum.wait_take(), Ok(3));
    }

    #[test]
    fn test_panicking_task_reports_failure() {
        let pool = WorkerPool::inline();
        let handle = pool.spawn(|| -> u32 { panic!("boom") });
        assert_eq!(handle.wait_take(), Err(TaskFailed::Panicked));
    }

    #[test]
    fn test_prerequisite_already_complete() {
        let pool = WorkerPool::new(1);
        let done = TaskHandle::ready(5u32);
        let next = pool.spawn_after(&[&done], || 6u32);
        assert_eq!(next.wait_take(), Ok(6));
    }
}
