//! The pool coordinator: worker population, bounded task queue,
//! submission back-pressure, cached-mode elasticity and graceful
//! shutdown.

use crate::result::{Outcome, ResultState, TaskResult};
use crate::task::Task;
use crate::{PoolErrorKind, Result};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

mod worker;

use worker::Worker;

/// How long a producer may wait for queue space before the submission
/// is rejected.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// How often an idle cached-mode worker wakes up to re-check its state.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Cumulative idleness after which an excess cached-mode worker
/// reclaims itself.
const IDLE_RECLAIM_AFTER: Duration = Duration::from_secs(60);

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_WORKER_CEILING: usize = 100;

/// Operating mode of a [`ThreadPool`], selected before `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// the worker population stays at its initial size for the pool's
    /// entire lifetime
    Fixed,
    /// the population grows on demand up to the worker ceiling and
    /// shrinks back to the initial size after sustained idleness
    Cached,
}

/// A queued task together with the non-owning link back to its handle.
struct Job {
    task: Arc<dyn Task>,
    result: Weak<ResultState>,
}

/// Everything guarded by the one queue mutex.
struct PoolState {
    queue: VecDeque<Job>,
    // keyed by worker id so a terminating worker can erase itself
    workers: HashMap<u64, Worker>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    // producers wait here for queue space
    not_full: Condvar,
    // workers wait here for tasks
    not_empty: Condvar,
    // the destructor waits here for the population to drain
    all_exited: Condvar,

    running: AtomicBool,
    // lock-free mirror of queue.len() for the elasticity heuristic
    queued: AtomicUsize,
    current_workers: AtomicUsize,
    idle_workers: AtomicUsize,

    mode: PoolMode,
    initial_workers: usize,
    worker_ceiling: usize,
    queue_capacity: usize,
}

/// Worker thread pool dispatching user tasks and handing results back
/// through [`TaskResult`] handles.
///
/// # Example:
///
/// ```
/// use workpool::{Payload, ThreadPool};
///
/// let mut pool = ThreadPool::new();
/// pool.start_with(2).unwrap();
///
/// let result = pool.submit(|| Payload::new(21u64 * 2));
/// assert_eq!(result.get().unwrap().extract::<u64>().unwrap(), 42);
/// ```
///
/// Dropping the pool shuts it down gracefully: workers finish what is
/// queued, erase themselves, and the destructor returns only once every
/// one of them is gone.
pub struct ThreadPool {
    mode: PoolMode,
    queue_capacity: usize,
    worker_ceiling: usize,
    inner: Option<Arc<PoolInner>>,
}

impl ThreadPool {
    /// Create an unstarted pool: fixed mode, queue capacity 1024,
    /// worker ceiling 100.
    pub fn new() -> Self {
        Self {
            mode: PoolMode::Fixed,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_ceiling: DEFAULT_WORKER_CEILING,
            inner: None,
        }
    }

    /// Select the operating mode. Ignored once the pool is started.
    pub fn set_mode(&mut self, mode: PoolMode) {
        if self.inner.is_some() {
            warn!("ignoring mode change on a started pool");
            return;
        }
        self.mode = mode;
    }

    /// Bound the task queue. Ignored once the pool is started.
    pub fn set_queue_capacity(&mut self, capacity: usize) {
        if self.inner.is_some() {
            warn!("ignoring queue capacity change on a started pool");
            return;
        }
        self.queue_capacity = capacity;
    }

    /// Cap the cached-mode population. Ignored once the pool is
    /// started; meaningless in fixed mode.
    pub fn set_worker_ceiling(&mut self, ceiling: usize) {
        if self.inner.is_some() {
            warn!("ignoring worker ceiling change on a started pool");
            return;
        }
        self.worker_ceiling = ceiling;
    }

    /// Start with one worker per available CPU.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(num_cpus::get())
    }

    /// Start the pool with the given initial population (at least one
    /// worker).
    ///
    /// Fails with [`PoolErrorKind::AlreadyStarted`] on a second call and
    /// with [`PoolErrorKind::IoError`] when the OS refuses to spawn a
    /// thread; in the latter case the workers spawned so far are shut
    /// down again before the error is returned.
    pub fn start_with(&mut self, initial_workers: usize) -> Result<()> {
        if self.inner.is_some() {
            return Err(PoolErrorKind::AlreadyStarted.into());
        }

        let initial_workers = initial_workers.max(1);
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                workers: HashMap::new(),
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            all_exited: Condvar::new(),
            running: AtomicBool::new(true),
            queued: AtomicUsize::new(0),
            current_workers: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            mode: self.mode,
            initial_workers,
            worker_ceiling: self.worker_ceiling.max(initial_workers),
            queue_capacity: self.queue_capacity,
        });

        {
            let mut guard = inner.state.lock().unwrap();
            for _ in 0..initial_workers {
                if let Err(err) = PoolInner::spawn_worker(&inner, &mut guard) {
                    // roll the partial population back before reporting
                    inner.running.store(false, Ordering::SeqCst);
                    inner.not_empty.notify_all();
                    while !guard.workers.is_empty() {
                        guard = inner.all_exited.wait(guard).unwrap();
                    }
                    return Err(err);
                }
            }
        }

        debug!(
            "pool started with {} workers in {:?} mode",
            initial_workers, self.mode
        );
        self.inner = Some(inner);
        Ok(())
    }

    /// Submit a task for execution.
    ///
    /// Returns a valid [`TaskResult`] once the task is queued. When the
    /// pool is not running, or the queue stays full for the whole
    /// 1-second back-pressure window, the submission is rejected and the
    /// returned handle is invalid; its `get` yields an empty payload
    /// without blocking.
    pub fn submit<T: Task>(&self, task: T) -> TaskResult {
        self.submit_shared(Arc::new(task))
    }

    /// Submit a task the caller already holds behind an `Arc`.
    pub fn submit_shared(&self, task: Arc<dyn Task>) -> TaskResult {
        let inner = match &self.inner {
            Some(inner) if inner.running.load(Ordering::SeqCst) => inner,
            _ => {
                warn!("task submitted to a pool that is not running");
                return TaskResult::rejected(task);
            }
        };
        PoolInner::submit(inner, task)
    }

    /// Total number of live workers
    pub fn current_workers(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.current_workers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of workers currently waiting for a task
    pub fn idle_workers(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.idle_workers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of tasks queued and not yet picked up
    pub fn queued_tasks(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.queued.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// whether the pool is between `start` and destruction
    pub fn is_running(&self) -> bool {
        self.inner
            .as_ref()
            .map(|inner| inner.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    /// Graceful shutdown: wake everyone, then wait until every worker
    /// has erased itself. Queued tasks are drained first, so every
    /// accepted handle still completes.
    fn drop(&mut self) {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            None => return,
        };

        inner.running.store(false, Ordering::SeqCst);
        let mut guard = inner.state.lock().unwrap();
        inner.not_empty.notify_all();
        inner.not_full.notify_all();
        while !guard.workers.is_empty() {
            guard = inner.all_exited.wait(guard).unwrap();
        }
        debug!("pool shut down, all workers exited");
    }
}

impl PoolInner {
    fn submit(this: &Arc<Self>, task: Arc<dyn Task>) -> TaskResult {
        let state = Arc::new(ResultState::new());
        let job = Job {
            task: Arc::clone(&task),
            result: Arc::downgrade(&state),
        };

        let guard = this.state.lock().unwrap();
        let (mut guard, _timeout) = this
            .not_full
            .wait_timeout_while(guard, SUBMIT_TIMEOUT, |state| {
                this.running.load(Ordering::SeqCst) && state.queue.len() >= this.queue_capacity
            })
            .unwrap();

        if !this.running.load(Ordering::SeqCst) || guard.queue.len() >= this.queue_capacity {
            drop(guard);
            warn!(
                "submission rejected: queue still full after {:?}",
                SUBMIT_TIMEOUT
            );
            return TaskResult::rejected(task);
        }

        guard.queue.push_back(job);
        this.queued.fetch_add(1, Ordering::SeqCst);
        this.not_empty.notify_all();

        if this.mode == PoolMode::Cached
            && this.queued.load(Ordering::SeqCst) > this.idle_workers.load(Ordering::SeqCst)
            && this.current_workers.load(Ordering::SeqCst) < this.worker_ceiling
        {
            if let Err(err) = PoolInner::spawn_worker(this, &mut guard) {
                // the existing population still serves the queue
                error!("failed to grow cached pool: {}", err);
            }
        }

        TaskResult::new(task, state)
    }

    /// Create, register and start one worker. Caller holds the state
    /// lock, so the new thread cannot observe the map without its own
    /// entry in it.
    fn spawn_worker(this: &Arc<Self>, state: &mut PoolState) -> Result<()> {
        let inner = Arc::clone(this);
        let mut worker = Worker::new(Box::new(move |id| inner.worker_loop(id)));
        let id = worker.id();
        worker.start()?;
        state.workers.insert(id, worker);
        this.current_workers.fetch_add(1, Ordering::SeqCst);
        this.idle_workers.fetch_add(1, Ordering::SeqCst);
        debug!(
            "worker {} joined the pool ({} total)",
            id,
            this.current_workers.load(Ordering::SeqCst)
        );
        Ok(())
    }

    fn worker_loop(self: Arc<Self>, id: u64) {
        trace!("worker {} entering its loop", id);
        let mut last_active = Instant::now();

        loop {
            let job = {
                let mut guard = self.state.lock().unwrap();
                loop {
                    if let Some(job) = guard.queue.pop_front() {
                        self.queued.fetch_sub(1, Ordering::SeqCst);
                        self.idle_workers.fetch_sub(1, Ordering::SeqCst);
                        if !guard.queue.is_empty() {
                            self.not_empty.notify_all();
                        }
                        self.not_full.notify_all();
                        break job;
                    }

                    // drain policy: shutdown only takes effect once the
                    // queue is empty
                    if !self.running.load(Ordering::SeqCst) {
                        self.retire(&mut guard, id);
                        return;
                    }

                    match self.mode {
                        PoolMode::Fixed => {
                            guard = self.not_empty.wait(guard).unwrap();
                        }
                        PoolMode::Cached => {
                            let (reacquired, poll) = self
                                .not_empty
                                .wait_timeout(guard, IDLE_POLL_INTERVAL)
                                .unwrap();
                            guard = reacquired;
                            if poll.timed_out()
                                && guard.queue.is_empty()
                                && self.running.load(Ordering::SeqCst)
                                && self.current_workers.load(Ordering::SeqCst)
                                    > self.initial_workers
                                && last_active.elapsed() >= IDLE_RECLAIM_AFTER
                            {
                                debug!(
                                    "worker {} idle for {:?}, reclaiming",
                                    id,
                                    last_active.elapsed()
                                );
                                self.retire(&mut guard, id);
                                return;
                            }
                        }
                    }
                }
            };

            let outcome = match catch_unwind(AssertUnwindSafe(|| job.task.run())) {
                Ok(payload) => Outcome::Value(payload),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("worker {}: task panicked: {}", id, message);
                    Outcome::Panicked(message)
                }
            };

            match job.result.upgrade() {
                Some(result) => result.publish(outcome),
                None => trace!("worker {}: result handle dropped before publish", id),
            }

            last_active = Instant::now();
            self.idle_workers.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Self-termination under the lock: erase the map entry, fix the
    /// counters, wake the destructor.
    fn retire(&self, state: &mut PoolState, id: u64) {
        state.workers.remove(&id);
        self.current_workers.fetch_sub(1, Ordering::SeqCst);
        self.idle_workers.fetch_sub(1, Ordering::SeqCst);
        self.all_exited.notify_all();
        trace!("worker {} retired, {} remain", id, state.workers.len());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
