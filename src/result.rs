use crate::payload::Payload;
use crate::semaphore::Semaphore;
use crate::task::Task;
use crate::{PoolErrorKind, Result};
use std::sync::{Arc, Mutex};

/// What a worker ended up with after running a task.
pub(crate) enum Outcome {
    Value(Payload),
    Panicked(String),
}

/// Shared state between a worker and the handle waiting on it.
///
/// The pool's queue entry holds this behind a `Weak` reference, so the
/// handle side owns it alone once the consumer walks away.
pub(crate) struct ResultState {
    outcome: Mutex<Option<Outcome>>,
    ready: Semaphore,
}

impl ResultState {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Semaphore::new(0),
        }
    }

    /// Store the outcome, then release the semaphore. Called by the
    /// worker exactly once per accepted submission.
    pub(crate) fn publish(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
        self.ready.release();
    }
}

/// Future-like handle paired one-to-one with a submitted task.
///
/// Returned by [`ThreadPool::submit`](crate::ThreadPool::submit). The
/// handle keeps the task alive until the consumer is done with it; the
/// reverse link from the pool's queue back to this handle is non-owning,
/// which keeps the two from forming a reference cycle.
pub struct TaskResult {
    state: Arc<ResultState>,
    // keeps the task alive through execution and until retrieval
    _task: Arc<dyn Task>,
    valid: bool,
}

impl TaskResult {
    pub(crate) fn new(task: Arc<dyn Task>, state: Arc<ResultState>) -> Self {
        Self {
            state,
            _task: task,
            valid: true,
        }
    }

    pub(crate) fn rejected(task: Arc<dyn Task>) -> Self {
        Self {
            state: Arc::new(ResultState::new()),
            _task: task,
            valid: false,
        }
    }

    /// whether the submission behind this handle was accepted
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Wait for the task's return value.
    ///
    /// Blocks until the worker publishes, then hands the payload over.
    /// An invalid handle yields an empty payload immediately instead of
    /// blocking. A task that panicked surfaces as
    /// [`PoolErrorKind::TaskPanicked`].
    ///
    /// Consumes the handle: the value can be retrieved exactly once.
    ///
    /// # Note:
    /// Calling `get` from inside a task running on the same pool can
    /// deadlock a single-worker pool.
    pub fn get(self) -> Result<Payload> {
        if !self.valid {
            return Ok(Payload::empty());
        }

        self.state.ready.acquire();
        let outcome = self.state.outcome.lock().unwrap().take();
        match outcome {
            Some(Outcome::Value(payload)) => Ok(payload),
            Some(Outcome::Panicked(message)) => Err(PoolErrorKind::TaskPanicked(message).into()),
            // publish stores the outcome before releasing the semaphore
            None => Ok(Payload::empty()),
        }
    }
}
