use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::trace;

pub(crate) type WorkerFn = Box<dyn FnOnce(u64) + Send + 'static>;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(0);

/// Owns one OS thread of the pool.
///
/// The wrapper does not join on drop; the coordinator's shutdown
/// protocol guarantees the thread has terminated before the wrapper's
/// map entry is erased.
pub(crate) struct Worker {
    id: u64,
    func: Option<WorkerFn>,
}

impl Worker {
    pub(crate) fn new(func: WorkerFn) -> Self {
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::SeqCst),
            func: Some(func),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Spawn the detached OS thread bound to the worker-loop function.
    pub(crate) fn start(&mut self) -> Result<()> {
        let func = match self.func.take() {
            Some(func) => func,
            None => return Ok(()),
        };

        let id = self.id;
        thread::Builder::new()
            .name(format!("workpool-worker-{}", id))
            .spawn(move || func(id))?;
        trace!("worker {} thread spawned", id);
        Ok(())
    }
}
