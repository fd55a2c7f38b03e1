use crate::payload::Payload;

/// A user-authored unit of work.
///
/// Implementors hand their return value back as a type-erased
/// [`Payload`]; the pool delivers it to the submitter through the
/// [`TaskResult`](crate::TaskResult) returned by
/// [`ThreadPool::submit`](crate::ThreadPool::submit).
///
/// A panic inside `run` is caught at the worker boundary and surfaces
/// to the consumer as
/// [`PoolErrorKind::TaskPanicked`](crate::PoolErrorKind::TaskPanicked);
/// it never takes the worker thread down.
pub trait Task: Send + Sync + 'static {
    /// Execute the task and return its result
    fn run(&self) -> Payload;
}

/// Any closure producing a `Payload` is a task.
impl<F> Task for F
where
    F: Fn() -> Payload + Send + Sync + 'static,
{
    fn run(&self) -> Payload {
        self()
    }
}
