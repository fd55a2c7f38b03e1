#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

//! This crate provides a worker thread pool that runs
//! heterogeneous user-defined tasks and hands each task's
//! return value back through a future-like result handle.
//!
//! The pool runs in one of two modes: [`PoolMode::Fixed`] keeps a
//! static worker population, [`PoolMode::Cached`] grows the
//! population on demand up to a ceiling and reclaims excess workers
//! after sustained idleness.

mod error;
mod payload;
mod pool;
mod result;
mod semaphore;
mod task;

#[macro_use]
extern crate failure;

pub use error::PoolError;
pub use error::PoolErrorKind;
pub use payload::Payload;
pub use pool::{PoolMode, ThreadPool};
pub use result::TaskResult;
pub use semaphore::Semaphore;
pub use task::Task;

/// Result type used by this crate
pub type Result<T> = core::result::Result<T, PoolError>;
