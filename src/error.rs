use failure::{Backtrace, Context, Fail};
use std::fmt;
use std::io;

/// Error Type for the worker pool
#[derive(Debug)]
pub struct PoolError {
    inner: Context<PoolErrorKind>,
}

/// Kinds of possible Errors raised by the worker pool
#[derive(Debug, Fail)]
pub enum PoolErrorKind {
    /// Extraction asked a payload for a type other than the one it stores
    #[fail(display = "payload does not hold a value of type {}", _0)]
    TypeMismatch(&'static str),

    /// Extraction from a payload that was never filled
    #[fail(display = "payload is empty")]
    EmptyPayload,

    /// The submitted task panicked while running on a worker
    #[fail(display = "task panicked: {}", _0)]
    TaskPanicked(String),

    /// start was called on a pool that is already running
    #[fail(display = "thread pool is already started")]
    AlreadyStarted,

    /// IoError triggered by spawning worker threads
    #[fail(display = "Io Error: {}", _0)]
    IoError(#[cause] io::Error),
}

impl PoolError {
    /// the kind of failure behind this error
    pub fn kind(&self) -> &PoolErrorKind {
        self.inner.get_context()
    }
}

impl Fail for PoolError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<PoolErrorKind> for PoolError {
    fn from(kind: PoolErrorKind) -> PoolError {
        PoolError {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<PoolErrorKind>> for PoolError {
    fn from(context: Context<PoolErrorKind>) -> PoolError {
        PoolError { inner: context }
    }
}

impl From<io::Error> for PoolError {
    fn from(error: io::Error) -> PoolError {
        PoolErrorKind::IoError(error).into()
    }
}
