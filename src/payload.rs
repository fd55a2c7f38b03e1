use crate::{PoolErrorKind, Result};
use std::any::{type_name, Any};
use std::fmt;

/// Type-erased carrier for a single value of arbitrary type.
///
/// A `Payload` is what a [`Task`](crate::Task) returns and what the
/// consumer receives back through its [`TaskResult`](crate::TaskResult).
/// It is move-only; the one owner recovers the value with
/// [`extract`](Payload::extract).
///
/// ```
/// use workpool::Payload;
///
/// let payload = Payload::new(String::from("done"));
/// assert_eq!(payload.extract::<String>().unwrap(), "done");
/// ```
pub struct Payload {
    value: Option<Box<dyn Any + Send>>,
}

impl Payload {
    /// Wrap a value of any thread-safe type
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    /// A carrier holding nothing, as returned by rejected submissions
    pub fn empty() -> Self {
        Self { value: None }
    }

    /// whether this carrier holds a value
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Take the stored value back out.
    ///
    /// Fails with [`PoolErrorKind::TypeMismatch`] when `T` differs from
    /// the type the payload was constructed with, and with
    /// [`PoolErrorKind::EmptyPayload`] when the carrier was never filled.
    pub fn extract<T: 'static>(self) -> Result<T> {
        match self.value {
            None => Err(PoolErrorKind::EmptyPayload.into()),
            Some(boxed) => boxed
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| PoolErrorKind::TypeMismatch(type_name::<T>()).into()),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Payload(empty)")
        } else {
            f.write_str("Payload(..)")
        }
    }
}
