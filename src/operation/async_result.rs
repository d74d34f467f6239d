//! Type-erased view of an operation.

use crate::error::{OperationError, Result};
use crate::operation::{AsyncOperation, OperationId, OperationStatus};
use crate::registry::ContinuationId;

/// Object-safe view of an operation, independent of its result type.
///
/// Lets heterogeneous operations be stored and combined together, for example
/// in [`when_all_void`](crate::combinator::when_all_void).
pub trait AsyncResult: Send + Sync {
    /// Process-unique identifier.
    fn id(&self) -> OperationId;

    /// Current status.
    fn status(&self) -> OperationStatus;

    /// Returns `true` once a terminal status has been published.
    fn is_completed(&self) -> bool;

    /// Current progress in `[0, 1]`.
    fn progress(&self) -> f32;

    /// The stored error of a faulted or canceled operation.
    fn error(&self) -> Option<&OperationError>;

    /// Requests cancellation.
    fn request_cancellation(&self) -> Result<()>;

    /// Registers a callback run once the operation completes.
    fn add_completion_callback(&self, callback: Box<dyn FnOnce() + Send + 'static>)
        -> ContinuationId;
}

impl<T: Send + Sync + 'static> AsyncResult for AsyncOperation<T> {
    fn id(&self) -> OperationId {
        AsyncOperation::id(self)
    }

    fn status(&self) -> OperationStatus {
        AsyncOperation::status(self)
    }

    fn is_completed(&self) -> bool {
        AsyncOperation::is_completed(self)
    }

    fn progress(&self) -> f32 {
        AsyncOperation::progress(self)
    }

    fn error(&self) -> Option<&OperationError> {
        AsyncOperation::error(self)
    }

    fn request_cancellation(&self) -> Result<()> {
        AsyncOperation::request_cancellation(self)
    }

    fn add_completion_callback(
        &self,
        callback: Box<dyn FnOnce() + Send + 'static>,
    ) -> ContinuationId {
        self.add_continuation(move |_| callback())
    }
}

impl<R: AsyncResult + ?Sized> AsyncResult for Box<R> {
    fn id(&self) -> OperationId {
        (**self).id()
    }

    fn status(&self) -> OperationStatus {
        (**self).status()
    }

    fn is_completed(&self) -> bool {
        (**self).is_completed()
    }

    fn progress(&self) -> f32 {
        (**self).progress()
    }

    fn error(&self) -> Option<&OperationError> {
        (**self).error()
    }

    fn request_cancellation(&self) -> Result<()> {
        (**self).request_cancellation()
    }

    fn add_completion_callback(
        &self,
        callback: Box<dyn FnOnce() + Send + 'static>,
    ) -> ContinuationId {
        (**self).add_completion_callback(callback)
    }
}
