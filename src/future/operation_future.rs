//! Future adapter for [`AsyncOperation`].

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::future::waker::WakerSlot;
use crate::operation::AsyncOperation;
use crate::registry::ContinuationId;

/// Future that resolves when an operation completes.
///
/// Resolves to the result, or to [`PromiseError::Faulted`] /
/// [`PromiseError::Canceled`] carrying the stored error. On the first pending
/// poll a continuation is registered that wakes the awaiting task; dropping
/// the future before completion removes it again.
///
/// Dropping the future does not cancel the operation.
///
/// [`PromiseError::Faulted`]: crate::PromiseError::Faulted
/// [`PromiseError::Canceled`]: crate::PromiseError::Canceled
///
/// # Example
///
/// ```rust
/// use safer_promise::AsyncOperation;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> safer_promise::Result<()> {
/// let operation = AsyncOperation::<u32>::new();
/// let producer = operation.clone();
/// tokio::spawn(async move {
///     producer.try_set_result(42).unwrap();
/// });
///
/// assert_eq!(operation.await?, 42);
/// # Ok(())
/// # }
/// ```
pub struct OperationFuture<T> {
    operation: AsyncOperation<T>,
    slot: Arc<WakerSlot>,
    continuation: Option<ContinuationId>,
}

impl<T> OperationFuture<T> {
    /// Creates a future awaiting `operation`.
    pub fn new(operation: AsyncOperation<T>) -> Self {
        Self {
            operation,
            slot: Arc::new(WakerSlot::new()),
            continuation: None,
        }
    }

    /// The awaited operation.
    pub fn operation(&self) -> &AsyncOperation<T> {
        &self.operation
    }
}

impl<T: Clone + Send + Sync + 'static> Future for OperationFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.operation.is_completed() {
            return Poll::Ready(self.operation.completed_outcome());
        }

        self.slot.register(cx.waker());
        if self.continuation.is_none() {
            let slot = Arc::clone(&self.slot);
            let id = self.operation.add_continuation(move |_| {
                slot.wake();
            });
            self.continuation = Some(id);
        }

        // Completion may have raced with the registration above.
        if self.operation.is_completed() {
            self.slot.clear();
            return Poll::Ready(self.operation.completed_outcome());
        }
        Poll::Pending
    }
}

impl<T> Drop for OperationFuture<T> {
    fn drop(&mut self) {
        if let Some(id) = self.continuation.take() {
            self.operation.inner.continuations.remove(id);
        }
    }
}

impl<T> fmt::Debug for OperationFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFuture")
            .field("operation", &self.operation)
            .field("registered", &self.continuation.is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for AsyncOperation<T> {
    type Output = Result<T>;
    type IntoFuture = OperationFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        OperationFuture::new(self)
    }
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for &AsyncOperation<T> {
    type Output = Result<T>;
    type IntoFuture = OperationFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        OperationFuture::new(self.clone())
    }
}

static_assertions::assert_impl_all!(OperationFuture<u8>: Send, Sync, Unpin);
