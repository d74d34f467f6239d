//! `async`/`await` support.
//!
//! [`AsyncOperation`](crate::AsyncOperation) implements
//! [`IntoFuture`](std::future::IntoFuture), so an operation can be awaited
//! directly from any executor. The future registers a continuation that wakes
//! the awaiting task; no runtime-specific integration is required.
//!
//! ```rust
//! use safer_promise::{AsyncOperation, OperationError, PromiseError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let operation = AsyncOperation::<()>::new();
//! operation.try_set_exception(OperationError::msg("lost")).unwrap();
//!
//! match (&operation).await {
//!     Err(PromiseError::Faulted(error)) => assert_eq!(error.to_string(), "lost"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! # }
//! ```

mod operation_future;
mod waker;

#[cfg(all(test, not(loom)))]
mod tests;

pub use operation_future::OperationFuture;
