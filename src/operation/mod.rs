//! The operation state machine.
//!
//! An [`AsyncOperation`] moves through
//! `Created -> Scheduled -> Running -> {RanToCompletion | Faulted | Canceled}`.
//! `Scheduled` may be skipped, and a terminal status may be reached from any
//! non-terminal one. Terminal statuses are absorbing.
//!
//! All status and flag changes are compare-and-swap steps on a single packed
//! word (see `state`). Completion is a two-phase protocol: one caller wins a
//! reservation, writes the payload and seals the callback registries, then
//! publishes the terminal status, so a thread that observes completion always
//! observes the payload too and can no longer queue a continuation.
//!
//! # Example
//!
//! ```rust
//! use safer_promise::{AsyncOperation, OperationError, OperationStatus};
//!
//! let operation = AsyncOperation::<String>::new();
//! operation.add_continuation(|op| {
//!     assert_eq!(op.status(), OperationStatus::Faulted);
//! });
//!
//! operation.try_set_running().unwrap();
//! assert!(operation.try_set_exception(OperationError::msg("disk full")).unwrap());
//!
//! // Only the first completion wins.
//! assert!(!operation.try_set_result("late".to_string()).unwrap());
//! assert!(operation.throw_if_non_success().is_err());
//! ```

// Public modules
pub mod behavior;
pub mod types;

// Internal modules
mod async_result;
mod builder;
mod cancel;
mod completion;
mod core;
mod slot;
pub(crate) mod state;


// Re-exports for public API
pub use self::core::{AsyncOperation, CompletionCallback, ProgressCallback, WeakOperation};
pub use async_result::AsyncResult;
pub use behavior::{DefaultBehavior, FnBehavior, OperationBehavior};
pub use builder::OperationBuilder;
pub use types::{CreationOptions, OperationId, OperationStatus};

pub use completion::MAX_PENDING_PROGRESS;
pub(crate) use completion::Outcome;
