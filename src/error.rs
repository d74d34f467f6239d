//! Error types and handling for safer-promise operations.
//!
//! Two kinds of failure live here and they are deliberately kept apart:
//!
//! - [`PromiseError`] is returned immediately to the caller of a method that was
//!   misused (bad argument, wrong state, disposed instance) or that was asked to
//!   re-raise a stored outcome.
//! - [`OperationError`] is the payload an operation stores when it finishes as
//!   `Faulted` or `Canceled`. It is never returned by the transition methods
//!   themselves; consumers observe it through `error()`, `throw_if_non_success()`,
//!   `join()` or by awaiting the operation.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use static_assertions;
use thiserror::Error;

/// Result type alias for safer-promise operations.
///
/// This type alias simplifies function signatures throughout the crate by
/// providing a consistent error type while allowing different success types.
pub type Result<T> = std::result::Result<T, PromiseError>;

/// Error type for safer-promise API calls.
///
/// # Design Notes
///
/// - Uses `thiserror` for automatic `Error` trait implementation
/// - Structural misuse variants carry a static description of the rule broken
/// - Outcome variants wrap the stored [`OperationError`] so the original cause
///   stays reachable through [`std::error::Error::source`]
#[derive(Debug, Error)]
pub enum PromiseError {
    /// An argument was rejected.
    ///
    /// Returned for empty error collections, progress values outside `[0, 1]`
    /// and empty combinator inputs where one is required.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The call is not valid in the operation's current state.
    ///
    /// Returned when disposing a non-terminal operation, or when one of the
    /// non-try `set_*` methods loses the completion race.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The operation has been disposed and can no longer be mutated.
    #[error("operation has been disposed")]
    ObjectDisposed,

    /// The operation does not support the requested capability.
    ///
    /// The default cancellation hook returns this; behaviors that can honor a
    /// cancellation request override it.
    #[error("{0} is not supported by this operation")]
    Unsupported(&'static str),

    /// The operation finished as `Faulted`; re-raised on request.
    #[error("operation faulted: {0}")]
    Faulted(#[source] OperationError),

    /// The operation finished as `Canceled`; re-raised on request.
    #[error("operation was canceled")]
    Canceled(#[source] OperationError),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PromiseError {
    /// Returns the stored outcome if this error re-raises one.
    pub fn outcome(&self) -> Option<&OperationError> {
        match self {
            PromiseError::Faulted(e) | PromiseError::Canceled(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome payload stored by an operation that did not run to completion.
///
/// Cloning is cheap: wrapped errors are reference counted so the same payload
/// can be handed to every consumer of the operation.
#[derive(Clone, Error)]
pub enum OperationError {
    /// Cancellation signal. Routes an operation to the `Canceled` status.
    #[error("the operation was canceled")]
    Canceled,

    /// A single failure.
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync + 'static>),

    /// Several failures in a fixed order.
    ///
    /// An aggregate whose first inner error is [`OperationError::Canceled`] is
    /// treated as a cancellation signal.
    #[error("{} error(s) occurred: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<OperationError>),

    /// Every child of a disjunction finished without qualifying.
    ///
    /// Holds each child's terminal error in input order.
    #[error("no child operation qualified ({} completed without qualifying)", .0.len())]
    NoneQualified(Vec<OperationError>),
}

impl OperationError {
    /// Wraps an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        OperationError::Failed(Arc::new(error))
    }

    /// Creates a failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        OperationError::Failed(Arc::new(MessageError(message.into())))
    }

    /// Builds an aggregate from a collection of errors.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidArgument`] when the collection is empty.
    pub fn aggregate<I>(errors: I) -> Result<Self>
    where
        I: IntoIterator<Item = OperationError>,
    {
        let errors: Vec<_> = errors.into_iter().collect();
        if errors.is_empty() {
            return Err(PromiseError::InvalidArgument(
                "error collection must not be empty",
            ));
        }
        Ok(OperationError::Aggregate(errors))
    }

    /// Returns `true` if this error is a cancellation signal.
    ///
    /// That is the case for [`OperationError::Canceled`] itself and for an
    /// aggregate whose first inner error is `Canceled`.
    pub fn is_canceled(&self) -> bool {
        match self {
            OperationError::Canceled => true,
            OperationError::Aggregate(inner) => {
                matches!(inner.first(), Some(OperationError::Canceled))
            }
            _ => false,
        }
    }

    /// Inner errors of an aggregate, or a one-element slice for anything else.
    pub fn inner_errors(&self) -> &[OperationError] {
        match self {
            OperationError::Aggregate(inner) | OperationError::NoneQualified(inner) => inner,
            other => std::slice::from_ref(other),
        }
    }

    /// Attempts to downcast a wrapped failure to a concrete error type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            OperationError::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl fmt::Debug for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::Canceled => f.write_str("Canceled"),
            OperationError::Failed(inner) => f.debug_tuple("Failed").field(inner).finish(),
            OperationError::Aggregate(inner) => f.debug_tuple("Aggregate").field(inner).finish(),
            OperationError::NoneQualified(inner) => {
                f.debug_tuple("NoneQualified").field(inner).finish()
            }
        }
    }
}

fn join_messages(errors: &[OperationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error carrying only a message, used by [`OperationError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

// Outcomes cross threads with the operation that stores them
static_assertions::assert_impl_all!(PromiseError: Send, Sync);
static_assertions::assert_impl_all!(OperationError: Send, Sync, Clone);
