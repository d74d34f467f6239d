//! The shared operation handle and its read-only surface.
//!
//! This module contains [`AsyncOperation`], the constructors for pending and
//! pre-completed operations, status queries, outcome access, blocking waits
//! and disposal. Transitions live in `completion` and `cancel`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crate::error::{OperationError, PromiseError, Result};
use crate::operation::behavior::{DefaultBehavior, OperationBehavior};
use crate::operation::builder::OperationBuilder;
use crate::operation::slot::PayloadSlot;
use crate::operation::state::{StateSnapshot, StateWord};
use crate::operation::types::{CreationOptions, OperationId, OperationStatus};
use crate::registry::CallbackRegistry;
use crate::sync::{AtomicU32, Ordering, TakeCell};
use crate::wait::{LazyWaitHandle, WaitEvent};

/// Completion continuation.
pub type CompletionCallback<T> = Box<dyn FnOnce(&AsyncOperation<T>) + Send + 'static>;

/// Progress callback, invoked with the operation and its current progress.
pub type ProgressCallback<T> = Arc<dyn Fn(&AsyncOperation<T>, f32) + Send + Sync + 'static>;

pub(crate) struct Inner<T> {
    pub(crate) id: OperationId,
    pub(crate) state: StateWord,
    pub(crate) result: PayloadSlot<T>,
    pub(crate) error: PayloadSlot<OperationError>,
    /// Highest progress reported by the producer, as `f32` bits.
    pub(crate) progress: AtomicU32,
    pub(crate) continuations: CallbackRegistry<TakeCell<CompletionCallback<T>>>,
    pub(crate) progress_callbacks: CallbackRegistry<ProgressCallback<T>>,
    pub(crate) wait_handle: LazyWaitHandle,
    pub(crate) user_state: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) behavior: Box<dyn OperationBehavior<T>>,
}

/// A shared handle to the eventual outcome of an operation.
///
/// Cloning the handle is cheap and every clone observes the same state. Any
/// thread may complete the operation through the `try_set_*` family; exactly
/// one such call wins. Consumers poll the status, block with
/// [`wait`](Self::wait), register continuations, or `.await` the handle.
///
/// `T = ()` is the untyped variant, which completes without a payload.
///
/// # Example
///
/// ```rust
/// use safer_promise::{AsyncOperation, OperationStatus};
///
/// let operation = AsyncOperation::<i32>::new();
/// let producer = operation.clone();
///
/// std::thread::spawn(move || {
///     producer.try_set_result(7).unwrap();
/// });
///
/// assert_eq!(operation.join().unwrap(), 7);
/// assert_eq!(operation.status(), OperationStatus::RanToCompletion);
/// ```
pub struct AsyncOperation<T = ()> {
    pub(crate) inner: Arc<Inner<T>>,
}

/// Non-owning reference to an operation.
pub struct WeakOperation<T = ()> {
    inner: Weak<Inner<T>>,
}

impl<T> WeakOperation<T> {
    /// Returns the operation if it is still alive.
    pub fn upgrade(&self) -> Option<AsyncOperation<T>> {
        self.inner.upgrade().map(|inner| AsyncOperation { inner })
    }
}

impl<T> Clone for WeakOperation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WeakOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakOperation")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<T> Clone for AsyncOperation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> AsyncOperation<T> {
    /// Creates a pending operation in the `Created` status.
    pub fn new() -> Self {
        Self::with_options(CreationOptions::empty())
    }

    /// Creates a pending operation with the given options.
    ///
    /// The process-wide default options are added.
    pub fn with_options(options: CreationOptions) -> Self {
        Self::from_parts(
            OperationStatus::Created,
            options | crate::config::current().dispatch.default_options,
            None,
            Box::new(DefaultBehavior),
        )
    }

    /// Starts building an operation with hooks, user state or a non-default
    /// initial status.
    pub fn builder() -> OperationBuilder<T> {
        OperationBuilder::new()
    }

    /// Creates an operation that already ran to completion with `value`.
    pub fn from_result(value: T) -> Self {
        Self::precompleted(
            OperationStatus::RanToCompletion,
            CreationOptions::empty(),
            PayloadSlot::filled(value),
            PayloadSlot::empty(),
        )
    }

    /// Creates an operation that already finished with `error`.
    ///
    /// The error is classified like [`try_set_exception`](Self::try_set_exception):
    /// a cancellation signal yields a `Canceled` operation.
    pub fn from_error(error: OperationError) -> Self {
        let status = if error.is_canceled() {
            OperationStatus::Canceled
        } else {
            OperationStatus::Faulted
        };
        Self::precompleted(
            status,
            CreationOptions::empty(),
            PayloadSlot::empty(),
            PayloadSlot::filled(error),
        )
    }

    /// Creates an operation that is already canceled.
    pub fn canceled() -> Self {
        Self::from_error(OperationError::Canceled)
    }

    pub(crate) fn from_parts(
        status: OperationStatus,
        options: CreationOptions,
        user_state: Option<Arc<dyn Any + Send + Sync>>,
        behavior: Box<dyn OperationBehavior<T>>,
    ) -> Self {
        Self::from_state(
            StateWord::new(status, options),
            PayloadSlot::empty(),
            PayloadSlot::empty(),
            user_state,
            behavior,
        )
    }

    fn precompleted(
        status: OperationStatus,
        options: CreationOptions,
        result: PayloadSlot<T>,
        error: PayloadSlot<OperationError>,
    ) -> Self {
        Self::from_state(
            StateWord::new_completed(status, options),
            result,
            error,
            None,
            Box::new(DefaultBehavior),
        )
    }

    fn from_state(
        state: StateWord,
        result: PayloadSlot<T>,
        error: PayloadSlot<OperationError>,
        user_state: Option<Arc<dyn Any + Send + Sync>>,
        behavior: Box<dyn OperationBehavior<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: OperationId::next(),
                state,
                result,
                error,
                progress: AtomicU32::new(0.0_f32.to_bits()),
                continuations: CallbackRegistry::new(),
                progress_callbacks: CallbackRegistry::new(),
                wait_handle: LazyWaitHandle::new(),
                user_state,
                behavior,
            }),
        }
    }
}

impl AsyncOperation<()> {
    /// Creates an untyped operation that already completed successfully.
    pub fn completed() -> Self {
        Self::from_result(())
    }

    /// Process-wide completed sentinel. Disposal is a no-op.
    pub fn completed_shared() -> Self {
        static COMPLETED: OnceLock<AsyncOperation<()>> = OnceLock::new();
        COMPLETED
            .get_or_init(|| {
                Self::precompleted(
                    OperationStatus::RanToCompletion,
                    CreationOptions::DO_NOT_DISPOSE,
                    PayloadSlot::filled(()),
                    PayloadSlot::empty(),
                )
            })
            .clone()
    }

    /// Process-wide canceled sentinel. Disposal is a no-op.
    pub fn canceled_shared() -> Self {
        static CANCELED: OnceLock<AsyncOperation<()>> = OnceLock::new();
        CANCELED
            .get_or_init(|| {
                Self::precompleted(
                    OperationStatus::Canceled,
                    CreationOptions::DO_NOT_DISPOSE,
                    PayloadSlot::empty(),
                    PayloadSlot::filled(OperationError::Canceled),
                )
            })
            .clone()
    }
}

impl<T> AsyncOperation<T> {
    #[inline]
    pub(crate) fn state(&self) -> StateSnapshot {
        self.inner.state.load()
    }

    /// Process-unique identifier.
    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    /// Current status.
    pub fn status(&self) -> OperationStatus {
        self.state().status()
    }

    /// Returns `true` once a terminal status has been published.
    pub fn is_completed(&self) -> bool {
        self.state().is_completed()
    }

    /// Returns `true` if the status is `RanToCompletion`.
    pub fn is_completed_successfully(&self) -> bool {
        self.status() == OperationStatus::RanToCompletion
    }

    /// Returns `true` if the status is `Faulted`.
    pub fn is_faulted(&self) -> bool {
        self.status() == OperationStatus::Faulted
    }

    /// Returns `true` if the status is `Canceled`.
    pub fn is_canceled(&self) -> bool {
        self.status() == OperationStatus::Canceled
    }

    /// Returns `true` if the operation completed on the thread that created
    /// it, before it was handed out.
    pub fn completed_synchronously(&self) -> bool {
        self.state().completed_synchronously()
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancellation_requested(&self) -> bool {
        self.state().is_cancellation_requested()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has taken effect.
    pub fn is_disposed(&self) -> bool {
        self.state().is_disposed()
    }

    /// Options fixed at construction.
    pub fn creation_options(&self) -> CreationOptions {
        self.state().options()
    }

    /// User state attached at construction, if it has type `S`.
    pub fn user_state<S: Any>(&self) -> Option<&S> {
        self.inner.user_state.as_deref()?.downcast_ref::<S>()
    }

    /// The result, once the operation ran to completion.
    pub fn result(&self) -> Option<&T> {
        if self.is_completed() {
            // SAFETY: the completed flag was just observed with `Acquire`.
            unsafe { self.inner.result.get() }
        } else {
            None
        }
    }

    /// The stored error, once the operation faulted or was canceled.
    pub fn error(&self) -> Option<&OperationError> {
        if self.is_completed() {
            // SAFETY: the completed flag was just observed with `Acquire`.
            unsafe { self.inner.error.get() }
        } else {
            None
        }
    }

    /// Re-raises a stored fault or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::Faulted`] or [`PromiseError::Canceled`] carrying
    /// the stored error. Returns `Ok(())` for successful and pending
    /// operations.
    pub fn throw_if_non_success(&self) -> Result<()> {
        let stored = || self.error().cloned().unwrap_or(OperationError::Canceled);
        match self.status() {
            OperationStatus::Faulted => Err(PromiseError::Faulted(stored())),
            OperationStatus::Canceled => Err(PromiseError::Canceled(stored())),
            _ => Ok(()),
        }
    }

    /// Progress stored by [`try_set_progress`](Self::try_set_progress).
    pub fn stored_progress(&self) -> f32 {
        f32::from_bits(self.inner.progress.load(Ordering::Acquire))
    }

    /// Returns the shared wait event, creating it on first use.
    ///
    /// The event is set when the operation completes. After disposal a fresh,
    /// already set event is returned.
    pub fn wait_handle(&self) -> Arc<WaitEvent> {
        self.inner.wait_handle.get_or_create(|| self.is_completed())
    }

    /// Blocks the calling thread until the operation completes.
    pub fn wait(&self) {
        if !self.is_completed() {
            self.wait_handle().wait();
        }
    }

    /// Blocks until the operation completes or `timeout` elapses.
    ///
    /// Returns `true` if the operation completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.is_completed() || self.wait_handle().wait_timeout(timeout)
    }

    /// Returns a non-owning reference.
    pub fn downgrade(&self) -> WeakOperation<T> {
        WeakOperation {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles refer to the same operation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Releases the operation's resources.
    ///
    /// A no-op for operations created with
    /// [`CreationOptions::DO_NOT_DISPOSE`] and for operations already disposed.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidOperation`] if the operation has not
    /// completed.
    pub fn dispose(&self) -> Result<()> {
        let state = self.state();
        if state.options().contains(CreationOptions::DO_NOT_DISPOSE) || state.is_disposed() {
            return Ok(());
        }
        if !state.is_completed() {
            return Err(PromiseError::InvalidOperation(
                "cannot dispose an operation that has not completed",
            ));
        }

        self.inner.state.mark_disposed();
        let released = self.inner.wait_handle.release();
        tracing::debug!(
            operation = %self.id(),
            released_wait_handle = released,
            "operation disposed"
        );
        Ok(())
    }
}

impl<T: Clone> AsyncOperation<T> {
    /// Blocks until completion, then returns the result or re-raises the
    /// stored outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::Faulted`] or [`PromiseError::Canceled`] if the
    /// operation did not run to completion.
    pub fn join(&self) -> Result<T> {
        self.wait();
        self.completed_outcome()
    }

    /// Outcome of an operation known to be completed.
    pub(crate) fn completed_outcome(&self) -> Result<T> {
        self.throw_if_non_success()?;
        self.result()
            .cloned()
            .ok_or(PromiseError::InvalidOperation("operation has not completed"))
    }
}

impl<T: Send + Sync + 'static> Default for AsyncOperation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("AsyncOperation")
            .field("id", &self.inner.id)
            .field("status", &state.status())
            .field("synchronous", &state.completed_synchronously())
            .field("cancellation_requested", &state.is_cancellation_requested())
            .field("disposed", &state.is_disposed())
            .field("options", &state.options())
            .finish()
    }
}

static_assertions::assert_impl_all!(AsyncOperation<()>: Send, Sync, Clone);
static_assertions::assert_impl_all!(AsyncOperation<Vec<u8>>: Send, Sync);
