//! Overridable lifecycle hooks.
//!
//! An operation's state machine is fixed; what varies between kinds of
//! operations (a manually completed source, a combinator, a timer wrapper
//! living outside this crate) is expressed by implementing
//! [`OperationBehavior`]. Every hook has a default, so implementors only
//! supply the ones they need.

use std::fmt;

use crate::error::{PromiseError, Result};
use crate::operation::{AsyncOperation, OperationStatus};

/// Hooks invoked by an operation's state machine.
///
/// Hooks run synchronously on the thread performing the transition. They must
/// not block on the operation they are attached to.
pub trait OperationBehavior<T>: Send + Sync + 'static {
    /// Called once, after the first successful transition to `Running`.
    fn on_started(&self, _operation: &AsyncOperation<T>) {}

    /// Called after every successful status change, terminal ones included.
    fn on_status_changed(&self, _operation: &AsyncOperation<T>, _status: OperationStatus) {}

    /// Called once, after the terminal status is published and before any
    /// continuation runs.
    fn on_completed(&self, _operation: &AsyncOperation<T>) {}

    /// Called once, when cancellation is first requested.
    ///
    /// Implementations that honor cancellation call one of the terminal
    /// `try_set_*` methods, now or later from another thread.
    ///
    /// # Errors
    ///
    /// The default returns [`PromiseError::Unsupported`]. The request flag is
    /// set regardless.
    fn on_cancel_requested(&self, _operation: &AsyncOperation<T>) -> Result<()> {
        Err(PromiseError::Unsupported("cancellation"))
    }

    /// Current progress while the operation is running. Values outside
    /// `[0, 1]` are clamped by the caller.
    fn progress(&self, operation: &AsyncOperation<T>) -> f32 {
        operation.stored_progress()
    }

    /// Called on every progress report.
    fn on_progress_changed(&self, _operation: &AsyncOperation<T>, _progress: f32) {}
}

/// Behavior with every hook left at its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBehavior;

impl<T> OperationBehavior<T> for DefaultBehavior {}

type Hook<T> = Box<dyn Fn(&AsyncOperation<T>) + Send + Sync>;
type CancelHook<T> = Box<dyn Fn(&AsyncOperation<T>) -> Result<()> + Send + Sync>;
type ProgressHook<T> = Box<dyn Fn(&AsyncOperation<T>) -> f32 + Send + Sync>;

/// Behavior assembled from closures.
///
/// Hooks that are not supplied keep their default.
pub struct FnBehavior<T> {
    on_started: Option<Hook<T>>,
    on_completed: Option<Hook<T>>,
    on_cancel_requested: Option<CancelHook<T>>,
    progress: Option<ProgressHook<T>>,
}

impl<T> FnBehavior<T> {
    /// A behavior with no closures installed.
    pub fn new() -> Self {
        Self {
            on_started: None,
            on_completed: None,
            on_cancel_requested: None,
            progress: None,
        }
    }

    /// Sets the `on_started` hook.
    pub fn on_started(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) + Send + Sync + 'static,
    ) -> Self {
        self.on_started = Some(Box::new(hook));
        self
    }

    /// Sets the `on_completed` hook.
    pub fn on_completed(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) + Send + Sync + 'static,
    ) -> Self {
        self.on_completed = Some(Box::new(hook));
        self
    }

    /// Sets the `on_cancel_requested` hook.
    pub fn on_cancel_requested(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_cancel_requested = Some(Box::new(hook));
        self
    }

    /// Sets the progress function.
    pub fn progress(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) -> f32 + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Returns `true` if no closure is installed.
    pub fn is_empty(&self) -> bool {
        self.on_started.is_none()
            && self.on_completed.is_none()
            && self.on_cancel_requested.is_none()
            && self.progress.is_none()
    }
}

impl<T> Default for FnBehavior<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FnBehavior<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehavior")
            .field("on_started", &self.on_started.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_cancel_requested", &self.on_cancel_requested.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<T: 'static> OperationBehavior<T> for FnBehavior<T> {
    fn on_started(&self, operation: &AsyncOperation<T>) {
        if let Some(hook) = &self.on_started {
            hook(operation);
        }
    }

    fn on_completed(&self, operation: &AsyncOperation<T>) {
        if let Some(hook) = &self.on_completed {
            hook(operation);
        }
    }

    fn on_cancel_requested(&self, operation: &AsyncOperation<T>) -> Result<()> {
        match &self.on_cancel_requested {
            Some(hook) => hook(operation),
            None => Err(PromiseError::Unsupported("cancellation")),
        }
    }

    fn progress(&self, operation: &AsyncOperation<T>) -> f32 {
        match &self.progress {
            Some(hook) => hook(operation),
            None => operation.stored_progress(),
        }
    }
}
