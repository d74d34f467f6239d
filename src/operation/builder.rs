//! Fluent construction of operations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::config;
use crate::error::{PromiseError, Result};
use crate::operation::behavior::{DefaultBehavior, FnBehavior, OperationBehavior};
use crate::operation::{AsyncOperation, CreationOptions, OperationStatus};

/// Builder for [`AsyncOperation`].
///
/// Behavior is supplied either as a whole with [`behavior`](Self::behavior) or
/// hook by hook with the closure setters, not both.
///
/// # Example
///
/// ```rust
/// use safer_promise::{AsyncOperation, CreationOptions, OperationStatus};
///
/// let operation = AsyncOperation::<u32>::builder()
///     .options(CreationOptions::SUPPRESS_CANCELLATION)
///     .status(OperationStatus::Scheduled)
///     .user_state("download #4")
///     .build()
///     .unwrap();
///
/// assert_eq!(operation.status(), OperationStatus::Scheduled);
/// assert_eq!(operation.user_state::<&str>(), Some(&"download #4"));
/// ```
pub struct OperationBuilder<T> {
    options: CreationOptions,
    status: OperationStatus,
    user_state: Option<Arc<dyn Any + Send + Sync>>,
    behavior: Option<Box<dyn OperationBehavior<T>>>,
    hooks: FnBehavior<T>,
}

impl<T: Send + Sync + 'static> OperationBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            options: CreationOptions::empty(),
            status: OperationStatus::Created,
            user_state: None,
            behavior: None,
            hooks: FnBehavior::new(),
        }
    }

    /// Sets the creation options.
    pub fn options(mut self, options: CreationOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the initial status. Must not be terminal.
    pub fn status(mut self, status: OperationStatus) -> Self {
        self.status = status;
        self
    }

    /// Attaches opaque user state.
    pub fn user_state<S: Any + Send + Sync>(mut self, state: S) -> Self {
        self.user_state = Some(Arc::new(state));
        self
    }

    /// Attaches already shared user state.
    pub fn shared_user_state(mut self, state: Arc<dyn Any + Send + Sync>) -> Self {
        self.user_state = Some(state);
        self
    }

    /// Installs a behavior.
    pub fn behavior(mut self, behavior: impl OperationBehavior<T>) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }

    /// Sets the `on_started` hook.
    pub fn on_started(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks = self.hooks.on_started(hook);
        self
    }

    /// Sets the `on_completed` hook.
    pub fn on_completed(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks = self.hooks.on_completed(hook);
        self
    }

    /// Sets the `on_cancel_requested` hook.
    pub fn on_cancel_requested(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks = self.hooks.on_cancel_requested(hook);
        self
    }

    /// Sets the progress function.
    pub fn progress_fn(
        mut self,
        hook: impl Fn(&AsyncOperation<T>) -> f32 + Send + Sync + 'static,
    ) -> Self {
        self.hooks = self.hooks.progress(hook);
        self
    }

    /// Builds the operation.
    ///
    /// The process-wide default options from [`config::current`] are added to
    /// the options set here.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidArgument`] if the initial status is
    /// terminal, or if closure hooks were combined with a behavior.
    pub fn build(self) -> Result<AsyncOperation<T>> {
        if self.status.is_terminal() {
            return Err(PromiseError::InvalidArgument(
                "initial status must not be terminal",
            ));
        }

        let behavior: Box<dyn OperationBehavior<T>> = match self.behavior {
            Some(_) if !self.hooks.is_empty() => {
                return Err(PromiseError::InvalidArgument(
                    "closure hooks cannot be combined with a behavior",
                ))
            }
            Some(behavior) => behavior,
            None if self.hooks.is_empty() => Box::new(DefaultBehavior),
            None => Box::new(self.hooks),
        };

        let options = self.options | config::current().dispatch.default_options;
        Ok(AsyncOperation::from_parts(
            self.status,
            options,
            self.user_state,
            behavior,
        ))
    }
}

impl<T> fmt::Debug for OperationBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationBuilder")
            .field("options", &self.options)
            .field("status", &self.status)
            .field("has_user_state", &self.user_state.is_some())
            .field("has_behavior", &self.behavior.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}
