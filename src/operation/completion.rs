//! Status transitions, the completion protocol and progress reporting.
//!
//! Completing an operation is reserve, write, seal, publish, notify:
//!
//! 1. [`StateWord::try_reserve`] elects one caller.
//! 2. The winner writes the result or error into its write-once slot.
//! 3. The winner seals the progress and completion registries, taking their
//!    callbacks out.
//! 4. The winner publishes the terminal status; the payload is visible to any
//!    thread that observes the completed flag.
//! 5. The winner runs the completion hooks, sets the wait event if one was
//!    created, then dispatches the callbacks taken in step 3.
//!
//! No step takes a blocking lock, and no user code runs between steps 1 and
//! 4. A registration that finds a registry sealed waits for step 4 and then
//! dispatches its callback itself. Hook panics are contained, so waiters and
//! continuations are always released.
//!
//! Losers return `Ok(false)` after a bounded wait for step 4, so a `false`
//! result means the operation is completed or about to be.
//!
//! [`StateWord::try_reserve`]: crate::operation::state::StateWord::try_reserve

use std::sync::Arc;

use crate::config;
use crate::context::{self, DispatchContext};
use crate::error::{OperationError, PromiseError, Result};
use crate::operation::state::StateSnapshot;
use crate::operation::{AsyncOperation, CreationOptions, OperationStatus};
use crate::registry::{self, ContinuationId, Registration};
use crate::sync::{yield_now, Ordering, TakeCell};

use super::core::{CompletionCallback, ProgressCallback};

/// Largest progress reported before an operation has run to completion.
///
/// 1.0 is reserved for `RanToCompletion`, so pending, faulted and canceled
/// operations report at most the largest `f32` below it.
pub const MAX_PENDING_PROGRESS: f32 = 1.0 - f32::EPSILON / 2.0;

type ContinuationRegistration<T> = Registration<TakeCell<CompletionCallback<T>>>;
type ProgressRegistration<T> = Registration<ProgressCallback<T>>;

/// Terminal outcome handed to [`AsyncOperation::try_complete`].
pub(crate) enum Outcome<T> {
    Success(T),
    Fault(OperationError),
    Cancel(OperationError),
}

impl<T> Outcome<T> {
    /// Routes cancellation signals to `Cancel` and everything else to `Fault`.
    pub(crate) fn classify(error: OperationError) -> Self {
        if error.is_canceled() {
            Outcome::Cancel(error)
        } else {
            Outcome::Fault(error)
        }
    }
}

impl<T: Send + Sync + 'static> AsyncOperation<T> {
    /// Moves the operation to `Scheduled`.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the status is already `Scheduled` or later, or if
    /// completion has begun.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_scheduled(&self) -> Result<bool> {
        self.advance(OperationStatus::Scheduled)
    }

    /// Moves the operation to `Running`, invoking the `on_started` hook on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_running(&self) -> Result<bool> {
        let advanced = self.advance(OperationStatus::Running)?;
        if advanced {
            self.inner.behavior.on_started(self);
        }
        Ok(advanced)
    }

    fn advance(&self, target: OperationStatus) -> Result<bool> {
        let advanced = self.inner.state.try_advance(target)?;
        if advanced {
            if config::current().logging.trace_transitions {
                tracing::trace!(operation = %self.id(), status = %target, "status changed");
            }
            self.inner.behavior.on_status_changed(self, target);
        }
        Ok(advanced)
    }

    /// Completes the operation successfully with `value`.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if another call completed the operation first; `value` is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_result(&self, value: T) -> Result<bool> {
        self.try_complete(Outcome::Success(value), false)
    }

    /// Completes the operation with `error`.
    ///
    /// [`OperationError::Canceled`], or an aggregate whose first inner error
    /// is `Canceled`, produces the `Canceled` status. Anything else produces
    /// `Faulted`.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_exception(&self, error: OperationError) -> Result<bool> {
        self.try_complete(Outcome::classify(error), false)
    }

    /// Completes the operation with an ordered collection of errors.
    ///
    /// The errors are stored as an [`OperationError::Aggregate`] and
    /// classified like [`try_set_exception`](Self::try_set_exception).
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidArgument`] if `errors` is empty, or
    /// [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_exceptions<I>(&self, errors: I) -> Result<bool>
    where
        I: IntoIterator<Item = OperationError>,
    {
        let aggregate = OperationError::aggregate(errors)?;
        self.try_complete(Outcome::classify(aggregate), false)
    }

    /// Completes the operation as `Canceled`.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_canceled(&self) -> Result<bool> {
        self.try_complete(Outcome::Cancel(OperationError::Canceled), false)
    }

    /// Like [`try_set_result`](Self::try_set_result), but losing the race is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidOperation`] if the operation was
    /// already completed.
    pub fn set_result(&self, value: T) -> Result<()> {
        Self::require_won(self.try_set_result(value)?)
    }

    /// Like [`try_set_exception`](Self::try_set_exception), but losing the
    /// race is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidOperation`] if the operation was
    /// already completed.
    pub fn set_exception(&self, error: OperationError) -> Result<()> {
        Self::require_won(self.try_set_exception(error)?)
    }

    /// Like [`try_set_canceled`](Self::try_set_canceled), but losing the race
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidOperation`] if the operation was
    /// already completed.
    pub fn set_canceled(&self) -> Result<()> {
        Self::require_won(self.try_set_canceled()?)
    }

    fn require_won(won: bool) -> Result<()> {
        if won {
            Ok(())
        } else {
            Err(PromiseError::InvalidOperation("operation is already completed"))
        }
    }

    /// Runs the completion protocol.
    pub(crate) fn try_complete(&self, outcome: Outcome<T>, synchronous: bool) -> Result<bool> {
        if self.state().is_disposed() {
            return Err(PromiseError::ObjectDisposed);
        }

        let Some(reservation) = self.inner.state.try_reserve() else {
            self.await_winner();
            return Ok(false);
        };

        // SAFETY: the reservation is held and not yet published, so this is
        // the only write and no reader can see the slots yet.
        let status = match outcome {
            Outcome::Success(value) => {
                unsafe { self.inner.result.write(value) };
                OperationStatus::RanToCompletion
            }
            Outcome::Fault(error) => {
                unsafe { self.inner.error.write(error) };
                OperationStatus::Faulted
            }
            Outcome::Cancel(error) => {
                unsafe { self.inner.error.write(error) };
                OperationStatus::Canceled
            }
        };

        let progress_callbacks = self.inner.progress_callbacks.seal();
        let continuations = self.inner.continuations.seal();
        let snapshot = reservation.publish(status, synchronous);
        self.finish(snapshot, progress_callbacks, continuations);
        Ok(true)
    }

    fn await_winner(&self) {
        let spin = config::current().spin;
        if !self
            .inner
            .state
            .spin_until_completed(spin.max_spins, spin.yield_after)
        {
            tracing::debug!(operation = %self.id(), "completion still pending after lost race");
        }
    }

    /// Waits for the terminal status after finding a registry sealed.
    ///
    /// The winner publishes right after sealing, without running user code,
    /// so this wait is short.
    fn await_published(&self) {
        let spin = config::current().spin;
        while !self
            .inner
            .state
            .spin_until_completed(spin.max_spins, spin.yield_after)
        {
            yield_now();
        }
    }

    fn finish(
        &self,
        snapshot: StateSnapshot,
        progress_callbacks: Vec<Arc<ProgressRegistration<T>>>,
        continuations: Vec<Arc<ContinuationRegistration<T>>>,
    ) {
        let status = snapshot.status();
        if config::current().logging.trace_transitions {
            tracing::trace!(
                operation = %self.id(),
                %status,
                synchronous = snapshot.completed_synchronously(),
                "operation completed"
            );
        }

        let behavior = &self.inner.behavior;
        registry::isolated("on_status_changed", || behavior.on_status_changed(self, status));
        registry::isolated("on_completed", || behavior.on_completed(self));
        self.inner.wait_handle.signal();

        if !progress_callbacks.is_empty() {
            let progress = registry::isolated("progress", || self.progress()).unwrap_or(0.0);
            for registration in &progress_callbacks {
                self.dispatch_progress(registration, progress);
            }
        }

        let force_async = snapshot
            .options()
            .contains(CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY);
        for registration in &continuations {
            self.dispatch_continuation(registration, force_async);
        }
    }

    /// Current progress in `[0, 1]`.
    ///
    /// Exactly 1.0 after successful completion and 0.0 before the operation
    /// runs. Otherwise the behavior's progress, clamped to
    /// `[0, MAX_PENDING_PROGRESS]`: an operation that has not run to
    /// completion never reports 1.0, even if the producer stored 1.0.
    pub fn progress(&self) -> f32 {
        match self.status() {
            OperationStatus::RanToCompletion => 1.0,
            OperationStatus::Created | OperationStatus::Scheduled => 0.0,
            _ => {
                let progress = self.inner.behavior.progress(self);
                if progress.is_nan() {
                    0.0
                } else {
                    progress.clamp(0.0, MAX_PENDING_PROGRESS)
                }
            }
        }
    }

    /// Records producer progress and reports it.
    ///
    /// Moves a pending operation to `Running` first. Values that do not
    /// increase the stored progress are ignored.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the stored progress increased.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidArgument`] for values outside `[0, 1]`
    /// (NaN included) and [`PromiseError::ObjectDisposed`] after disposal.
    pub fn try_set_progress(&self, progress: f32) -> Result<bool> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(PromiseError::InvalidArgument("progress must be within [0, 1]"));
        }

        let state = self.state();
        if state.is_disposed() {
            return Err(PromiseError::ObjectDisposed);
        }
        if state.is_completing() {
            return Ok(false);
        }

        self.try_set_running()?;
        let raised = self
            .inner
            .progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (progress > f32::from_bits(bits)).then(|| progress.to_bits())
            })
            .is_ok();

        if raised {
            self.report_progress();
        }
        Ok(raised)
    }

    /// Notifies the progress hook and every progress callback.
    ///
    /// Completion continuations are not invoked. Reports after completion are
    /// ignored; the final progress was delivered when the operation completed.
    pub fn report_progress(&self) {
        if self.is_completed() {
            return;
        }

        let progress = self.progress();
        self.inner.behavior.on_progress_changed(self, progress);
        for registration in self.inner.progress_callbacks.snapshot() {
            self.dispatch_progress(&registration, progress);
        }
    }

    /// Registers a continuation that runs on the completing thread.
    ///
    /// If the operation has already completed, `callback` runs immediately and
    /// the returned id cannot be used for removal.
    pub fn add_continuation(
        &self,
        callback: impl FnOnce(&AsyncOperation<T>) + Send + 'static,
    ) -> ContinuationId {
        self.register_continuation(Box::new(callback), None)
    }

    /// Registers a continuation that is posted to `context`.
    ///
    /// It runs inline when `context` is current on the completing thread and
    /// asynchronous continuations were not requested.
    pub fn add_continuation_on(
        &self,
        callback: impl FnOnce(&AsyncOperation<T>) + Send + 'static,
        context: Arc<dyn DispatchContext>,
    ) -> ContinuationId {
        self.register_continuation(Box::new(callback), Some(context))
    }

    /// Registers a continuation bound to the calling thread's current context,
    /// if one has been entered.
    pub fn add_continuation_captured(
        &self,
        callback: impl FnOnce(&AsyncOperation<T>) + Send + 'static,
    ) -> ContinuationId {
        self.register_continuation(Box::new(callback), context::current())
    }

    /// Removes a continuation that has not run yet.
    pub fn remove_continuation(&self, id: ContinuationId) -> bool {
        self.inner.continuations.remove(id)
    }

    fn register_continuation(
        &self,
        callback: CompletionCallback<T>,
        context: Option<Arc<dyn DispatchContext>>,
    ) -> ContinuationId {
        match self
            .inner
            .continuations
            .try_add(TakeCell::new(callback), context)
        {
            Ok(id) => id,
            Err(registration) => {
                self.await_published();
                let force_async = self
                    .creation_options()
                    .contains(CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY);
                self.dispatch_continuation(&registration, force_async);
                ContinuationId::IMMEDIATE
            }
        }
    }

    /// Registers a progress callback.
    ///
    /// If the operation has already completed, `callback` is invoked once with
    /// the final progress.
    pub fn add_progress_callback(
        &self,
        callback: impl Fn(&AsyncOperation<T>, f32) + Send + Sync + 'static,
    ) -> ContinuationId {
        self.register_progress(Arc::new(callback), None)
    }

    /// Registers a progress callback that is posted to `context`.
    pub fn add_progress_callback_on(
        &self,
        callback: impl Fn(&AsyncOperation<T>, f32) + Send + Sync + 'static,
        context: Arc<dyn DispatchContext>,
    ) -> ContinuationId {
        self.register_progress(Arc::new(callback), Some(context))
    }

    /// Removes a progress callback.
    pub fn remove_progress_callback(&self, id: ContinuationId) -> bool {
        self.inner.progress_callbacks.remove(id)
    }

    fn register_progress(
        &self,
        callback: ProgressCallback<T>,
        context: Option<Arc<dyn DispatchContext>>,
    ) -> ContinuationId {
        match self.inner.progress_callbacks.try_add(callback, context) {
            Ok(id) => id,
            Err(registration) => {
                self.await_published();
                self.dispatch_progress(&registration, self.progress());
                ContinuationId::IMMEDIATE
            }
        }
    }

    fn dispatch_continuation(&self, registration: &ContinuationRegistration<T>, force_async: bool) {
        let Some(callback) = registration.callback().take() else {
            return;
        };
        let operation = self.clone();
        registry::dispatch(
            registration.context(),
            force_async,
            Box::new(move || callback(&operation)),
        );
    }

    fn dispatch_progress(&self, registration: &ProgressRegistration<T>, progress: f32) {
        let operation = self.clone();
        let callback = Arc::clone(registration.callback());
        registry::dispatch(
            registration.context(),
            false,
            Box::new(move || callback(&operation, progress)),
        );
    }
}

impl AsyncOperation<()> {
    /// Completes an untyped operation successfully.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub fn try_set_completed(&self) -> Result<bool> {
        self.try_set_result(())
    }

    /// Like [`try_set_completed`](Self::try_set_completed), but losing the
    /// race is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidOperation`] if the operation was
    /// already completed.
    pub fn set_completed(&self) -> Result<()> {
        self.set_result(())
    }
}
