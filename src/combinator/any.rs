//! Disjunction: completes with the first qualifying child.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{OperationError, PromiseError, Result};
use crate::operation::{AsyncOperation, OperationBehavior, OperationStatus, Outcome};

const NO_WINNER: usize = usize::MAX;

/// Which child completions finish a [`WhenAny`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnyPolicy {
    /// Only a child that ran to completion qualifies; its result is taken.
    #[default]
    Succeeded,
    /// Any completed child qualifies; its outcome is mirrored, whether result,
    /// fault or cancellation.
    Completed,
}

struct DisjunctionState<T> {
    children: Vec<AsyncOperation<T>>,
    policy: AnyPolicy,
    winner: AtomicUsize,
    best_progress: AtomicU32,
}

struct Disjunction<T>(Arc<DisjunctionState<T>>);

impl<T: Send + Sync + 'static> OperationBehavior<T> for Disjunction<T> {
    fn progress(&self, _operation: &AsyncOperation<T>) -> f32 {
        f32::from_bits(self.0.best_progress.load(Ordering::Acquire))
    }

    fn on_cancel_requested(&self, operation: &AsyncOperation<T>) -> Result<()> {
        for child in &self.0.children {
            if let Err(err) = child.request_cancellation() {
                tracing::debug!(
                    operation = %operation.id(),
                    child = %child.id(),
                    error = %err,
                    "child did not accept cancellation"
                );
            }
        }
        Ok(())
    }
}

/// Operation that completes with the first child satisfying an
/// [`AnyPolicy`].
///
/// A `WhenAny` is driven by [`poll`](Self::poll) rather than by child
/// callbacks: call it from an update loop, a timer, or a continuation of your
/// own. Each poll scans the children in input order, so among children that
/// are ready at the same time the earliest one wins.
///
/// If every child completed and none qualified, the operation faults with
/// [`OperationError::NoneQualified`] listing each child's error in input
/// order.
///
/// # Example
///
/// ```rust
/// use safer_promise::{combinator::{AnyPolicy, WhenAny}, AsyncOperation};
///
/// let slow = AsyncOperation::<u32>::new();
/// let fast = AsyncOperation::<u32>::new();
/// let any = WhenAny::new([slow.clone(), fast.clone()], AnyPolicy::Succeeded).unwrap();
///
/// assert!(!any.poll());
/// fast.try_set_result(5).unwrap();
/// assert!(any.poll());
/// assert_eq!(any.operation().result(), Some(&5));
/// assert_eq!(any.winner(), Some(1));
/// ```
pub struct WhenAny<T> {
    operation: AsyncOperation<T>,
    state: Arc<DisjunctionState<T>>,
}

impl<T: Clone + Send + Sync + 'static> WhenAny<T> {
    /// Creates a running disjunction over `children`.
    ///
    /// `None` entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidArgument`] if no child remains.
    pub fn new<I, C>(children: I, policy: AnyPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<AsyncOperation<T>>>,
    {
        let children: Vec<AsyncOperation<T>> = children
            .into_iter()
            .filter_map(|child| -> Option<AsyncOperation<T>> { child.into() })
            .collect();
        if children.is_empty() {
            return Err(PromiseError::InvalidArgument(
                "a disjunction needs at least one child",
            ));
        }

        let state = Arc::new(DisjunctionState {
            children,
            policy,
            winner: AtomicUsize::new(NO_WINNER),
            best_progress: AtomicU32::new(0.0_f32.to_bits()),
        });
        let operation = AsyncOperation::builder()
            .status(OperationStatus::Running)
            .behavior(Disjunction(Arc::clone(&state)))
            .build()?;

        Ok(Self { operation, state })
    }

    /// Scans the children once.
    ///
    /// Returns `true` if the disjunction is completed after the scan. Polling
    /// a completed disjunction does nothing.
    pub fn poll(&self) -> bool {
        if self.operation.is_completed() {
            return true;
        }

        let mut all_completed = true;
        let mut best = 0.0_f32;
        for (index, child) in self.state.children.iter().enumerate() {
            if child.is_completed() {
                let qualifies = match self.state.policy {
                    AnyPolicy::Succeeded => child.is_completed_successfully(),
                    AnyPolicy::Completed => true,
                };
                if qualifies {
                    self.finish_with(index, child);
                    return true;
                }
            } else {
                all_completed = false;
            }
            best = best.max(child.progress());
        }

        if all_completed {
            let errors = self
                .state
                .children
                .iter()
                .map(|child| child.error().cloned().unwrap_or(OperationError::Canceled))
                .collect();
            self.complete(Outcome::Fault(OperationError::NoneQualified(errors)));
            return true;
        }

        let raised = self
            .state
            .best_progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (best > f32::from_bits(bits)).then(|| best.to_bits())
            })
            .is_ok();
        if raised {
            self.operation.report_progress();
        }
        false
    }

    fn finish_with(&self, index: usize, child: &AsyncOperation<T>) {
        if self
            .state
            .winner
            .compare_exchange(NO_WINNER, index, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another poll already elected a winner and is completing.
            return;
        }

        let outcome = match child.status() {
            OperationStatus::RanToCompletion => match child.result() {
                Some(value) => Outcome::Success(value.clone()),
                None => Outcome::Fault(OperationError::msg("child completed without a result")),
            },
            OperationStatus::Canceled => Outcome::Cancel(
                child.error().cloned().unwrap_or(OperationError::Canceled),
            ),
            _ => Outcome::Fault(
                child
                    .error()
                    .cloned()
                    .unwrap_or_else(|| OperationError::msg("child faulted without an error")),
            ),
        };

        if !self.complete(outcome) {
            self.state.winner.store(NO_WINNER, Ordering::Release);
        }
    }

    fn complete(&self, outcome: Outcome<T>) -> bool {
        match self.operation.try_complete(outcome, false) {
            Ok(won) => won,
            Err(err) => {
                tracing::debug!(
                    operation = %self.operation.id(),
                    error = %err,
                    "disjunction could not complete"
                );
                false
            }
        }
    }
}

impl<T> WhenAny<T> {
    /// The combined operation.
    pub fn operation(&self) -> &AsyncOperation<T> {
        &self.operation
    }

    /// Consumes the disjunction, returning the combined operation.
    ///
    /// Polling stops; keep the `WhenAny` around if children are still running.
    pub fn into_operation(self) -> AsyncOperation<T> {
        self.operation
    }

    /// Index of the child that finished the disjunction.
    pub fn winner(&self) -> Option<usize> {
        match self.state.winner.load(Ordering::Acquire) {
            NO_WINNER => None,
            index => Some(index),
        }
    }

    /// The children, `None` entries removed, in input order.
    pub fn children(&self) -> &[AsyncOperation<T>] {
        &self.state.children
    }
}

impl<T> fmt::Debug for WhenAny<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenAny")
            .field("operation", &self.operation)
            .field("policy", &self.state.policy)
            .field("children", &self.state.children.len())
            .field("winner", &self.winner())
            .finish()
    }
}
