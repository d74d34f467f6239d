//! Conjunction: completes once every child has completed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{OperationError, Result};
use crate::operation::{AsyncOperation, AsyncResult, OperationBehavior, OperationStatus, Outcome};

struct ConjunctionState<C, R> {
    children: Vec<C>,
    remaining: AtomicUsize,
    collect: fn(&[C]) -> R,
}

impl<C: AsyncResult, R: Send + Sync + 'static> ConjunctionState<C, R> {
    fn on_child_completed(&self, operation: &AsyncOperation<R>) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            operation.report_progress();
            return;
        }

        let faults: Vec<OperationError> = self
            .children
            .iter()
            .filter(|child| child.status() == OperationStatus::Faulted)
            .filter_map(|child| child.error().cloned())
            .collect();

        let outcome = if !faults.is_empty() {
            Outcome::Fault(OperationError::Aggregate(faults))
        } else if let Some(child) = self
            .children
            .iter()
            .find(|child| child.status() == OperationStatus::Canceled)
        {
            Outcome::Cancel(child.error().cloned().unwrap_or(OperationError::Canceled))
        } else {
            Outcome::Success((self.collect)(&self.children))
        };

        if let Err(err) = operation.try_complete(outcome, false) {
            tracing::debug!(
                operation = %operation.id(),
                error = %err,
                "conjunction could not complete"
            );
        }
    }

    fn mean_progress(&self) -> f32 {
        let total: f32 = self.children.iter().map(|child| child.progress()).sum();
        total / self.children.len() as f32
    }
}

struct Conjunction<C, R>(Arc<ConjunctionState<C, R>>);

impl<C, R> OperationBehavior<R> for Conjunction<C, R>
where
    C: AsyncResult + 'static,
    R: Send + Sync + 'static,
{
    fn progress(&self, _operation: &AsyncOperation<R>) -> f32 {
        self.0.mean_progress()
    }

    fn on_cancel_requested(&self, operation: &AsyncOperation<R>) -> Result<()> {
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

fn build_conjunction<C, R>(children: Vec<C>, collect: fn(&[C]) -> R) -> Result<AsyncOperation<R>>
where
    C: AsyncResult + 'static,
    R: Send + Sync + 'static,
{
    if children.is_empty() {
        return Ok(AsyncOperation::from_result(collect(&[])));
    }

    let state = Arc::new(ConjunctionState {
        remaining: AtomicUsize::new(children.len()),
        children,
        collect,
    });
    let operation = AsyncOperation::builder()
        .status(OperationStatus::Running)
        .behavior(Conjunction(Arc::clone(&state)))
        .build()?;

    for child in &state.children {
        let weak_operation = operation.downgrade();
        let weak_state: Weak<ConjunctionState<C, R>> = Arc::downgrade(&state);
        child.add_completion_callback(Box::new(move || {
            if let (Some(operation), Some(state)) = (weak_operation.upgrade(), weak_state.upgrade())
            {
                state.on_child_completed(&operation);
            }
        }));
    }

    Ok(operation)
}

/// Combines operations into one that completes when all of them have.
///
/// The combined operation starts `Running` and finishes:
///
/// - `Faulted` with an [`OperationError::Aggregate`] of every faulted child's
///   error, in input order, if any child faulted;
/// - otherwise `Canceled` if any child was canceled;
/// - otherwise `RanToCompletion` with the children's results in input order.
///
/// Its progress is the mean of the children's progress. Requesting its
/// cancellation requests cancellation of every child. An empty input yields
/// an operation that already completed with an empty vector.
///
/// # Example
///
/// ```rust
/// use safer_promise::{combinator, AsyncOperation};
///
/// let a = AsyncOperation::<i32>::new();
/// let b = AsyncOperation::<i32>::new();
/// let all = combinator::when_all([a.clone(), b.clone()]).unwrap();
///
/// b.try_set_result(2).unwrap();
/// a.try_set_result(1).unwrap();
/// assert_eq!(all.join().unwrap(), vec![1, 2]);
/// ```
///
/// # Errors
///
/// Propagates builder failures; none occur with the default configuration.
pub fn when_all<T, I>(children: I) -> Result<AsyncOperation<Vec<T>>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = AsyncOperation<T>>,
{
    let children: Vec<AsyncOperation<T>> = children.into_iter().collect();
    build_conjunction(children, |children: &[AsyncOperation<T>]| {
        children
            .iter()
            .filter_map(|child| child.result().cloned())
            .collect::<Vec<T>>()
    })
}

/// Like [`when_all`], for children of any result type. Completes without a
/// payload.
///
/// # Errors
///
/// Propagates builder failures; none occur with the default configuration.
pub fn when_all_void(children: Vec<Box<dyn AsyncResult>>) -> Result<AsyncOperation<()>> {
    build_conjunction(children, |_: &[Box<dyn AsyncResult>]| ())
}
