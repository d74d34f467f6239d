//! Loom-based concurrency tests for the completion protocol.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test --test loom_concurrency --release`.

#![cfg(loom)]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;
use safer_promise::{AsyncOperation, OperationError, OperationStatus};

/// Exactly one of two racing completions wins, and its payload is the one
/// observed.
#[test]
fn racing_result_and_cancel_complete_once() {
    loom::model(|| {
        let operation = AsyncOperation::<u32>::new();

        let producer = operation.clone();
        let result_thread = thread::spawn(move || producer.try_set_result(7).unwrap());

        let canceler = operation.clone();
        let cancel_thread = thread::spawn(move || canceler.try_set_canceled().unwrap());

        let result_won = result_thread.join().unwrap();
        let cancel_won = cancel_thread.join().unwrap();

        assert!(result_won ^ cancel_won);
        assert!(operation.is_completed());
        if result_won {
            assert_eq!(operation.status(), OperationStatus::RanToCompletion);
            assert_eq!(operation.result(), Some(&7));
        } else {
            assert_eq!(operation.status(), OperationStatus::Canceled);
            assert!(operation.result().is_none());
        }
    });
}

/// A thread that observes completion also observes the payload. The payload
/// slots are loom cells, so a read that is not ordered after the write fails
/// the model.
#[test]
fn completion_publishes_payload() {
    loom::model(|| {
        let operation = AsyncOperation::<u32>::new();

        let producer = operation.clone();
        let writer = thread::spawn(move || {
            producer
                .try_set_exception(OperationError::msg("failed"))
                .unwrap();
        });

        if operation.is_completed() {
            assert_eq!(operation.status(), OperationStatus::Faulted);
            assert!(operation.error().is_some());
        }

        writer.join().unwrap();
        assert!(operation.error().is_some());
    });
}

/// Continuations registered concurrently with completion run exactly once.
#[test]
fn continuation_runs_once_under_race() {
    loom::model(|| {
        let operation = AsyncOperation::<()>::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let producer = operation.clone();
        let completer = thread::spawn(move || producer.try_set_completed().unwrap());

        let counter = Arc::clone(&runs);
        operation.add_continuation(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(completer.join().unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

/// Concurrent cancellation requests invoke the hook once.
#[test]
fn cancellation_hook_runs_once() {
    loom::model(|| {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let operation = AsyncOperation::<()>::builder()
            .on_cancel_requested(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();

        let other = operation.clone();
        let requester = thread::spawn(move || other.request_cancellation().unwrap());
        operation.request_cancellation().unwrap();
        requester.join().unwrap();

        assert!(operation.is_cancellation_requested());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    });
}

/// A successful result is visible to any thread that sees the status.
#[test]
fn result_is_published_with_status() {
    loom::model(|| {
        let operation = AsyncOperation::<u32>::new();

        let producer = operation.clone();
        let writer = thread::spawn(move || {
            producer.try_set_result(11).unwrap();
        });

        if operation.is_completed_successfully() {
            assert_eq!(operation.result(), Some(&11));
        }

        writer.join().unwrap();
        assert_eq!(operation.result(), Some(&11));
    });
}

/// Progress reports racing completion never surface full progress early.
#[test]
fn progress_racing_completion_stays_below_one_until_success() {
    loom::model(|| {
        let operation = AsyncOperation::<()>::new();

        let reporter = operation.clone();
        let progress = thread::spawn(move || {
            let _ = reporter.try_set_progress(1.0);
        });

        let producer = operation.clone();
        let completer = thread::spawn(move || producer.try_set_completed().unwrap());

        let observed = operation.progress();
        if observed == 1.0 {
            assert!(operation.is_completed_successfully());
        }

        progress.join().unwrap();
        assert!(completer.join().unwrap());
        assert_eq!(operation.progress(), 1.0);
    });
}
