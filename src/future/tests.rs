//! Tests for the future adapter.

use super::*;
use crate::error::{OperationError, PromiseError};
use crate::operation::AsyncOperation;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

struct CountingWaker(AtomicUsize);

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_waker() -> (Waker, Arc<CountingWaker>) {
    let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
    (Waker::from(Arc::clone(&counter)), counter)
}

fn poll_once<F: Future + Unpin>(future: &mut F, waker: &Waker) -> Poll<F::Output> {
    let mut cx = Context::from_waker(waker);
    Pin::new(future).poll(&mut cx)
}

mod manual_polling {
    use super::*;

    #[test]
    fn completed_operation_is_ready() {
        let (waker, _) = counting_waker();
        let mut future = AsyncOperation::from_result(9).into_future();
        assert!(matches!(poll_once(&mut future, &waker), Poll::Ready(Ok(9))));
    }

    #[test]
    fn pending_until_completed() {
        let operation = AsyncOperation::<u8>::new();
        let (waker, counter) = counting_waker();
        let mut future = OperationFuture::new(operation.clone());

        assert!(poll_once(&mut future, &waker).is_pending());
        assert!(poll_once(&mut future, &waker).is_pending());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        operation.try_set_result(3).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(matches!(poll_once(&mut future, &waker), Poll::Ready(Ok(3))));
    }

    #[test]
    fn continuation_registered_once() {
        let operation = AsyncOperation::<u8>::new();
        let (waker, _) = counting_waker();
        let mut future = OperationFuture::new(operation.clone());

        for _ in 0..3 {
            assert!(poll_once(&mut future, &waker).is_pending());
        }
        assert_eq!(operation.inner.continuations.len(), 1);
    }

    #[test]
    fn latest_waker_is_woken() {
        let operation = AsyncOperation::<u8>::new();
        let (first, first_counter) = counting_waker();
        let (second, second_counter) = counting_waker();
        let mut future = OperationFuture::new(operation.clone());

        assert!(poll_once(&mut future, &first).is_pending());
        assert!(poll_once(&mut future, &second).is_pending());
        operation.try_set_result(1).unwrap();

        assert_eq!(first_counter.0.load(Ordering::SeqCst), 0);
        assert_eq!(second_counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_removes_continuation() {
        let operation = AsyncOperation::<u8>::new();
        let (waker, counter) = counting_waker();
        let mut future = OperationFuture::new(operation.clone());

        assert!(poll_once(&mut future, &waker).is_pending());
        drop(future);
        assert_eq!(operation.inner.continuations.len(), 0);

        operation.try_set_result(1).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        assert!(!operation.is_cancellation_requested());
    }

    #[test]
    fn fault_and_cancellation_are_raised() {
        let (waker, _) = counting_waker();

        let faulted = AsyncOperation::<u8>::from_error(OperationError::msg("bad"));
        match poll_once(&mut faulted.into_future(), &waker) {
            Poll::Ready(Err(PromiseError::Faulted(error))) => assert_eq!(error.to_string(), "bad"),
            other => panic!("unexpected {other:?}"),
        }

        let canceled = AsyncOperation::<u8>::canceled();
        assert!(matches!(
            poll_once(&mut canceled.into_future(), &waker),
            Poll::Ready(Err(PromiseError::Canceled(_)))
        ));
    }

    #[test]
    fn untyped_operation_resolves_to_unit() {
        let (waker, _) = counting_waker();
        let mut future = (&AsyncOperation::completed()).into_future();
        assert!(matches!(poll_once(&mut future, &waker), Poll::Ready(Ok(()))));
    }
}

mod runtime {
    use super::*;

    #[tokio::test]
    async fn await_completion_from_thread() {
        let operation = AsyncOperation::<String>::new();
        let producer = operation.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.try_set_result("ready".to_string()).unwrap();
        });

        assert_eq!(operation.await.unwrap(), "ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn await_many_from_tasks() {
        let operations: Vec<AsyncOperation<usize>> =
            (0..16).map(|_| AsyncOperation::new()).collect();

        let waiters: Vec<_> = operations
            .iter()
            .cloned()
            .map(|operation| tokio::spawn(async move { operation.await }))
            .collect();

        for (index, operation) in operations.iter().enumerate() {
            operation.try_set_result(index).unwrap();
        }

        for (index, waiter) in waiters.into_iter().enumerate() {
            assert_eq!(waiter.await.unwrap().unwrap(), index);
        }
    }

    #[tokio::test]
    async fn timeout_leaves_operation_pending() {
        let operation = AsyncOperation::<u8>::new();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), operation.clone().into_future()).await;

        assert!(timed_out.is_err());
        assert!(!operation.is_completed());
        assert_eq!(operation.inner.continuations.len(), 0);
    }
}
