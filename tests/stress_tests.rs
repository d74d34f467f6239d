//! Stress tests for racing producers, waiters and continuations.

use parking_lot::Mutex;
use safer_promise::{AsyncOperation, OperationError, OperationStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Many threads race every kind of completion; exactly one wins each round.
#[test]
fn stress_test_racing_completions() {
    const ROUNDS: usize = 500;
    const THREADS: usize = 8;

    for round in 0..ROUNDS {
        let operation = AsyncOperation::<usize>::new();
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|index| {
                let operation = operation.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    match index % 3 {
                        0 => operation.try_set_result(index).unwrap(),
                        1 => operation
                            .try_set_exception(OperationError::msg(format!("thread {index}")))
                            .unwrap(),
                        _ => operation.try_set_canceled().unwrap(),
                    }
                })
            })
            .collect();

        let wins: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            wins.iter().filter(|won| **won).count(),
            1,
            "round {round} had {wins:?}"
        );

        let winner = wins.iter().position(|won| *won).unwrap();
        let expected = match winner % 3 {
            0 => OperationStatus::RanToCompletion,
            1 => OperationStatus::Faulted,
            _ => OperationStatus::Canceled,
        };
        assert_eq!(operation.status(), expected);
        if expected == OperationStatus::RanToCompletion {
            assert_eq!(operation.result(), Some(&winner));
        }
    }
}

/// Continuations registered while completion is in flight each run once.
#[test]
fn stress_test_concurrent_registration() {
    const ROUNDS: usize = 200;
    const REGISTRARS: usize = 4;
    const PER_THREAD: usize = 25;

    for _ in 0..ROUNDS {
        let operation = AsyncOperation::<()>::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(REGISTRARS + 1));

        let registrars: Vec<_> = (0..REGISTRARS)
            .map(|_| {
                let operation = operation.clone();
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        let runs = Arc::clone(&runs);
                        operation.add_continuation(move |_| {
                            runs.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        barrier.wait();
        operation.try_set_completed().unwrap();
        for registrar in registrars {
            registrar.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), REGISTRARS * PER_THREAD);
    }
}

/// Blocking waiters on many threads are all released by one completion.
#[test]
fn stress_test_blocking_waiters() {
    const WAITERS: usize = 16;

    let operation = AsyncOperation::<String>::new();
    let waiters: Vec<_> = (0..WAITERS)
        .map(|_| {
            let operation = operation.clone();
            thread::spawn(move || operation.join().unwrap())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    operation.try_set_result("done".to_string()).unwrap();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), "done");
    }
}

/// Progress reports from several threads only ever increase.
#[test]
fn stress_test_monotonic_progress() {
    const THREADS: usize = 4;
    const STEPS: usize = 250;

    let operation = AsyncOperation::<()>::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    operation.add_progress_callback(move |op, _| sink.lock().push(op.stored_progress()));

    let reporters: Vec<_> = (0..THREADS)
        .map(|offset| {
            let operation = operation.clone();
            thread::spawn(move || {
                for step in 0..STEPS {
                    let value = (step * THREADS + offset) as f32 / (STEPS * THREADS) as f32;
                    operation.try_set_progress(value).unwrap();
                }
            })
        })
        .collect();
    for reporter in reporters {
        reporter.join().unwrap();
    }

    let expected = ((STEPS - 1) * THREADS + THREADS - 1) as f32 / (STEPS * THREADS) as f32;
    assert_eq!(operation.stored_progress(), expected);
    assert!(!observed.lock().is_empty());
}

/// Awaiting thousands of operations completed from plain threads.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_test_await_high_frequency() {
    const OPERATIONS: usize = 2_000;
    const PRODUCERS: usize = 4;

    let operations: Vec<AsyncOperation<usize>> =
        (0..OPERATIONS).map(|_| AsyncOperation::new()).collect();
    let start_time = Instant::now();

    let waiters: Vec<_> = operations
        .iter()
        .cloned()
        .map(|operation| tokio::spawn(async move { operation.await }))
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let operations = operations.clone();
            thread::spawn(move || {
                for (index, operation) in operations.iter().enumerate() {
                    if index % PRODUCERS == producer {
                        operation.try_set_result(index).unwrap();
                    }
                }
            })
        })
        .collect();

    let results = timeout(Duration::from_secs(30), futures::future::join_all(waiters))
        .await
        .expect("awaiting operations timed out");
    for producer in producers {
        producer.join().unwrap();
    }

    let total: usize = results.into_iter().map(|r| r.unwrap().unwrap()).sum();
    assert_eq!(total, (0..OPERATIONS).sum::<usize>());

    let elapsed = start_time.elapsed();
    println!("Awaited {OPERATIONS} operations in {elapsed:?}");
}
