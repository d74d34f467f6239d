//! Continuation ordering, context marshaling and failure isolation.

use parking_lot::Mutex;
use safer_promise::context::{self, DispatchContext, LoopContext};
use safer_promise::{AsyncOperation, CreationOptions, OperationError, TokioContext};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) + Clone) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |entry| sink.lock().push(entry))
}

#[test]
fn continuations_run_in_registration_order() {
    let operation = AsyncOperation::<u8>::new();
    let (log, record) = recorder();

    for name in ["first", "second", "third"] {
        let record = record.clone();
        operation.add_continuation(move |_| record(name));
    }
    operation.try_set_result(1).unwrap();

    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
}

#[test]
fn late_registration_runs_immediately() {
    let operation = AsyncOperation::<u8>::from_error(OperationError::msg("gone"));
    let (log, record) = recorder();

    operation.add_continuation(move |op| {
        assert!(op.is_faulted());
        record("late");
    });

    assert_eq!(*log.lock(), vec!["late"]);
}

#[test]
fn removed_continuation_does_not_run() {
    let operation = AsyncOperation::<()>::new();
    let (log, record) = recorder();

    let keep = record.clone();
    let removed = operation.add_continuation(move |_| record("removed"));
    operation.add_continuation(move |_| keep("kept"));

    assert!(operation.remove_continuation(removed));
    assert!(!operation.remove_continuation(removed));
    operation.try_set_completed().unwrap();

    assert_eq!(*log.lock(), vec!["kept"]);
}

#[test]
fn panicking_continuation_is_isolated() {
    let operation = AsyncOperation::<()>::new();
    let (log, record) = recorder();

    operation.add_continuation(|_| panic!("continuation failure"));
    operation.add_continuation(move |_| record("after panic"));

    assert!(operation.try_set_completed().unwrap());
    assert!(operation.is_completed_successfully());
    assert_eq!(*log.lock(), vec!["after panic"]);
}

#[test]
fn captured_loop_context_receives_continuation() {
    let ui = LoopContext::new();
    let operation = AsyncOperation::<u32>::new();
    let (log, record) = recorder();

    {
        let _guard = context::enter(Arc::clone(&ui) as Arc<dyn DispatchContext>);
        operation.add_continuation_captured(move |_| record("on loop"));
    }

    let producer = operation.clone();
    thread::spawn(move || producer.try_set_result(5).unwrap())
        .join()
        .unwrap();

    assert!(log.lock().is_empty());
    assert_eq!(ui.pending(), 1);
    assert_eq!(ui.run_pending(), 1);
    assert_eq!(*log.lock(), vec!["on loop"]);
}

#[test]
fn completing_on_current_context_runs_inline() {
    let ui = LoopContext::new();
    let operation = AsyncOperation::<u32>::new();
    let (log, record) = recorder();
    operation.add_continuation_on(move |_| record("inline"), ui.clone());

    let producer = operation.clone();
    ui.post(Box::new(move || {
        producer.try_set_result(1).unwrap();
    }));
    ui.run_pending();

    assert_eq!(*log.lock(), vec!["inline"]);
    assert_eq!(ui.pending(), 0);
}

#[test]
fn forced_async_continuation_is_posted_even_when_current() {
    let ui = LoopContext::new();
    let operation =
        AsyncOperation::<u32>::with_options(CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY);
    let (log, record) = recorder();
    operation.add_continuation_on(move |_| record("posted"), ui.clone());

    let producer = operation.clone();
    ui.post(Box::new(move || {
        producer.try_set_result(1).unwrap();
    }));
    ui.run_pending();

    assert!(log.lock().is_empty());
    assert_eq!(ui.run_pending(), 1);
    assert_eq!(*log.lock(), vec!["posted"]);
}

#[test]
fn forced_async_without_context_leaves_completing_thread() {
    let operation =
        AsyncOperation::<()>::with_options(CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY);
    let (sender, receiver) = mpsc::channel();
    let completing_thread = thread::current().id();

    operation.add_continuation(move |_| {
        let _ = sender.send(thread::current().id());
    });
    operation.try_set_completed().unwrap();

    let ran_on = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_ne!(ran_on, completing_thread);
}

#[test]
fn progress_callbacks_see_updates_and_final_value() {
    let operation = AsyncOperation::<()>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    operation.add_progress_callback(move |_, progress| sink.lock().push(progress));

    operation.try_set_progress(0.25).unwrap();
    operation.try_set_progress(0.1).unwrap();
    operation.try_set_progress(0.75).unwrap();
    operation.try_set_completed().unwrap();
    operation.report_progress();

    assert_eq!(*seen.lock(), vec![0.25, 0.75, 1.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_context_runs_continuation_on_runtime() {
    let runtime = TokioContext::try_current().unwrap();
    let operation = AsyncOperation::<u8>::new();
    let (sender, receiver) = tokio::sync::oneshot::channel();

    operation.add_continuation_on(
        move |op| {
            let on_runtime = tokio::runtime::Handle::try_current().is_ok();
            let _ = sender.send((op.result().copied(), on_runtime));
        },
        Arc::new(runtime),
    );

    let producer = operation.clone();
    thread::spawn(move || producer.try_set_result(3).unwrap())
        .join()
        .unwrap();

    let (result, on_runtime) = receiver.await.unwrap();
    assert_eq!(result, Some(3));
    assert!(on_runtime);
}

#[tokio::test]
async fn forced_async_prefers_current_runtime() {
    let operation =
        AsyncOperation::<()>::with_options(CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY);
    let (sender, receiver) = tokio::sync::oneshot::channel();

    operation.add_continuation(move |_| {
        let _ = sender.send(tokio::runtime::Handle::try_current().is_ok());
    });
    operation.try_set_completed().unwrap();

    assert!(receiver.await.unwrap());
}
