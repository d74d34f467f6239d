//! Dispatch contexts for continuations.
//!
//! A [`DispatchContext`] is somewhere a callback can be posted to run later: an
//! event loop, a tokio runtime, or a freshly spawned thread. Continuations may
//! capture the context that was current when they were registered and are then
//! delivered back to it.
//!
//! The "current" context is tracked per thread. Code that drives a context
//! marks itself current with [`enter`] for the duration of a drain.
//!
//! # Example
//!
//! ```rust
//! use safer_promise::context::{self, DispatchContext, LoopContext};
//!
//! let ui = LoopContext::new();
//! ui.post(Box::new(|| println!("runs on the loop")));
//! assert_eq!(ui.pending(), 1);
//! assert_eq!(ui.run_pending(), 1);
//! # let _ = context::current();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// A unit of work posted to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere a continuation can be scheduled.
pub trait DispatchContext: Send + Sync {
    /// Schedules `task` to run on this context.
    fn post(&self, task: Task);

    /// Returns `true` if the calling thread is currently running this context.
    fn is_current(&self) -> bool;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn DispatchContext>>> = const { RefCell::new(None) };
}

/// Returns the context the calling thread is running, if any.
pub fn current() -> Option<Arc<dyn DispatchContext>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Marks `context` as current on this thread until the guard is dropped.
///
/// Guards nest; dropping one restores whatever was current before it.
pub fn enter(context: Arc<dyn DispatchContext>) -> ContextGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
    ContextGuard {
        previous,
        _not_send: std::marker::PhantomData,
    }
}

/// Restores the previous current context on drop.
#[must_use = "the context is only current while the guard is alive"]
pub struct ContextGuard {
    previous: Option<Arc<dyn DispatchContext>>,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("restores_context", &self.previous.is_some())
            .finish()
    }
}

/// A single-threaded event loop drained explicitly by its owner.
///
/// Tasks are queued by [`post`](DispatchContext::post) from any thread and run
/// on whichever thread calls [`run_pending`](Self::run_pending).
#[derive(Default)]
pub struct LoopContext {
    queue: Mutex<VecDeque<Task>>,
}

impl LoopContext {
    /// Create an empty loop.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs every task that was queued when the call began.
    ///
    /// The loop is current on the calling thread while the tasks run. Tasks
    /// posted during the drain wait for the next call.
    ///
    /// # Returns
    ///
    /// The number of tasks that were run.
    pub fn run_pending(self: &Arc<Self>) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock());
        if batch.is_empty() {
            return 0;
        }

        let _guard = enter(Arc::clone(self) as Arc<dyn DispatchContext>);
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl DispatchContext for LoopContext {
    fn post(&self, task: Task) {
        self.queue.lock().push_back(task);
    }

    fn is_current(&self) -> bool {
        CURRENT.with(|current| {
            current.borrow().as_ref().is_some_and(|active| {
                std::ptr::eq(Arc::as_ptr(active) as *const (), self as *const Self as *const ())
            })
        })
    }
}

impl fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs each task on a new OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadContext;

impl DispatchContext for ThreadContext {
    fn post(&self, task: Task) {
        // spawn consumes the closure even when it fails
        let slot = Arc::new(Mutex::new(Some(task)));
        let spawned = {
            let slot = Arc::clone(&slot);
            std::thread::Builder::new()
                .name("safer-promise-continuation".to_string())
                .spawn(move || {
                    if let Some(task) = slot.lock().take() {
                        task();
                    }
                })
        };

        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn continuation thread, running inline");
            let task = slot.lock().take();
            if let Some(task) = task {
                task();
            }
        }
    }

    fn is_current(&self) -> bool {
        false
    }
}

#[cfg(feature = "tokio")]
mod tokio_context {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static ACTIVE: Cell<u64> = const { Cell::new(0) };
    }

    struct ActiveGuard(u64);

    impl ActiveGuard {
        fn enter(id: u64) -> Self {
            Self(ACTIVE.with(|active| active.replace(id)))
        }
    }

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            ACTIVE.with(|active| active.set(self.0));
        }
    }

    /// Posts tasks onto a tokio runtime.
    #[derive(Debug, Clone)]
    pub struct TokioContext {
        handle: tokio::runtime::Handle,
        id: u64,
    }

    impl TokioContext {
        /// Wraps a runtime handle.
        pub fn new(handle: tokio::runtime::Handle) -> Self {
            Self {
                handle,
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            }
        }

        /// Wraps the runtime the caller is running on, if any.
        pub fn try_current() -> Option<Self> {
            tokio::runtime::Handle::try_current().ok().map(Self::new)
        }

        /// The wrapped runtime handle.
        pub fn handle(&self) -> &tokio::runtime::Handle {
            &self.handle
        }
    }

    impl DispatchContext for TokioContext {
        fn post(&self, task: Task) {
            let id = self.id;
            self.handle.spawn(async move {
                let _active = ActiveGuard::enter(id);
                task();
            });
        }

        fn is_current(&self) -> bool {
            ACTIVE.with(|active| active.get() == self.id)
        }
    }
}

#[cfg(feature = "tokio")]
pub use tokio_context::TokioContext;

static DEFAULT_ASYNC: RwLock<Option<Arc<dyn DispatchContext>>> = parking_lot::const_rwlock(None);

/// Overrides the context used for continuations that must run asynchronously
/// but captured no context of their own.
///
/// Passing `None` restores the built-in choice.
pub fn set_default_async_context(context: Option<Arc<dyn DispatchContext>>) {
    *DEFAULT_ASYNC.write() = context;
}

/// The context used for forced-asynchronous continuations without a captured
/// context.
///
/// Resolution order: the override installed with
/// [`set_default_async_context`], then the tokio runtime the caller is on (with
/// the `tokio` feature), then [`ThreadContext`].
pub fn default_async_context() -> Arc<dyn DispatchContext> {
    if let Some(context) = DEFAULT_ASYNC.read().as_ref() {
        return Arc::clone(context);
    }

    #[cfg(feature = "tokio")]
    if let Some(context) = TokioContext::try_current() {
        return Arc::new(context);
    }

    Arc::new(ThreadContext)
}
