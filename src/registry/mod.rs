//! Continuation registration and dispatch.
//!
//! Each operation owns two registries: one for completion continuations, which
//! is drained exactly once, and one for progress callbacks, which is read on
//! every progress report. Both are ordered, thread-safe and lock-free.
//!
//! # Serialization with completion
//!
//! A registry is either open or sealed. Its head is an [`ArcSwap`] holding an
//! immutable list; registration and removal replace the list with a
//! compare-and-swap, and sealing swaps in the sealed sentinel.
//!
//! The completion winner seals both registries while it holds the completion
//! reservation, before the terminal status is published. A registration
//! therefore either lands in the list before the seal (and is drained) or finds
//! the registry sealed (and the caller dispatches the callback itself once the
//! status is published). No callback is queued once completion is observable,
//! none is both registered and skipped, and none runs twice.
//!
//! Removal and draining race through a per-registration claim flag: whichever
//! flips it first owns the callback.
//!
//! # Dispatch
//!
//! [`dispatch`] decides where a callback runs: inline on the calling thread,
//! or posted to a [`DispatchContext`]. Every callback is isolated; a panic is
//! caught and logged so the remaining callbacks still run.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::{self, DispatchContext, Task};
use crate::sync::{AtomicBool, AtomicU64, Ordering};


/// Identifies a registered callback so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationId(u64);

impl ContinuationId {
    /// Identifier handed out for callbacks that were invoked immediately
    /// because the operation had already completed.
    pub(crate) const IMMEDIATE: ContinuationId = ContinuationId(0);

    /// Returns the raw identifier value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A registered callback together with the context it should run on.
pub(crate) struct Registration<C> {
    id: ContinuationId,
    claimed: AtomicBool,
    callback: C,
    context: Option<Arc<dyn DispatchContext>>,
}

impl<C> Registration<C> {
    pub(crate) fn callback(&self) -> &C {
        &self.callback
    }

    pub(crate) fn context(&self) -> Option<&Arc<dyn DispatchContext>> {
        self.context.as_ref()
    }

    /// Takes ownership of the registration. Only the first caller wins.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

enum Head<C> {
    Open(Vec<Arc<Registration<C>>>),
    Sealed,
}

/// Ordered, sealable set of callbacks.
pub(crate) struct CallbackRegistry<C> {
    head: ArcSwap<Head<C>>,
    /// Next identifier to hand out; 0 is reserved for immediate invocations.
    next_id: AtomicU64,
}

impl<C> CallbackRegistry<C> {
    /// Create a new, open registry.
    pub(crate) fn new() -> Self {
        Self {
            head: ArcSwap::from_pointee(Head::Open(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a callback.
    ///
    /// Returns the registration back if the registry is sealed; the caller
    /// must then dispatch it itself.
    pub(crate) fn try_add(
        &self,
        callback: C,
        context: Option<Arc<dyn DispatchContext>>,
    ) -> std::result::Result<ContinuationId, Arc<Registration<C>>> {
        let id = self.allocate_id();
        let registration = Arc::new(Registration {
            id,
            claimed: AtomicBool::new(false),
            callback,
            context,
        });

        let mut current = self.head.load_full();
        loop {
            let next = match &*current {
                Head::Open(list) => {
                    let mut next = Vec::with_capacity(list.len() + 1);
                    next.extend(list.iter().filter(|r| !r.is_claimed()).cloned());
                    next.push(Arc::clone(&registration));
                    next
                }
                Head::Sealed => return Err(registration),
            };

            let previous = self.head.compare_and_swap(&current, Arc::new(Head::Open(next)));
            if Arc::ptr_eq(&*previous, &current) {
                return Ok(id);
            }
            current = arc_swap::Guard::into_inner(previous);
        }
    }

    /// Removes a callback that has not run yet.
    ///
    /// Returns `true` if the callback was found and will not run.
    pub(crate) fn remove(&self, id: ContinuationId) -> bool {
        if id == ContinuationId::IMMEDIATE {
            return false;
        }

        let head = self.head.load();
        let Head::Open(list) = &**head else {
            return false;
        };
        let Some(registration) = list.iter().find(|r| r.id == id) else {
            return false;
        };
        if !registration.claim() {
            return false;
        }
        drop(head);

        self.prune();
        true
    }

    /// Drops claimed registrations from the list. Best effort: losing a race
    /// to another writer is fine, since that writer filters them too.
    fn prune(&self) {
        let current = self.head.load_full();
        if let Head::Open(list) = &*current {
            let next: Vec<_> = list.iter().filter(|r| !r.is_claimed()).cloned().collect();
            if next.len() != list.len() {
                let _ = self.head.compare_and_swap(&current, Arc::new(Head::Open(next)));
            }
        }
    }

    /// Seals the registry and returns its live registrations in registration
    /// order, each claimed for the caller.
    ///
    /// Only the first call returns registrations; later calls return an empty
    /// list.
    pub(crate) fn seal(&self) -> Vec<Arc<Registration<C>>> {
        match &*self.head.swap(Arc::new(Head::Sealed)) {
            Head::Open(list) => list.iter().filter(|r| r.claim()).cloned().collect(),
            Head::Sealed => Vec::new(),
        }
    }

    /// Returns the live registrations without removing them.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Registration<C>>> {
        match &**self.head.load() {
            Head::Open(list) => list.iter().filter(|r| !r.is_claimed()).cloned().collect(),
            Head::Sealed => Vec::new(),
        }
    }

    fn allocate_id(&self) -> ContinuationId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != ContinuationId::IMMEDIATE.0 {
                return ContinuationId(id);
            }
        }
    }

    /// Returns `true` once [`seal`](Self::seal) has been called.
    #[cfg(test)]
    pub(crate) fn is_sealed(&self) -> bool {
        matches!(**self.head.load(), Head::Sealed)
    }

    /// Number of live registrations.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }
}

impl<C> Default for CallbackRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CallbackRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.head.load();
        let (sealed, len) = match &**head {
            Head::Open(list) => (false, list.iter().filter(|r| !r.is_claimed()).count()),
            Head::Sealed => (true, 0),
        };
        f.debug_struct("CallbackRegistry")
            .field("sealed", &sealed)
            .field("len", &len)
            .finish()
    }
}

/// Runs `task` where its registration asked for.
///
/// - Captured context that is current and `force_async` unset: inline.
/// - Captured context otherwise: posted to it.
/// - No context and `force_async` set: posted to the default async context.
/// - No context: inline.
pub(crate) fn dispatch(
    context: Option<&Arc<dyn DispatchContext>>,
    force_async: bool,
    task: Task,
) {
    match context {
        Some(context) if !force_async && context.is_current() => run_isolated(task),
        Some(context) => context.post(Box::new(move || run_isolated(task))),
        None if force_async => {
            context::default_async_context().post(Box::new(move || run_isolated(task)))
        }
        None => run_isolated(task),
    }
}

/// Runs a callback, containing any panic it raises.
fn run_isolated(task: Task) {
    isolated("continuation", task);
}

/// Runs `f`, containing any panic it raises.
///
/// Returns `None` if `f` panicked; the panic is logged under `label`.
pub(crate) fn isolated<R>(label: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                callback = label,
                panic = %panic_message(payload.as_ref()),
                "callback panicked"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
