//! Blocking wait support.
//!
//! [`WaitEvent`] is a manual-reset event: once set it stays set and releases
//! every current and future waiter. Operations create one lazily, only when a
//! consumer asks for it, and publish it with a single compare-and-swap so that
//! all threads end up sharing the same instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};

use crate::sync::{fence, Ordering};

/// Manual-reset event used for blocking waits on an operation.
#[derive(Debug, Default)]
pub struct WaitEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaitEvent {
    /// Creates an event, optionally already set.
    pub fn new(preset: bool) -> Self {
        Self {
            signaled: Mutex::new(preset),
            cond: Condvar::new(),
        }
    }

    /// Sets the event, releasing all waiters. Setting twice is harmless.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            *signaled = true;
            self.cond.notify_all();
        }
    }

    /// Returns `true` if the event has been set.
    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is set.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Blocks until the event is set or `timeout` elapses.
    ///
    /// Returns `true` if the event was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}

/// Slot holding an operation's wait event once somebody asked for it.
#[derive(Debug, Default)]
pub(crate) struct LazyWaitHandle {
    slot: ArcSwapOption<WaitEvent>,
}

impl LazyWaitHandle {
    pub(crate) fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    /// Returns the shared event, creating and publishing it if needed.
    ///
    /// `is_completed` is consulted before creation (to preset the event) and
    /// again after publication: completion may have happened between the two,
    /// in which case the completing thread found no event to set.
    ///
    /// The fence here pairs with the one in [`signal`](Self::signal): either
    /// the post-check sees completion or the completing thread sees the event.
    pub(crate) fn get_or_create(&self, is_completed: impl Fn() -> bool) -> Arc<WaitEvent> {
        if let Some(event) = self.slot.load_full() {
            return event;
        }

        let candidate = Arc::new(WaitEvent::new(is_completed()));
        let previous = self
            .slot
            .compare_and_swap(&None::<Arc<WaitEvent>>, Some(Arc::clone(&candidate)));
        let event = match &*previous {
            Some(winner) => Arc::clone(winner),
            None => candidate,
        };

        fence(Ordering::SeqCst);
        if is_completed() {
            event.set();
        }
        event
    }

    /// Sets the event if one has been created.
    ///
    /// Called after completion is published.
    pub(crate) fn signal(&self) {
        fence(Ordering::SeqCst);
        if let Some(event) = self.slot.load_full() {
            event.set();
        }
    }

    /// Drops the slot's reference to the event. Returns `true` if one existed.
    pub(crate) fn release(&self) -> bool {
        self.slot.swap(None).is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_created(&self) -> bool {
        self.slot.load().is_some()
    }
}
