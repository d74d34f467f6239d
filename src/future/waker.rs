//! Single-slot waker storage shared between a future and its continuation.

use parking_lot::Mutex;
use std::task::Waker;

/// Holds the waker of the task currently awaiting an operation.
///
/// An [`OperationFuture`](super::OperationFuture) is polled from one task at a
/// time, so a single slot is enough. The slot is shared with the continuation
/// registered on the operation, which takes and wakes the waker on completion.
#[derive(Debug, Default)]
pub(crate) struct WakerSlot {
    waker: Mutex<Option<Waker>>,
}

impl WakerSlot {
    pub(crate) fn new() -> Self {
        Self {
            waker: Mutex::new(None),
        }
    }

    /// Stores `waker`, replacing the previous one unless both wake the same
    /// task.
    pub(crate) fn register(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// Wakes and clears the stored waker.
    ///
    /// Returns `true` if a waker was present.
    pub(crate) fn wake(&self) -> bool {
        // Wake outside the lock; the woken task may poll immediately.
        let waker = self.waker.lock().take();
        match waker {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        }
    }

    /// Drops the stored waker without waking it.
    pub(crate) fn clear(&self) -> bool {
        self.waker.lock().take().is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self) -> bool {
        self.waker.lock().is_some()
    }
}
