//! Synchronization primitives used by the completion path.
//!
//! Under `--cfg loom` these resolve to loom's model-checked versions so the
//! state word protocol, the payload slots and the callback registries can be
//! explored exhaustively.

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread::yield_now;

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};
#[cfg(not(loom))]
pub(crate) use std::thread::yield_now;

/// Busy-wait hint.
#[inline]
pub(crate) fn spin_loop() {
    #[cfg(loom)]
    loom::hint::spin_loop();
    #[cfg(not(loom))]
    std::hint::spin_loop();
}

/// `std` cell with loom's closure-based access API.
#[cfg(not(loom))]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) fn new(data: T) -> Self {
        Self(std::cell::UnsafeCell::new(data))
    }

    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    #[inline]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

/// A value that can be moved out exactly once, from any thread.
pub(crate) struct TakeCell<T> {
    taken: AtomicBool,
    value: UnsafeCell<Option<T>>,
}

impl<T> TakeCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            taken: AtomicBool::new(false),
            value: UnsafeCell::new(Some(value)),
        }
    }

    /// Moves the value out. Every call after the first returns `None`.
    pub(crate) fn take(&self) -> Option<T> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: only the caller that flipped `taken` reaches this point, and
        // nothing else touches `value`.
        self.value.with_mut(|slot| unsafe { (*slot).take() })
    }
}

// SAFETY: the value is only reached through `take`, which hands it to a single
// caller, so sharing the cell only ever moves `T` between threads.
unsafe impl<T: Send> Sync for TakeCell<T> {}
