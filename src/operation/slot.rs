//! Write-once storage for the result and error payloads.

use crate::sync::UnsafeCell;

/// Holds a payload written once by the completion winner.
///
/// The state word orders every access: the single write happens between
/// reservation and publish, and reads only happen after the completed flag
/// has been observed with `Acquire`.
pub(crate) struct PayloadSlot<T> {
    value: UnsafeCell<Option<T>>,
}

impl<T> PayloadSlot<T> {
    pub(crate) fn empty() -> Self {
        Self {
            value: UnsafeCell::new(None),
        }
    }

    /// A slot that is populated before the owning operation is shared.
    pub(crate) fn filled(value: T) -> Self {
        Self {
            value: UnsafeCell::new(Some(value)),
        }
    }

    /// Stores the payload.
    ///
    /// # Safety
    ///
    /// The caller must hold the operation's completion reservation, and the
    /// terminal status must not be published yet.
    pub(crate) unsafe fn write(&self, value: T) {
        // SAFETY: the reservation excludes other writers, and readers wait for
        // the publish that follows this write.
        self.value.with_mut(|slot| unsafe { *slot = Some(value) });
    }

    /// Borrows the payload.
    ///
    /// # Safety
    ///
    /// The caller must have observed the completed flag with `Acquire`
    /// ordering, or own the only handle to a slot built with
    /// [`filled`](Self::filled).
    pub(crate) unsafe fn get(&self) -> Option<&T> {
        // SAFETY: no write can follow a published completion.
        self.value.with(|slot| unsafe { (*slot).as_ref() })
    }
}

// SAFETY: after the single write, the payload is only shared by reference.
unsafe impl<T: Send + Sync> Sync for PayloadSlot<T> {}
