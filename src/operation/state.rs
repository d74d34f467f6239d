//! Packed status/flags word and the completion reservation protocol.
//!
//! Every observable property of an operation's lifecycle lives in one `u32`
//! so that transitions are single compare-and-swap steps:
//!
//! ```text
//!  31  30..28   27..25   24   23   22   21   20   19..4    3..0
//! ┌───┬────────┬───────┬────┬────┬────┬────┬────┬───────┬────────┐
//! │ 0 │options │   0   │ D  │ CR │ S  │ C  │ R  │   0   │ status │
//! └───┴────────┴───────┴────┴────┴────┴────┴────┴───────┴────────┘
//!  D  = disposed              C = completed
//!  CR = cancellation requested R = completion reserved
//!  S  = completed synchronously
//! ```
//!
//! Completion is two-phase. [`StateWord::try_reserve`] sets `R` for exactly one
//! caller and hands it a [`CompletionReservation`]; the holder writes the
//! payload and then calls [`CompletionReservation::publish`], which installs
//! the terminal status together with `C` using release ordering. Readers that
//! observe `C` with acquire ordering therefore always see the payload.

use crate::error::{PromiseError, Result};
use crate::operation::types::{CreationOptions, OperationStatus};
use crate::sync::{spin_loop, yield_now, AtomicU32, Ordering};

const STATUS_MASK: u32 = 0x0000_000f;
const FLAG_COMPLETION_RESERVED: u32 = 1 << 20;
const FLAG_COMPLETED: u32 = 1 << 21;
const FLAG_SYNCHRONOUS: u32 = 1 << 22;
const FLAG_CANCELLATION_REQUESTED: u32 = 1 << 23;
const FLAG_DISPOSED: u32 = 1 << 24;
const OPTIONS_SHIFT: u32 = 28;
const OPTIONS_MASK: u32 = 0x7 << OPTIONS_SHIFT;

/// Immutable view of a state word value.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateSnapshot(u32);

impl StateSnapshot {
    #[inline]
    pub(crate) fn status(self) -> OperationStatus {
        OperationStatus::from_bits(self.0 & STATUS_MASK)
    }

    #[inline]
    pub(crate) fn is_completed(self) -> bool {
        self.0 & FLAG_COMPLETED != 0
    }

    /// Completion has begun (reserved) or finished.
    #[inline]
    pub(crate) fn is_completing(self) -> bool {
        self.0 & (FLAG_COMPLETION_RESERVED | FLAG_COMPLETED) != 0
    }

    #[inline]
    pub(crate) fn completed_synchronously(self) -> bool {
        self.0 & FLAG_SYNCHRONOUS != 0
    }

    #[inline]
    pub(crate) fn is_cancellation_requested(self) -> bool {
        self.0 & FLAG_CANCELLATION_REQUESTED != 0
    }

    #[inline]
    pub(crate) fn is_disposed(self) -> bool {
        self.0 & FLAG_DISPOSED != 0
    }

    #[inline]
    pub(crate) fn options(self) -> CreationOptions {
        CreationOptions::from_bits_truncate(((self.0 & OPTIONS_MASK) >> OPTIONS_SHIFT) as u8)
    }
}

impl std::fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("status", &self.status())
            .field("completing", &self.is_completing())
            .field("completed", &self.is_completed())
            .field("synchronous", &self.completed_synchronously())
            .field("cancellation_requested", &self.is_cancellation_requested())
            .field("disposed", &self.is_disposed())
            .field("options", &self.options())
            .finish()
    }
}

/// The atomic state word of one operation.
#[derive(Debug)]
pub(crate) struct StateWord(AtomicU32);

impl StateWord {
    /// Creates a word in a non-terminal status.
    pub(crate) fn new(status: OperationStatus, options: CreationOptions) -> Self {
        debug_assert!(!status.is_terminal());
        Self(AtomicU32::new(status.bits() | encode_options(options)))
    }

    /// Creates a word that is already completed synchronously.
    ///
    /// Used by the pre-completed constructors, whose payload slots are filled
    /// at construction.
    pub(crate) fn new_completed(status: OperationStatus, options: CreationOptions) -> Self {
        debug_assert!(status.is_terminal());
        Self(AtomicU32::new(
            status.bits()
                | FLAG_COMPLETION_RESERVED
                | FLAG_COMPLETED
                | FLAG_SYNCHRONOUS
                | encode_options(options),
        ))
    }

    #[inline]
    pub(crate) fn load(&self) -> StateSnapshot {
        StateSnapshot(self.0.load(Ordering::Acquire))
    }

    /// Moves the status forward to `target`.
    ///
    /// Returns `Ok(false)` if the status is already at or past `target` or if
    /// completion has begun.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] if the operation was disposed.
    pub(crate) fn try_advance(&self, target: OperationStatus) -> Result<bool> {
        debug_assert!(!target.is_terminal());
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current & FLAG_DISPOSED != 0 {
                return Err(PromiseError::ObjectDisposed);
            }
            if current & (FLAG_COMPLETION_RESERVED | FLAG_COMPLETED) != 0
                || (current & STATUS_MASK) >= target.bits()
            {
                return Ok(false);
            }

            let next = (current & !STATUS_MASK) | target.bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(true),
                Err(actual) => current = actual,
            }
        }
    }

    /// Claims the right to complete the operation.
    ///
    /// At most one caller across all threads ever receives a reservation.
    pub(crate) fn try_reserve(&self) -> Option<CompletionReservation<'_>> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current & (FLAG_COMPLETION_RESERVED | FLAG_COMPLETED) != 0 {
                return None;
            }

            match self.0.compare_exchange_weak(
                current,
                current | FLAG_COMPLETION_RESERVED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(CompletionReservation { word: self }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Sets the cancellation-requested flag once.
    ///
    /// Fails if the flag is already set or the operation has completed.
    pub(crate) fn try_request_cancellation(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current & (FLAG_CANCELLATION_REQUESTED | FLAG_COMPLETED) != 0 {
                return false;
            }

            match self.0.compare_exchange_weak(
                current,
                current | FLAG_CANCELLATION_REQUESTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Sets the disposed flag, returning the previous snapshot.
    pub(crate) fn mark_disposed(&self) -> StateSnapshot {
        StateSnapshot(self.0.fetch_or(FLAG_DISPOSED, Ordering::AcqRel))
    }

    /// Waits a bounded amount of time for the completed flag to appear.
    ///
    /// Returns `true` if the operation is completed on return.
    pub(crate) fn spin_until_completed(&self, max_spins: u32, yield_after: u32) -> bool {
        for spin in 0..max_spins {
            if self.load().is_completed() {
                return true;
            }
            if spin >= yield_after {
                yield_now();
            } else {
                spin_loop();
            }
        }
        self.load().is_completed()
    }
}

/// Proof that the holder won the completion race.
///
/// Only [`StateWord::try_reserve`] creates one; consuming it with
/// [`publish`](Self::publish) is the only way to make an operation completed.
#[must_use = "a reserved operation never completes unless the reservation is published"]
#[derive(Debug)]
pub(crate) struct CompletionReservation<'a> {
    word: &'a StateWord,
}

impl CompletionReservation<'_> {
    /// Publishes the terminal status.
    ///
    /// The payload must be fully written before this call. Flags set
    /// concurrently by other threads (cancellation) are preserved.
    pub(crate) fn publish(self, status: OperationStatus, synchronous: bool) -> StateSnapshot {
        debug_assert!(status.is_terminal());
        let extra = if synchronous {
            FLAG_COMPLETED | FLAG_SYNCHRONOUS
        } else {
            FLAG_COMPLETED
        };

        let mut current = self.word.0.load(Ordering::Relaxed);
        loop {
            let next = (current & !STATUS_MASK) | status.bits() | extra;
            match self.word.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return StateSnapshot(next),
                Err(actual) => current = actual,
            }
        }
    }
}

#[inline]
fn encode_options(options: CreationOptions) -> u32 {
    (options.bits() as u32) << OPTIONS_SHIFT
}
