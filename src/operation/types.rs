//! Operation status and creation option definitions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

/// Lifecycle status of an operation.
///
/// Statuses only ever move forward. `Created -> Running` is allowed without an
/// explicit `Scheduled` step, and any of the three terminal statuses may be
/// reached from any non-terminal one. Terminal statuses are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum OperationStatus {
    /// The operation has been initialized but not scheduled yet.
    Created = 0,
    /// The operation is waiting to be activated.
    Scheduled = 1,
    /// The operation is running.
    Running = 2,
    /// The operation finished successfully.
    RanToCompletion = 3,
    /// The operation finished with an error.
    Faulted = 4,
    /// The operation finished because it was canceled.
    Canceled = 5,
}

impl OperationStatus {
    /// Decodes a status from its packed representation.
    ///
    /// Unknown codes never appear in a well-formed state word; they decode to
    /// `Created` so that a corrupted value cannot pose as a terminal status.
    #[inline]
    pub(crate) const fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::RanToCompletion,
            4 => Self::Faulted,
            5 => Self::Canceled,
            _ => Self::Created,
        }
    }

    /// Returns the packed representation of this status.
    #[inline]
    pub(crate) const fn bits(self) -> u32 {
        self as u32
    }

    /// Returns `true` for `RanToCompletion`, `Faulted` and `Canceled`.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::RanToCompletion | Self::Faulted | Self::Canceled
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::RanToCompletion => "RanToCompletion",
            Self::Faulted => "Faulted",
            Self::Canceled => "Canceled",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Options fixed when an operation is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreationOptions: u8 {
        /// Disposal becomes a no-op. Used for shared sentinel instances.
        const DO_NOT_DISPOSE = 0b001;
        /// `request_cancellation` becomes a no-op.
        const SUPPRESS_CANCELLATION = 0b010;
        /// Completion callbacks are always posted rather than run inline.
        const RUN_CONTINUATIONS_ASYNCHRONOUSLY = 0b100;
    }
}

/// Process-unique identifier of an operation.
///
/// Identifiers are handed out in creation order and only serve diagnostics:
/// log events and `Debug` output refer to operations by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl OperationId {
    /// Allocates the next identifier.
    pub(crate) fn next() -> Self {
        // Start at 1, 0 is never handed out
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}
