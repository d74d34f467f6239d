//! Cancellation requests.

use crate::error::{PromiseError, Result};
use crate::operation::{AsyncOperation, CreationOptions};

impl<T: Send + Sync + 'static> AsyncOperation<T> {
    /// Requests cancellation.
    ///
    /// The request is advisory: it sets a flag and invokes the
    /// `on_cancel_requested` hook, which decides whether and when the
    /// operation actually finishes. Only the first request has an effect.
    /// Requests are ignored once the operation has completed, and always when
    /// it was created with [`CreationOptions::SUPPRESS_CANCELLATION`].
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::ObjectDisposed`] after disposal, and whatever
    /// the hook returns on the first request. The default hook returns
    /// [`PromiseError::Unsupported`].
    pub fn request_cancellation(&self) -> Result<()> {
        let state = self.state();
        if state.is_disposed() {
            return Err(PromiseError::ObjectDisposed);
        }
        if state
            .options()
            .contains(CreationOptions::SUPPRESS_CANCELLATION)
        {
            return Ok(());
        }
        if !self.inner.state.try_request_cancellation() {
            return Ok(());
        }

        tracing::debug!(operation = %self.id(), "cancellation requested");
        self.inner.behavior.on_cancel_requested(self)
    }
}
