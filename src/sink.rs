use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::{Batch, WriteResponse};
use crate::error::WriteError;
use crate::writer::CallbackSlot;

/// Await-style sink client: one call per batch, resolved when the backend
/// answers.
///
/// Adapted into the writer contract by
/// [`SinkWriter`](crate::adapter::SinkWriter), which runs every `send` on
/// its own Tokio task.
#[async_trait]
pub trait BatchSink<T: Send + Sync + 'static>: Send + Sync {
    /// Send a whole batch to the backend.
    ///
    /// **Returns**
    /// - `Ok(..)` once the backend acknowledged every record of the batch.
    /// - `Err(WriteError::Transient(..))` for connection-level problems that
    ///   a resend may fix.
    /// - `Err(WriteError::Rejected(..))` when the backend refused the
    ///   content.
    ///
    /// A task running `send` can be aborted at any `.await`; implementations
    /// must not leave shared state half-updated across one.
    async fn send(&self, batch: &Batch<T>) -> Result<WriteResponse, WriteError>;

    /// Release the connection. Called at most once by the adapter.
    ///
    /// Default implementation is a no-op.
    async fn close(&self) -> Result<(), WriteError> {
        Ok(())
    }
}

/// Callback-style sink client: batches are handed over together with a
/// completion slot which the backend fires from its own worker.
///
/// Adapted into the writer contract by
/// [`ListenerWriter`](crate::adapter::ListenerWriter).
#[async_trait]
pub trait ListenerSink<T: Send + Sync + 'static>: Send + Sync {
    /// Queue `batch` for delivery and return without waiting. The sink must
    /// eventually complete or drop `slot`, and must not complete it on the
    /// calling stack.
    fn submit(&self, batch: Arc<Batch<T>>, slot: CallbackSlot);

    /// Stop the worker after it has handled everything already submitted.
    async fn close(&self) -> Result<(), WriteError> {
        Ok(())
    }
}
