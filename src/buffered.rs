use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::accumulator::BatchAccumulator;
use crate::batch::{Batch, WriteResponse};
use crate::error::WriteError;
use crate::inflight::{InFlight, InFlightGuard};
use crate::writer::{AsyncBatchWriter, WriteCallback};

/// What to do with a batch whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The failure is final.
    Done,
    /// Send the same batch again through the same writer.
    Retry,
}

/// Receives the outcome of every batch the buffered writer dispatches.
///
/// Called from the transport's task. `attempt` starts at 0 and grows by
/// one with each resubmission of the same batch.
pub trait BatchCompletion<T>: Send + Sync {
    /// A record entered the buffer. Called under the buffer lock, before
    /// the record can be part of any dispatched batch.
    fn on_accepted(&self) {}

    fn on_success(&self, batch: &Batch<T>, response: &WriteResponse);
    fn on_failure(&self, batch: &Batch<T>, attempt: u32, error: &WriteError) -> Disposition;
}

/// Feeds records into a [`BatchAccumulator`] and dispatches each completed
/// batch through an [`AsyncBatchWriter`] in callback mode.
///
/// Accumulate-and-dispatch runs inside one critical section, so batches
/// leave in the order they were cut even with several producers.
pub struct BufferedAsyncWriter<T: Send + Sync + 'static> {
    accumulator: tokio::sync::Mutex<BatchAccumulator<T>>,
    writer: Arc<dyn AsyncBatchWriter<T>>,
    completion: Arc<dyn BatchCompletion<T>>,
    /// Logical batches dispatched and not yet finally completed, retries
    /// included.
    in_flight: Arc<InFlight>,
    permits: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl<T: Send + Sync + 'static> BufferedAsyncWriter<T> {
    /// `max_in_flight` bounds how many batches may be outstanding at once;
    /// `0` leaves it unbounded. When the bound is reached, `write` waits for
    /// a completion before dispatching the next batch.
    pub fn new(
        accumulator: BatchAccumulator<T>,
        writer: Arc<dyn AsyncBatchWriter<T>>,
        completion: Arc<dyn BatchCompletion<T>>,
        max_in_flight: usize,
    ) -> Self {
        BufferedAsyncWriter {
            accumulator: tokio::sync::Mutex::new(accumulator),
            writer,
            completion,
            in_flight: InFlight::new(),
            permits: (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight))),
            closed: AtomicBool::new(false),
        }
    }

    /// Accept one record.
    ///
    /// An `Err` means the record was not taken. Once the record is buffered
    /// the call only waits for an in-flight slot before cutting; dropping
    /// the call while it waits leaves the record buffered for the next
    /// dispatch.
    pub async fn write(&self, record: T) -> Result<(), WriteError> {
        let mut accumulator = self.accumulator.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::Closed);
        }
        self.completion.on_accepted();
        if !accumulator.push(record) {
            return Ok(());
        }
        match self.reserve().await {
            Ok(permit) => {
                if let Some(batch) = accumulator.flush() {
                    self.dispatch(batch, permit);
                }
            }
            Err(err) => {
                if let Some(batch) = accumulator.flush() {
                    self.fail_undispatched(batch, err);
                }
            }
        }
        Ok(())
    }

    /// Dispatch the buffered partial batch if it outlived the linger window.
    /// Returns whether a batch was sent.
    pub async fn flush_expired(&self) -> Result<bool, WriteError> {
        let mut accumulator = self.accumulator.lock().await;
        if !accumulator.is_expired() {
            return Ok(false);
        }
        let permit = self.reserve().await?;
        match accumulator.flush() {
            Some(batch) => {
                trace!(batch_id = batch.id(), "linger window elapsed");
                self.dispatch(batch, permit);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Dispatch any partial batch, then wait for every batch dispatched so
    /// far, including resubmissions, to complete.
    pub async fn flush(&self) -> Result<(), WriteError> {
        {
            let mut accumulator = self.accumulator.lock().await;
            if !accumulator.is_empty() {
                let permit = self.reserve().await?;
                if let Some(batch) = accumulator.flush() {
                    self.dispatch(batch, permit);
                }
            }
        }
        self.in_flight.wait_for_registered().await;
        self.writer.flush().await
    }

    /// Refuse further records, flush, then close the underlying writer.
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), WriteError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.flush().await;
        if let Some(permits) = &self.permits {
            permits.close();
        }
        let closed = self.writer.close().await;
        flushed.and(closed)
    }

    /// Batches dispatched and awaiting their final outcome.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for an in-flight slot. Nothing is cut from the accumulator
    /// until this returns, so cancelling the wait loses no records.
    async fn reserve(&self) -> Result<Option<OwnedSemaphorePermit>, WriteError> {
        match &self.permits {
            Some(permits) => Arc::clone(permits)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| WriteError::Closed),
            None => Ok(None),
        }
    }

    /// Hand a cut batch to the writer. Must not await: a cut batch is
    /// either in the writer's hands or reported failed.
    fn dispatch(&self, batch: Batch<T>, permit: Option<OwnedSemaphorePermit>) {
        let hold = Hold {
            _guard: self.in_flight.register(),
            _permit: permit,
        };
        let batch = Arc::new(batch);
        debug!(batch_id = batch.id(), records = batch.len(), "dispatching batch");

        let tracked = Arc::new(TrackedWrite {
            batch: Arc::clone(&batch),
            attempt: 0,
            writer: Arc::clone(&self.writer),
            completion: Arc::clone(&self.completion),
            hold: Mutex::new(Some(hold)),
        });
        self.writer.write_with_callback(batch, tracked);
    }

    /// Account a batch that was cut but could not be handed to the writer.
    fn fail_undispatched(&self, batch: Batch<T>, error: WriteError) {
        debug!(batch_id = batch.id(), %error, "batch could not be dispatched");
        // Never resent: the writer is going away.
        let _ = self.completion.on_failure(&batch, 0, &error);
    }
}

/// Resources a logical batch keeps until its final outcome is known.
struct Hold {
    _guard: InFlightGuard,
    _permit: Option<OwnedSemaphorePermit>,
}

/// Callback registered for one attempt of one batch. A retry hands its
/// [`Hold`] over to the next attempt, so a flush keeps waiting through it.
struct TrackedWrite<T: Send + Sync + 'static> {
    batch: Arc<Batch<T>>,
    attempt: u32,
    writer: Arc<dyn AsyncBatchWriter<T>>,
    completion: Arc<dyn BatchCompletion<T>>,
    hold: Mutex<Option<Hold>>,
}

impl<T: Send + Sync + 'static> TrackedWrite<T> {
    fn take_hold(&self) -> Option<Hold> {
        self.hold.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl<T: Send + Sync + 'static> WriteCallback for TrackedWrite<T> {
    fn on_success(&self, response: WriteResponse) {
        self.completion.on_success(&self.batch, &response);
        drop(self.take_hold());
    }

    fn on_failure(&self, error: WriteError) {
        match self.completion.on_failure(&self.batch, self.attempt, &error) {
            Disposition::Retry => {
                let next = Arc::new(TrackedWrite {
                    batch: Arc::clone(&self.batch),
                    attempt: self.attempt + 1,
                    writer: Arc::clone(&self.writer),
                    completion: Arc::clone(&self.completion),
                    hold: Mutex::new(self.take_hold()),
                });
                self.writer.write_with_callback(Arc::clone(&self.batch), next);
            }
            Disposition::Done => drop(self.take_hold()),
        }
    }
}
