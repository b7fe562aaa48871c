use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::batch::Batch;
use crate::error::WriteError;
use crate::inflight::InFlight;
use crate::sink::{BatchSink, ListenerSink};
use crate::writer::{AsyncBatchWriter, CallbackSlot, WriteCallback, WriteFuture};

/// [`AsyncBatchWriter`] over an await-style [`BatchSink`].
///
/// Every batch is sent from a dedicated Tokio task, so callbacks fire on
/// that task and a pull-mode cancel aborts the request in flight.
pub struct SinkWriter<T: Send + Sync + 'static> {
    sink: Arc<dyn BatchSink<T>>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl<T: Send + Sync + 'static> SinkWriter<T> {
    pub fn new(sink: Arc<dyn BatchSink<T>>) -> Self {
        SinkWriter {
            sink,
            in_flight: InFlight::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Batches handed to the sink that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> AsyncBatchWriter<T> for SinkWriter<T> {
    fn write(&self, batch: Arc<Batch<T>>) -> WriteFuture {
        if self.closed.load(Ordering::Acquire) {
            return WriteFuture::ready(Err(WriteError::Closed));
        }
        let guard = self.in_flight.register();
        let sink = Arc::clone(&self.sink);
        WriteFuture::task(tokio::spawn(async move {
            // Aborting the task drops the guard together with the request.
            let _guard = guard;
            sink.send(&batch).await
        }))
    }

    fn write_with_callback(&self, batch: Arc<Batch<T>>, callback: Arc<dyn WriteCallback>) {
        if self.closed.load(Ordering::Acquire) {
            CallbackSlot::new(callback).complete_detached(Err(WriteError::Closed));
            return;
        }
        let slot = CallbackSlot::tracked(callback, self.in_flight.register());
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let result = sink.send(&batch).await;
            debug!(batch_id = batch.id(), ok = result.is_ok(), "sink returned");
            slot.complete(result);
        });
    }

    async fn flush(&self) -> Result<(), WriteError> {
        self.in_flight.wait_for_registered().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), WriteError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(in_flight = self.in_flight.len(), "closing sink connection");
        self.sink.close().await
    }
}

/// [`AsyncBatchWriter`] over a callback-style [`ListenerSink`].
///
/// Pull-mode writes are bridged through a one-shot channel; they cannot be
/// cancelled because the sink offers no way to recall a submitted batch.
pub struct ListenerWriter<T: Send + Sync + 'static> {
    sink: Arc<dyn ListenerSink<T>>,
    in_flight: Arc<InFlight>,
    closed: AtomicBool,
}

impl<T: Send + Sync + 'static> ListenerWriter<T> {
    pub fn new(sink: Arc<dyn ListenerSink<T>>) -> Self {
        ListenerWriter {
            sink,
            in_flight: InFlight::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> AsyncBatchWriter<T> for ListenerWriter<T> {
    fn write(&self, batch: Arc<Batch<T>>) -> WriteFuture {
        let (future, bridge) = WriteFuture::listener();
        self.write_with_callback(batch, bridge);
        future
    }

    fn write_with_callback(&self, batch: Arc<Batch<T>>, callback: Arc<dyn WriteCallback>) {
        if self.closed.load(Ordering::Acquire) {
            CallbackSlot::new(callback).complete_detached(Err(WriteError::Closed));
            return;
        }
        let slot = CallbackSlot::tracked(callback, self.in_flight.register());
        self.sink.submit(batch, slot);
    }

    async fn flush(&self) -> Result<(), WriteError> {
        self.in_flight.wait_for_registered().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), WriteError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(in_flight = self.in_flight.len(), "closing listener sink");
        self.sink.close().await
    }
}
