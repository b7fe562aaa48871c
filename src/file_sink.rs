use crate::batch::{Batch, WriteResponse};
use crate::codec::RecordCodec;
use crate::error::WriteError;
use crate::sink::ListenerSink;
use crate::writer::CallbackSlot;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

enum Command<T> {
    Write(Arc<Batch<T>>, CallbackSlot),
    Close(oneshot::Sender<Result<(), WriteError>>),
}

/// Appends records to a local file, one encoded record per line.
///
/// Batches are queued on a bounded channel and written by a background
/// task, which also fires the completion callbacks. A full queue fails the
/// batch with a transient error instead of blocking the submitter.
pub struct JsonFileSink<T> {
    path: PathBuf,
    tx: mpsc::Sender<Command<T>>,
    records_written: Arc<AtomicU64>,
}

impl<T: Send + Sync + 'static> JsonFileSink<T> {
    /// Open (or create) `path` for appending and spawn the writer task.
    ///
    /// `queue` is clamped to at least 1.
    pub async fn open(
        path: impl Into<PathBuf>,
        codec: Arc<dyn RecordCodec<T>>,
        queue: usize,
    ) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let (tx, rx) = mpsc::channel(queue.max(1));
        let records_written = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_writer(
            BufWriter::new(file),
            rx,
            codec,
            Arc::clone(&records_written),
            path.clone(),
        ));

        Ok(JsonFileSink {
            path,
            tx,
            records_written,
        })
    }

    /// Records appended and flushed so far.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn run_writer<T>(
    mut out: BufWriter<File>,
    mut rx: mpsc::Receiver<Command<T>>,
    codec: Arc<dyn RecordCodec<T>>,
    records_written: Arc<AtomicU64>,
    path: PathBuf,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(batch, slot) => {
                let result = append_batch(&mut out, codec.as_ref(), &batch).await;
                let result = result.map(|bytes| {
                    records_written.fetch_add(batch.len() as u64, Ordering::AcqRel);
                    WriteResponse::new(
                        json!({ "path": path.display().to_string(), "records": batch.len() }),
                        format!("appended {} records to {}", batch.len(), path.display()),
                    )
                    .with_bytes_written(bytes)
                });
                if let Err(err) = &result {
                    error!(path = %path.display(), batch_id = batch.id(), %err, "file append failed");
                }
                slot.complete(result);
            }
            Command::Close(ack) => {
                let flushed = out.flush().await.map_err(WriteError::from);
                debug!(path = %path.display(), "file sink closed");
                let _ = ack.send(flushed);
                return;
            }
        }
    }
}

async fn append_batch<T>(
    out: &mut BufWriter<File>,
    codec: &dyn RecordCodec<T>,
    batch: &Batch<T>,
) -> Result<u64, WriteError> {
    let mut buf = Vec::new();
    codec.encode_batch(batch, &mut buf)?;
    out.write_all(&buf).await?;
    out.flush().await?;
    Ok(buf.len() as u64)
}

#[async_trait]
impl<T: Send + Sync + 'static> ListenerSink<T> for JsonFileSink<T> {
    fn submit(&self, batch: Arc<Batch<T>>, slot: CallbackSlot) {
        let Err(err) = self.tx.try_send(Command::Write(batch, slot)) else {
            return;
        };
        let (error, command) = match err {
            TrySendError::Full(command) => (
                WriteError::Transient(format!("file sink queue for {} is full", self.path.display())),
                command,
            ),
            TrySendError::Closed(command) => (WriteError::Closed, command),
        };
        if let Command::Write(_, slot) = command {
            slot.complete_detached(Err(error));
        }
    }

    async fn close(&self) -> Result<(), WriteError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Close(ack_tx)).await.is_err() {
            // Writer already stopped.
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }
}
