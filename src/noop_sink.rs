use crate::batch::{Batch, WriteResponse};
use crate::error::WriteError;
use crate::sink::BatchSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A sink that acknowledges and drops every batch.
///
/// Useful for measuring the overhead of the writer itself without any
/// external I/O, and for tests that don't care about persistence.
#[derive(Debug, Default)]
pub struct NoopSink {
    records: AtomicU64,
}

impl NoopSink {
    /// Records acknowledged so far.
    pub fn records_seen(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> BatchSink<T> for NoopSink {
    async fn send(&self, batch: &Batch<T>) -> Result<WriteResponse, WriteError> {
        self.records.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(WriteResponse::new(
            serde_json::Value::Null,
            format!("discarded {} records", batch.len()),
        ))
    }
}
