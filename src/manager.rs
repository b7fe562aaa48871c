use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::accumulator::BatchAccumulator;
use crate::adapter::SinkWriter;
use crate::batch::{Batch, WriteResponse};
use crate::buffered::{BatchCompletion, BufferedAsyncWriter, Disposition};
use crate::config::{ConfigError, WriterConfig};
use crate::error::{CloseError, FlushError, RatioExceeded, SubmissionError, WriteError};
use crate::sink::BatchSink;
use crate::stats::{Counters, WriteStats};
use crate::writer::AsyncBatchWriter;

/// How many times a batch is resent after a transient failure.
pub const MAX_RESUBMISSIONS: u32 = 1;

/// Lifecycle of a [`WriteManager`].
///
/// `Open` accepts records. `Aborting` is entered once the failure ratio is
/// exceeded: new records are refused while in-flight batches still drain.
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Aborting,
    Closed,
}

/// Failure policy and bookkeeping shared with the completion path.
#[derive(Debug)]
struct JobPolicy {
    failure_allowance_ratio: f64,
    retries_enabled: bool,
    counters: Counters,
    aborted: AtomicBool,
    closed: AtomicBool,
    first_error: Mutex<Option<WriteError>>,
}

impl JobPolicy {
    fn new(config: &WriterConfig) -> Self {
        JobPolicy {
            failure_allowance_ratio: config.failure_allowance_ratio,
            retries_enabled: config.retries_enabled,
            counters: Counters::new(),
            aborted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    fn state(&self) -> WriterState {
        if self.closed.load(Ordering::Acquire) {
            WriterState::Closed
        } else if self.aborted.load(Ordering::Acquire) {
            WriterState::Aborting
        } else {
            WriterState::Open
        }
    }

    /// Abort the job once `failed / completed` strictly exceeds the
    /// allowance. Aborting is sticky.
    fn evaluate(&self) {
        let Some(ratio) = self.counters.failure_ratio() else {
            return;
        };
        if ratio > self.failure_allowance_ratio && !self.aborted.swap(true, Ordering::AcqRel) {
            warn!(
                ratio,
                allowed = self.failure_allowance_ratio,
                failed = self.counters.failed(),
                written = self.counters.written(),
                "failure ratio exceeded, aborting write job"
            );
        }
    }

    fn first_error(&self) -> Option<WriteError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ratio_exceeded(&self) -> Option<RatioExceeded> {
        if !self.aborted.load(Ordering::Acquire) {
            return None;
        }
        // The first error is stored before the failed counter moves, so an
        // aborted job always has one.
        let first_error = self.first_error()?;
        Some(RatioExceeded {
            failed: self.counters.failed(),
            submitted: self.counters.submitted(),
            allowed_ratio: self.failure_allowance_ratio,
            first_error,
        })
    }
}

impl<T> BatchCompletion<T> for JobPolicy {
    fn on_accepted(&self) {
        self.counters.record_submitted();
    }

    fn on_success(&self, batch: &Batch<T>, response: &WriteResponse) {
        self.counters.record_written(batch.len() as u64);
        debug!(
            batch_id = batch.id(),
            records = batch.len(),
            bytes = ?response.bytes_written(),
            "batch written"
        );
        self.evaluate();
    }

    fn on_failure(&self, batch: &Batch<T>, attempt: u32, error: &WriteError) -> Disposition {
        if self.retries_enabled && error.is_transient() && attempt < MAX_RESUBMISSIONS {
            self.counters.record_retry();
            warn!(batch_id = batch.id(), attempt, %error, "transient failure, resubmitting batch");
            return Disposition::Retry;
        }

        error!(batch_id = batch.id(), records = batch.len(), %error, "batch failed");
        {
            let mut first = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if first.is_none() {
                *first = Some(error.clone());
            }
        }
        self.counters.record_failed(batch.len() as u64);
        self.evaluate();
        Disposition::Done
    }
}

/// Top-level handle of a write job.
///
/// Records go in through [`write`](Self::write); batches are cut and
/// shipped in the background, and their outcomes feed the failure policy.
/// Per-batch errors never surface from `write` directly; they show up in
/// aggregate from [`flush`](Self::flush) and [`close`](Self::close), or as a
/// refused `write` once the job is aborting.
pub struct WriteManager<T: Send + Sync + 'static> {
    policy: Arc<JobPolicy>,
    buffered: Arc<BufferedAsyncWriter<T>>,
    linger: Mutex<Option<Linger>>,
}

impl<T: Send + Sync + 'static> WriteManager<T> {
    /// Open a job writing to an await-style sink.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: WriterConfig, sink: Arc<dyn BatchSink<T>>) -> Result<Self, ConfigError> {
        Self::open_with(config, Arc::new(SinkWriter::new(sink)))
    }

    /// Open a job on top of any [`AsyncBatchWriter`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open_with(
        config: WriterConfig,
        writer: Arc<dyn AsyncBatchWriter<T>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = Arc::new(JobPolicy::new(&config));
        let completion: Arc<dyn BatchCompletion<T>> = policy.clone();
        let accumulator =
            BatchAccumulator::new(config.batch_size_threshold, config.batch_time_threshold());
        let buffered = Arc::new(BufferedAsyncWriter::new(
            accumulator,
            writer,
            completion,
            config.max_in_flight_batches,
        ));
        let linger = spawn_linger(Arc::downgrade(&buffered), config.batch_time_threshold());

        info!(
            batch_size = config.batch_size_threshold,
            batch_time_ms = config.batch_time_threshold_ms,
            failure_allowance_ratio = config.failure_allowance_ratio,
            retries_enabled = config.retries_enabled,
            "write manager opened"
        );

        Ok(WriteManager {
            policy,
            buffered,
            linger: Mutex::new(Some(linger)),
        })
    }

    /// Accept one record.
    ///
    /// Returns as soon as the record is buffered, or its batch dispatched.
    /// Waits only when `max_in_flight_batches` outstanding batches are
    /// already in the air.
    pub async fn write(&self, record: T) -> Result<(), SubmissionError> {
        match self.policy.state() {
            WriterState::Open => {}
            WriterState::Aborting => return Err(self.refusal()),
            WriterState::Closed => return Err(SubmissionError::Closed),
        }

        self.buffered.write(record).await.map_err(|err| {
            debug!(%err, "record refused by buffered writer");
            SubmissionError::Closed
        })
    }

    /// Ship any partial batch and wait for every outstanding batch.
    ///
    /// Fails with [`FlushError::RatioExceeded`] once the job is aborting,
    /// after the drain.
    pub async fn flush(&self) -> Result<(), FlushError> {
        if self.policy.closed.load(Ordering::Acquire) {
            return Err(FlushError::Closed);
        }
        self.buffered.flush().await.map_err(|_| FlushError::Closed)?;
        self.policy.evaluate();
        match self.policy.ratio_exceeded() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Drain, release the sink, then report how the job ended.
    ///
    /// Cleanup always runs to completion before an error is returned.
    /// Closing an already closed manager is a no-op.
    pub async fn close(&self) -> Result<(), CloseError> {
        if self.policy.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(linger) = self.take_linger() {
            linger.stop().await;
        }

        let released = self.buffered.close().await;
        self.policy.evaluate();

        let stats = self.policy.counters.snapshot();
        info!(
            submitted = stats.submitted,
            written = stats.written,
            failed = stats.failed,
            retried_batches = stats.retried_batches,
            "write manager closed"
        );

        if let Some(err) = self.policy.ratio_exceeded() {
            error!(%err, "write job aborted");
            return Err(CloseError::RatioExceeded(err));
        }
        released.map_err(CloseError::Sink)
    }

    /// Records whose batch the sink has acknowledged.
    pub fn records_written(&self) -> u64 {
        self.policy.counters.written()
    }

    pub fn stats(&self) -> WriteStats {
        self.policy.counters.snapshot()
    }

    pub fn state(&self) -> WriterState {
        self.policy.state()
    }

    /// First batch failure observed, if any.
    pub fn first_error(&self) -> Option<WriteError> {
        self.policy.first_error()
    }

    fn refusal(&self) -> SubmissionError {
        match self.policy.ratio_exceeded() {
            Some(err) => SubmissionError::Aborting(err),
            None => SubmissionError::Closed,
        }
    }

    fn take_linger(&self) -> Option<Linger> {
        self.linger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T: Send + Sync + 'static> Drop for WriteManager<T> {
    fn drop(&mut self) {
        // Nothing is left to drain once the manager itself is gone.
        if let Some(linger) = self.take_linger() {
            linger.handle.abort();
        }
    }
}

/// Background task shipping partial batches that outlived the time window.
struct Linger {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Linger {
    /// Ask the loop to exit between ticks and wait for it.
    ///
    /// A tick already dispatching a batch runs to completion first.
    async fn stop(self) {
        self.stop.notify_one();
        if let Err(err) = self.handle.await {
            debug!(%err, "linger task ended abnormally");
        }
    }
}

fn spawn_linger<T: Send + Sync + 'static>(
    buffered: Weak<BufferedAsyncWriter<T>>,
    every: Duration,
) -> Linger {
    let stop = Arc::new(Notify::new());
    let handle = tokio::spawn({
        let stop = Arc::clone(&stop);
        async move {
            loop {
                tokio::select! {
                    _ = sleep(every) => {}
                    _ = stop.notified() => break,
                }
                let Some(buffered) = buffered.upgrade() else {
                    break;
                };
                if let Err(err) = buffered.flush_expired().await {
                    debug!(%err, "linger flush stopped");
                    break;
                }
            }
        }
    });
    Linger { stop, handle }
}
