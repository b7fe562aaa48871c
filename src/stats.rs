use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running record totals of one write job.
///
/// `submitted` grows on the producer side; the other counters only move
/// inside completion handlers, which may race with each other.
#[derive(Debug, Default)]
pub struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    retried_batches: AtomicU64,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried_batches: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_written(&self, records: u64) {
        self.written.fetch_add(records, Ordering::AcqRel);
    }

    #[inline]
    pub fn record_failed(&self, records: u64) {
        self.failed.fetch_add(records, Ordering::AcqRel);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retried_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// `failed / (written + failed)`, or `None` before any completion.
    pub fn failure_ratio(&self) -> Option<f64> {
        let failed = self.failed();
        let completed = self.written() + failed;
        (completed > 0).then(|| failed as f64 / completed as f64)
    }

    pub fn snapshot(&self) -> WriteStats {
        WriteStats {
            submitted: self.submitted(),
            written: self.written(),
            failed: self.failed(),
            retried_batches: self.retried_batches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub submitted: u64,
    pub written: u64,
    pub failed: u64,
    pub retried_batches: u64,
}

impl WriteStats {
    /// Records accepted but not yet accounted as written or failed.
    pub fn outstanding(&self) -> u64 {
        self.submitted.saturating_sub(self.written + self.failed)
    }
}
