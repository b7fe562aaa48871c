use std::mem;
use std::time::{Duration, Instant};

use crate::batch::Batch;

/// Groups incoming records into [`Batch`]es by size and age.
///
/// A batch is cut when the buffer reaches `batch_size` records, or when a
/// record arrives after the oldest buffered record has waited longer than
/// `linger`. The time window starts at the first record of the current
/// buffer, not at the previous flush, so a record arriving after an idle
/// period opens a fresh window instead of being cut on its own. The accumulator takes `&mut self` and is meant for a single
/// producer; callers sharing it across tasks must serialize access
/// themselves (the buffered writer keeps it behind a mutex).
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    buffer: Vec<T>,
    batch_size: usize,
    linger: Duration,
    /// When the first record of the current buffer arrived.
    opened_at: Option<Instant>,
    next_id: u64,
}

impl<T> BatchAccumulator<T> {
    /// `batch_size` is clamped to at least 1.
    pub fn new(batch_size: usize, linger: Duration) -> Self {
        let batch_size = batch_size.max(1);
        BatchAccumulator {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            linger,
            opened_at: None,
            next_id: 0,
        }
    }

    /// Buffer `record`, returning a completed batch when a flush condition
    /// fires.
    pub fn add_record(&mut self, record: T) -> Option<Batch<T>> {
        if self.push(record) {
            self.cut()
        } else {
            None
        }
    }

    /// Buffer `record` without cutting. Returns whether a flush condition
    /// now holds; the caller cuts with [`flush`](Self::flush) once it is
    /// able to ship the batch.
    pub fn push(&mut self, record: T) -> bool {
        let now = Instant::now();
        let opened_at = *self.opened_at.get_or_insert(now);
        self.buffer.push(record);
        self.buffer.len() >= self.batch_size || now.duration_since(opened_at) >= self.linger
    }

    /// Materialize whatever is buffered. `None` when empty.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        self.cut()
    }

    /// Whether a non-empty buffer has outlived the linger window.
    pub fn is_expired(&self) -> bool {
        self.opened_at
            .map(|opened| opened.elapsed() >= self.linger)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn cut(&mut self) -> Option<Batch<T>> {
        if self.buffer.is_empty() {
            return None;
        }
        let records = mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        self.opened_at = None;
        let id = self.next_id;
        self.next_id += 1;
        Some(Batch::new(id, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LINGER: Duration = Duration::from_secs(3600);

    #[test]
    fn cuts_batch_at_size_threshold() {
        let mut acc = BatchAccumulator::new(3, NO_LINGER);
        assert!(acc.add_record(1).is_none());
        assert!(acc.add_record(2).is_none());
        let batch = acc.add_record(3).expect("third record fills the batch");
        assert_eq!(batch.records(), &[1, 2, 3]);
        assert!(acc.is_empty());
    }

    #[test]
    fn batch_ids_increase() {
        let mut acc = BatchAccumulator::new(1, NO_LINGER);
        let ids: Vec<u64> = (0..4).filter_map(|i| acc.add_record(i)).map(|b| b.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn flush_on_empty_buffer_yields_nothing() {
        let mut acc: BatchAccumulator<u8> = BatchAccumulator::new(8, NO_LINGER);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn flush_returns_partial_batch() {
        let mut acc = BatchAccumulator::new(10, NO_LINGER);
        acc.add_record("a");
        acc.add_record("b");
        let batch = acc.flush().expect("partial batch");
        assert_eq!(batch.records(), &["a", "b"]);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let mut acc = BatchAccumulator::new(0, NO_LINGER);
        assert_eq!(acc.add_record(()).map(|b| b.len()), Some(1));
    }

    #[test]
    fn aged_buffer_is_cut_on_next_record() {
        let mut acc = BatchAccumulator::new(100, Duration::from_millis(5));
        assert!(acc.add_record(1).is_none());
        std::thread::sleep(Duration::from_millis(20));
        assert!(acc.is_expired());
        let batch = acc.add_record(2).expect("linger elapsed");
        assert_eq!(batch.records(), &[1, 2]);
        assert!(!acc.is_expired());
    }

    #[test]
    fn push_reports_readiness_without_cutting() {
        let mut acc = BatchAccumulator::new(2, NO_LINGER);
        assert!(!acc.push(1));
        assert!(acc.push(2));
        assert!(acc.push(3));
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.flush().map(|b| b.len()), Some(3));
    }

    #[test]
    fn idle_empty_buffer_does_not_cut_single_record() {
        let mut acc = BatchAccumulator::new(100, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert!(acc.add_record(1).is_none());
        assert_eq!(acc.len(), 1);
    }
}
