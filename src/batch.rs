use chrono::{DateTime, Utc};
use serde::Serialize;

/// An ordered, immutable group of records shipped to a sink in one request.
///
/// The write path gets its batches from
/// [`BatchAccumulator`](crate::accumulator::BatchAccumulator), whose ids
/// increase monotonically.
#[derive(Debug)]
pub struct Batch<T> {
    id: u64,
    records: Vec<T>,
}

impl<T> Batch<T> {
    pub fn new(id: u64, records: Vec<T>) -> Self {
        Batch { id, records }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records in submission order.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

impl<'a, T> IntoIterator for &'a Batch<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Acknowledgement returned by a sink for one successfully written batch.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    raw: serde_json::Value,
    text: String,
    bytes_written: Option<u64>,
    completed_at: DateTime<Utc>,
}

impl WriteResponse {
    /// Build a response from the sink's raw reply and its printable form.
    /// The byte count starts out unknown.
    pub fn new(raw: serde_json::Value, text: impl Into<String>) -> Self {
        WriteResponse {
            raw,
            text: text.into(),
            bytes_written: None,
            completed_at: Utc::now(),
        }
    }

    pub fn with_bytes_written(mut self, bytes: u64) -> Self {
        self.bytes_written = Some(bytes);
        self
    }

    /// Sink-specific reply body, `Null` when the sink returns nothing.
    pub fn raw_response(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn string_response(&self) -> &str {
        &self.text
    }

    /// `None` when the sink does not report how many bytes it stored.
    pub fn bytes_written(&self) -> Option<u64> {
        self.bytes_written
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_order() {
        let batch = Batch::new(4, vec!["a", "b", "c"]);
        assert_eq!(batch.id(), 4);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.iter().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn response_bytes_default_to_unknown() {
        let resp = WriteResponse::new(serde_json::json!({"took": 3}), "ok");
        assert_eq!(resp.bytes_written(), None);
        assert_eq!(resp.string_response(), "ok");
        assert_eq!(resp.clone().with_bytes_written(42).bytes_written(), Some(42));
    }
}
