use serde::Serialize;

use crate::batch::Batch;
use crate::error::WriteError;

/// Turns records into the bytes a sink puts on the wire.
///
/// Sinks own an instance instead of reaching for a shared global encoder,
/// so tests can substitute their own.
pub trait RecordCodec<T>: Send + Sync {
    /// Append the encoding of `record` to `out`.
    fn encode(&self, record: &T, out: &mut Vec<u8>) -> Result<(), WriteError>;

    /// Newline-delimited encoding of a whole batch.
    fn encode_batch(&self, batch: &Batch<T>, out: &mut Vec<u8>) -> Result<(), WriteError> {
        for record in batch {
            self.encode(record, out)?;
            out.push(b'\n');
        }
        Ok(())
    }
}

/// Compact JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize> RecordCodec<T> for JsonCodec {
    fn encode(&self, record: &T, out: &mut Vec<u8>) -> Result<(), WriteError> {
        serde_json::to_writer(&mut *out, record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_lines_for_batch() {
        let batch = Batch::new(0, vec![json!({"a": 1}), json!({"b": "x"})]);
        let mut out = Vec::new();
        JsonCodec.encode_batch(&batch, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1}\n{\"b\":\"x\"}\n");
    }

    #[test]
    fn encode_failure_maps_to_codec_error() {
        use std::collections::HashMap;
        // Non-string map keys cannot be represented in JSON.
        let mut record = HashMap::new();
        record.insert(vec![1u8], 1);
        let err = JsonCodec.encode(&record, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, WriteError::Codec(_)));
    }
}
