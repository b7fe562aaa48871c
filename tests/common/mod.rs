#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use batch_sink_writer::{Batch, BatchSink, WriteError, WriteResponse};

type Outcome = dyn Fn(&[u32], u32) -> Result<(), WriteError> + Send + Sync;

/// In-memory sink whose answer per batch is scripted by the test.
///
/// The script sees the batch's records and the attempt number (0 for the
/// first send of a batch id). With a gate, every send parks until the test
/// hands out a permit.
pub struct ScriptedSink {
    outcome: Box<Outcome>,
    gate: Option<Arc<Semaphore>>,
    sends: Mutex<Vec<(u64, Vec<u32>)>>,
    attempts: Mutex<HashMap<u64, u32>>,
}

impl ScriptedSink {
    pub fn accepting() -> Arc<Self> {
        Self::scripted(|_, _| Ok(()))
    }

    pub fn scripted(
        outcome: impl Fn(&[u32], u32) -> Result<(), WriteError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(ScriptedSink {
            outcome: Box::new(outcome),
            gate: None,
            sends: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(ScriptedSink {
            outcome: Box::new(|_, _| Ok(())),
            gate: Some(gate),
            sends: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    /// Every send so far as `(batch id, records)`, in arrival order.
    pub fn sends(&self) -> Vec<(u64, Vec<u32>)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    /// Records of every distinct batch, ordered by batch id.
    pub fn batches_by_id(&self) -> Vec<Vec<u32>> {
        let mut sends = self.sends();
        sends.sort_by_key(|(id, _)| *id);
        sends.dedup_by_key(|(id, _)| *id);
        sends.into_iter().map(|(_, records)| records).collect()
    }

    pub fn attempts_of(&self, batch_id: u64) -> u32 {
        self.attempts.lock().unwrap().get(&batch_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BatchSink<u32> for ScriptedSink {
    async fn send(&self, batch: &Batch<u32>) -> Result<WriteResponse, WriteError> {
        self.sends
            .lock()
            .unwrap()
            .push((batch.id(), batch.records().to_vec()));
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(batch.id()).or_insert(0);
            *seen += 1;
            *seen - 1
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        (self.outcome)(batch.records(), attempt)?;
        Ok(WriteResponse::new(
            serde_json::json!({ "batch": batch.id() }),
            format!("stored {}", batch.len()),
        ))
    }
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Await `fut`, panicking if it takes more than two seconds.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("operation hung")
}

/// Fresh path under the system temp dir, unique per process and name.
pub fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "batch-sink-writer-{}-{}.jsonl",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_file(&path);
    path
}
