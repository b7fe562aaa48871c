use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};
use batch_sink_writer::{
    init::init_logging, Batch, BatchSink, WriteError, WriteManager, WriteResponse, WriterConfig,
};

#[derive(Debug)]
struct Reading {
    sensor: &'static str,
    value: f64,
}

/// Example of integrating a completely custom backend by implementing
/// the `BatchSink` trait directly. Imagine this talks to some
/// proprietary DB for which this crate does not provide a built-in
/// sink.
struct MyCustomDbSink;

#[async_trait]
impl BatchSink<Reading> for MyCustomDbSink {
    async fn send(&self, batch: &Batch<Reading>) -> Result<WriteResponse, WriteError> {
        // Here you would call your own client library for the target DB.
        // For the sake of example we just print the batch and refuse
        // negative readings.
        if let Some(bad) = batch.iter().find(|r| r.value < 0.0) {
            return Err(WriteError::Rejected(format!("negative reading from {}", bad.sensor)));
        }
        println!("[my-custom-db] batch {}: {:?}", batch.id(), batch.records());
        Ok(WriteResponse::new(json!({ "stored": batch.len() }), "ok"))
    }
}

#[tokio::main]
async fn main() {
    let _ = init_logging();

    let config = WriterConfig {
        batch_size_threshold: 4,
        failure_allowance_ratio: 0.5,
        ..WriterConfig::default()
    };
    let manager = match WriteManager::<Reading>::open(config, Arc::new(MyCustomDbSink)) {
        Ok(manager) => manager,
        Err(err) => {
            error!(%err, "invalid writer config");
            return;
        }
    };

    info!("custom backend example started");
    for i in 0..10 {
        let value = if i == 9 { -1.0 } else { i as f64 * 1.5 };
        if let Err(err) = manager.write(Reading { sensor: "t1", value }).await {
            error!(%err, "write refused");
        }
    }

    match manager.close().await {
        Ok(()) => info!(written = manager.records_written(), "custom backend example finished"),
        Err(err) => error!(%err, "custom backend example failed"),
    }
}
