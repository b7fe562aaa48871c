use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};
use batch_sink_writer::{
    backend::{make_writer_from_config, parse_dsn},
    env::{env_or, BATCH_WRITER_SINK_DSN_ENV},
    init::init_logging,
    JsonCodec, WriteManager, WriterConfig,
};

#[tokio::main]
async fn main() {
    let _ = init_logging();

    // Example DSN: opensearch://localhost:9200/events
    let dsn = env_or(BATCH_WRITER_SINK_DSN_ENV, "opensearch://localhost:9200/events");

    let backend_cfg = match parse_dsn(&dsn) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, dsn = %dsn, "invalid sink DSN");
            return;
        }
    };
    let writer = match make_writer_from_config::<Value>(&backend_cfg, Arc::new(JsonCodec)).await {
        Ok(writer) => writer,
        Err(err) => {
            error!(%err, "failed to build opensearch writer");
            return;
        }
    };

    let config = WriterConfig {
        batch_size_threshold: 50,
        retries_enabled: true,
        failure_allowance_ratio: 0.1,
        ..WriterConfig::default()
    };
    let manager = match WriteManager::open_with(config, writer) {
        Ok(manager) => manager,
        Err(err) => {
            error!(%err, "invalid writer config");
            return;
        }
    };

    info!(dsn = %dsn, "opensearch backend example started");
    for i in 0..500 {
        let doc = json!({ "seq": i, "level": "INFO", "message": "hello from batch-sink-writer" });
        if let Err(err) = manager.write(doc).await {
            error!(%err, "write refused");
            break;
        }
    }

    match manager.close().await {
        Ok(()) => info!(written = manager.records_written(), "all documents indexed"),
        Err(err) => error!(%err, stats = ?manager.stats(), "indexing job failed"),
    }
}
