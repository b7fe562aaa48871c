use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::error;

use batch_sink_writer::init::init_logging;
use batch_sink_writer::noop_sink::NoopSink;
use batch_sink_writer::{WriteManager, WriterConfig};

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("logging disabled: {err}");
    }

    let sink = Arc::new(NoopSink::default());
    let manager = match WriteManager::<serde_json::Value>::open(WriterConfig::default(), sink.clone()) {
        Ok(manager) => manager,
        Err(err) => {
            error!(%err, "invalid writer config");
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        if let Err(err) = manager.write(json!({ "iteration": i, "msg": "default load" })).await {
            error!(%err, "write refused");
            break;
        }
    }

    let submitted = start.elapsed();
    if let Err(err) = manager.close().await {
        error!(%err, "write job failed");
    }
    let elapsed = start.elapsed();

    println!("default config: submitted {} records in {:?} (~{:.0} rec/s), drained in {:?}",
        n,
        submitted,
        n as f64 / submitted.as_secs_f64(),
        elapsed
    );
    println!("sink saw {} records, manager counted {}", sink.records_seen(), manager.records_written());
}
