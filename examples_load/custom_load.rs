use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::error;

use batch_sink_writer::init::{init_logging_with_config, LoggingConfig};
use batch_sink_writer::noop_sink::NoopSink;
use batch_sink_writer::{WriteManager, WriterConfig};

#[derive(Serialize)]
struct Event {
    iteration: u64,
    source: &'static str,
}

#[tokio::main]
async fn main() {
    let logging = LoggingConfig {
        filter: "warn".to_string(),
        ansi: false,
        ..LoggingConfig::default()
    };
    if let Err(err) = init_logging_with_config(logging) {
        eprintln!("logging disabled: {err}");
    }

    let config = WriterConfig {
        batch_size_threshold: 1_000,
        batch_time_threshold_ms: 200,
        max_in_flight_batches: 64,
        failure_allowance_ratio: 0.01,
        retries_enabled: true,
        ..WriterConfig::default()
    };

    let sink = Arc::new(NoopSink::default());
    let manager = match WriteManager::<Event>::open(config, sink.clone()) {
        Ok(manager) => manager,
        Err(err) => {
            error!(%err, "invalid writer config");
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let event = Event { iteration: i, source: "custom load" };
        if let Err(err) = manager.write(event).await {
            error!(%err, "write refused");
            break;
        }
    }

    let submitted = start.elapsed();
    if let Err(err) = manager.close().await {
        error!(%err, "write job failed");
    }
    let elapsed = start.elapsed();

    println!("custom config: submitted {} records in {:?} (~{:.0} rec/s), drained in {:?}",
        n,
        submitted,
        n as f64 / submitted.as_secs_f64(),
        elapsed
    );
    println!("stats: {:?}", manager.stats());
}
