mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{oneshot, Semaphore};

use batch_sink_writer::backend::{make_writer_from_config, parse_dsn};
use batch_sink_writer::file_sink::JsonFileSink;
use batch_sink_writer::{
    AsyncBatchWriter, Batch, JsonCodec, ListenerWriter, SinkWriter, WriteCallback, WriteError,
    WriteManager, WriteResponse, WriterConfig,
};
use common::{temp_path, within, ScriptedSink};

/// Callback that forwards its single outcome to a oneshot channel.
struct Forward(Mutex<Option<oneshot::Sender<Result<WriteResponse, WriteError>>>>);

impl Forward {
    fn new() -> (Arc<Self>, oneshot::Receiver<Result<WriteResponse, WriteError>>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Forward(Mutex::new(Some(tx)))), rx)
    }

    fn send(&self, result: Result<WriteResponse, WriteError>) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(result);
        }
    }
}

impl WriteCallback for Forward {
    fn on_success(&self, response: WriteResponse) {
        self.send(Ok(response));
    }

    fn on_failure(&self, error: WriteError) {
        self.send(Err(error));
    }
}

fn batch(id: u64, records: Vec<u32>) -> Arc<Batch<u32>> {
    Arc::new(Batch::new(id, records))
}

#[tokio::test]
async fn pull_mode_resolves_with_sink_response() {
    let sink = ScriptedSink::accepting();
    let writer = SinkWriter::<u32>::new(sink.clone());

    let response = within(writer.write(batch(7, vec![1, 2]))).await.unwrap();
    assert_eq!(response.string_response(), "stored 2");
    assert_eq!(response.raw_response(), &json!({ "batch": 7 }));
}

#[tokio::test]
async fn push_mode_reports_failures_through_callback() {
    let sink = ScriptedSink::scripted(|_, _| Err(WriteError::Rejected("bad row".into())));
    let writer = SinkWriter::<u32>::new(sink.clone());
    let (callback, rx) = Forward::new();

    writer.write_with_callback(batch(0, vec![1]), callback);
    let outcome = within(rx).await.unwrap();
    assert_eq!(outcome.unwrap_err(), WriteError::Rejected("bad row".into()));
}

#[tokio::test]
async fn timed_out_wait_leaves_write_running_and_cancel_stops_it() {
    let gate = Arc::new(Semaphore::new(0));
    let sink = ScriptedSink::gated(gate.clone());
    let writer = SinkWriter::<u32>::new(sink.clone());

    let mut pending = writer.write(batch(0, vec![1]));
    let waited = pending.wait_timeout(Duration::from_millis(20)).await;
    assert_eq!(waited.unwrap_err(), WriteError::Timeout(Duration::from_millis(20)));
    assert!(!pending.is_done());
    assert_eq!(writer.in_flight(), 1);

    assert!(pending.cancel());
    assert_eq!(within(pending).await.unwrap_err(), WriteError::Cancelled);
    within(writer.flush()).await.unwrap();
    assert_eq!(writer.in_flight(), 0);
}

#[tokio::test]
async fn cancel_after_completion_is_refused() {
    let sink = ScriptedSink::accepting();
    let writer = SinkWriter::<u32>::new(sink.clone());

    let mut pending = writer.write(batch(0, vec![1]));
    within(writer.flush()).await.unwrap();
    assert!(pending.is_done());
    assert!(!pending.cancel());
    assert!(pending.await.is_ok());
}

#[tokio::test]
async fn flush_waits_for_callback_writes() {
    let gate = Arc::new(Semaphore::new(0));
    let sink = ScriptedSink::gated(gate.clone());
    let writer = Arc::new(SinkWriter::<u32>::new(sink.clone()));
    let (callback, mut rx) = Forward::new();

    writer.write_with_callback(batch(0, vec![1]), callback);
    let flush = tokio::spawn({
        let writer = Arc::clone(&writer);
        async move { writer.flush().await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!flush.is_finished());
    assert!(rx.try_recv().is_err());

    gate.add_permits(1);
    within(flush).await.unwrap().unwrap();
    assert!(rx.try_recv().unwrap().is_ok());
}

#[tokio::test]
async fn closed_writer_refuses_both_modes() {
    let sink = ScriptedSink::accepting();
    let writer = SinkWriter::<u32>::new(sink.clone());
    writer.close().await.unwrap();
    writer.close().await.unwrap();

    assert_eq!(writer.write(batch(0, vec![1])).await.unwrap_err(), WriteError::Closed);

    let (callback, rx) = Forward::new();
    writer.write_with_callback(batch(1, vec![2]), callback);
    assert_eq!(within(rx).await.unwrap().unwrap_err(), WriteError::Closed);
    assert_eq!(sink.send_count(), 0);
}

#[tokio::test]
async fn file_sink_appends_one_line_per_record() {
    let path = temp_path("manager");
    let sink = Arc::new(
        JsonFileSink::<Value>::open(&path, Arc::new(JsonCodec), 8)
            .await
            .unwrap(),
    );
    let writer = Arc::new(ListenerWriter::<Value>::new(sink.clone()));
    let manager = WriteManager::open_with(
        WriterConfig {
            batch_size_threshold: 2,
            ..WriterConfig::default()
        },
        writer,
    )
    .unwrap();

    for i in 0..5 {
        manager.write(json!({ "seq": i })).await.unwrap();
    }
    manager.close().await.unwrap();

    assert_eq!(manager.records_written(), 5);
    assert_eq!(sink.records_written(), 5);
    let lines: Vec<Value> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines, (0..5).map(|i| json!({ "seq": i })).collect::<Vec<_>>());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn listener_writer_bridges_pull_mode() {
    let path = temp_path("pull");
    let sink = JsonFileSink::<Value>::open(&path, Arc::new(JsonCodec), 8)
        .await
        .unwrap();
    let writer = ListenerWriter::<Value>::new(Arc::new(sink));

    let mut pending = writer.write(Arc::new(Batch::new(0, vec![json!({"a": 1})])));
    assert!(!pending.cancel());
    let response = within(pending).await.unwrap();
    assert_eq!(response.bytes_written(), Some(8));
    assert_eq!(response.raw_response()["records"], json!(1));

    writer.close().await.unwrap();
    assert_eq!(
        writer.write(Arc::new(Batch::new(1, vec![json!({})]))).await.unwrap_err(),
        WriteError::Closed
    );
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn writers_are_built_from_dsn() {
    let noop = make_writer_from_config::<Value>(&parse_dsn("noop://").unwrap(), Arc::new(JsonCodec))
        .await
        .unwrap();
    assert!(within(noop.write(Arc::new(Batch::new(0, vec![json!(1)])))).await.is_ok());
    noop.close().await.unwrap();

    let path = temp_path("dsn");
    let dsn = format!("file://{}", path.display());
    let file = make_writer_from_config::<Value>(&parse_dsn(&dsn).unwrap(), Arc::new(JsonCodec))
        .await
        .unwrap();
    within(file.write(Arc::new(Batch::new(0, vec![json!("x")])))).await.unwrap();
    file.close().await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"x\"\n");
    let _ = std::fs::remove_file(&path);
}
