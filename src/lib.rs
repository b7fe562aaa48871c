pub mod accumulator;
pub mod adapter;
pub mod backend;
pub mod batch;
pub mod buffered;
pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod inflight;
pub mod manager;
pub mod sink;
pub mod stats;
pub mod writer;

#[cfg(any(feature = "opensearch", feature = "clickhouse"))]
mod http;

#[cfg(feature = "opensearch")]
pub mod opensearch;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod file_sink;
pub mod init;
pub mod noop_sink;

pub use accumulator::BatchAccumulator;
pub use adapter::{ListenerWriter, SinkWriter};
pub use batch::{Batch, WriteResponse};
pub use buffered::{BatchCompletion, BufferedAsyncWriter, Disposition};
pub use codec::{JsonCodec, RecordCodec};
pub use config::{ConfigError, WriterConfig};
pub use error::{CloseError, FlushError, RatioExceeded, SubmissionError, WriteError};
pub use manager::{WriteManager, WriterState};
pub use sink::{BatchSink, ListenerSink};
pub use stats::WriteStats;
pub use writer::{AsyncBatchWriter, CallbackSlot, WriteCallback, WriteFuture};
