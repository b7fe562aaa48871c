use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::batch::{Batch, WriteResponse};
use crate::error::WriteError;
use crate::inflight::InFlightGuard;

/// Push-style completion sink for one batch write.
///
/// Exactly one of the two methods is called, exactly once, per write it was
/// registered with. Calls arrive on a task owned by the transport, never on
/// the stack of the code that dispatched the write.
pub trait WriteCallback: Send + Sync {
    fn on_success(&self, response: WriteResponse);
    fn on_failure(&self, error: WriteError);
}

/// Single-use handle through which a transport completes a callback write.
///
/// `complete` consumes the slot, so a second completion cannot compile. A
/// slot dropped without completing reports [`WriteError::Cancelled`], which
/// keeps the exactly-once guarantee even when a transport task is torn down.
pub struct CallbackSlot {
    callback: Option<Arc<dyn WriteCallback>>,
    in_flight: Option<InFlightGuard>,
}

impl CallbackSlot {
    pub fn new(callback: Arc<dyn WriteCallback>) -> Self {
        CallbackSlot {
            callback: Some(callback),
            in_flight: None,
        }
    }

    /// The guard is released right after the callback returns.
    pub(crate) fn tracked(callback: Arc<dyn WriteCallback>, guard: InFlightGuard) -> Self {
        CallbackSlot {
            callback: Some(callback),
            in_flight: Some(guard),
        }
    }

    pub fn complete(mut self, result: Result<WriteResponse, WriteError>) {
        if let Some(callback) = self.callback.take() {
            match result {
                Ok(response) => callback.on_success(response),
                Err(error) => callback.on_failure(error),
            }
        }
    }

    /// Complete from a fresh task so the caller's stack never runs the
    /// callback.
    pub fn complete_detached(self, result: Result<WriteResponse, WriteError>) {
        tokio::spawn(async move { self.complete(result) });
    }
}

/// A slot dropped without an outcome reports [`WriteError::Cancelled`].
///
/// Inside a runtime the report runs on a fresh task, holding the in-flight
/// registration until it has been delivered.
impl Drop for CallbackSlot {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let in_flight = self.in_flight.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    callback.on_failure(WriteError::Cancelled);
                    drop(in_flight);
                });
            }
            Err(_) => {
                callback.on_failure(WriteError::Cancelled);
                drop(in_flight);
            }
        }
    }
}

/// Pending result of a pull-mode write.
///
/// Awaiting it yields the sink's acknowledgement or the write error.
/// Dropping it does not cancel the write; [`WriteFuture::cancel`] does, on a
/// best-effort basis.
pub struct WriteFuture {
    state: FutureState,
}

enum FutureState {
    Ready(Option<Result<WriteResponse, WriteError>>),
    Task(JoinHandle<Result<WriteResponse, WriteError>>),
    Listener {
        rx: oneshot::Receiver<Result<WriteResponse, WriteError>>,
        done: Arc<AtomicBool>,
    },
}

impl WriteFuture {
    pub(crate) fn ready(result: Result<WriteResponse, WriteError>) -> Self {
        WriteFuture {
            state: FutureState::Ready(Some(result)),
        }
    }

    /// Adapt a spawned transport task. Cancelling aborts the task, which
    /// drops the in-flight request with it.
    pub(crate) fn task(handle: JoinHandle<Result<WriteResponse, WriteError>>) -> Self {
        WriteFuture {
            state: FutureState::Task(handle),
        }
    }

    /// Adapt a callback-native transport. Such transports cannot be
    /// interrupted, so `cancel` always reports `false`.
    pub(crate) fn listener() -> (Self, Arc<dyn WriteCallback>) {
        let (tx, rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let bridge = Arc::new(FutureBridge {
            tx: std::sync::Mutex::new(Some(tx)),
            done: Arc::clone(&done),
        });
        let future = WriteFuture {
            state: FutureState::Listener { rx, done },
        };
        (future, bridge)
    }

    /// Request cancellation of the underlying send.
    ///
    /// Returns `true` if the request was still running and has been told to
    /// stop. A write that already reached the sink keeps its result; awaiting
    /// after a successful cancel yields [`WriteError::Cancelled`].
    pub fn cancel(&mut self) -> bool {
        match &self.state {
            FutureState::Task(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_done(&self) -> bool {
        match &self.state {
            FutureState::Ready(_) => true,
            FutureState::Task(handle) => handle.is_finished(),
            FutureState::Listener { done, .. } => done.load(Ordering::Acquire),
        }
    }

    /// Wait at most `timeout` for the result.
    ///
    /// Elapsing yields [`WriteError::Timeout`] and leaves the request
    /// running; the future can be awaited again afterwards.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<WriteResponse, WriteError> {
        match tokio::time::timeout(timeout, &mut *self).await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Timeout(timeout)),
        }
    }
}

impl Future for WriteFuture {
    type Output = Result<WriteResponse, WriteError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(WriteError::Closed)))
            }
            FutureState::Task(handle) => Pin::new(handle).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(WriteError::Cancelled),
                Err(err) => Err(WriteError::Transient(format!("sink task failed: {err}"))),
            }),
            FutureState::Listener { rx, .. } => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(WriteError::Cancelled))),
        }
    }
}

/// Callback half of a listener-backed [`WriteFuture`].
struct FutureBridge {
    tx: std::sync::Mutex<Option<oneshot::Sender<Result<WriteResponse, WriteError>>>>,
    done: Arc<AtomicBool>,
}

impl FutureBridge {
    fn resolve(&self, result: Result<WriteResponse, WriteError>) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        self.done.store(true, Ordering::Release);
        if let Some(tx) = tx {
            // The receiver may already be gone; the result is then unobserved.
            let _ = tx.send(result);
        }
    }
}

impl WriteCallback for FutureBridge {
    fn on_success(&self, response: WriteResponse) {
        self.resolve(Ok(response));
    }

    fn on_failure(&self, error: WriteError) {
        self.resolve(Err(error));
    }
}

/// Ships one batch to a sink without holding the caller for the round trip.
///
/// Two completion modes share this contract: [`write`](Self::write) hands
/// back a [`WriteFuture`] to await or cancel, and
/// [`write_with_callback`](Self::write_with_callback) returns immediately
/// and later fires the callback. The callback mode is what the buffered
/// writer uses for pipelining.
#[async_trait]
pub trait AsyncBatchWriter<T: Send + Sync + 'static>: Send + Sync {
    /// Pull mode.
    fn write(&self, batch: Arc<Batch<T>>) -> WriteFuture;

    /// Push mode.
    fn write_with_callback(&self, batch: Arc<Batch<T>>, callback: Arc<dyn WriteCallback>);

    /// Wait until every batch accepted before this call has completed.
    /// Batches submitted concurrently with the flush are not waited for.
    async fn flush(&self) -> Result<(), WriteError>;

    /// Release the sink connection. Does not flush. Closing twice is a
    /// no-op.
    async fn close(&self) -> Result<(), WriteError>;
}
