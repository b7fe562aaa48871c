use std::time::Duration;

/// Outcome of a single failed batch write.
///
/// Every batch that does not reach the sink ends in exactly one of these.
/// The variant decides the retry policy: only [`WriteError::Transient`] is
/// ever resubmitted.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    /// Connection drop, server-side error or transport timeout.
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// The sink refused the content itself; resending the same batch will
    /// fail the same way.
    #[error("sink rejected batch: {0}")]
    Rejected(String),

    #[error("failed to encode record: {0}")]
    Codec(String),

    /// The caller cancelled a pending write before the sink answered.
    #[error("write cancelled before the sink responded")]
    Cancelled,

    /// A bounded wait on a pending write elapsed. The request itself keeps
    /// running.
    #[error("gave up waiting for the sink after {0:?}")]
    Timeout(Duration),

    #[error("writer is closed")]
    Closed,
}

impl WriteError {
    /// Whether resubmitting the same batch has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(err: serde_json::Error) -> Self {
        WriteError::Codec(err.to_string())
    }
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        WriteError::Transient(err.to_string())
    }
}

/// The job crossed its configured failure allowance.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error(
    "failure ratio exceeded: {failed} failed of {submitted} submitted records \
     (allowed ratio {allowed_ratio}); first error: {first_error}"
)]
pub struct RatioExceeded {
    pub failed: u64,
    pub submitted: u64,
    pub allowed_ratio: f64,
    pub first_error: WriteError,
}

/// Returned by `WriteManager::write` once the manager stopped accepting
/// records.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("write job is aborting: {0}")]
    Aborting(RatioExceeded),

    #[error("write manager is closed")]
    Closed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FlushError {
    #[error(transparent)]
    RatioExceeded(#[from] RatioExceeded),

    #[error("write manager is closed")]
    Closed,
}

/// Returned by `WriteManager::close`. Resources are already released by the
/// time the caller sees this.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CloseError {
    #[error(transparent)]
    RatioExceeded(#[from] RatioExceeded),

    #[error("failed to close sink: {0}")]
    Sink(WriteError),
}
