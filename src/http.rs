//! Error classification shared by the HTTP-based sinks.

use reqwest::StatusCode;

use crate::error::WriteError;

/// Map a failed request to the retry taxonomy. Requests that could not even
/// be built will fail the same way next time.
pub(crate) fn transport_error(err: reqwest::Error) -> WriteError {
    if err.is_builder() {
        WriteError::Rejected(err.to_string())
    } else {
        WriteError::Transient(err.to_string())
    }
}

/// Map a non-success HTTP status. Throttling and server-side errors are
/// worth a retry; any other client error means the payload was refused.
pub(crate) fn status_error(backend: &str, status: StatusCode, body: &str) -> WriteError {
    let message = format!("{backend} responded with status {status}: {body}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        WriteError::Transient(message)
    } else {
        WriteError::Rejected(message)
    }
}
