use std::io;

use crate::request::Status;

/// Errors produced by the request engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level error reported by an easy handle.
    #[error("curl error: {0}")]
    Curl(#[from] curl::Error),

    /// Error from the multi interface itself.
    #[error("curl multi error: {0}")]
    Multi(#[from] curl::MultiError),

    /// I/O error (e.g. spawning the performer thread).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The response cannot be taken in the request's current status.
    #[error("response unavailable (status: {0:?})")]
    ResponseUnavailable(Status),

    /// Response body is not valid UTF-8.
    #[error("body is not valid utf-8")]
    BodyDecode,
}
