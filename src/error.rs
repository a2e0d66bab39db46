use std::time::Duration;

use thiserror::Error;

use crate::models::PostId;

#[derive(Debug, Error)]
pub enum ObserverError {
    /// A classification result arrived with no post id to correlate it with.
    #[error("protocol violation: classification result carries no post id")]
    ProtocolViolation,

    #[error("could not dispatch classification request for post {0}: relay unavailable")]
    DispatchFailure(PostId),

    #[error("invalid result data received for post {0}")]
    InvalidResult(PostId),

    #[error("observer is not running")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("classification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classification service returned HTTP {0}")]
    Status(u16),

    #[error("malformed classification response: {0}")]
    MalformedResponse(String),

    #[error("classification request timed out after {0:?}")]
    Timeout(Duration),

    #[error("relay is not running")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid decision value {0}, expected 0 or 1")]
pub struct InvalidVerdict(pub u8);
