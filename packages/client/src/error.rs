//! Error type returned by the transport, the API client, and the fetcher.
//!
//! Every variant names the URL or ID it concerns so a caller can tell which
//! request failed without extra bookkeeping.

use thiserror::Error;

/// Errors that can occur while talking to the CWE REST service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A model-level failure: invalid ID, empty input, registry conflict.
    #[error(transparent)]
    Core(#[from] cwe::Error),

    /// The service answered with a non-success HTTP status.
    #[error("{url} returned status {status}")]
    ApiStatus { url: String, status: u16 },

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response from {context}: {message}")]
    Decode { context: String, message: String },

    /// The response parsed but lacked a required field.
    #[error("response from {context} has no `{field}` field")]
    MissingField { context: String, field: &'static str },

    /// The HTTP request could not be dispatched or its body not read.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Every attempt failed; `last` is the error from the final attempt.
    #[error("{url}: giving up after {attempts} attempts: {last}")]
    RetriesExceeded {
        url: String,
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// The HTTP status behind this error, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::ApiStatus { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            ClientError::RetriesExceeded { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Shorthand for results carrying a [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
