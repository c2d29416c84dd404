//! Error types for the engine.

use thiserror::Error;

/// Errors raised by [`SessionClient`](crate::SessionClient) requests.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("retries exhausted for {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<SessionError>,
    },
}
