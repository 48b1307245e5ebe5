//! Error types for the REST client

use thiserror::Error;

/// Errors returned by [`RestClient`](crate::RestClient)
#[derive(Debug, Error)]
pub enum RestError {
    /// The HTTP request could not be completed
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The body was not the expected JSON
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// A device command was issued for an empty device list
    #[error("no devices given")]
    NoDevices,

    /// The HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RestError {
    /// Check whether the base station could not be reached at all
    ///
    /// Pollers stop on these; everything else is retried on the next poll.
    pub fn is_transport(&self) -> bool {
        matches!(self, RestError::Transport { .. } | RestError::Client(_))
    }
}
