//! Error types for the engine

use std::io;
use std::time::Duration;

use thiserror::Error;
use unolink_protocol::{ParseError, RadioAddress};

/// Errors returned by engine handles
#[derive(Debug, Error)]
pub enum EngineError {
    /// The registry actor has stopped
    #[error("registry actor is not running")]
    ActorClosed,

    /// Stream failure
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Protocol error
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors that end the stream reader
#[derive(Debug, Error)]
pub enum StreamError {
    /// Resolve or dial failure
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Dial did not complete in time
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// Writing the request line failed
    #[error("handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// Peer closed the connection
    #[error("connection closed by base station")]
    Closed,

    /// Any other read error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The registry actor went away while frames were still arriving
    #[error("registry actor is not running")]
    ActorClosed,
}

/// A single device entry that could not be merged
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeIssue {
    /// Device code is not a valid radio address
    #[error("invalid device code {code:?}: {source}")]
    InvalidAddress {
        code: String,
        #[source]
        source: ParseError,
    },

    /// Battery string is not a percentage
    #[error("invalid battery value {value:?} for {address}")]
    InvalidBattery { address: RadioAddress, value: String },

    /// Two codes name the same device (they differ only in letter case)
    #[error("duplicate device code {code:?} for {address}")]
    DuplicateAddress { address: RadioAddress, code: String },
}
