//! Error types for unolink frame parsing

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Frame is not exactly [`FRAME_LEN`](crate::FRAME_LEN) bytes
    #[error("invalid frame length: expected {expected} bytes, got {got}")]
    FrameLength { expected: usize, got: usize },

    /// Radio address text is not six hex digits
    #[error("invalid radio address length: expected 6 hex digits, got {0}")]
    AddressLength(usize),

    /// Radio address text contains a non-hex character
    #[error("invalid radio address: {0:?}")]
    AddressDigits(String),
}
