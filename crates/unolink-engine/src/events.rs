//! Unified event stream for the engine
//!
//! Background tasks report lifecycle changes and failures through a single
//! event channel. The binary watches it to decide when to shut down.

use std::net::SocketAddr;

use unolink_protocol::RadioAddress;

/// Control messages understood by every background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    /// Stop at the next suspension point
    Shutdown,
}

/// Events emitted by engine tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A device was seen for the first time
    DeviceAdded {
        /// Address of the new device
        address: RadioAddress,
    },

    /// The stream connection is established and the handshake sent
    StreamConnected {
        /// Base station address
        peer: SocketAddr,
    },

    /// The stream reader stopped because of an error
    StreamFailed {
        /// Error description
        message: String,
    },

    /// A REST poller stopped because of an error
    PollerFailed {
        /// Which poller failed
        poller: String,
        /// Error description
        message: String,
    },

    /// A recoverable problem worth surfacing
    Error {
        /// Source of the error
        source: String,
        /// Error message
        message: String,
    },
}

impl EngineEvent {
    /// Check if this event means a task has exited on its own
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::StreamFailed { .. } | EngineEvent::PollerFailed { .. }
        )
    }
}
