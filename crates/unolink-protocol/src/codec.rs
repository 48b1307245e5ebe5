//! Frame reassembly
//!
//! TCP does not preserve write boundaries, so a read may return half a frame
//! or several frames at once. [`FrameCodec`] buffers incoming bytes and hands
//! out whole [`FRAME_LEN`]-byte frames in arrival order.

use tracing::warn;

use crate::error::ParseError;
use crate::packet::Packet;
use crate::FRAME_LEN;

/// Upper bound on buffered bytes before old data is discarded
const MAX_BUFFERED: usize = FRAME_LEN * 256;

/// Streaming splitter for fixed-size frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
    discarded: u64,
}

impl FrameCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_LEN * 4),
            discarded: 0,
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Drop whole frames from the front so alignment is kept
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            let drop = excess.div_ceil(FRAME_LEN) * FRAME_LEN;
            self.buffer.drain(..drop);
            self.discarded += drop as u64;
            warn!("Frame buffer overflow, discarded {} bytes", drop);
        }
    }

    /// Extract the next complete frame, if available
    pub fn next_frame(&mut self) -> Option<[u8; FRAME_LEN]> {
        if self.buffer.len() < FRAME_LEN {
            return None;
        }
        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.buffer[..FRAME_LEN]);
        self.buffer.drain(..FRAME_LEN);
        Some(frame)
    }

    /// Extract and decode the next complete frame
    pub fn next_packet(&mut self) -> Option<Result<Packet, ParseError>> {
        self.next_frame().map(|frame| Packet::decode(&frame))
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped because the buffer overflowed
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
