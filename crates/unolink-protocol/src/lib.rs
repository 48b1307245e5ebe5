//! unolink Protocol Library
//!
//! This crate provides decoding and encoding for the binary telemetry stream
//! pushed by a unolink wearable-tag base station.
//!
//! # Wire Format
//!
//! After a client connects and sends [`HANDSHAKE`], the base station pushes an
//! endless sequence of fixed 22-byte frames. There is no length prefix, no
//! checksum and no delimiter; frame boundaries are implied by size alone.
//!
//! - [`address`]: 3-byte radio addresses and their hex form
//! - [`packet`]: the six known packet kinds and their typed payloads
//! - [`codec`]: reassembly of frames from an arbitrary byte stream
//!
//! # Example
//!
//! ```rust
//! use unolink_protocol::{FrameCodec, Payload, FRAME_LEN};
//!
//! let mut frame = [0u8; FRAME_LEN];
//! frame[..4].copy_from_slice(&[0x23, 0x10, 0x20, 0x30]);
//! frame[9] = 150; // heart rate
//!
//! let mut codec = FrameCodec::new();
//! codec.push_bytes(&frame);
//!
//! let packet = codec.next_packet().unwrap().unwrap();
//! assert_eq!(packet.address.to_hex(), "302010");
//! assert!(matches!(packet.payload, Payload::Instantaneous(p) if p.hrm == 150));
//! ```

pub mod address;
pub mod codec;
pub mod error;
pub mod packet;

pub use address::RadioAddress;
pub use codec::FrameCodec;
pub use error::ParseError;
pub use packet::{
    Cumulative, Instantaneous, OtherData1, OtherData2, OtherData3, Packet, PacketKind, Payload,
    Position, SPEED_CONVERSION_FACTOR,
};

/// Size of every frame on the wire
pub const FRAME_LEN: usize = 22;

/// Request line sent once after connecting to start the stream
pub const HANDSHAKE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
