//! unolink Simulation Library
//!
//! This crate provides a simulation layer for exercising the telemetry
//! client without a physical base station. It includes:
//!
//! - **VirtualTag**: Simulates a wearable tag with wire-accurate frame output
//! - **Base station task**: Serves the stream protocol to one client
//!
//! # Example
//!
//! ```rust
//! use unolink_sim::VirtualTag;
//! use unolink_protocol::{Packet, RadioAddress};
//!
//! let mut tag = VirtualTag::new(RadioAddress::new([0x30, 0x20, 0x10]));
//! tag.set_hrm(128);
//! tag.step();
//!
//! while let Some(frame) = tag.take_output() {
//!     let packet = Packet::decode(&frame).unwrap();
//!     println!("{:?}", packet.kind());
//! }
//! ```

pub mod base_station;
pub mod tag;

pub use base_station::{
    run_base_station_task, serve_once, BaseStationCommand, BaseStationConfig, BaseStationEvent,
};
pub use tag::{VirtualTag, VirtualTagConfig};
