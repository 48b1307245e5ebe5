//! unolink REST Client
//!
//! The base station exposes a small HTTP API next to the telemetry stream.
//! This crate wraps it:
//!
//! - [`RestClient`]: typed access to every endpoint, including the device
//!   commands (activate, shutdown, telemetry start/stop)
//! - [`run_list_poller`] / [`run_mapping_poller`]: background tasks that feed
//!   battery levels and the telemetry mapping into the registry actor
//!
//! # Example
//!
//! ```rust,no_run
//! use unolink_rest::RestClient;
//! use unolink_protocol::RadioAddress;
//!
//! # async fn demo() -> Result<(), unolink_rest::RestError> {
//! let client = RestClient::new("127.0.0.1", 2280)?;
//! for info in client.list_devices().await?.infos {
//!     println!("{} {}", info.code, info.batt);
//! }
//! client.activate(&[RadioAddress::new([0x30, 0x20, 0x10])]).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod poller;

pub use client::{RestClient, DEFAULT_VO2_MAX};
pub use error::RestError;
pub use models::{ListDevicesResponse, TelemetryMappingResponse};
pub use poller::{
    run_list_poller, run_mapping_poller, PollerConfig, PollerExit, LIST_POLLER, MAPPING_POLLER,
};
