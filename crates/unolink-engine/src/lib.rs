//! unolink Telemetry Engine
//!
//! This crate turns the raw frame stream from a unolink base station into a
//! live table of device state, one record per wearable tag.
//!
//! # Architecture
//!
//! The [`DeviceRegistry`] is plain synchronous state. At runtime it is owned
//! by a single actor task and every other task talks to it through a
//! [`RegistryHandle`]:
//!
//! - **Stream reader**: connects, sends the handshake and submits frames
//! - **REST pollers** (in `unolink-rest`): merge battery levels and the
//!   telemetry mapping
//! - **Refresh loop**: takes a snapshot for the display, then clears counters
//!
//! Failures and lifecycle changes from all tasks flow through one
//! [`EngineEvent`] channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use unolink_engine::{
//!     run_refresh_loop, run_stream_task, spawn_registry, DeviceRegistry, RefreshConfig,
//!     StreamConfig,
//! };
//! use tokio::sync::mpsc;
//!
//! # async fn demo() {
//! let (event_tx, _event_rx) = mpsc::channel(64);
//! let (registry, _actor) = spawn_registry(DeviceRegistry::new(), event_tx.clone(), 256);
//!
//! let (_stream_cmd, stream_rx) = mpsc::channel(1);
//! tokio::spawn(run_stream_task(
//!     "127.0.0.1:2281".into(),
//!     StreamConfig::default(),
//!     registry.clone(),
//!     event_tx,
//!     stream_rx,
//! ));
//!
//! let (snapshot_tx, mut snapshot_rx) = mpsc::channel(4);
//! let (_refresh_cmd, refresh_rx) = mpsc::channel(1);
//! tokio::spawn(run_refresh_loop(registry, RefreshConfig::default(), snapshot_tx, refresh_rx));
//!
//! while let Some(snapshot) = snapshot_rx.recv().await {
//!     println!("{} devices", snapshot.devices.len());
//! }
//! # }
//! ```

pub mod actor;
pub mod counter;
pub mod error;
pub mod events;
pub mod metadata;
pub mod refresh;
pub mod registry;
pub mod state;
pub mod stream;

// Re-export actor types
pub use actor::{run_registry_actor, spawn_registry, CounterReset, RegistryCommand, RegistryHandle};

// Re-export event types
pub use events::{EngineEvent, TaskCommand};

pub use counter::PacketCounter;
pub use error::{EngineError, MergeIssue, StreamError};
pub use metadata::{DeviceInfo, MappingValue, MergeReport, TelemetryMapping};
pub use refresh::{run_refresh_loop, RefreshConfig};
pub use registry::{DeviceRegistry, RegistryConfig, RegistryEvent, RegistrySnapshot, RegistryStats};
pub use state::{DeviceRecord, BATTERY_UNKNOWN};
pub use stream::{run_stream_task, StreamConfig, StreamReader, StreamSummary};
