//! Registry Actor
//!
//! The [`DeviceRegistry`] is owned by a single task. Everything else (the
//! stream reader, the REST pollers, the refresh loop and the display) talks
//! to it through [`RegistryCommand`]s on one channel, so:
//!
//! - frames are applied strictly in arrival order
//! - a frame's fields land as one unit; no reader sees a half-updated record
//! - readers only ever get detached [`RegistrySnapshot`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use unolink_engine::{spawn_registry, DeviceRegistry};
//! use tokio::sync::mpsc;
//!
//! let (event_tx, mut event_rx) = mpsc::channel(64);
//! let (registry, actor) = spawn_registry(DeviceRegistry::new(), event_tx, 256);
//!
//! registry.submit_frame(frame).await?;
//! let snapshot = registry.snapshot().await?;
//! ```

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use unolink_protocol::{Packet, RadioAddress, FRAME_LEN};

use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::metadata::{DeviceInfo, MergeReport, TelemetryMapping};
use crate::registry::{DeviceRegistry, RegistryEvent, RegistrySnapshot};
use crate::state::DeviceRecord;

/// Age-based counter reset applied together with a snapshot
#[derive(Debug, Clone, Copy)]
pub struct CounterReset {
    /// Minimum time between resets
    pub interval: Duration,
    /// Reference instant for the age check
    pub at: Instant,
}

/// Commands sent to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Raw frame from the stream
    Frame {
        /// Exactly one frame
        data: [u8; FRAME_LEN],
    },

    /// Already decoded packet
    Packet {
        /// The packet to apply
        packet: Packet,
    },

    /// Battery levels from the device list endpoint
    MergeDeviceList {
        /// Entries to merge
        infos: Vec<DeviceInfo>,
        /// Optional channel for the merge outcome
        response: Option<oneshot::Sender<MergeReport>>,
    },

    /// Slot/live state from the telemetry mapping endpoint
    MergeTelemetryMapping {
        /// Mapping to merge
        mapping: TelemetryMapping,
        /// Optional channel for the merge outcome
        response: Option<oneshot::Sender<MergeReport>>,
    },

    /// Copy the registry, optionally resetting counters right after
    Snapshot {
        /// Reset to apply once the copy is taken
        reset: Option<CounterReset>,
        /// Channel to send back the snapshot
        response: oneshot::Sender<RegistrySnapshot>,
    },

    /// Query a single device
    QueryDevice {
        /// Address to look up
        address: RadioAddress,
        /// Channel to send back the record (or None if not found)
        response: oneshot::Sender<Option<DeviceRecord>>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Run the registry actor until shutdown or until every sender is dropped
///
/// Returns the registry so callers (mostly tests) can inspect the final state.
pub async fn run_registry_actor(
    mut registry: DeviceRegistry,
    mut cmd_rx: mpsc::Receiver<RegistryCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
) -> DeviceRegistry {
    info!("Registry actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RegistryCommand::Frame { data } => {
                if let Err(e) = registry.apply_frame(&data) {
                    debug!("Dropping frame: {}", e);
                }
            }

            RegistryCommand::Packet { packet } => {
                registry.apply_packet(&packet);
            }

            RegistryCommand::MergeDeviceList { infos, response } => {
                let report = registry.merge_device_list(&infos);
                debug!(
                    "Merged device list: {} updated, {} created, {} skipped",
                    report.updated,
                    report.created.len(),
                    report.issues.len()
                );
                if let Some(tx) = response {
                    let _ = tx.send(report);
                }
            }

            RegistryCommand::MergeTelemetryMapping { mapping, response } => {
                let report = registry.merge_telemetry_mapping(&mapping);
                if let Some(tx) = response {
                    let _ = tx.send(report);
                }
            }

            RegistryCommand::Snapshot { reset, response } => {
                let snapshot = registry.snapshot(reset.map_or_else(Instant::now, |r| r.at));
                if let Some(reset) = reset {
                    registry.reset_counters_if_elapsed(reset.interval, reset.at);
                }
                let _ = response.send(snapshot);
            }

            RegistryCommand::QueryDevice { address, response } => {
                let _ = response.send(registry.find(address).cloned());
            }

            RegistryCommand::Shutdown => {
                info!("Shutdown requested for registry actor");
                break;
            }
        }

        forward_events(&mut registry, &event_tx);
    }

    info!(
        "Registry actor stopped ({} devices, {} frames)",
        registry.len(),
        registry.stats().frames
    );
    registry
}

/// Publish registry events without blocking the actor on a slow consumer
fn forward_events(registry: &mut DeviceRegistry, event_tx: &mpsc::Sender<EngineEvent>) {
    for event in registry.drain_events() {
        let event = match event {
            RegistryEvent::DeviceAdded(address) => EngineEvent::DeviceAdded { address },
        };
        if let Err(e) = event_tx.try_send(event) {
            debug!("Event not delivered: {}", e);
        }
    }
}

/// Spawn the registry actor on the current runtime
pub fn spawn_registry(
    registry: DeviceRegistry,
    event_tx: mpsc::Sender<EngineEvent>,
    buffer: usize,
) -> (RegistryHandle, JoinHandle<DeviceRegistry>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
    let task = tokio::spawn(run_registry_actor(registry, cmd_rx, event_tx));
    (RegistryHandle::new(cmd_tx), task)
}

/// Cloneable handle for talking to the registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Wrap an existing command sender
    pub fn new(tx: mpsc::Sender<RegistryCommand>) -> Self {
        Self { tx }
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), EngineError> {
        self.tx.send(cmd).await.map_err(|_| EngineError::ActorClosed)
    }

    /// Queue a raw frame
    pub async fn submit_frame(&self, data: [u8; FRAME_LEN]) -> Result<(), EngineError> {
        self.send(RegistryCommand::Frame { data }).await
    }

    /// Queue a decoded packet
    pub async fn submit_packet(&self, packet: Packet) -> Result<(), EngineError> {
        self.send(RegistryCommand::Packet { packet }).await
    }

    /// Merge a device list and wait for the outcome
    pub async fn merge_device_list(
        &self,
        infos: Vec<DeviceInfo>,
    ) -> Result<MergeReport, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryCommand::MergeDeviceList {
            infos,
            response: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| EngineError::ActorClosed)
    }

    /// Merge a telemetry mapping and wait for the outcome
    pub async fn merge_telemetry_mapping(
        &self,
        mapping: TelemetryMapping,
    ) -> Result<MergeReport, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryCommand::MergeTelemetryMapping {
            mapping,
            response: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| EngineError::ActorClosed)
    }

    /// Copy the current state
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, EngineError> {
        self.request_snapshot(None).await
    }

    /// Copy the current state, then clear counters older than `interval`
    pub async fn snapshot_and_reset(
        &self,
        interval: Duration,
        at: Instant,
    ) -> Result<RegistrySnapshot, EngineError> {
        self.request_snapshot(Some(CounterReset { interval, at }))
            .await
    }

    async fn request_snapshot(
        &self,
        reset: Option<CounterReset>,
    ) -> Result<RegistrySnapshot, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot {
            reset,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ActorClosed)
    }

    /// Look up one device
    pub async fn device(&self, address: RadioAddress) -> Result<Option<DeviceRecord>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryCommand::QueryDevice {
            address,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ActorClosed)
    }

    /// Ask the actor to stop
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(RegistryCommand::Shutdown).await
    }

    /// Check whether the actor is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
