//! Metadata pollers
//!
//! Two independent tasks keep the registry's externally sourced fields
//! current: one merges battery levels from `/listDevices`, the other merges
//! slots and live flags from `/getTelemetryMapping`. Each poll result is
//! forwarded to the registry actor as a single merge command.
//!
//! A transport failure (base station unreachable) ends the poller and is
//! reported as [`EngineEvent::PollerFailed`]. Bad status codes and bodies
//! that fail to decode are logged and retried on the next poll.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use unolink_engine::{EngineEvent, RegistryHandle, TaskCommand};

use crate::client::RestClient;
use crate::error::RestError;

/// Name reported for the device list poller
pub const LIST_POLLER: &str = "list";
/// Name reported for the telemetry mapping poller
pub const MAPPING_POLLER: &str = "mapping";

/// Poller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between requests (ms)
    pub poll_interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Why a poller stopped
#[derive(Debug)]
pub enum PollerExit {
    /// Shutdown was requested or the command channel closed
    Shutdown,
    /// The registry actor stopped
    RegistryClosed,
    /// The base station could not be reached
    Failed(RestError),
}

/// Poll `/listDevices` and merge battery levels until stopped
pub async fn run_list_poller(
    client: RestClient,
    registry: RegistryHandle,
    config: PollerConfig,
    event_tx: mpsc::Sender<EngineEvent>,
    cmd_rx: mpsc::Receiver<TaskCommand>,
) -> PollerExit {
    let (client, registry) = (&client, &registry);
    run_poller(LIST_POLLER, config, event_tx, cmd_rx, move || async move {
        let response = client.list_devices().await?;
        Ok(registry.merge_device_list(response.infos).await.is_ok())
    })
    .await
}

/// Poll `/getTelemetryMapping` and merge slots until stopped
pub async fn run_mapping_poller(
    client: RestClient,
    registry: RegistryHandle,
    config: PollerConfig,
    event_tx: mpsc::Sender<EngineEvent>,
    cmd_rx: mpsc::Receiver<TaskCommand>,
) -> PollerExit {
    let (client, registry) = (&client, &registry);
    run_poller(MAPPING_POLLER, config, event_tx, cmd_rx, move || async move {
        let response = client.telemetry_mapping().await?;
        Ok(registry
            .merge_telemetry_mapping(response.mapping)
            .await
            .is_ok())
    })
    .await
}

/// Shared poll loop
///
/// `poll` returns `Ok(false)` when the registry actor is gone.
async fn run_poller<F, Fut>(
    name: &'static str,
    config: PollerConfig,
    event_tx: mpsc::Sender<EngineEvent>,
    mut cmd_rx: mpsc::Receiver<TaskCommand>,
    mut poll: F,
) -> PollerExit
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, RestError>>,
{
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Starting {} poller ({:?})", name, config.poll_interval());

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TaskCommand::Shutdown) | None => {
                        info!("Shutdown requested for {} poller", name);
                        return PollerExit::Shutdown;
                    }
                }
            }

            // The request is part of the arm's future so a shutdown drops it mid-flight
            polled = async {
                ticker.tick().await;
                poll().await
            } => {
                match polled {
                    Ok(true) => debug!("{} poll merged", name),
                    Ok(false) => {
                        debug!("Registry gone; stopping {} poller", name);
                        return PollerExit::RegistryClosed;
                    }
                    Err(e) if e.is_transport() => {
                        warn!("{} poller stopped: {}", name, e);
                        let _ = event_tx
                            .send(EngineEvent::PollerFailed {
                                poller: name.to_string(),
                                message: e.to_string(),
                            })
                            .await;
                        return PollerExit::Failed(e);
                    }
                    Err(e) => {
                        warn!("{} poll skipped: {}", name, e);
                        let _ = event_tx.try_send(EngineEvent::Error {
                            source: format!("{} poller", name),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}
