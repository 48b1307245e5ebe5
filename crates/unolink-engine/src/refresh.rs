//! Periodic refresh loop
//!
//! Once per interval the loop takes a snapshot for the display and then
//! clears the per-device counters, so each snapshot shows roughly one
//! interval's worth of packets. The snapshot and the reset happen in a single
//! actor command, so no frame can slip in between them and be lost.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::actor::RegistryHandle;
use crate::error::EngineError;
use crate::events::TaskCommand;
use crate::registry::RegistrySnapshot;

/// Refresh loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Time between snapshots (ms)
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Run until shutdown, the snapshot consumer goes away, or the actor stops
///
/// Returns the number of snapshots delivered.
pub async fn run_refresh_loop(
    registry: RegistryHandle,
    config: RefreshConfig,
    snapshot_tx: mpsc::Sender<RegistrySnapshot>,
    mut cmd_rx: mpsc::Receiver<TaskCommand>,
) -> Result<u64, EngineError> {
    let period = config.interval();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; counters have had no time to fill
    ticker.tick().await;

    info!("Refresh loop started ({:?})", period);
    let mut delivered = 0u64;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TaskCommand::Shutdown) | None => {
                        info!("Shutdown requested for refresh loop");
                        break;
                    }
                }
            }

            // Tick, snapshot and delivery race the shutdown command together;
            // a consumer that stops reading must not hold the loop open
            sent = async {
                let tick = ticker.tick().await;
                let snapshot = registry.snapshot_and_reset(period, tick.into_std()).await?;
                Ok::<bool, EngineError>(snapshot_tx.send(snapshot).await.is_ok())
            } => {
                if !sent? {
                    debug!("Snapshot consumer gone; stopping refresh loop");
                    break;
                }
                delivered += 1;
            }
        }
    }

    Ok(delivered)
}
