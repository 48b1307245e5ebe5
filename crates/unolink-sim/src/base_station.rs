//! Virtual base station task
//!
//! This module provides an async task that plays the base station side of a
//! telemetry stream connection. The task uses a select! loop to:
//! - Wait for the client's request line before sending anything
//! - Push one frame of every kind for every tag on each tick
//! - Handle commands (raw writes, streaming on/off, shutdown) from a channel
//! - Emit progress events via a broadcast channel

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::VirtualTag;

/// Request lines longer than this are rejected
const MAX_REQUEST_LEN: usize = 1024;

/// Commands that can be sent to a virtual base station task
#[derive(Debug)]
pub enum BaseStationCommand {
    /// Write bytes verbatim (partial frames, garbage, ...)
    SendRaw(Vec<u8>),
    /// Start simulating another tag
    AddTag(VirtualTag),
    /// Enable or disable periodic frames
    SetStreaming(bool),
    /// Close the connection and stop
    Shutdown,
}

/// Progress reported by a virtual base station
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseStationEvent {
    /// The client sent its request line
    HandshakeReceived {
        /// Request text without the trailing blank line
        request: String,
    },
    /// A batch of frames was written
    FramesSent {
        /// Frames in this batch
        count: usize,
    },
}

/// Configuration for a virtual base station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStationConfig {
    /// Time between frame batches (ms)
    pub frame_interval_ms: u64,
    /// Send frames from the start
    pub streaming: bool,
}

impl Default for BaseStationConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            streaming: true,
        }
    }
}

/// Run the virtual base station task on an accepted connection
///
/// Nothing is written before the request line arrives. The task ends when
/// the client disconnects, on [`BaseStationCommand::Shutdown`], or when the
/// command channel is dropped.
pub async fn run_base_station_task<S>(
    mut stream: S,
    mut tags: Vec<VirtualTag>,
    config: BaseStationConfig,
    mut cmd_rx: mpsc::Receiver<BaseStationCommand>,
    event_tx: broadcast::Sender<BaseStationEvent>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("Starting virtual base station with {} tags", tags.len());

    let Some((request, deferred)) = read_request(&mut stream, &mut cmd_rx).await? else {
        info!("Virtual base station stopped before handshake");
        return Ok(());
    };
    debug!("Virtual base station got request {:?}", request);
    let _ = event_tx.send(BaseStationEvent::HandshakeReceived { request });

    let mut streaming = config.streaming;
    for cmd in deferred {
        apply_command(cmd, &mut stream, &mut tags, &mut streaming).await?;
    }

    let mut ticker = interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            // Anything after the handshake is ignored; only EOF matters
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Client closed virtual base station connection");
                        break;
                    }
                    Ok(n) => debug!("Ignoring {} bytes from client", n),
                    Err(e) => {
                        warn!("Virtual base station read error: {}", e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BaseStationCommand::Shutdown) => {
                        info!("Shutdown requested for virtual base station");
                        break;
                    }
                    Some(cmd) => apply_command(cmd, &mut stream, &mut tags, &mut streaming).await?,
                    None => {
                        debug!("Command channel closed for virtual base station");
                        break;
                    }
                }
            }

            _ = ticker.tick(), if streaming => {
                let mut batch = Vec::new();
                for tag in &mut tags {
                    tag.step();
                    while let Some(frame) = tag.take_output() {
                        batch.extend_from_slice(&frame);
                    }
                }
                if !batch.is_empty() {
                    stream.write_all(&batch).await?;
                    stream.flush().await?;
                    let count = batch.len() / unolink_protocol::FRAME_LEN;
                    let _ = event_tx.send(BaseStationEvent::FramesSent { count });
                }
            }
        }
    }

    let _ = stream.shutdown().await;
    info!("Virtual base station task ended");
    Ok(())
}

async fn apply_command<S>(
    cmd: BaseStationCommand,
    stream: &mut S,
    tags: &mut Vec<VirtualTag>,
    streaming: &mut bool,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match cmd {
        BaseStationCommand::SendRaw(bytes) => {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
        }
        BaseStationCommand::AddTag(tag) => {
            info!("Virtual base station added tag {}", tag.address());
            tags.push(tag);
        }
        BaseStationCommand::SetStreaming(enabled) => {
            info!("Virtual base station streaming set to {}", enabled);
            *streaming = enabled;
        }
        BaseStationCommand::Shutdown => {}
    }
    Ok(())
}

/// Read until the blank line that ends the request
///
/// Commands that arrive first are held back and returned with the request.
/// Returns `None` if shutdown was requested first.
async fn read_request<S>(
    stream: &mut S,
    cmd_rx: &mut mpsc::Receiver<BaseStationCommand>,
) -> io::Result<Option<(String, Vec<BaseStationCommand>)>>
where
    S: AsyncRead + Unpin,
{
    let mut request = Vec::new();
    let mut deferred = Vec::new();
    let mut buf = [0u8; 128];

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                let n = result?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "client closed before sending a request",
                    ));
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = find_blank_line(&request) {
                    let text = String::from_utf8_lossy(&request[..end]).into_owned();
                    return Ok(Some((text, deferred)));
                }
                if request.len() > MAX_REQUEST_LEN {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "request too long"));
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BaseStationCommand::Shutdown) | None => return Ok(None),
                    Some(other) => deferred.push(other),
                }
            }
        }
    }
}

fn find_blank_line(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Accept a single client on `listener` and serve it
pub async fn serve_once(
    listener: TcpListener,
    tags: Vec<VirtualTag>,
    config: BaseStationConfig,
    cmd_rx: mpsc::Receiver<BaseStationCommand>,
    event_tx: broadcast::Sender<BaseStationEvent>,
) -> io::Result<SocketAddr> {
    let (stream, peer) = listener.accept().await?;
    info!("Virtual base station accepted {}", peer);
    stream.set_nodelay(true)?;
    run_base_station_task(stream, tags, config, cmd_rx, event_tx).await?;
    Ok(peer)
}
