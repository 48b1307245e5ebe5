//! Telemetry stream reader
//!
//! Owns the TCP connection to the base station. After connecting it sends the
//! one-shot [`HANDSHAKE`] request line and then reads forever, reassembling
//! 22-byte frames and handing each one to the registry actor in arrival
//! order.
//!
//! ## Read errors
//!
//! - a read that times out means "no data yet" and the loop continues; any
//!   partial frame stays buffered in the codec
//! - `WouldBlock` and `Interrupted` are retried
//! - EOF, resets and every other I/O error end the loop

use std::io::ErrorKind;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use unolink_protocol::{FrameCodec, HANDSHAKE};

use crate::actor::RegistryHandle;
use crate::error::StreamError;
use crate::events::{EngineEvent, TaskCommand};

/// Stream reader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Upper bound on a single read (ms)
    pub read_timeout_ms: u64,
    /// Upper bound on the TCP dial (ms)
    pub connect_timeout_ms: u64,
    /// Size of the socket read buffer
    pub read_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            connect_timeout_ms: 5000,
            read_buffer_size: 1024,
        }
    }
}

impl StreamConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Outcome of a reader that stopped on request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Frames handed to the registry
    pub frames: u64,
}

/// Reader for one base station connection
///
/// Generic over the I/O type so tests can drive it with an in-memory duplex
/// stream.
pub struct StreamReader<T> {
    peer: String,
    io: T,
    codec: FrameCodec,
    registry: RegistryHandle,
    buffer: Vec<u8>,
    read_timeout: Duration,
    frames: u64,
}

impl StreamReader<TcpStream> {
    /// Dial the base station and send the handshake
    pub async fn connect(
        addr: &str,
        config: &StreamConfig,
        registry: RegistryHandle,
    ) -> Result<Self, StreamError> {
        info!("Connecting to telemetry stream at {}", addr);

        let stream = match tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(StreamError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(StreamError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout: config.connect_timeout(),
                })
            }
        };

        // Frames are tiny; don't let Nagle batch the handshake
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", addr, e);
        }

        let mut reader = Self::new(addr.to_string(), stream, config, registry);
        reader.handshake().await?;
        Ok(reader)
    }

    /// Address of the connected base station
    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.io.peer_addr()
    }
}

impl<T> StreamReader<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected I/O object
    ///
    /// The handshake is not sent; call [`handshake`](Self::handshake).
    pub fn new(peer: String, io: T, config: &StreamConfig, registry: RegistryHandle) -> Self {
        Self {
            peer,
            io,
            codec: FrameCodec::new(),
            registry,
            buffer: vec![0u8; config.read_buffer_size.max(1)],
            read_timeout: config.read_timeout(),
            frames: 0,
        }
    }

    /// Send the request line that starts the stream
    pub async fn handshake(&mut self) -> Result<(), StreamError> {
        self.io
            .write_all(HANDSHAKE)
            .await
            .map_err(StreamError::Handshake)?;
        self.io.flush().await.map_err(StreamError::Handshake)?;
        debug!("Sent stream handshake to {}", self.peer);
        Ok(())
    }

    /// Main read loop - runs until the connection fails or shutdown is requested
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<TaskCommand>,
    ) -> Result<StreamSummary, StreamError> {
        info!("Starting read loop for {}", self.peer);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(TaskCommand::Shutdown) | None => {
                            info!("Shutdown requested for stream {}", self.peer);
                            break;
                        }
                    }
                }

                result = tokio::time::timeout(self.read_timeout, self.io.read(&mut self.buffer)) => {
                    match result {
                        Ok(Ok(0)) => {
                            warn!("Stream {} closed by peer after {} frames", self.peer, self.frames);
                            return Err(StreamError::Closed);
                        }
                        Ok(Ok(n)) => {
                            trace!("Read {} bytes from {}", n, self.peer);
                            self.codec.push_bytes(&self.buffer[..n]);
                            self.dispatch_frames().await?;
                        }
                        Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                            continue;
                        }
                        Ok(Err(e)) => {
                            warn!("Read error on {}: {}", self.peer, e);
                            return Err(StreamError::Io(e));
                        }
                        Err(_) => {
                            trace!("No data from {} within {:?}", self.peer, self.read_timeout);
                        }
                    }
                }
            }
        }

        info!("Read loop ended for {} ({} frames)", self.peer, self.frames);
        Ok(StreamSummary {
            frames: self.frames,
        })
    }

    async fn dispatch_frames(&mut self) -> Result<(), StreamError> {
        while let Some(frame) = self.codec.next_frame() {
            self.registry
                .submit_frame(frame)
                .await
                .map_err(|_| StreamError::ActorClosed)?;
            self.frames += 1;
        }
        Ok(())
    }
}

/// Connect, run the read loop and report a terminal failure as an event
pub async fn run_stream_task(
    addr: String,
    config: StreamConfig,
    registry: RegistryHandle,
    event_tx: mpsc::Sender<EngineEvent>,
    cmd_rx: mpsc::Receiver<TaskCommand>,
) -> Result<StreamSummary, StreamError> {
    let result = match StreamReader::connect(&addr, &config, registry).await {
        Ok(reader) => {
            if let Ok(peer) = reader.peer_addr() {
                let _ = event_tx.send(EngineEvent::StreamConnected { peer }).await;
            }
            reader.run(cmd_rx).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        warn!("Telemetry stream stopped: {}", e);
        let _ = event_tx
            .send(EngineEvent::StreamFailed {
                message: e.to_string(),
            })
            .await;
    }

    result
}
