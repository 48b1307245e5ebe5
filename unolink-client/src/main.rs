//! unolink Terminal Client
//!
//! Connects to a unolink base station, follows its telemetry stream and
//! prints per-device packet counters and readings once per refresh tick.
//! Subcommands send a single REST command and exit.

mod display;
mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unolink_engine::{
    run_refresh_loop, run_stream_task, spawn_registry, DeviceRegistry, EngineEvent, TaskCommand,
};
use unolink_protocol::RadioAddress;
use unolink_rest::{run_list_poller, run_mapping_poller, PollerExit, RestClient};

use display::{Display, ViewMode};
use settings::Settings;

/// How long to wait for background tasks after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(author, version, about = "Client for unolink packet statistics")]
struct Args {
    /// Base station IP address or host name
    #[arg(short = 'H', long)]
    host: Option<String>,
    /// Port of the REST API
    #[arg(short = 'r', long)]
    rest_port: Option<u16>,
    /// Port of the stream TCP connection
    #[arg(short = 's', long)]
    stream_port: Option<u16>,
    /// Refresh interval and counter window in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Table to print on each refresh
    #[arg(long, value_enum, default_value_t = ViewMode::Alternate)]
    view: ViewMode,
    /// Follow the stream only; don't poll the REST API
    #[arg(long)]
    no_rest: bool,
    /// Show speed exactly as sent by the tags
    #[arg(long)]
    raw_speed: bool,
    /// Settings file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    save_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

/// One-shot REST commands
#[derive(Debug, Subcommand)]
enum Command {
    /// Activate the given tags
    Activate {
        #[arg(required = true)]
        devices: Vec<RadioAddress>,
    },
    /// Deactivate the given tags
    Deactivate {
        #[arg(required = true)]
        devices: Vec<RadioAddress>,
    },
    /// Power the given tags off
    Shutdown {
        #[arg(required = true)]
        devices: Vec<RadioAddress>,
    },
    /// Start telemetry on the given tags
    StartTelemetry {
        #[arg(required = true)]
        devices: Vec<RadioAddress>,
        /// VO2max to send (defaults to the configured value)
        #[arg(long)]
        vo2_max: Option<f32>,
    },
    /// Stop telemetry on a tag if it is running, start it otherwise
    ToggleTelemetry { device: RadioAddress },
    /// Stop telemetry on every tag
    StopTelemetry,
    /// Start telemetry on every tag
    TelemetryParty,
}

impl Args {
    /// Command-line flags take precedence over the settings file
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.rest_port {
            settings.rest_port = port;
        }
        if let Some(port) = self.stream_port {
            settings.stream_port = port;
        }
        if let Some(interval) = self.interval_ms {
            settings.refresh_interval_ms = interval;
        }
        if self.raw_speed {
            settings.raw_speed = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "unolink_client=info,unolink_engine=info,unolink_protocol=info,unolink_rest=info,unolink_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    args.apply(&mut settings);

    if args.save_config {
        let path = args
            .config
            .clone()
            .or_else(Settings::settings_path)
            .context("could not determine settings path")?;
        settings.save_to(&path).map_err(|e| anyhow!(e))?;
        println!("Saved settings to {}", path.display());
        return Ok(());
    }

    match args.command {
        Some(command) => run_command(command, &settings).await,
        None => run_client(settings, args.view, args.no_rest).await,
    }
}

async fn run_command(command: Command, settings: &Settings) -> Result<()> {
    let client = RestClient::new(&settings.host, settings.rest_port)?.with_vo2_max(settings.vo2_max);

    match command {
        Command::Activate { devices } => client.activate(&devices).await?,
        Command::Deactivate { devices } => client.deactivate(&devices).await?,
        Command::Shutdown { devices } => client.shutdown(&devices).await?,
        Command::StartTelemetry { devices, vo2_max } => {
            client
                .start_telemetry(&devices, vo2_max.unwrap_or(settings.vo2_max))
                .await?
        }
        Command::ToggleTelemetry { device } => {
            let mapping = client.telemetry_mapping().await?.mapping;
            let mapped = mapping
                .keys()
                .any(|code| RadioAddress::from_hex(code).ok() == Some(device));
            client.toggle_telemetry(device, mapped).await?
        }
        Command::StopTelemetry => client.stop_telemetry().await?,
        Command::TelemetryParty => client.telemetry_party().await?,
    }

    info!("Command sent");
    Ok(())
}

async fn run_client(settings: Settings, view: ViewMode, no_rest: bool) -> Result<()> {
    info!(
        "Starting unolink client for {} (stream {}, REST {})",
        settings.host,
        settings.stream_port,
        if no_rest {
            "disabled".to_string()
        } else {
            settings.rest_port.to_string()
        }
    );

    let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(256);
    let (registry, actor) = spawn_registry(
        DeviceRegistry::with_config(settings.registry_config()),
        event_tx.clone(),
        1024,
    );

    let mut task_cmds: Vec<mpsc::Sender<TaskCommand>> = Vec::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Stream reader
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        task_cmds.push(cmd_tx);
        let addr = settings.stream_addr();
        let config = settings.stream_config();
        let registry = registry.clone();
        let event_tx = event_tx.clone();
        tasks.push(tokio::spawn(async move {
            if let Ok(summary) = run_stream_task(addr, config, registry, event_tx, cmd_rx).await {
                info!("Stream reader finished after {} frames", summary.frames);
            }
        }));
    }

    // REST pollers
    if !no_rest {
        let client =
            RestClient::new(&settings.host, settings.rest_port)?.with_vo2_max(settings.vo2_max);

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        task_cmds.push(cmd_tx);
        tasks.push(tokio::spawn(log_poller_exit(run_list_poller(
            client.clone(),
            registry.clone(),
            settings.poller_config(),
            event_tx.clone(),
            cmd_rx,
        ))));

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        task_cmds.push(cmd_tx);
        tasks.push(tokio::spawn(log_poller_exit(run_mapping_poller(
            client,
            registry.clone(),
            settings.poller_config(),
            event_tx.clone(),
            cmd_rx,
        ))));
    }

    // Refresh loop
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel(4);
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        task_cmds.push(cmd_tx);
        let registry = registry.clone();
        let config = settings.refresh_config();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_refresh_loop(registry, config, snapshot_tx, cmd_rx).await {
                warn!("Refresh loop stopped: {}", e);
            }
        }));
    }
    drop(event_tx);

    let mut display = Display::new(view);
    let mut failure = None;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Could not listen for Ctrl-C: {}", e);
                }
                info!("Terminating...");
                break;
            }

            snapshot = snapshot_rx.recv() => {
                match snapshot {
                    Some(snapshot) => println!("{}", display.render(&snapshot)),
                    None => {
                        failure = Some("refresh loop stopped".to_string());
                        break;
                    }
                }
            }

            event = event_rx.recv() => {
                match event {
                    Some(event) if event.is_terminal() => {
                        error!("{:?}", event);
                        failure = Some(match event {
                            EngineEvent::StreamFailed { message } => format!("stream: {}", message),
                            EngineEvent::PollerFailed { poller, message } => {
                                format!("{} poller: {}", poller, message)
                            }
                            other => format!("{:?}", other),
                        });
                        break;
                    }
                    Some(EngineEvent::DeviceAdded { address }) => info!("New device {}", address),
                    Some(EngineEvent::StreamConnected { peer }) => info!("Streaming from {}", peer),
                    Some(EngineEvent::Error { source, message }) => warn!("{}: {}", source, message),
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    // Cooperative shutdown: tasks first, then the actor they talk to
    for cmd_tx in &task_cmds {
        let _ = cmd_tx.try_send(TaskCommand::Shutdown);
    }
    for task in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Task did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
    let _ = registry.shutdown().await;
    match tokio::time::timeout(SHUTDOWN_GRACE, actor).await {
        Ok(Ok(final_state)) => info!(
            "Stopped with {} devices, {} frames applied",
            final_state.len(),
            final_state.stats().frames
        ),
        _ => warn!("Registry actor did not stop cleanly"),
    }

    match failure {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}

async fn log_poller_exit(poller: impl std::future::Future<Output = PollerExit>) {
    match poller.await {
        PollerExit::Shutdown => {}
        PollerExit::RegistryClosed => warn!("Poller stopped: registry actor is gone"),
        PollerExit::Failed(e) => warn!("Poller stopped: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_settings() {
        let args = Args::parse_from(["unolink-client"]);
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings, Settings::default());
        assert_eq!(args.view, ViewMode::Alternate);
        assert!(!args.no_rest);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from([
            "unolink-client",
            "-H",
            "10.0.0.7",
            "-r",
            "8080",
            "-s",
            "8081",
            "--interval-ms",
            "250",
            "--view",
            "telemetry",
            "--no-rest",
        ]);
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.host, "10.0.0.7");
        assert_eq!(settings.rest_port, 8080);
        assert_eq!(settings.stream_port, 8081);
        assert_eq!(settings.refresh_interval_ms, 250);
        assert_eq!(args.view, ViewMode::Telemetry);
        assert!(args.no_rest);
    }

    #[test]
    fn test_command_parses_addresses() {
        let args = Args::parse_from(["unolink-client", "activate", "302010", "0a0b0c"]);
        match args.command {
            Some(Command::Activate { devices }) => assert_eq!(
                devices,
                vec![
                    RadioAddress::new([0x30, 0x20, 0x10]),
                    RadioAddress::new([0x0A, 0x0B, 0x0C])
                ]
            ),
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Args::try_parse_from(["unolink-client", "activate", "12345"]).is_err());
        assert!(Args::try_parse_from(["unolink-client", "shutdown"]).is_err());
    }
}
