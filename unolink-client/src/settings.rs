//! Client settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use unolink_engine::{RefreshConfig, RegistryConfig, StreamConfig};
use unolink_rest::{PollerConfig, DEFAULT_VO2_MAX};

/// Client settings, stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Base station host name or IP
    pub host: String,
    /// Port of the REST API
    pub rest_port: u16,
    /// Port of the telemetry stream
    pub stream_port: u16,
    /// Display refresh and counter window (ms)
    pub refresh_interval_ms: u64,
    /// Time between REST polls (ms)
    pub poll_interval_ms: u64,
    /// Upper bound on a single stream read (ms)
    pub read_timeout_ms: u64,
    /// Upper bound on the stream dial (ms)
    pub connect_timeout_ms: u64,
    /// Show speed exactly as sent by the tags
    pub raw_speed: bool,
    /// Create records for frames with an unrecognized tag
    pub register_unknown_tags: bool,
    /// VO2max sent when starting telemetry
    pub vo2_max: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            rest_port: 2280,
            stream_port: 2281,
            refresh_interval_ms: 1000,
            poll_interval_ms: 1000,
            read_timeout_ms: 1000,
            connect_timeout_ms: 5000,
            raw_speed: false,
            register_unknown_tags: false,
            vo2_max: DEFAULT_VO2_MAX,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for unolink-client
    /// Uses $XDG_CONFIG_HOME/unolink-client, falls back to ~/.config/unolink-client
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("unolink-client"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("unolink-client"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`
    ///
    /// A missing file gives the defaults silently; an unreadable or malformed
    /// one gives the defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Could not read settings from {}: {}", path.display(), e);
                return Self::default();
            }
        };

        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring malformed settings in {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }

    /// `host:port` of the telemetry stream
    pub fn stream_addr(&self) -> String {
        format!("{}:{}", self.host, self.stream_port)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            register_unknown_tags: self.register_unknown_tags,
            ..Default::default()
        }
        .with_raw_speed(self.raw_speed)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            read_timeout_ms: self.read_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            ..Default::default()
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval_ms: self.refresh_interval_ms,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}
