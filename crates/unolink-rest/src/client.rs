//! HTTP client for the base station REST API
//!
//! Every endpoint is a plain `GET`. Device lists are passed as hex addresses
//! joined with `+` in the query string, which the base station reads as
//! spaces; the query is therefore built by hand instead of being
//! percent-encoded.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use unolink_protocol::RadioAddress;

use crate::error::RestError;
use crate::models::{ListDevicesResponse, TelemetryMappingResponse};

/// VO2max sent with telemetry start requests unless configured otherwise
pub const DEFAULT_VO2_MAX: f32 = 18.18;

/// Client for one base station
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    client: Client,
    vo2_max: f32,
}

impl RestClient {
    /// Client for `http://host:port`
    pub fn new(host: &str, port: u16) -> Result<Self, RestError> {
        Self::with_base_url(format!("http://{}:{}", host, port))
    }

    /// Client for an explicit base URL (no trailing slash needed)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(concat!("unolink-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RestError::Client)?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            client,
            vo2_max: DEFAULT_VO2_MAX,
        })
    }

    /// Set the VO2max used by [`toggle_telemetry`](Self::toggle_telemetry)
    pub fn with_vo2_max(mut self, vo2_max: f32) -> Self {
        self.vo2_max = vo2_max;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn vo2_max(&self) -> f32 {
        self.vo2_max
    }

    /// Fetch the device list with battery levels
    pub async fn list_devices(&self) -> Result<ListDevicesResponse, RestError> {
        self.get_json("/listDevices").await
    }

    /// Fetch the current telemetry mapping
    pub async fn telemetry_mapping(&self) -> Result<TelemetryMappingResponse, RestError> {
        self.get_json("/getTelemetryMapping").await
    }

    pub async fn activate(&self, devices: &[RadioAddress]) -> Result<(), RestError> {
        self.device_command("activate", devices).await
    }

    pub async fn deactivate(&self, devices: &[RadioAddress]) -> Result<(), RestError> {
        self.device_command("deactivate", devices).await
    }

    /// Power the given tags off
    pub async fn shutdown(&self, devices: &[RadioAddress]) -> Result<(), RestError> {
        self.device_command("shutdown", devices).await
    }

    /// Start telemetry on every given tag with the same VO2max
    pub async fn start_telemetry(
        &self,
        devices: &[RadioAddress],
        vo2_max: f32,
    ) -> Result<(), RestError> {
        let list = join_devices(devices)?;
        let vo2 = vec![vo2_max.to_string(); devices.len()].join("+");
        self.command(&format!("/startTelemetry?devices={}&VO2Max={}", list, vo2))
            .await
    }

    /// Stop telemetry on a tag that is in the mapping, start it otherwise
    pub async fn toggle_telemetry(
        &self,
        device: RadioAddress,
        mapped: bool,
    ) -> Result<(), RestError> {
        if mapped {
            self.command(&format!("/exitTelemetry?devices={}", device.to_hex()))
                .await
        } else {
            self.start_telemetry(&[device], self.vo2_max).await
        }
    }

    /// Stop telemetry on every tag
    pub async fn stop_telemetry(&self) -> Result<(), RestError> {
        self.command("/stopTelemetry").await
    }

    /// Start telemetry on every tag
    pub async fn telemetry_party(&self) -> Result<(), RestError> {
        self.command("/telemetryParty").await
    }

    async fn device_command(&self, name: &str, devices: &[RadioAddress]) -> Result<(), RestError> {
        let list = join_devices(devices)?;
        self.command(&format!("/{}?devices={}", name, list)).await
    }

    async fn command(&self, path: &str) -> Result<(), RestError> {
        info!("Sending {}", path);
        self.get(path).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let body = self.get(path).await?;
        serde_json::from_slice(&body).map_err(|source| RestError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, RestError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let transport = |source: reqwest::Error| RestError::Transport {
            endpoint: path.to_string(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

fn join_devices(devices: &[RadioAddress]) -> Result<String, RestError> {
    if devices.is_empty() {
        return Err(RestError::NoDevices);
    }
    Ok(devices
        .iter()
        .map(RadioAddress::to_hex)
        .collect::<Vec<_>>()
        .join("+"))
}
