//! Response bodies of the base station REST API

use serde::{Deserialize, Serialize};
use unolink_engine::{DeviceInfo, TelemetryMapping};

/// Body of `GET /listDevices`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDevicesResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub infos: Vec<DeviceInfo>,
}

/// Body of `GET /getTelemetryMapping`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMappingResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub mapping: TelemetryMapping,
}
