//! Device metadata reported by the REST side of the base station
//!
//! These are the payloads merged into the registry by the pollers. They carry
//! no packet data; they only feed `slot`, `live_on` and `battery`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use unolink_protocol::RadioAddress;

use crate::error::MergeIssue;

/// One entry of the device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Radio address as hex
    pub code: String,
    /// Battery charge, e.g. `"87%"`
    #[serde(default)]
    pub batt: String,
    /// Firmware version
    #[serde(default)]
    pub fmw: String,
}

impl DeviceInfo {
    /// Parse the battery string (`"87%"`, `"87"`) into a percentage
    pub fn battery_percent(&self) -> Option<u8> {
        let value = self.batt.replacen('%', "", 1);
        value.trim().parse::<u8>().ok().filter(|pct| *pct <= 100)
    }
}

/// Value of a telemetry mapping entry
///
/// Older firmware reports a bare flag instead of a slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingValue {
    Slot(u8),
    Flag(bool),
}

impl MappingValue {
    /// Slot number, 0 when only a flag was reported
    pub fn slot(&self) -> u8 {
        match self {
            Self::Slot(slot) => *slot,
            Self::Flag(_) => 0,
        }
    }

    /// Whether the entry marks telemetry as active
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }
}

/// Device address (hex) to telemetry slot, as reported by the base station
pub type TelemetryMapping = HashMap<String, MappingValue>;

/// Outcome of a metadata merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Devices created by this merge
    pub created: Vec<RadioAddress>,
    /// Devices whose metadata was written
    pub updated: usize,
    /// Entries skipped
    pub issues: Vec<MergeIssue>,
}

impl MergeReport {
    /// Check whether every entry merged cleanly
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
