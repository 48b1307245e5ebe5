//! Device registry
//!
//! The ordered collection of every tag seen so far, plus the logic that
//! applies decoded frames and REST metadata to it. The registry itself is
//! plain synchronous state; concurrent access goes through the actor in
//! [`crate::actor`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use unolink_protocol::{Packet, ParseError, RadioAddress, SPEED_CONVERSION_FACTOR};

use crate::error::MergeIssue;
use crate::metadata::{DeviceInfo, MergeReport, TelemetryMapping};
use crate::state::DeviceRecord;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Divisor applied to raw instantaneous speed
    pub speed_scale: f32,
    /// Create a record for frames with an unrecognized tag
    pub register_unknown_tags: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            speed_scale: SPEED_CONVERSION_FACTOR,
            register_unknown_tags: false,
        }
    }
}

impl RegistryConfig {
    /// Store speed exactly as sent by the tag
    pub fn with_raw_speed(mut self, raw: bool) -> Self {
        self.speed_scale = if raw { 1.0 } else { SPEED_CONVERSION_FACTOR };
        self
    }
}

/// Events emitted by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A record was created
    DeviceAdded(RadioAddress),
}

/// Frame statistics since the registry was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Frames applied to a record
    pub frames: u64,
    /// Frames with an unrecognized tag
    pub unknown: u64,
    /// Frames rejected before decoding
    pub malformed: u64,
}

/// Point-in-time copy of the registry for readers
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    /// Records in insertion order
    pub devices: Vec<DeviceRecord>,
    /// Time covered by the counters in `devices`
    pub counter_window: Duration,
    pub stats: RegistryStats,
}

impl RegistrySnapshot {
    /// Look up a record by address
    pub fn device(&self, addr: RadioAddress) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.address_matches(addr))
    }
}

/// The device registry
pub struct DeviceRegistry {
    config: RegistryConfig,
    devices: Vec<DeviceRecord>,
    last_reset: Instant,
    stats: RegistryStats,
    event_buffer: Vec<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            devices: Vec::new(),
            last_reset: Instant::now(),
            stats: RegistryStats::default(),
            event_buffer: Vec::new(),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Find a record by address
    pub fn find(&self, addr: RadioAddress) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.address_matches(addr))
    }

    /// Find a mutable record by address
    pub fn find_mut(&mut self, addr: RadioAddress) -> Option<&mut DeviceRecord> {
        self.devices.iter_mut().find(|d| d.address_matches(addr))
    }

    /// Append a new zeroed record
    ///
    /// Callers must check that `addr` is not already present; use
    /// [`find_or_create`](Self::find_or_create) instead.
    fn create(&mut self, addr: RadioAddress) -> &mut DeviceRecord {
        self.devices.push(DeviceRecord::new(addr));
        self.event_buffer.push(RegistryEvent::DeviceAdded(addr));
        info!("Added device {} ({} known)", addr, self.devices.len());

        let index = self.devices.len() - 1;
        &mut self.devices[index]
    }

    /// Find a record, creating it if the address is new
    pub fn find_or_create(&mut self, addr: RadioAddress) -> &mut DeviceRecord {
        match self.devices.iter().position(|d| d.address_matches(addr)) {
            Some(index) => &mut self.devices[index],
            None => self.create(addr),
        }
    }

    /// Iterate over records in insertion order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check whether no device has been seen yet
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Frame statistics
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Decode a raw frame and apply it
    ///
    /// Returns the address that was updated, `Ok(None)` for an ignored
    /// unknown tag, or the parse error for a malformed frame. The registry is
    /// untouched on error.
    pub fn apply_frame(&mut self, frame: &[u8]) -> Result<Option<RadioAddress>, ParseError> {
        match Packet::decode(frame) {
            Ok(packet) => Ok(self.apply_packet(&packet)),
            Err(e) => {
                self.stats.malformed += 1;
                Err(e)
            }
        }
    }

    /// Apply a decoded packet to its device
    pub fn apply_packet(&mut self, packet: &Packet) -> Option<RadioAddress> {
        if packet.kind().is_none() {
            self.stats.unknown += 1;
            debug!(
                "Ignoring unknown tag 0x{:02X} from {}",
                packet.tag(),
                packet.address
            );
            if self.config.register_unknown_tags {
                self.find_or_create(packet.address);
            }
            return None;
        }

        let scale = self.config.speed_scale;
        let record = self.find_or_create(packet.address);
        record.apply(&packet.payload, scale);
        self.stats.frames += 1;
        Some(packet.address)
    }

    /// Merge battery levels from the device list
    ///
    /// Unknown devices are created. Entries with a bad code or battery value
    /// are skipped and reported; the rest are still merged.
    pub fn merge_device_list(&mut self, infos: &[DeviceInfo]) -> MergeReport {
        let mut report = MergeReport::default();

        for entry in infos {
            let addr = match RadioAddress::from_hex(&entry.code) {
                Ok(addr) => addr,
                Err(source) => {
                    warn!("Skipping device with invalid code {:?}: {}", entry.code, source);
                    report.issues.push(MergeIssue::InvalidAddress {
                        code: entry.code.clone(),
                        source,
                    });
                    continue;
                }
            };

            if self.find(addr).is_none() {
                report.created.push(addr);
            }
            let record = self.find_or_create(addr);

            match entry.battery_percent() {
                Some(pct) => {
                    record.battery = pct;
                    report.updated += 1;
                }
                None => {
                    warn!("Invalid battery value {:?} for {}", entry.batt, addr);
                    report.issues.push(MergeIssue::InvalidBattery {
                        address: addr,
                        value: entry.batt.clone(),
                    });
                }
            }
        }

        report
    }

    /// Merge the telemetry mapping into `slot` and `live_on`
    ///
    /// Every known device is updated: devices missing from the mapping are
    /// marked not live. Mapping entries for unknown devices are ignored.
    ///
    /// Codes are visited in sorted order, so when two codes name the same
    /// device the first in that order wins (uppercase before lowercase) and
    /// the other is reported.
    pub fn merge_telemetry_mapping(&mut self, mapping: &TelemetryMapping) -> MergeReport {
        let mut report = MergeReport::default();
        let mut parsed = HashMap::with_capacity(mapping.len());

        let mut entries: Vec<_> = mapping.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        for (code, value) in entries {
            match RadioAddress::from_hex(code) {
                Ok(addr) if parsed.contains_key(&addr) => {
                    warn!("Skipping duplicate mapping entry {:?} for {}", code, addr);
                    report.issues.push(MergeIssue::DuplicateAddress {
                        address: addr,
                        code: code.clone(),
                    });
                }
                Ok(addr) => {
                    parsed.insert(addr, *value);
                }
                Err(source) => {
                    warn!("Skipping mapping entry with invalid code {:?}: {}", code, source);
                    report.issues.push(MergeIssue::InvalidAddress {
                        code: code.clone(),
                        source,
                    });
                }
            }
        }

        for record in &mut self.devices {
            match parsed.get(&record.address) {
                Some(value) => {
                    record.slot = value.slot();
                    record.live_on = value.is_live();
                }
                None => {
                    record.slot = 0;
                    record.live_on = false;
                }
            }
            report.updated += 1;
        }

        report
    }

    /// Clear every device's counters
    pub fn reset_counters(&mut self, now: Instant) {
        for record in &mut self.devices {
            record.counter.clear();
        }
        self.last_reset = now;
    }

    /// Clear counters if at least `interval` has passed since the last reset
    ///
    /// Returns true if the counters were cleared.
    pub fn reset_counters_if_elapsed(&mut self, interval: Duration, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_reset) < interval {
            return false;
        }
        self.reset_counters(now);
        true
    }

    /// Time since counters were last cleared
    pub fn counter_window(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_reset)
    }

    /// Deep copy of the current state
    pub fn snapshot(&self, now: Instant) -> RegistrySnapshot {
        RegistrySnapshot {
            devices: self.devices.clone(),
            counter_window: self.counter_window(now),
            stats: self.stats,
        }
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MappingValue;
    use unolink_protocol::{PacketKind, FRAME_LEN};

    fn frame(tag: u8, addr: [u8; 3]) -> [u8; FRAME_LEN] {
        let mut f = [0u8; FRAME_LEN];
        f[0] = tag;
        f[1] = addr[2];
        f[2] = addr[1];
        f[3] = addr[0];
        f
    }

    fn info(code: &str, batt: &str) -> DeviceInfo {
        DeviceInfo {
            code: code.to_string(),
            batt: batt.to_string(),
            fmw: "1.0".to_string(),
        }
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let mut registry = DeviceRegistry::new();
        let addr = RadioAddress::new([1, 2, 3]);

        registry.find_or_create(addr).hrm = 77;
        registry.find_or_create(addr);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(addr).unwrap().hrm, 77);
        assert_eq!(
            registry.drain_events(),
            vec![RegistryEvent::DeviceAdded(addr)]
        );
        assert!(registry.drain_events().is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = DeviceRegistry::new();
        for last in [9u8, 3, 5] {
            registry.apply_frame(&frame(0x23, [0, 0, last])).unwrap();
        }
        let order: Vec<u8> = registry.devices().map(|d| d.address.bytes()[2]).collect();
        assert_eq!(order, vec![9, 3, 5]);
    }

    #[test]
    fn test_apply_frame_counts_each_kind() {
        for kind in PacketKind::ALL {
            let mut registry = DeviceRegistry::new();
            let addr = registry
                .apply_frame(&frame(kind.tag(), [0xAA, 0xBB, 0xCC]))
                .unwrap()
                .unwrap();

            let counter = registry.find(addr).unwrap().counter;
            assert_eq!(counter.get(kind), 1, "{:?}", kind);
            assert_eq!(counter.total(), 1, "{:?}", kind);
        }
    }

    fn frame_with(kind: PacketKind, fields: &[(usize, &[u8])]) -> [u8; FRAME_LEN] {
        let mut f = frame(kind.tag(), [0xAA, 0xBB, 0xCC]);
        // time = 0x030201
        f[4..7].copy_from_slice(&[0x01, 0x02, 0x03]);
        for (offset, bytes) in fields {
            f[*offset..*offset + bytes.len()].copy_from_slice(bytes);
        }
        f
    }

    #[test]
    fn test_apply_frame_copies_every_field() {
        let addr = RadioAddress::new([0xAA, 0xBB, 0xCC]);
        let mut registry =
            DeviceRegistry::with_config(RegistryConfig::default().with_raw_speed(true));

        let frames = [
            frame_with(
                PacketKind::Cumulative,
                &[
                    (7, &0x1234u16.to_le_bytes()[..]),
                    (9, &12.5f32.to_le_bytes()[..]),
                    (13, &250.25f32.to_le_bytes()[..]),
                    (17, &260.75f32.to_le_bytes()[..]),
                ],
            ),
            frame_with(
                PacketKind::Instantaneous,
                &[
                    (7, &4000u16.to_le_bytes()[..]),
                    (9, &[161][..]),
                    (10, &310.5f32.to_le_bytes()[..]),
                    (14, &42.25f32.to_le_bytes()[..]),
                ],
            ),
            frame_with(
                PacketKind::Position,
                &[
                    (7, &0x0A0B_0C0Du32.to_le_bytes()[..]),
                    (11, &0x1A1B_1C1Du32.to_le_bytes()[..]),
                ],
            ),
            frame_with(
                PacketKind::OtherData1,
                &[
                    (7, &11u16.to_le_bytes()[..]),
                    (9, &22u16.to_le_bytes()[..]),
                    (11, &33u16.to_le_bytes()[..]),
                    (13, &44u16.to_le_bytes()[..]),
                    (15, &55u16.to_le_bytes()[..]),
                ],
            ),
            frame_with(
                PacketKind::OtherData2,
                &[
                    (7, &[0x01, 0x00, 0x10][..]),
                    (10, &[0x02, 0x00, 0x20][..]),
                    (13, &[0x03, 0x00, 0x30][..]),
                    (16, &[0x04, 0x00, 0x40][..]),
                    (19, &[0x05, 0x00, 0x50][..]),
                ],
            ),
            frame_with(PacketKind::OtherData3, &[(7, &[0x99, 0x88, 0x77][..])]),
        ];

        for (i, f) in frames.iter().enumerate() {
            registry.apply_frame(f).unwrap();
            let kind = PacketKind::ALL[i];
            let counter = registry.find(addr).unwrap().counter;
            assert_eq!(counter.get(kind), 1, "{:?}", kind);
            assert_eq!(counter.total(), i as u32 + 1, "{:?}", kind);
        }

        let record = registry.find(addr).unwrap();
        assert_eq!(record.time, 0x030201);

        assert_eq!(record.tag_id, 0x1234);
        assert_eq!(record.energy, 12.5);
        assert_eq!(record.distance, 250.25);
        assert_eq!(record.equiv_distance, 260.75);

        assert_eq!(record.speed, 4000.0);
        assert_eq!(record.hrm, 161);
        assert_eq!(record.power, 310.5);
        assert_eq!(record.vo2, 42.25);

        assert_eq!(record.lat, 0x0A0B_0C0D);
        assert_eq!(record.lng, 0x1A1B_1C1D);

        assert_eq!(record.pe_counter, 11);
        assert_eq!(record.acc, 22);
        assert_eq!(record.dec, 33);
        assert_eq!(record.jump, 44);
        assert_eq!(record.impact, 55);

        assert_eq!(
            record.cum_distance,
            [0x100001, 0x200002, 0x300003, 0x400004, 0x500005]
        );
        assert_eq!(record.hmld, 0x778899);
    }

    #[test]
    fn test_unknown_tag_ignored_by_default() {
        let mut registry = DeviceRegistry::new();
        let result = registry.apply_frame(&frame(0x99, [1, 2, 3])).unwrap();

        assert_eq!(result, None);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().unknown, 1);
        assert_eq!(registry.stats().frames, 0);
    }

    #[test]
    fn test_unknown_tag_registers_when_configured() {
        let mut registry = DeviceRegistry::with_config(RegistryConfig {
            register_unknown_tags: true,
            ..Default::default()
        });
        registry.apply_frame(&frame(0x99, [1, 2, 3])).unwrap();

        let record = registry.find(RadioAddress::new([1, 2, 3])).unwrap();
        assert_eq!(record.counter.total(), 0);
        assert_eq!(record.time, 0);
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let mut registry = DeviceRegistry::new();
        let err = registry.apply_frame(&[0x23, 1, 2]).unwrap_err();

        assert!(matches!(err, ParseError::FrameLength { got: 3, .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.stats().malformed, 1);
    }

    #[test]
    fn test_merge_device_list() {
        let mut registry = DeviceRegistry::new();
        registry.apply_frame(&frame(0x23, [0x30, 0x20, 0x10])).unwrap();

        let report = registry.merge_device_list(&[
            info("302010", "80%"),
            info("zzzzzz", "50%"),
            info("aabbcc", "??"),
            info("010203", "12%"),
        ]);

        assert_eq!(report.updated, 2);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(
            report.created,
            vec![
                RadioAddress::new([0xAA, 0xBB, 0xCC]),
                RadioAddress::new([1, 2, 3])
            ]
        );

        let battery = |bytes| registry.find(RadioAddress::new(bytes)).unwrap().battery;
        assert_eq!(battery([0x30, 0x20, 0x10]), 80);
        assert_eq!(battery([1, 2, 3]), 12);
        // Created even though its battery was unreadable
        assert_eq!(battery([0xAA, 0xBB, 0xCC]), crate::state::BATTERY_UNKNOWN);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_merge_telemetry_mapping() {
        let mut registry = DeviceRegistry::new();
        let a = RadioAddress::new([1, 2, 3]);
        let b = RadioAddress::new([4, 5, 6]);
        registry.find_or_create(a);
        registry.find_or_create(b).live_on = true;

        let mut mapping = TelemetryMapping::new();
        mapping.insert("010203".to_string(), MappingValue::Slot(4));
        mapping.insert("0a0b0c".to_string(), MappingValue::Slot(1));
        mapping.insert("bogus".to_string(), MappingValue::Slot(2));

        let report = registry.merge_telemetry_mapping(&mapping);

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.updated, 2);
        assert!(report.created.is_empty());

        let rec_a = registry.find(a).unwrap();
        assert!(rec_a.live_on);
        assert_eq!(rec_a.slot, 4);

        let rec_b = registry.find(b).unwrap();
        assert!(!rec_b.live_on);
        assert_eq!(rec_b.slot, 0);

        // Mapping does not create devices
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_mapping_codes_differing_in_case_are_reported() {
        let mut registry = DeviceRegistry::new();
        let a = RadioAddress::new([0x0A, 0x0B, 0x0C]);
        registry.find_or_create(a);

        let mut mapping = TelemetryMapping::new();
        mapping.insert("0a0b0c".to_string(), MappingValue::Slot(2));
        mapping.insert("0A0B0C".to_string(), MappingValue::Slot(7));

        for _ in 0..5 {
            let report = registry.merge_telemetry_mapping(&mapping);
            assert_eq!(
                report.issues,
                vec![MergeIssue::DuplicateAddress {
                    address: a,
                    code: "0a0b0c".to_string(),
                }]
            );
            assert_eq!(registry.find(a).unwrap().slot, 7);
        }
    }

    #[test]
    fn test_reset_counters_if_elapsed() {
        let mut registry = DeviceRegistry::new();
        registry.apply_frame(&frame(0x22, [1, 1, 1])).unwrap();

        let start = registry.last_reset;
        let interval = Duration::from_secs(1);

        assert!(!registry.reset_counters_if_elapsed(interval, start + Duration::from_millis(500)));
        assert_eq!(registry.devices().next().unwrap().counter.total(), 1);

        assert!(registry.reset_counters_if_elapsed(interval, start + interval));
        assert_eq!(registry.devices().next().unwrap().counter.total(), 0);

        // Window restarts from the reset instant
        assert!(!registry.reset_counters_if_elapsed(interval, start + Duration::from_millis(1500)));
        assert!(registry.reset_counters_if_elapsed(interval, start + interval * 2));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry = DeviceRegistry::new();
        registry.apply_frame(&frame(0x23, [1, 2, 3])).unwrap();

        let snapshot = registry.snapshot(Instant::now());
        registry.apply_frame(&frame(0x23, [1, 2, 3])).unwrap();

        let addr = RadioAddress::new([1, 2, 3]);
        assert_eq!(snapshot.device(addr).unwrap().counter.total(), 1);
        assert_eq!(registry.find(addr).unwrap().counter.total(), 2);
        assert_eq!(snapshot.stats.frames, 1);
    }
}
