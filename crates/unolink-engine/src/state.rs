//! Device state tracking

use std::time::Instant;

use unolink_protocol::{
    Cumulative, Instantaneous, OtherData1, OtherData2, OtherData3, PacketKind, Payload, Position,
    RadioAddress,
};

use crate::counter::PacketCounter;

/// Battery value used until the REST source reports one
pub const BATTERY_UNKNOWN: u8 = 255;

/// Current state of one wearable tag
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Radio address (unique within a registry)
    pub address: RadioAddress,
    /// Telemetry slot from the mapping endpoint
    pub slot: u8,
    /// Whether the base station has telemetry enabled for this tag
    pub live_on: bool,
    /// Battery percentage, or [`BATTERY_UNKNOWN`]
    pub battery: u8,
    /// Packets received since the last counter reset
    pub counter: PacketCounter,
    /// 24-bit tick counter of the latest packet
    pub time: u32,
    pub speed: f32,
    pub hrm: u8,
    pub power: f32,
    pub vo2: f32,
    pub energy: f32,
    pub distance: f32,
    pub equiv_distance: f32,
    pub pe_counter: u16,
    pub acc: u16,
    pub dec: u16,
    pub jump: u16,
    pub impact: u16,
    pub hmld: u32,
    pub cum_distance: [u32; 5],
    pub tag_id: u16,
    pub lat: u32,
    pub lng: u32,
    /// When the last packet for this tag was applied
    pub last_packet: Option<Instant>,
}

impl DeviceRecord {
    /// Create a zeroed record for a newly seen address
    pub fn new(address: RadioAddress) -> Self {
        Self {
            address,
            slot: 0,
            live_on: false,
            battery: BATTERY_UNKNOWN,
            counter: PacketCounter::default(),
            time: 0,
            speed: 0.0,
            hrm: 0,
            power: 0.0,
            vo2: 0.0,
            energy: 0.0,
            distance: 0.0,
            equiv_distance: 0.0,
            pe_counter: 0,
            acc: 0,
            dec: 0,
            jump: 0,
            impact: 0,
            hmld: 0,
            cum_distance: [0; 5],
            tag_id: 0,
            lat: 0,
            lng: 0,
            last_packet: None,
        }
    }

    /// Check whether this record belongs to `addr`
    pub fn address_matches(&self, addr: RadioAddress) -> bool {
        self.address == addr
    }

    /// Battery percentage, `None` while unknown
    pub fn battery_percent(&self) -> Option<u8> {
        (self.battery != BATTERY_UNKNOWN).then_some(self.battery)
    }

    /// Count the packet and overwrite the fields it carries
    ///
    /// Returns the kind applied, or `None` for an unknown payload (which
    /// leaves the record untouched).
    pub fn apply(&mut self, payload: &Payload, speed_scale: f32) -> Option<PacketKind> {
        let kind = match payload {
            Payload::Cumulative(p) => {
                self.update_cumulative(p);
                PacketKind::Cumulative
            }
            Payload::Instantaneous(p) => {
                self.update_instantaneous(p, speed_scale);
                PacketKind::Instantaneous
            }
            Payload::Position(p) => {
                self.update_position(p);
                PacketKind::Position
            }
            Payload::OtherData1(p) => {
                self.update_other_data1(p);
                PacketKind::OtherData1
            }
            Payload::OtherData2(p) => {
                self.update_other_data2(p);
                PacketKind::OtherData2
            }
            Payload::OtherData3(p) => {
                self.update_other_data3(p);
                PacketKind::OtherData3
            }
            Payload::Unknown { .. } => return None,
        };

        self.counter.record(kind);
        self.last_packet = Some(Instant::now());
        Some(kind)
    }

    fn update_cumulative(&mut self, p: &Cumulative) {
        self.time = p.time;
        self.tag_id = p.tag_id;
        self.energy = p.energy;
        self.distance = p.distance;
        self.equiv_distance = p.equiv_distance;
    }

    fn update_instantaneous(&mut self, p: &Instantaneous, speed_scale: f32) {
        self.time = p.time;
        self.speed = p.speed(speed_scale);
        self.hrm = p.hrm;
        self.power = p.power;
        self.vo2 = p.vo2;
    }

    fn update_position(&mut self, p: &Position) {
        self.time = p.time;
        self.lat = p.lat;
        self.lng = p.lng;
    }

    fn update_other_data1(&mut self, p: &OtherData1) {
        self.time = p.time;
        self.pe_counter = p.pe_counter;
        self.acc = p.acc;
        self.dec = p.dec;
        self.jump = p.jump;
        self.impact = p.impact;
    }

    fn update_other_data2(&mut self, p: &OtherData2) {
        self.time = p.time;
        self.cum_distance = p.cum_distance;
    }

    fn update_other_data3(&mut self, p: &OtherData3) {
        self.time = p.time;
        self.hmld = p.hmld;
    }
}
