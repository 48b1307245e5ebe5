//! Virtual wearable tag
//!
//! Holds a plausible, slowly evolving set of readings and encodes them into
//! wire frames on demand.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use unolink_protocol::{
    Cumulative, Instantaneous, OtherData1, OtherData2, OtherData3, Packet, PacketKind, Payload,
    Position, RadioAddress, FRAME_LEN,
};

/// Tick counters on the wire are 24 bits wide
const TIME_MASK: u32 = 0x00FF_FFFF;

/// A simulated tag that produces wire-accurate frames
#[derive(Debug)]
pub struct VirtualTag {
    address: RadioAddress,
    tag_id: u16,
    time: u32,
    speed_raw: u16,
    hrm: u8,
    power: f32,
    vo2: f32,
    energy: f32,
    distance: f32,
    lat: u32,
    lng: u32,
    steps: u16,
    hmld: u32,
    /// Frames waiting to be sent
    pending_output: VecDeque<[u8; FRAME_LEN]>,
}

/// Configuration for creating a virtual tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTagConfig {
    pub address: RadioAddress,
    /// Identifier reported in cumulative packets
    pub tag_id: u16,
    /// Heart rate in bpm
    pub initial_hrm: u8,
    /// Raw speed as sent on the wire
    pub initial_speed_raw: u16,
}

impl Default for VirtualTagConfig {
    fn default() -> Self {
        Self {
            address: RadioAddress::new([0x30, 0x20, 0x10]),
            tag_id: 1,
            initial_hrm: 70,
            initial_speed_raw: 2_000,
        }
    }
}

impl VirtualTag {
    /// Create a virtual tag with default readings
    pub fn new(address: RadioAddress) -> Self {
        Self::from_config(VirtualTagConfig {
            address,
            ..Default::default()
        })
    }

    /// Create a virtual tag from configuration
    pub fn from_config(config: VirtualTagConfig) -> Self {
        Self {
            address: config.address,
            tag_id: config.tag_id,
            time: 0,
            speed_raw: config.initial_speed_raw,
            hrm: config.initial_hrm,
            power: 0.0,
            vo2: 0.0,
            energy: 0.0,
            distance: 0.0,
            lat: 0,
            lng: 0,
            steps: 0,
            hmld: 0,
            pending_output: VecDeque::new(),
        }
    }

    pub fn address(&self) -> RadioAddress {
        self.address
    }

    /// Current 24-bit tick counter
    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn hrm(&self) -> u8 {
        self.hrm
    }

    pub fn set_hrm(&mut self, bpm: u8) {
        self.hrm = bpm;
    }

    pub fn speed_raw(&self) -> u16 {
        self.speed_raw
    }

    pub fn set_speed_raw(&mut self, raw: u16) {
        self.speed_raw = raw;
    }

    pub fn set_position(&mut self, lat: u32, lng: u32) {
        self.lat = lat;
        self.lng = lng;
    }

    /// Advance the simulated clock by one tick and evolve the readings
    pub fn advance(&mut self) {
        self.time = (self.time + 1) & TIME_MASK;

        let speed = f32::from(self.speed_raw) / 1000.0;
        self.distance += speed;
        self.energy += 0.1 + f32::from(self.hrm) / 1000.0;
        self.power = speed * 75.0;
        self.vo2 = f32::from(self.hrm) / 5.0;
        self.steps = self.steps.wrapping_add(2);
        if self.speed_raw > 5_000 {
            self.hmld = self.hmld.wrapping_add(1);
        }
    }

    /// Build the packet of `kind` from the current readings
    pub fn packet(&self, kind: PacketKind) -> Packet {
        let time = self.time;
        let payload = match kind {
            PacketKind::Cumulative => Payload::Cumulative(Cumulative {
                time,
                tag_id: self.tag_id,
                energy: self.energy,
                distance: self.distance,
                equiv_distance: self.distance * 1.1,
            }),
            PacketKind::Instantaneous => Payload::Instantaneous(Instantaneous {
                time,
                speed_raw: self.speed_raw,
                hrm: self.hrm,
                power: self.power,
                vo2: self.vo2,
            }),
            PacketKind::Position => Payload::Position(Position {
                time,
                lat: self.lat,
                lng: self.lng,
            }),
            PacketKind::OtherData1 => Payload::OtherData1(OtherData1 {
                time,
                pe_counter: self.steps,
                acc: 0,
                dec: 0,
                jump: 0,
                impact: 0,
            }),
            PacketKind::OtherData2 => {
                // Whole metres, split into five speed bands
                let band = self.distance as u32 / 5;
                Payload::OtherData2(OtherData2 {
                    time,
                    cum_distance: [band; 5],
                })
            }
            PacketKind::OtherData3 => Payload::OtherData3(OtherData3 {
                time,
                hmld: self.hmld,
            }),
        };

        Packet {
            address: self.address,
            payload,
        }
    }

    /// Queue one frame of `kind`
    pub fn queue(&mut self, kind: PacketKind) {
        let frame = self.packet(kind).encode();
        self.pending_output.push_back(frame);
    }

    /// Advance one tick and queue one frame of every kind
    pub fn step(&mut self) {
        self.advance();
        for kind in PacketKind::ALL {
            self.queue(kind);
        }
    }

    /// Take the next pending frame
    pub fn take_output(&mut self) -> Option<[u8; FRAME_LEN]> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }
}
