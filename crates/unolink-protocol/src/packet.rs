//! Telemetry packet decoding
//!
//! Every frame is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! [tag] [addr2] [addr1] [addr0] [time0 time1 time2] [payload ...]
//! ```
//!
//! - `tag`: packet type (see [`PacketKind`])
//! - `addr`: radio address, reversed on the wire
//! - `time`: 24-bit little-endian tick counter
//! - `payload`: type-specific, all multi-byte fields little-endian
//!
//! Unknown tags are preserved as [`Payload::Unknown`] so callers can decide
//! whether to act on them.

use crate::address::RadioAddress;
use crate::error::ParseError;
use crate::FRAME_LEN;

/// Divisor applied to the raw instantaneous speed field
pub const SPEED_CONVERSION_FACTOR: f32 = 1.94384 * 1000.0;

/// Offset of the 24-bit time field shared by all known packet kinds
const TIME_OFFSET: usize = 4;

/// Known packet types, keyed by their tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketKind {
    /// Cumulative energy and distance (0x22)
    Cumulative = 0x22,
    /// Instantaneous speed, heart rate, power and VO2 (0x23)
    Instantaneous = 0x23,
    /// GPS position (0x24)
    Position = 0x24,
    /// Acceleration and impact counters (0x28)
    OtherData1 = 0x28,
    /// Cumulative distance buckets (0x2B)
    OtherData2 = 0x2B,
    /// High metabolic load distance (0x2C)
    OtherData3 = 0x2C,
}

impl PacketKind {
    /// All known kinds in tag order
    pub const ALL: [PacketKind; 6] = [
        PacketKind::Cumulative,
        PacketKind::Instantaneous,
        PacketKind::Position,
        PacketKind::OtherData1,
        PacketKind::OtherData2,
        PacketKind::OtherData3,
    ];

    /// Look up a kind by tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x22 => Some(Self::Cumulative),
            0x23 => Some(Self::Instantaneous),
            0x24 => Some(Self::Position),
            0x28 => Some(Self::OtherData1),
            0x2B => Some(Self::OtherData2),
            0x2C => Some(Self::OtherData3),
            _ => None,
        }
    }

    /// Tag byte for this kind
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Short column label used by displays
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Cumulative => "CU",
            Self::Instantaneous => "IN",
            Self::Position => "PO",
            Self::OtherData1 => "O1",
            Self::OtherData2 => "O2",
            Self::OtherData3 => "O3",
        }
    }
}

/// Cumulative energy/distance report
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cumulative {
    pub time: u32,
    pub tag_id: u16,
    pub energy: f32,
    pub distance: f32,
    pub equiv_distance: f32,
}

/// Instantaneous physiological report
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Instantaneous {
    pub time: u32,
    /// Raw speed as sent by the tag
    pub speed_raw: u16,
    /// Heart rate in beats per minute
    pub hrm: u8,
    pub power: f32,
    pub vo2: f32,
}

impl Instantaneous {
    /// Speed divided by the given scale factor
    pub fn speed(&self, scale: f32) -> f32 {
        f32::from(self.speed_raw) / scale
    }
}

/// GPS position report (raw fixed-point coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub time: u32,
    pub lat: u32,
    pub lng: u32,
}

/// Acceleration, deceleration, jump and impact counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherData1 {
    pub time: u32,
    pub pe_counter: u16,
    pub acc: u16,
    pub dec: u16,
    pub jump: u16,
    pub impact: u16,
}

/// Five cumulative distance buckets (24-bit each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherData2 {
    pub time: u32,
    pub cum_distance: [u32; 5],
}

/// High metabolic load distance (24-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherData3 {
    pub time: u32,
    pub hmld: u32,
}

/// Decoded payload of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Cumulative(Cumulative),
    Instantaneous(Instantaneous),
    Position(Position),
    OtherData1(OtherData1),
    OtherData2(OtherData2),
    OtherData3(OtherData3),
    /// Unrecognized tag (preserves the raw frame)
    Unknown { tag: u8, raw: [u8; FRAME_LEN] },
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Device the frame belongs to
    pub address: RadioAddress,
    pub payload: Payload,
}

impl Packet {
    /// Decode a single frame
    ///
    /// Fails only if the slice is not exactly [`FRAME_LEN`] bytes long.
    pub fn decode(frame: &[u8]) -> Result<Self, ParseError> {
        let frame: &[u8; FRAME_LEN] = frame.try_into().map_err(|_| ParseError::FrameLength {
            expected: FRAME_LEN,
            got: frame.len(),
        })?;

        let address = RadioAddress::from_frame(frame);
        let time = le_u24(frame, TIME_OFFSET);

        let payload = match PacketKind::from_tag(frame[0]) {
            Some(PacketKind::Cumulative) => Payload::Cumulative(Cumulative {
                time,
                tag_id: le_u16(frame, 7),
                energy: le_f32(frame, 9),
                distance: le_f32(frame, 13),
                equiv_distance: le_f32(frame, 17),
            }),
            Some(PacketKind::Instantaneous) => Payload::Instantaneous(Instantaneous {
                time,
                speed_raw: le_u16(frame, 7),
                hrm: frame[9],
                power: le_f32(frame, 10),
                vo2: le_f32(frame, 14),
            }),
            Some(PacketKind::Position) => Payload::Position(Position {
                time,
                lat: le_u32(frame, 7),
                lng: le_u32(frame, 11),
            }),
            Some(PacketKind::OtherData1) => Payload::OtherData1(OtherData1 {
                time,
                pe_counter: le_u16(frame, 7),
                acc: le_u16(frame, 9),
                dec: le_u16(frame, 11),
                jump: le_u16(frame, 13),
                impact: le_u16(frame, 15),
            }),
            Some(PacketKind::OtherData2) => Payload::OtherData2(OtherData2 {
                time,
                cum_distance: [
                    le_u24(frame, 7),
                    le_u24(frame, 10),
                    le_u24(frame, 13),
                    le_u24(frame, 16),
                    le_u24(frame, 19),
                ],
            }),
            Some(PacketKind::OtherData3) => Payload::OtherData3(OtherData3 {
                time,
                hmld: le_u24(frame, 7),
            }),
            None => Payload::Unknown {
                tag: frame[0],
                raw: *frame,
            },
        };

        Ok(Self { address, payload })
    }

    /// Packet kind, or `None` for an unrecognized tag
    pub fn kind(&self) -> Option<PacketKind> {
        match self.payload {
            Payload::Cumulative(_) => Some(PacketKind::Cumulative),
            Payload::Instantaneous(_) => Some(PacketKind::Instantaneous),
            Payload::Position(_) => Some(PacketKind::Position),
            Payload::OtherData1(_) => Some(PacketKind::OtherData1),
            Payload::OtherData2(_) => Some(PacketKind::OtherData2),
            Payload::OtherData3(_) => Some(PacketKind::OtherData3),
            Payload::Unknown { .. } => None,
        }
    }

    /// Tag byte of the frame this packet came from
    pub fn tag(&self) -> u8 {
        match &self.payload {
            Payload::Unknown { tag, .. } => *tag,
            _ => self.kind().map(|k| k.tag()).unwrap_or_default(),
        }
    }

    /// Encode back to wire format
    ///
    /// 24-bit fields are truncated to their low three bytes.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        if let Payload::Unknown { raw, .. } = &self.payload {
            let mut frame = *raw;
            self.address.write_frame(&mut frame);
            return frame;
        }

        let mut frame = [0u8; FRAME_LEN];
        frame[0] = self.tag();
        self.address.write_frame(&mut frame);

        match &self.payload {
            Payload::Cumulative(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                put(&mut frame, 7, &p.tag_id.to_le_bytes());
                put(&mut frame, 9, &p.energy.to_le_bytes());
                put(&mut frame, 13, &p.distance.to_le_bytes());
                put(&mut frame, 17, &p.equiv_distance.to_le_bytes());
            }
            Payload::Instantaneous(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                put(&mut frame, 7, &p.speed_raw.to_le_bytes());
                frame[9] = p.hrm;
                put(&mut frame, 10, &p.power.to_le_bytes());
                put(&mut frame, 14, &p.vo2.to_le_bytes());
            }
            Payload::Position(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                put(&mut frame, 7, &p.lat.to_le_bytes());
                put(&mut frame, 11, &p.lng.to_le_bytes());
            }
            Payload::OtherData1(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                put(&mut frame, 7, &p.pe_counter.to_le_bytes());
                put(&mut frame, 9, &p.acc.to_le_bytes());
                put(&mut frame, 11, &p.dec.to_le_bytes());
                put(&mut frame, 13, &p.jump.to_le_bytes());
                put(&mut frame, 15, &p.impact.to_le_bytes());
            }
            Payload::OtherData2(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                for (i, value) in p.cum_distance.iter().enumerate() {
                    put_u24(&mut frame, 7 + i * 3, *value);
                }
            }
            Payload::OtherData3(p) => {
                put_u24(&mut frame, TIME_OFFSET, p.time);
                put_u24(&mut frame, 7, p.hmld);
            }
            Payload::Unknown { .. } => {}
        }

        frame
    }
}

fn le_u16(frame: &[u8; FRAME_LEN], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

/// 24-bit little-endian value with the missing high byte treated as zero
fn le_u24(frame: &[u8; FRAME_LEN], offset: usize) -> u32 {
    u32::from_le_bytes([frame[offset], frame[offset + 1], frame[offset + 2], 0])
}

fn le_u32(frame: &[u8; FRAME_LEN], offset: usize) -> u32 {
    u32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

fn le_f32(frame: &[u8; FRAME_LEN], offset: usize) -> f32 {
    f32::from_bits(le_u32(frame, offset))
}

fn put(frame: &mut [u8; FRAME_LEN], offset: usize, bytes: &[u8]) {
    frame[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put_u24(frame: &mut [u8; FRAME_LEN], offset: usize, value: u32) {
    put(frame, offset, &value.to_le_bytes()[..3]);
}
