//! Per-device packet counters

use std::fmt;

use unolink_protocol::PacketKind;

/// Number of packets of each kind seen since the last reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketCounter {
    pub num_cumulative: u32,
    pub num_instantaneous: u32,
    pub num_position: u32,
    pub num_other_data1: u32,
    pub num_other_data2: u32,
    pub num_other_data3: u32,
}

impl PacketCounter {
    /// Count one packet of the given kind
    pub fn record(&mut self, kind: PacketKind) {
        let slot = match kind {
            PacketKind::Cumulative => &mut self.num_cumulative,
            PacketKind::Instantaneous => &mut self.num_instantaneous,
            PacketKind::Position => &mut self.num_position,
            PacketKind::OtherData1 => &mut self.num_other_data1,
            PacketKind::OtherData2 => &mut self.num_other_data2,
            PacketKind::OtherData3 => &mut self.num_other_data3,
        };
        *slot = slot.wrapping_add(1);
    }

    /// Count for a single kind
    pub fn get(&self, kind: PacketKind) -> u32 {
        match kind {
            PacketKind::Cumulative => self.num_cumulative,
            PacketKind::Instantaneous => self.num_instantaneous,
            PacketKind::Position => self.num_position,
            PacketKind::OtherData1 => self.num_other_data1,
            PacketKind::OtherData2 => self.num_other_data2,
            PacketKind::OtherData3 => self.num_other_data3,
        }
    }

    /// Sum of all six counters
    pub fn total(&self) -> u32 {
        PacketKind::ALL
            .iter()
            .fold(0u32, |acc, kind| acc.wrapping_add(self.get(*kind)))
    }

    /// Reset every counter to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for PacketCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CU = {}, IN = {}, PO = {}, O1 = {}, O2 = {}, O3 = {}, TOT = {}",
            self.num_cumulative,
            self.num_instantaneous,
            self.num_position,
            self.num_other_data1,
            self.num_other_data2,
            self.num_other_data3,
            self.total()
        )
    }
}
