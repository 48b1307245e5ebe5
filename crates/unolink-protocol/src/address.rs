//! Radio addresses
//!
//! Every tag is identified by a 3-byte radio address. On the wire the address
//! occupies frame bytes 1..4 in reverse order, so frame `[tag, 0x10, 0x20, 0x30, ..]`
//! belongs to address `302010`.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Number of bytes in a radio address
pub const ADDRESS_LEN: usize = 3;

/// 3-byte identifier of a wearable tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct RadioAddress([u8; ADDRESS_LEN]);

impl RadioAddress {
    /// Create an address from bytes in display order
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Extract the address from frame bytes 3, 2, 1
    ///
    /// The caller guarantees `frame.len() >= 4`.
    pub(crate) fn from_frame(frame: &[u8]) -> Self {
        Self([frame[3], frame[2], frame[1]])
    }

    /// Write the address into frame bytes 1..4 (wire order)
    pub(crate) fn write_frame(&self, frame: &mut [u8]) {
        frame[1] = self.0[2];
        frame[2] = self.0[1];
        frame[3] = self.0[0];
    }

    /// Raw bytes in display order
    pub fn bytes(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }

    /// Fixed-width uppercase hex form, e.g. `"302010"`
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }

    /// Parse the six-digit hex form (either case)
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.len() != ADDRESS_LEN * 2 {
            return Err(ParseError::AddressLength(s.len()));
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = s
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| ParseError::AddressDigits(s.to_string()))?;
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| ParseError::AddressDigits(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for RadioAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for RadioAddress {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<RadioAddress> for String {
    fn from(addr: RadioAddress) -> Self {
        addr.to_hex()
    }
}

impl From<[u8; ADDRESS_LEN]> for RadioAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}
