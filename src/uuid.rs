//! BLE UUIDs (16 or 128 bits).
//!
//! Bluetooth identifies attribute types, services and characteristics by UUID. UUIDs inside the
//! Bluetooth base range `xxxxxxxx-0000-1000-8000-00805F9B34FB` can be transmitted as 16-bit
//! aliases; everything else needs the full 128 bits (sent in little-endian byte order, like all
//! multi-byte ATT fields).

use crate::{bytes::*, Error};
use core::fmt;

const BASE_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// A 16-bit UUID alias.
///
/// Convertible to its 128-bit equivalent via `.into()`.
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Uuid16(pub u16);

/// A full 128-bit UUID.
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Uuid128([u8; 16]);

impl Uuid128 {
    /// Creates a 128-bit UUID from 16 raw bytes (in big-endian order, as usually written).
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a 128-bit UUID from a `u128`, so that schema definitions can spell out UUIDs as
    /// literals: `Uuid128::from_u128(0x8C8B4094_0000_499F_A28A_4EED5BC73CA9)`.
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Returns the UUID bytes in big-endian order.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Promotes a 16-bit alias by splicing it into the Bluetooth base UUID.
    pub const fn from_alias(alias: Uuid16) -> Self {
        let mut bytes = BASE_UUID;
        bytes[2] = (alias.0 >> 8) as u8;
        bytes[3] = alias.0 as u8;
        Self(bytes)
    }
}

impl From<Uuid16> for Uuid128 {
    fn from(uuid: Uuid16) -> Self {
        Self::from_alias(uuid)
    }
}

impl ToBytes for Uuid16 {
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        buffer.write_u16_le(self.0)
    }
}

impl ToBytes for Uuid128 {
    /// UUIDs go over the air in little-endian order, so the stored bytes are reversed.
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let mut le = self.0;
        le.reverse();
        buffer.write_slice(&le)
    }
}

impl FromBytes<'_> for Uuid16 {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Uuid16(bytes.read_u16_le()?))
    }
}

impl FromBytes<'_> for Uuid128 {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let mut be: [u8; 16] = bytes.read_array()?;
        be.reverse();
        Ok(Uuid128(be))
    }
}

impl fmt::Debug for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid16({:04x})", self.0)
    }
}

impl fmt::Debug for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13],
            b[14], b[15],
        )
    }
}

/// List of the supported UUID widths.
#[derive(Debug, Copy, Clone)]
pub enum UuidKind {
    Uuid16,
    Uuid128,
}

/// Marker for UUID types, for code that is generic over the UUID width.
pub trait IsUuid: for<'a> FromBytes<'a> + ToBytes + Copy {
    const KIND: UuidKind;
}

impl IsUuid for Uuid16 {
    const KIND: UuidKind = UuidKind::Uuid16;
}

impl IsUuid for Uuid128 {
    const KIND: UuidKind = UuidKind::Uuid128;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_alias() {
        let uuid = Uuid128::from(Uuid16(0x2902));
        assert_eq!(
            uuid,
            Uuid128::from_u128(0x00002902_0000_1000_8000_00805F9B34FB)
        );
    }

    #[test]
    fn wire_order() {
        let uuid = Uuid128::from_u128(0x8C8B4094_0000_499F_A28A_4EED5BC73CA9);
        let mut buf = [0; 16];
        uuid.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        // Little-endian on the wire: the last written byte is the most significant one.
        assert_eq!(buf[15], 0x8C);
        assert_eq!(buf[0], 0xA9);

        let back = <Uuid128 as FromBytes<'_>>::from_bytes(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(back, uuid);
    }
}
