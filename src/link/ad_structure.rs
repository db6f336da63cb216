//! Advertising Data (AD) structures.
//!
//! The advertising payload is a concatenation of AD structures, each encoded as
//! `len ∥ type ∥ data`. A peripheral that wants to be discovered sends at least the Flags
//! structure; scanners additionally like to see the device name and the offered service UUIDs.
//!
//! Only encoding is implemented: a peripheral produces advertising data, it does not parse it.
//! See the [assigned numbers document][gap] for the full list of AD types.
//!
//! [gap]: https://www.bluetooth.com/specifications/assigned-numbers/generic-access-profile

use crate::uuid::{IsUuid, Uuid128, Uuid16, UuidKind};
use crate::{bytes::*, Error};
use bitflags::bitflags;

/// A single AD structure.
#[derive(Debug, Copy, Clone)]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities. Mandatory for connectable advertising.
    Flags(Flags),

    ServiceUuids16(ServiceUuids<'a, Uuid16>),
    ServiceUuids128(ServiceUuids<'a, Uuid128>),

    /// The full (unabbreviated) device name.
    CompleteLocalName(&'a str),

    /// A shortened device name.
    ShortenedLocalName(&'a str),

    /// An AD structure type without a dedicated variant, stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'a> ToBytes for AdStructure<'a> {
    fn to_bytes(&self, buf: &mut ByteWriter<'_>) -> Result<(), Error> {
        // First byte is the length of the rest of the structure; encode first, fill in later.
        let first = buf.split_next_mut().ok_or(Error::Eof)?;

        let left_before = buf.space_left();
        match self {
            AdStructure::Flags(flags) => {
                buf.write_u8(Type::FLAGS)?;
                buf.write_u8(flags.bits())?;
            }
            AdStructure::ServiceUuids16(uuids) => uuids.to_bytes(buf)?,
            AdStructure::ServiceUuids128(uuids) => uuids.to_bytes(buf)?,
            AdStructure::CompleteLocalName(name) => {
                buf.write_u8(Type::COMPLETE_LOCAL_NAME)?;
                buf.write_slice(name.as_bytes())?;
            }
            AdStructure::ShortenedLocalName(name) => {
                buf.write_u8(Type::SHORTENED_LOCAL_NAME)?;
                buf.write_slice(name.as_bytes())?;
            }
            AdStructure::Unknown { ty, data } => {
                buf.write_u8(*ty)?;
                buf.write_slice(data)?;
            }
        }
        let len = left_before - buf.space_left();
        debug_assert!(len <= 255);

        *first = len as u8;
        Ok(())
    }
}

/// List of service UUIDs offered by the device.
///
/// The list can be marked as incomplete, in which case more UUIDs exist than were included
/// (because they did not fit into the advertising payload).
#[derive(Debug, Copy, Clone)]
pub struct ServiceUuids<'a, T: IsUuid> {
    complete: bool,
    uuids: &'a [T],
}

impl<'a, T: IsUuid> ServiceUuids<'a, T> {
    /// Creates a `ServiceUuids` structure from a list of UUIDs.
    pub fn from_uuids(complete: bool, uuids: &'a [T]) -> Self {
        Self { complete, uuids }
    }

    fn type_(&self) -> u8 {
        match (T::KIND, self.complete) {
            (UuidKind::Uuid16, true) => Type::COMPLETE_LIST_OF_16BIT_SERVICE_UUIDS,
            (UuidKind::Uuid16, false) => Type::INCOMPLETE_LIST_OF_16BIT_SERVICE_UUIDS,
            (UuidKind::Uuid128, true) => Type::COMPLETE_LIST_OF_128BIT_SERVICE_UUIDS,
            (UuidKind::Uuid128, false) => Type::INCOMPLETE_LIST_OF_128BIT_SERVICE_UUIDS,
        }
    }
}

impl<'a, T: IsUuid> ToBytes for ServiceUuids<'a, T> {
    fn to_bytes(&self, buffer: &mut ByteWriter<'_>) -> Result<(), Error> {
        buffer.write_u8(self.type_())?;
        for uuid in self.uuids {
            uuid.to_bytes(buffer)?;
        }
        Ok(())
    }
}

bitflags! {
    /// BR/EDR and LE compatibility flags.
    pub struct Flags: u8 {
        const LE_LIMITED_DISCOVERABLE = 0b00000001;
        const LE_GENERAL_DISCOVERABLE = 0b00000010;
        const BR_EDR_NOT_SUPPORTED    = 0b00000100;
        const SIMUL_LE_BR_CONTROLLER  = 0b00001000;
        const SIMUL_LE_BR_HOST        = 0b00010000;
    }
}

impl Flags {
    /// Flags for a discoverable device that wants to accept connections: LE General Discoverable
    /// mode, no BR/EDR (Classic Bluetooth) support.
    pub fn discoverable() -> Flags {
        Self::BR_EDR_NOT_SUPPORTED | Self::LE_GENERAL_DISCOVERABLE
    }

    /// Flags for a pure broadcaster: not discoverable, no BR/EDR support.
    pub fn broadcast() -> Flags {
        Self::BR_EDR_NOT_SUPPORTED
    }
}

/// AD type constants.
enum Type {}

#[allow(unused)]
impl Type {
    const FLAGS: u8 = 0x01;
    const INCOMPLETE_LIST_OF_16BIT_SERVICE_UUIDS: u8 = 0x02;
    const COMPLETE_LIST_OF_16BIT_SERVICE_UUIDS: u8 = 0x03;
    const INCOMPLETE_LIST_OF_128BIT_SERVICE_UUIDS: u8 = 0x06;
    const COMPLETE_LIST_OF_128BIT_SERVICE_UUIDS: u8 = 0x07;
    const SHORTENED_LOCAL_NAME: u8 = 0x08;
    const COMPLETE_LOCAL_NAME: u8 = 0x09;
    const TX_POWER_LEVEL: u8 = 0x0A;
    const APPEARANCE: u8 = 0x19;
    const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_flags_and_name() {
        let mut buf = [0; 31];
        let mut w = ByteWriter::new(&mut buf);
        AdStructure::Flags(Flags::discoverable())
            .to_bytes(&mut w)
            .unwrap();
        AdStructure::CompleteLocalName("scree").to_bytes(&mut w).unwrap();
        let left = w.space_left();
        let used = 31 - left;
        assert_eq!(&buf[..used], &[0x02, 0x01, 0x06, 0x06, 0x09, b's', b'c', b'r', b'e', b'e']);
    }

    #[test]
    fn uuid_list() {
        let mut buf = [0; 31];
        let mut w = ByteWriter::new(&mut buf);
        AdStructure::ServiceUuids16(ServiceUuids::from_uuids(true, &[Uuid16(0x180F)]))
            .to_bytes(&mut w)
            .unwrap();
        let left = w.space_left();
        assert_eq!(&buf[..31 - left], &[0x03, 0x03, 0x0F, 0x18]);
    }
}
