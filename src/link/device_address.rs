//! Bluetooth device addresses.

use core::fmt;
use sha2::{Digest, Sha256};

/// Specifies whether a device address is randomly generated or a registered LAN MAC address.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AddressKind {
    /// Publicly registered IEEE 802-2001 LAN MAC address.
    Public,
    /// Randomly generated address.
    Random,
}

/// A Bluetooth device address.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    bytes: [u8; 6],
    kind: AddressKind,
}

impl DeviceAddress {
    /// The all-zero public address, used as a placeholder before a link carries a real one.
    pub const ZERO: Self = DeviceAddress {
        bytes: [0; 6],
        kind: AddressKind::Public,
    };

    /// Creates a device address from 6 raw bytes (as sent over the air, LSB first) and a kind.
    pub const fn new(bytes: [u8; 6], kind: AddressKind) -> Self {
        DeviceAddress { bytes, kind }
    }

    /// Returns the address kind.
    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Returns whether this address is randomly generated.
    pub fn is_random(&self) -> bool {
        self.kind == AddressKind::Random
    }

    /// Returns the raw bytes making up this address (LSB first).
    pub fn raw(&self) -> &[u8; 6] {
        &self.bytes
    }
}

/// Derives a static random device address from a 64-bit seed.
///
/// Controllers expose an entropy source for this purpose (factory-programmed random words on
/// nRF-style radios). Hashing the seed makes the derived address stable across reboots while
/// keeping the seed itself off the air. The two most significant bits are forced to `11`, as
/// required for static random addresses.
pub fn static_random(seed: u64) -> DeviceAddress {
    let digest = Sha256::digest(&seed.to_le_bytes());
    let mut bytes = [0; 6];
    bytes.copy_from_slice(&digest[..6]);
    bytes[5] |= 0b1100_0000;
    DeviceAddress::new(bytes, AddressKind::Random)
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Addresses are usually displayed MSB first, so that the OUI prefix comes first.
        for (i, b) in self.bytes.iter().rev().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }

        write!(f, "[{:?}]", self.kind)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_representation() {
        let addr = DeviceAddress::new([0x5A, 0x92, 0x04, 0x26, 0xC6, 0x88], AddressKind::Public);
        assert_eq!(format!("{:?}", addr), "88:c6:26:04:92:5a[Public]");
    }

    #[test]
    fn static_random_is_stable_and_marked() {
        let a = static_random(0x0123_4567_89AB_CDEF);
        let b = static_random(0x0123_4567_89AB_CDEF);
        assert_eq!(a, b);
        assert!(a.is_random());
        // Top two bits of the MSB must be set.
        assert_eq!(a.raw()[5] & 0b1100_0000, 0b1100_0000);
        assert_ne!(static_random(1), static_random(2));
    }
}
