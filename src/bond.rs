//! Bond persistence.
//!
//! Pairing with bonding produces a [`BondRecord`]: the peer's identity, the keys needed to
//! re-encrypt the link later, and a snapshot of the client characteristic configuration so
//! subscriptions survive reconnects. Records are handed to an injected [`BondStore`]; how and
//! where they are persisted (flash, FRAM, nothing) is the application's business.
//!
//! The serialized layout (for stores that persist raw bytes) is:
//!
//! ```notrust
//! version:u8 ∥ identity:7 ∥ irk:16 ∥ ltk_size:u8 ∥ ltk:16 ∥ ediv:u16 ∥ rand:u64 ∥ cccd:variable
//! ```
//!
//! All multi-byte fields are little-endian. `identity` is the address type byte followed by the
//! 6 address bytes (LSB first). `ltk_size` carries the key size in its low 5 bits; bit 6 marks
//! an authenticated (MITM-protected) bond and bit 7 a bond created by *LE Secure Connections*.
//!
//! [`BondRecord`]: struct.BondRecord.html
//! [`BondStore`]: trait.BondStore.html

use crate::gatt::MAX_CONFIGURABLE;
use crate::link::device_address::{AddressKind, DeviceAddress};
use crate::{bytes::*, Error};
use heapless::Vec;

const FLAG_AUTHENTICATED: u8 = 1 << 6;
const FLAG_LESC: u8 = 1 << 7;

/// Fixed-layout head of a serialized bond record.
#[derive(zerocopy::AsBytes, zerocopy::FromBytes, zerocopy::Unaligned)]
#[repr(C)]
struct RawBondKeys {
    version: u8,
    identity: [u8; 7],
    irk: [u8; 16],
    ltk_size: u8,
    ltk: [u8; 16],
}

/// The keys and state persisted for a bonded peer.
#[derive(Clone)]
pub struct BondRecord {
    /// The peer's identity address.
    pub identity: DeviceAddress,
    /// The peer's Identity Resolving Key (all zero when the peer did not distribute one).
    pub irk: [u8; 16],
    /// Long-Term Key used to re-encrypt the link.
    pub ltk: [u8; 16],
    /// Effective encryption key size in bytes.
    pub ltk_size: u8,
    /// Whether the pairing method was authenticated (MITM-protected).
    pub authenticated: bool,
    /// Whether the LTK was generated by *LE Secure Connections* pairing.
    pub lesc: bool,
    /// EDIV/Rand identifying the LTK (zero for LESC bonds).
    pub ediv: u16,
    pub rand: u64,
    /// Client characteristic configuration snapshot, one byte per configurable characteristic.
    pub cccd: Vec<u8, MAX_CONFIGURABLE>,
}

impl BondRecord {
    pub const VERSION: u8 = 1;

    fn identity_bytes(&self) -> [u8; 7] {
        let mut out = [0; 7];
        out[0] = match self.identity.kind() {
            AddressKind::Public => 0x00,
            AddressKind::Random => 0x01,
        };
        out[1..].copy_from_slice(self.identity.raw());
        out
    }
}

impl ToBytes for BondRecord {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let mut ltk_size = self.ltk_size & 0x1F;
        if self.authenticated {
            ltk_size |= FLAG_AUTHENTICATED;
        }
        if self.lesc {
            ltk_size |= FLAG_LESC;
        }
        writer.write_obj(&RawBondKeys {
            version: Self::VERSION,
            identity: self.identity_bytes(),
            irk: self.irk,
            ltk_size,
            ltk: self.ltk,
        })?;
        writer.write_u16_le(self.ediv)?;
        writer.write_u64_le(self.rand)?;
        writer.write_slice(&self.cccd)
    }
}

impl FromBytes<'_> for BondRecord {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let keys = bytes.read_obj::<RawBondKeys>()?;
        if keys.version != Self::VERSION {
            return Err(Error::InvalidValue);
        }
        let kind = match keys.identity[0] {
            0x00 => AddressKind::Public,
            0x01 => AddressKind::Random,
            _ => return Err(Error::InvalidValue),
        };
        let mut addr = [0; 6];
        addr.copy_from_slice(&keys.identity[1..]);

        let ediv = bytes.read_u16_le()?;
        let rand = bytes.read_u64_le()?;
        let cccd = Vec::from_slice(bytes.read_rest()).map_err(|_| Error::InvalidLength)?;

        Ok(Self {
            identity: DeviceAddress::new(addr, kind),
            irk: keys.irk,
            ltk: keys.ltk,
            ltk_size: keys.ltk_size & 0x1F,
            authenticated: keys.ltk_size & FLAG_AUTHENTICATED != 0,
            lesc: keys.ltk_size & FLAG_LESC != 0,
            ediv,
            rand,
            cccd,
        })
    }
}

/// Returned by [`BondStore::save`] when no slot is left for a new bond.
///
/// [`BondStore::save`]: trait.BondStore.html#tymethod.save
#[derive(Debug)]
pub struct StoreFull;

/// Storage for bond records, injected into the server.
///
/// The store is keyed by the peer's identity address. Implementations decide about persistence
/// and eviction; the stack only requires that a successfully saved record can be found again
/// until it is removed.
pub trait BondStore {
    /// Whether this store can hold bonds at all.
    ///
    /// When this returns `false`, the Security Manager clears the bonding bit during feature
    /// exchange and never distributes keys.
    fn supports_bonding(&self) -> bool {
        true
    }

    /// Saves `record`, replacing any previous record with the same identity.
    fn save(&mut self, record: BondRecord) -> Result<(), StoreFull>;

    /// Looks up the record for `identity`.
    fn find(&self, identity: &DeviceAddress) -> Option<&BondRecord>;

    /// Updates the CCCD snapshot of an existing record; does nothing when `identity` is unknown.
    fn update_cccd(&mut self, identity: &DeviceAddress, cccd: &[u8]);

    /// Removes the record for `identity`, if any.
    fn remove(&mut self, identity: &DeviceAddress);
}

/// A [`BondStore`](trait.BondStore.html) that never stores anything.
///
/// Use this for servers that pair but do not bond.
pub struct NoBonds;

impl BondStore for NoBonds {
    fn supports_bonding(&self) -> bool {
        false
    }

    fn save(&mut self, _record: BondRecord) -> Result<(), StoreFull> {
        Err(StoreFull)
    }

    fn find(&self, _identity: &DeviceAddress) -> Option<&BondRecord> {
        None
    }

    fn update_cccd(&mut self, _identity: &DeviceAddress, _cccd: &[u8]) {}

    fn remove(&mut self, _identity: &DeviceAddress) {}
}

/// An in-memory [`BondStore`](trait.BondStore.html) holding up to `CAP` bonds.
///
/// Contents are lost on reset; applications wanting persistence load and store the records
/// through the serialized form around reboots.
pub struct StaticBondStore<const CAP: usize> {
    records: Vec<BondRecord, CAP>,
}

impl<const CAP: usize> StaticBondStore<CAP> {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[BondRecord] {
        &self.records
    }
}

impl<const CAP: usize> BondStore for StaticBondStore<CAP> {
    fn save(&mut self, record: BondRecord) -> Result<(), StoreFull> {
        let identity = record.identity;
        self.remove(&identity);
        self.records.push(record).map_err(|_| StoreFull)
    }

    fn find(&self, identity: &DeviceAddress) -> Option<&BondRecord> {
        self.records.iter().find(|r| r.identity == *identity)
    }

    fn update_cccd(&mut self, identity: &DeviceAddress, cccd: &[u8]) {
        if let Some(record) = self.records.iter_mut().find(|r| r.identity == *identity) {
            record.cccd = Vec::from_slice(cccd).unwrap_or_else(|_| Vec::new());
        }
    }

    fn remove(&mut self, identity: &DeviceAddress) {
        if let Some(pos) = self.records.iter().position(|r| r.identity == *identity) {
            self.records.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BondRecord {
        BondRecord {
            identity: DeviceAddress::new([1, 2, 3, 4, 5, 6], AddressKind::Random),
            irk: [0xAA; 16],
            ltk: [0xBB; 16],
            ltk_size: 16,
            authenticated: true,
            lesc: false,
            ediv: 0x1234,
            rand: 0x1122_3344_5566_7788,
            cccd: Vec::from_slice(&[0x01, 0x02]).unwrap(),
        }
    }

    #[test]
    fn roundtrip() {
        let mut buf = [0; 128];
        let mut w = ByteWriter::new(&mut buf);
        record().to_bytes(&mut w).unwrap();
        let used = 128 - w.space_left();
        // version + identity + irk + ltk_size + ltk + ediv + rand + cccd
        assert_eq!(used, 1 + 7 + 16 + 1 + 16 + 2 + 8 + 2);

        let back = BondRecord::from_bytes(&mut ByteReader::new(&buf[..used])).unwrap();
        assert_eq!(back.identity, record().identity);
        assert_eq!(back.ltk, [0xBB; 16]);
        assert_eq!(back.ltk_size, 16);
        assert!(back.authenticated);
        assert!(!back.lesc);
        assert_eq!(back.ediv, 0x1234);
        assert_eq!(back.rand, 0x1122_3344_5566_7788);
        assert_eq!(&back.cccd[..], &[0x01, 0x02]);
    }

    #[test]
    fn store_replaces_by_identity() {
        let mut store: StaticBondStore<2> = StaticBondStore::new();
        store.save(record()).unwrap();
        let mut newer = record();
        newer.ltk = [0xCC; 16];
        store.save(newer).unwrap();
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.find(&record().identity).unwrap().ltk, [0xCC; 16]);
    }
}
