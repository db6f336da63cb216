use crate::{bytes::*, uuid::*, Error};
use core::fmt;

/// An attribute type UUID (either 16 or 128 bits wide).
///
/// 32-bit UUID aliases are not valid in ATT and must be promoted to 128 bits first.
#[derive(Copy, Clone, Eq)]
pub enum AttUuid {
    Uuid16(Uuid16),
    Uuid128(Uuid128),
}

impl AttUuid {
    /// Shorthand for wrapping a raw 16-bit alias.
    pub const fn uuid16(raw: u16) -> Self {
        AttUuid::Uuid16(Uuid16(raw))
    }

    /// Number of bytes this UUID occupies on the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            AttUuid::Uuid16(_) => 2,
            AttUuid::Uuid128(_) => 16,
        }
    }
}

impl FromBytes<'_> for AttUuid {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(match bytes.bytes_left() {
            2 => AttUuid::Uuid16(Uuid16::from_bytes(bytes)?),
            16 => AttUuid::Uuid128(<Uuid128 as FromBytes<'_>>::from_bytes(bytes)?),
            _ => return Err(Error::InvalidLength),
        })
    }
}

impl ToBytes for AttUuid {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        match self {
            AttUuid::Uuid16(uuid) => uuid.to_bytes(writer),
            AttUuid::Uuid128(uuid) => uuid.to_bytes(writer),
        }
    }
}

/// Equality includes promotion: a 16-bit alias equals the 128-bit UUID it expands to.
impl PartialEq for AttUuid {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttUuid::Uuid16(a), AttUuid::Uuid16(b)) => a == b,
            (AttUuid::Uuid128(a), b) | (b, AttUuid::Uuid128(a)) => {
                let b = match b {
                    AttUuid::Uuid16(alias) => Uuid128::from_alias(*alias),
                    AttUuid::Uuid128(u) => *u,
                };
                *a == b
            }
        }
    }
}

impl PartialEq<Uuid16> for AttUuid {
    fn eq(&self, other: &Uuid16) -> bool {
        self == &Self::from(*other)
    }
}

impl From<Uuid16> for AttUuid {
    fn from(uu: Uuid16) -> Self {
        AttUuid::Uuid16(uu)
    }
}

impl From<Uuid128> for AttUuid {
    fn from(uu: Uuid128) -> Self {
        AttUuid::Uuid128(uu)
    }
}

impl fmt::Debug for AttUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttUuid::Uuid16(u) => u.fmt(f),
            AttUuid::Uuid128(u) => u.fmt(f),
        }
    }
}
