//! Security Manager Protocol (SMP) commands and fields.

use crate::{bytes::*, Error};
use bitflags::bitflags;
use core::fmt;

enum_with_unknown! {
    /// SMP command codes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum CommandCode(u8) {
        PairingRequest = 0x01,
        PairingResponse = 0x02,
        PairingConfirm = 0x03,
        PairingRandom = 0x04,
        PairingFailed = 0x05,
        EncryptionInformation = 0x06,
        MasterIdentification = 0x07,
        IdentityInformation = 0x08,
        IdentityAddressInformation = 0x09,
        SigningInformation = 0x0A,
        SecurityRequest = 0x0B,
        PairingPublicKey = 0x0C,
        PairingDhKeyCheck = 0x0D,
        PairingKeypressNotification = 0x0E,
    }
}

enum_with_unknown! {
    /// Reasons a *Pairing Failed* PDU can carry.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Reason(u8) {
        PasskeyEntryFailed = 0x01,
        OobNotAvailable = 0x02,
        AuthenticationRequirements = 0x03,
        ConfirmValueFailed = 0x04,
        PairingNotSupported = 0x05,
        EncryptionKeySize = 0x06,
        CommandNotSupported = 0x07,
        UnspecifiedReason = 0x08,
        RepeatedAttempts = 0x09,
        InvalidParameters = 0x0A,
        DhKeyCheckFailed = 0x0B,
        NumericComparisonFailed = 0x0C,
    }
}

enum_with_unknown! {
    /// The I/O capabilities a device can bring to the pairing process.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum IoCapabilities(u8) {
        /// Device can display a 6-digit number, but has no input capabilities.
        DisplayOnly = 0x00,

        /// Device can display a 6-digit number and the user can input "yes" or "no".
        DisplayYesNo = 0x01,

        /// Device has no output capability, but the user can input a passcode.
        KeyboardOnly = 0x02,

        /// Device has no meaningful input or output capabilities.
        NoInputNoOutput = 0x03,

        /// Device can display a 6-digit passcode and has a keyboard for entering one.
        KeyboardDisplay = 0x04,
    }
}

/// Authentication requirements exchanged in pairing requests and responses.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AuthReq(u8);

impl AuthReq {
    const BITS_BONDING: u8 = 0b0000_0011;
    const BITS_MITM: u8 = 0b0000_0100;
    const BITS_SC: u8 = 0b0000_1000;
    const BITS_KEYPRESS: u8 = 0b0001_0000;

    /// An `AuthReq` with no bits set: no bonding, no MITM protection, no secure connections.
    pub const NONE: Self = AuthReq(0);

    pub fn from_raw(raw: u8) -> Self {
        AuthReq(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Returns whether bonding (persisting the exchanged keys) is requested.
    pub fn bonding(&self) -> bool {
        self.0 & Self::BITS_BONDING != 0
    }

    pub fn set_bonding(&mut self, bonding: bool) {
        self.0 = (self.0 & !Self::BITS_BONDING) | if bonding { 0b01 } else { 0 };
    }

    /// Returns whether MITM protection is requested.
    pub fn mitm(&self) -> bool {
        self.0 & Self::BITS_MITM != 0
    }

    pub fn set_mitm(&mut self, mitm: bool) {
        self.0 = (self.0 & !Self::BITS_MITM) | if mitm { Self::BITS_MITM } else { 0 };
    }

    /// Returns whether *LE Secure Connections* pairing is supported and requested.
    ///
    /// When both sides set this bit, LESC pairing is used; otherwise pairing falls back to the
    /// legacy protocol.
    pub fn secure_connections(&self) -> bool {
        self.0 & Self::BITS_SC != 0
    }

    pub fn set_secure_connections(&mut self, sc: bool) {
        self.0 = (self.0 & !Self::BITS_SC) | if sc { Self::BITS_SC } else { 0 };
    }

    pub fn keypress(&self) -> bool {
        self.0 & Self::BITS_KEYPRESS != 0
    }
}

impl fmt::Debug for AuthReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthReq")
            .field("bonding", &self.bonding())
            .field("mitm", &self.mitm())
            .field("secure_connections", &self.secure_connections())
            .field("keypress", &self.keypress())
            .finish()
    }
}

bitflags! {
    /// The sets of keys a device offers or requests for distribution.
    pub struct KeyDistribution: u8 {
        /// LTK, EDIV and Rand (legacy pairing only; LESC derives the LTK directly).
        const ENC_KEY = 1 << 0;
        /// IRK and identity address.
        const ID_KEY = 1 << 1;
        /// CSRK for signed writes.
        const SIGN_KEY = 1 << 2;
        /// BR/EDR link key derivation; not supported here.
        const LINK_KEY = 1 << 3;
    }
}

/// The feature-exchange fields shared by *Pairing Request* and *Pairing Response* (everything
/// after the command code).
#[derive(Debug, Copy, Clone)]
pub struct PairingFeatures {
    pub io: IoCapabilities,
    /// Whether this side has OOB authentication data available.
    pub oob: bool,
    pub auth_req: AuthReq,
    /// Maximum supported encryption key size, 7..=16 bytes.
    pub max_key_size: u8,
    /// Keys the initiator wants to distribute.
    pub initiator_dist: KeyDistribution,
    /// Keys the initiator requests the responder to distribute.
    pub responder_dist: KeyDistribution,
}

impl FromBytes<'_> for PairingFeatures {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            io: IoCapabilities::from(bytes.read_u8()?),
            oob: bytes.read_u8()? == 0x01,
            auth_req: AuthReq::from_raw(bytes.read_u8()?),
            max_key_size: bytes.read_u8()?,
            initiator_dist: KeyDistribution::from_bits_truncate(bytes.read_u8()?),
            responder_dist: KeyDistribution::from_bits_truncate(bytes.read_u8()?),
        })
    }
}

impl ToBytes for PairingFeatures {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.io.into())?;
        writer.write_u8(if self.oob { 0x01 } else { 0x00 })?;
        writer.write_u8(self.auth_req.raw())?;
        writer.write_u8(self.max_key_size)?;
        writer.write_u8(self.initiator_dist.bits())?;
        writer.write_u8(self.responder_dist.bits())?;
        Ok(())
    }
}

/// A decoded SMP command.
#[derive(Debug, Copy, Clone)]
pub enum Command<'a> {
    PairingRequest(PairingFeatures),
    PairingResponse(PairingFeatures),
    PairingConfirm {
        value: [u8; 16],
    },
    PairingRandom {
        value: [u8; 16],
    },
    PairingFailed {
        reason: Reason,
    },
    EncryptionInformation {
        ltk: [u8; 16],
    },
    MasterIdentification {
        ediv: u16,
        rand: u64,
    },
    IdentityInformation {
        irk: [u8; 16],
    },
    IdentityAddressInformation {
        /// `0x00` public, `0x01` static random.
        addr_type: u8,
        addr: [u8; 6],
    },
    SigningInformation {
        csrk: [u8; 16],
    },
    SecurityRequest {
        auth_req: AuthReq,
    },
    /// 64 bytes: X and Y coordinates, each little-endian on the wire.
    PairingPublicKey {
        x: [u8; 32],
        y: [u8; 32],
    },
    PairingDhKeyCheck {
        value: [u8; 16],
    },
    Unknown {
        code: CommandCode,
        data: &'a [u8],
    },
}

impl<'a> FromBytes<'a> for Command<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let code = CommandCode::from(bytes.read_u8()?);
        Ok(match code {
            CommandCode::PairingRequest => {
                Command::PairingRequest(PairingFeatures::from_bytes(bytes)?)
            }
            CommandCode::PairingResponse => {
                Command::PairingResponse(PairingFeatures::from_bytes(bytes)?)
            }
            CommandCode::PairingConfirm => Command::PairingConfirm {
                value: bytes.read_array()?,
            },
            CommandCode::PairingRandom => Command::PairingRandom {
                value: bytes.read_array()?,
            },
            CommandCode::PairingFailed => Command::PairingFailed {
                reason: Reason::from(bytes.read_u8()?),
            },
            CommandCode::EncryptionInformation => Command::EncryptionInformation {
                ltk: bytes.read_array()?,
            },
            CommandCode::MasterIdentification => Command::MasterIdentification {
                ediv: bytes.read_u16_le()?,
                rand: bytes.read_u64_le()?,
            },
            CommandCode::IdentityInformation => Command::IdentityInformation {
                irk: bytes.read_array()?,
            },
            CommandCode::IdentityAddressInformation => Command::IdentityAddressInformation {
                addr_type: bytes.read_u8()?,
                addr: bytes.read_array()?,
            },
            CommandCode::SigningInformation => Command::SigningInformation {
                csrk: bytes.read_array()?,
            },
            CommandCode::SecurityRequest => Command::SecurityRequest {
                auth_req: AuthReq::from_raw(bytes.read_u8()?),
            },
            CommandCode::PairingPublicKey => Command::PairingPublicKey {
                x: bytes.read_array()?,
                y: bytes.read_array()?,
            },
            CommandCode::PairingDhKeyCheck => Command::PairingDhKeyCheck {
                value: bytes.read_array()?,
            },
            _ => Command::Unknown {
                code,
                data: bytes.read_rest(),
            },
        })
    }
}

impl Command<'_> {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::PairingRequest(_) => CommandCode::PairingRequest,
            Command::PairingResponse(_) => CommandCode::PairingResponse,
            Command::PairingConfirm { .. } => CommandCode::PairingConfirm,
            Command::PairingRandom { .. } => CommandCode::PairingRandom,
            Command::PairingFailed { .. } => CommandCode::PairingFailed,
            Command::EncryptionInformation { .. } => CommandCode::EncryptionInformation,
            Command::MasterIdentification { .. } => CommandCode::MasterIdentification,
            Command::IdentityInformation { .. } => CommandCode::IdentityInformation,
            Command::IdentityAddressInformation { .. } => CommandCode::IdentityAddressInformation,
            Command::SigningInformation { .. } => CommandCode::SigningInformation,
            Command::SecurityRequest { .. } => CommandCode::SecurityRequest,
            Command::PairingPublicKey { .. } => CommandCode::PairingPublicKey,
            Command::PairingDhKeyCheck { .. } => CommandCode::PairingDhKeyCheck,
            Command::Unknown { code, .. } => *code,
        }
    }
}

impl ToBytes for Command<'_> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.code().into())?;
        match self {
            Command::PairingRequest(features) | Command::PairingResponse(features) => {
                features.to_bytes(writer)?;
            }
            Command::PairingConfirm { value }
            | Command::PairingRandom { value }
            | Command::PairingDhKeyCheck { value } => {
                writer.write_slice(value)?;
            }
            Command::PairingFailed { reason } => {
                writer.write_u8((*reason).into())?;
            }
            Command::EncryptionInformation { ltk } => {
                writer.write_slice(ltk)?;
            }
            Command::MasterIdentification { ediv, rand } => {
                writer.write_u16_le(*ediv)?;
                writer.write_u64_le(*rand)?;
            }
            Command::IdentityInformation { irk } => {
                writer.write_slice(irk)?;
            }
            Command::IdentityAddressInformation { addr_type, addr } => {
                writer.write_u8(*addr_type)?;
                writer.write_slice(addr)?;
            }
            Command::SigningInformation { csrk } => {
                writer.write_slice(csrk)?;
            }
            Command::SecurityRequest { auth_req } => {
                writer.write_u8(auth_req.raw())?;
            }
            Command::PairingPublicKey { x, y } => {
                writer.write_slice(x)?;
                writer.write_slice(y)?;
            }
            Command::Unknown { data, .. } => {
                writer.write_slice(data)?;
            }
        }
        Ok(())
    }
}
