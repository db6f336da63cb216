//! ATT opcodes, error codes, and request decoding.

use super::{Handle, RawHandleRange};
use crate::uuid::Uuid16;
use crate::{bytes::*, utils::HexSlice, uuid::Uuid128, Error};

enum_with_unknown! {
    /// Error codes an ATT server can send in an *Error Response*.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum ErrorCode(u8) {
        /// Attempted to use a `Handle` that isn't valid on this server.
        InvalidHandle = 0x01,
        /// Attribute isn't readable.
        ReadNotPermitted = 0x02,
        /// Attribute isn't writable.
        WriteNotPermitted = 0x03,
        /// Attribute PDU is invalid.
        InvalidPdu = 0x04,
        /// Authentication needed before the attribute can be read or written.
        InsufficientAuthentication = 0x05,
        /// Server doesn't support this operation.
        RequestNotSupported = 0x06,
        /// Offset was past the end of the attribute.
        InvalidOffset = 0x07,
        /// Authorization needed before the attribute can be read or written.
        InsufficientAuthorization = 0x08,
        /// Too many *Prepare Write* requests have been queued.
        PrepareQueueFull = 0x09,
        /// No attribute found within the specified attribute handle range.
        AttributeNotFound = 0x0A,
        /// Attribute can't be read or written using a *Read Blob* request.
        AttributeNotLong = 0x0B,
        /// The encryption key in use is too weak to access an attribute.
        InsufficientEncryptionKeySize = 0x0C,
        /// Attribute value has an incorrect length for the operation.
        InvalidAttributeValueLength = 0x0D,
        /// Request has encountered an "unlikely" error and could not be completed.
        UnlikelyError = 0x0E,
        /// Attribute cannot be read or written without an encrypted connection.
        InsufficientEncryption = 0x0F,
        /// Attribute type is not a valid grouping attribute.
        UnsupportedGroupType = 0x10,
        /// Server didn't have enough resources to complete a request.
        InsufficientResources = 0x11,
    }
}

/// An error on the ATT protocol layer, sent as an *Error Response*.
#[derive(Debug, PartialEq, Eq)]
pub struct AttError {
    code: ErrorCode,
    handle: Handle,
}

impl AttError {
    pub fn new(code: ErrorCode, handle: Handle) -> Self {
        Self { code, handle }
    }

    /// Shorthand for the most common failure of the discovery requests.
    pub fn attribute_not_found() -> Self {
        Self::new(ErrorCode::AttributeNotFound, Handle::NULL)
    }

    /// The error code describing this error, as defined by the spec.
    pub fn error_code(&self) -> ErrorCode {
        self.code
    }

    /// The handle of the attribute causing the error (`NULL` if no attribute is to blame).
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl From<ErrorCode> for AttError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, Handle::NULL)
    }
}

enum_with_unknown! {
    /// Specifies an ATT operation to perform.
    ///
    /// The most significant 2 bits of the opcode byte carry flags:
    ///
    /// ```notrust
    /// MSb                            LSb
    /// +-----------+---------+----------+
    /// | Signature | Command |  Method  |
    /// |   1 bit   |  1 bit  |  6 bits  |
    /// +-----------+---------+----------+
    /// ```
    ///
    /// * **`Signature`**: the parameters are followed by an authentication signature (only the
    ///   *Signed Write Command* has this bit set).
    /// * **`Command`**: the PDU is a command. Commands are never answered (not even with an
    ///   error), and unknown commands are ignored rather than rejected.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Opcode(u8) {
        ErrorRsp = 0x01,
        ExchangeMtuReq = 0x02,
        ExchangeMtuRsp = 0x03,
        FindInformationReq = 0x04,
        FindInformationRsp = 0x05,
        FindByTypeValueReq = 0x06,
        FindByTypeValueRsp = 0x07,
        ReadByTypeReq = 0x08,
        ReadByTypeRsp = 0x09,
        ReadReq = 0x0A,
        ReadRsp = 0x0B,
        ReadBlobReq = 0x0C,
        ReadBlobRsp = 0x0D,
        ReadMultipleReq = 0x0E,
        ReadMultipleRsp = 0x0F,
        ReadByGroupReq = 0x10,
        ReadByGroupRsp = 0x11,
        WriteReq = 0x12,
        WriteRsp = 0x13,
        WriteCommand = 0x52,
        SignedWriteCommand = 0xD2,
        PrepareWriteReq = 0x16,
        PrepareWriteRsp = 0x17,
        ExecuteWriteReq = 0x18,
        ExecuteWriteRsp = 0x19,
        HandleValueNotification = 0x1B,
        HandleValueIndication = 0x1D,
        HandleValueConfirmation = 0x1E,
    }
}

impl Opcode {
    /// Returns the raw byte corresponding to `self`.
    pub fn raw(&self) -> u8 {
        u8::from(*self)
    }

    /// Returns whether the `Signature` bit is set.
    pub fn is_authenticated(&self) -> bool {
        self.raw() & 0x80 != 0
    }

    /// Returns whether the `Command` bit is set.
    pub fn is_command(&self) -> bool {
        self.raw() & 0x40 != 0
    }

    /// Returns whether this opcode is only ever sent *by* a server.
    ///
    /// A server receiving one of these is witnessing a protocol violation.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Opcode::ErrorRsp
                | Opcode::ExchangeMtuRsp
                | Opcode::FindInformationRsp
                | Opcode::FindByTypeValueRsp
                | Opcode::ReadByTypeRsp
                | Opcode::ReadRsp
                | Opcode::ReadBlobRsp
                | Opcode::ReadMultipleRsp
                | Opcode::ReadByGroupRsp
                | Opcode::WriteRsp
                | Opcode::PrepareWriteRsp
                | Opcode::ExecuteWriteRsp
                | Opcode::HandleValueNotification
                | Opcode::HandleValueIndication
        )
    }
}

/// The attribute type field of a *Read By Type* / *Read By Group Type* request.
///
/// These two requests allow 16- and 128-bit UUIDs, discriminated by the PDU length.
#[derive(Debug, Copy, Clone)]
pub enum RequestedType {
    Uuid16(Uuid16),
    Uuid128(Uuid128),
}

impl FromBytes<'_> for RequestedType {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        match bytes.bytes_left() {
            2 => Ok(RequestedType::Uuid16(Uuid16::from_bytes(bytes)?)),
            16 => Ok(RequestedType::Uuid128(<Uuid128 as FromBytes<'_>>::from_bytes(bytes)?)),
            _ => Err(Error::InvalidLength),
        }
    }
}

/// A decoded PDU received from the client.
///
/// Only the client→server half of the protocol is represented: responses are built directly in
/// the TX buffer because their payloads are materialized by attribute accessors, not borrowed
/// from memory.
#[derive(Debug)]
pub enum Request<'a> {
    ExchangeMtu {
        mtu: u16,
    },
    FindInformation {
        handle_range: RawHandleRange,
    },
    FindByTypeValue {
        handle_range: RawHandleRange,
        attribute_type: Uuid16,
        attribute_value: HexSlice<&'a [u8]>,
    },
    ReadByType {
        handle_range: RawHandleRange,
        attribute_type: RequestedType,
    },
    Read {
        handle: Handle,
    },
    ReadBlob {
        handle: Handle,
        offset: u16,
    },
    ReadMultiple {
        /// Concatenated 16-bit handles, at least two of them.
        handles: HexSlice<&'a [u8]>,
    },
    ReadByGroup {
        handle_range: RawHandleRange,
        group_type: RequestedType,
    },
    Write {
        handle: Handle,
        value: HexSlice<&'a [u8]>,
    },
    WriteCommand {
        handle: Handle,
        value: HexSlice<&'a [u8]>,
    },
    SignedWriteCommand {
        handle: Handle,
        value: HexSlice<&'a [u8]>,
    },
    PrepareWrite {
        handle: Handle,
        offset: u16,
        value: HexSlice<&'a [u8]>,
    },
    ExecuteWrite {
        flags: u8,
    },
    /// Confirmation for an indication sent by us.
    Confirmation,
    /// A response opcode, or an opcode this server does not know.
    Unknown {
        opcode: Opcode,
        params: HexSlice<&'a [u8]>,
    },
}

impl<'a> FromBytes<'a> for Request<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let opcode = Opcode::from(bytes.read_u8()?);
        Ok(match opcode {
            Opcode::ExchangeMtuReq => Request::ExchangeMtu {
                mtu: bytes.read_u16_le()?,
            },
            Opcode::FindInformationReq => Request::FindInformation {
                handle_range: RawHandleRange::from_bytes(bytes)?,
            },
            Opcode::FindByTypeValueReq => Request::FindByTypeValue {
                handle_range: RawHandleRange::from_bytes(bytes)?,
                attribute_type: Uuid16::from_bytes(bytes)?,
                attribute_value: HexSlice(bytes.read_rest()),
            },
            Opcode::ReadByTypeReq => Request::ReadByType {
                handle_range: RawHandleRange::from_bytes(bytes)?,
                attribute_type: RequestedType::from_bytes(bytes)?,
            },
            Opcode::ReadReq => Request::Read {
                handle: Handle::from_bytes(bytes)?,
            },
            Opcode::ReadBlobReq => Request::ReadBlob {
                handle: Handle::from_bytes(bytes)?,
                offset: bytes.read_u16_le()?,
            },
            Opcode::ReadMultipleReq => Request::ReadMultiple {
                handles: HexSlice(bytes.read_rest()),
            },
            Opcode::ReadByGroupReq => Request::ReadByGroup {
                handle_range: RawHandleRange::from_bytes(bytes)?,
                group_type: RequestedType::from_bytes(bytes)?,
            },
            Opcode::WriteReq => Request::Write {
                handle: Handle::from_bytes(bytes)?,
                value: HexSlice(bytes.read_rest()),
            },
            Opcode::WriteCommand => Request::WriteCommand {
                handle: Handle::from_bytes(bytes)?,
                value: HexSlice(bytes.read_rest()),
            },
            Opcode::SignedWriteCommand => {
                let handle = Handle::from_bytes(bytes)?;
                let value_len = bytes
                    .bytes_left()
                    .checked_sub(12)
                    .ok_or(Error::InvalidLength)?;
                let value = HexSlice(bytes.read_slice(value_len)?);
                bytes.skip(12)?; // signature, not verified
                Request::SignedWriteCommand { handle, value }
            }
            Opcode::PrepareWriteReq => Request::PrepareWrite {
                handle: Handle::from_bytes(bytes)?,
                offset: bytes.read_u16_le()?,
                value: HexSlice(bytes.read_rest()),
            },
            Opcode::ExecuteWriteReq => Request::ExecuteWrite {
                flags: bytes.read_u8()?,
            },
            Opcode::HandleValueConfirmation => Request::Confirmation,
            _ => Request::Unknown {
                opcode,
                params: HexSlice(bytes.read_rest()),
            },
        })
    }
}

impl Request<'_> {
    /// Returns the opcode this request was decoded from.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::ExchangeMtu { .. } => Opcode::ExchangeMtuReq,
            Request::FindInformation { .. } => Opcode::FindInformationReq,
            Request::FindByTypeValue { .. } => Opcode::FindByTypeValueReq,
            Request::ReadByType { .. } => Opcode::ReadByTypeReq,
            Request::Read { .. } => Opcode::ReadReq,
            Request::ReadBlob { .. } => Opcode::ReadBlobReq,
            Request::ReadMultiple { .. } => Opcode::ReadMultipleReq,
            Request::ReadByGroup { .. } => Opcode::ReadByGroupReq,
            Request::Write { .. } => Opcode::WriteReq,
            Request::WriteCommand { .. } => Opcode::WriteCommand,
            Request::SignedWriteCommand { .. } => Opcode::SignedWriteCommand,
            Request::PrepareWrite { .. } => Opcode::PrepareWriteReq,
            Request::ExecuteWrite { .. } => Opcode::ExecuteWriteReq,
            Request::Confirmation => Opcode::HandleValueConfirmation,
            Request::Unknown { opcode, .. } => *opcode,
        }
    }
}
