//! The Logical Link Control and Adaptation Protocol (L2CAP), LE flavor.
//!
//! L2CAP multiplexes the data connection into "channels" identified by a 16-bit CID. A BLE
//! peripheral needs exactly three fixed channels:
//!
//! * `0x0004`: Attribute Protocol (ATT).
//! * `0x0005`: LE L2CAP signaling channel.
//! * `0x0006`: LE Security Manager protocol (SMP).
//!
//! Dynamic channels, credit-based flow control and fragment reassembly are not implemented; every
//! frame handled here is a complete *B-frame* (4-byte header followed by the full payload). The
//! channel dispatch itself lives in [`Server::l2cap_input`](crate::server::Server::l2cap_input).

use crate::{bytes::*, Error};
use core::fmt;

/// An L2CAP channel identifier (CID).
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct Channel(u16);

impl Channel {
    /// The null identifier. Must never be used as a destination endpoint.
    pub const NULL: Self = Channel(0x0000);

    /// The channel used by the Attribute Protocol (ATT).
    pub const ATT: Self = Channel(0x0004);

    /// LE L2CAP signaling channel (connectionless).
    pub const LE_SIGNALING: Self = Channel(0x0005);

    /// LE Security Manager channel.
    pub const LE_SECURITY_MANAGER: Self = Channel(0x0006);

    /// Returns the channel identifier (CID) as a raw `u16`.
    pub fn as_raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

impl FromBytes<'_> for Channel {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Channel(bytes.read_u16_le()?))
    }
}

impl ToBytes for Channel {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.0)
    }
}

/// Header prepended to all L2CAP PDUs.
#[derive(Debug)]
pub struct Header {
    /// Length of the payload following the header.
    pub length: u16,
    /// Destination endpoint of the PDU.
    pub channel: Channel,
}

impl Header {
    /// The size of an L2CAP header in bytes.
    pub const SIZE: usize = 4;
}

impl FromBytes<'_> for Header {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let length = bytes.read_u16_le()?;
        let channel = Channel::from_bytes(bytes)?;
        Ok(Self { length, channel })
    }
}

impl ToBytes for Header {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.length)?;
        writer.write_u16_le(self.channel.as_raw())?;
        Ok(())
    }
}

/// Splits a complete L2CAP frame into its destination channel and payload.
///
/// Frames whose length field disagrees with the actual payload size are rejected; reassembly of
/// fragmented frames is not supported.
pub fn parse_frame(frame: &[u8]) -> Result<(Channel, &[u8]), Error> {
    let mut r = ByteReader::new(frame);
    let header = Header::from_bytes(&mut r)?;
    let payload = r.read_rest();
    if usize::from(header.length) != payload.len() {
        return Err(Error::InvalidLength);
    }
    Ok((header.channel, payload))
}

/// Signaling command codes used on the LE signaling channel.
pub(crate) mod signaling {
    /// Command Reject response code.
    pub const COMMAND_REJECT: u8 = 0x01;
    /// "Command not understood" reject reason.
    pub const REASON_NOT_UNDERSTOOD: u16 = 0x0000;
}
