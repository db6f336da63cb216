//! Attribute handles.

use crate::{
    att::{AttError, ErrorCode},
    bytes::*,
    Error,
};
use core::fmt;

/// A 16-bit handle uniquely identifying an attribute on an ATT server.
///
/// Handles start at `0x0001` and are strictly ascending in table order. The `0x0000` handle
/// (`NULL`) never refers to an attribute.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Handle(u16);

impl Handle {
    /// Placeholder used where no attribute handle is applicable (eg. some error responses).
    pub const NULL: Self = Handle(0x0000);

    /// Creates an attribute handle from its raw 16-bit value.
    pub const fn from_raw(raw: u16) -> Self {
        Handle(raw)
    }

    /// Returns the raw 16-bit value of this handle.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

impl FromBytes<'_> for Handle {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Handle(bytes.read_u16_le()?))
    }
}

impl ToBytes for Handle {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.0)
    }
}

/// A handle range as it appears in request PDUs, not yet checked for validity.
#[derive(Debug, Copy, Clone)]
pub struct RawHandleRange {
    start: Handle,
    end: Handle,
}

impl RawHandleRange {
    /// Checks this range against the rules of the spec (start not `NULL`, start ≤ end).
    ///
    /// Returns the `AttError` to send as a response if the range is invalid.
    pub fn check(&self) -> Result<HandleRange, AttError> {
        if self.start.0 > self.end.0 || self.start.0 == 0 {
            Err(AttError::new(ErrorCode::InvalidHandle, self.start))
        } else {
            Ok(HandleRange {
                start: self.start,
                end: self.end,
            })
        }
    }
}

impl FromBytes<'_> for RawHandleRange {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Self {
            start: Handle::from_bytes(bytes)?,
            end: Handle::from_bytes(bytes)?,
        })
    }
}

/// A validated, inclusive handle range.
#[derive(Debug, Copy, Clone)]
pub struct HandleRange {
    start: Handle,
    end: Handle,
}

impl HandleRange {
    /// Creates a range spanning `start..=end`. Both must be valid handles.
    pub fn new(start: Handle, end: Handle) -> Self {
        debug_assert!(start.0 != 0 && start.0 <= end.0);
        Self { start, end }
    }

    /// Returns whether `handle` lies inside `self`.
    pub fn contains(&self, handle: Handle) -> bool {
        self.start.0 <= handle.0 && handle.0 <= self.end.0
    }

    /// The first handle in the range.
    pub fn start(&self) -> Handle {
        self.start
    }

    /// The last handle in the range.
    pub fn end(&self) -> Handle {
        self.end
    }
}
