use core::fmt;

/// Errors returned by the stack.
///
/// Protocol-level failures that are reported to the *peer* are not represented here; those are
/// [`att::ErrorCode`](crate::att::ErrorCode) and [`security::Reason`](crate::security::Reason),
/// which travel over the air as single bytes.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached the end of a buffer while reading or writing data.
    ///
    /// Returned both when an encoder runs out of space in a fixed-size buffer and when a decoder
    /// runs out of input bytes.
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
        })
    }
}
