//! Characteristic properties and access requirements.

use bitflags::bitflags;

bitflags! {
    /// The properties byte of a characteristic declaration.
    ///
    /// Properties describe what a client is *allowed to attempt*; the actual permission check
    /// happens against the attribute's [`Security`] requirement as well.
    ///
    /// [`Security`]: enum.Security.html
    pub struct Properties: u8 {
        const BROADCAST         = 0x01;
        const READ              = 0x02;
        const WRITE_NO_RSP      = 0x04;
        const WRITE             = 0x08;
        const NOTIFY            = 0x10;
        const INDICATE          = 0x20;
        const SIGNED_WRITE      = 0x40;
        const EXTENDED          = 0x80;
    }
}

/// Bitwise or operation on `bitflags!` types that works in a `const` context.
#[macro_export]
macro_rules! const_or {
    (
        $($t:ident :: $bit:ident)|+
    ) => {{
        <const_or!(@[$($t)+])>::from_bits_truncate($(($t :: $bit).bits())|+)
    }};

    (
        @[$first:tt $($rest:tt)*]
    ) => { $first };
}

impl Properties {
    /// Returns whether a client may subscribe to server-initiated updates of this characteristic
    /// (which is what earns it a CCCD in the attribute table).
    pub const fn is_configurable(&self) -> bool {
        self.bits() & (Self::NOTIFY.bits() | Self::INDICATE.bits()) != 0
    }

    /// Returns whether any of the write properties is present.
    pub const fn any_write(&self) -> bool {
        self.bits() & (Self::WRITE.bits() | Self::WRITE_NO_RSP.bits() | Self::SIGNED_WRITE.bits())
            != 0
    }
}

/// The security requirement attached to a characteristic.
///
/// The requirement applies to the characteristic's value attribute and its descriptors. An
/// attribute whose requirement is not met by the connection's current security level is rejected
/// with the matching ATT error code (`InsufficientEncryption`, `InsufficientAuthentication` or
/// `InsufficientEncryptionKeySize`) before the accessor is invoked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Security {
    /// No requirement; accessible on a plain-text link.
    Open,
    /// The link must be encrypted (any pairing method).
    Encrypted,
    /// The link must be encrypted with an authenticated key (MITM-protected pairing, eg. OOB).
    Authenticated,
    /// The link must be encrypted with an authenticated key that was generated by *LE Secure
    /// Connections* pairing.
    LescAuthenticated,
}
