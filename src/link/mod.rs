//! Link-Layer-facing support types.
//!
//! The Link Layer itself (radio scheduling, channel hopping, encryption start) lives outside
//! this crate. The boundary is intentionally small:
//!
//! * The driver calls [`Server::ll_connection_established`] / [`Server::ll_connection_closed`]
//!   on link up/down, feeds received ACL data to [`Server::l2cap_input`] and drains outgoing
//!   frames with [`Server::l2cap_output`].
//! * When the central starts encryption, the driver fetches the key with
//!   [`Server::long_term_key`] and reports the result through
//!   [`Server::on_encryption_changed`].
//! * The 64-bit entropy value that controllers provide for address generation is passed to
//!   [`device_address::static_random`].
//!
//! [`Server::ll_connection_established`]: ../server/struct.Server.html#method.ll_connection_established
//! [`Server::ll_connection_closed`]: ../server/struct.Server.html#method.ll_connection_closed
//! [`Server::l2cap_input`]: ../server/struct.Server.html#method.l2cap_input
//! [`Server::l2cap_output`]: ../server/struct.Server.html#method.l2cap_output
//! [`Server::long_term_key`]: ../server/struct.Server.html#method.long_term_key
//! [`Server::on_encryption_changed`]: ../server/struct.Server.html#method.on_encryption_changed
//! [`device_address::static_random`]: device_address/fn.static_random.html

pub mod ad_structure;
pub mod device_address;

pub use self::device_address::{AddressKind, DeviceAddress};

use crate::time::Duration;

/// Parameters of an established connection, reported by the link layer.
#[derive(Debug, Copy, Clone)]
pub struct ConnectionDetails {
    /// Interval between connection events.
    pub interval: Duration,
    /// Number of connection events the peripheral may skip.
    pub latency: u16,
    /// Link supervision timeout.
    pub supervision_timeout: Duration,
}

impl ConnectionDetails {
    /// Placeholder details for drivers that do not report connection parameters.
    pub const UNKNOWN: Self = Self {
        interval: Duration::from_micros(0),
        latency: 0,
        supervision_timeout: Duration::from_micros(0),
    };
}
