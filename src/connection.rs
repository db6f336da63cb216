//! Per-link connection state.
//!
//! A [`Connection`] owns everything the stack keeps per active link: the negotiated MTU, the
//! security level, the client characteristic configuration flags, the pending
//! notification/indication bitmaps, the prepare-write queue, the pairing state and the single
//! buffered outgoing frame. The [`Server`](crate::server::Server) owns a fixed-size array of
//! these (one per supported link, typically one) and hands out indexes instead of references, so
//! connection state and server state never borrow each other.
//!
//! [`Connection`]: struct.Connection.html

use crate::att::{self, ErrorCode, Handle};
use crate::link::device_address::DeviceAddress;
use crate::security::PairingState;
use crate::time::Instant;
use heapless::Vec;

/// Capacity of the buffered outgoing frame: the largest PDU either channel can produce (65
/// bytes, a *Pairing Public Key* PDU or a full ATT PDU at the maximum MTU) plus the 4-byte L2CAP
/// header.
pub const TX_FRAME_CAPACITY: usize = att::MAX_MTU as usize + 4;

/// Maximum number of queued *Prepare Write* fragments per connection.
pub const PREPARE_QUEUE_LEN: usize = 6;

/// Total bytes of *Prepare Write* fragment data buffered per connection.
pub const PREPARE_QUEUE_DATA: usize = 128;

/// The security level a link has reached.
///
/// Levels are ordered; an attribute's requirement is met when the link's level is at least the
/// required one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// Plain-text link, no pairing has happened.
    NoSecurity,
    /// Encrypted with a key from an unauthenticated pairing method (Just Works).
    UnauthenticatedEncrypted,
    /// Encrypted with a key from an authenticated (MITM-protected) method, eg. OOB.
    AuthenticatedEncrypted,
    /// Encrypted with an authenticated key generated by *LE Secure Connections* pairing.
    LescAuthenticated,
}

/// Snapshot of the security-relevant connection state, used for permission checks.
#[derive(Debug, Copy, Clone)]
pub struct SecurityView {
    pub level: SecurityLevel,
    pub key_size: u8,
}

/// A queued *Prepare Write* fragment (handle, value offset, range into the data arena).
#[derive(Debug, Copy, Clone)]
struct PreparedWrite {
    handle: Handle,
    offset: u16,
    start: u16,
    len: u16,
}

/// Bounded FIFO of *Prepare Write* fragments, applied or dropped on *Execute Write*.
pub struct PrepareQueue {
    entries: Vec<PreparedWrite, PREPARE_QUEUE_LEN>,
    data: Vec<u8, PREPARE_QUEUE_DATA>,
}

impl PrepareQueue {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Enqueues a fragment, failing with `PrepareQueueFull` when either the entry or the data
    /// capacity is exhausted.
    pub fn push(&mut self, handle: Handle, offset: u16, value: &[u8]) -> Result<(), ErrorCode> {
        if self.entries.is_full() || self.data.len() + value.len() > self.data.capacity() {
            return Err(ErrorCode::PrepareQueueFull);
        }
        let start = self.data.len() as u16;
        self.data.extend_from_slice(value).unwrap();
        self.entries
            .push(PreparedWrite {
                handle,
                offset,
                start,
                len: value.len() as u16,
            })
            .ok();
        Ok(())
    }

    /// Iterates the queued fragments in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, u16, &[u8])> {
        self.entries.iter().map(move |e| {
            let data = &self.data[e.start as usize..(e.start + e.len) as usize];
            (e.handle, e.offset, data)
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State of one link. `C` is the schema's configurable-characteristic count.
pub struct Connection<const C: usize> {
    active: bool,
    peer: DeviceAddress,
    mtu: u16,

    pub(crate) encrypted: bool,
    pub(crate) key_size: u8,
    pub(crate) level: SecurityLevel,

    /// Client characteristic configuration flags, one byte per configurable characteristic in
    /// **table order** (bit 0 = notify, bit 1 = indicate).
    pub(crate) cccd: [u8; C],

    notify_pending: u64,
    indicate_pending: u64,
    indicating: bool,

    pub(crate) prepare_queue: PrepareQueue,

    /// The single buffered outgoing frame (response or security PDU). While this is non-empty,
    /// further client requests on the link are not processed; ATT is request/response-serial.
    pub(crate) tx: Vec<u8, TX_FRAME_CAPACITY>,

    pub(crate) pairing: PairingState,
    /// Time of the last SMP PDU from the peer; pairing aborts 30 s after this.
    pub(crate) last_smp: Option<Instant>,
    /// Set when the link corresponds to a stored bond; CCCD changes are persisted under this
    /// identity.
    pub(crate) bonded_identity: Option<DeviceAddress>,
}

impl<const C: usize> Connection<C> {
    pub fn new() -> Self {
        Self {
            active: false,
            peer: DeviceAddress::ZERO,
            mtu: att::DEFAULT_MTU,
            encrypted: false,
            key_size: 0,
            level: SecurityLevel::NoSecurity,
            cccd: [0; C],
            notify_pending: 0,
            indicate_pending: 0,
            indicating: false,
            prepare_queue: PrepareQueue::new(),
            tx: Vec::new(),
            pairing: PairingState::Idle,
            last_smp: None,
            bonded_identity: None,
        }
    }

    /// Restores the default state. Called on link establishment and teardown; anything queued or
    /// outstanding is discarded.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn activate(&mut self, peer: DeviceAddress) {
        self.reset();
        self.active = true;
        self.peer = peer;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn peer_address(&self) -> &DeviceAddress {
        &self.peer
    }

    /// The current ATT MTU of this link.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub(crate) fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu;
    }

    /// The security level the link has currently reached.
    pub fn security_level(&self) -> SecurityLevel {
        self.level
    }

    /// Whether the Link Layer reported this link as encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub(crate) fn security_view(&self) -> SecurityView {
        SecurityView {
            level: self.level,
            key_size: self.key_size,
        }
    }

    /// Client configuration flags of configurable characteristic `index` (table order).
    pub fn client_configuration(&self, index: usize) -> u8 {
        self.cccd[index]
    }

    /// Marks configurable characteristic `index` as having a pending notification.
    ///
    /// Idempotent: queueing an already-queued notification has no effect. This is the only
    /// queue operation that may be invoked from interrupt context, and only while no other code
    /// is mutating this connection.
    pub fn queue_notification(&mut self, index: usize) {
        self.notify_pending |= 1 << index;
    }

    /// Marks configurable characteristic `index` as having a pending indication.
    ///
    /// Refused (returns `false`) while a previous indication is still waiting for its
    /// confirmation.
    pub fn queue_indication(&mut self, index: usize) -> bool {
        if self.indicating {
            return false;
        }
        self.indicate_pending |= 1 << index;
        true
    }

    /// Clears the indication-in-flight flag. Called when a *Handle Value Confirmation* arrives.
    pub fn indication_confirmed(&mut self) {
        self.indicating = false;
    }

    pub(crate) fn notify_pending(&self, index: usize) -> bool {
        self.notify_pending & (1 << index) != 0
    }

    pub(crate) fn indicate_pending(&self, index: usize) -> bool {
        self.indicate_pending & (1 << index) != 0
    }

    pub(crate) fn clear_notify_pending(&mut self, index: usize) {
        self.notify_pending &= !(1 << index);
    }

    pub(crate) fn clear_indicate_pending(&mut self, index: usize) {
        self.indicate_pending &= !(1 << index);
    }

    pub(crate) fn is_indicating(&self) -> bool {
        self.indicating
    }

    pub(crate) fn set_indicating(&mut self) {
        self.indicating = true;
    }
}
