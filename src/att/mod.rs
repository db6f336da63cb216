//! The Attribute Protocol (ATT).
//!
//! ATT runs over L2CAP channel `0x0004`, which is connected as soon as the Link-Layer connection
//! is established. It exposes a flat list of *attributes*, each consisting of:
//!
//! * A 16-bit *attribute handle* ([`Handle`]), unique on the server and ascending in table order.
//! * A 16- or 128-bit UUID identifying the attribute type ([`AttUuid`]).
//! * The attribute *value*: up to 512 bytes, materialized on demand by an accessor.
//! * A set of permissions restricting reads and writes.
//!
//! GATT is layered on top of this and prescribes how services and characteristics are laid out as
//! attributes; that part lives in the [`gatt`] module. This module contains the wire protocol
//! (opcodes, error codes, request decoding) and the request dispatcher operating on an
//! [`AttributeTable`].
//!
//! ATT is strictly request/response-serial per link: a new client request is only processed once
//! the previous response has been handed to the link layer.
//!
//! [`Handle`]: struct.Handle.html
//! [`AttUuid`]: enum.AttUuid.html
//! [`gatt`]: ../gatt/index.html
//! [`AttributeTable`]: ../gatt/struct.AttributeTable.html

mod handle;
mod pdus;
pub(crate) mod server;
mod uuid;

pub use self::handle::{Handle, HandleRange, RawHandleRange};
pub use self::pdus::{AttError, ErrorCode, Opcode, Request, RequestedType};
pub use self::uuid::AttUuid;

/// The minimum (and default) MTU of the ATT channel, in bytes.
pub const DEFAULT_MTU: u16 = 23;

/// The largest ATT MTU this server can be configured to accept.
///
/// 65 bytes is also what the fixed SMP channel requires when *LE Secure Connections* are in use
/// (a Pairing Public Key PDU is 65 bytes long), so a single TX slot of this size serves both
/// channels.
pub const MAX_MTU: u16 = 65;
