//! An embedded BLE peripheral stack core.
//!
//! Scree implements the server half of the *Generic Attribute Profile* and the protocol layers
//! underneath it: the Attribute Protocol (ATT), the L2CAP fixed channels it runs on, and the
//! Security Manager that gates attribute access behind pairing and encryption. The radio, the
//! Link-Layer scheduling and the HCI transport are *not* part of this crate; they talk to it
//! through a small, buffer-oriented boundary.
//!
//! # Structure
//!
//! * A GATT schema is declared as `const` data ([`gatt::schema`]) and flattened into an
//!   [`AttributeTable`] at compile time. The table, the number of configurable characteristics and
//!   every CCCD index are constants; nothing about the schema is allocated at runtime.
//! * A [`Server`] owns the per-link [`Connection`] contexts and dispatches incoming L2CAP frames
//!   to the ATT request pipeline or the Security Manager. Outgoing traffic (responses, queued
//!   notifications and indications, pairing PDUs) is *pulled* by the link layer through
//!   [`Server::l2cap_output`], one frame per call.
//! * Application state is attached through the [`Handler`] trait, which supplies characteristic
//!   value accessors and receives connection lifecycle callbacks.
//!
//! [`AttributeTable`]: gatt/struct.AttributeTable.html
//! [`Server`]: server/struct.Server.html
//! [`Connection`]: connection/struct.Connection.html
//! [`Handler`]: server/trait.Handler.html
//! [`Server::l2cap_output`]: server/struct.Server.html#method.l2cap_output
//! [`gatt::schema`]: gatt/schema/index.html

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
mod utils;
#[macro_use]
mod log;
pub mod att;
pub mod bond;
pub mod bytes;
pub mod config;
pub mod connection;
pub mod ecdh;
mod error;
pub mod gatt;
pub mod l2cap;
pub mod link;
pub mod security;
pub mod server;
pub mod time;
pub mod uuid;

pub use self::error::Error;
