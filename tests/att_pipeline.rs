//! The ATT request pipeline: discovery, reads, writes, queued writes, MTU, error shapes.

mod support;

use scree::att::{AttUuid, ErrorCode};
use scree::bond::StaticBondStore;
use scree::gatt::characteristic::Properties;
use scree::gatt::schema::{
    attribute_count, config_count, CharacteristicDef, CharId, ServiceDef, ValueDef,
};
use scree::gatt::AttributeTable;
use scree::security::Tier;
use scree::server::{Handler, ServerOptions};
use support::*;

const READ_WRITE_NOTIFY: Properties = Properties::from_bits_truncate(
    Properties::READ.bits() | Properties::WRITE.bits() | Properties::NOTIFY.bits(),
);
const READ_WRITE: Properties =
    Properties::from_bits_truncate(Properties::READ.bits() | Properties::WRITE.bits());

/// One writable byte per characteristic; records write offsets for the queued-write tests.
struct Bytes {
    values: [u8; 4],
    writes: Vec<(u16, usize, Vec<u8>)>,
}

impl Bytes {
    fn new(values: [u8; 4]) -> Self {
        Self {
            values,
            writes: Vec::new(),
        }
    }
}

impl Handler for Bytes {
    fn read(&mut self, chr: CharId, offset: usize, buf: &mut [u8]) -> Result<usize, ErrorCode> {
        let value = [self.values[chr.0 as usize]];
        if offset > value.len() {
            return Err(ErrorCode::InvalidOffset);
        }
        let value = &value[offset..];
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write(&mut self, chr: CharId, offset: usize, value: &[u8]) -> Result<(), ErrorCode> {
        self.writes.push((chr.0, offset, value.to_vec()));
        if offset == 0 && value.len() == 1 {
            self.values[chr.0 as usize] = value[0];
        }
        Ok(())
    }
}

/// Two characteristics sharing one UUID: a notifying one and a plain one.
const DOUBLE: &[ServiceDef] = &[ServiceDef::primary(
    AttUuid::uuid16(0x8C8B),
    &[
        CharacteristicDef::new(AttUuid::uuid16(0x8C8B), READ_WRITE_NOTIFY, ValueDef::Delegated),
        CharacteristicDef::new(AttUuid::uuid16(0x8C8B), READ_WRITE, ValueDef::Delegated),
    ],
)];

static DOUBLE_TABLE: AttributeTable<{ attribute_count(DOUBLE) }, { config_count(DOUBLE) }> =
    AttributeTable::new(DOUBLE);

type Fixture<'a> =
    TestServer<'a, Bytes, { attribute_count(DOUBLE) }, { config_count(DOUBLE) }, 1>;

fn fixture<'a>(handler: &'a mut Bytes, bonds: &'a mut StaticBondStore<4>) -> Fixture<'a> {
    let mut server = make_server(
        &DOUBLE_TABLE,
        handler,
        bonds,
        Tier::NoSecurityManager,
        ServerOptions::new(),
    );
    connect(&mut server, 0);
    server
}

#[test]
fn expected_attributes() {
    let mut handler = Bytes::new([1, 2, 0, 0]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // First characteristic declaration: read, write, and notify.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x02, 0x00]).unwrap(),
        [0x0B, 0x1A, 0x03, 0x00, 0x8B, 0x8C]
    );
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x03, 0x00]).unwrap(),
        [0x0B, 0x01]
    );
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x04, 0x00]).unwrap(),
        [0x0B, 0x00, 0x00]
    );

    // Second characteristic: read and write only, no CCCD.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x05, 0x00]).unwrap(),
        [0x0B, 0x0A, 0x06, 0x00, 0x8B, 0x8C]
    );
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x06, 0x00]).unwrap(),
        [0x0B, 0x02]
    );

    // One past the end of the table.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x07, 0x00]).unwrap(),
        [0x01, 0x0A, 0x07, 0x00, 0x0A]
    );
}

#[test]
fn exchange_mtu() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server: Fixture<'_> = make_server(
        &DOUBLE_TABLE,
        &mut handler,
        &mut bonds,
        Tier::NoSecurityManager,
        ServerOptions::new().with_buffer_sizes(65, 65),
    );
    connect(&mut server, 0);

    // Server offers 61; the effective MTU is the smaller of the two.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x02, 0x30, 0x00]).unwrap(),
        [0x03, 0x3D, 0x00]
    );
    assert_eq!(server.connection(0).mtu(), 0x30);

    // A client offering less than 23 is clamped up to the protocol minimum.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x02, 0x05, 0x00]).unwrap(),
        [0x03, 0x3D, 0x00]
    );
    assert_eq!(server.connection(0).mtu(), 23);
}

#[test]
fn read_by_group_type() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]).unwrap(),
        [0x11, 0x06, 0x01, 0x00, 0x06, 0x00, 0x8B, 0x8C]
    );

    // A non-grouping type is rejected.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x03, 0x28]).unwrap(),
        [0x01, 0x10, 0x01, 0x00, 0x10]
    );
}

#[test]
fn find_information() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x04, 0x01, 0x00, 0x03, 0x00]).unwrap(),
        [
            0x05, 0x01, // format: 16-bit UUIDs
            0x01, 0x00, 0x00, 0x28, // Primary Service
            0x02, 0x00, 0x03, 0x28, // Characteristic
            0x03, 0x00, 0x8B, 0x8C, // value
        ]
    );

    // Past the end of the table.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x04, 0x08, 0x00, 0xFF, 0xFF]).unwrap(),
        [0x01, 0x04, 0x08, 0x00, 0x0A]
    );
}

#[test]
fn find_by_type_value() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // Find the 0x8C8B primary service: found handle 1, group end 6.
    assert_eq!(
        att_exchange(
            &mut server,
            0,
            &[0x06, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28, 0x8B, 0x8C]
        )
        .unwrap(),
        [0x07, 0x01, 0x00, 0x06, 0x00]
    );

    // No service with that UUID.
    assert_eq!(
        att_exchange(
            &mut server,
            0,
            &[0x06, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28, 0x00, 0x18]
        )
        .unwrap(),
        [0x01, 0x06, 0x01, 0x00, 0x0A]
    );
}

#[test]
fn read_by_type_returns_cccd_values() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x12, 0x04, 0x00, 0x01, 0x00]).unwrap(),
        [0x13]
    );

    assert_eq!(
        att_exchange(&mut server, 0, &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x02, 0x29]).unwrap(),
        [
            0x09, 0x04, // opcode and tuple size
            0x04, 0x00, 0x01, 0x00, // handle and flags
        ]
    );
}

/// Characteristic 0 is one byte, characteristic 1 is three.
struct MixedSizes;

impl Handler for MixedSizes {
    fn read(&mut self, chr: CharId, offset: usize, buf: &mut [u8]) -> Result<usize, ErrorCode> {
        let value: &[u8] = match chr.0 {
            0 => &[0x01],
            _ => &[0x01, 0x02, 0x03],
        };
        if offset > value.len() {
            return Err(ErrorCode::InvalidOffset);
        }
        let value = &value[offset..];
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }
}

/// *Read By Type* over values of different sizes returns only the prefix of equal-size matches.
#[test]
fn read_by_type_stops_at_size_change() {
    let mut handler = MixedSizes;
    let mut bonds = StaticBondStore::new();
    let mut server = make_server::<_, { attribute_count(DOUBLE) }, { config_count(DOUBLE) }, 1>(
        &DOUBLE_TABLE,
        &mut handler,
        &mut bonds,
        Tier::NoSecurityManager,
        ServerOptions::new(),
    );
    connect(&mut server, 0);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x8B, 0x8C]).unwrap(),
        [0x09, 0x03, 0x03, 0x00, 0x01]
    );
}

#[test]
fn read_blob() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // CCCD is two bytes; offset 1 returns the second one.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0C, 0x04, 0x00, 0x01, 0x00]).unwrap(),
        [0x0D, 0x00]
    );

    // Offset at (or past) the end of the value is invalid.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0C, 0x04, 0x00, 0x02, 0x00]).unwrap(),
        [0x01, 0x0C, 0x04, 0x00, 0x07]
    );
}

#[test]
fn read_multiple() {
    let mut handler = Bytes::new([0x11, 0x22, 0, 0]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // Values are concatenated without length separators.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0E, 0x03, 0x00, 0x06, 0x00]).unwrap(),
        [0x0F, 0x11, 0x22]
    );

    // Fewer than two handles is malformed.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0E, 0x03, 0x00]).unwrap(),
        [0x01, 0x0E, 0x00, 0x00, 0x04]
    );
}

#[test]
fn write_command_is_fire_and_forget() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    server.l2cap_input(0, &att_frame(&[0x52, 0x03, 0x00, 0x77]));
    assert_eq!(drain(&mut server, 0), None);
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x03, 0x00]).unwrap(),
        [0x0B, 0x77]
    );

    // Write commands to non-writable attributes are silently dropped.
    server.l2cap_input(0, &att_frame(&[0x52, 0x02, 0x00, 0x77]));
    assert_eq!(drain(&mut server, 0), None);
}

#[test]
fn write_to_declaration_is_rejected() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x12, 0x02, 0x00, 0x00]).unwrap(),
        [0x01, 0x12, 0x02, 0x00, 0x03]
    );
}

#[test]
fn prepare_and_execute_write() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // The response echoes the request exactly.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x16, 0x03, 0x00, 0x00, 0x00, 0x41]).unwrap(),
        [0x17, 0x03, 0x00, 0x00, 0x00, 0x41]
    );
    assert_eq!(
        att_exchange(&mut server, 0, &[0x16, 0x03, 0x00, 0x01, 0x00, 0x42]).unwrap(),
        [0x17, 0x03, 0x00, 0x01, 0x00, 0x42]
    );

    assert_eq!(att_exchange(&mut server, 0, &[0x18, 0x01]).unwrap(), [0x19]);

    drop(server);
    assert_eq!(
        handler.writes,
        vec![(0, 0, vec![0x41]), (0, 1, vec![0x42])]
    );
}

#[test]
fn execute_write_cancel_drops_the_queue() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x16, 0x03, 0x00, 0x00, 0x00, 0x41]).unwrap(),
        [0x17, 0x03, 0x00, 0x00, 0x00, 0x41]
    );
    assert_eq!(att_exchange(&mut server, 0, &[0x18, 0x00]).unwrap(), [0x19]);
    // Executing again finds an empty queue and still succeeds.
    assert_eq!(att_exchange(&mut server, 0, &[0x18, 0x01]).unwrap(), [0x19]);

    drop(server);
    assert!(handler.writes.is_empty());
}

#[test]
fn prepare_queue_overflow() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    for i in 0..6 {
        assert_eq!(
            att_exchange(&mut server, 0, &[0x16, 0x03, 0x00, i, 0x00, 0x41]).unwrap()[0],
            0x17
        );
    }
    assert_eq!(
        att_exchange(&mut server, 0, &[0x16, 0x03, 0x00, 0x06, 0x00, 0x41]).unwrap(),
        [0x01, 0x16, 0x03, 0x00, 0x09]
    );
}

#[test]
fn unknown_request_and_command() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    // Unknown request: Request Not Supported.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x20, 0x00]).unwrap(),
        [0x01, 0x20, 0x00, 0x00, 0x06]
    );

    // Unknown command (command bit set): ignored.
    assert_eq!(att_exchange(&mut server, 0, &[0x60, 0x00]), None);

    // A response opcode arriving at a server is a protocol violation.
    assert_eq!(
        att_exchange(&mut server, 0, &[0x0B, 0x00]).unwrap(),
        [0x01, 0x0B, 0x00, 0x00, 0x04]
    );
}

#[test]
fn truncated_pdu() {
    let mut handler = Bytes::new([0; 4]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    assert_eq!(
        att_exchange(&mut server, 0, &[0x0A, 0x03]).unwrap(),
        [0x01, 0x0A, 0x00, 0x00, 0x04]
    );
}

/// ATT is request/response-serial: while a response waits to be drained, further requests on
/// the same link are not processed.
#[test]
fn second_request_waits_for_drain() {
    let mut handler = Bytes::new([0x0A, 0x0B, 0, 0]);
    let mut bonds = StaticBondStore::new();
    let mut server = fixture(&mut handler, &mut bonds);

    server.l2cap_input(0, &att_frame(&[0x0A, 0x03, 0x00]));
    // Not drained yet; this one is dropped.
    server.l2cap_input(0, &att_frame(&[0x0A, 0x06, 0x00]));

    assert_eq!(drain(&mut server, 0), Some((0x0004, vec![0x0B, 0x0A])));
    assert_eq!(drain(&mut server, 0), None);
}
