//! Shared fixture code for the wire-level tests.
//!
//! Tests drive the server exactly the way a link-layer driver would: they wrap channel payloads
//! into L2CAP frames, push them through `l2cap_input` and drain `l2cap_output`.

#![allow(dead_code)]

use core::marker::PhantomData;
use rand_core::{CryptoRng, Error, RngCore};
use scree::bond::StaticBondStore;
use scree::config::Config;
use scree::ecdh::P256Provider;
use scree::gatt::AttributeTable;
use scree::link::device_address::{AddressKind, DeviceAddress};
use scree::link::ConnectionDetails;
use scree::security::{SecurityFunctions, SecurityManager, Tier};
use scree::server::{Handler, Server, ServerOptions};

/// Stand-in AES primitives.
///
/// Cryptographically worthless, but deterministic and shared between the server under test and
/// the test's own calls into `security::crypto`, so confirm values and derived keys line up
/// exactly like they would with real AES.
pub struct TestFuncs;

impl SecurityFunctions for TestFuncs {
    fn e(&self, key: &[u8; 16], plaintext: &[u8; 16]) -> [u8; 16] {
        let mut out = [0; 16];
        for i in 0..16 {
            out[i] = (key[i] ^ plaintext[i]).wrapping_add(i as u8).rotate_left(3);
        }
        out
    }

    fn aes_cmac(&self, key: &[u8; 16], message: &[u8]) -> [u8; 16] {
        let mut acc = *key;
        for (i, b) in message.iter().enumerate() {
            acc[i % 16] ^= b.wrapping_add(i as u8);
            acc[(i + 5) % 16] = acc[(i + 5) % 16].rotate_left(1);
        }
        acc
    }
}

/// Deterministic xorshift RNG. Do not do this outside of tests.
pub struct TestRng(u64);

impl TestRng {
    pub fn new() -> Self {
        Self::seeded(0x853C_49E6_748F_EA9B)
    }

    pub fn seeded(seed: u64) -> Self {
        assert_ne!(seed, 0);
        TestRng(seed)
    }
}

impl RngCore for TestRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for TestRng {}

/// Test configuration: application handler `H`, toy crypto, in-memory bonds.
pub struct TestConfig<H>(PhantomData<H>);

impl<H: Handler> Config for TestConfig<H> {
    type Handler = H;
    type Ecdh = P256Provider;
    type Rng = TestRng;
    type SecurityFunctions = TestFuncs;
    type BondStore = StaticBondStore<4>;
}

pub type TestServer<'a, H, const N: usize, const C: usize, const L: usize> =
    Server<'a, TestConfig<H>, N, C, L>;

/// The peer (initiator) address used throughout the tests.
pub const PEER: DeviceAddress =
    DeviceAddress::new([0xA6, 0xA5, 0xA4, 0xA3, 0xA2, 0xA1], AddressKind::Random);

pub fn security_manager<H: Handler>(tier: Tier) -> SecurityManager<TestConfig<H>> {
    SecurityManager::new(tier, TestFuncs, P256Provider, TestRng::new())
}

pub fn make_server<'a, H: Handler, const N: usize, const C: usize, const L: usize>(
    table: &'static AttributeTable<N, C>,
    handler: &'a mut H,
    bonds: &'a mut StaticBondStore<4>,
    tier: Tier,
    options: ServerOptions,
) -> TestServer<'a, H, N, C, L> {
    Server::new(table, handler, security_manager(tier), bonds, options, 0x42)
}

/// Wraps a channel payload into a complete L2CAP frame.
pub fn frame(channel: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&channel.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn att_frame(payload: &[u8]) -> Vec<u8> {
    frame(0x0004, payload)
}

pub fn smp_frame(payload: &[u8]) -> Vec<u8> {
    frame(0x0006, payload)
}

pub fn connect<H: Handler, const N: usize, const C: usize, const L: usize>(
    server: &mut TestServer<'_, H, N, C, L>,
    conn: usize,
) {
    server.ll_connection_established(conn, &ConnectionDetails::UNKNOWN, PEER);
}

/// Drains one outgoing frame and splits it into channel and payload.
pub fn drain<H: Handler, const N: usize, const C: usize, const L: usize>(
    server: &mut TestServer<'_, H, N, C, L>,
    conn: usize,
) -> Option<(u16, Vec<u8>)> {
    let mut buf = [0; 128];
    let len = server.l2cap_output(conn, &mut buf);
    if len == 0 {
        return None;
    }
    assert!(len >= 4, "truncated L2CAP frame");
    let payload_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    let channel = u16::from_le_bytes([buf[2], buf[3]]);
    assert_eq!(payload_len + 4, len, "L2CAP length field mismatch");
    Some((channel, buf[4..len].to_vec()))
}

/// Sends an ATT PDU and returns the response PDU, if any.
pub fn att_exchange<H: Handler, const N: usize, const C: usize, const L: usize>(
    server: &mut TestServer<'_, H, N, C, L>,
    conn: usize,
    pdu: &[u8],
) -> Option<Vec<u8>> {
    server.l2cap_input(conn, &att_frame(pdu));
    drain(server, conn).map(|(channel, payload)| {
        assert_eq!(channel, 0x0004, "response on unexpected channel");
        payload
    })
}

/// Sends an SMP PDU and returns the response PDU, if any.
pub fn smp_exchange<H: Handler, const N: usize, const C: usize, const L: usize>(
    server: &mut TestServer<'_, H, N, C, L>,
    conn: usize,
    pdu: &[u8],
) -> Option<Vec<u8>> {
    server.l2cap_input(conn, &smp_frame(pdu));
    drain(server, conn).map(|(channel, payload)| {
        assert_eq!(channel, 0x0006, "response on unexpected channel");
        payload
    })
}
