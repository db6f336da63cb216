//! The LE Security Manager protocol (SMP).
//!
//! The Security Manager runs on L2CAP channel `0x0006` and is responsible for *pairing*:
//! agreeing on keys so the Link Layer can encrypt the connection, and optionally *bonding*:
//! persisting those keys so later connections can skip pairing.
//!
//! # Pairing flavors
//!
//! * **Legacy pairing** (4.0/4.1) derives the Short-Term Key from a Temporary Key known to both
//!   sides. With *Just Works* the TK is zero, which protects against nothing but accidental
//!   connections; with *Out-of-Band* the TK is a 128-bit secret delivered over another channel
//!   (NFC, QR code), which is the only legacy method with meaningful MITM protection. Passkey
//!   entry is not worth much more than Just Works (20 bits of entropy, trivially brute-forced
//!   offline) and is not implemented.
//! * ***LE Secure Connections*** (4.2+) runs ECDH on P-256, so a passive eavesdropper learns
//!   nothing. The shipped method is Just Works (unauthenticated, auto-confirmed numeric
//!   comparison); passkey and user-visible numeric comparison need I/O hardware this stack does
//!   not assume.
//!
//! The responder role (peripheral) is implemented. The state machine lives in the per-connection
//! [`PairingState`]; the [`SecurityManager`] owns the device-wide material (IRK, CSRK, the ECDH
//! provider, the RNG) and interprets incoming PDUs against the state.
//!
//! # Timeout
//!
//! Any pairing state other than idle expires 30 seconds after the last SMP PDU from the peer
//! ([`SMP_TIMEOUT`]); the link is then reported for termination via
//! [`Server::poll`](crate::server::Server::poll).
//!
//! [`PairingState`]: enum.PairingState.html
//! [`SecurityManager`]: struct.SecurityManager.html
//! [`SMP_TIMEOUT`]: constant.SMP_TIMEOUT.html

pub mod crypto;
mod pdus;

pub use self::crypto::SecurityFunctions;
pub use self::pdus::{
    AuthReq, Command, CommandCode, IoCapabilities, KeyDistribution, PairingFeatures, Reason,
};

use self::crypto::{address_bytes, c1, f4, f5, f6, s1};
use crate::bond::{BondRecord, BondStore};
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::config::Config;
use crate::connection::{Connection, SecurityLevel};
use crate::ecdh::{EcdhProvider, PublicKey, SecretKey};
use crate::link::device_address::{AddressKind, DeviceAddress};
use crate::server::Handler;
use crate::time::{Duration, Instant};
use crate::Error;
use core::mem;
use heapless::Vec;
use rand_core::RngCore;

/// Pairing aborts when the peer stays silent for this long.
pub const SMP_TIMEOUT: Duration = Duration::from_secs(30);

/// The security tier a server is configured with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tier {
    /// No Security Manager: every Pairing Request is answered with *Pairing Not Supported*.
    NoSecurityManager,
    /// Legacy pairing only (Just Works and OOB).
    Legacy,
    /// *LE Secure Connections*, falling back to legacy when the initiator does not support it.
    SecureConnections,
}

/// The pairing method in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PairingMethod {
    JustWorks,
    Oob,
}

impl PairingMethod {
    fn authenticated(self) -> bool {
        match self {
            PairingMethod::JustWorks => false,
            PairingMethod::Oob => true,
        }
    }
}

/// Everything agreed on during feature exchange, carried through the rest of the procedure.
#[derive(Copy, Clone)]
pub(crate) struct PairingParams {
    method: PairingMethod,
    lesc: bool,
    bonding: bool,
    /// Negotiated encryption key size; generated keys are masked down to this.
    key_size: u8,
    /// Keys we distribute once encrypted.
    responder_dist: KeyDistribution,
    /// Keys the initiator distributes afterwards.
    initiator_dist: KeyDistribution,
    /// Raw Pairing Request PDU, needed by the confirm value functions.
    preq: [u8; 7],
    /// Raw Pairing Response PDU.
    pres: [u8; 7],
}

/// Keys generated for distribution to the peer.
#[derive(Copy, Clone)]
pub(crate) struct DistributedKeys {
    ltk: [u8; 16],
    ediv: u16,
    rand: u64,
}

/// Per-connection pairing progress. Lives in the [`Connection`](crate::connection::Connection).
pub(crate) enum PairingState {
    Idle,
    /// Legacy: features exchanged, waiting for the initiator's Pairing Confirm.
    WaitConfirm { params: PairingParams, tk: [u8; 16] },
    /// Legacy: our confirm sent, waiting for the initiator's Pairing Random.
    WaitRandom {
        params: PairingParams,
        tk: [u8; 16],
        mconfirm: [u8; 16],
        srand: [u8; 16],
    },
    /// LESC: features exchanged, waiting for the initiator's public key.
    WaitPublicKey { params: PairingParams },
    /// LESC: public key response queued; our confirm goes out with the next outgoing slot.
    ConfirmPending {
        params: PairingParams,
        dh: [u8; 32],
        /// X coordinates of the initiator's and our public key, big-endian.
        pka: [u8; 32],
        pkb: [u8; 32],
        nb: [u8; 16],
    },
    /// LESC: confirm sent, waiting for the initiator's nonce.
    WaitNonce {
        params: PairingParams,
        dh: [u8; 32],
        pka: [u8; 32],
        pkb: [u8; 32],
        nb: [u8; 16],
    },
    /// LESC: nonces exchanged, waiting for the initiator's DHKey check.
    WaitDhKeyCheck {
        params: PairingParams,
        mac_key: [u8; 16],
        ltk: [u8; 16],
        na: [u8; 16],
        nb: [u8; 16],
    },
    /// Phase 2 complete; waiting for the Link Layer to start encryption with `key`.
    AwaitEncryption { params: PairingParams, key: [u8; 16] },
    /// Encrypted; distributing our keys, one PDU per outgoing slot.
    Distributing {
        params: PairingParams,
        keys: DistributedKeys,
        step: u8,
    },
    /// Waiting for the initiator's key distribution.
    AwaitPeerKeys {
        params: PairingParams,
        keys: DistributedKeys,
        remaining: KeyDistribution,
        peer_irk: [u8; 16],
        peer_identity: Option<DeviceAddress>,
    },
}

impl PairingState {
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self, PairingState::Idle)
    }
}

/// The key the Link Layer should start encryption with.
#[derive(Debug)]
pub struct LongTermKey {
    pub key: [u8; 16],
    pub key_size: u8,
}

/// The LE Security Manager: pairing state machine, key generation and distribution.
pub struct SecurityManager<C: Config> {
    tier: Tier,
    io: IoCapabilities,
    funcs: C::SecurityFunctions,
    ecdh: C::Ecdh,
    rng: C::Rng,
    /// Local Identity Resolving Key, distributed with `ID_KEY`.
    irk: [u8; 16],
    /// Local Connection Signature Resolving Key, distributed with `SIGN_KEY`.
    csrk: [u8; 16],
}

impl<C: Config> SecurityManager<C> {
    /// Creates a Security Manager of the given tier.
    ///
    /// The local IRK and CSRK are generated from `rng`; a device that wants stable identity keys
    /// across reboots can override them with [`with_identity_keys`](#method.with_identity_keys).
    pub fn new(tier: Tier, funcs: C::SecurityFunctions, ecdh: C::Ecdh, mut rng: C::Rng) -> Self {
        let mut irk = [0; 16];
        let mut csrk = [0; 16];
        rng.fill_bytes(&mut irk);
        rng.fill_bytes(&mut csrk);
        Self {
            tier,
            io: IoCapabilities::NoInputNoOutput,
            funcs,
            ecdh,
            rng,
            irk,
            csrk,
        }
    }

    /// Overrides the advertised I/O capabilities (default: `NoInputNoOutput`).
    pub fn with_io_capabilities(mut self, io: IoCapabilities) -> Self {
        self.io = io;
        self
    }

    /// Overrides the generated IRK and CSRK.
    pub fn with_identity_keys(mut self, irk: [u8; 16], csrk: [u8; 16]) -> Self {
        self.irk = irk;
        self.csrk = csrk;
        self
    }

    /// Handles an incoming SMP PDU, writing at most one response PDU to `rsp`.
    ///
    /// Returns whether a response was produced.
    pub(crate) fn process<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        handler: &mut C::Handler,
        bonds: &mut C::BondStore,
        own_address: &DeviceAddress,
        payload: &[u8],
        now: Instant,
        rsp: &mut ByteWriter<'_>,
    ) -> Result<bool, Error> {
        let cmd = Command::from_bytes(&mut ByteReader::new(payload))?;
        trace!("SMP<- {:?}", cmd);
        conn.last_smp = Some(now);

        let state = mem::replace(&mut conn.pairing, PairingState::Idle);
        match (cmd, state) {
            (Command::PairingRequest(features), PairingState::Idle) => {
                self.pairing_request(conn, handler, bonds, features, payload, rsp)
            }
            (Command::PairingRequest(_), _) => fail(conn, Reason::UnspecifiedReason, rsp),

            (
                Command::PairingConfirm { value },
                PairingState::WaitConfirm { params, tk },
            ) => {
                let mut srand = [0; 16];
                self.rng.fill_bytes(&mut srand);
                let sconfirm = self.confirm_value(&params, &tk, &srand, conn, own_address);
                conn.pairing = PairingState::WaitRandom {
                    params,
                    tk,
                    mconfirm: value,
                    srand,
                };
                respond(Command::PairingConfirm { value: sconfirm }, rsp)
            }

            (
                Command::PairingRandom { value: mrand },
                PairingState::WaitRandom {
                    params,
                    tk,
                    mconfirm,
                    srand,
                },
            ) => {
                let check = self.confirm_value(&params, &tk, &mrand, conn, own_address);
                if check != mconfirm {
                    debug!("legacy pairing: mconfirm mismatch");
                    return fail(conn, Reason::ConfirmValueFailed, rsp);
                }
                let mut stk = s1(&self.funcs, &tk, &srand, &mrand);
                mask_key(&mut stk, params.key_size);
                conn.pairing = PairingState::AwaitEncryption { params, key: stk };
                respond(Command::PairingRandom { value: srand }, rsp)
            }

            (
                Command::PairingPublicKey { x, y },
                PairingState::WaitPublicKey { params },
            ) => self.peer_public_key(conn, params, x, y, rsp),

            (
                Command::PairingRandom { value },
                PairingState::WaitNonce {
                    params,
                    dh,
                    pka: _,
                    pkb: _,
                    nb,
                },
            ) => {
                let mut na = value;
                na.reverse();
                let a = address_bytes(conn.peer_address());
                let b = address_bytes(own_address);
                let (mac_key, ltk) = f5(&self.funcs, &dh, &na, &nb, &a, &b);
                conn.pairing = PairingState::WaitDhKeyCheck {
                    params,
                    mac_key,
                    ltk,
                    na,
                    nb,
                };
                let mut wire_nb = nb;
                wire_nb.reverse();
                respond(Command::PairingRandom { value: wire_nb }, rsp)
            }

            (
                Command::PairingDhKeyCheck { value },
                PairingState::WaitDhKeyCheck {
                    params,
                    mac_key,
                    ltk,
                    na,
                    nb,
                },
            ) => {
                let a = address_bytes(conn.peer_address());
                let b = address_bytes(own_address);
                let zero = [0; 16];
                // IOcap = AuthReq ∥ OOB flag ∥ IO capability, from the raw feature-exchange PDUs.
                let iocap_a = [params.preq[3], params.preq[2], params.preq[1]];
                let iocap_b = [params.pres[3], params.pres[2], params.pres[1]];

                let mut ea = value;
                ea.reverse();
                let expected = f6(&self.funcs, &mac_key, &na, &nb, &zero, &iocap_a, &a, &b);
                if ea != expected {
                    debug!("LESC pairing: DHKey check mismatch");
                    return fail(conn, Reason::DhKeyCheckFailed, rsp);
                }

                let mut eb = f6(&self.funcs, &mac_key, &nb, &na, &zero, &iocap_b, &b, &a);
                eb.reverse();
                // The LESC LTK lives in PDUs little-endian; keep the stored copy in wire order
                // so encryption setup and bonding treat it like a legacy key.
                let mut key = ltk;
                key.reverse();
                mask_key(&mut key, params.key_size);
                conn.pairing = PairingState::AwaitEncryption { params, key };
                respond(Command::PairingDhKeyCheck { value: eb }, rsp)
            }

            (Command::EncryptionInformation { .. }, PairingState::AwaitPeerKeys { params, keys, remaining, peer_irk, peer_identity }) => {
                // The peer's LTK would only matter if we ever initiated; note it and move on.
                conn.pairing = PairingState::AwaitPeerKeys { params, keys, remaining, peer_irk, peer_identity };
                Ok(false)
            }

            (
                Command::MasterIdentification { .. },
                PairingState::AwaitPeerKeys {
                    params,
                    keys,
                    mut remaining,
                    peer_irk,
                    peer_identity,
                },
            ) => {
                remaining.remove(KeyDistribution::ENC_KEY);
                self.peer_keys_step(conn, bonds, params, keys, remaining, peer_irk, peer_identity)
            }

            (
                Command::IdentityInformation { irk },
                PairingState::AwaitPeerKeys {
                    params,
                    keys,
                    remaining,
                    peer_identity,
                    ..
                },
            ) => {
                conn.pairing = PairingState::AwaitPeerKeys {
                    params,
                    keys,
                    remaining,
                    peer_irk: irk,
                    peer_identity,
                };
                Ok(false)
            }

            (
                Command::IdentityAddressInformation { addr_type, addr },
                PairingState::AwaitPeerKeys {
                    params,
                    keys,
                    mut remaining,
                    peer_irk,
                    ..
                },
            ) => {
                remaining.remove(KeyDistribution::ID_KEY);
                let kind = if addr_type == 0x00 {
                    AddressKind::Public
                } else {
                    AddressKind::Random
                };
                let identity = Some(DeviceAddress::new(addr, kind));
                self.peer_keys_step(conn, bonds, params, keys, remaining, peer_irk, identity)
            }

            (
                Command::SigningInformation { .. },
                PairingState::AwaitPeerKeys {
                    params,
                    keys,
                    mut remaining,
                    peer_irk,
                    peer_identity,
                },
            ) => {
                remaining.remove(KeyDistribution::SIGN_KEY);
                self.peer_keys_step(conn, bonds, params, keys, remaining, peer_irk, peer_identity)
            }

            (Command::PairingFailed { reason }, _) => {
                debug!("peer aborted pairing: {:?}", reason);
                conn.last_smp = None;
                Ok(false)
            }

            // A peripheral never receives Security Requests (it sends them).
            (Command::SecurityRequest { .. }, state) => {
                conn.pairing = state;
                Ok(false)
            }

            (Command::Unknown { code, .. }, _) => {
                warn!("unknown SMP cmd {:?}", code);
                fail(conn, Reason::CommandNotSupported, rsp)
            }

            (cmd, PairingState::Idle) => {
                warn!("unexpected SMP cmd {:?} while idle", cmd.code());
                fail(conn, Reason::CommandNotSupported, rsp)
            }

            (cmd, _) => {
                warn!("SMP cmd {:?} does not match pairing state", cmd.code());
                fail(conn, Reason::UnspecifiedReason, rsp)
            }
        }
    }

    /// Feature exchange: answer a Pairing Request.
    fn pairing_request<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        handler: &mut C::Handler,
        bonds: &mut C::BondStore,
        features: PairingFeatures,
        payload: &[u8],
        rsp: &mut ByteWriter<'_>,
    ) -> Result<bool, Error> {
        if self.tier == Tier::NoSecurityManager {
            return fail(conn, Reason::PairingNotSupported, rsp);
        }
        if payload.len() != 7 {
            return fail(conn, Reason::InvalidParameters, rsp);
        }
        if features.max_key_size < 7 || features.max_key_size > 16 {
            return fail(conn, Reason::InvalidParameters, rsp);
        }

        let mut preq = [0; 7];
        preq.copy_from_slice(payload);

        let local_oob = handler.oob_authentication_data(conn.peer_address());
        let lesc = self.tier == Tier::SecureConnections && features.auth_req.secure_connections();
        let bonding = features.auth_req.bonding() && bonds.supports_bonding();

        let (method, tk) = if !lesc && features.oob && local_oob.is_some() {
            (PairingMethod::Oob, local_oob.unwrap())
        } else {
            (PairingMethod::JustWorks, [0; 16])
        };

        let mut auth_req = AuthReq::NONE;
        auth_req.set_bonding(bonding);
        auth_req.set_secure_connections(self.tier == Tier::SecureConnections);

        let mut supported = KeyDistribution::ID_KEY | KeyDistribution::SIGN_KEY;
        if !lesc {
            supported |= KeyDistribution::ENC_KEY;
        }
        let initiator_dist = if bonding {
            features.initiator_dist & supported
        } else {
            KeyDistribution::empty()
        };
        let responder_dist = if bonding {
            features.responder_dist & supported
        } else {
            KeyDistribution::empty()
        };

        let response = PairingFeatures {
            io: self.io,
            oob: local_oob.is_some(),
            auth_req,
            max_key_size: 16,
            initiator_dist,
            responder_dist,
        };

        let mut pres = [0; 7];
        {
            let mut w = ByteWriter::new(&mut pres);
            Command::PairingResponse(response).to_bytes(&mut w)?;
            debug_assert_eq!(w.space_left(), 0);
        }

        let params = PairingParams {
            method,
            lesc,
            bonding,
            key_size: features.max_key_size.min(16),
            responder_dist,
            initiator_dist,
            preq,
            pres,
        };
        conn.pairing = if lesc {
            PairingState::WaitPublicKey { params }
        } else {
            PairingState::WaitConfirm { params, tk }
        };

        rsp.write_slice(&pres)?;
        Ok(true)
    }

    /// LESC: answer the initiator's public key with ours and prepare the confirm.
    fn peer_public_key<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        params: PairingParams,
        x: [u8; 32],
        y: [u8; 32],
        rsp: &mut ByteWriter<'_>,
    ) -> Result<bool, Error> {
        let mut peer_key = [0; 64];
        for (i, b) in x.iter().rev().enumerate() {
            peer_key[i] = *b;
        }
        for (i, b) in y.iter().rev().enumerate() {
            peer_key[32 + i] = *b;
        }

        let (secret, public) = self.ecdh.generate_keypair(&mut self.rng);
        let dh = match secret.agree(&PublicKey(peer_key)) {
            Ok(shared) => shared.0,
            Err(_) => {
                debug!("LESC pairing: peer public key not on curve");
                return fail(conn, Reason::InvalidParameters, rsp);
            }
        };

        let mut pka = [0; 32];
        pka.copy_from_slice(&peer_key[..32]);
        let mut pkb = [0; 32];
        pkb.copy_from_slice(&public.0[..32]);

        let mut nb = [0; 16];
        self.rng.fill_bytes(&mut nb);

        conn.pairing = PairingState::ConfirmPending {
            params,
            dh,
            pka,
            pkb,
            nb,
        };

        let mut wire_x = [0; 32];
        let mut wire_y = [0; 32];
        for (i, b) in public.0[..32].iter().rev().enumerate() {
            wire_x[i] = *b;
        }
        for (i, b) in public.0[32..].iter().rev().enumerate() {
            wire_y[i] = *b;
        }
        respond(
            Command::PairingPublicKey {
                x: wire_x,
                y: wire_y,
            },
            rsp,
        )
    }

    /// Legacy confirm value over the given 16-byte random.
    fn confirm_value<const CC: usize>(
        &self,
        params: &PairingParams,
        tk: &[u8; 16],
        rand: &[u8; 16],
        conn: &Connection<CC>,
        own_address: &DeviceAddress,
    ) -> [u8; 16] {
        let peer = conn.peer_address();
        c1(
            &self.funcs,
            tk,
            rand,
            &params.preq,
            &params.pres,
            random_flag(peer),
            random_flag(own_address),
            peer.raw(),
            own_address.raw(),
        )
    }

    fn peer_keys_step<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        bonds: &mut C::BondStore,
        params: PairingParams,
        keys: DistributedKeys,
        remaining: KeyDistribution,
        peer_irk: [u8; 16],
        peer_identity: Option<DeviceAddress>,
    ) -> Result<bool, Error> {
        if remaining.is_empty() {
            self.finalize_bond(conn, bonds, &params, &keys, peer_irk, peer_identity);
        } else {
            conn.pairing = PairingState::AwaitPeerKeys {
                params,
                keys,
                remaining,
                peer_irk,
                peer_identity,
            };
        }
        Ok(false)
    }

    /// Emits the next server-initiated SMP PDU, if the pairing state calls for one.
    ///
    /// Invoked from the outgoing drain: the responder sends its LESC confirm and its key
    /// distribution unprompted, one PDU per free outgoing slot.
    pub(crate) fn pump<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        bonds: &mut C::BondStore,
        own_address: &DeviceAddress,
        rsp: &mut ByteWriter<'_>,
    ) -> Result<bool, Error> {
        match mem::replace(&mut conn.pairing, PairingState::Idle) {
            PairingState::ConfirmPending {
                params,
                dh,
                pka,
                pkb,
                nb,
            } => {
                let mut cb = f4(&self.funcs, &pkb, &pka, &nb, 0);
                cb.reverse();
                conn.pairing = PairingState::WaitNonce {
                    params,
                    dh,
                    pka,
                    pkb,
                    nb,
                };
                respond(Command::PairingConfirm { value: cb }, rsp)
            }

            PairingState::Distributing { params, keys, step } => {
                let mut step = step;
                loop {
                    let (cmd, next) = match step {
                        0 if params.responder_dist.contains(KeyDistribution::ENC_KEY) => (
                            Some(Command::EncryptionInformation { ltk: keys.ltk }),
                            1,
                        ),
                        1 if params.responder_dist.contains(KeyDistribution::ENC_KEY) => (
                            Some(Command::MasterIdentification {
                                ediv: keys.ediv,
                                rand: keys.rand,
                            }),
                            2,
                        ),
                        0 | 1 => (None, 2),
                        2 if params.responder_dist.contains(KeyDistribution::ID_KEY) => {
                            (Some(Command::IdentityInformation { irk: self.irk }), 3)
                        }
                        3 if params.responder_dist.contains(KeyDistribution::ID_KEY) => (
                            Some(Command::IdentityAddressInformation {
                                addr_type: match own_address.kind() {
                                    AddressKind::Public => 0x00,
                                    AddressKind::Random => 0x01,
                                },
                                addr: *own_address.raw(),
                            }),
                            4,
                        ),
                        2 | 3 => (None, 4),
                        4 if params.responder_dist.contains(KeyDistribution::SIGN_KEY) => {
                            (Some(Command::SigningInformation { csrk: self.csrk }), 5)
                        }
                        _ => {
                            // Our distribution is done.
                            if params.initiator_dist.is_empty() {
                                self.finalize_bond(conn, bonds, &params, &keys, [0; 16], None);
                            } else {
                                conn.pairing = PairingState::AwaitPeerKeys {
                                    params,
                                    keys,
                                    remaining: params.initiator_dist,
                                    peer_irk: [0; 16],
                                    peer_identity: None,
                                };
                            }
                            return Ok(false);
                        }
                    };
                    match cmd {
                        Some(cmd) => {
                            conn.pairing = PairingState::Distributing {
                                params,
                                keys,
                                step: next,
                            };
                            return respond(cmd, rsp);
                        }
                        None => step = next,
                    }
                }
            }

            other => {
                conn.pairing = other;
                Ok(false)
            }
        }
    }

    /// Resolves the key for a Link-Layer encryption start.
    ///
    /// EDIV and Rand of zero select the key of the pairing in progress (the STK, or the LESC
    /// LTK); anything else is looked up in the bond store.
    pub(crate) fn long_term_key<const CC: usize>(
        &self,
        conn: &Connection<CC>,
        bonds: &C::BondStore,
        ediv: u16,
        rand: u64,
    ) -> Option<LongTermKey> {
        if let PairingState::AwaitEncryption { key, params } = &conn.pairing {
            if ediv == 0 && rand == 0 {
                return Some(LongTermKey {
                    key: *key,
                    key_size: params.key_size,
                });
            }
        }

        let identity = conn.bonded_identity?;
        let record = bonds.find(&identity)?;
        if record.ediv == ediv && record.rand == rand {
            Some(LongTermKey {
                key: record.ltk,
                key_size: record.ltk_size,
            })
        } else {
            None
        }
    }

    /// Reacts to the Link Layer reporting an encryption change.
    pub(crate) fn on_encryption_changed<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        bonds: &C::BondStore,
        enabled: bool,
    ) {
        conn.encrypted = enabled;
        if !enabled {
            conn.level = SecurityLevel::NoSecurity;
            conn.key_size = 0;
            return;
        }

        match mem::replace(&mut conn.pairing, PairingState::Idle) {
            PairingState::AwaitEncryption { params, key } => {
                conn.key_size = params.key_size;
                conn.level = level_for(params.method.authenticated(), params.lesc);

                if params.bonding {
                    let keys = if params.lesc {
                        DistributedKeys {
                            ltk: key,
                            ediv: 0,
                            rand: 0,
                        }
                    } else {
                        // Legacy: the distributed LTK is fresh key material, unrelated to the
                        // STK that encrypts this session.
                        let mut ltk = [0; 16];
                        self.rng.fill_bytes(&mut ltk);
                        mask_key(&mut ltk, params.key_size);
                        DistributedKeys {
                            ltk,
                            ediv: self.rng.next_u32() as u16,
                            rand: self.rng.next_u64(),
                        }
                    };
                    conn.pairing = PairingState::Distributing {
                        params,
                        keys,
                        step: 0,
                    };
                }
            }
            other => {
                conn.pairing = other;
                // Reconnect with a bonded peer: the level comes from the stored record.
                if let Some(record) = conn.bonded_identity.and_then(|id| bonds.find(&id)) {
                    conn.key_size = record.ltk_size;
                    conn.level = level_for(record.authenticated, record.lesc);
                }
            }
        }
    }

    /// Checks the SMP timeout; returns `true` when the link must be terminated.
    pub(crate) fn check_timeout<const CC: usize>(
        &self,
        conn: &mut Connection<CC>,
        now: Instant,
    ) -> bool {
        if conn.pairing.is_idle() {
            return false;
        }
        match conn.last_smp {
            Some(last) if now.duration_since(last) >= SMP_TIMEOUT => {
                warn!("SMP timeout, terminating link");
                conn.pairing = PairingState::Idle;
                conn.last_smp = None;
                true
            }
            _ => false,
        }
    }

    fn finalize_bond<const CC: usize>(
        &mut self,
        conn: &mut Connection<CC>,
        bonds: &mut C::BondStore,
        params: &PairingParams,
        keys: &DistributedKeys,
        peer_irk: [u8; 16],
        peer_identity: Option<DeviceAddress>,
    ) {
        let identity = peer_identity.unwrap_or(*conn.peer_address());
        let record = BondRecord {
            identity,
            irk: peer_irk,
            ltk: keys.ltk,
            ltk_size: params.key_size,
            authenticated: params.method.authenticated(),
            lesc: params.lesc,
            ediv: keys.ediv,
            rand: keys.rand,
            cccd: Vec::from_slice(&conn.cccd).unwrap_or_else(|_| Vec::new()),
        };
        if bonds.save(record).is_ok() {
            conn.bonded_identity = Some(identity);
        } else {
            warn!("bond store full, bond not persisted");
        }
        conn.pairing = PairingState::Idle;
        conn.last_smp = None;
    }
}

/// Maps a completed pairing to the resulting security level.
fn level_for(authenticated: bool, lesc: bool) -> SecurityLevel {
    match (authenticated, lesc) {
        (true, true) => SecurityLevel::LescAuthenticated,
        (true, false) => SecurityLevel::AuthenticatedEncrypted,
        (false, _) => SecurityLevel::UnauthenticatedEncrypted,
    }
}

/// Shortens a key to the negotiated size by zeroing its most significant octets.
fn mask_key(key: &mut [u8; 16], size: u8) {
    for b in key.iter_mut().skip(usize::from(size)) {
        *b = 0;
    }
}

fn random_flag(addr: &DeviceAddress) -> u8 {
    match addr.kind() {
        AddressKind::Public => 0x00,
        AddressKind::Random => 0x01,
    }
}

/// Aborts the pairing procedure with a *Pairing Failed* PDU.
fn fail<const CC: usize>(
    conn: &mut Connection<CC>,
    reason: Reason,
    rsp: &mut ByteWriter<'_>,
) -> Result<bool, Error> {
    conn.pairing = PairingState::Idle;
    conn.last_smp = None;
    respond(Command::PairingFailed { reason }, rsp)
}

fn respond(cmd: Command<'_>, rsp: &mut ByteWriter<'_>) -> Result<bool, Error> {
    trace!("SMP-> {:?}", cmd);
    cmd.to_bytes(rsp)?;
    Ok(true)
}
