//! The peripheral server facade.
//!
//! [`Server`] is the single entry point the link-layer driver talks to:
//!
//! * [`l2cap_input`] takes a received L2CAP frame and dispatches it by channel to the ATT
//!   request pipeline or the Security Manager. Responses are buffered in the connection context.
//! * [`l2cap_output`] is called whenever the driver has a free TX buffer; it emits at most one
//!   frame per call, in priority order: the buffered response, then pending Security Manager
//!   traffic, then queued indications and notifications in the schema's outgoing priority
//!   order.
//! * [`ll_connection_established`] / [`ll_connection_closed`] manage the connection contexts,
//!   [`long_term_key`] and [`on_encryption_changed`] service Link-Layer encryption, and
//!   [`poll`] drives the pairing timeout.
//!
//! Application state is attached via the [`Handler`] trait, held by mutable reference for the
//! server's lifetime.
//!
//! [`Server`]: struct.Server.html
//! [`Handler`]: trait.Handler.html
//! [`l2cap_input`]: struct.Server.html#method.l2cap_input
//! [`l2cap_output`]: struct.Server.html#method.l2cap_output
//! [`ll_connection_established`]: struct.Server.html#method.ll_connection_established
//! [`ll_connection_closed`]: struct.Server.html#method.ll_connection_closed
//! [`long_term_key`]: struct.Server.html#method.long_term_key
//! [`on_encryption_changed`]: struct.Server.html#method.on_encryption_changed
//! [`poll`]: struct.Server.html#method.poll

use crate::att::{self, server::AttributeServer, ErrorCode, Opcode};
use crate::bond::BondStore;
use crate::bytes::{ByteWriter, ToBytes};
use crate::config::Config;
use crate::connection::{Connection, TX_FRAME_CAPACITY};
use crate::gatt::schema::CharId;
use crate::gatt::AttributeTable;
use crate::l2cap::{self, Channel};
use crate::link::ad_structure::{AdStructure, Flags, ServiceUuids};
use crate::link::device_address::{self, AddressKind, DeviceAddress};
use crate::link::ConnectionDetails;
use crate::security::{LongTermKey, SecurityManager};
use crate::time::Instant;
use crate::utils::HexSlice;
use crate::uuid::{Uuid128, Uuid16};

/// The application side of the server: value accessors plus lifecycle callbacks.
///
/// The accessor methods are addressed by [`CharId`], the characteristic's ordinal in schema
/// order; [`schema::characteristic_index`](crate::gatt::schema::characteristic_index) resolves
/// a UUID to it at compile time. Characteristics with [`ValueDef::Static`] values never reach
/// the handler.
///
/// [`CharId`]: ../gatt/schema/struct.CharId.html
/// [`ValueDef::Static`]: ../gatt/schema/enum.ValueDef.html
pub trait Handler {
    /// Materializes the value of `characteristic`, starting at `offset`, into `buf`.
    ///
    /// Returns the number of bytes written: `min(buf.len(), value_length - offset)`. An
    /// `offset` beyond the value must produce `Err(ErrorCode::InvalidOffset)`.
    fn read(
        &mut self,
        characteristic: CharId,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, ErrorCode> {
        let _ = (characteristic, offset, buf);
        Err(ErrorCode::ReadNotPermitted)
    }

    /// Consumes a write to `characteristic` at `offset`.
    fn write(
        &mut self,
        characteristic: CharId,
        offset: usize,
        value: &[u8],
    ) -> Result<(), ErrorCode> {
        let _ = (characteristic, offset, value);
        Err(ErrorCode::WriteNotPermitted)
    }

    /// A Link-Layer connection was established on connection slot `conn`.
    fn connection_established(
        &mut self,
        conn: usize,
        details: &ConnectionDetails,
        peer: &DeviceAddress,
    ) {
        let _ = (conn, details, peer);
    }

    /// The connection on slot `conn` was closed.
    fn connection_closed(&mut self, conn: usize) {
        let _ = conn;
    }

    /// Called in sync with each connection event, from the main loop.
    fn connection_event(&mut self, conn: usize, event_counter: u16, at: Instant) {
        let _ = (conn, event_counter, at);
    }

    /// Supplies the 128-bit out-of-band temporary key for pairing with `peer`, if one was
    /// exchanged over a non-BLE channel.
    fn oob_authentication_data(&mut self, peer: &DeviceAddress) -> Option<[u8; 16]> {
        let _ = peer;
        None
    }
}

/// Device-level options, fixed at construction.
#[derive(Copy, Clone)]
pub struct ServerOptions {
    /// Device name, advertised and (when the schema includes a GAP service) readable.
    pub name: Option<&'static str>,
    /// Fixed static random address bytes (LSB first). When absent, the address is derived from
    /// the controller's address seed.
    pub static_address: Option<[u8; 6]>,
    /// The ATT MTU this server offers during MTU exchange.
    pub max_mtu: u16,
    /// Sleep clock accuracy in ppm, forwarded to the link layer. At most 500.
    pub sleep_clock_accuracy_ppm: u16,
}

impl ServerOptions {
    pub const fn new() -> Self {
        Self {
            name: None,
            static_address: None,
            max_mtu: att::DEFAULT_MTU,
            sleep_clock_accuracy_ppm: 250,
        }
    }

    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub const fn with_static_address(mut self, address: [u8; 6]) -> Self {
        self.static_address = Some(address);
        self
    }

    /// Derives the offered ATT MTU from the link-layer payload buffer sizes.
    ///
    /// The usable MTU is the smaller payload capacity minus the L2CAP header, clamped to the
    /// protocol minimum of 23 and this stack's ceiling of 65.
    pub const fn with_buffer_sizes(mut self, tx: usize, rx: usize) -> Self {
        let payload = if tx < rx { tx } else { rx };
        let mtu = payload.saturating_sub(l2cap::Header::SIZE);
        let mtu = if mtu < att::DEFAULT_MTU as usize {
            att::DEFAULT_MTU as usize
        } else if mtu > att::MAX_MTU as usize {
            att::MAX_MTU as usize
        } else {
            mtu
        };
        self.max_mtu = mtu as u16;
        self
    }

    pub const fn with_sleep_clock_accuracy(mut self, ppm: u16) -> Self {
        assert!(
            ppm <= 500,
            "the highest possible sleep clock accuracy is 500 ppm"
        );
        self.sleep_clock_accuracy_ppm = ppm;
        self
    }
}

/// The GATT server and everything beneath it.
///
/// Type parameters: `C` aggregates the application-provided types ([`Config`]); `N` and `CC` are
/// the schema's attribute and configurable-characteristic counts (from
/// [`schema::attribute_count`] / [`schema::config_count`]); `L` is the number of simultaneous
/// links, typically 1.
///
/// [`Config`]: ../config/trait.Config.html
/// [`schema::attribute_count`]: ../gatt/schema/fn.attribute_count.html
/// [`schema::config_count`]: ../gatt/schema/fn.config_count.html
pub struct Server<'a, C: Config, const N: usize, const CC: usize, const L: usize> {
    table: &'static AttributeTable<N, CC>,
    handler: &'a mut C::Handler,
    bonds: &'a mut C::BondStore,
    security: SecurityManager<C>,
    options: ServerOptions,
    address: DeviceAddress,
    conns: [Connection<CC>; L],
    now: Instant,
}

impl<'a, C: Config, const N: usize, const CC: usize, const L: usize> Server<'a, C, N, CC, L> {
    /// Creates a server from its parts.
    ///
    /// `address_seed` is the controller-provided entropy used when no fixed address is
    /// configured (see [`device_address::static_random`]).
    ///
    /// [`device_address::static_random`]: ../link/device_address/fn.static_random.html
    pub fn new(
        table: &'static AttributeTable<N, CC>,
        handler: &'a mut C::Handler,
        security: SecurityManager<C>,
        bonds: &'a mut C::BondStore,
        options: ServerOptions,
        address_seed: u64,
    ) -> Self {
        let address = match options.static_address {
            Some(bytes) => DeviceAddress::new(bytes, AddressKind::Random),
            None => device_address::static_random(address_seed),
        };
        Self {
            table,
            handler,
            bonds,
            security,
            options,
            address,
            conns: [(); L].map(|()| Connection::new()),
            now: Instant::from_raw_micros(0),
        }
    }

    /// The device address this server uses.
    pub fn device_address(&self) -> &DeviceAddress {
        &self.address
    }

    /// The options this server was built with (the link layer reads the sleep clock accuracy
    /// and buffer-derived MTU from here).
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Read access to a connection context.
    pub fn connection(&self, conn: usize) -> &Connection<CC> {
        &self.conns[conn]
    }

    /// Produces the advertising payload (flags, service UUIDs, device name) into `buf`.
    ///
    /// Structures that do not fit are dropped (the name is shortened first); returns the number
    /// of bytes written.
    pub fn advertising_data(&self, buf: &mut [u8]) -> usize {
        let cap = buf.len();
        let mut w = ByteWriter::new(buf);

        if AdStructure::Flags(Flags::discoverable())
            .to_bytes(&mut w)
            .is_err()
        {
            return 0;
        }

        let mut uuid16s = [Uuid16(0); 8];
        let mut n16 = 0;
        let mut first128: Option<Uuid128> = None;
        for svc in self.table.services() {
            if svc.secondary {
                continue;
            }
            match svc.uuid {
                crate::att::AttUuid::Uuid16(u) => {
                    // The GAP and GATT services are implied; advertising them is just noise.
                    if u.0 != 0x1800 && u.0 != 0x1801 && n16 < uuid16s.len() {
                        uuid16s[n16] = u;
                        n16 += 1;
                    }
                }
                crate::att::AttUuid::Uuid128(u) => {
                    if first128.is_none() {
                        first128 = Some(u);
                    }
                }
            }
        }

        if n16 > 0 {
            let space = w.space_left();
            let fit = if space >= 2 + 2 * n16 {
                n16
            } else {
                space.saturating_sub(2) / 2
            };
            if fit > 0 {
                AdStructure::ServiceUuids16(ServiceUuids::from_uuids(fit == n16, &uuid16s[..fit]))
                    .to_bytes(&mut w)
                    .ok();
            }
        }

        if let Some(uuid) = first128 {
            if w.space_left() >= 2 + 16 {
                AdStructure::ServiceUuids128(ServiceUuids::from_uuids(true, &[uuid]))
                    .to_bytes(&mut w)
                    .ok();
            }
        }

        if let Some(name) = self.options.name {
            let space = w.space_left();
            if space >= 2 + name.len() {
                AdStructure::CompleteLocalName(name).to_bytes(&mut w).ok();
            } else if space > 2 {
                let mut cut = space - 2;
                while cut > 0 && !name.is_char_boundary(cut) {
                    cut -= 1;
                }
                if cut > 0 {
                    AdStructure::ShortenedLocalName(&name[..cut])
                        .to_bytes(&mut w)
                        .ok();
                }
            }
        }

        cap - w.space_left()
    }

    /// Feeds a received L2CAP frame into the stack.
    ///
    /// Any response is buffered in the connection context and picked up by the next
    /// [`l2cap_output`](#method.l2cap_output) call.
    pub fn l2cap_input(&mut self, conn: usize, frame: &[u8]) {
        let (channel, payload) = match l2cap::parse_frame(frame) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("malformed L2CAP frame: {:?} ({:?})", e, HexSlice(frame));
                return;
            }
        };
        if !self.conns[conn].is_active() {
            warn!("L2CAP input for inactive connection {}", conn);
            return;
        }

        match channel {
            Channel::ATT => self.att_input(conn, payload),
            Channel::LE_SECURITY_MANAGER => self.smp_input(conn, payload),
            Channel::LE_SIGNALING => self.signaling_input(conn, payload),
            other => {
                warn!(
                    "ignoring message for unconnected channel {:?}: {:?}",
                    other,
                    HexSlice(payload)
                );
            }
        }
    }

    fn att_input(&mut self, conn: usize, payload: &[u8]) {
        let opcode = Opcode::from(match payload.first() {
            Some(op) => *op,
            None => return,
        });
        let c = &mut self.conns[conn];

        // ATT is strictly serial per link: as long as a response is waiting to be drained, no
        // further request is accepted. Commands and confirmations don't produce responses and
        // pass through.
        let transactional = !opcode.is_command() && opcode != Opcode::HandleValueConfirmation;
        if transactional && !c.tx.is_empty() {
            warn!("dropping {:?}: response still outstanding", opcode);
            return;
        }

        let mut frame = [0; TX_FRAME_CAPACITY];
        let outcome = AttributeServer {
            table: self.table,
            handler: &mut *self.handler,
        }
        .process(c, self.options.max_mtu, payload, &mut frame[4..]);

        if outcome.rsp_len > 0 {
            stage_frame(c, Channel::ATT, &frame, outcome.rsp_len);
        }
        if outcome.cccd_changed {
            if let Some(identity) = c.bonded_identity {
                self.bonds.update_cccd(&identity, &c.cccd);
            }
        }
    }

    fn smp_input(&mut self, conn: usize, payload: &[u8]) {
        let now = self.now;
        let c = &mut self.conns[conn];
        if !c.tx.is_empty() {
            warn!("dropping SMP PDU: response still outstanding");
            return;
        }

        let mut frame = [0; TX_FRAME_CAPACITY];
        let len = {
            let mut w = ByteWriter::new(&mut frame[4..]);
            let cap = w.space_left();
            match self.security.process(
                c,
                &mut *self.handler,
                &mut *self.bonds,
                &self.address,
                payload,
                now,
                &mut w,
            ) {
                Ok(true) => cap - w.space_left(),
                Ok(false) => 0,
                Err(e) => {
                    warn!("malformed SMP PDU: {:?} ({:?})", e, HexSlice(payload));
                    0
                }
            }
        };
        if len > 0 {
            stage_frame(c, Channel::LE_SECURITY_MANAGER, &frame, len);
        }
    }

    fn signaling_input(&mut self, conn: usize, payload: &[u8]) {
        // No signaling procedures are supported; everything that expects an answer gets a
        // Command Reject ("command not understood").
        if payload.len() < 4 || payload[0] == l2cap::signaling::COMMAND_REJECT {
            return;
        }
        let c = &mut self.conns[conn];
        if !c.tx.is_empty() {
            return;
        }
        let mut frame = [0; TX_FRAME_CAPACITY];
        frame[4] = l2cap::signaling::COMMAND_REJECT;
        frame[5] = payload[1]; // identifier of the rejected command
        frame[6..8].copy_from_slice(&2u16.to_le_bytes());
        frame[8..10].copy_from_slice(&l2cap::signaling::REASON_NOT_UNDERSTOOD.to_le_bytes());
        stage_frame(c, Channel::LE_SIGNALING, &frame, 6);
    }

    /// Produces the next outgoing L2CAP frame, if any.
    ///
    /// Drain order: the buffered response, then Security Manager traffic (LESC confirm, key
    /// distribution), then queued notifications and indications in the schema's outgoing
    /// priority order. Returns the frame length, or 0 when there is nothing to send (or `buf`
    /// is too small, in which case the frame stays queued).
    pub fn l2cap_output(&mut self, conn: usize, buf: &mut [u8]) -> usize {
        if !self.conns[conn].is_active() {
            return 0;
        }

        // Phase 1: the buffered response frame.
        if let Some(len) = self.flush_tx(conn, buf) {
            return len;
        }

        // Phase 2: server-initiated security PDUs.
        {
            let c = &mut self.conns[conn];
            let mut frame = [0; TX_FRAME_CAPACITY];
            let len = {
                let mut w = ByteWriter::new(&mut frame[4..]);
                let cap = w.space_left();
                match self
                    .security
                    .pump(c, &mut *self.bonds, &self.address, &mut w)
                {
                    Ok(true) => cap - w.space_left(),
                    _ => 0,
                }
            };
            if len > 0 {
                stage_frame(c, Channel::LE_SECURITY_MANAGER, &frame, len);
                // The frame was just staged, so this drains it (or keeps it queued and
                // reports 0 when `buf` is too small).
                return self.flush_tx(conn, buf).unwrap_or(0);
            }
        }

        // Phase 3: notifications and indications, highest priority first.
        self.drain_subscriptions(conn, buf)
    }

    fn drain_subscriptions(&mut self, conn: usize, buf: &mut [u8]) -> usize {
        let c = &mut self.conns[conn];
        let mtu = usize::from(c.mtu());

        for &ci in self.table.drain_order() {
            let ci = usize::from(ci);

            if c.notify_pending(ci) {
                if c.client_configuration(ci) & 0x01 == 0 {
                    c.clear_notify_pending(ci);
                } else {
                    c.clear_notify_pending(ci);
                    if emit_value_update(
                        self.table,
                        &mut *self.handler,
                        c,
                        ci,
                        Opcode::HandleValueNotification,
                        mtu,
                    )
                    .is_some()
                    {
                        return flush_staged(c, buf);
                    }
                }
            }

            if c.indicate_pending(ci) && !c.is_indicating() {
                if c.client_configuration(ci) & 0x02 == 0 {
                    c.clear_indicate_pending(ci);
                } else {
                    c.clear_indicate_pending(ci);
                    if emit_value_update(
                        self.table,
                        &mut *self.handler,
                        c,
                        ci,
                        Opcode::HandleValueIndication,
                        mtu,
                    )
                    .is_some()
                    {
                        c.set_indicating();
                        return flush_staged(c, buf);
                    }
                }
            }
        }

        0
    }

    /// Copies the staged TX frame into `buf` if it fits; `None` when nothing is staged.
    fn flush_tx(&mut self, conn: usize, buf: &mut [u8]) -> Option<usize> {
        let c = &mut self.conns[conn];
        if c.tx.is_empty() {
            return None;
        }
        if buf.len() < c.tx.len() {
            // Caller's buffer is too small; the frame stays queued.
            return Some(0);
        }
        let len = c.tx.len();
        buf[..len].copy_from_slice(&c.tx);
        c.tx.clear();
        Some(len)
    }

    /// Marks a notification as pending on one connection.
    ///
    /// `index` is the characteristic's configuration index, resolved at compile time via
    /// [`schema::config_index`](crate::gatt::schema::config_index). The value is read when the
    /// notification is actually sent, and nothing is sent unless the client has enabled
    /// notifications on the CCCD.
    pub fn queue_notification(&mut self, conn: usize, index: usize) {
        self.conns[conn].queue_notification(index);
    }

    /// Marks an indication as pending on one connection.
    ///
    /// Refused while another indication awaits its confirmation.
    pub fn queue_indication(&mut self, conn: usize, index: usize) -> bool {
        self.conns[conn].queue_indication(index)
    }

    /// Queues a notification of the characteristic on every active connection.
    pub fn notify(&mut self, index: usize) {
        for c in self.conns.iter_mut().filter(|c| c.is_active()) {
            c.queue_notification(index);
        }
    }

    /// Queues an indication of the characteristic on every active connection.
    ///
    /// Returns `false` if any active connection refused (indication in flight).
    pub fn indicate(&mut self, index: usize) -> bool {
        let mut all = true;
        for c in self.conns.iter_mut().filter(|c| c.is_active()) {
            all &= c.queue_indication(index);
        }
        all
    }

    /// Link-layer upcall: a connection was established on slot `conn`.
    pub fn ll_connection_established(
        &mut self,
        conn: usize,
        details: &ConnectionDetails,
        peer: DeviceAddress,
    ) {
        let c = &mut self.conns[conn];
        c.activate(peer);

        // A known peer gets its subscriptions back.
        if let Some(record) = self.bonds.find(&peer) {
            let n = record.cccd.len().min(c.cccd.len());
            c.cccd[..n].copy_from_slice(&record.cccd[..n]);
            c.bonded_identity = Some(peer);
        }

        self.handler.connection_established(conn, details, &peer);
    }

    /// Link-layer upcall: the connection on slot `conn` was closed.
    ///
    /// Outstanding transactions, queue bits and pairing state are discarded.
    pub fn ll_connection_closed(&mut self, conn: usize) {
        self.conns[conn].reset();
        self.handler.connection_closed(conn);
    }

    /// Link-layer upcall: the peer started encryption with the given EDIV/Rand.
    ///
    /// Returns the key to encrypt with: the in-progress pairing key for zero EDIV/Rand, or the
    /// bonded LTK. `None` means the link layer must reject the encryption request.
    pub fn long_term_key(&self, conn: usize, ediv: u16, rand: u64) -> Option<LongTermKey> {
        self.security
            .long_term_key(&self.conns[conn], &*self.bonds, ediv, rand)
    }

    /// Link-layer upcall: encryption on `conn` was switched on or off.
    pub fn on_encryption_changed(&mut self, conn: usize, enabled: bool) {
        self.security
            .on_encryption_changed(&mut self.conns[conn], &*self.bonds, enabled);
    }

    /// Synchronized connection event callback; also advances the stack's notion of time.
    pub fn connection_event(&mut self, conn: usize, event_counter: u16, at: Instant) {
        self.now = at;
        self.handler.connection_event(conn, event_counter, at);
    }

    /// Drives timeouts. Returns `true` when the link must be terminated (SMP timeout).
    pub fn poll(&mut self, conn: usize, now: Instant) -> bool {
        self.now = now;
        if !self.conns[conn].is_active() {
            return false;
        }
        self.security.check_timeout(&mut self.conns[conn], now)
    }
}

/// Wraps `payload_len` bytes of channel payload (already placed at `frame[4..]`) into the
/// connection's TX slot, filling in the L2CAP header.
fn stage_frame<const CC: usize>(
    c: &mut Connection<CC>,
    channel: Channel,
    frame: &[u8; TX_FRAME_CAPACITY],
    payload_len: usize,
) {
    let mut staged = [0; TX_FRAME_CAPACITY];
    staged.copy_from_slice(frame);
    staged[..2].copy_from_slice(&(payload_len as u16).to_le_bytes());
    staged[2..4].copy_from_slice(&channel.as_raw().to_le_bytes());
    c.tx.clear();
    c.tx.extend_from_slice(&staged[..4 + payload_len]).unwrap();
}

/// Builds a Handle Value Notification/Indication into the connection's TX slot.
///
/// The value is read through the accessor *now*, clipped to MTU − 3. Accessor failures suppress
/// the PDU entirely (the client did not ask for it, so it gets no error either).
fn emit_value_update<H: Handler, const N: usize, const CC: usize>(
    table: &AttributeTable<N, CC>,
    handler: &mut H,
    c: &mut Connection<CC>,
    ci: usize,
    opcode: Opcode,
    mtu: usize,
) -> Option<usize> {
    let vidx = table.config_value_index(ci);
    let handle = table.entries()[vidx].handle;

    let mut frame = [0; TX_FRAME_CAPACITY];
    frame[4] = opcode.raw();
    frame[5..7].copy_from_slice(&handle.as_u16().to_le_bytes());

    let cap = (mtu - 3).min(TX_FRAME_CAPACITY - 7);
    let n = match table.read_value(vidx, 0, &mut frame[7..7 + cap], &c.cccd, handler) {
        Ok(n) => n,
        Err(code) => {
            debug!("suppressing value update for {:?}: {:?}", handle, code);
            return None;
        }
    };

    let payload_len = 3 + n;
    stage_frame(c, Channel::ATT, &frame, payload_len);
    Some(payload_len)
}

/// Drains the frame staged by `emit_value_update`.
fn flush_staged<const CC: usize>(c: &mut Connection<CC>, buf: &mut [u8]) -> usize {
    if buf.len() < c.tx.len() {
        return 0;
    }
    let len = c.tx.len();
    buf[..len].copy_from_slice(&c.tx);
    c.tx.clear();
    len
}
