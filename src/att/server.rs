//! ATT server: request dispatch and response encoding.

use super::{AttError, ErrorCode, Handle, Opcode, Request, RequestedType};
use crate::att::AttUuid;
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::connection::Connection;
use crate::gatt::{self, AttributeTable, EntryKind};
use crate::server::Handler;

/// Result of feeding one ATT PDU into the server.
#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct ProcessOutcome {
    /// Length of the response PDU written into the buffer (0 = no response, eg. for commands).
    pub rsp_len: usize,
    /// Whether a CCCD value changed (the caller persists it when the link is bonded).
    pub cccd_changed: bool,
}

/// Dispatches ATT requests against an attribute table on behalf of one connection.
pub(crate) struct AttributeServer<'a, H: Handler, const N: usize, const C: usize> {
    pub table: &'a AttributeTable<N, C>,
    pub handler: &'a mut H,
}

impl<'a, H: Handler, const N: usize, const C: usize> AttributeServer<'a, H, N, C> {
    /// Processes one incoming ATT PDU and encodes the response (or error response) into
    /// `rsp_buf`, which must hold at least the connection's MTU.
    pub fn process(
        &mut self,
        conn: &mut Connection<C>,
        server_mtu: u16,
        pdu: &[u8],
        rsp_buf: &mut [u8],
    ) -> ProcessOutcome {
        let mtu = usize::from(conn.mtu()).min(rsp_buf.len());
        let rsp = &mut rsp_buf[..mtu];

        let req = match Request::from_bytes(&mut ByteReader::new(pdu)) {
            Ok(req) => req,
            Err(_) => {
                let opcode = pdu.first().copied().unwrap_or(0);
                let len = encode_error(
                    Opcode::from(opcode),
                    AttError::new(ErrorCode::InvalidPdu, Handle::NULL),
                    rsp,
                );
                return ProcessOutcome {
                    rsp_len: len,
                    cccd_changed: false,
                };
            }
        };
        debug!("ATT<- {:?}", req);

        let opcode = req.opcode();
        let mut outcome = ProcessOutcome::default();
        match self.dispatch(conn, server_mtu, &req, rsp, &mut outcome) {
            Ok(len) => outcome.rsp_len = len,
            Err(att_error) => {
                debug!("ATT-> {:?}", att_error);
                outcome.rsp_len = if opcode.is_command() {
                    // Commands are never answered, not even with an error.
                    0
                } else {
                    encode_error(opcode, att_error, rsp)
                };
            }
        }
        outcome
    }

    fn dispatch(
        &mut self,
        conn: &mut Connection<C>,
        server_mtu: u16,
        req: &Request<'_>,
        rsp: &mut [u8],
        outcome: &mut ProcessOutcome,
    ) -> Result<usize, AttError> {
        match *req {
            Request::ExchangeMtu { mtu } => {
                let client = mtu.max(super::DEFAULT_MTU);
                conn.set_mtu(client.min(server_mtu));
                rsp[0] = Opcode::ExchangeMtuRsp.raw();
                rsp[1..3].copy_from_slice(&server_mtu.to_le_bytes());
                Ok(3)
            }

            Request::FindInformation { handle_range } => {
                let range = handle_range.check()?;
                let cap = rsp.len();
                let mut w = ByteWriter::new(rsp);
                w.write_u8(Opcode::FindInformationRsp.raw()).unwrap();
                let format_byte = w.split_next_mut().unwrap();

                let mut format = None;
                for idx in self.table.indices_in_range(range) {
                    let entry = &self.table.entries()[idx];
                    let this_format = match entry.att_type.wire_len() {
                        2 => 0x01,
                        _ => 0x02,
                    };
                    match format {
                        None => format = Some(this_format),
                        Some(f) if f != this_format => break,
                        Some(_) => {}
                    }
                    if w.space_left() < 2 + entry.att_type.wire_len() {
                        break;
                    }
                    entry.handle.to_bytes(&mut w).unwrap();
                    entry.att_type.to_bytes(&mut w).unwrap();
                }

                match format {
                    Some(f) => {
                        *format_byte = f;
                        Ok(cap - w.space_left())
                    }
                    None => Err(AttError::new(ErrorCode::AttributeNotFound, range.start())),
                }
            }

            Request::FindByTypeValue {
                handle_range,
                attribute_type,
                attribute_value,
            } => {
                let range = handle_range.check()?;
                let cap = rsp.len();
                let mut w = ByteWriter::new(rsp);
                w.write_u8(Opcode::FindByTypeValueRsp.raw()).unwrap();

                let mut any = false;
                for idx in self.table.indices_in_range(range) {
                    let entry = &self.table.entries()[idx];
                    if entry.att_type != attribute_type {
                        continue;
                    }
                    if self.table.check_read(idx, conn.security_view()).is_err() {
                        continue;
                    }
                    if !self.value_matches(conn, idx, attribute_value.as_ref()) {
                        continue;
                    }
                    if w.space_left() < 4 {
                        break;
                    }
                    let end = self.group_end_handle(idx);
                    entry.handle.to_bytes(&mut w).unwrap();
                    end.to_bytes(&mut w).unwrap();
                    any = true;
                }

                if any {
                    Ok(cap - w.space_left())
                } else {
                    Err(AttError::new(ErrorCode::AttributeNotFound, range.start()))
                }
            }

            Request::ReadByType {
                handle_range,
                attribute_type,
            } => {
                let range = handle_range.check()?;
                let ty = requested_uuid(attribute_type);
                self.uniform_list(conn, range, rsp, Opcode::ReadByTypeRsp, 2, ty, false)
            }

            Request::ReadByGroup {
                handle_range,
                group_type,
            } => {
                let range = handle_range.check()?;
                let ty = requested_uuid(group_type);
                if !gatt::is_grouping_attr(ty) {
                    return Err(AttError::new(ErrorCode::UnsupportedGroupType, range.start()));
                }
                self.uniform_list(conn, range, rsp, Opcode::ReadByGroupRsp, 4, ty, true)
            }

            Request::Read { handle } => {
                let idx = self.lookup(handle)?;
                self.table
                    .check_read(idx, conn.security_view())
                    .map_err(|code| AttError::new(code, handle))?;
                rsp[0] = Opcode::ReadRsp.raw();
                let n = self
                    .table
                    .read_value(idx, 0, &mut rsp[1..], &conn.cccd, self.handler)
                    .map_err(|code| AttError::new(code, handle))?;
                Ok(1 + n)
            }

            Request::ReadBlob { handle, offset } => {
                let idx = self.lookup(handle)?;
                self.table
                    .check_read(idx, conn.security_view())
                    .map_err(|code| AttError::new(code, handle))?;
                rsp[0] = Opcode::ReadBlobRsp.raw();
                let n = self
                    .table
                    .read_value(
                        idx,
                        usize::from(offset),
                        &mut rsp[1..],
                        &conn.cccd,
                        self.handler,
                    )
                    .map_err(|code| AttError::new(code, handle))?;
                if n == 0 && offset != 0 {
                    // Reading *at* the end of the value is as invalid as reading past it.
                    return Err(AttError::new(ErrorCode::InvalidOffset, handle));
                }
                Ok(1 + n)
            }

            Request::ReadMultiple { handles } => {
                let handles = handles.as_ref();
                if handles.len() < 4 || handles.len() % 2 != 0 {
                    return Err(AttError::new(ErrorCode::InvalidPdu, Handle::NULL));
                }
                rsp[0] = Opcode::ReadMultipleRsp.raw();
                let mut pos = 1;
                let cap = rsp.len();
                for pair in handles.chunks(2) {
                    let handle = Handle::from_raw(u16::from_le_bytes([pair[0], pair[1]]));
                    let idx = self.lookup(handle)?;
                    self.table
                        .check_read(idx, conn.security_view())
                        .map_err(|code| AttError::new(code, handle))?;
                    if pos >= cap {
                        break;
                    }
                    let n = self
                        .table
                        .read_value(idx, 0, &mut rsp[pos..cap], &conn.cccd, self.handler)
                        .map_err(|code| AttError::new(code, handle))?;
                    pos += n;
                }
                Ok(pos)
            }

            Request::Write { handle, value } => {
                self.do_write(conn, handle, 0, value.as_ref(), outcome)?;
                rsp[0] = Opcode::WriteRsp.raw();
                Ok(1)
            }

            Request::WriteCommand { handle, value } => {
                // Fire and forget: errors are deliberately swallowed.
                self.do_write(conn, handle, 0, value.as_ref(), outcome)
                    .ok();
                Ok(0)
            }

            Request::SignedWriteCommand { .. } => {
                // Signature verification is not implemented, so signed writes are ignored
                // rather than applied unverified.
                warn!("ignoring signed write");
                Ok(0)
            }

            Request::PrepareWrite {
                handle,
                offset,
                value,
            } => {
                let idx = self.lookup(handle)?;
                self.table
                    .check_write(idx, conn.security_view())
                    .map_err(|code| AttError::new(code, handle))?;
                conn.prepare_queue
                    .push(handle, offset, value.as_ref())
                    .map_err(|code| AttError::new(code, handle))?;

                let cap = rsp.len();
                let mut w = ByteWriter::new(rsp);
                w.write_u8(Opcode::PrepareWriteRsp.raw()).unwrap();
                w.write_u16_le(handle.as_u16()).unwrap();
                w.write_u16_le(offset).unwrap();
                w.write_slice(value.as_ref())
                    .map_err(|_| AttError::new(ErrorCode::InvalidAttributeValueLength, handle))?;
                Ok(cap - w.space_left())
            }

            Request::ExecuteWrite { flags } => {
                let result = match flags {
                    0x00 => Ok(()),
                    0x01 => self.apply_prepared(conn, outcome),
                    _ => Err(AttError::new(ErrorCode::InvalidPdu, Handle::NULL)),
                };
                conn.prepare_queue.clear();
                result?;
                rsp[0] = Opcode::ExecuteWriteRsp.raw();
                Ok(1)
            }

            Request::Confirmation => {
                conn.indication_confirmed();
                Ok(0)
            }

            Request::Unknown { opcode, .. } => {
                if opcode.is_response() {
                    // Servers produce responses; receiving one is a protocol violation.
                    Err(AttError::new(ErrorCode::InvalidPdu, Handle::NULL))
                } else if opcode.is_command() {
                    // Unknown commands are ignored, per spec.
                    Ok(0)
                } else {
                    Err(AttError::new(ErrorCode::RequestNotSupported, Handle::NULL))
                }
            }
        }
    }

    /// Shared implementation of *Read By Type* and *Read By Group Type*: collects
    /// (handle[, group end], value) tuples of uniform size.
    #[allow(clippy::too_many_arguments)]
    fn uniform_list(
        &mut self,
        conn: &Connection<C>,
        range: crate::att::HandleRange,
        rsp: &mut [u8],
        opcode: Opcode,
        head_size: usize,
        ty: AttUuid,
        groups: bool,
    ) -> Result<usize, AttError> {
        let cap = rsp.len();
        let mut w = ByteWriter::new(rsp);
        w.write_u8(opcode.raw()).unwrap();
        let len_byte = w.split_next_mut().unwrap();

        let mut tmp = [0; 64];
        let value_cap = (cap - 2 - head_size).min(tmp.len());
        let mut size = None;
        let mut any = false;

        for idx in self.table.indices_in_range(range) {
            let entry = &self.table.entries()[idx];
            if entry.att_type != ty {
                continue;
            }

            let access = self
                .table
                .check_read(idx, conn.security_view())
                .and_then(|()| {
                    self.table
                        .read_value(idx, 0, &mut tmp[..value_cap], &conn.cccd, self.handler)
                });
            let n = match access {
                Ok(n) => n,
                Err(code) if !any => return Err(AttError::new(code, entry.handle)),
                Err(_) => break,
            };

            let tuple_size = head_size + n;
            match size {
                None => size = Some(tuple_size),
                Some(s) if s != tuple_size => break,
                Some(_) => {}
            }
            if w.space_left() < tuple_size {
                break;
            }

            entry.handle.to_bytes(&mut w).unwrap();
            if groups {
                self.group_end_handle(idx).to_bytes(&mut w).unwrap();
            }
            w.write_slice(&tmp[..n]).unwrap();
            any = true;
        }

        match size {
            Some(s) => {
                debug_assert!(s <= 255);
                *len_byte = s as u8;
                Ok(cap - w.space_left())
            }
            None => Err(AttError::new(ErrorCode::AttributeNotFound, range.start())),
        }
    }

    fn do_write(
        &mut self,
        conn: &mut Connection<C>,
        handle: Handle,
        offset: u16,
        value: &[u8],
        outcome: &mut ProcessOutcome,
    ) -> Result<(), AttError> {
        let idx = self.lookup(handle)?;
        self.table
            .check_write(idx, conn.security_view())
            .map_err(|code| AttError::new(code, handle))?;
        let result = self
            .table
            .write_value(idx, usize::from(offset), value, &mut conn.cccd, self.handler)
            .map_err(|code| AttError::new(code, handle))?;
        if let gatt::WriteOutcome::CccdChanged { .. } = result {
            outcome.cccd_changed = true;
        }
        Ok(())
    }

    fn apply_prepared(
        &mut self,
        conn: &mut Connection<C>,
        outcome: &mut ProcessOutcome,
    ) -> Result<(), AttError> {
        // The queue is applied in enqueue order; the first failing write aborts and its handle
        // is reported. Split borrows: the queue is only read while the CCCD array is written.
        let prepare_queue = &conn.prepare_queue;
        let cccd = &mut conn.cccd;
        let view = crate::connection::SecurityView {
            level: conn.level,
            key_size: conn.key_size,
        };
        let mut changed = false;

        for (handle, offset, data) in prepare_queue.iter() {
            let idx = self
                .table
                .find_by_handle(handle)
                .ok_or_else(|| AttError::new(ErrorCode::InvalidHandle, handle))?;
            self.table
                .check_write(idx, view)
                .map_err(|code| AttError::new(code, handle))?;
            let result = self
                .table
                .write_value(idx, usize::from(offset), data, cccd, self.handler)
                .map_err(|code| AttError::new(code, handle))?;
            if let gatt::WriteOutcome::CccdChanged { .. } = result {
                changed = true;
            }
        }

        outcome.cccd_changed |= changed;
        Ok(())
    }

    fn lookup(&self, handle: Handle) -> Result<usize, AttError> {
        if handle == Handle::NULL {
            return Err(AttError::new(ErrorCode::InvalidHandle, handle));
        }
        self.table
            .find_by_handle(handle)
            .ok_or_else(|| AttError::new(ErrorCode::AttributeNotFound, handle))
    }

    /// The last handle of the group started by the attribute at `idx` (its own handle for
    /// non-grouping attributes).
    fn group_end_handle(&self, idx: usize) -> Handle {
        match self.table.entries()[idx].kind {
            EntryKind::Service { end, .. } => end,
            _ => self.table.entries()[idx].handle,
        }
    }

    /// Compares an attribute's value against `target` without materializing it in one piece.
    fn value_matches(&mut self, conn: &Connection<C>, idx: usize, target: &[u8]) -> bool {
        let mut tmp = [0; 16];
        let mut off = 0;
        loop {
            let n = match self
                .table
                .read_value(idx, off, &mut tmp, &conn.cccd, self.handler)
            {
                Ok(n) => n,
                Err(_) => return false,
            };
            if off + n > target.len() || tmp[..n] != target[off..off + n] {
                return false;
            }
            off += n;
            if n < tmp.len() {
                break;
            }
        }
        off == target.len()
    }
}

/// Converts the on-wire requested type into an `AttUuid`.
fn requested_uuid(ty: RequestedType) -> AttUuid {
    match ty {
        RequestedType::Uuid16(u) => AttUuid::Uuid16(u),
        RequestedType::Uuid128(u) => AttUuid::Uuid128(u),
    }
}

/// Encodes an *Error Response* for `opcode` into `rsp`; returns its length (always 5).
fn encode_error(opcode: Opcode, error: AttError, rsp: &mut [u8]) -> usize {
    rsp[0] = Opcode::ErrorRsp.raw();
    rsp[1] = opcode.raw();
    rsp[2..4].copy_from_slice(&error.handle().as_u16().to_le_bytes());
    rsp[4] = error.error_code().into();
    5
}
