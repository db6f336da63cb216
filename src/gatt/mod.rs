//! The Generic Attribute Profile (GATT): schema composition and the attribute table.
//!
//! GATT prescribes how *services* and *characteristics* are laid out as ATT attributes:
//!
//! * Every service starts with a *Primary/Secondary Service Declaration* (type `0x2800`/`0x2801`)
//!   whose value is the service UUID, optionally followed by *Include Declarations* (`0x2802`).
//! * Every characteristic occupies two or more attributes: the *Characteristic Declaration*
//!   (type `0x2803`, value = properties ∥ value handle ∥ UUID), the value attribute itself, a
//!   *Client Characteristic Configuration Descriptor* (`0x2902`) when the characteristic can
//!   notify or indicate, and optionally further descriptors.
//!
//! [`AttributeTable`] performs this flattening in a `const fn`, so the complete layout (handles,
//! CCCD indexes, outgoing drain order) is computed at compile time and lives in a `static`.
//! Schema mistakes (non-ascending pinned handles, writable static values, too many configurable
//! characteristics) fail compilation instead of surfacing at runtime.
//!
//! [`AttributeTable`]: struct.AttributeTable.html

pub mod characteristic;
pub mod schema;

use self::characteristic::{Properties, Security};
use self::schema::{AttributeHandles, CharId, ServiceDef, ValueDef};
use crate::att::{AttUuid, ErrorCode, Handle, HandleRange};
use crate::connection::SecurityView;
use crate::server::Handler;
use crate::uuid::Uuid16;
use core::ops::Range;

/// Attribute type of a Primary Service declaration.
pub const PRIMARY_SERVICE: Uuid16 = Uuid16(0x2800);
/// Attribute type of a Secondary Service declaration.
pub const SECONDARY_SERVICE: Uuid16 = Uuid16(0x2801);
/// Attribute type of an Include declaration.
pub const INCLUDE: Uuid16 = Uuid16(0x2802);
/// Attribute type of a Characteristic declaration.
pub const CHARACTERISTIC: Uuid16 = Uuid16(0x2803);
/// Attribute type of the Characteristic User Description descriptor.
pub const USER_DESCRIPTION: Uuid16 = Uuid16(0x2901);
/// Attribute type of the Client Characteristic Configuration descriptor.
pub const CLIENT_CONFIGURATION: Uuid16 = Uuid16(0x2902);

/// Largest supported number of configurable characteristics per schema.
///
/// The per-connection pending bitmaps are single 64-bit words; the table builder rejects schemas
/// that exceed this.
pub const MAX_CONFIGURABLE: usize = 64;

const MAX_SERVICES: usize = 32;

/// Returns whether `uuid` may be used as the grouping type of a *Read By Group Type* request.
pub(crate) fn is_grouping_attr(uuid: AttUuid) -> bool {
    uuid == PRIMARY_SERVICE || uuid == SECONDARY_SERVICE
}

/// What a table entry is, beyond its handle and type.
#[derive(Copy, Clone)]
pub(crate) enum EntryKind {
    /// Service declaration; value = service UUID.
    Service { uuid: AttUuid, end: Handle },
    /// Include declaration; value = included service handle ∥ end group handle ∥ UUID16.
    Include {
        start: Handle,
        end: Handle,
        uuid16: Option<Uuid16>,
    },
    /// Characteristic declaration; value = props ∥ value handle ∥ UUID.
    Declaration {
        props: Properties,
        value_handle: Handle,
        uuid: AttUuid,
    },
    /// Characteristic value attribute.
    Value {
        char_id: u16,
        props: Properties,
        security: Security,
        value: ValueDef,
    },
    /// Client Characteristic Configuration descriptor.
    Cccd { config_index: u16, security: Security },
    /// Characteristic User Description descriptor.
    Description {
        text: &'static str,
        security: Security,
    },
}

#[derive(Copy, Clone)]
pub(crate) struct Entry {
    pub handle: Handle,
    pub att_type: AttUuid,
    pub kind: EntryKind,
}

impl Entry {
    const EMPTY: Entry = Entry {
        handle: Handle::NULL,
        att_type: AttUuid::uuid16(0),
        kind: EntryKind::Service {
            uuid: AttUuid::uuid16(0),
            end: Handle::NULL,
        },
    };
}

/// Per-configurable-characteristic bookkeeping.
#[derive(Copy, Clone)]
pub(crate) struct ConfigSlot {
    /// Table index of the characteristic's value attribute.
    pub value_index: u16,
    /// Drain rank; lower drains first. Characteristics not raised via
    /// [`ServiceDef::with_raised_priority`] share the lowest rank.
    ///
    /// [`ServiceDef::with_raised_priority`]: schema/struct.ServiceDef.html#method.with_raised_priority
    pub rank: u8,
}

impl ConfigSlot {
    const EMPTY: ConfigSlot = ConfigSlot {
        value_index: 0,
        rank: u8::max_value(),
    };
}

/// Outcome of a successful attribute write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Done,
    /// A CCCD changed; the new flags should be persisted if the link is bonded.
    CccdChanged { config_index: usize },
}

/// The flattened attribute table of a schema.
///
/// `N` must be [`schema::attribute_count`] of the service slice and `C` must be
/// [`schema::config_count`]; mismatches fail const evaluation.
///
/// [`schema::attribute_count`]: schema/fn.attribute_count.html
/// [`schema::config_count`]: schema/fn.config_count.html
pub struct AttributeTable<const N: usize, const C: usize> {
    services: &'static [ServiceDef],
    entries: [Entry; N],
    config: [ConfigSlot; C],
    /// Config indexes in drain order: by rank, then table order.
    drain_order: [u16; C],
}

impl<const N: usize, const C: usize> AttributeTable<N, C> {
    /// Flattens `services` into an attribute table. Evaluated at compile time when assigned to a
    /// `static` or `const`.
    pub const fn new(services: &'static [ServiceDef]) -> Self {
        assert!(C <= MAX_CONFIGURABLE, "too many notifying characteristics");
        assert!(services.len() <= MAX_SERVICES, "too many services");

        let mut entries = [Entry::EMPTY; N];
        let mut config = [ConfigSlot::EMPTY; C];
        let mut svc_start = [0u16; MAX_SERVICES];
        let mut svc_end = [0u16; MAX_SERVICES];

        let mut idx = 0;
        let mut next_handle: u16 = 1;
        let mut char_id: u16 = 0;
        let mut ci: usize = 0;

        let mut s = 0;
        while s < services.len() {
            let svc = &services[s];
            let svc_type = if svc.secondary {
                SECONDARY_SERVICE
            } else {
                PRIMARY_SERVICE
            };

            let svc_handle = next_handle;
            next_handle += 1;
            svc_start[s] = svc_handle;
            let svc_entry = idx;
            idx += 1;
            let mut last_handle = svc_handle;

            // Include declarations come right after the service declaration.
            let mut i = 0;
            while i < svc.includes.len() {
                let target = svc.includes[i];
                assert!(
                    target < s,
                    "a service can only include services declared before it"
                );
                let uuid16 = match services[target].uuid {
                    AttUuid::Uuid16(u) => Some(u),
                    AttUuid::Uuid128(_) => None,
                };
                entries[idx] = Entry {
                    handle: Handle::from_raw(next_handle),
                    att_type: AttUuid::Uuid16(INCLUDE),
                    kind: EntryKind::Include {
                        start: Handle::from_raw(svc_start[target]),
                        end: Handle::from_raw(svc_end[target]),
                        uuid16,
                    },
                };
                last_handle = next_handle;
                next_handle += 1;
                idx += 1;
                i += 1;
            }

            let mut c = 0;
            while c < svc.characteristics.len() {
                let ch = &svc.characteristics[c];
                if ch.props.any_write() {
                    if let ValueDef::Static(_) = ch.value {
                        panic!("schema declares a writable characteristic with a static value");
                    }
                }

                let (decl_h, value_h, cccd_h) = match ch.handles {
                    Some(AttributeHandles { decl, value, cccd }) => {
                        assert!(
                            decl >= next_handle && value > decl && (cccd > value || cccd == 0),
                            "pinned attribute handles must be ascending"
                        );
                        (decl, value, cccd)
                    }
                    None => (next_handle, next_handle + 1, next_handle + 2),
                };

                entries[idx] = Entry {
                    handle: Handle::from_raw(decl_h),
                    att_type: AttUuid::Uuid16(CHARACTERISTIC),
                    kind: EntryKind::Declaration {
                        props: ch.props,
                        value_handle: Handle::from_raw(value_h),
                        uuid: ch.uuid,
                    },
                };
                idx += 1;

                let value_index = idx;
                entries[idx] = Entry {
                    handle: Handle::from_raw(value_h),
                    att_type: ch.uuid,
                    kind: EntryKind::Value {
                        char_id,
                        props: ch.props,
                        security: ch.security,
                        value: ch.value,
                    },
                };
                idx += 1;
                last_handle = value_h;
                next_handle = value_h + 1;

                if ch.props.is_configurable() {
                    assert!(cccd_h >= next_handle, "pinned CCCD handle must be ascending");
                    entries[idx] = Entry {
                        handle: Handle::from_raw(cccd_h),
                        att_type: AttUuid::Uuid16(CLIENT_CONFIGURATION),
                        kind: EntryKind::Cccd {
                            config_index: ci as u16,
                            security: ch.security,
                        },
                    };
                    config[ci] = ConfigSlot {
                        value_index: value_index as u16,
                        rank: raised_rank(svc, ch.uuid),
                    };
                    ci += 1;
                    idx += 1;
                    last_handle = cccd_h;
                    next_handle = cccd_h + 1;
                }

                if let Some(text) = ch.user_description {
                    entries[idx] = Entry {
                        handle: Handle::from_raw(next_handle),
                        att_type: AttUuid::Uuid16(USER_DESCRIPTION),
                        kind: EntryKind::Description {
                            text,
                            security: ch.security,
                        },
                    };
                    last_handle = next_handle;
                    next_handle += 1;
                    idx += 1;
                }

                char_id += 1;
                c += 1;
            }

            svc_end[s] = last_handle;
            entries[svc_entry] = Entry {
                handle: Handle::from_raw(svc_handle),
                att_type: AttUuid::Uuid16(svc_type),
                kind: EntryKind::Service {
                    uuid: svc.uuid,
                    end: Handle::from_raw(last_handle),
                },
            };
            s += 1;
        }

        assert!(idx == N, "N does not match schema::attribute_count");
        assert!(ci == C, "C does not match schema::config_count");

        // Sort config indexes by (rank, table order) to get the outgoing drain order. Selection
        // sort keeps the const evaluator happy and C is tiny.
        let mut drain_order = [0u16; C];
        let mut i = 0;
        while i < C {
            drain_order[i] = i as u16;
            i += 1;
        }
        let mut i = 0;
        while i < C {
            let mut best = i;
            let mut j = i + 1;
            while j < C {
                let (a, b) = (drain_order[j], drain_order[best]);
                if config[a as usize].rank < config[b as usize].rank
                    || (config[a as usize].rank == config[b as usize].rank && a < b)
                {
                    best = j;
                }
                j += 1;
            }
            let tmp = drain_order[i];
            drain_order[i] = drain_order[best];
            drain_order[best] = tmp;
            i += 1;
        }

        Self {
            services,
            entries,
            config,
            drain_order,
        }
    }

    /// The schema this table was built from.
    pub fn services(&self) -> &'static [ServiceDef] {
        self.services
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Looks up the table index of the attribute with the given handle.
    pub(crate) fn find_by_handle(&self, handle: Handle) -> Option<usize> {
        self.entries
            .binary_search_by_key(&handle.as_u16(), |e| e.handle.as_u16())
            .ok()
    }

    /// Returns the table index range covering `range` (which may be empty).
    pub(crate) fn indices_in_range(&self, range: HandleRange) -> Range<usize> {
        let start = self
            .entries
            .partition_point(|e| e.handle.as_u16() < range.start().as_u16());
        let end = self
            .entries
            .partition_point(|e| e.handle.as_u16() <= range.end().as_u16());
        start..end
    }

    /// Config indexes in outgoing-priority order.
    pub(crate) fn drain_order(&self) -> &[u16] {
        &self.drain_order
    }

    /// Table index of the value attribute backing configurable characteristic `ci`.
    pub(crate) fn config_value_index(&self, ci: usize) -> usize {
        self.config[ci].value_index as usize
    }

    /// Properties of the characteristic backing configurable characteristic `ci`.
    pub(crate) fn config_props(&self, ci: usize) -> Properties {
        match self.entries[self.config[ci].value_index as usize].kind {
            EntryKind::Value { props, .. } => props,
            _ => unreachable!(),
        }
    }

    fn access(&self, idx: usize) -> (bool, bool, Security) {
        match self.entries[idx].kind {
            EntryKind::Service { .. } | EntryKind::Include { .. } | EntryKind::Declaration { .. } => {
                (true, false, Security::Open)
            }
            EntryKind::Value {
                props, security, ..
            } => (
                props.contains(Properties::READ),
                props.any_write(),
                security,
            ),
            EntryKind::Cccd { security, .. } => (true, true, security),
            EntryKind::Description { security, .. } => (true, false, security),
        }
    }

    /// Checks read permission and the security gate; must pass before `read_value`.
    pub(crate) fn check_read(&self, idx: usize, view: SecurityView) -> Result<(), ErrorCode> {
        let (readable, _, security) = self.access(idx);
        if !readable {
            return Err(ErrorCode::ReadNotPermitted);
        }
        gate(security, view)
    }

    /// Checks write permission and the security gate; must pass before `write_value`.
    pub(crate) fn check_write(&self, idx: usize, view: SecurityView) -> Result<(), ErrorCode> {
        let (_, writable, security) = self.access(idx);
        if !writable {
            return Err(ErrorCode::WriteNotPermitted);
        }
        gate(security, view)
    }

    /// Materializes the attribute value at `idx`, starting at `offset`, into `out`.
    ///
    /// Returns the number of bytes written, which is `min(out.len(), value_len - offset)`.
    /// Permission checks are the caller's job ([`check_read`](#method.check_read)).
    pub(crate) fn read_value<H: Handler>(
        &self,
        idx: usize,
        offset: usize,
        out: &mut [u8],
        cccd: &[u8],
        handler: &mut H,
    ) -> Result<usize, ErrorCode> {
        match self.entries[idx].kind {
            EntryKind::Service { uuid, .. } => {
                let mut tmp = [0; 16];
                let len = encode_uuid(uuid, &mut tmp);
                serve_slice(&tmp[..len], offset, out)
            }
            EntryKind::Include { start, end, uuid16 } => {
                let mut tmp = [0; 6];
                tmp[..2].copy_from_slice(&start.as_u16().to_le_bytes());
                tmp[2..4].copy_from_slice(&end.as_u16().to_le_bytes());
                let len = match uuid16 {
                    Some(u) => {
                        tmp[4..6].copy_from_slice(&u.0.to_le_bytes());
                        6
                    }
                    None => 4,
                };
                serve_slice(&tmp[..len], offset, out)
            }
            EntryKind::Declaration {
                props,
                value_handle,
                uuid,
            } => {
                let mut tmp = [0; 19];
                tmp[0] = props.bits();
                tmp[1..3].copy_from_slice(&value_handle.as_u16().to_le_bytes());
                let len = 3 + encode_uuid(uuid, &mut tmp[3..]);
                serve_slice(&tmp[..len], offset, out)
            }
            EntryKind::Value { char_id, value, .. } => match value {
                ValueDef::Static(bytes) => serve_slice(bytes, offset, out),
                ValueDef::Delegated => handler.read(CharId(char_id), offset, out),
            },
            EntryKind::Cccd { config_index, .. } => {
                let flags = cccd[config_index as usize];
                serve_slice(&[flags, 0], offset, out)
            }
            EntryKind::Description { text, .. } => serve_slice(text.as_bytes(), offset, out),
        }
    }

    /// Writes an attribute value. Permission checks are the caller's job
    /// ([`check_write`](#method.check_write)).
    pub(crate) fn write_value<H: Handler>(
        &self,
        idx: usize,
        offset: usize,
        data: &[u8],
        cccd: &mut [u8],
        handler: &mut H,
    ) -> Result<WriteOutcome, ErrorCode> {
        match self.entries[idx].kind {
            EntryKind::Value { char_id, value, .. } => match value {
                ValueDef::Delegated => {
                    handler.write(CharId(char_id), offset, data)?;
                    Ok(WriteOutcome::Done)
                }
                ValueDef::Static(_) => Err(ErrorCode::WriteNotPermitted),
            },
            EntryKind::Cccd { config_index, .. } => {
                if offset != 0 {
                    return Err(ErrorCode::InvalidOffset);
                }
                if data.len() != 2 {
                    return Err(ErrorCode::InvalidAttributeValueLength);
                }

                // The pair updated is indexed by the CCCD's *table-order* index, which is not
                // necessarily its position in the outgoing drain order.
                let ci = config_index as usize;
                let props = self.config_props(ci);
                let mut mask = 0;
                if props.contains(Properties::NOTIFY) {
                    mask |= 0x01;
                }
                if props.contains(Properties::INDICATE) {
                    mask |= 0x02;
                }
                cccd[ci] = data[0] & mask;
                Ok(WriteOutcome::CccdChanged { config_index: ci })
            }
            _ => Err(ErrorCode::WriteNotPermitted),
        }
    }
}

/// Encodes a UUID into `out` in wire order, returning the encoded length.
fn encode_uuid(uuid: AttUuid, out: &mut [u8]) -> usize {
    match uuid {
        AttUuid::Uuid16(u) => {
            out[..2].copy_from_slice(&u.0.to_le_bytes());
            2
        }
        AttUuid::Uuid128(u) => {
            let mut le = *u.as_bytes();
            le.reverse();
            out[..16].copy_from_slice(&le);
            16
        }
    }
}

/// Copies `src[offset..]` into `out`, returning the number of bytes copied.
fn serve_slice(src: &[u8], offset: usize, out: &mut [u8]) -> Result<usize, ErrorCode> {
    if offset > src.len() {
        return Err(ErrorCode::InvalidOffset);
    }
    let src = &src[offset..];
    let n = src.len().min(out.len());
    out[..n].copy_from_slice(&src[..n]);
    Ok(n)
}

/// Maps an unmet security requirement to the ATT error the client receives.
fn gate(required: Security, view: SecurityView) -> Result<(), ErrorCode> {
    use crate::connection::SecurityLevel;

    match required {
        Security::Open => Ok(()),
        Security::Encrypted => {
            if view.level == SecurityLevel::NoSecurity {
                Err(ErrorCode::InsufficientEncryption)
            } else if view.key_size < 16 {
                Err(ErrorCode::InsufficientEncryptionKeySize)
            } else {
                Ok(())
            }
        }
        Security::Authenticated => {
            if view.level < SecurityLevel::AuthenticatedEncrypted {
                Err(ErrorCode::InsufficientAuthentication)
            } else if view.key_size < 16 {
                Err(ErrorCode::InsufficientEncryptionKeySize)
            } else {
                Ok(())
            }
        }
        Security::LescAuthenticated => {
            if view.level < SecurityLevel::LescAuthenticated {
                Err(ErrorCode::InsufficientAuthentication)
            } else {
                Ok(())
            }
        }
    }
}

/// Computes the drain rank of a characteristic within its service.
const fn raised_rank(svc: &ServiceDef, uuid: AttUuid) -> u8 {
    let mut i = 0;
    while i < svc.raised_priority.len() {
        if schema::uuid_eq(svc.raised_priority[i], uuid) {
            return i as u8;
        }
        i += 1;
    }
    u8::max_value()
}

#[cfg(test)]
mod tests {
    use super::schema::*;
    use super::*;
    use crate::connection::SecurityLevel;

    struct Values;

    impl crate::server::Handler for Values {
        fn read(
            &mut self,
            chr: CharId,
            offset: usize,
            buf: &mut [u8],
        ) -> Result<usize, ErrorCode> {
            let value: &[u8] = match chr.0 {
                0 => &[1],
                1 => &[2],
                3 => &[4],
                _ => return Err(ErrorCode::UnlikelyError),
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

    const NOTIFY_READ: Properties =
        Properties::from_bits_truncate(Properties::READ.bits() | Properties::NOTIFY.bits());
    const INDICATE_READ: Properties =
        Properties::from_bits_truncate(Properties::READ.bits() | Properties::INDICATE.bits());

    const SERVICES: &[ServiceDef] = &[
        ServiceDef::primary(
            AttUuid::uuid16(0x8C8B),
            &[
                CharacteristicDef::new(AttUuid::uuid16(0x8C8B), NOTIFY_READ, ValueDef::Delegated),
                CharacteristicDef::new(AttUuid::uuid16(0x8C8C), INDICATE_READ, ValueDef::Delegated),
            ],
        )
        .with_raised_priority(&[AttUuid::uuid16(0x8C8C)]),
        ServiceDef::primary(
            AttUuid::uuid16(0x8C8D),
            &[
                CharacteristicDef::new(
                    AttUuid::uuid16(0x8C8D),
                    Properties::READ,
                    ValueDef::Static(&[0xAA]),
                ),
                CharacteristicDef::new(AttUuid::uuid16(0x8C8E), Properties::READ, ValueDef::Delegated)
                    .with_security(Security::Encrypted),
            ],
        ),
    ];

    static TABLE: AttributeTable<{ attribute_count(SERVICES) }, { config_count(SERVICES) }> =
        AttributeTable::new(SERVICES);

    fn open_view() -> crate::connection::SecurityView {
        crate::connection::SecurityView {
            level: SecurityLevel::NoSecurity,
            key_size: 0,
        }
    }

    #[test]
    fn layout() {
        // svc(1) decl(2) val(3) cccd(4) decl(5) val(6) cccd(7) svc(8) decl(9) val(10) decl(11) val(12)
        assert_eq!(TABLE.entries().len(), 12);
        let handles: std::vec::Vec<u16> = TABLE.entries().iter().map(|e| e.handle.as_u16()).collect();
        assert_eq!(handles, (1..=12).collect::<std::vec::Vec<u16>>());

        assert_eq!(TABLE.find_by_handle(Handle::from_raw(3)), Some(2));
        assert_eq!(TABLE.find_by_handle(Handle::from_raw(13)), None);

        match TABLE.entries()[0].kind {
            EntryKind::Service { end, .. } => assert_eq!(end.as_u16(), 7),
            _ => panic!("expected service declaration"),
        }
        match TABLE.entries()[7].kind {
            EntryKind::Service { end, .. } => assert_eq!(end.as_u16(), 12),
            _ => panic!("expected service declaration"),
        }
    }

    #[test]
    fn config_slots_follow_table_order() {
        assert_eq!(TABLE.config_value_index(0), 2);
        assert_eq!(TABLE.config_value_index(1), 5);
        // The raised characteristic drains first, but keeps its table-order config index.
        assert_eq!(TABLE.drain_order(), &[1, 0]);
        assert_eq!(config_index(SERVICES, AttUuid::uuid16(0x8C8C)), 1);
        assert_eq!(characteristic_index(SERVICES, AttUuid::uuid16(0x8C8E)), 3);
    }

    #[test]
    fn declaration_value() {
        let mut buf = [0; 8];
        let n = TABLE
            .read_value(1, 0, &mut buf, &[0; 2], &mut Values)
            .unwrap();
        // props ∥ value handle ∥ UUID
        assert_eq!(&buf[..n], &[0x12, 0x03, 0x00, 0x8B, 0x8C]);
    }

    #[test]
    fn cccd_write_uses_table_order_index_and_property_mask() {
        let mut cccd = [0; 2];
        // Handle 4 is the CCCD of the *first* characteristic (config index 0), even though the
        // second characteristic drains first.
        let idx = TABLE.find_by_handle(Handle::from_raw(4)).unwrap();
        let outcome = TABLE
            .write_value(idx, 0, &[0x01, 0x00], &mut cccd, &mut Values)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::CccdChanged { config_index: 0 });
        assert_eq!(cccd, [0x01, 0x00]);

        // The notify-only characteristic masks out the indicate bit.
        TABLE
            .write_value(idx, 0, &[0x02, 0x00], &mut cccd, &mut Values)
            .unwrap();
        assert_eq!(cccd[0], 0x00);
    }

    #[test]
    fn static_values_reject_writes() {
        let idx = TABLE.find_by_handle(Handle::from_raw(10)).unwrap();
        assert_eq!(
            TABLE.check_write(idx, open_view()),
            Err(ErrorCode::WriteNotPermitted)
        );
    }

    #[test]
    fn security_gate() {
        let idx = TABLE.find_by_handle(Handle::from_raw(12)).unwrap();
        assert_eq!(
            TABLE.check_read(idx, open_view()),
            Err(ErrorCode::InsufficientEncryption)
        );

        let encrypted = crate::connection::SecurityView {
            level: SecurityLevel::UnauthenticatedEncrypted,
            key_size: 16,
        };
        assert_eq!(TABLE.check_read(idx, encrypted), Ok(()));

        let weak_key = crate::connection::SecurityView {
            level: SecurityLevel::UnauthenticatedEncrypted,
            key_size: 7,
        };
        assert_eq!(
            TABLE.check_read(idx, weak_key),
            Err(ErrorCode::InsufficientEncryptionKeySize)
        );
    }

    const INCLUDING: &[ServiceDef] = &[
        ServiceDef::secondary(
            AttUuid::uuid16(0x180A),
            &[CharacteristicDef::new(
                AttUuid::uuid16(0x2A29),
                Properties::READ,
                ValueDef::Static(b"acme"),
            )],
        ),
        ServiceDef::primary(AttUuid::uuid16(0x1809), &[]).with_includes(&[0]),
    ];

    static INCLUDING_TABLE: AttributeTable<
        { attribute_count(INCLUDING) },
        { config_count(INCLUDING) },
    > = AttributeTable::new(INCLUDING);

    #[test]
    fn include_declaration() {
        // secondary svc(1) decl(2) val(3), primary svc(4) include(5)
        let idx = INCLUDING_TABLE.find_by_handle(Handle::from_raw(5)).unwrap();
        let mut buf = [0; 8];
        let n = INCLUDING_TABLE
            .read_value(idx, 0, &mut buf, &[], &mut Values)
            .unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x00, 0x03, 0x00, 0x0A, 0x18]);
    }

    #[test]
    #[should_panic]
    fn rejects_non_ascending_pinned_handles() {
        const BAD: &[ServiceDef] = &[ServiceDef::primary(
            AttUuid::uuid16(0x1234),
            &[CharacteristicDef::new(
                AttUuid::uuid16(0x5678),
                Properties::READ,
                ValueDef::Delegated,
            )
            .with_handles(AttributeHandles {
                decl: 1,
                value: 2,
                cccd: 0,
            })],
        )];
        let _ = AttributeTable::<3, 0>::new(BAD);
    }
}
