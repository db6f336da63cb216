//! Declarative GATT schema definitions.
//!
//! A schema is a `const` slice of [`ServiceDef`]s, each holding a slice of
//! [`CharacteristicDef`]s. The [`AttributeTable`](super::AttributeTable) flattens a schema into
//! its final attribute layout entirely at compile time; the helper `const fn`s in this module
//! ([`attribute_count`], [`config_count`]) compute the const-generic parameters the table needs,
//! and [`config_index`] resolves a characteristic UUID to its notification slot at compile time.
//!
//! ```no_run
//! use scree::gatt::schema::{self, CharacteristicDef, ServiceDef, ValueDef};
//! use scree::gatt::characteristic::Properties;
//! use scree::gatt::AttributeTable;
//! use scree::att::AttUuid;
//!
//! const SERVICES: &[ServiceDef] = &[ServiceDef::primary(
//!     AttUuid::uuid16(0x181A),
//!     &[CharacteristicDef::new(
//!         AttUuid::uuid16(0x2A6E),
//!         Properties::from_bits_truncate(Properties::READ.bits() | Properties::NOTIFY.bits()),
//!         ValueDef::Delegated,
//!     )],
//! )];
//!
//! static TABLE: AttributeTable<
//!     { schema::attribute_count(SERVICES) },
//!     { schema::config_count(SERVICES) },
//! > = AttributeTable::new(SERVICES);
//!
//! const TEMPERATURE: usize = schema::config_index(SERVICES, AttUuid::uuid16(0x2A6E));
//! ```
//!
//! [`ServiceDef`]: struct.ServiceDef.html
//! [`CharacteristicDef`]: struct.CharacteristicDef.html
//! [`attribute_count`]: fn.attribute_count.html
//! [`config_count`]: fn.config_count.html
//! [`config_index`]: fn.config_index.html

use crate::att::AttUuid;
use crate::gatt::characteristic::{Properties, Security};
use crate::uuid::Uuid16;

/// Identifies a characteristic by its ordinal across the whole schema, in declaration order.
///
/// This is the key under which [`Handler`](crate::server::Handler) accessors are addressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CharId(pub u16);

/// How a characteristic's value attribute is materialized.
#[derive(Copy, Clone)]
pub enum ValueDef {
    /// A fixed, read-only byte string baked into the schema.
    Static(&'static [u8]),
    /// Reads and writes are delegated to the application's `Handler`, addressed by the
    /// characteristic's [`CharId`].
    ///
    /// [`CharId`]: struct.CharId.html
    Delegated,
}

/// Pins the handles of a characteristic's attributes instead of using the next free ones.
///
/// Pinned handles must still be ascending relative to the rest of the table; the table builder
/// fails compilation otherwise.
#[derive(Copy, Clone)]
pub struct AttributeHandles {
    pub decl: u16,
    pub value: u16,
    /// Ignored when the characteristic has no CCCD.
    pub cccd: u16,
}

/// A characteristic inside a [`ServiceDef`](struct.ServiceDef.html).
#[derive(Copy, Clone)]
pub struct CharacteristicDef {
    pub uuid: AttUuid,
    pub props: Properties,
    pub security: Security,
    pub value: ValueDef,
    pub handles: Option<AttributeHandles>,
    pub user_description: Option<&'static str>,
}

impl CharacteristicDef {
    /// Creates a characteristic with no security requirement and automatic handle assignment.
    pub const fn new(uuid: AttUuid, props: Properties, value: ValueDef) -> Self {
        Self {
            uuid,
            props,
            security: Security::Open,
            value,
            handles: None,
            user_description: None,
        }
    }

    /// Attaches a security requirement to the characteristic's value and descriptors.
    pub const fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Pins the attribute handles.
    pub const fn with_handles(mut self, handles: AttributeHandles) -> Self {
        self.handles = Some(handles);
        self
    }

    /// Adds a *Characteristic User Description* descriptor (type `0x2901`).
    pub const fn with_description(mut self, text: &'static str) -> Self {
        self.user_description = Some(text);
        self
    }
}

/// A primary or secondary service: a contiguous run of characteristics under one UUID.
#[derive(Copy, Clone)]
pub struct ServiceDef {
    pub uuid: AttUuid,
    pub secondary: bool,
    pub characteristics: &'static [CharacteristicDef],
    /// Indexes (into the schema's service list) of services included by this one.
    pub includes: &'static [usize],
    /// Characteristic UUIDs whose outgoing traffic is drained before everything else in this
    /// service, in the order listed.
    pub raised_priority: &'static [AttUuid],
}

impl ServiceDef {
    /// Creates a primary service.
    pub const fn primary(uuid: AttUuid, characteristics: &'static [CharacteristicDef]) -> Self {
        Self {
            uuid,
            secondary: false,
            characteristics,
            includes: &[],
            raised_priority: &[],
        }
    }

    /// Creates a secondary service (only meant to be referenced through includes).
    pub const fn secondary(uuid: AttUuid, characteristics: &'static [CharacteristicDef]) -> Self {
        let mut svc = Self::primary(uuid, characteristics);
        svc.secondary = true;
        svc
    }

    /// Declares service includes by index into the schema's service slice.
    pub const fn with_includes(mut self, includes: &'static [usize]) -> Self {
        self.includes = includes;
        self
    }

    /// Raises the outgoing priority of the listed characteristics above the rest of the service.
    pub const fn with_raised_priority(mut self, uuids: &'static [AttUuid]) -> Self {
        self.raised_priority = uuids;
        self
    }
}

/// Builds the *Device Name* characteristic (`0x2A00`) serving a fixed name.
///
/// Meant to be used together with [`gap_service`](fn.gap_service.html):
///
/// ```no_run
/// # use scree::gatt::schema;
/// const GAP: schema::ServiceDef = schema::gap_service(&[schema::device_name("Thermometer")]);
/// ```
pub const fn device_name(name: &'static str) -> CharacteristicDef {
    CharacteristicDef::new(
        AttUuid::uuid16(0x2A00),
        Properties::READ,
        ValueDef::Static(name.as_bytes()),
    )
}

/// Builds the standard GAP service (`0x1800`) from the given characteristics.
///
/// Append this to the schema's service list; the advertised device name and the GATT *Device
/// Name* characteristic are conventionally the same string.
pub const fn gap_service(characteristics: &'static [CharacteristicDef]) -> ServiceDef {
    ServiceDef::primary(AttUuid::uuid16(0x1800), characteristics)
}

/// Number of attributes a single characteristic occupies.
const fn characteristic_attribute_count(c: &CharacteristicDef) -> usize {
    let mut n = 2; // declaration + value
    if c.props.is_configurable() {
        n += 1; // CCCD
    }
    if c.user_description.is_some() {
        n += 1;
    }
    n
}

/// Total number of attributes the schema flattens into; pass the result as the `N` const-generic
/// parameter of [`AttributeTable`](super::AttributeTable).
pub const fn attribute_count(services: &[ServiceDef]) -> usize {
    let mut n = 0;
    let mut s = 0;
    while s < services.len() {
        n += 1 + services[s].includes.len();
        let chars = services[s].characteristics;
        let mut c = 0;
        while c < chars.len() {
            n += characteristic_attribute_count(&chars[c]);
            c += 1;
        }
        s += 1;
    }
    n
}

/// Number of configurable (notifying or indicating) characteristics; pass the result as the `C`
/// const-generic parameter of [`AttributeTable`](super::AttributeTable).
pub const fn config_count(services: &[ServiceDef]) -> usize {
    let mut n = 0;
    let mut s = 0;
    while s < services.len() {
        let chars = services[s].characteristics;
        let mut c = 0;
        while c < chars.len() {
            if chars[c].props.is_configurable() {
                n += 1;
            }
            c += 1;
        }
        s += 1;
    }
    n
}

/// Compares two schema UUIDs. Strict about width: schemas compare their own declarations, which
/// use a consistent width per characteristic.
pub(crate) const fn uuid_eq(a: AttUuid, b: AttUuid) -> bool {
    match (a, b) {
        (AttUuid::Uuid16(Uuid16(x)), AttUuid::Uuid16(Uuid16(y))) => x == y,
        (AttUuid::Uuid128(x), AttUuid::Uuid128(y)) => {
            let (x, y) = (x.as_bytes(), y.as_bytes());
            let mut i = 0;
            while i < 16 {
                if x[i] != y[i] {
                    return false;
                }
                i += 1;
            }
            true
        }
        _ => false,
    }
}

/// Resolves a characteristic UUID to its configuration (CCCD) index, at compile time.
///
/// The index is the characteristic's ordinal among configurable characteristics in **table
/// order**, the same index [`queue_notification`](crate::server::Server::queue_notification)
/// takes. Evaluation fails unless exactly one configurable characteristic carries the UUID, so an
/// ambiguous or dangling lookup is a compile error.
pub const fn config_index(services: &[ServiceDef], uuid: AttUuid) -> usize {
    let mut found = 0;
    let mut matches = 0;
    let mut ci = 0;
    let mut s = 0;
    while s < services.len() {
        let chars = services[s].characteristics;
        let mut c = 0;
        while c < chars.len() {
            if chars[c].props.is_configurable() {
                if uuid_eq(chars[c].uuid, uuid) {
                    found = ci;
                    matches += 1;
                }
                ci += 1;
            }
            c += 1;
        }
        s += 1;
    }
    match matches {
        0 => panic!("no configurable characteristic with this UUID"),
        1 => found,
        _ => panic!("UUID matches more than one configurable characteristic"),
    }
}

/// Resolves a characteristic UUID to its [`CharId`] ordinal, at compile time.
///
/// Fails evaluation unless exactly one characteristic carries the UUID.
///
/// [`CharId`]: struct.CharId.html
pub const fn characteristic_index(services: &[ServiceDef], uuid: AttUuid) -> usize {
    let mut found = 0;
    let mut matches = 0;
    let mut id = 0;
    let mut s = 0;
    while s < services.len() {
        let chars = services[s].characteristics;
        let mut c = 0;
        while c < chars.len() {
            if uuid_eq(chars[c].uuid, uuid) {
                found = id;
                matches += 1;
            }
            id += 1;
            c += 1;
        }
        s += 1;
    }
    match matches {
        0 => panic!("no characteristic with this UUID"),
        1 => found,
        _ => panic!("UUID matches more than one characteristic"),
    }
}
