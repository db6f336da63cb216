//! Stack configuration trait.

use crate::bond::BondStore;
use crate::ecdh::EcdhProvider;
use crate::security::SecurityFunctions;
use crate::server::Handler;
use rand_core::{CryptoRng, RngCore};

/// Aggregates the types a [`Server`](crate::server::Server) is built from.
///
/// Defining one configuration type instead of repeating four or five type parameters keeps the
/// server signature readable. Every application defines a type implementing this trait and
/// instantiates `Server` with it:
///
/// ```ignore
/// enum App {}
///
/// impl Config for App {
///     type Handler = Thermometer;
///     type Ecdh = P256Provider;
///     type Rng = ChipRng;
///     type SecurityFunctions = ChipAes;
///     type BondStore = StaticBondStore<4>;
/// }
/// ```
pub trait Config {
    /// The application type supplying characteristic accessors and lifecycle callbacks.
    type Handler: Handler;

    /// P-256 ECDH implementation used by *LE Secure Connections* pairing.
    type Ecdh: EcdhProvider;

    /// Cryptographically secure randomness source for pairing nonces and key generation.
    type Rng: RngCore + CryptoRng;

    /// AES-128 and AES-CMAC primitives for the Security Manager.
    type SecurityFunctions: SecurityFunctions;

    /// Persistence for bonds.
    type BondStore: BondStore;
}
