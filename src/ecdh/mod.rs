//! Elliptic Curve Diffie-Hellman (ECDH) on P-256.
//!
//! *LE Secure Connections* pairing agrees on keys via ECDH on the P-256 curve. This module is the
//! seam for plugging in implementations of the curve operations: the built-in [`P256Provider`]
//! uses the pure-Rust [`p256`] crate and works everywhere, while platforms with a hardware
//! accelerator can supply their own [`EcdhProvider`].
//!
//! [`EcdhProvider`]: trait.EcdhProvider.html
//! [`P256Provider`]: struct.P256Provider.html
//! [`p256`]: https://docs.rs/p256

mod p256;

pub use self::p256::{P256Provider, P256SecretKey};

use core::fmt;
use rand_core::{CryptoRng, RngCore};

/// A P-256 public key (point on the curve) in uncompressed format.
///
/// The first 32 bytes are the big-endian X coordinate, the remaining 32 bytes the big-endian Y
/// coordinate (the *[SEC 1]* encoding without its leading `0x04` byte).
///
/// This type can represent invalid curve points, such as the point at infinity; validation
/// happens in [`SecretKey::agree`], which peers' keys go through.
///
/// [SEC 1]: http://www.secg.org/sec1-v2.pdf
/// [`SecretKey::agree`]: trait.SecretKey.html#tymethod.agree
pub struct PublicKey(pub [u8; 64]);

/// A shared secret resulting from an ECDH key agreement (the X coordinate of the agreed point,
/// big-endian).
pub struct SharedSecret(pub [u8; 32]);

/// Error returned by [`SecretKey::agree`] when the public key of the other party is invalid.
///
/// [`SecretKey::agree`]: trait.SecretKey.html#tymethod.agree
#[derive(Debug)]
pub struct InvalidPublicKey;

impl fmt::Display for InvalidPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid public key")
    }
}

/// Trait for ECDH providers.
pub trait EcdhProvider {
    /// Provider-defined secret key type.
    type SecretKey: SecretKey;

    /// Generates a P-256 key pair using cryptographically strong randomness.
    ///
    /// Implementors must only return valid private/public key pairs. The passed `rng` is
    /// cryptographically secure and may be used as the entropy source; implementations with their
    /// own entropy source may ignore it.
    fn generate_keypair<R>(&mut self, rng: &mut R) -> (Self::SecretKey, PublicKey)
    where
        R: RngCore + CryptoRng;
}

/// Secret key operations required by the pairing procedure.
///
/// No requirements are imposed on the key representation, so this can be implemented for keys
/// held in secure storage.
pub trait SecretKey: Sized {
    /// Performs ECDH key agreement between the ephemeral secret key `self` and the public key of
    /// the other party.
    ///
    /// Taking `self` by value enforces single use of the ephemeral key.
    ///
    /// # Errors
    ///
    /// If `foreign_key` is not a valid point on the curve, an error is returned.
    fn agree(self, foreign_key: &PublicKey) -> Result<SharedSecret, InvalidPublicKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pretend-RNG returning a fixed byte sequence. Do not do this outside of tests.
    pub(crate) struct Rng(pub &'static [u8]);

    impl RngCore for Rng {
        fn next_u32(&mut self) -> u32 {
            rand_core::impls::next_u32_via_fill(self)
        }
        fn next_u64(&mut self) -> u64 {
            rand_core::impls::next_u64_via_fill(self)
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(self.0.len()) {
                chunk.copy_from_slice(&self.0[..chunk.len()]);
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CryptoRng for Rng {}

    static ENTROPY: &[u8] = &[
        0x1e, 0x66, 0x81, 0xb6, 0xa3, 0x4e, 0x06, 0x97, 0x75, 0xbe, 0xd4, 0x5c, 0xf9, 0x52, 0x3f,
        0xf1, 0x5b, 0x6a, 0x72, 0xe2, 0xb8, 0x35, 0xb3, 0x29, 0x5e, 0xe0, 0xbb, 0x92, 0x35, 0xa5,
        0xb9, 0x60,
    ];

    static ENTROPY2: &[u8] = &[
        0xc9, 0xaf, 0xe2, 0x72, 0x12, 0xf1, 0xc4, 0xfc, 0x10, 0x2d, 0x63, 0x2f, 0x05, 0xd6, 0xe5,
        0x0a, 0xbf, 0x2c, 0xb9, 0x02, 0x3a, 0x67, 0x23, 0x63, 0x36, 0x7a, 0x62, 0xe6, 0x63, 0xce,
        0x28, 0x98,
    ];

    #[test]
    fn agreement() {
        let mut provider = P256Provider;
        let (secret1, public1) = provider.generate_keypair(&mut Rng(ENTROPY));
        let (secret2, public2) = provider.generate_keypair(&mut Rng(ENTROPY2));
        assert_ne!(&public1.0[..], &public2.0[..]);

        let shared1 = secret1.agree(&public2).unwrap();
        let shared2 = secret2.agree(&public1).unwrap();
        assert_eq!(shared1.0, shared2.0);
    }

    #[test]
    fn rejects_invalid_keys() {
        let mut provider = P256Provider;

        // Point at infinity.
        let infty = PublicKey([0; 64]);
        let (secret, _) = provider.generate_keypair(&mut Rng(ENTROPY));
        assert!(secret.agree(&infty).is_err());

        // Point not on the curve.
        let mut off_curve = [0x42; 64];
        off_curve[63] = 0x17;
        let (secret, _) = provider.generate_keypair(&mut Rng(ENTROPY));
        assert!(secret.agree(&PublicKey(off_curve)).is_err());
    }
}
