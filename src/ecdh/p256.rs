//! ECDH provider backed by the pure-Rust [`p256`] crate.
//!
//! [`p256`]: https://docs.rs/p256

use super::{EcdhProvider, InvalidPublicKey, PublicKey, SecretKey, SharedSecret};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::EncodedPoint;
use rand_core::{CryptoRng, RngCore};

/// [`EcdhProvider`](super::EcdhProvider) using the `p256` crate.
pub struct P256Provider;

impl EcdhProvider for P256Provider {
    type SecretKey = P256SecretKey;

    fn generate_keypair<R>(&mut self, rng: &mut R) -> (Self::SecretKey, PublicKey)
    where
        R: RngCore + CryptoRng,
    {
        let secret = p256::SecretKey::random(&mut *rng);
        let point = secret.public_key().to_encoded_point(false);

        let mut public = [0; 64];
        public[..32].copy_from_slice(point.x().unwrap());
        public[32..].copy_from_slice(point.y().unwrap());
        (P256SecretKey(secret), PublicKey(public))
    }
}

/// An ephemeral secret key generated by [`P256Provider`](struct.P256Provider.html).
pub struct P256SecretKey(p256::SecretKey);

impl SecretKey for P256SecretKey {
    fn agree(self, foreign_key: &PublicKey) -> Result<SharedSecret, InvalidPublicKey> {
        let point = EncodedPoint::from_affine_coordinates(
            GenericArray::from_slice(&foreign_key.0[..32]),
            GenericArray::from_slice(&foreign_key.0[32..]),
            false,
        );
        let public: Option<p256::PublicKey> = p256::PublicKey::from_encoded_point(&point).into();
        let public = public.ok_or(InvalidPublicKey)?;

        let shared =
            p256::ecdh::diffie_hellman(self.0.to_nonzero_scalar(), public.as_affine());
        let mut out = [0; 32];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(SharedSecret(out))
    }
}
