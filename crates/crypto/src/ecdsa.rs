//! # ECDSA over secp256k1
//!
//! Seals are 65 bytes, `r || s || v`, with `v` the raw recovery id (0 or 1).
//! The legacy 27/28 encoding is rejected so every seal has exactly one byte
//! form. Signing always operates on a prehashed digest.

use crate::{CryptoError, Result};
use dposcore_types::{Address, H256};
use k256::{
    ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand::rngs::OsRng;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 secret key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a random key from the OS RNG.
    pub fn random() -> Self {
        Self {
            inner: SigningKey::from(SecretKey::random(&mut OsRng)),
        }
    }

    /// Creates a key from 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret_key),
        })
    }

    /// Creates a key from hex, with or without `0x`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex.strip_prefix("0x").unwrap_or(hex))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(&arr)
    }

    /// Derives the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// The address controlled by this key.
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Signs a 32-byte digest.
    pub fn sign_prehash(&self, hash: &H256) -> Result<Signature> {
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(hash.as_bytes())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        Ok(Signature {
            r: sig.r().to_bytes().into(),
            s: sig.s().to_bytes().into(),
            v: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address())
            .finish()
    }
}

/// secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Uncompressed point without the leading `0x04` tag.
    pub fn to_uncompressed(&self) -> [u8; 64] {
        let point = self.inner.to_encoded_point(false);
        let mut result = [0u8; 64];
        result.copy_from_slice(&point.as_bytes()[1..65]);
        result
    }

    /// Keccak256 of the uncompressed key, low 20 bytes.
    pub fn to_address(&self) -> Address {
        Address::from_public_key(&self.to_uncompressed())
    }
}

/// Recoverable ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature {
    /// r component
    pub r: [u8; 32],
    /// s component
    pub s: [u8; 32],
    /// recovery id
    pub v: u8,
}

impl Signature {
    /// Parses a 65-byte `r || s || v` seal.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    /// Serializes as `r || s || v`.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Seals carry the raw recovery id, 0 or 1; anything else is rejected.
    fn recovery_id(&self) -> Result<RecoveryId> {
        if self.v > 1 {
            return Err(CryptoError::RecoveryFailed(format!(
                "invalid recovery id {}",
                self.v
            )));
        }
        RecoveryId::from_byte(self.v)
            .ok_or_else(|| CryptoError::RecoveryFailed(format!("invalid recovery id {}", self.v)))
    }

    /// Recovers the public key that produced this signature over `hash`.
    pub fn recover_prehash(&self, hash: &H256) -> Result<PublicKey> {
        let mut rs = [0u8; 64];
        rs[0..32].copy_from_slice(&self.r);
        rs[32..64].copy_from_slice(&self.s);
        let sig = K256Signature::from_bytes((&rs).into())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let inner = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, self.recovery_id()?)
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
        Ok(PublicKey { inner })
    }

    /// Recovers the signer address over `hash`.
    pub fn recover_address(&self, hash: &H256) -> Result<Address> {
        Ok(self.recover_prehash(hash)?.to_address())
    }
}

/// Recovers the address that signed `hash`, given a raw 65-byte seal.
pub fn recover_address(hash: &H256, seal: &[u8]) -> Result<Address> {
    Signature::from_slice(seal)?.recover_address(hash)
}
