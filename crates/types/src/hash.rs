//! 32-byte hash type.
//!
//! [`H256`] is used for block hashes, state roots and the signing digest of
//! headers. Hashing is Keccak256.

use crate::{Error, Result};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash value.
///
/// ```rust
/// use dposcore_types::H256;
///
/// let hash = H256::keccak256(b"hello world");
/// let parsed: H256 = hash.to_hex().parse().unwrap();
/// assert_eq!(hash, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct H256([u8; HASH_SIZE]);

impl H256 {
    /// The all-zero hash.
    pub const NIL: Self = Self([0u8; HASH_SIZE]);

    /// Alias for NIL.
    pub const ZERO: Self = Self::NIL;

    /// Creates a new hash from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice of exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH_SIZE] = slice.try_into().map_err(|_| Error::InvalidLength {
            expected: HASH_SIZE,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Computes the Keccak256 hash of the given data.
    pub fn keccak256(data: &[u8]) -> Self {
        Self(Keccak256::digest(data).into())
    }

    /// Computes the Keccak256 hash of several slices without concatenating them.
    pub fn keccak256_concat(data: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for slice in data {
            hasher.update(slice);
        }
        Self(hasher.finalize().into())
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the hash as a fixed-size byte array.
    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Checks if this is the zero hash.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::NIL
    }

    /// Parses a hash from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if s.len() != HASH_SIZE * 2 {
            return Err(Error::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        Self::from_slice(&hex::decode(s)?)
    }

    /// Returns the hex representation with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::LowerHex for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for H256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for H256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<H256> for [u8; HASH_SIZE] {
    fn from(hash: H256) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<alloy_primitives::B256> for H256 {
    fn from(hash: alloy_primitives::B256) -> Self {
        Self(hash.0)
    }
}

impl From<H256> for alloy_primitives::B256 {
    fn from(hash: H256) -> Self {
        alloy_primitives::B256::from(hash.0)
    }
}

impl Serialize for H256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Encodable for H256 {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for H256 {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            bytes
                .try_into()
                .map(Self)
                .map_err(|_| DecoderError::RlpInvalidLength)
        })
    }
}

/// Computes the Keccak256 hash of the given data.
#[inline]
pub fn keccak256(data: &[u8]) -> H256 {
    H256::keccak256(data)
}
