//! 20-byte address type.
//!
//! Signers, masternodes, vote targets and penalised accounts are all
//! [`Address`] values. Besides hex and EIP-55 display, this module holds the
//! packed-list codec used by header extra-data and the penalties field:
//! a plain concatenation of 20-byte addresses.

use crate::{Error, Result};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Size of an address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// A 20-byte account address.
///
/// ```rust
/// use dposcore_types::Address;
///
/// let addr: Address = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb1".parse().unwrap();
/// assert_eq!(addr.to_string(), "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb1");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The zero address
    pub const ZERO: Self = Self([0u8; ADDRESS_SIZE]);

    /// Creates a new address from a 20-byte array.
    #[inline]
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a slice of exactly 20 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; ADDRESS_SIZE] = slice.try_into().map_err(|_| Error::InvalidLength {
            expected: ADDRESS_SIZE,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Returns the address as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the address as a fixed-size byte array.
    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Checks if this is the zero address.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// EIP-55 mixed-case hex encoding.
    pub fn to_checksum_string(&self) -> String {
        let hex_addr = hex::encode(self.0);
        let hash = Keccak256::digest(hex_addr.as_bytes());

        let mut result = String::with_capacity(2 + ADDRESS_SIZE * 2);
        result.push_str("0x");
        for (i, c) in hex_addr.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                result.push(c.to_ascii_uppercase());
            } else {
                result.push(c);
            }
        }
        result
    }

    /// Parses an address from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if s.len() != ADDRESS_SIZE * 2 {
            return Err(Error::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                s.len()
            )));
        }
        Self::from_slice(&hex::decode(s)?)
    }

    /// Derives an address from a 64-byte uncompressed public key
    /// (without the leading `0x04` tag): the low 20 bytes of its Keccak256.
    pub fn from_public_key(pubkey: &[u8]) -> Self {
        let hash = Keccak256::digest(pubkey);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// Splits a packed byte region into consecutive addresses.
    ///
    /// Trailing bytes that do not form a whole address are ignored; callers
    /// that need strict framing check `len % ADDRESS_SIZE` first.
    pub fn list_from_bytes(bytes: &[u8]) -> Vec<Self> {
        bytes
            .chunks_exact(ADDRESS_SIZE)
            .map(|chunk| {
                let mut arr = [0u8; ADDRESS_SIZE];
                arr.copy_from_slice(chunk);
                Self(arr)
            })
            .collect()
    }
}

/// Packs addresses back to back, the inverse of [`Address::list_from_bytes`].
pub fn addresses_to_bytes(addresses: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addresses.len() * ADDRESS_SIZE);
    for addr in addresses {
        out.extend_from_slice(&addr.0);
    }
    out
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum_string())
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; ADDRESS_SIZE] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(addr: alloy_primitives::Address) -> Self {
        Self(addr.into_array())
    }
}

impl From<Address> for alloy_primitives::Address {
    fn from(addr: Address) -> Self {
        alloy_primitives::Address::from(addr.0)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_checksum_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Encodable for Address {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Address {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            bytes
                .try_into()
                .map(Self)
                .map_err(|_| DecoderError::RlpInvalidLength)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_hex() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb1").unwrap();
        let addr2 = Address::from_hex("742d35Cc6634C0532925a3b844Bc9e7595f0bEb1").unwrap();
        assert_eq!(addr, addr2);
        assert!(!addr.is_zero());
    }

    #[test]
    fn test_checksum_display() {
        // EIP-55 reference vector
        let addr = Address::from_hex("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(addr.to_string(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn test_invalid_address() {
        assert!(Address::from_hex("0x1234").is_err());
        assert!(Address::from_hex("0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG").is_err());
    }

    #[test]
    fn test_packed_list_preserves_order() {
        let list = vec![
            Address::new([3u8; 20]),
            Address::new([1u8; 20]),
            Address::new([2u8; 20]),
        ];
        let packed = addresses_to_bytes(&list);
        assert_eq!(packed.len(), 60);
        assert_eq!(Address::list_from_bytes(&packed), list);
        assert!(Address::list_from_bytes(&[]).is_empty());
    }

    #[test]
    fn test_packed_list_ignores_partial_tail() {
        let mut packed = addresses_to_bytes(&[Address::new([9u8; 20])]);
        packed.extend_from_slice(&[1, 2, 3]);
        assert_eq!(Address::list_from_bytes(&packed), vec![Address::new([9u8; 20])]);
    }

    #[test]
    fn test_address_serde() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb1").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
    }
}
