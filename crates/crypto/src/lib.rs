//! # dposcore Crypto
//!
//! secp256k1 primitives for header sealing:
//! - [`PrivateKey`] signs 32-byte digests, producing 65-byte `r || s || v` seals
//! - [`Signature::recover_address`] recovers the signer [`Address`] of a seal
//!
//! ## Example
//!
//! ```rust
//! use dposcore_crypto::{recover_address, PrivateKey};
//! use dposcore_types::H256;
//!
//! let key = PrivateKey::from_bytes(&[7u8; 32]).unwrap();
//! let digest = H256::keccak256(b"header");
//! let seal = key.sign_prehash(&digest).unwrap().to_bytes();
//! assert_eq!(recover_address(&digest, &seal).unwrap(), key.address());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ecdsa;

pub use ecdsa::{recover_address, PrivateKey, PublicKey, Signature, SIGNATURE_LENGTH};

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Failed to recover public key from signature
    #[error("failed to recover public key: {0}")]
    RecoveryFailed(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Hex decoding error
    #[error("hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
