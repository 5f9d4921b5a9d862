//! # dposcore Types
//!
//! Core type definitions shared by every dposcore crate.
//!
//! - [`Address`] - 20-byte account / signer addresses
//! - [`H256`] - 32-byte hashes with Keccak256 support
//! - [`BlockNonce`] - the 8-byte vote marker carried in every header
//! - [`Header`] and [`Block`] - the header layout the consensus engine consumes
//!
//! ## Example
//!
//! ```rust
//! use dposcore_types::{Address, Header, H256};
//!
//! let header = Header {
//!     number: 1,
//!     coinbase: Address::ZERO,
//!     ..Default::default()
//! };
//! assert_ne!(header.hash(), H256::NIL);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod block;
pub mod hash;

pub use address::{addresses_to_bytes, Address, ADDRESS_SIZE};
pub use block::{Block, BlockNonce, Header, EMPTY_UNCLE_HASH};
pub use hash::{keccak256, H256, HASH_SIZE};

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or decoding core types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid address format
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// RLP decoding error
    #[error("RLP decode error: {0}")]
    RlpDecode(#[from] rlp::DecoderError),
}
