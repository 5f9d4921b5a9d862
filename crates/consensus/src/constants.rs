//! Protocol constants.

/// Fixed number of extra-data prefix bytes reserved for signer vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the creator seal.
pub const EXTRA_SEAL: usize = 65;

/// Width of one entry in the validator-index blob.
pub const M2_BYTE_LENGTH: usize = 4;

/// Recent snapshots kept in memory.
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Recent creator and validator signatures kept in memory.
pub const INMEMORY_SIGNATURES: usize = 4096;

/// Headers remembered as already verified.
pub const INMEMORY_VERIFIED_HEADERS: usize = 4096;

/// Key prefix of persisted snapshots.
pub const SNAPSHOT_KEY_PREFIX: &[u8] = b"dpos-";
