//! Consensus error taxonomy.
//!
//! Every rejection reason is its own variant so callers can match on it. The
//! variants fall into four groups:
//!
//! - malformed input: structurally invalid headers, never worth retrying
//! - ancestor availability: missing parents, retryable once they arrive
//! - consensus violations: well-formed headers that break the rules
//! - infrastructure: storage, codec, signer and hook failures

use crate::hooks::HookError;
use dposcore_config::ConfigError;
use dposcore_crypto::CryptoError;
use dposcore_storage::StorageError;
use dposcore_types::{Address, H256};

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors returned by the engine.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    // ----- malformed input -----
    /// Header number is not set
    #[error("unknown block")]
    UnknownBlock,

    /// Extra-data shorter than the vanity prefix
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    /// Extra-data lacks the trailing seal
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// Non-checkpoint header carries a signer list
    #[error("non-checkpoint block contains extra signer list")]
    ExtraSigners,

    /// Checkpoint signer region is not a whole number of addresses, or
    /// disagrees with the expected signer set
    #[error("invalid signer list on checkpoint block {number}")]
    InvalidCheckpointSigners {
        /// Checkpoint height
        number: u64,
    },

    /// Checkpoint header names a vote target
    #[error("beneficiary in checkpoint block non-zero")]
    InvalidCheckpointBeneficiary,

    /// Nonce is neither the auth nor the drop marker
    #[error("vote nonce not 0x00..0 or 0xff..f")]
    InvalidVote,

    /// Checkpoint nonce is not the drop marker
    #[error("vote nonce in checkpoint block non-zero")]
    InvalidCheckpointVote,

    /// Mix digest must be zero
    #[error("non-zero mix digest")]
    InvalidMixDigest,

    /// Uncle hash must be the empty-list hash
    #[error("non empty uncle hash")]
    InvalidUncleHash,

    /// Block carries uncles
    #[error("uncles not allowed")]
    UnclesNotAllowed,

    /// Header lacks the double-validation signature
    #[error("no validator signature on block {number}")]
    NoValidatorSignature {
        /// Block height
        number: u64,
    },

    /// Validator signature has the wrong length or cannot be recovered
    #[error("fail to recover validator signature: {0}")]
    FailValidatorSignature(String),

    /// Penalties field is not a whole number of addresses
    #[error("malformed penalties field on block {number}")]
    MalformedPenalties {
        /// Block height
        number: u64,
    },

    /// Validator index blob cannot be parsed
    #[error("invalid validator indices: {0}")]
    InvalidValidatorIndices(String),

    // ----- ancestor availability -----
    /// Parent header could not be located or does not link up
    #[error("unknown ancestor {hash} at block {number}")]
    UnknownAncestor {
        /// Height of the missing header
        number: u64,
        /// Hash of the missing header
        hash: H256,
    },

    /// Header timestamp is ahead of the local clock
    #[error("block in the future: time {time}, now {now}")]
    FutureBlock {
        /// Header time
        time: u64,
        /// Local wall-clock time
        now: u64,
    },

    // ----- consensus violations -----
    /// Header was produced too soon after its parent
    #[error("invalid timestamp: {time} is earlier than parent {parent_time} + period {period}")]
    InvalidTimestamp {
        /// Header time
        time: u64,
        /// Parent time
        parent_time: u64,
        /// Configured period
        period: u64,
    },

    /// Difficulty does not match the turn rotation
    #[error("invalid difficulty: expected {expected}, got {got}")]
    InvalidDifficulty {
        /// Difficulty computed from the rotation
        expected: u64,
        /// Difficulty in the header
        got: u64,
    },

    /// Creator is not an authorized signer
    #[error("unauthorized signer {signer} at block {number}")]
    Unauthorized {
        /// Creator address
        signer: Address,
        /// Block height
        number: u64,
    },

    /// Creator signed within the recent-signer window
    #[error("signer {signer} recently signed block {last}, cannot sign {number}")]
    RecentlySigned {
        /// Creator address
        signer: Address,
        /// Block the creator last signed
        last: u64,
        /// Block being applied
        number: u64,
    },

    /// Embedded penalty list differs from the hook's
    #[error("invalid penalty list on checkpoint block {number}")]
    InvalidCheckpointPenalties {
        /// Checkpoint height
        number: u64,
    },

    /// Validator signature does not belong to the assigned validator
    #[error("wrong validator for creator {creator}: expected {expected}, got {validator}")]
    FailedDoubleValidation {
        /// Block creator
        creator: Address,
        /// Recovered validator
        validator: Address,
        /// Assigned validator
        expected: Address,
    },

    /// Headers handed to the snapshot builder are not contiguous
    #[error("invalid voting chain")]
    InvalidVotingChain,

    /// No masternodes could be resolved for a height
    #[error("no masternodes found for block {number}")]
    NoMasternodes {
        /// Block height
        number: u64,
    },

    /// M1/M2 table requested off the randomisation grid
    #[error("checkpoint {number} is not aligned to {interval}")]
    MisalignedCheckpoint {
        /// Checkpoint height
        number: u64,
        /// Required alignment
        interval: u64,
    },

    /// Fewer validator indices than masternodes
    #[error("not enough validators: {validators} for {masternodes} masternodes")]
    NotEnoughValidators {
        /// Number of validator indices
        validators: usize,
        /// Number of masternodes
        masternodes: usize,
    },

    /// Header hash differs from a fork-pinned hash
    #[error("fork hash mismatch at block {number}: expected {expected}, got {got}")]
    ForkHashMismatch {
        /// Block height
        number: u64,
        /// Pinned hash
        expected: H256,
        /// Header hash
        got: H256,
    },

    // ----- production path -----
    /// Zero-period chains refuse to seal empty blocks
    #[error("waiting for transactions")]
    WaitTransactions,

    /// No local signer installed
    #[error("no local signer authorized")]
    NoSigner,

    // ----- infrastructure -----
    /// Engine parameters failed validation
    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Snapshot (de)serialization failure
    #[error("codec error: {0}")]
    Codec(String),

    /// Signature recovery failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The signing callback failed
    #[error("signer error: {0}")]
    Signer(String),

    /// An injected hook failed
    #[error("{hook} hook failed: {source}")]
    Hook {
        /// Hook name
        hook: &'static str,
        /// Error returned by the hook
        #[source]
        source: HookError,
    },
}

impl ConsensusError {
    /// Structurally invalid input: fatal, never retried.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::UnknownBlock
                | Self::MissingVanity
                | Self::MissingSignature
                | Self::ExtraSigners
                | Self::InvalidCheckpointBeneficiary
                | Self::InvalidVote
                | Self::InvalidCheckpointVote
                | Self::InvalidMixDigest
                | Self::InvalidUncleHash
                | Self::UnclesNotAllowed
                | Self::NoValidatorSignature { .. }
                | Self::FailValidatorSignature(_)
                | Self::MalformedPenalties { .. }
                | Self::InvalidValidatorIndices(_)
        )
    }

    /// Missing data that may arrive later.
    pub fn is_ancestor_unavailable(&self) -> bool {
        matches!(self, Self::UnknownAncestor { .. } | Self::FutureBlock { .. })
    }

    /// A well-formed header that breaks the rotation or signer rules.
    pub fn is_consensus_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp { .. }
                | Self::InvalidDifficulty { .. }
                | Self::Unauthorized { .. }
                | Self::RecentlySigned { .. }
                | Self::InvalidCheckpointSigners { .. }
                | Self::InvalidCheckpointPenalties { .. }
                | Self::FailedDoubleValidation { .. }
                | Self::InvalidVotingChain
                | Self::ForkHashMismatch { .. }
        )
    }

    pub(crate) fn hook(hook: &'static str, source: HookError) -> Self {
        Self::Hook { hook, source }
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
