//! # dposcore Consensus
//!
//! Delegated proof-of-stake consensus engine with round-robin block
//! production among an elected masternode set.
//!
//! ## Overview
//!
//! - Masternodes produce blocks in a fixed rotation; the in-turn producer's
//!   block carries the highest difficulty.
//! - Every `epoch` blocks a checkpoint header embeds the masternode list for
//!   the next epoch, minus penalized nodes, plus a blob of validator indices.
//! - Each block after the first epoch is co-signed by a second masternode
//!   (double validation) chosen from those indices.
//! - Signers may add or drop accounts by voting through the coinbase and
//!   nonce fields; votes reset at every checkpoint.
//!
//! ## Extra-data layout
//!
//! ```text
//! ┌───────────────┬──────────────────────────────┬──────────────────┐
//! │ vanity (32 B) │ masternodes (20 B each, cp)  │ creator seal 65 B│
//! └───────────────┴──────────────────────────────┴──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use dposcore_consensus::{Engine, Hooks, KeySigner};
//! use dposcore_storage::MemoryDatabase;
//! use std::sync::Arc;
//!
//! let engine = Engine::new(config.chain.dpos.clone(), Arc::new(MemoryDatabase::new()))?
//!     .with_hooks(Hooks::new().with_validator(assign_validators));
//! let signer = KeySigner::new(key);
//! engine.authorize(signer.address(), Arc::new(signer));
//!
//! engine.prepare(&chain, &mut header)?;
//! let block = engine.finalize(&chain, &mut header, &mut state, &parent_state, txs)?;
//! let sealed = engine.seal(&chain, block, &stop_rx)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod api;
pub mod assembly;
pub mod cache;
pub mod chain;
pub mod compat;
pub mod constants;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod masternodes;
pub mod signature;
pub mod signer;
pub mod snapshot;
pub mod turn;
pub mod verify;

pub use api::Api;
pub use chain::{ChainReader, SignerFn, StateDb};
pub use engine::Engine;
pub use error::{ConsensusError, Result};
pub use hooks::{
    ContractSignersHook, EpochPenaltyHook, HookError, HookResult, Hooks, RewardBreakdown,
    RewardHook, SigningPenaltyHook, ValidatorHook, VerifyMasternodesHook,
};
pub use masternodes::{
    compare_signers_lists, decode_masternodes_from_extra, encode_masternodes_into_extra,
    encode_validator_indices, extract_validators_from_bytes, m1m2, remove_items_from_list,
    Masternode,
};
pub use signature::{ecrecover, recover_validator, sig_hash};
pub use signer::KeySigner;
pub use snapshot::{Snapshot, Tally, Vote};
pub use turn::{hop, Turn};
pub use verify::AbortHandle;
