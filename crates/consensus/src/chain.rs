//! Interfaces the engine consumes from its host node.

use crate::hooks::HookError;
use dposcore_config::ChainConfig;
use dposcore_types::{Address, Block, Header, H256};

/// Read access to the local header chain.
///
/// Implementations hand out owned headers; the engine never mutates them.
pub trait ChainReader: Send + Sync {
    /// Chain parameters, fork heights and pinned hashes
    fn config(&self) -> &ChainConfig;

    /// Head of the canonical chain
    fn current_header(&self) -> Option<Header>;

    /// Header by hash and number
    fn get_header(&self, hash: H256, number: u64) -> Option<Header>;

    /// Canonical header at a height
    fn get_header_by_number(&self, number: u64) -> Option<Header>;

    /// Header by hash alone
    fn get_header_by_hash(&self, hash: H256) -> Option<Header>;

    /// Full block by hash and number
    fn get_block(&self, hash: H256, number: u64) -> Option<Block>;
}

/// Post-execution state the engine finalizes against.
pub trait StateDb {
    /// Commits pending changes and returns the resulting state root.
    fn intermediate_root(&mut self) -> H256;
}

/// Signs a digest on behalf of a local account.
pub trait SignerFn: Send + Sync {
    /// Returns a 65-byte recoverable signature over `hash`.
    fn sign_hash(&self, account: Address, hash: &H256) -> Result<Vec<u8>, HookError>;
}

impl<F> SignerFn for F
where
    F: Fn(Address, &H256) -> Result<Vec<u8>, HookError> + Send + Sync,
{
    fn sign_hash(&self, account: Address, hash: &H256) -> Result<Vec<u8>, HookError> {
        self(account, hash)
    }
}
