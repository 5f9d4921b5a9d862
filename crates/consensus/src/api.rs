//! Read-only queries over signer snapshots and masternode lists.
//!
//! Heights default to the chain head when `None`.

use crate::chain::ChainReader;
use crate::engine::Engine;
use crate::error::{ConsensusError, Result};
use crate::snapshot::Snapshot;
use dposcore_types::{Address, Header, H256};

/// Query surface exposed to RPC handlers.
pub struct Api<'a> {
    chain: &'a dyn ChainReader,
    engine: &'a Engine,
}

impl<'a> Api<'a> {
    /// Binds the API to a chain and an engine.
    pub fn new(chain: &'a dyn ChainReader, engine: &'a Engine) -> Self {
        Self { chain, engine }
    }

    fn header_at(&self, number: Option<u64>) -> Result<Header> {
        let header = match number {
            Some(n) => self.chain.get_header_by_number(n),
            None => self.chain.current_header(),
        };
        header.ok_or(ConsensusError::UnknownBlock)
    }

    fn header_by_hash(&self, hash: H256) -> Result<Header> {
        self.chain
            .get_header_by_hash(hash)
            .ok_or(ConsensusError::UnknownBlock)
    }

    /// Snapshot at a height.
    pub fn get_snapshot(&self, number: Option<u64>) -> Result<Snapshot> {
        let header = self.header_at(number)?;
        Ok((*self.engine.get_snapshot(self.chain, &header)?).clone())
    }

    /// Snapshot at a block hash.
    pub fn get_snapshot_at_hash(&self, hash: H256) -> Result<Snapshot> {
        let header = self.header_by_hash(hash)?;
        Ok((*self.engine.get_snapshot(self.chain, &header)?).clone())
    }

    /// Authorized signers at a height.
    pub fn get_signers(&self, number: Option<u64>) -> Result<Vec<Address>> {
        let header = self.header_at(number)?;
        self.engine.get_authorised_signers_from_snapshot(self.chain, &header)
    }

    /// Authorized signers at a block hash.
    pub fn get_signers_at_hash(&self, hash: H256) -> Result<Vec<Address>> {
        let header = self.header_by_hash(hash)?;
        self.engine.get_authorised_signers_from_snapshot(self.chain, &header)
    }

    /// Masternodes in rotation order at a height.
    pub fn get_masternodes_by_number(&self, number: Option<u64>) -> Result<Vec<Address>> {
        let header = self.header_at(number)?;
        Ok(self.engine.get_masternodes(self.chain, &header))
    }

    /// Whether `address` is an authorized signer at a height.
    pub fn is_authorised(&self, number: Option<u64>, address: Address) -> Result<bool> {
        let header = self.header_at(number)?;
        self.engine.is_authorised_address(self.chain, &header, &address)
    }

    /// The masternode whose turn it is to produce the block after `number`.
    pub fn due_signer(&self, number: Option<u64>) -> Result<Address> {
        let parent = self.header_at(number)?;
        let masternodes = self.engine.get_masternodes(self.chain, &parent);
        if masternodes.is_empty() {
            return Err(ConsensusError::NoMasternodes {
                number: parent.number + 1,
            });
        }
        let next = if parent.number == 0 {
            0
        } else {
            let creator = self.engine.recover_signer(&parent)?;
            masternodes
                .iter()
                .position(|m| *m == creator)
                .map_or(0, |i| (i + 1) % masternodes.len())
        };
        Ok(masternodes[next])
    }
}
