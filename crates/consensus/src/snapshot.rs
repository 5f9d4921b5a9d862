//! Authorized-signer snapshots.
//!
//! A [`Snapshot`] captures the signer set, the in-flight governance votes and
//! the recent-signer window as of one block. Snapshots are values: `apply`
//! returns a new snapshot and never touches the one it was called on, so an
//! `Arc<Snapshot>` handed to another thread stays valid.

use crate::constants::SNAPSHOT_KEY_PREFIX;
use crate::error::{ConsensusError, Result};
use crate::masternodes::decode_masternodes_from_extra;
use dposcore_storage::KeyValueStore;
use dposcore_types::{Address, BlockNonce, Header, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A single vote an authorized signer cast to change the signer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Authorized signer that cast this vote
    pub signer: Address,
    /// Block number the vote was cast in
    pub block: u64,
    /// Account being voted on
    pub address: Address,
    /// Whether to authorize or deauthorize the account
    pub authorize: bool,
}

/// Running tally of the in-flight votes on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Whether the votes propose adding or removing the account
    pub authorize: bool,
    /// Number of votes cast so far
    pub votes: usize,
}

/// Signer-set state anchored at a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Block number where the snapshot was created
    pub number: u64,
    /// Block hash where the snapshot was created
    pub hash: H256,
    /// Authorized signers at this moment
    pub signers: BTreeSet<Address>,
    /// Length of the masternode rotation set by the latest checkpoint
    pub rotation: usize,
    /// Recent signers, keyed by the block they signed
    pub recents: BTreeMap<u64, Address>,
    /// In-flight votes in chronological order
    pub votes: Vec<Vote>,
    /// Vote tally per target account
    pub tally: BTreeMap<Address, Tally>,
}

impl Snapshot {
    /// Creates a snapshot with a fresh signer set and no history.
    pub fn new(number: u64, hash: H256, signers: &[Address]) -> Self {
        Self {
            number,
            hash,
            signers: signers.iter().copied().collect(),
            rotation: signers.len(),
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
        }
    }

    /// Store key for the snapshot anchored at `hash`.
    pub fn key(hash: &H256) -> Vec<u8> {
        let mut key = Vec::with_capacity(SNAPSHOT_KEY_PREFIX.len() + 32);
        key.extend_from_slice(SNAPSHOT_KEY_PREFIX);
        key.extend_from_slice(hash.as_bytes());
        key
    }

    /// Loads the snapshot anchored at `hash`, if one was persisted.
    pub fn load(db: &dyn KeyValueStore, hash: &H256) -> Result<Option<Self>> {
        match db.get(&Self::key(hash))? {
            Some(blob) => Ok(Some(bincode::deserialize(&blob)?)),
            None => Ok(None),
        }
    }

    /// Persists the snapshot under its anchor hash.
    pub fn store(&self, db: &dyn KeyValueStore) -> Result<()> {
        let blob = bincode::serialize(self)?;
        db.put(&Self::key(&self.hash), &blob)?;
        debug!(number = self.number, hash = %self.hash, "Stored snapshot to disk");
        Ok(())
    }

    /// Authorized signers in ascending order.
    pub fn signers(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    /// Whether `address` is currently an authorized signer.
    pub fn is_authorized(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// Width of the recent-signer window.
    ///
    /// Blocks rotate over the checkpoint masternode list, which can be
    /// shorter than the signer set once penalties strip nodes from it.
    pub fn window(&self) -> usize {
        if self.rotation == 0 {
            self.signers.len()
        } else {
            self.signers.len().min(self.rotation)
        }
    }

    /// The block `signer` last signed, if that is within the recent-signer
    /// window preceding `number`. A signer may produce at most one block in
    /// any [`window`](Self::window) consecutive blocks.
    pub fn recently_signed(&self, number: u64, signer: &Address) -> Option<u64> {
        let window = self.window() as u64;
        if window <= 1 || number == 0 {
            return None;
        }
        let floor = number.saturating_sub(window);
        self.recents
            .range(floor + 1..number)
            .find(|(_, recent)| *recent == signer)
            .map(|(seen, _)| *seen)
    }

    /// Whether a vote makes sense: adding a non-signer or dropping a signer.
    pub fn valid_vote(&self, address: &Address, authorize: bool) -> bool {
        self.signers.contains(address) != authorize
    }

    /// Adds a vote to the tally. Returns false for meaningless votes.
    pub fn cast(&mut self, address: Address, authorize: bool) -> bool {
        if !self.valid_vote(&address, authorize) {
            return false;
        }
        self.tally
            .entry(address)
            .and_modify(|t| t.votes += 1)
            .or_insert(Tally {
                authorize,
                votes: 1,
            });
        true
    }

    /// Removes a previously cast vote from the tally.
    pub fn uncast(&mut self, address: Address, authorize: bool) -> bool {
        let Some(tally) = self.tally.get_mut(&address) else {
            return false;
        };
        if tally.authorize != authorize {
            return false;
        }
        if tally.votes > 1 {
            tally.votes -= 1;
        } else {
            self.tally.remove(&address);
        }
        true
    }

    /// Replays `headers` on top of this snapshot and returns the result.
    ///
    /// Headers must be contiguous and start right after `self.number`.
    /// `recover` resolves the creator of each header.
    pub fn apply<F>(&self, headers: &[Header], epoch: u64, recover: F) -> Result<Self>
    where
        F: Fn(&Header) -> Result<Address>,
    {
        let (Some(first), Some(last)) = (headers.first(), headers.last()) else {
            return Ok(self.clone());
        };
        if headers.windows(2).any(|w| w[1].number != w[0].number + 1) {
            return Err(ConsensusError::InvalidVotingChain);
        }
        if first.number != self.number + 1 {
            return Err(ConsensusError::InvalidVotingChain);
        }

        let mut snap = self.clone();
        for header in headers {
            let number = header.number;
            let checkpoint = number % epoch == 0;
            if checkpoint {
                snap.votes.clear();
                snap.tally.clear();
            }

            // Slide the recent-signer window.
            let limit = snap.window() as u64;
            if number >= limit {
                snap.recents.remove(&(number - limit));
            }

            let signer = recover(header)?;
            if !snap.signers.contains(&signer) {
                return Err(ConsensusError::Unauthorized { signer, number });
            }
            if checkpoint {
                // The checkpoint starts a new rotation over its own list.
                let masternodes = decode_masternodes_from_extra(header);
                if !masternodes.is_empty() {
                    snap.rotation = masternodes.len();
                }
                snap.recents.clear();
            } else if let Some(last) = snap.recently_signed(number, &signer) {
                return Err(ConsensusError::RecentlySigned {
                    signer,
                    last,
                    number,
                });
            }
            snap.recents.insert(number, signer);

            let target = header.coinbase;
            if let Some(pos) = snap
                .votes
                .iter()
                .position(|v| v.signer == signer && v.address == target)
            {
                let previous = snap.votes.remove(pos);
                snap.uncast(previous.address, previous.authorize);
            }

            let authorize = match header.nonce {
                BlockNonce::AUTH => true,
                BlockNonce::DROP => false,
                _ => return Err(ConsensusError::InvalidVote),
            };
            let self_drop = !authorize && target == signer;
            if !self_drop && snap.cast(target, authorize) {
                snap.votes.push(Vote {
                    signer,
                    block: number,
                    address: target,
                    authorize,
                });
            }

            let Some(tally) = snap.tally.get(&target).copied() else {
                continue;
            };
            if tally.votes <= snap.signers.len() / 2 {
                continue;
            }
            if tally.authorize {
                snap.signers.insert(target);
                info!(number, signer = %target, "Authorized new signer");
            } else {
                snap.signers.remove(&target);
                info!(number, signer = %target, "Deauthorized signer");

                // The window shrank with the signer set.
                let limit = snap.window() as u64;
                if number >= limit {
                    snap.recents.remove(&(number - limit));
                }
                let mut i = 0;
                while i < snap.votes.len() {
                    if snap.votes[i].signer == target {
                        let vote = snap.votes.remove(i);
                        snap.uncast(vote.address, vote.authorize);
                    } else {
                        i += 1;
                    }
                }
            }
            snap.votes.retain(|v| v.address != target);
            snap.tally.remove(&target);
        }

        snap.number += headers.len() as u64;
        snap.hash = last.hash();
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn test_valid_vote() {
        let snap = Snapshot::new(0, H256::NIL, &[addr(1)]);
        assert!(snap.valid_vote(&addr(2), true));
        assert!(!snap.valid_vote(&addr(2), false));
        assert!(snap.valid_vote(&addr(1), false));
        assert!(!snap.valid_vote(&addr(1), true));
    }

    #[test]
    fn test_cast_uncast() {
        let mut snap = Snapshot::new(0, H256::NIL, &[addr(1), addr(2)]);
        assert!(snap.cast(addr(3), true));
        assert!(snap.cast(addr(3), true));
        assert_eq!(snap.tally[&addr(3)].votes, 2);

        assert!(!snap.uncast(addr(3), false));
        assert!(snap.uncast(addr(3), true));
        assert!(snap.uncast(addr(3), true));
        assert!(snap.tally.is_empty());
        assert!(!snap.uncast(addr(3), true));

        assert!(!snap.cast(addr(1), true));
    }

    #[test]
    fn test_recently_signed_window() {
        let mut snap = Snapshot::new(0, H256::NIL, &[addr(1), addr(2), addr(3)]);
        snap.recents.insert(4, addr(1));
        snap.recents.insert(5, addr(2));
        // block 6 looks back at 4 and 5
        assert_eq!(snap.recently_signed(6, &addr(1)), Some(4));
        // block 7 looks back at 5 and 6 only
        assert_eq!(snap.recently_signed(7, &addr(1)), None);
        assert_eq!(snap.recently_signed(7, &addr(2)), Some(5));
        assert_eq!(snap.recently_signed(1, &addr(3)), None);
    }

    #[test]
    fn test_window_follows_rotation() {
        let mut snap = Snapshot::new(0, H256::NIL, &[addr(1), addr(2), addr(3), addr(4)]);
        assert_eq!(snap.window(), 4);
        snap.rotation = 3;
        snap.recents.insert(5, addr(1));
        assert_eq!(snap.recently_signed(7, &addr(1)), Some(5));
        assert_eq!(snap.recently_signed(8, &addr(1)), None);

        snap.rotation = 0;
        assert_eq!(snap.window(), 4);

        let single = Snapshot::new(0, H256::NIL, &[addr(1)]);
        assert_eq!(single.recently_signed(1, &addr(1)), None);
    }

    #[test]
    fn test_apply_empty_is_identity() {
        let snap = Snapshot::new(3, H256::keccak256(b"x"), &[addr(1)]);
        let next = snap.apply(&[], 10, |_| Ok(addr(1))).unwrap();
        assert_eq!(next, snap);
    }

    #[test]
    fn test_apply_rejects_gaps() {
        let snap = Snapshot::new(0, H256::NIL, &[addr(1)]);
        let h = |n| Header {
            number: n,
            ..Default::default()
        };
        assert!(matches!(
            snap.apply(&[h(2)], 10, |_| Ok(addr(1))),
            Err(ConsensusError::InvalidVotingChain)
        ));
        assert!(matches!(
            snap.apply(&[h(1), h(3)], 10, |_| Ok(addr(1))),
            Err(ConsensusError::InvalidVotingChain)
        ));
    }
}
