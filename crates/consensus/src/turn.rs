//! Round-robin turn rotation and difficulty.
//!
//! Masternodes take turns in list order. The in-turn producer gets the
//! highest difficulty (`len(masternodes)`); each position further around the
//! rotation gets one less, so fork choice by total difficulty favours chains
//! that followed the rotation.

use crate::chain::ChainReader;
use crate::engine::Engine;
use crate::error::{ConsensusError, Result};
use dposcore_types::{Address, Header};
use tracing::warn;

/// Where a candidate sits in the rotation relative to the parent's creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    /// Size of the rotation
    pub masternode_count: usize,
    /// Position of the parent's creator; `None` at genesis or when the
    /// creator is not a masternode
    pub prev_index: Option<usize>,
    /// Position of the candidate; `None` when not a masternode
    pub candidate_index: Option<usize>,
    /// Whether the candidate is next after the parent's creator
    pub is_my_turn: bool,
}

impl Turn {
    /// Nothing known yet.
    pub const UNRESOLVED: Self = Self {
        masternode_count: 0,
        prev_index: None,
        candidate_index: None,
        is_my_turn: false,
    };

    /// Resolves a turn from the rotation and the two positions.
    pub fn new(masternode_count: usize, prev_index: Option<usize>, candidate_index: Option<usize>) -> Self {
        let is_my_turn = masternode_count > 0
            && (position(prev_index) + 1) % masternode_count as i64 == position(candidate_index);
        Self {
            masternode_count,
            prev_index,
            candidate_index,
            is_my_turn,
        }
    }

    /// Rotation distance between the parent's creator and the candidate.
    pub fn hop(&self) -> i64 {
        hop(self.masternode_count, self.prev_index, self.candidate_index)
    }

    /// `len - hop`: `len` in turn, decreasing around the rotation.
    pub fn difficulty(&self) -> u64 {
        (self.masternode_count as i64 - self.hop()).max(0) as u64
    }

    /// `len + candidate - prev`, used when the turn could not be resolved.
    pub fn fallback_difficulty(&self) -> u64 {
        (self.masternode_count as i64 + position(self.candidate_index) - position(self.prev_index))
            .max(0) as u64
    }
}

fn position(index: Option<usize>) -> i64 {
    index.map_or(-1, |i| i as i64)
}

/// Distance from `prev` forward to `cur` in a rotation of `len`, where a
/// missing position counts as `-1`.
pub fn hop(len: usize, prev: Option<usize>, cur: Option<usize>) -> i64 {
    let len = len as i64;
    let (pre, cur) = (position(prev), position(cur));
    match pre.cmp(&cur) {
        std::cmp::Ordering::Less => cur - (pre + 1),
        std::cmp::Ordering::Greater => (len - pre) + (cur - 1),
        std::cmp::Ordering::Equal => len - 1,
    }
}

impl Engine {
    /// Whether `signer` is next in rotation after `parent`.
    pub fn your_turn(&self, chain: &dyn ChainReader, parent: &Header, signer: Address) -> Result<Turn> {
        self.turn_with(chain, parent, signer, &[])
    }

    pub(crate) fn turn_with(
        &self,
        chain: &dyn ChainReader,
        parent: &Header,
        signer: Address,
        parents: &[Header],
    ) -> Result<Turn> {
        let masternodes = self.masternodes_with(chain, parent, parents);
        self.snapshot(chain, parent.number, parent.hash(), &[], Some(parent))?;
        if masternodes.is_empty() {
            return Err(ConsensusError::NoMasternodes {
                number: parent.number + 1,
            });
        }

        let prev_index = if parent.number == 0 {
            None
        } else {
            let creator = self.recover_signer(parent)?;
            masternodes.iter().position(|m| *m == creator)
        };
        let candidate_index = masternodes.iter().position(|m| *m == signer);
        Ok(Turn::new(masternodes.len(), prev_index, candidate_index))
    }

    /// Difficulty a block by `signer` on top of `parent` must carry.
    ///
    /// A turn that cannot be resolved yields the fallback over an
    /// unresolved turn, which is zero and never matches a valid header.
    pub fn calc_difficulty(&self, chain: &dyn ChainReader, parent: &Header, signer: Address) -> u64 {
        self.difficulty_with(chain, parent, signer, &[])
    }

    pub(crate) fn difficulty_with(
        &self,
        chain: &dyn ChainReader,
        parent: &Header,
        signer: Address,
        parents: &[Header],
    ) -> u64 {
        if self.config.skip_validation {
            return 1;
        }
        match self.turn_with(chain, parent, signer, parents) {
            Ok(turn) => turn.difficulty(),
            Err(err) => {
                warn!(number = parent.number + 1, %signer, %err, "Failed to resolve turn");
                Turn::UNRESOLVED.fallback_difficulty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop() {
        assert_eq!(hop(3, None, Some(0)), 0);
        assert_eq!(hop(3, Some(0), Some(1)), 0);
        assert_eq!(hop(3, Some(0), Some(2)), 1);
        assert_eq!(hop(3, Some(2), Some(0)), 0);
        assert_eq!(hop(3, Some(2), Some(1)), 1);
        assert_eq!(hop(3, Some(1), Some(1)), 2);
        assert_eq!(hop(3, None, None), 2);
    }

    #[test]
    fn test_turn_at_genesis() {
        let turn = Turn::new(3, None, Some(0));
        assert!(turn.is_my_turn);
        assert_eq!(turn.difficulty(), 3);

        let turn = Turn::new(3, None, Some(1));
        assert!(!turn.is_my_turn);
        assert_eq!(turn.difficulty(), 2);
    }

    #[test]
    fn test_difficulty_decreases_around_rotation() {
        let diffs: Vec<u64> = (0..4).map(|c| Turn::new(4, Some(1), Some(c)).difficulty()).collect();
        // candidate 2 is in turn, then 3, 0, and finally 1 itself
        assert_eq!(diffs, vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_wraps_around() {
        let turn = Turn::new(3, Some(2), Some(0));
        assert!(turn.is_my_turn);
        assert_eq!(turn.difficulty(), 3);
    }

    #[test]
    fn test_unresolved_fallback_is_zero() {
        assert_eq!(Turn::UNRESOLVED.fallback_difficulty(), 0);
        assert!(!Turn::UNRESOLVED.is_my_turn);
    }
}
