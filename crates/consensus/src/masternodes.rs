//! Masternode and validator resolution.
//!
//! Checkpoint headers carry the masternode list between the vanity prefix
//! and the seal, plus a blob of validator indices pairing each masternode
//! (M1) with the masternode that double-validates its blocks (M2).

use crate::chain::ChainReader;
use crate::constants::{EXTRA_SEAL, EXTRA_VANITY, M2_BYTE_LENGTH};
use crate::engine::Engine;
use crate::error::{ConsensusError, Result};
use alloy_primitives::U256;
use dposcore_types::{addresses_to_bytes, Address, Header, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// A staked masternode candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Masternode {
    /// Candidate address
    pub address: Address,
    /// Total stake backing the candidate
    pub stake: U256,
}

/// Masternode list embedded in a checkpoint header's extra-data.
///
/// Returns an empty list when the extra-data has no room for one.
pub fn decode_masternodes_from_extra(header: &Header) -> Vec<Address> {
    let extra = &header.extra;
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Vec::new();
    }
    Address::list_from_bytes(&extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL])
}

/// Builds checkpoint extra-data: vanity (padded or cut to 32 bytes), the
/// masternode list, and an empty seal.
pub fn encode_masternodes_into_extra(vanity: &[u8], masternodes: &[Address]) -> Vec<u8> {
    let mut extra = vanity.to_vec();
    extra.resize(EXTRA_VANITY, 0);
    extra.extend_from_slice(&addresses_to_bytes(masternodes));
    extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
    extra
}

/// Decodes a penalty list, rejecting a partial trailing address.
pub fn decode_penalties(header: &Header) -> Result<Vec<Address>> {
    if header.penalties.len() % 20 != 0 {
        return Err(ConsensusError::MalformedPenalties {
            number: header.number,
        });
    }
    Ok(Address::list_from_bytes(&header.penalties))
}

/// Parses the validator index blob.
///
/// Each 4-byte chunk holds a decimal number in ASCII, padded with NUL
/// bytes. A trailing partial chunk is ignored.
pub fn extract_validators_from_bytes(bytes: &[u8]) -> Result<Vec<u64>> {
    bytes
        .chunks_exact(M2_BYTE_LENGTH)
        .map(|chunk| {
            let start = chunk.iter().position(|b| *b != 0).unwrap_or(chunk.len());
            let end = chunk.iter().rposition(|b| *b != 0).map_or(start, |i| i + 1);
            let digits = std::str::from_utf8(&chunk[start..end])
                .map_err(|e| ConsensusError::InvalidValidatorIndices(e.to_string()))?;
            digits.parse::<u64>().map_err(|e| {
                ConsensusError::InvalidValidatorIndices(format!("{digits:?}: {e}"))
            })
        })
        .collect()
}

/// Encodes validator indices into the blob format read by
/// [`extract_validators_from_bytes`]. Indices must fit in four digits.
pub fn encode_validator_indices(indices: &[u64]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(indices.len() * M2_BYTE_LENGTH);
    for index in indices {
        let digits = index.to_string();
        if digits.len() > M2_BYTE_LENGTH {
            return Err(ConsensusError::InvalidValidatorIndices(format!(
                "index {index} does not fit in {M2_BYTE_LENGTH} bytes"
            )));
        }
        out.extend(std::iter::repeat(0u8).take(M2_BYTE_LENGTH - digits.len()));
        out.extend_from_slice(digits.as_bytes());
    }
    Ok(out)
}

/// Pairs every masternode with its double validator.
///
/// `m2[i] = masternodes[(validators[i] % n + offset) % n]` where the offset
/// is `((current % epoch) / n) % n` once randomization is active and zero
/// before it.
pub fn m1m2(
    masternodes: &[Address],
    validators: &[u64],
    current: u64,
    epoch: u64,
    randomize: bool,
) -> Result<HashMap<Address, Address>> {
    let n = masternodes.len();
    if validators.len() < n {
        return Err(ConsensusError::NotEnoughValidators {
            validators: validators.len(),
            masternodes: n,
        });
    }
    let mut pairs = HashMap::with_capacity(n);
    if n == 0 {
        return Ok(pairs);
    }
    let len = n as u64;
    let offset = if randomize {
        ((current % epoch) / len) % len
    } else {
        0
    };
    for (m1, index) in masternodes.iter().zip(validators) {
        let m2 = ((index % len) + offset) % len;
        pairs.insert(*m1, masternodes[m2 as usize]);
    }
    Ok(pairs)
}

/// Header at `number`, looked up among the not-yet-imported `parents`
/// first and then in the chain.
pub(crate) fn find_by_number(
    chain: &dyn ChainReader,
    parents: &[Header],
    number: u64,
) -> Option<Header> {
    parents
        .iter()
        .rev()
        .find(|p| p.number == number)
        .cloned()
        .or_else(|| chain.get_header_by_number(number))
}

/// Order-insensitive comparison of two signer lists.
pub fn compare_signers_lists(a: &[Address], b: &[Address]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// `list` without any address in `items`, order preserved.
pub fn remove_items_from_list(list: &[Address], items: &[Address]) -> Vec<Address> {
    let items: BTreeSet<&Address> = items.iter().collect();
    list.iter().filter(|a| !items.contains(a)).copied().collect()
}

impl Engine {
    /// Masternodes in rotation order for the epoch containing `header`.
    ///
    /// Read from the header itself at a checkpoint, otherwise from the
    /// epoch's checkpoint header. Empty when that header is unavailable.
    pub fn get_masternodes(&self, chain: &dyn ChainReader, header: &Header) -> Vec<Address> {
        self.masternodes_with(chain, header, &[])
    }

    pub(crate) fn masternodes_with(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
    ) -> Vec<Address> {
        let number = header.number;
        if self.config.is_checkpoint(number) {
            return decode_masternodes_from_extra(header);
        }
        let checkpoint = self.config.checkpoint_of(number);
        match find_by_number(chain, parents, checkpoint) {
            Some(cp) => decode_masternodes_from_extra(&cp),
            None => {
                debug!(number, checkpoint, "Checkpoint header unavailable");
                Vec::new()
            }
        }
    }

    /// Masternodes listed in a checkpoint header.
    pub fn get_masternodes_from_checkpoint_header(&self, checkpoint: &Header) -> Vec<Address> {
        decode_masternodes_from_extra(checkpoint)
    }

    /// The M1 to M2 table defined by `checkpoint`, as seen from `current`.
    pub fn m1m2_at(
        &self,
        chain: &dyn ChainReader,
        checkpoint: &Header,
        current: &Header,
    ) -> Result<HashMap<Address, Address>> {
        let interval = self.config.randomize_interval;
        if checkpoint.number % interval != 0 {
            return Err(ConsensusError::MisalignedCheckpoint {
                number: checkpoint.number,
                interval,
            });
        }
        let masternodes = decode_masternodes_from_extra(checkpoint);
        let validators = extract_validators_from_bytes(&checkpoint.validators)?;
        m1m2(
            &masternodes,
            &validators,
            current.number,
            self.config.epoch,
            chain.config().is_tip_randomize(current.number),
        )
    }

    /// The masternode assigned to double-validate blocks `creator` produces
    /// at `header`. Zero during the first epoch or for an unknown creator.
    pub fn get_validator(
        &self,
        creator: Address,
        chain: &dyn ChainReader,
        header: &Header,
    ) -> Result<Address> {
        self.validator_with(creator, chain, header, &[])
    }

    pub(crate) fn validator_with(
        &self,
        creator: Address,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<Address> {
        let number = header.number;
        let checkpoint = self.config.checkpoint_of(number);
        if checkpoint == 0 {
            return Ok(Address::ZERO);
        }
        let cp_header = match find_by_number(chain, parents, checkpoint) {
            Some(h) => h,
            None if self.config.is_checkpoint(number) => header.clone(),
            None => {
                return Err(ConsensusError::UnknownAncestor {
                    number: checkpoint,
                    hash: header.parent_hash,
                })
            }
        };
        let pairs = self.m1m2_at(chain, &cp_header, header)?;
        Ok(pairs.get(&creator).copied().unwrap_or(Address::ZERO))
    }

    /// Removes the masternodes penalized at checkpoint `epoch_number`.
    /// Height zero has no penalties.
    pub fn remove_penalties_from_block(
        &self,
        chain: &dyn ChainReader,
        masternodes: &[Address],
        epoch_number: u64,
    ) -> Result<Vec<Address>> {
        self.remove_penalties_with(chain, &[], masternodes, epoch_number)
    }

    fn remove_penalties_with(
        &self,
        chain: &dyn ChainReader,
        parents: &[Header],
        masternodes: &[Address],
        epoch_number: u64,
    ) -> Result<Vec<Address>> {
        if epoch_number == 0 {
            return Ok(masternodes.to_vec());
        }
        let header = find_by_number(chain, parents, epoch_number).ok_or(
            ConsensusError::UnknownAncestor {
                number: epoch_number,
                hash: H256::NIL,
            },
        )?;
        let penalties = decode_penalties(&header)?;
        Ok(remove_items_from_list(masternodes, &penalties))
    }

    /// Masternodes minus the penalties recorded at the previous
    /// `penalty_lookback_epochs` checkpoints before `number`.
    pub(crate) fn remove_recent_penalties(
        &self,
        chain: &dyn ChainReader,
        parents: &[Header],
        mut masternodes: Vec<Address>,
        number: u64,
    ) -> Result<Vec<Address>> {
        let epoch = self.config.epoch;
        for i in 1..=self.config.penalty_lookback_epochs {
            if number > i * epoch {
                masternodes =
                    self.remove_penalties_with(chain, parents, &masternodes, number - i * epoch)?;
            }
        }
        Ok(masternodes)
    }

    /// Replaces the signer set of the snapshot at `header` with `masternodes`.
    ///
    /// The host calls this at the gap block with the candidates elected for
    /// the next epoch; the following checkpoint then embeds them.
    pub fn update_masternodes(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        masternodes: &[Masternode],
    ) -> Result<()> {
        let snap = self.get_snapshot(chain, header)?;
        let mut ranked = masternodes.to_vec();
        ranked.sort_by(|a, b| b.stake.cmp(&a.stake));
        for (rank, m) in ranked.iter().enumerate() {
            debug!(rank, address = %m.address, stake = %m.stake, "Masternode");
        }

        let mut next = (*snap).clone();
        next.signers = ranked.iter().map(|m| m.address).collect();
        let next = Arc::new(next);
        self.recents.insert(next.hash, next.clone());
        info!(
            number = header.number,
            count = next.signers.len(),
            "Updated masternodes in snapshot"
        );
        Ok(())
    }

    /// Candidate set from the validator contract, read at the block `gap`
    /// heights before `checkpoint`.
    pub fn signers_from_contract(
        &self,
        chain: &dyn ChainReader,
        checkpoint: &Header,
        parents: &[Header],
    ) -> Result<Vec<Address>> {
        let Some(hook) = &self.hooks.contract_signers else {
            return Err(ConsensusError::hook(
                "contract signers",
                "no contract signer lookup installed".into(),
            ));
        };
        let mut cursor = checkpoint.clone();
        for _ in 0..self.config.gap {
            let number = cursor.number.checked_sub(1).ok_or(ConsensusError::UnknownAncestor {
                number: 0,
                hash: cursor.parent_hash,
            })?;
            let hash = cursor.parent_hash;
            cursor = parents
                .iter()
                .rev()
                .find(|p| p.number == number && p.hash() == hash)
                .cloned()
                .or_else(|| chain.get_header(hash, number))
                .ok_or(ConsensusError::UnknownAncestor { number, hash })?;
        }
        hook.signers(cursor.hash())
            .map_err(|e| ConsensusError::hook("contract signers", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::new([b; 20])
    }

    #[test]
    fn test_extra_round_trip() {
        let nodes = vec![addr(1), addr(2), addr(3)];
        let header = Header {
            extra: encode_masternodes_into_extra(b"vanity", &nodes),
            ..Default::default()
        };
        assert_eq!(header.extra.len(), EXTRA_VANITY + 60 + EXTRA_SEAL);
        assert_eq!(decode_masternodes_from_extra(&header), nodes);
    }

    #[test]
    fn test_decode_short_extra() {
        let header = Header {
            extra: vec![0u8; EXTRA_VANITY],
            ..Default::default()
        };
        assert!(decode_masternodes_from_extra(&header).is_empty());
    }

    #[test]
    fn test_validator_blob() {
        let blob = encode_validator_indices(&[0, 7, 42, 9999]).unwrap();
        assert_eq!(&blob[4..8], b"\x00\x00\x007");
        assert_eq!(extract_validators_from_bytes(&blob).unwrap(), vec![0, 7, 42, 9999]);
        assert!(encode_validator_indices(&[10000]).is_err());
    }

    #[test]
    fn test_validator_blob_rejects_garbage() {
        assert!(matches!(
            extract_validators_from_bytes(b"\x00\x00x1"),
            Err(ConsensusError::InvalidValidatorIndices(_))
        ));
        assert!(matches!(
            extract_validators_from_bytes(&[0u8; 4]),
            Err(ConsensusError::InvalidValidatorIndices(_))
        ));
    }

    #[test]
    fn test_m1m2_without_offset() {
        let nodes = vec![addr(1), addr(2), addr(3)];
        let pairs = m1m2(&nodes, &[1, 2, 3], 905, 900, false).unwrap();
        assert_eq!(pairs[&addr(1)], addr(2));
        assert_eq!(pairs[&addr(2)], addr(3));
        assert_eq!(pairs[&addr(3)], addr(1));
    }

    #[test]
    fn test_m1m2_with_offset() {
        let nodes = vec![addr(1), addr(2), addr(3)];
        // (905 % 900) / 3 % 3 == 1
        let pairs = m1m2(&nodes, &[0, 1, 2], 905, 900, true).unwrap();
        assert_eq!(pairs[&addr(1)], addr(2));
        assert_eq!(pairs[&addr(2)], addr(3));
        assert_eq!(pairs[&addr(3)], addr(1));
    }

    #[test]
    fn test_m1m2_not_enough_validators() {
        assert!(matches!(
            m1m2(&[addr(1), addr(2)], &[0], 1, 900, false),
            Err(ConsensusError::NotEnoughValidators {
                validators: 1,
                masternodes: 2
            })
        ));
    }

    #[test]
    fn test_list_helpers() {
        assert!(compare_signers_lists(&[addr(2), addr(1)], &[addr(1), addr(2)]));
        assert!(!compare_signers_lists(&[addr(1)], &[addr(1), addr(2)]));
        assert_eq!(
            remove_items_from_list(&[addr(3), addr(1), addr(2)], &[addr(1), addr(9)]),
            vec![addr(3), addr(2)]
        );
    }

    #[test]
    fn test_decode_penalties() {
        let header = Header {
            number: 900,
            penalties: vec![1u8; 21],
            ..Default::default()
        };
        assert!(matches!(
            decode_penalties(&header),
            Err(ConsensusError::MalformedPenalties { number: 900 })
        ));
    }
}
