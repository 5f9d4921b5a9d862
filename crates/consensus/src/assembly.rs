//! Local block production: prepare, finalize and seal.

use crate::chain::{ChainReader, StateDb};
use crate::constants::{EXTRA_SEAL, EXTRA_VANITY};
use crate::engine::Engine;
use crate::error::{ConsensusError, Result};
use crate::hooks::RewardBreakdown;
use crate::masternodes::remove_items_from_list;
use crate::signature::sig_hash;
use crate::verify::unix_now;
use crossbeam_channel::{Receiver, TryRecvError};
use dposcore_crypto::SIGNATURE_LENGTH;
use dposcore_types::{addresses_to_bytes, Address, Block, BlockNonce, Header, EMPTY_UNCLE_HASH, H256};
use rand::seq::SliceRandom;
use std::path::Path;
use tracing::{debug, error, info};

impl Engine {
    /// Fills in the consensus fields of a header about to be built on top
    /// of its parent.
    pub fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<()> {
        header.coinbase = Address::ZERO;
        header.nonce = BlockNonce::DROP;

        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[], None)?;
        let checkpoint = self.config.is_checkpoint(number);

        if !checkpoint {
            let proposals = self.proposals.read();
            let candidates: Vec<(Address, bool)> = proposals
                .iter()
                .filter(|(address, authorize)| snap.valid_vote(address, **authorize))
                .map(|(address, authorize)| (*address, *authorize))
                .collect();
            if let Some((address, authorize)) = candidates.choose(&mut rand::thread_rng()) {
                header.coinbase = *address;
                header.nonce = if *authorize {
                    BlockNonce::AUTH
                } else {
                    BlockNonce::DROP
                };
                debug!(number, %address, authorize, "Casting vote");
            }
        }

        let parent = chain
            .get_header(header.parent_hash, number - 1)
            .ok_or(ConsensusError::UnknownAncestor {
                number: number - 1,
                hash: header.parent_hash,
            })?;
        let signer = self.signer.read().address;
        header.difficulty = self.calc_difficulty(chain, &parent, signer);

        header.extra.resize(EXTRA_VANITY, 0);
        if checkpoint {
            let mut masternodes = snap.signers();
            if let Some(penalties) = self.hooks.checkpoint_penalties(chain, header, &masternodes)? {
                masternodes = remove_items_from_list(&masternodes, &penalties);
                header.penalties = addresses_to_bytes(&penalties);
                if !penalties.is_empty() {
                    info!(number, count = penalties.len(), "Penalized masternodes at checkpoint");
                }
            }
            masternodes = self.remove_recent_penalties(chain, &[], masternodes, number)?;
            header.extra.extend_from_slice(&addresses_to_bytes(&masternodes));

            if let Some(hook) = &self.hooks.validator {
                header.validators = hook
                    .validators(header, &masternodes)
                    .map_err(|e| ConsensusError::hook("validator", e))?;
            }
        }
        header.extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        header.mix_digest = H256::NIL;
        header.time = (parent.time + self.config.period).max(unix_now());
        Ok(())
    }

    /// Runs reward distribution at reward checkpoints and assembles the
    /// final block.
    pub fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn StateDb,
        parent_state: &dyn StateDb,
        transactions: Vec<Vec<u8>>,
    ) -> Result<Block> {
        let number = header.number;
        if let Some(hook) = &self.hooks.reward {
            if number > 0 && number % self.config.reward_checkpoint == 0 {
                let rewards = hook
                    .distribute(chain, state, parent_state, header)
                    .map_err(|e| ConsensusError::hook("reward", e))?;
                if let Some(folder) = &self.config.store_reward_folder {
                    store_rewards(folder, header, &rewards);
                }
            }
        }

        header.root = state.intermediate_root();
        header.uncle_hash = EMPTY_UNCLE_HASH;
        Ok(Block::new(header.clone(), transactions))
    }

    /// Signs `block` with the local signer.
    ///
    /// Returns `Ok(None)` when `stop` fires, or when the local signer signed
    /// too recently, in which case this blocks until `stop` fires.
    pub fn seal(
        &self,
        chain: &dyn ChainReader,
        block: Block,
        stop: &Receiver<()>,
    ) -> Result<Option<Block>> {
        let mut header = block.header;
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        let checkpoint = self.config.is_checkpoint(number);
        if self.config.period == 0 && block.transactions.is_empty() && !checkpoint {
            return Err(ConsensusError::WaitTransactions);
        }

        let (signer, sign_fn) = {
            let local = self.signer.read();
            (local.address, local.sign_fn.clone())
        };
        let sign_fn = sign_fn.ok_or(ConsensusError::NoSigner)?;

        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[], None)?;
        let masternodes = self.get_masternodes(chain, &header);
        if !snap.is_authorized(&signer) && !masternodes.contains(&signer) {
            return Err(ConsensusError::Unauthorized { signer, number });
        }
        if masternodes.len() > 1 && !checkpoint {
            if let Some(last) = snap.recently_signed(number, &signer) {
                info!(number, last, "Signed recently, must wait for others");
                // A dropped sender counts as a stop.
                stop.recv().ok();
                return Ok(None);
            }
        }

        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => return Ok(None),
        }

        let digest = sig_hash(&header);
        let sig = sign_fn
            .sign_hash(signer, &digest)
            .map_err(|e| ConsensusError::Signer(e.to_string()))?;
        if sig.len() != SIGNATURE_LENGTH {
            return Err(ConsensusError::Signer(format!(
                "expected {SIGNATURE_LENGTH} signature bytes, got {}",
                sig.len()
            )));
        }
        let len = header.extra.len();
        if len < EXTRA_SEAL {
            return Err(ConsensusError::MissingSignature);
        }
        header.extra[len - EXTRA_SEAL..].copy_from_slice(&sig);

        if self.get_validator(signer, chain, &header)? == signer {
            header.validator = sig;
        }
        info!(number, hash = %header.hash(), difficulty = header.difficulty, "Sealed block");

        Ok(Some(Block {
            header,
            transactions: block.transactions,
            uncles: block.uncles,
        }))
    }
}

fn store_rewards(folder: &Path, header: &Header, rewards: &RewardBreakdown) {
    let path = folder.join(format!("{}.{}", header.number, header.hash()));
    let result = serde_json::to_vec(rewards)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
    match result {
        Ok(()) => debug!(path = %path.display(), "Stored reward breakdown"),
        Err(err) => error!(path = %path.display(), %err, "Failed to store reward breakdown"),
    }
}
