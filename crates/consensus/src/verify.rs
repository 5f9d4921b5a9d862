//! Header verification.
//!
//! Checks run in two stages. Standalone checks need nothing but the header
//! and the local clock. Cascading checks need the parent, the snapshot and,
//! at checkpoints, the penalty and masternode hooks; they finish with the
//! seal check.

use crate::chain::ChainReader;
use crate::constants::{EXTRA_SEAL, EXTRA_VANITY};
use crate::engine::Engine;
use crate::error::{ConsensusError, Result};
use crate::masternodes::{compare_signers_lists, decode_masternodes_from_extra, remove_items_from_list};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use dposcore_config::ChainConfig;
use dposcore_types::{addresses_to_bytes, Address, Block, BlockNonce, Header, EMPTY_UNCLE_HASH};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Cancels a running [`Engine::verify_headers`] batch.
///
/// Dropping the handle does not cancel; call [`AbortHandle::abort`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Sender<()>,
}

impl AbortHandle {
    /// Stops the worker before it publishes its next result.
    pub fn abort(&self) {
        let _ = self.tx.try_send(());
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rejects a header whose hash differs from the one pinned at its height.
pub fn verify_fork_hashes(config: &ChainConfig, header: &Header) -> Result<()> {
    if let Some(expected) = config.forks.pinned_hash(header.number) {
        let got = header.hash();
        if got != expected {
            return Err(ConsensusError::ForkHashMismatch {
                number: header.number,
                expected,
                got,
            });
        }
    }
    Ok(())
}

impl Engine {
    /// Verifies a single header whose ancestors are all in `chain`.
    pub fn verify_header(&self, chain: &dyn ChainReader, header: &Header, full: bool) -> Result<()> {
        self.verify_header_with_cache(chain, header, &[], full)
    }

    /// Verifies a batch of headers on a worker thread.
    ///
    /// Each header may use the ones before it in the batch as ancestors.
    /// Results arrive in input order; the worker stops after an abort.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        fulls: Vec<bool>,
    ) -> (AbortHandle, Receiver<Result<()>>) {
        let (abort_tx, abort_rx) = crossbeam_channel::bounded::<()>(1);
        let (results_tx, results_rx) = crossbeam_channel::bounded(headers.len().max(1));
        let engine = Arc::clone(self);

        std::thread::spawn(move || {
            for (i, header) in headers.iter().enumerate() {
                if aborted(&abort_rx) {
                    debug!(remaining = headers.len() - i, "Header verification aborted");
                    return;
                }
                let full = fulls.get(i).copied().unwrap_or(false);
                let result = engine.verify_header_with_cache(chain.as_ref(), header, &headers[..i], full);
                if aborted(&abort_rx) {
                    debug!(remaining = headers.len() - i, "Header verification aborted");
                    return;
                }
                if results_tx.send(result).is_err() {
                    return;
                }
            }
        });

        (AbortHandle { tx: abort_tx }, results_rx)
    }

    /// Blocks carry no uncles.
    pub fn verify_uncles(&self, block: &Block) -> Result<()> {
        if !block.uncles.is_empty() {
            return Err(ConsensusError::UnclesNotAllowed);
        }
        Ok(())
    }

    /// Verifies the seal of a header whose ancestors are all in `chain`.
    pub fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<()> {
        self.verify_seal_with(chain, header, &[], !self.config.testnet)
    }

    pub(crate) fn verify_header_with_cache(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        full: bool,
    ) -> Result<()> {
        let hash = header.hash();
        if self.verified_headers.contains(&hash) {
            trace!(number = header.number, %hash, "Header already verified");
            return Ok(());
        }
        self.verify_standalone(chain, header, parents, full)?;
        self.verified_headers.insert(hash, ());
        Ok(())
    }

    fn verify_standalone(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        full: bool,
    ) -> Result<()> {
        if self.config.skip_validation {
            return Ok(());
        }
        let full = full && !self.config.testnet;
        let number = header.number;

        if full {
            if number > self.config.epoch && header.validator.is_empty() {
                return Err(ConsensusError::NoValidatorSignature { number });
            }
            let now = unix_now();
            if header.time > now {
                return Err(ConsensusError::FutureBlock {
                    time: header.time,
                    now,
                });
            }
        }

        let checkpoint = self.config.is_checkpoint(number);
        if checkpoint && !header.coinbase.is_zero() {
            return Err(ConsensusError::InvalidCheckpointBeneficiary);
        }
        if header.nonce != BlockNonce::AUTH && header.nonce != BlockNonce::DROP {
            return Err(ConsensusError::InvalidVote);
        }
        if checkpoint && header.nonce != BlockNonce::DROP {
            return Err(ConsensusError::InvalidCheckpointVote);
        }

        if header.extra.len() < EXTRA_VANITY {
            return Err(ConsensusError::MissingVanity);
        }
        if header.extra.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(ConsensusError::MissingSignature);
        }
        let signers_bytes = header.extra.len() - EXTRA_VANITY - EXTRA_SEAL;
        if !checkpoint && signers_bytes != 0 {
            return Err(ConsensusError::ExtraSigners);
        }
        if checkpoint && signers_bytes % 20 != 0 {
            return Err(ConsensusError::InvalidCheckpointSigners { number });
        }

        if !header.mix_digest.is_zero() {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if header.uncle_hash != EMPTY_UNCLE_HASH {
            return Err(ConsensusError::InvalidUncleHash);
        }
        verify_fork_hashes(chain.config(), header)?;

        self.verify_cascading_fields(chain, header, parents, full)
    }

    fn verify_cascading_fields(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        full: bool,
    ) -> Result<()> {
        let number = header.number;
        if number == 0 {
            return Ok(());
        }
        let parent = self.parent_of(chain, header, parents)?;
        if parent.time + self.config.period > header.time {
            return Err(ConsensusError::InvalidTimestamp {
                time: header.time,
                parent_time: parent.time,
                period: self.config.period,
            });
        }

        if !self.config.is_checkpoint(number) {
            return self.verify_seal_with(chain, header, parents, full);
        }

        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents, None)?;
        if let Err(err) = self.checkpoint_signers_with(chain, header, &snap.signers(), parents) {
            if self.hooks.contract_signers.is_none() {
                return Err(err);
            }
            warn!(number, %err, "Checkpoint signers mismatch snapshot, retrying with contract signers");
            let signers = self.signers_from_contract(chain, header, parents)?;
            self.checkpoint_signers_with(chain, header, &signers, parents)?;
        }
        self.verify_seal_with(chain, header, parents, full)
    }

    fn parent_of(&self, chain: &dyn ChainReader, header: &Header, parents: &[Header]) -> Result<Header> {
        let number = header.number - 1;
        let parent = match parents.last() {
            Some(p) => Some(p.clone()),
            None => chain.get_header(header.parent_hash, number),
        };
        parent
            .filter(|p| p.number == number && p.hash() == header.parent_hash)
            .ok_or(ConsensusError::UnknownAncestor {
                number,
                hash: header.parent_hash,
            })
    }

    /// Reconciles a checkpoint's embedded masternodes with `signers` after
    /// removing the current and recent penalties.
    pub fn check_signers_on_checkpoint(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        signers: &[Address],
    ) -> Result<()> {
        self.checkpoint_signers_with(chain, header, signers, &[])
    }

    fn checkpoint_signers_with(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        signers: &[Address],
        parents: &[Header],
    ) -> Result<()> {
        let number = header.number;
        if self.exemptions.is_exempt(number) {
            debug!(number, "Signer check skipped at exempt checkpoint");
            return Ok(());
        }

        let mut signers = signers.to_vec();
        if let Some(penalties) = self.hooks.checkpoint_penalties(chain, header, &signers)? {
            for address in &penalties {
                debug!(number, %address, "Penalized masternode");
            }
            if header.penalties != addresses_to_bytes(&penalties) {
                return Err(ConsensusError::InvalidCheckpointPenalties { number });
            }
            signers = remove_items_from_list(&signers, &penalties);
        }
        let signers = self.remove_recent_penalties(chain, parents, signers, number)?;

        let embedded = decode_masternodes_from_extra(header);
        if !compare_signers_lists(&embedded, &signers) {
            return Err(ConsensusError::InvalidCheckpointSigners { number });
        }
        if let Some(hook) = &self.hooks.verify_masternodes {
            hook.verify(header, &signers)
                .map_err(|e| ConsensusError::hook("verify masternodes", e))?;
        }
        Ok(())
    }

    pub(crate) fn verify_seal_with(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        full: bool,
    ) -> Result<()> {
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents, None)?;
        let creator = self.recover_signer(header)?;

        let parent = self.parent_of(chain, header, parents)?;
        let expected = self.difficulty_with(chain, &parent, creator, parents);
        if header.difficulty != expected {
            return Err(ConsensusError::InvalidDifficulty {
                expected,
                got: header.difficulty,
            });
        }

        let masternodes = self.masternodes_with(chain, header, parents);
        if !snap.is_authorized(&creator) && !masternodes.contains(&creator) {
            return Err(ConsensusError::Unauthorized {
                signer: creator,
                number,
            });
        }
        if masternodes.len() > 1 && !self.config.is_checkpoint(number) {
            if let Some(last) = snap.recently_signed(number, &creator) {
                debug!(number, %creator, last, "Creator signed recently");
                return Err(ConsensusError::Unauthorized {
                    signer: creator,
                    number,
                });
            }
        }

        if full && number > self.config.epoch {
            let validator = self.recover_validator(header)?;
            let expected = self.validator_with(creator, chain, header, parents)?;
            if validator != expected {
                return Err(ConsensusError::FailedDoubleValidation {
                    creator,
                    validator,
                    expected,
                });
            }
        }
        Ok(())
    }
}

fn aborted(rx: &Receiver<()>) -> bool {
    match rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
    }
}
