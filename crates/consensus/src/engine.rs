//! The engine and snapshot retrieval.

use crate::cache::RecentCache;
use crate::chain::{ChainReader, SignerFn};
use crate::compat::SignerCheckExemptions;
use crate::constants::{INMEMORY_SNAPSHOTS, INMEMORY_VERIFIED_HEADERS};
use crate::error::{ConsensusError, Result};
use crate::hooks::Hooks;
use crate::masternodes::decode_masternodes_from_extra;
use crate::signature::{self, new_signature_cache, SignatureCache};
use crate::snapshot::Snapshot;
use dposcore_config::DposConfig;
use dposcore_storage::KeyValueStore;
use dposcore_types::{Address, Header, H256};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Local signing identity.
#[derive(Clone, Default)]
pub(crate) struct LocalSigner {
    pub(crate) address: Address,
    pub(crate) sign_fn: Option<Arc<dyn SignerFn>>,
}

/// Delegated proof-of-stake consensus engine.
///
/// Verifies headers against the masternode rotation, maintains signer
/// snapshots, and prepares, finalizes and seals locally produced blocks.
/// All methods take `&self`; the engine is shared between the import
/// pipeline, the block producer and RPC handlers.
pub struct Engine {
    pub(crate) config: DposConfig,
    pub(crate) db: Arc<dyn KeyValueStore>,
    pub(crate) hooks: Hooks,
    pub(crate) exemptions: SignerCheckExemptions,

    pub(crate) recents: RecentCache<H256, Arc<Snapshot>>,
    pub(crate) signatures: SignatureCache,
    pub(crate) validator_signatures: SignatureCache,
    pub(crate) verified_headers: RecentCache<H256, ()>,

    pub(crate) proposals: RwLock<HashMap<Address, bool>>,
    pub(crate) signer: RwLock<LocalSigner>,
}

impl Engine {
    /// Creates an engine persisting snapshots to `db`.
    ///
    /// Fails when `config` does not validate; checkpoint arithmetic divides
    /// by `epoch` and `randomize_interval`.
    pub fn new(config: DposConfig, db: Arc<dyn KeyValueStore>) -> Result<Self> {
        config.validate()?;
        let exemptions = SignerCheckExemptions::new(config.skip_signer_check_blocks.clone());
        info!(
            period = config.period,
            epoch = config.epoch,
            gap = config.gap,
            exemptions = exemptions.len(),
            "Initialized DPoS engine"
        );
        Ok(Self {
            config,
            db,
            hooks: Hooks::default(),
            exemptions,
            recents: RecentCache::new(INMEMORY_SNAPSHOTS),
            signatures: new_signature_cache(),
            validator_signatures: new_signature_cache(),
            verified_headers: RecentCache::new(INMEMORY_VERIFIED_HEADERS),
            proposals: RwLock::new(HashMap::new()),
            signer: RwLock::new(LocalSigner::default()),
        })
    }

    /// Installs hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Engine parameters.
    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    /// Installed hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// The creator of `header`, recovered from its seal.
    pub fn author(&self, header: &Header) -> Result<Address> {
        self.recover_signer(header)
    }

    /// Creator recovery through the engine's signature cache.
    pub fn recover_signer(&self, header: &Header) -> Result<Address> {
        signature::ecrecover(header, &self.signatures)
    }

    /// Double-validator recovery through the engine's validator cache.
    pub fn recover_validator(&self, header: &Header) -> Result<Address> {
        signature::recover_validator(header, &self.validator_signatures)
    }

    /// Installs the local signing identity used by `prepare` and `seal`.
    pub fn authorize(&self, signer: Address, sign_fn: Arc<dyn SignerFn>) {
        let mut local = self.signer.write();
        local.address = signer;
        local.sign_fn = Some(sign_fn);
        info!(%signer, "Authorized local signer");
    }

    /// Address of the local signer, zero when none is installed.
    pub fn signer(&self) -> Address {
        self.signer.read().address
    }

    /// Queues a vote to add (`true`) or drop (`false`) `address`.
    pub fn propose(&self, address: Address, authorize: bool) {
        self.proposals.write().insert(address, authorize);
        debug!(%address, authorize, "Queued signer proposal");
    }

    /// Drops a queued vote.
    pub fn discard(&self, address: Address) {
        self.proposals.write().remove(&address);
    }

    /// Currently queued votes.
    pub fn proposals(&self) -> HashMap<Address, bool> {
        self.proposals.read().clone()
    }

    /// Signer snapshot at block `(number, hash)`.
    ///
    /// Walks back from the requested block until a cached or persisted
    /// snapshot (or genesis) is found, then replays the collected headers.
    /// `parents` are not-yet-imported ancestors, oldest first; `self_header`
    /// is used when the requested block itself is not in the chain yet.
    pub fn snapshot(
        &self,
        chain: &dyn ChainReader,
        mut number: u64,
        mut hash: H256,
        mut parents: &[Header],
        self_header: Option<&Header>,
    ) -> Result<Arc<Snapshot>> {
        let mut headers: Vec<Header> = Vec::new();
        let base = loop {
            if let Some(snap) = self.recents.get(&hash) {
                trace!(number, %hash, "Snapshot cache hit");
                break snap;
            }
            if self.config.is_snapshot_persist_height(number) {
                if let Some(snap) = Snapshot::load(self.db.as_ref(), &hash)? {
                    debug!(number, %hash, "Loaded snapshot from disk");
                    break Arc::new(snap);
                }
            }
            if number == 0 {
                let genesis = chain.get_header_by_number(0).ok_or(ConsensusError::UnknownAncestor {
                    number: 0,
                    hash,
                })?;
                self.verify_header(chain, &genesis, true)?;
                let signers = decode_masternodes_from_extra(&genesis);
                let snap = Snapshot::new(0, genesis.hash(), &signers);
                snap.store(self.db.as_ref())?;
                info!(signers = signers.len(), hash = %snap.hash, "Stored genesis snapshot");
                break Arc::new(snap);
            }

            let header = if let Some((last, rest)) = parents.split_last() {
                if last.number != number || last.hash() != hash {
                    return Err(ConsensusError::UnknownAncestor { number, hash });
                }
                parents = rest;
                last.clone()
            } else if let Some(own) = self_header.filter(|h| h.number == number && h.hash() == hash) {
                own.clone()
            } else {
                chain
                    .get_header(hash, number)
                    .ok_or(ConsensusError::UnknownAncestor { number, hash })?
            };
            hash = header.parent_hash;
            number -= 1;
            headers.push(header);
        };

        if headers.is_empty() {
            self.recents.insert(base.hash, base.clone());
            return Ok(base);
        }
        headers.reverse();
        let snap = Arc::new(base.apply(&headers, self.config.epoch, |h| self.recover_signer(h))?);
        self.recents.insert(snap.hash, snap.clone());

        if self.config.is_snapshot_persist_height(snap.number) {
            snap.store(self.db.as_ref())?;
            trace!(number = snap.number, hash = %snap.hash, "Persisted voting snapshot");
        }
        Ok(snap)
    }

    /// Snapshot at `header`.
    pub fn get_snapshot(&self, chain: &dyn ChainReader, header: &Header) -> Result<Arc<Snapshot>> {
        self.snapshot(chain, header.number, header.hash(), &[], Some(header))
    }

    /// Persists a snapshot.
    pub fn store_snapshot(&self, snap: &Snapshot) -> Result<()> {
        snap.store(self.db.as_ref())
    }

    /// Sorted signer set of the snapshot at `header`.
    pub fn get_authorised_signers_from_snapshot(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
    ) -> Result<Vec<Address>> {
        Ok(self.get_snapshot(chain, header)?.signers())
    }

    /// Whether `address` is in the snapshot signer set at `header`.
    pub fn is_authorised_address(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        address: &Address,
    ) -> Result<bool> {
        Ok(self.get_snapshot(chain, header)?.is_authorized(address))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("snapshots", &self.recents.len())
            .finish_non_exhaustive()
    }
}
