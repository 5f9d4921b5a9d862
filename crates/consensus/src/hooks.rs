//! Injected collaborators.
//!
//! Reward distribution, penalty computation, validator assignment and
//! contract lookups live outside the engine. The host installs them as
//! [`Hooks`]; every hook is optional and plain closures implement the
//! traits.

use crate::chain::{ChainReader, StateDb};
use crate::error::{ConsensusError, Result};
use dposcore_types::{Address, Header, H256};
use std::sync::Arc;

/// Error type hooks return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type hooks return.
pub type HookResult<T> = std::result::Result<T, HookError>;

/// Reward breakdown produced by the reward hook, persisted as JSON.
pub type RewardBreakdown = serde_json::Map<String, serde_json::Value>;

/// Distributes block rewards at reward checkpoints.
pub trait RewardHook: Send + Sync {
    /// Credits rewards into `state` and returns the breakdown.
    fn distribute(
        &self,
        chain: &dyn ChainReader,
        state: &mut dyn StateDb,
        parent_state: &dyn StateDb,
        header: &Header,
    ) -> HookResult<RewardBreakdown>;
}

/// Penalties computed per epoch, before the signing-penalty fork.
pub trait EpochPenaltyHook: Send + Sync {
    /// Masternodes penalized at checkpoint `number`.
    fn penalties(&self, chain: &dyn ChainReader, number: u64) -> HookResult<Vec<Address>>;
}

/// Penalties computed from signing activity, after the signing-penalty fork.
pub trait SigningPenaltyHook: Send + Sync {
    /// Masternodes among `candidates` penalized at `header`.
    fn penalties(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        candidates: &[Address],
    ) -> HookResult<Vec<Address>>;
}

/// Assigns double-validation indices at checkpoints.
pub trait ValidatorHook: Send + Sync {
    /// Encoded validator index blob for `masternodes`.
    fn validators(&self, header: &Header, masternodes: &[Address]) -> HookResult<Vec<u8>>;
}

/// Extra external check of a checkpoint's masternode list.
pub trait VerifyMasternodesHook: Send + Sync {
    /// Rejects the checkpoint by returning an error.
    fn verify(&self, header: &Header, masternodes: &[Address]) -> HookResult<()>;
}

/// Reads the candidate set from the validator contract.
pub trait ContractSignersHook: Send + Sync {
    /// Signers recorded in contract state at `block_hash`.
    fn signers(&self, block_hash: H256) -> HookResult<Vec<Address>>;
}

impl<F> RewardHook for F
where
    F: Fn(&dyn ChainReader, &mut dyn StateDb, &dyn StateDb, &Header) -> HookResult<RewardBreakdown>
        + Send
        + Sync,
{
    fn distribute(
        &self,
        chain: &dyn ChainReader,
        state: &mut dyn StateDb,
        parent_state: &dyn StateDb,
        header: &Header,
    ) -> HookResult<RewardBreakdown> {
        self(chain, state, parent_state, header)
    }
}

impl<F> EpochPenaltyHook for F
where
    F: Fn(&dyn ChainReader, u64) -> HookResult<Vec<Address>> + Send + Sync,
{
    fn penalties(&self, chain: &dyn ChainReader, number: u64) -> HookResult<Vec<Address>> {
        self(chain, number)
    }
}

impl<F> SigningPenaltyHook for F
where
    F: Fn(&dyn ChainReader, &Header, &[Address]) -> HookResult<Vec<Address>> + Send + Sync,
{
    fn penalties(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        candidates: &[Address],
    ) -> HookResult<Vec<Address>> {
        self(chain, header, candidates)
    }
}

impl<F> ValidatorHook for F
where
    F: Fn(&Header, &[Address]) -> HookResult<Vec<u8>> + Send + Sync,
{
    fn validators(&self, header: &Header, masternodes: &[Address]) -> HookResult<Vec<u8>> {
        self(header, masternodes)
    }
}

impl<F> VerifyMasternodesHook for F
where
    F: Fn(&Header, &[Address]) -> HookResult<()> + Send + Sync,
{
    fn verify(&self, header: &Header, masternodes: &[Address]) -> HookResult<()> {
        self(header, masternodes)
    }
}

impl<F> ContractSignersHook for F
where
    F: Fn(H256) -> HookResult<Vec<Address>> + Send + Sync,
{
    fn signers(&self, block_hash: H256) -> HookResult<Vec<Address>> {
        self(block_hash)
    }
}

/// The set of hooks installed on an engine.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Reward distribution at reward checkpoints
    pub reward: Option<Arc<dyn RewardHook>>,
    /// Epoch penalties, before the signing-penalty fork
    pub penalty: Option<Arc<dyn EpochPenaltyHook>>,
    /// Signing penalties, from the signing-penalty fork on
    pub signing_penalty: Option<Arc<dyn SigningPenaltyHook>>,
    /// Validator index assignment
    pub validator: Option<Arc<dyn ValidatorHook>>,
    /// Checkpoint masternode verification
    pub verify_masternodes: Option<Arc<dyn VerifyMasternodesHook>>,
    /// Contract signer lookup
    pub contract_signers: Option<Arc<dyn ContractSignersHook>>,
}

impl Hooks {
    /// No hooks installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the reward hook.
    pub fn with_reward(mut self, hook: impl RewardHook + 'static) -> Self {
        self.reward = Some(Arc::new(hook));
        self
    }

    /// Installs the epoch penalty hook.
    pub fn with_penalty(mut self, hook: impl EpochPenaltyHook + 'static) -> Self {
        self.penalty = Some(Arc::new(hook));
        self
    }

    /// Installs the signing penalty hook.
    pub fn with_signing_penalty(mut self, hook: impl SigningPenaltyHook + 'static) -> Self {
        self.signing_penalty = Some(Arc::new(hook));
        self
    }

    /// Installs the validator assignment hook.
    pub fn with_validator(mut self, hook: impl ValidatorHook + 'static) -> Self {
        self.validator = Some(Arc::new(hook));
        self
    }

    /// Installs the masternode verification hook.
    pub fn with_verify_masternodes(mut self, hook: impl VerifyMasternodesHook + 'static) -> Self {
        self.verify_masternodes = Some(Arc::new(hook));
        self
    }

    /// Installs the contract signer lookup.
    pub fn with_contract_signers(mut self, hook: impl ContractSignersHook + 'static) -> Self {
        self.contract_signers = Some(Arc::new(hook));
        self
    }

    /// Penalties that apply at checkpoint `header`.
    ///
    /// From the signing-penalty fork on the signing hook decides, before it
    /// the epoch hook does. `None` means the hook for this height is not
    /// installed and no penalty list is enforced.
    pub(crate) fn checkpoint_penalties(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        candidates: &[Address],
    ) -> Result<Option<Vec<Address>>> {
        if chain.config().is_tip_signing(header.number) {
            match &self.signing_penalty {
                Some(hook) => hook
                    .penalties(chain, header, candidates)
                    .map(Some)
                    .map_err(|e| ConsensusError::hook("signing penalty", e)),
                None => Ok(None),
            }
        } else {
            match &self.penalty {
                Some(hook) => hook
                    .penalties(chain, header.number)
                    .map(Some)
                    .map_err(|e| ConsensusError::hook("penalty", e)),
                None => Ok(None),
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("reward", &self.reward.is_some())
            .field("penalty", &self.penalty.is_some())
            .field("signing_penalty", &self.signing_penalty.is_some())
            .field("validator", &self.validator.is_some())
            .field("verify_masternodes", &self.verify_masternodes.is_some())
            .field("contract_signers", &self.contract_signers.is_some())
            .finish()
    }
}
