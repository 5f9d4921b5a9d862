//! Historical checkpoints exempt from signer reconciliation.
//!
//! A handful of mainnet checkpoints were produced with signer lists that do
//! not reconcile; nodes replaying history must accept them as-is. The set is
//! configuration data (`skip_signer_check_blocks`), empty by default.

use std::collections::BTreeSet;

/// Checkpoint heights whose signer list is accepted without reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerCheckExemptions {
    blocks: BTreeSet<u64>,
}

impl SignerCheckExemptions {
    /// Builds the table from a set of heights.
    pub fn new(blocks: BTreeSet<u64>) -> Self {
        Self { blocks }
    }

    /// Whether reconciliation is skipped at `number`.
    pub fn is_exempt(&self, number: u64) -> bool {
        self.blocks.contains(&number)
    }

    /// Number of exempt heights.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no height is exempt.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
