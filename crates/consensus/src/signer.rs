//! Key-backed signing callback.

use crate::chain::SignerFn;
use crate::hooks::HookError;
use dposcore_crypto::PrivateKey;
use dposcore_types::{Address, H256};

/// Signs with an in-memory secp256k1 key.
///
/// Refuses to sign for any account other than the key's own.
pub struct KeySigner {
    key: PrivateKey,
}

impl KeySigner {
    /// Wraps a private key.
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Address of the wrapped key.
    pub fn address(&self) -> Address {
        self.key.address()
    }
}

impl SignerFn for KeySigner {
    fn sign_hash(&self, account: Address, hash: &H256) -> Result<Vec<u8>, HookError> {
        if account != self.key.address() {
            return Err(format!("unknown account {account}").into());
        }
        Ok(self.key.sign_prehash(hash)?.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
