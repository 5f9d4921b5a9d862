//! Header signing digest and signer recovery.
//!
//! Two independent caches memoize recovered addresses by header hash: one for
//! the creator seal at the tail of `extra`, one for the `validator` field.

use crate::cache::RecentCache;
use crate::constants::{EXTRA_SEAL, INMEMORY_SIGNATURES};
use crate::error::{ConsensusError, Result};
use dposcore_crypto::{recover_address, SIGNATURE_LENGTH};
use dposcore_types::{Address, Header, H256};
use rlp::RlpStream;
use tracing::trace;

/// Recovered addresses keyed by header hash.
pub type SignatureCache = RecentCache<H256, Address>;

/// Creates a signature cache with the default capacity.
pub fn new_signature_cache() -> SignatureCache {
    RecentCache::new(INMEMORY_SIGNATURES)
}

/// The digest both the creator and the validator sign.
///
/// Covers every Ethereum-layout field with the trailing seal cut from
/// `extra`; the `validators`, `validator` and `penalties` fields are not
/// covered.
pub fn sig_hash(header: &Header) -> H256 {
    let cut = header.extra.len().saturating_sub(EXTRA_SEAL);
    let mut stream = RlpStream::new_list(15);
    header.append_base_fields(&mut stream, &header.extra[..cut]);
    H256::keccak256(&stream.out())
}

/// Recovers the creator of a header from its extra-data seal.
pub fn ecrecover(header: &Header, cache: &SignatureCache) -> Result<Address> {
    let hash = header.hash();
    if let Some(address) = cache.get(&hash) {
        trace!(number = header.number, %hash, "creator signature cache hit");
        return Ok(address);
    }
    if header.extra.len() < EXTRA_SEAL {
        return Err(ConsensusError::MissingSignature);
    }
    let seal = &header.extra[header.extra.len() - EXTRA_SEAL..];
    let signer = recover_address(&sig_hash(header), seal)?;
    cache.insert(hash, signer);
    Ok(signer)
}

/// Recovers the double-validation signer from the `validator` field.
pub fn recover_validator(header: &Header, cache: &SignatureCache) -> Result<Address> {
    let hash = header.hash();
    if let Some(address) = cache.get(&hash) {
        trace!(number = header.number, %hash, "validator signature cache hit");
        return Ok(address);
    }
    if header.validator.len() != SIGNATURE_LENGTH {
        return Err(ConsensusError::FailValidatorSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            header.validator.len()
        )));
    }
    let validator = recover_address(&sig_hash(header), &header.validator)
        .map_err(|e| ConsensusError::FailValidatorSignature(e.to_string()))?;
    cache.insert(hash, validator);
    Ok(validator)
}
