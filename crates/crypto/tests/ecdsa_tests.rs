//! Tests for header sealing keys and signer recovery

use dposcore_crypto::{recover_address, CryptoError, PrivateKey, Signature, SIGNATURE_LENGTH};
use dposcore_types::H256;

#[test]
fn test_private_key_generation() {
    let key1 = PrivateKey::random();
    let key2 = PrivateKey::random();
    assert_ne!(key1.address(), key2.address());
}

#[test]
fn test_private_key_from_hex() {
    let hex = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    let with_prefix = PrivateKey::from_hex(hex).unwrap();
    let without_prefix = PrivateKey::from_hex(&hex[2..]).unwrap();
    assert_eq!(with_prefix.address(), without_prefix.address());
    assert!(matches!(
        PrivateKey::from_hex("0x1234"),
        Err(CryptoError::InvalidLength { expected: 32, actual: 2 })
    ));
}

#[test]
fn test_seal_round_trip() {
    let key = PrivateKey::from_bytes(&[3u8; 32]).unwrap();
    let digest = H256::keccak256(b"sealed header");
    let seal = key.sign_prehash(&digest).unwrap().to_bytes();
    assert_eq!(seal.len(), SIGNATURE_LENGTH);

    let parsed = Signature::from_slice(&seal).unwrap();
    assert_eq!(parsed.to_bytes(), seal);
    assert_eq!(parsed.recover_address(&digest).unwrap(), key.address());
    assert_eq!(recover_address(&digest, &seal).unwrap(), key.address());
}

#[test]
fn test_public_key_derives_address() {
    let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap();
    assert_eq!(key.public_key().to_address(), key.address());
}

#[test]
fn test_short_seal_rejected() {
    let digest = H256::keccak256(b"header");
    assert!(matches!(
        recover_address(&digest, &[0u8; 64]),
        Err(CryptoError::InvalidLength { expected: 65, actual: 64 })
    ));
}

#[test]
fn test_bad_recovery_id_rejected() {
    let key = PrivateKey::from_bytes(&[5u8; 32]).unwrap();
    let digest = H256::keccak256(b"header");
    let mut seal = key.sign_prehash(&digest).unwrap().to_bytes();
    seal[64] = 9;
    assert!(matches!(
        recover_address(&digest, &seal),
        Err(CryptoError::RecoveryFailed(_))
    ));
}
