//! Tests for signer snapshots: voting, recents window, retrieval and persistence.

mod common;

use common::{test_config, TestNet};
use dposcore_config::ConfigError;
use dposcore_consensus::{encode_masternodes_into_extra, ConsensusError, Engine, Snapshot};
use dposcore_storage::{KeyValueStore, MemoryDatabase};
use dposcore_types::{Address, BlockNonce, Header, H256};
use std::collections::HashMap;
use std::sync::Arc;

const EPOCH: u64 = 30;

fn addr(b: u8) -> Address {
    Address::new([b; 20])
}

/// One block in a voting scenario: who signed it and what it voted for.
struct Block {
    signer: Address,
    target: Address,
    authorize: bool,
}

fn vote(signer: u8, target: u8, authorize: bool) -> Block {
    Block {
        signer: addr(signer),
        target: addr(target),
        authorize,
    }
}

fn plain(signer: u8) -> Block {
    Block {
        signer: addr(signer),
        target: Address::ZERO,
        authorize: false,
    }
}

/// Applies `blocks` as heights 1.. on top of a snapshot at genesis.
fn replay(signers: &[u8], blocks: &[Block]) -> Result<Snapshot, ConsensusError> {
    replay_from(Snapshot::new(0, H256::NIL, &signers.iter().map(|b| addr(*b)).collect::<Vec<_>>()), blocks)
}

fn replay_from(base: Snapshot, blocks: &[Block]) -> Result<Snapshot, ConsensusError> {
    let mut creators = HashMap::new();
    let headers: Vec<Header> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let number = base.number + i as u64 + 1;
            creators.insert(number, b.signer);
            Header {
                number,
                coinbase: b.target,
                nonce: if b.authorize {
                    BlockNonce::AUTH
                } else {
                    BlockNonce::DROP
                },
                ..Default::default()
            }
        })
        .collect();
    base.apply(&headers, EPOCH, |h| Ok(creators[&h.number]))
}

#[test]
fn test_single_signer_adds_peer() {
    let snap = replay(&[1], &[vote(1, 2, true)]).unwrap();
    assert_eq!(snap.signers(), vec![addr(1), addr(2)]);
    assert!(snap.tally.is_empty());
    assert!(snap.votes.is_empty());
}

#[test]
fn test_majority_authorizes() {
    let snap = replay(&[1, 2, 3], &[vote(1, 9, true)]).unwrap();
    assert!(!snap.is_authorized(&addr(9)));
    assert_eq!(snap.tally[&addr(9)].votes, 1);

    let snap = replay(&[1, 2, 3], &[vote(1, 9, true), vote(2, 9, true)]).unwrap();
    assert!(snap.is_authorized(&addr(9)));
    assert!(!snap.tally.contains_key(&addr(9)));
    assert!(snap.votes.iter().all(|v| v.address != addr(9)));
}

#[test]
fn test_half_is_not_a_majority() {
    let blocks = [vote(1, 9, true), vote(2, 9, true)];
    let snap = replay(&[1, 2, 3, 4], &blocks).unwrap();
    assert!(!snap.is_authorized(&addr(9)));
    assert_eq!(snap.tally[&addr(9)].votes, 2);

    let blocks = [vote(1, 9, true), vote(2, 9, true), vote(3, 9, true)];
    let snap = replay(&[1, 2, 3, 4], &blocks).unwrap();
    assert!(snap.is_authorized(&addr(9)));
}

#[test]
fn test_repeated_vote_counts_once() {
    let blocks = [
        vote(1, 9, true),
        plain(2),
        plain(3),
        vote(1, 9, true),
    ];
    let snap = replay(&[1, 2, 3], &blocks).unwrap();
    assert_eq!(snap.tally[&addr(9)].votes, 1);
    assert_eq!(snap.votes.len(), 1);
    assert_eq!(snap.votes[0].block, 4);
}

#[test]
fn test_majority_deauthorizes_and_drops_votes() {
    // signer 3 votes for 9, then gets voted out; its vote goes with it
    let blocks = [
        vote(3, 9, true),
        vote(1, 3, false),
        vote(2, 3, false),
    ];
    let snap = replay(&[1, 2, 3], &blocks).unwrap();
    assert_eq!(snap.signers(), vec![addr(1), addr(2)]);
    assert!(snap.tally.is_empty());
    assert!(snap.votes.is_empty());
}

#[test]
fn test_self_drop_is_ignored() {
    let snap = replay(&[1, 2], &[vote(1, 1, false)]).unwrap();
    assert!(snap.tally.is_empty());
    assert!(snap.is_authorized(&addr(1)));
}

#[test]
fn test_meaningless_votes_are_not_counted() {
    let snap = replay(&[1, 2], &[vote(1, 2, true), vote(2, 9, false)]).unwrap();
    assert!(snap.tally.is_empty());
    assert!(snap.votes.is_empty());
}

#[test]
fn test_checkpoint_resets_votes() {
    let base = Snapshot::new(EPOCH - 2, H256::NIL, &[addr(1), addr(2), addr(3)]);
    // EPOCH - 1 votes, EPOCH is the checkpoint, EPOCH + 1 votes again
    let snap = replay_from(base, &[vote(1, 9, true), plain(2), vote(3, 9, true)]).unwrap();
    assert!(!snap.is_authorized(&addr(9)));
    assert_eq!(snap.tally[&addr(9)].votes, 1);
    assert_eq!(snap.votes[0].signer, addr(3));
}

#[test]
fn test_recent_signer_rejected() {
    let err = replay(&[1, 2, 3], &[plain(1), plain(2), plain(1)]).unwrap_err();
    assert!(matches!(
        err,
        ConsensusError::RecentlySigned { last: 1, number: 3, .. }
    ));

    // a full rotation later is fine
    assert!(replay(&[1, 2, 3], &[plain(1), plain(2), plain(3), plain(1)]).is_ok());
}

#[test]
fn test_checkpoint_exempt_from_recents() {
    let base = Snapshot::new(EPOCH - 1, H256::NIL, &[addr(1), addr(2)]);
    assert!(replay_from(base, &[plain(1), plain(1)]).is_err());

    let base = Snapshot::new(EPOCH - 2, H256::NIL, &[addr(1), addr(2)]);
    assert!(replay_from(base, &[plain(1), plain(1)]).is_ok());
}

#[test]
fn test_checkpoint_list_sets_rotation_window() {
    let base = Snapshot::new(EPOCH - 2, H256::NIL, &[addr(1), addr(2), addr(3), addr(4)]);
    let creators = [addr(4), addr(1), addr(2), addr(3), addr(1)];
    let headers: Vec<Header> = (0..creators.len() as u64)
        .map(|i| {
            let number = EPOCH - 1 + i;
            let extra = if number == EPOCH {
                encode_masternodes_into_extra(&[], &[addr(1), addr(2), addr(3)])
            } else {
                Vec::new()
            };
            Header {
                number,
                extra,
                ..Default::default()
            }
        })
        .collect();
    let recover = |h: &Header| -> Result<Address, ConsensusError> {
        Ok(creators[(h.number + 1 - EPOCH) as usize])
    };

    // the checkpoint starts the window afresh
    let at_checkpoint = base.apply(&headers[..2], EPOCH, recover).unwrap();
    assert_eq!(at_checkpoint.recents.keys().copied().collect::<Vec<_>>(), vec![EPOCH]);
    assert_eq!(at_checkpoint.rotation, 3);

    // addr(1) signs again after three blocks, not four
    let snap = base.apply(&headers, EPOCH, recover).unwrap();
    assert_eq!(snap.window(), 3);
    assert_eq!(snap.signers.len(), 4);
    assert_eq!(
        snap.recents.keys().copied().collect::<Vec<_>>(),
        vec![EPOCH + 1, EPOCH + 2, EPOCH + 3]
    );
}

#[test]
fn test_unauthorized_creator() {
    let err = replay(&[1, 2], &[plain(9)]).unwrap_err();
    assert!(matches!(err, ConsensusError::Unauthorized { number: 1, .. }));
}

#[test]
fn test_invalid_nonce() {
    let base = Snapshot::new(0, H256::NIL, &[addr(1)]);
    let header = Header {
        number: 1,
        nonce: BlockNonce([1, 2, 3, 4, 5, 6, 7, 8]),
        ..Default::default()
    };
    assert!(matches!(
        base.apply(&[header], EPOCH, |_| Ok(addr(1))),
        Err(ConsensusError::InvalidVote)
    ));
}

#[test]
fn test_apply_leaves_base_untouched() {
    let base = Snapshot::new(0, H256::NIL, &[addr(1)]);
    let before = base.clone();
    let next = replay_from(base.clone(), &[vote(1, 2, true)]).unwrap();
    assert_eq!(base, before);
    assert_eq!(next.number, 1);
    assert_ne!(next.signers, base.signers);
}

#[test]
fn test_store_and_load() {
    let db = MemoryDatabase::new();
    let snap = replay(&[1, 2, 3], &[vote(1, 9, true), plain(2)]).unwrap();
    snap.store(&db).unwrap();

    assert!(db.contains(&Snapshot::key(&snap.hash)).unwrap());
    let loaded = Snapshot::load(&db, &snap.hash).unwrap().unwrap();
    assert_eq!(loaded, snap);
    assert!(Snapshot::load(&db, &H256::keccak256(b"missing")).unwrap().is_none());
}

#[test]
fn test_snapshot_json_shape() {
    let snap = replay(&[1, 2, 3], &[vote(1, 9, true)]).unwrap();
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["number"], 1);
    assert_eq!(json["signers"].as_array().unwrap().len(), 3);
    let back: Snapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn test_engine_snapshot_from_genesis() {
    let net = TestNet::new(3);
    let engine = net.engine();
    let snap = engine.get_snapshot(net.chain.as_ref(), &net.genesis).unwrap();
    assert_eq!(snap.number, 0);
    assert_eq!(snap.hash, net.genesis.hash());
    assert_eq!(snap.signers(), net.addresses());
}

#[test]
fn test_engine_snapshot_follows_chain() {
    let net = TestNet::new(3);
    let engine = net.engine();
    let headers = net.extend(&engine, &net.genesis, 5);
    let head = headers.last().unwrap();

    let snap = engine.get_snapshot(net.chain.as_ref(), head).unwrap();
    assert_eq!(snap.number, 5);
    assert_eq!(snap.hash, head.hash());
    assert_eq!(snap.recents.get(&5), Some(&net.address(net.in_turn(5))));
    // window of three: block 2 has slid out
    assert!(!snap.recents.contains_key(&2));
}

#[test]
fn test_engine_persists_at_gap_height() {
    let net = TestNet::new(3);
    let db = Arc::new(MemoryDatabase::new());
    let engine = Engine::new(net.config.clone(), db.clone()).unwrap();
    let headers = net.extend(&engine, &net.genesis, 4);

    // (3 + gap) % epoch == 0
    let third = &headers[2];
    engine.get_snapshot(net.chain.as_ref(), third).unwrap();
    assert!(db.contains(&Snapshot::key(&third.hash())).unwrap());
    assert!(!db.contains(&Snapshot::key(&headers[3].hash())).unwrap());

    // a fresh engine on the same store starts from the persisted snapshot
    let restarted = Engine::new(net.config.clone(), db.clone()).unwrap();
    let snap = restarted.get_snapshot(net.chain.as_ref(), &headers[3]).unwrap();
    assert_eq!(snap.number, 4);
}

#[test]
fn test_engine_rejects_invalid_config() {
    let db = Arc::new(MemoryDatabase::new());
    let mut config = test_config();
    config.epoch = 0;
    assert!(matches!(
        Engine::new(config, db.clone()),
        Err(ConsensusError::Config(ConfigError::InvalidEpoch))
    ));

    let mut config = test_config();
    config.randomize_interval = 0;
    assert!(matches!(
        Engine::new(config, db),
        Err(ConsensusError::Config(ConfigError::ZeroParameter("randomize_interval")))
    ));
}

#[test]
fn test_engine_snapshot_unknown_ancestor() {
    let net = TestNet::new(3);
    let engine = net.engine();
    let hash = H256::keccak256(b"nowhere");
    assert!(matches!(
        engine.snapshot(net.chain.as_ref(), 7, hash, &[], None),
        Err(ConsensusError::UnknownAncestor { number: 7, .. })
    ));
}

#[test]
fn test_engine_snapshot_rejects_mismatched_parents() {
    let net = TestNet::new(3);
    let engine = net.engine();
    let headers = net.extend(&engine, &net.genesis, 2);
    let fresh = net.engine();
    // asks for block 2 but hands block 1 as the newest parent
    let result = fresh.snapshot(
        net.fresh_chain().as_ref(),
        2,
        headers[1].hash(),
        &headers[..1],
        None,
    );
    assert!(matches!(
        result,
        Err(ConsensusError::UnknownAncestor { number: 2, .. })
    ));
}

#[test]
fn test_authorised_queries() {
    let net = TestNet::new(3);
    let engine = net.engine();
    let chain = net.chain.as_ref();
    assert_eq!(
        engine.get_authorised_signers_from_snapshot(chain, &net.genesis).unwrap(),
        net.addresses()
    );
    assert!(engine.is_authorised_address(chain, &net.genesis, &net.address(1)).unwrap());
    assert!(!engine.is_authorised_address(chain, &net.genesis, &addr(9)).unwrap());
}
