//! Shared harness: an in-memory header chain and a signer network that
//! produces correctly sealed headers.

#![allow(dead_code)]

use dposcore_config::{ChainConfig, DposConfig};
use dposcore_consensus::constants::{EXTRA_SEAL, EXTRA_VANITY};
use dposcore_consensus::{
    encode_masternodes_into_extra, remove_items_from_list, sig_hash, ChainReader, Engine, HookResult,
    Hooks, StateDb,
};
use dposcore_crypto::PrivateKey;
use dposcore_storage::MemoryDatabase;
use dposcore_types::{addresses_to_bytes, Address, Block, Header, H256};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Small epochs so checkpoints come quickly.
pub fn test_config() -> DposConfig {
    DposConfig {
        period: 2,
        epoch: 6,
        gap: 3,
        reward_checkpoint: 6,
        randomize_interval: 6,
        ..Default::default()
    }
}

/// Header store with a canonical index.
pub struct MemoryChain {
    config: ChainConfig,
    headers: RwLock<HashMap<H256, Header>>,
    canonical: RwLock<BTreeMap<u64, H256>>,
}

impl MemoryChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            headers: RwLock::new(HashMap::new()),
            canonical: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stores `header` and makes it canonical at its height.
    pub fn insert(&self, header: Header) {
        let hash = header.hash();
        self.canonical.write().insert(header.number, hash);
        self.headers.write().insert(hash, header);
    }

    pub fn len(&self) -> usize {
        self.canonical.read().len()
    }
}

impl ChainReader for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_header(&self) -> Option<Header> {
        let hash = *self.canonical.read().values().next_back()?;
        self.headers.read().get(&hash).cloned()
    }

    fn get_header(&self, hash: H256, number: u64) -> Option<Header> {
        self.headers
            .read()
            .get(&hash)
            .filter(|h| h.number == number)
            .cloned()
    }

    fn get_header_by_number(&self, number: u64) -> Option<Header> {
        let hash = *self.canonical.read().get(&number)?;
        self.headers.read().get(&hash).cloned()
    }

    fn get_header_by_hash(&self, hash: H256) -> Option<Header> {
        self.headers.read().get(&hash).cloned()
    }

    fn get_block(&self, hash: H256, number: u64) -> Option<Block> {
        self.get_header(hash, number).map(|h| Block::new(h, Vec::new()))
    }
}

/// State stub returning a fixed root.
pub struct FixedState(pub H256);

impl StateDb for FixedState {
    fn intermediate_root(&mut self) -> H256 {
        self.0
    }
}

pub fn seal_header(header: &mut Header, key: &PrivateKey) {
    let sig = key.sign_prehash(&sig_hash(header)).unwrap().to_bytes();
    let len = header.extra.len();
    header.extra[len - EXTRA_SEAL..].copy_from_slice(&sig);
}

pub fn cosign(header: &mut Header, key: &PrivateKey) {
    header.validator = key.sign_prehash(&sig_hash(header)).unwrap().to_bytes().to_vec();
}

pub fn outsider() -> PrivateKey {
    PrivateKey::from_bytes(&[0xee; 32]).unwrap()
}

/// A set of masternodes sharing a genesis.
///
/// Keys are ordered by address, which is also the rotation order, so
/// without penalties the in-turn producer of block `n` is
/// `keys[(n - 1) % len]`.
pub struct TestNet {
    pub config: DposConfig,
    pub chain_config: ChainConfig,
    pub keys: Vec<PrivateKey>,
    pub chain: Arc<MemoryChain>,
    pub genesis: Header,
    /// Validator index blob embedded in checkpoint headers
    pub validators: Vec<u8>,
    /// Masternodes penalized at each checkpoint
    pub penalties: HashMap<u64, Vec<Address>>,
}

impl TestNet {
    pub fn new(signers: usize) -> Self {
        Self::with_config(signers, test_config())
    }

    pub fn with_config(signers: usize, config: DposConfig) -> Self {
        let chain_config = ChainConfig {
            dpos: config.clone(),
            ..Default::default()
        };
        Self::with_chain_config(signers, chain_config)
    }

    pub fn with_chain_config(signers: usize, chain_config: ChainConfig) -> Self {
        let mut keys: Vec<PrivateKey> = (0..signers)
            .map(|i| PrivateKey::from_bytes(&[i as u8 + 1; 32]).unwrap())
            .collect();
        keys.sort_by_key(|k| k.address());
        let addresses: Vec<Address> = keys.iter().map(|k| k.address()).collect();

        let genesis = Header {
            number: 0,
            extra: encode_masternodes_into_extra(b"genesis", &addresses),
            ..Default::default()
        };
        let chain = Arc::new(MemoryChain::new(chain_config.clone()));
        chain.insert(genesis.clone());

        Self {
            config: chain_config.dpos.clone(),
            chain_config,
            keys,
            chain,
            genesis,
            validators: Vec::new(),
            penalties: HashMap::new(),
        }
    }

    pub fn address(&self, index: usize) -> Address {
        self.keys[index].address()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys.iter().map(|k| k.address()).collect()
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.config.clone(), Arc::new(MemoryDatabase::new())).unwrap()
    }

    /// A chain holding only the genesis header.
    pub fn fresh_chain(&self) -> Arc<MemoryChain> {
        let chain = Arc::new(MemoryChain::new(self.chain_config.clone()));
        chain.insert(self.genesis.clone());
        chain
    }

    pub fn in_turn(&self, number: u64) -> usize {
        ((number - 1) % self.keys.len() as u64) as usize
    }

    /// Penalty hook reporting [`penalties`](Self::penalties).
    pub fn penalty_hooks(&self) -> Hooks {
        let penalties = self.penalties.clone();
        Hooks::new().with_penalty(move |_: &dyn ChainReader, number: u64| -> HookResult<Vec<Address>> {
            Ok(penalties.get(&number).cloned().unwrap_or_default())
        })
    }

    /// Masternodes checkpoint `number` lists: everyone but the nodes
    /// penalized there or at the checkpoints in the lookback.
    pub fn masternodes_at(&self, number: u64) -> Vec<Address> {
        let epoch = self.config.epoch;
        let mut masternodes = self.addresses();
        for i in 0..=self.config.penalty_lookback_epochs {
            if i == 0 || number > i * epoch {
                if let Some(penalized) = self.penalties.get(&(number - i * epoch)) {
                    masternodes = remove_items_from_list(&masternodes, penalized);
                }
            }
        }
        masternodes
    }

    /// A sealed header on top of `parent` produced by `keys[signer]`.
    pub fn header(&self, engine: &Engine, parent: &Header, signer: usize) -> Header {
        let number = parent.number + 1;
        let key = &self.keys[signer];
        let mut header = Header {
            parent_hash: parent.hash(),
            number,
            time: parent.time + self.config.period,
            extra: vec![0u8; EXTRA_VANITY + EXTRA_SEAL],
            ..Default::default()
        };
        if number % self.config.epoch == 0 {
            header.extra = encode_masternodes_into_extra(&[], &self.masternodes_at(number));
            header.validators = self.validators.clone();
            if let Some(penalized) = self.penalties.get(&number) {
                header.penalties = addresses_to_bytes(penalized);
            }
        }
        header.difficulty = engine.calc_difficulty(self.chain.as_ref(), parent, key.address());
        seal_header(&mut header, key);
        header
    }

    /// Index of the key whose turn follows `parent`.
    pub fn next_in_turn(&self, engine: &Engine, parent: &Header) -> usize {
        self.keys
            .iter()
            .position(|key| {
                engine
                    .your_turn(self.chain.as_ref(), parent, key.address())
                    .map_or(false, |turn| turn.is_my_turn)
            })
            .unwrap_or_else(|| self.in_turn(parent.number + 1))
    }

    /// Appends `count` in-turn headers to the chain and returns them.
    pub fn extend(&self, engine: &Engine, parent: &Header, count: usize) -> Vec<Header> {
        let mut parent = parent.clone();
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let header = self.header(engine, &parent, self.next_in_turn(engine, &parent));
            self.chain.insert(header.clone());
            parent = header.clone();
            out.push(header);
        }
        out
    }
}
