//! Header and block types.
//!
//! The header layout is Ethereum's, extended with three fields used by the
//! delegated-proof-of-stake engine:
//! - `validators`: opaque validator-assignment blob written at checkpoints
//! - `validator`: the optional 65-byte double-validation signature
//! - `penalties`: packed 20-byte addresses removed from the signer set

use crate::{Address, Error, Result, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Keccak256 of the RLP encoding of an empty list: the only uncle hash a
/// header may carry.
pub const EMPTY_UNCLE_HASH: H256 = H256::new([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4, 0x1a,
    0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4, 0x93, 0x47,
]);

/// Size of the logs bloom in bytes.
pub const BLOOM_SIZE: usize = 256;

/// Number of header fields in the RLP list.
const HEADER_FIELDS: usize = 18;

/// The 8-byte header nonce.
///
/// The engine repurposes it as a vote marker: [`BlockNonce::AUTH`] proposes
/// adding the coinbase to the signer set, [`BlockNonce::DROP`] proposes
/// removing it (and is the mandatory value on checkpoint blocks).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    /// Vote to add the coinbase as a signer.
    pub const AUTH: Self = Self([0xff; 8]);

    /// Vote to remove the coinbase, or no vote at all.
    pub const DROP: Self = Self([0x00; 8]);

    /// Returns the nonce bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for BlockNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockNonce(0x{})", hex::encode(self.0))
    }
}

impl Serialize for BlockNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for BlockNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("nonce must be 8 bytes"))?;
        Ok(Self(arr))
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent header
    pub parent_hash: H256,
    /// Hash of the uncle list; always [`EMPTY_UNCLE_HASH`] on this chain
    pub uncle_hash: H256,
    /// Vote target on non-checkpoint blocks, zero on checkpoints
    pub coinbase: Address,
    /// State root after executing the block
    pub root: H256,
    /// Transactions root
    pub tx_hash: H256,
    /// Receipts root
    pub receipt_hash: H256,
    /// Logs bloom
    pub bloom: Vec<u8>,
    /// Turn-based difficulty used for fork choice
    pub difficulty: u64,
    /// Block height
    pub number: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Gas used
    pub gas_used: u64,
    /// Unix timestamp in seconds
    pub time: u64,
    /// Vanity, optional checkpoint signer list, and the creator seal
    pub extra: Vec<u8>,
    /// Must be zero
    pub mix_digest: H256,
    /// Vote marker
    pub nonce: BlockNonce,
    /// Validator-assignment blob written at checkpoints
    pub validators: Vec<u8>,
    /// Double-validation signature, empty when absent
    pub validator: Vec<u8>,
    /// Packed addresses penalised at this checkpoint
    pub penalties: Vec<u8>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: H256::NIL,
            uncle_hash: EMPTY_UNCLE_HASH,
            coinbase: Address::ZERO,
            root: H256::NIL,
            tx_hash: H256::NIL,
            receipt_hash: H256::NIL,
            bloom: vec![0u8; BLOOM_SIZE],
            difficulty: 0,
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            time: 0,
            extra: Vec::new(),
            mix_digest: H256::NIL,
            nonce: BlockNonce::DROP,
            validators: Vec::new(),
            validator: Vec::new(),
            penalties: Vec::new(),
        }
    }
}

impl Header {
    /// Keccak256 of the full RLP encoding, seals included.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&rlp::encode(self))
    }

    /// RLP encodes the header.
    pub fn rlp_encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes a header from RLP bytes.
    pub fn rlp_decode(data: &[u8]) -> Result<Self> {
        rlp::decode(data).map_err(Error::RlpDecode)
    }

    /// Appends the Ethereum-layout fields shared by the full encoding and
    /// the signing digest. `extra` is passed in so the signer can strip
    /// the seal.
    pub fn append_base_fields(&self, s: &mut RlpStream, extra: &[u8]) {
        s.append(&self.parent_hash);
        s.append(&self.uncle_hash);
        s.append(&self.coinbase);
        s.append(&self.root);
        s.append(&self.tx_hash);
        s.append(&self.receipt_hash);
        s.append(&self.bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        s.append(&extra);
        s.append(&self.mix_digest);
        s.append(&self.nonce.0.as_slice());
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(HEADER_FIELDS);
        self.append_base_fields(s, &self.extra);
        s.append(&self.validators);
        s.append(&self.validator);
        s.append(&self.penalties);
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != HEADER_FIELDS {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let nonce: Vec<u8> = rlp.val_at(14)?;
        let nonce: [u8; 8] = nonce
            .as_slice()
            .try_into()
            .map_err(|_| DecoderError::RlpInvalidLength)?;
        Ok(Self {
            parent_hash: rlp.val_at(0)?,
            uncle_hash: rlp.val_at(1)?,
            coinbase: rlp.val_at(2)?,
            root: rlp.val_at(3)?,
            tx_hash: rlp.val_at(4)?,
            receipt_hash: rlp.val_at(5)?,
            bloom: rlp.val_at(6)?,
            difficulty: rlp.val_at(7)?,
            number: rlp.val_at(8)?,
            gas_limit: rlp.val_at(9)?,
            gas_used: rlp.val_at(10)?,
            time: rlp.val_at(11)?,
            extra: rlp.val_at(12)?,
            mix_digest: rlp.val_at(13)?,
            nonce: BlockNonce(nonce),
            validators: rlp.val_at(15)?,
            validator: rlp.val_at(16)?,
            penalties: rlp.val_at(17)?,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header(#{}, hash={}, parent={}, difficulty={})",
            self.number,
            self.hash(),
            self.parent_hash,
            self.difficulty
        )
    }
}

/// A block: header, opaque encoded transactions, and uncles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// The block header
    pub header: Header,
    /// Encoded transactions; the engine never inspects them
    pub transactions: Vec<Vec<u8>>,
    /// Uncle headers; a valid block carries none
    pub uncles: Vec<Header>,
}

impl Block {
    /// Assembles a block with no uncles.
    pub fn new(header: Header, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            transactions,
            uncles: Vec::new(),
        }
    }

    /// Block hash (the header hash).
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }
}
