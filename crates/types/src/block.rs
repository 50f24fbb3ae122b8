//! Blocks: hash-linked containers of transactions.

use crate::{Address, TransactionsSet, H256};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of a block above genesis, 0-indexed.
pub type BlockDepth = u64;

/// A block of the chain.
///
/// Blocks are created from templates, mined (the miner assigns the nonce),
/// and immutable afterwards. The block hash is the SHA-256 of the canonical
/// encoding, so any field change, including the nonce, changes the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    depth: BlockDepth,
    nonce: u64,
    timestamp: u64,
    prev_hash: H256,
    coinbase: Address,
    transactions: TransactionsSet,
}

impl Block {
    /// Assembles a block with nonce 0, the template form handed to miners.
    pub fn new(
        depth: BlockDepth,
        prev_hash: H256,
        timestamp: u64,
        coinbase: Address,
        transactions: TransactionsSet,
    ) -> Self {
        Self {
            depth,
            nonce: 0,
            timestamp,
            prev_hash,
            coinbase,
            transactions,
        }
    }

    /// The genesis block: a fixed, parameterless value installed when the
    /// store is empty.
    pub fn genesis() -> Self {
        Self {
            depth: 0,
            nonce: 0,
            timestamp: 0,
            prev_hash: H256::NIL,
            coinbase: Address::NULL,
            transactions: TransactionsSet::new(),
        }
    }

    /// Returns a copy with the given nonce, used by the miner to seal a
    /// template.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Height above genesis.
    pub fn depth(&self) -> BlockDepth {
        self.depth
    }

    /// The mined nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Production time, unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hash of the parent block; [`H256::NIL`] for genesis.
    pub fn prev_hash(&self) -> &H256 {
        &self.prev_hash
    }

    /// The block producer, credited with consumed fees.
    pub fn coinbase(&self) -> &Address {
        &self.coinbase
    }

    /// The ordered transactions of this block.
    pub fn transactions(&self) -> &TransactionsSet {
        &self.transactions
    }

    /// The block hash: SHA-256 of the canonical encoding.
    pub fn hash(&self) -> H256 {
        H256::of(self)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {{ depth: {}, hash: {}, txs: {} }}",
            self.depth,
            self.hash(),
            self.transactions.len()
        )
    }
}

impl Encode for Block {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u64(self.depth);
        enc.write_u64(self.nonce);
        enc.write_u64(self.timestamp);
        enc.write(&self.prev_hash);
        enc.write(&self.coinbase);
        enc.write(&self.transactions);
    }
}

impl Decode for Block {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        Ok(Self {
            depth: dec.read_u64()?,
            nonce: dec.read_u64()?,
            timestamp: dec.read_u64()?,
            prev_hash: dec.read()?,
            coinbase: dec.read()?,
            transactions: dec.read()?,
        })
    }
}
