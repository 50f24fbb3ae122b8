//! The chain block store: block index, depth map, transaction map and the
//! cached top-block pointer.
//!
//! The store is chain-extension only. It accepts a block exactly when it is
//! unknown and links onto the current top; anything else is rejected and
//! left to the peer layer to sort out. Reorganization is not performed here.

use std::collections::HashMap;
use std::sync::Arc;

use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_types::{Block, BlockDepth, Transaction, H256};
use tracing::{debug, info, warn};

use crate::db::{namespace, KeyValueStore};
use crate::{Result, StorageError};

/// Where a committed transaction lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLocation {
    /// Hash of the containing block.
    pub block_hash: H256,
    /// Index inside the block's transaction list.
    pub index: u32,
}

impl Encode for TxLocation {
    fn encode(&self, enc: &mut Encoder) {
        enc.write(&self.block_hash);
        enc.write_u32(self.index);
    }
}

impl Decode for TxLocation {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        Ok(Self {
            block_hash: dec.read()?,
            index: dec.read_u32()?,
        })
    }
}

/// Verdict of a link check against the current top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The block is already in the store.
    Duplicate,
    /// The block extends the current top.
    Extends,
    /// The block neither extends the top nor is known.
    Rejected,
}

/// The block index backed by the key-value engine.
pub struct BlockStore {
    engine: Arc<dyn KeyValueStore>,
    blocks: HashMap<H256, Block>,
    depth_index: HashMap<BlockDepth, H256>,
    tx_index: HashMap<H256, TxLocation>,
    top_hash: H256,
}

impl BlockStore {
    /// Opens the store, replaying the persisted chain and verifying its
    /// integrity. Installs genesis when the engine is empty.
    pub fn open(engine: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut store = Self {
            engine,
            blocks: HashMap::new(),
            depth_index: HashMap::new(),
            tx_index: HashMap::new(),
            top_hash: H256::NIL,
        };

        match store.engine.get(namespace::META_TOP)? {
            None => {
                let genesis = Block::genesis();
                info!(hash = %genesis.hash(), "installing genesis block");
                store.persist(&genesis)?;
                store.index(genesis);
            }
            Some(raw) => {
                let top: H256 = basalt_codec::from_bytes(&raw)?;
                store.replay(top)?;
            }
        }
        Ok(store)
    }

    /// Walks the persisted chain from `top` back to genesis, checking every
    /// link and depth on the way. Any mismatch is fatal.
    fn replay(&mut self, top: H256) -> Result<()> {
        let mut cursor = top;
        let mut chain = Vec::new();

        loop {
            let raw = self.engine.get(&namespace::block(&cursor))?.ok_or_else(|| {
                StorageError::Inconsistency(format!("missing block {cursor} while replaying"))
            })?;
            let block: Block = basalt_codec::from_bytes(&raw)?;
            if block.hash() != cursor {
                return Err(StorageError::Inconsistency(format!(
                    "block stored under {cursor} hashes to {}",
                    block.hash()
                )));
            }
            let parent = *block.prev_hash();
            let depth = block.depth();
            chain.push(block);

            if depth == 0 {
                if !parent.is_nil() {
                    return Err(StorageError::Inconsistency(
                        "genesis has a non-nil parent".into(),
                    ));
                }
                break;
            }
            cursor = parent;
        }

        chain.reverse();
        for (expected_depth, block) in chain.iter().enumerate() {
            if block.depth() != expected_depth as BlockDepth {
                return Err(StorageError::Inconsistency(format!(
                    "depth gap: expected {expected_depth}, found {}",
                    block.depth()
                )));
            }
        }

        info!(depth = chain.len() - 1, top = %top, "chain replayed");
        for block in chain {
            self.index(block);
        }
        Ok(())
    }

    fn persist(&self, block: &Block) -> Result<()> {
        let hash = block.hash();
        self.engine
            .put(&namespace::block(&hash), &basalt_codec::to_bytes(block))?;
        self.engine.put(
            &namespace::depth(block.depth()),
            &basalt_codec::to_bytes(&hash),
        )?;
        for (index, tx) in block.transactions().iter().enumerate() {
            let location = TxLocation {
                block_hash: hash,
                index: index as u32,
            };
            self.engine.put(
                &namespace::tx(&tx.hash()),
                &basalt_codec::to_bytes(&location),
            )?;
        }
        self.engine
            .put(namespace::META_TOP, &basalt_codec::to_bytes(&hash))?;
        Ok(())
    }

    fn index(&mut self, block: Block) {
        let hash = block.hash();
        self.depth_index.insert(block.depth(), hash);
        for (index, tx) in block.transactions().iter().enumerate() {
            self.tx_index.insert(
                tx.hash(),
                TxLocation {
                    block_hash: hash,
                    index: index as u32,
                },
            );
        }
        self.blocks.insert(hash, block);
        self.top_hash = hash;
    }

    /// Checks how `block` relates to the current top without mutating
    /// anything.
    pub fn check_link(&self, block: &Block) -> LinkOutcome {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return LinkOutcome::Duplicate;
        }
        let top = self.top_block();
        if block.depth() == top.depth() + 1 && *block.prev_hash() == self.top_hash {
            LinkOutcome::Extends
        } else {
            LinkOutcome::Rejected
        }
    }

    /// Persists and indexes a block that passed [`Self::check_link`] and
    /// state application, advancing the top pointer.
    pub fn insert(&mut self, block: Block) -> Result<()> {
        match self.check_link(&block) {
            LinkOutcome::Extends => {}
            outcome => {
                warn!(hash = %block.hash(), ?outcome, "refusing to insert non-extending block");
                return Err(StorageError::Inconsistency(format!(
                    "insert of non-extending block {}",
                    block.hash()
                )));
            }
        }
        self.persist(&block)?;
        debug!(depth = block.depth(), hash = %block.hash(), "block stored");
        self.index(block);
        Ok(())
    }

    /// Whether a block hash is known.
    pub fn contains(&self, hash: &H256) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Looks up a block by hash.
    pub fn find_block(&self, hash: &H256) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Looks up the block hash at a depth.
    pub fn find_block_hash(&self, depth: BlockDepth) -> Option<H256> {
        self.depth_index.get(&depth).copied()
    }

    /// Looks up a committed transaction by hash.
    pub fn find_transaction(&self, hash: &H256) -> Option<&Transaction> {
        let location = self.tx_index.get(hash)?;
        let block = self.blocks.get(&location.block_hash)?;
        block.transactions().iter().nth(location.index as usize)
    }

    /// Whether a transaction hash is committed anywhere in the chain.
    pub fn contains_transaction(&self, hash: &H256) -> bool {
        self.tx_index.contains_key(hash)
    }

    /// The current top block.
    pub fn top_block(&self) -> &Block {
        self.blocks
            .get(&self.top_hash)
            .expect("top pointer always references a stored block")
    }

    /// Hash of the current top block.
    pub fn top_hash(&self) -> H256 {
        self.top_hash
    }

    /// Depth of the current top block.
    pub fn top_depth(&self) -> BlockDepth {
        self.top_block().depth()
    }
}
