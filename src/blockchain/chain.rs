use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use thiserror::Error;

use super::block::{now_timestamp, Block, UnsealedBlock, GENESIS_PREVIOUS_HASH};
use super::payload::Payload;
use super::pow::{Difficulty, ProofOfWork};
use super::storage::{ChainStore, StorageError};

/// Errors that can occur during blockchain operations
///
/// Everything except `InvalidDifficulty` is an integrity finding reported
/// by [`Blockchain::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    #[error("Invalid difficulty {0}: at most {} leading zeros are possible", Difficulty::MAX)]
    InvalidDifficulty(u8),

    #[error("Invalid chain: no blocks")]
    EmptyChain,

    #[error("Invalid block {index}: stored hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("Invalid block {index}: previous_hash does not match the hash of block {}", .index - 1)]
    BrokenLink { index: usize },

    #[error("Invalid block {index}: hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: Difficulty },
}

/// Result of an append
///
/// The block is part of the chain whatever `persisted` says.
#[derive(Debug)]
pub struct AppendOutcome {
    /// The newly mined block
    pub block: Block,

    /// Outcome of saving the chain after the append
    pub persisted: Result<(), StorageError>,
}

/// Represents the blockchain
///
/// Clones share the same chain, so one instance can be handed to every
/// HTTP worker.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Arc<Mutex<Vec<Block>>>,

    /// Held for the whole read-tip, mine, push, save sequence
    append_lock: Arc<Mutex<()>>,

    /// Miner configured with the chain difficulty
    pow: ProofOfWork,

    /// Storage for blockchain data
    storage: Option<Arc<dyn ChainStore>>,
}

impl Blockchain {
    /// Creates an in-memory blockchain with a genesis block
    pub fn new(difficulty: Difficulty) -> Self {
        let blockchain = Self::empty(difficulty, None);
        blockchain.create_genesis_block();
        blockchain
    }

    /// Creates a blockchain backed by `storage`
    ///
    /// A stored chain is adopted as-is. A missing, empty or unreadable one is
    /// replaced by a fresh genesis block, which is saved straight away.
    pub fn with_storage(difficulty: Difficulty, storage: Arc<dyn ChainStore>) -> Self {
        let blockchain = Self::empty(difficulty, Some(storage.clone()));

        let blocks = match storage.load() {
            Ok(blocks) => blocks,
            Err(StorageError::NotFound(msg)) => {
                info!("{}", msg);
                Vec::new()
            }
            Err(err) => {
                warn!("Failed to load blockchain from storage: {}", err);
                Vec::new()
            }
        };

        if blocks.is_empty() {
            info!("No existing blockchain found in storage, creating genesis block");
            blockchain.create_genesis_block();
            if let Err(err) = blockchain.flush() {
                warn!("Failed to save genesis block: {}", err);
            }
        } else {
            info!("Loaded {} blocks from storage", blocks.len());
            *blockchain.lock_chain() = blocks;
            if let Err(err) = blockchain.validate() {
                warn!("Loaded blockchain does not validate: {}", err);
            }
        }

        blockchain
    }

    fn empty(difficulty: Difficulty, storage: Option<Arc<dyn ChainStore>>) -> Self {
        Blockchain {
            chain: Arc::new(Mutex::new(Vec::new())),
            append_lock: Arc::new(Mutex::new(())),
            pow: ProofOfWork::new(difficulty),
            storage,
        }
    }

    /// Creates the genesis block (first block in the chain)
    ///
    /// Genesis is sealed directly rather than mined.
    fn create_genesis_block(&self) {
        let genesis = UnsealedBlock::genesis(now_timestamp()).seal();
        self.lock_chain().push(genesis);
    }

    fn lock_chain(&self) -> MutexGuard<'_, Vec<Block>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index and previous hash for the block that would extend the tip
    fn next_link(&self) -> (u64, String) {
        match self.lock_chain().last() {
            Some(tip) => (tip.index() + 1, tip.hash().to_string()),
            None => (0, GENESIS_PREVIOUS_HASH.to_string()),
        }
    }

    /// Mines a new block carrying `data` and appends it to the chain
    ///
    /// Appends are serialized. The chain is saved after the push; a failed
    /// save is logged and reported in the outcome but does not undo the
    /// append.
    pub fn append(&self, data: Payload) -> AppendOutcome {
        let _guard = self.append_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (index, previous_hash) = self.next_link();
        let candidate = UnsealedBlock::new(index, now_timestamp(), data, previous_hash);
        let block = self.pow.mine(candidate);

        let snapshot = {
            let mut chain = self.lock_chain();
            chain.push(block.clone());
            chain.clone()
        };
        info!("Appended block {} with hash {}", block.index(), block.hash());

        let persisted = self.save(&snapshot);
        if let Err(err) = &persisted {
            warn!("Block {} appended but not saved: {}", block.index(), err);
        }

        AppendOutcome { block, persisted }
    }

    /// Mines the block that `data` would become, without appending it
    pub fn preview(&self, data: Payload) -> Block {
        let (index, previous_hash) = self.next_link();
        self.pow
            .mine(UnsealedBlock::new(index, now_timestamp(), data, previous_hash))
    }

    /// Gets a block by its index
    pub fn get_block(&self, index: usize) -> Option<Block> {
        self.lock_chain().get(index).cloned()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Option<Block> {
        self.lock_chain().last().cloned()
    }

    /// Gets the entire blockchain
    ///
    /// # Returns
    ///
    /// A snapshot of all blocks in index order
    pub fn explorer(&self) -> Vec<Block> {
        self.lock_chain().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_chain().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_chain().is_empty()
    }

    pub fn difficulty(&self) -> Difficulty {
        self.pow.difficulty()
    }

    /// Validates the blockchain
    ///
    /// Genesis only has its hash recomputed. Every later block must link to
    /// its parent, hash to its stored value and meet the current difficulty.
    ///
    /// # Returns
    ///
    /// The first violation found
    pub fn validate(&self) -> Result<(), BlockchainError> {
        let chain = self.lock_chain();
        let difficulty = self.difficulty();

        let genesis = chain.first().ok_or(BlockchainError::EmptyChain)?;
        if !genesis.has_valid_hash() {
            return Err(BlockchainError::HashMismatch { index: 0 });
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous_block, current_block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if current_block.previous_hash() != previous_block.hash() {
                return Err(BlockchainError::BrokenLink { index });
            }

            if !current_block.has_valid_hash() {
                return Err(BlockchainError::HashMismatch { index });
            }

            if !difficulty.is_met_by(current_block.hash()) {
                return Err(BlockchainError::InsufficientWork { index, difficulty });
            }
        }

        Ok(())
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the blockchain is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Saves the current chain to storage, if any is configured
    pub fn flush(&self) -> Result<(), StorageError> {
        let snapshot = self.explorer();
        self.save(&snapshot)
    }

    fn save(&self, chain: &[Block]) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.save(chain),
            None => Ok(()),
        }
    }
}
