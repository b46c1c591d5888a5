// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block payloads
// - Unsealed and sealed blocks with their canonical hash
// - Proof of work
// - The chain and its validation
// - Chain storage backends

pub mod block;
pub mod chain;
pub mod payload;
pub mod pow;
pub mod storage;

// Re-export main components for easier access
pub use block::{Block, UnsealedBlock};
pub use chain::{AppendOutcome, Blockchain, BlockchainError};
pub use payload::Payload;
pub use pow::{Difficulty, ProofOfWork};
pub use storage::{ChainStore, JsonFileStore, SledStore, StorageError};
