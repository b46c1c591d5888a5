use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};

use crate::blockchain::{
    BlockchainError, ChainStore, Difficulty, JsonFileStore, SledStore, StorageError,
};

/// Where the chain is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// A single pretty-printed JSON file
    Json,
    /// A sled database directory
    Sled,
}

/// Ledger settings shared by every command
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Proof-of-work difficulty (leading zero hex characters)
    #[arg(
        long,
        global = true,
        env = "LEDGER_DIFFICULTY",
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(0..=Difficulty::MAX as i64)
    )]
    pub difficulty: u8,

    /// Path the chain is persisted to
    #[arg(long, global = true, env = "LEDGER_STORE", default_value = "chain.json")]
    pub store: PathBuf,

    /// Storage backend
    #[arg(
        long,
        global = true,
        value_enum,
        env = "LEDGER_BACKEND",
        default_value_t = StoreBackend::Json
    )]
    pub backend: StoreBackend,
}

impl Config {
    pub fn difficulty(&self) -> Result<Difficulty, BlockchainError> {
        Difficulty::new(self.difficulty)
    }

    /// Opens the configured backend
    pub fn open_store(&self) -> Result<Arc<dyn ChainStore>, StorageError> {
        let store: Arc<dyn ChainStore> = match self.backend {
            StoreBackend::Json => Arc::new(JsonFileStore::new(&self.store)),
            StoreBackend::Sled => Arc::new(SledStore::open(&self.store)?),
        };
        Ok(store)
    }
}
