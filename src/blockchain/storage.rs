use std::ffi::OsString;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Durable home of the full chain
///
/// `save` always receives the whole chain and replaces whatever was stored.
pub trait ChainStore: Send + Sync + Debug {
    fn save(&self, chain: &[Block]) -> Result<(), StorageError>;

    fn load(&self) -> Result<Vec<Block>, StorageError>;
}

/// Chain stored as a pretty-printed JSON array in a single file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file a save is written to before it replaces `path`
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("chain"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ChainStore for JsonFileStore {
    fn save(&self, chain: &[Block]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(chain)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        // Rename over the old file so a torn write never replaces a good chain
        let temp_path = self.temp_path();
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn load(&self) -> Result<Vec<Block>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!(
                    "No chain file at {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|e| StorageError::DeserializationError(e.to_string()))
    }
}

/// Chain stored in a sled database, one entry per block
///
/// Keys are big-endian positions so that tree order is chain order. A load
/// fails unless the keys run `0, 1, 2, ..` and every entry decodes.
pub struct SledStore {
    /// The database instance
    db: Db,

    /// Tree for blocks
    blocks: Tree,
}

impl Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl SledStore {
    /// Opens (or creates) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree("blocks")?;

        Ok(Self { db, blocks })
    }
}

impl ChainStore for SledStore {
    fn save(&self, chain: &[Block]) -> Result<(), StorageError> {
        for (position, block) in chain.iter().enumerate() {
            let value = serde_json::to_vec(block)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            self.blocks.insert((position as u64).to_be_bytes(), value)?;
        }

        // Drop entries past the new tip so the tree mirrors `chain` exactly
        let len = chain.len() as u64;
        for entry in self.blocks.range(len.to_be_bytes()..) {
            let (key, _) = entry?;
            self.blocks.remove(key)?;
        }

        self.db.flush()?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            let expected = blocks.len() as u64;

            let position = <[u8; 8]>::try_from(&key[..])
                .map(u64::from_be_bytes)
                .map_err(|_| {
                    StorageError::DeserializationError(format!(
                        "Malformed block key {}",
                        hex::encode(&key)
                    ))
                })?;
            if position != expected {
                return Err(StorageError::DeserializationError(format!(
                    "Block {} is missing, next stored key is {}",
                    expected, position
                )));
            }

            let block = serde_json::from_slice::<Block>(&value).map_err(|e| {
                StorageError::DeserializationError(format!("block {}: {}", position, e))
            })?;
            blocks.push(block);
        }

        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Blockchain, Difficulty, Payload};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_chain() -> Vec<Block> {
        let blockchain = Blockchain::new(Difficulty::new(1).unwrap());
        blockchain.append(Payload::from("Pay 10 to Alice"));
        blockchain.append(Payload::from(42i64));
        blockchain.append(
            serde_json::from_str::<Payload>(r#"{"to":"bob","items":[1,2.5,{"deep":true}]}"#)
                .unwrap(),
        );
        blockchain.explorer()
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("chain.json"));
        let chain = sample_chain();

        store.save(&chain).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, chain);
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn test_json_store_writes_indented_array() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        store.save(&sample_chain()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"index\": 0,"));
        for field in ["timestamp", "data", "previous_hash", "nonce", "hash"] {
            assert!(raw.contains(&format!("\"{}\":", field)));
        }
    }

    #[test]
    fn test_json_store_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));

        assert!(matches!(store.load(), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_json_store_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(&path, "{ not a chain").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(StorageError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_json_store_reads_existing_chain_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");
        let raw = r#"[
  {
    "index": 0,
    "timestamp": 1700000000.5,
    "data": "Genesis Block",
    "previous_hash": "0000000000000000000000000000000000000000000000000000000000000000",
    "nonce": 0,
    "hash": "d4fa7d15602929754b88e3096dba9dab447da6ce1fc4c41f4092e588c6d830e2"
  }
]"#;
        fs::write(&path, raw).unwrap();

        let blockchain = Blockchain::with_storage(
            Difficulty::new(2).unwrap(),
            Arc::new(JsonFileStore::new(&path)),
        );

        assert_eq!(blockchain.len(), 1);
        assert!(blockchain.is_valid());
        assert_eq!(blockchain.get_block(0).unwrap().timestamp(), 1700000000.5);
    }

    #[test]
    fn test_sled_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        let chain = sample_chain();

        store.save(&chain).unwrap();
        assert_eq!(store.load().unwrap(), chain);
    }

    #[test]
    fn test_sled_store_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        let chain = sample_chain();

        store.save(&chain).unwrap();
        store.save(&chain[..2]).unwrap();

        assert_eq!(store.load().unwrap(), chain[..2].to_vec());
    }

    #[test]
    fn test_json_store_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        let chain = sample_chain();

        store.save(&chain[..2]).unwrap();
        store.save(&chain).unwrap();

        assert_eq!(store.load().unwrap(), chain);
        assert!(!dir.path().join("chain.json.tmp").exists());
    }

    #[test]
    fn test_json_store_failed_save_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chain.json"));
        let chain = sample_chain();
        store.save(&chain).unwrap();

        // A directory in the way makes the temp write fail
        fs::create_dir(dir.path().join("chain.json.tmp")).unwrap();

        assert!(matches!(store.save(&chain[..1]), Err(StorageError::Io(_))));
        assert_eq!(store.load().unwrap(), chain);
    }

    #[test]
    fn test_sled_store_corrupt_entry_fails_load() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path().join("db")).unwrap());
        let blockchain = Blockchain::with_storage(Difficulty::new(1).unwrap(), store.clone());
        for i in 0..4 {
            blockchain.append(Payload::from(format!("block {}", i)));
        }
        store.blocks.insert(2u64.to_be_bytes(), &b"garbage"[..]).unwrap();

        assert!(matches!(
            store.load(),
            Err(StorageError::DeserializationError(_))
        ));

        // The broken chain is not adopted, so index still matches position
        let reopened = Blockchain::with_storage(Difficulty::new(1).unwrap(), store.clone());
        assert_eq!(reopened.len(), 1);

        let outcome = reopened.append(Payload::from("after"));
        assert!(outcome.persisted.is_ok());
        assert_eq!(outcome.block.index(), 1);

        let indices: Vec<u64> = store.load().unwrap().iter().map(Block::index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_sled_store_missing_key_fails_load() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        store.save(&sample_chain()).unwrap();
        store.blocks.remove(1u64.to_be_bytes()).unwrap();

        assert!(matches!(
            store.load(),
            Err(StorageError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_sled_store_empty() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();

        assert!(store.load().unwrap().is_empty());
    }
}
