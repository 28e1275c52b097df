// src/storage/db.rs

use crate::contracts::contract::Contract;
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::StorageError;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

// Key prefixes. Everything the node persists lives in one keyspace,
// namespaced by these prefixes; values are JSON unless noted.
const BLOCK_PREFIX: &str = "block:"; // block:{hash} -> block
const HEIGHT_PREFIX: &str = "height:"; // height:{index} -> hash (plain hex)
const TX_PREFIX: &str = "tx:"; // tx:{txid} -> location
const PENDING_PREFIX: &str = "pending:"; // pending:{txid} -> transaction
const CONTRACT_PREFIX: &str = "contract:"; // contract:{address} -> contract
const CHAIN_LENGTH_KEY: &str = "meta:chainLength"; // -> integer
// "meta:difficulty" is reserved in this keyspace and currently unused.

// Where a confirmed transaction landed, as recorded under `tx:`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TxLocation {
    pub block_hash: String,
    pub block_index: u64,
}

// The persistent store. Holds the rocksdb handle behind an Arc so the
// ledger and the contract manager can share one exclusive-open
// database.
#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

// The raw handle has no Debug of its own; show the path instead.
impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path().display().to_string())
            .finish()
    }
}

impl Storage {
    // Opens (or creates) the database. A second opener hits rocksdb's
    // lock file and gets `Locked`, which is fatal at startup.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        match DB::open(&opts, path.as_ref()) {
            Ok(db) => {
                info!(path = %path.as_ref().display(), "opened database");
                Ok(Self { db: Arc::new(db) })
            }
            Err(e) if e.to_string().to_lowercase().contains("lock") => Err(StorageError::Locked),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    // Collects every entry under a prefix. Keys are lexicographic, so a
    // forward scan from the prefix itself visits exactly the range
    // `prefix` ..= `prefix 0xFF`.
    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            entries.push((String::from_utf8_lossy(&key).into_owned(), value.into_vec()));
        }
        Ok(entries)
    }

    // The persisted chain length, 0 for a fresh database.
    pub fn chain_length(&self) -> Result<u64, StorageError> {
        match self.get(CHAIN_LENGTH_KEY)? {
            Some(bytes) => String::from_utf8_lossy(&bytes)
                .parse::<u64>()
                .map_err(|e| StorageError::Corrupt {
                    key: CHAIN_LENGTH_KEY.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(0),
        }
    }

    // Persists one appended block in a single batch: the block record,
    // its height-index slot, a location entry per transaction, and the
    // new chain length. Either all land or none do.
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let block_json = serde_json::to_string(block)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut batch = WriteBatch::default();
        batch.put(
            format!("{}{}", BLOCK_PREFIX, block.hash).as_bytes(),
            block_json.as_bytes(),
        );
        batch.put(
            format!("{}{}", HEIGHT_PREFIX, block.index).as_bytes(),
            block.hash.as_bytes(),
        );
        for tx in &block.transactions {
            let location = TxLocation {
                block_hash: block.hash.clone(),
                block_index: block.index,
            };
            let location_json = serde_json::to_string(&location)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            batch.put(
                format!("{}{}", TX_PREFIX, tx.txid()).as_bytes(),
                location_json.as_bytes(),
            );
        }
        batch.put(
            CHAIN_LENGTH_KEY.as_bytes(),
            format!("{}", block.index + 1).as_bytes(),
        );
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    // Reads the chain back through the height index. A missing or
    // unreadable block ends the walk early: the readable prefix is
    // returned and the gap logged, and the caller decides whether that
    // counts as corruption.
    pub fn load_chain(&self) -> Result<Vec<Block>, StorageError> {
        let length = self.chain_length()?;
        let mut chain = Vec::with_capacity(length as usize);
        for index in 0..length {
            let hash = match self.get(&format!("{}{}", HEIGHT_PREFIX, index))? {
                Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                None => {
                    warn!(index, "height index entry missing, loading stops here");
                    break;
                }
            };
            let block = match self.get(&format!("{}{}", BLOCK_PREFIX, hash))? {
                Some(bytes) => match serde_json::from_slice::<Block>(&bytes) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(index, %hash, error = %e, "unreadable block record, loading stops here");
                        break;
                    }
                },
                None => {
                    warn!(index, %hash, "block record missing, loading stops here");
                    break;
                }
            };
            chain.push(block);
        }
        Ok(chain)
    }

    // Rewrites the height index and chain length for a replacement
    // chain in one batch. Block and transaction records of the
    // displaced chain stay behind as orphans; the height index is the
    // source of truth on load.
    pub fn replace_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for block in chain {
            let block_json = serde_json::to_string(block)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            batch.put(
                format!("{}{}", BLOCK_PREFIX, block.hash).as_bytes(),
                block_json.as_bytes(),
            );
            batch.put(
                format!("{}{}", HEIGHT_PREFIX, block.index).as_bytes(),
                block.hash.as_bytes(),
            );
            for tx in &block.transactions {
                let location = TxLocation {
                    block_hash: block.hash.clone(),
                    block_index: block.index,
                };
                let location_json = serde_json::to_string(&location)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                batch.put(
                    format!("{}{}", TX_PREFIX, tx.txid()).as_bytes(),
                    location_json.as_bytes(),
                );
            }
        }
        batch.put(
            CHAIN_LENGTH_KEY.as_bytes(),
            format!("{}", chain.len()).as_bytes(),
        );
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn transaction_location(&self, txid: &str) -> Result<Option<TxLocation>, StorageError> {
        let key = format!("{}{}", TX_PREFIX, txid);
        match self.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn save_pending_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
        let tx_json =
            serde_json::to_string(tx).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.db
            .put(
                format!("{}{}", PENDING_PREFIX, tx.txid()).as_bytes(),
                tx_json.as_bytes(),
            )
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn remove_pending_transaction(&self, txid: &str) -> Result<(), StorageError> {
        self.db
            .delete(format!("{}{}", PENDING_PREFIX, txid).as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn load_pending(&self) -> Result<Vec<Transaction>, StorageError> {
        let mut pending = Vec::new();
        for (key, value) in self.prefix_scan(PENDING_PREFIX)? {
            match serde_json::from_slice::<Transaction>(&value) {
                Ok(tx) => pending.push(tx),
                Err(e) => warn!(%key, error = %e, "skipping unreadable pending transaction"),
            }
        }
        Ok(pending)
    }

    // Drops the whole pending range in one batch.
    pub fn clear_pending(&self) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for (key, _) in self.prefix_scan(PENDING_PREFIX)? {
            batch.delete(key.as_bytes());
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn save_contract(&self, contract: &Contract) -> Result<(), StorageError> {
        let contract_json =
            serde_json::to_string(contract).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.db
            .put(
                format!("{}{}", CONTRACT_PREFIX, contract.address).as_bytes(),
                contract_json.as_bytes(),
            )
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    pub fn load_contract(&self, address: &str) -> Result<Option<Contract>, StorageError> {
        let key = format!("{}{}", CONTRACT_PREFIX, address);
        match self.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}
