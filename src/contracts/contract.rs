// src/contracts/contract.rs

use crate::utils::now_ms;
use crate::vm::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// A deployed contract. Storage keys and values are 256-bit words kept
// as decimal strings so the JSON encoding survives values past 53
// bits; bytecode serializes as a plain array of byte integers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contract {
    pub address: String,
    pub bytecode: Vec<u8>,
    pub creator: String,
    pub storage: BTreeMap<String, String>,
    pub balance: u64,
    pub created_at: u64,
}

impl Contract {
    pub fn new(address: String, bytecode: Vec<u8>, creator: String) -> Self {
        Self {
            address,
            bytecode,
            creator,
            storage: BTreeMap::new(),
            balance: 0,
            created_at: now_ms(),
        }
    }

    // The storage map as VM words. Unparseable entries are dropped;
    // they can only appear if the persisted record was edited by hand.
    pub fn storage_words(&self) -> HashMap<U256, U256> {
        self.storage
            .iter()
            .filter_map(|(key, value)| {
                let key = U256::from_dec_str(key).ok()?;
                let value = U256::from_dec_str(value).ok()?;
                Some((key, value))
            })
            .collect()
    }

    // Replaces the storage map from VM words after a successful
    // execution.
    pub fn set_storage_words(&mut self, words: &HashMap<U256, U256>) {
        self.storage = words
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
    }
}
