// src/core/block.rs

use crate::core::transaction::Transaction;
use crate::crypto;
use crate::utils::now_ms;
use serde::{Deserialize, Serialize};

// A block: an ordered batch of transactions chained to its predecessor
// by hash, with a nonce found by proof-of-work.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    // Constructs a block at the current time with nonce 0 and its hash
    // computed immediately. Mining mutates only the nonce and hash.
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Self {
            index,
            timestamp: now_ms(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    // SHA-256 over the concatenation of the header fields. Integers are
    // rendered in decimal and the transaction list as its canonical
    // compact JSON, so independently built nodes agree byte-for-byte.
    pub fn compute_hash(&self) -> String {
        let tx_json = serde_json::to_string(&self.transactions).unwrap_or_default();
        let preimage = format!(
            "{}{}{}{}{}",
            self.index, self.timestamp, tx_json, self.previous_hash, self.nonce
        );
        crypto::sha256_hex(preimage.as_bytes())
    }

    // Proof-of-work: increment the nonce and rehash until the hash
    // starts with `difficulty` zero characters. CPU-bound and
    // synchronous; the caller holds the chain lock for the duration.
    pub fn mine(&mut self, difficulty: usize) {
        let target = "0".repeat(difficulty);
        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }
    }

    // True when the stored hash still matches the block contents.
    pub fn hash_is_consistent(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::is_valid)
    }

    // True when the hash meets the proof-of-work target.
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.hash.starts_with(&"0".repeat(difficulty))
    }
}
