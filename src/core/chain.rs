// src/core/chain.rs

use crate::core::block::Block;
use crate::core::genesis::create_genesis_block;
use crate::core::transaction::Transaction;
use crate::error::ChainError;
use crate::storage::db::Storage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// Proof-of-work target: required count of leading zero hex chars.
pub const DIFFICULTY: usize = 4;
// Coinbase value injected by every mined block.
pub const MINING_REWARD: u64 = 50;

// A transaction together with the block that confirmed it, as returned
// by per-address history queries.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub block_index: u64,
}

// Where a transaction currently lives, as seen by the status query.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed { block_hash: String, block_index: u64 },
    Pending,
    Unknown,
}

// The ledger: the block chain itself plus the pool of transactions
// waiting to be mined. Owns the optional persistent store; every
// chain-mutating operation writes through to it.
#[derive(Debug)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub difficulty: usize,
    pub mining_reward: u64,
    storage: Option<Storage>,
}

impl Blockchain {
    // A fresh in-memory chain starting at genesis. Used by tests and by
    // nodes running without persistence.
    pub fn new() -> Self {
        Self {
            chain: vec![create_genesis_block()],
            pending: Vec::new(),
            difficulty: DIFFICULTY,
            mining_reward: MINING_REWARD,
            storage: None,
        }
    }

    // Opens against a store: loads the persisted chain and pending pool
    // when present, otherwise creates and persists genesis. Idempotent.
    pub fn with_storage(storage: Storage) -> Result<Self, ChainError> {
        let chain = storage.load_chain()?;
        let (chain, pending) = if chain.is_empty() {
            info!("no existing chain found, creating genesis block");
            let genesis = create_genesis_block();
            storage.save_block(&genesis)?;
            (vec![genesis], Vec::new())
        } else {
            let pending = storage.load_pending()?;
            info!(
                blocks = chain.len(),
                pending = pending.len(),
                "loaded existing chain from disk"
            );
            (chain, pending)
        };
        Ok(Self {
            chain,
            pending,
            difficulty: DIFFICULTY,
            mining_reward: MINING_REWARD,
            storage: Some(storage),
        })
    }

    pub fn tip(&self) -> &Block {
        // The chain is never empty: every constructor installs genesis.
        self.chain.last().expect("chain has a genesis block")
    }

    // Validates a locally submitted transaction and adds it to the
    // pending pool. Reward injections (no sender) skip the balance
    // check; everything else must be signed and covered.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if tx.receiver.is_empty() {
            return Err(ChainError::MissingReceiver);
        }
        if let Some(sender) = &tx.sender {
            if !tx.is_valid() {
                return Err(ChainError::InvalidTransaction(
                    "bad signature or amount".to_string(),
                ));
            }
            let balance = self.balance(sender);
            if balance < tx.amount as i64 {
                return Err(ChainError::InsufficientBalance {
                    balance,
                    amount: tx.amount,
                });
            }
        }
        if let Some(storage) = &self.storage {
            storage.save_pending_transaction(&tx)?;
        }
        self.pending.push(tx);
        Ok(())
    }

    // A transaction arriving over gossip: dedup by fingerprint, then
    // validate. Returns true when it was new and accepted (the caller
    // re-broadcasts in that case).
    pub fn add_received_transaction(&mut self, tx: Transaction) -> Result<bool, ChainError> {
        if self
            .pending
            .iter()
            .any(|known| known.fingerprint() == tx.fingerprint())
        {
            return Ok(false);
        }
        if !tx.is_valid() {
            return Err(ChainError::InvalidTransaction(
                "bad signature or amount".to_string(),
            ));
        }
        if let Some(storage) = &self.storage {
            storage.save_pending_transaction(&tx)?;
        }
        self.pending.push(tx);
        Ok(true)
    }

    // Drains the pending pool into a new block, mines it and appends it
    // to the chain. The miner's reward rides along as the final pending
    // transaction.
    pub fn mine_pending(&mut self, miner: &str) -> Result<Block, ChainError> {
        self.pending
            .push(Transaction::reward(miner.to_string(), self.mining_reward));
        let tip = self.tip();
        let mut block = Block::new(tip.index + 1, self.pending.clone(), tip.hash.clone());
        block.mine(self.difficulty);
        info!(
            index = block.index,
            nonce = block.nonce,
            transactions = block.transactions.len(),
            "mined new block"
        );
        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
            storage.clear_pending()?;
        }
        self.chain.push(block.clone());
        self.pending.clear();
        Ok(block)
    }

    // Derives an account balance by scanning the whole chain. Negative
    // results indicate a validation bug upstream; callers treat them as
    // such.
    pub fn balance(&self, address: &str) -> i64 {
        let mut balance: i64 = 0;
        for block in &self.chain {
            for tx in &block.transactions {
                if tx.receiver == address {
                    balance += tx.amount as i64;
                }
                if tx.sender.as_deref() == Some(address) {
                    balance -= tx.amount as i64;
                }
            }
        }
        balance
    }

    // Every confirmed transaction the address took part in, tagged with
    // its block index.
    pub fn get_transactions_for(&self, address: &str) -> Vec<TransactionRecord> {
        let mut records = Vec::new();
        for block in &self.chain {
            for tx in &block.transactions {
                if tx.receiver == address || tx.sender.as_deref() == Some(address) {
                    records.push(TransactionRecord {
                        transaction: tx.clone(),
                        block_index: block.index,
                    });
                }
            }
        }
        records
    }

    // Looks a transaction up by its 16-hex id: confirmed (via the store
    // index when available, otherwise a chain scan), pending, or
    // unknown.
    pub fn get_transaction_status(&self, txid: &str) -> TxStatus {
        if let Some(storage) = &self.storage {
            if let Ok(Some(location)) = storage.transaction_location(txid) {
                return TxStatus::Confirmed {
                    block_hash: location.block_hash,
                    block_index: location.block_index,
                };
            }
        } else {
            for block in &self.chain {
                if block.transactions.iter().any(|tx| tx.txid() == txid) {
                    return TxStatus::Confirmed {
                        block_hash: block.hash.clone(),
                        block_index: block.index,
                    };
                }
            }
        }
        if self.pending.iter().any(|tx| tx.txid() == txid) {
            return TxStatus::Pending;
        }
        TxStatus::Unknown
    }

    // Integrity check over the in-memory chain. Genesis is taken as
    // given and not re-hashed (historical behavior, kept as-is).
    pub fn is_chain_valid(&self) -> bool {
        for i in 1..self.chain.len() {
            let block = &self.chain[i];
            let previous = &self.chain[i - 1];
            if !block.hash_is_consistent() {
                return false;
            }
            if block.previous_hash != previous.hash {
                return false;
            }
            if !block.has_valid_transactions() {
                return false;
            }
        }
        true
    }

    // The reception path for a single block gossiped by a peer. Accepts
    // only a block that extends the current tip; on accept, any pending
    // transactions it confirmed are dropped from the pool.
    pub fn add_block(&mut self, block: Block) -> Result<(), ChainError> {
        let tip = self.tip();
        if block.previous_hash != tip.hash || block.index != tip.index + 1 {
            return Err(ChainError::BlockLinkMismatch);
        }
        if !block.hash_is_consistent() {
            return Err(ChainError::BlockHashMismatch);
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::BlockDifficultyUnmet);
        }
        let confirmed: Vec<String> = self
            .pending
            .iter()
            .filter(|pending| {
                block
                    .transactions
                    .iter()
                    .any(|tx| tx.fingerprint() == pending.fingerprint())
            })
            .map(Transaction::txid)
            .collect();
        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
            for txid in &confirmed {
                storage.remove_pending_transaction(txid)?;
            }
        }
        self.pending.retain(|pending| {
            !block
                .transactions
                .iter()
                .any(|tx| tx.fingerprint() == pending.fingerprint())
        });
        info!(index = block.index, hash = %block.hash, "accepted block from peer");
        self.chain.push(block);
        Ok(())
    }

    // Longest-chain consensus: a strictly longer candidate that passes
    // whole-chain validation replaces ours wholesale, store included.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        if candidate.len() <= self.chain.len() {
            return Err(ChainError::ChainInvalid(
                "candidate is not longer than the current chain".to_string(),
            ));
        }
        Self::validate_chain(&candidate, self.difficulty)?;
        if let Some(storage) = &self.storage {
            storage.replace_chain(&candidate)?;
        }
        info!(
            old_length = self.chain.len(),
            new_length = candidate.len(),
            "replaced chain with longer candidate"
        );
        self.chain = candidate;
        Ok(())
    }

    // Whole-chain validation used by `replace_chain`: hash integrity,
    // linkage and the proof-of-work target for every block past
    // genesis. Transaction signatures are not re-verified here, which
    // mirrors the reference behavior.
    pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainError> {
        if chain.is_empty() {
            return Err(ChainError::ChainInvalid("empty chain".to_string()));
        }
        for i in 1..chain.len() {
            let block = &chain[i];
            let previous = &chain[i - 1];
            if !block.hash_is_consistent() {
                warn!(index = block.index, "candidate block fails hash check");
                return Err(ChainError::ChainInvalid(format!(
                    "block {} hash mismatch",
                    block.index
                )));
            }
            if block.previous_hash != previous.hash || block.index != previous.index + 1 {
                return Err(ChainError::ChainInvalid(format!(
                    "block {} does not link to its predecessor",
                    block.index
                )));
            }
            if !block.meets_difficulty(difficulty) {
                return Err(ChainError::ChainInvalid(format!(
                    "block {} misses the difficulty target",
                    block.index
                )));
            }
        }
        Ok(())
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    // Low difficulty keeps unit-level mining fast; the integration
    // suite exercises the default.
    fn test_chain() -> Blockchain {
        let mut chain = Blockchain::new();
        chain.difficulty = 2;
        chain
    }

    fn signed_transfer(from: &KeyPair, to: &KeyPair, amount: u64) -> Transaction {
        let mut tx = Transaction::new(Some(from.public_key_hex()), to.public_key_hex(), amount);
        tx.sign(&from.secret_key_hex()).unwrap();
        tx
    }

    #[test]
    fn starts_with_genesis() {
        let chain = test_chain();
        assert_eq!(chain.chain.len(), 1);
        assert_eq!(chain.tip().index, 0);
        assert!(chain.is_chain_valid());
    }

    #[test]
    fn mining_pays_the_miner() {
        let mut chain = test_chain();
        let miner = KeyPair::new();
        chain.mine_pending(&miner.public_key_hex()).unwrap();
        assert_eq!(chain.chain.len(), 2);
        assert_eq!(chain.balance(&miner.public_key_hex()), 50);
        assert!(chain.pending.is_empty());
        assert!(chain.is_chain_valid());
    }

    #[test]
    fn transfer_moves_balance() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        chain
            .add_transaction(signed_transfer(&alice, &bob, 25))
            .unwrap();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        // 50 from the first block, 50 from the second, minus the 25 sent.
        assert_eq!(chain.balance(&alice.public_key_hex()), 75);
        assert_eq!(chain.balance(&bob.public_key_hex()), 25);
    }

    #[test]
    fn rejects_missing_receiver() {
        let mut chain = test_chain();
        let tx = Transaction::new(None, String::new(), 10);
        assert_eq!(chain.add_transaction(tx), Err(ChainError::MissingReceiver));
    }

    #[test]
    fn rejects_bad_signature_and_leaves_pending_untouched() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        let mallory = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        let mut tx = Transaction::new(Some(alice.public_key_hex()), bob.public_key_hex(), 10);
        tx.sign(&mallory.secret_key_hex()).unwrap();
        assert!(matches!(
            chain.add_transaction(tx),
            Err(ChainError::InvalidTransaction(_))
        ));
        assert!(chain.pending.is_empty());
    }

    #[test]
    fn rejects_overspending() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        let result = chain.add_transaction(signed_transfer(&alice, &bob, 51));
        assert_eq!(
            result,
            Err(ChainError::InsufficientBalance {
                balance: 50,
                amount: 51
            })
        );
    }

    #[test]
    fn received_transactions_deduplicate_by_fingerprint() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        let tx = signed_transfer(&alice, &bob, 5);
        assert!(chain.add_received_transaction(tx.clone()).unwrap());
        assert!(!chain.add_received_transaction(tx).unwrap());
        assert_eq!(chain.pending.len(), 1);
    }

    #[test]
    fn accepts_a_block_extending_the_tip() {
        let mut chain = test_chain();
        let tip = chain.tip().clone();
        let mut block = Block::new(
            tip.index + 1,
            vec![Transaction::reward("peer-miner".to_string(), 50)],
            tip.hash,
        );
        block.mine(chain.difficulty);
        chain.add_block(block).unwrap();
        assert_eq!(chain.chain.len(), 2);
    }

    #[test]
    fn accepted_block_clears_matching_pending_entries() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();
        let tx = signed_transfer(&alice, &bob, 5);
        chain.add_transaction(tx.clone()).unwrap();

        // A peer mines the same transaction into a block first.
        let tip = chain.tip().clone();
        let mut block = Block::new(tip.index + 1, vec![tx], tip.hash);
        block.mine(chain.difficulty);
        chain.add_block(block).unwrap();
        assert!(chain.pending.is_empty());
    }

    #[test]
    fn rejects_block_that_does_not_link() {
        let mut chain = test_chain();
        let mut block = Block::new(
            1,
            vec![Transaction::reward("m".to_string(), 50)],
            "f".repeat(64),
        );
        block.mine(chain.difficulty);
        assert_eq!(chain.add_block(block), Err(ChainError::BlockLinkMismatch));
    }

    #[test]
    fn rejects_block_with_tampered_hash() {
        let mut chain = test_chain();
        let tip = chain.tip().clone();
        let mut block = Block::new(
            tip.index + 1,
            vec![Transaction::reward("m".to_string(), 50)],
            tip.hash,
        );
        block.mine(chain.difficulty);
        block.transactions[0].amount = 5000;
        assert_eq!(chain.add_block(block), Err(ChainError::BlockHashMismatch));
    }

    #[test]
    fn rejects_unmined_block() {
        let mut chain = test_chain();
        let tip = chain.tip().clone();
        let mut block = Block::new(
            tip.index + 1,
            vec![Transaction::reward("m".to_string(), 50)],
            tip.hash,
        );
        // Nudge the nonce until the hash misses the target, without
        // breaking internal consistency.
        loop {
            block.hash = block.compute_hash();
            if !block.meets_difficulty(chain.difficulty) {
                break;
            }
            block.nonce += 1;
        }
        assert_eq!(
            chain.add_block(block),
            Err(ChainError::BlockDifficultyUnmet)
        );
    }

    #[test]
    fn replace_chain_adopts_a_longer_fork() {
        let mut ours = test_chain();
        let mut theirs = Blockchain::new();
        theirs.difficulty = 2;
        theirs.chain = ours.chain.clone();
        theirs.mine_pending("peer-miner").unwrap();
        theirs.mine_pending("peer-miner").unwrap();

        ours.mine_pending("our-miner").unwrap();
        assert_eq!(ours.chain.len(), 2);
        ours.replace_chain(theirs.chain.clone()).unwrap();
        assert_eq!(ours.chain.len(), 3);
        assert!(ours.is_chain_valid());
    }

    #[test]
    fn replace_chain_rejects_equal_or_shorter() {
        let mut chain = test_chain();
        chain.mine_pending("miner").unwrap();
        let same = chain.chain.clone();
        assert!(chain.replace_chain(same).is_err());
        assert!(chain.replace_chain(Vec::new()).is_err());
        // Rejection leaves the chain untouched.
        assert_eq!(chain.chain.len(), 2);
    }

    #[test]
    fn replace_chain_rejects_a_broken_candidate() {
        let mut chain = test_chain();
        let mut candidate = chain.chain.clone();
        let tip = candidate.last().unwrap().clone();
        let mut good = Block::new(
            tip.index + 1,
            vec![Transaction::reward("m".to_string(), 50)],
            tip.hash,
        );
        good.mine(chain.difficulty);
        let mut bad = good.clone();
        bad.index += 1;
        candidate.push(good);
        candidate.push(bad);
        assert!(matches!(
            chain.replace_chain(candidate),
            Err(ChainError::ChainInvalid(_))
        ));
        assert_eq!(chain.chain.len(), 1);
    }

    #[test]
    fn transaction_status_tracks_lifecycle() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        let tx = signed_transfer(&alice, &bob, 5);
        let txid = tx.txid();
        assert_eq!(chain.get_transaction_status(&txid), TxStatus::Unknown);

        chain.add_transaction(tx).unwrap();
        assert_eq!(chain.get_transaction_status(&txid), TxStatus::Pending);

        chain.mine_pending(&alice.public_key_hex()).unwrap();
        let status = chain.get_transaction_status(&txid);
        assert!(matches!(status, TxStatus::Confirmed { block_index: 2, .. }));
    }

    #[test]
    fn history_tags_transactions_with_block_index() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();
        chain
            .add_transaction(signed_transfer(&alice, &bob, 25))
            .unwrap();
        chain.mine_pending(&alice.public_key_hex()).unwrap();

        let history = chain.get_transactions_for(&bob.public_key_hex());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].block_index, 2);
        assert_eq!(history[0].transaction.amount, 25);
    }

    #[test]
    fn total_supply_matches_reward_count() {
        let mut chain = test_chain();
        let alice = KeyPair::new();
        let bob = KeyPair::new();
        chain.mine_pending(&alice.public_key_hex()).unwrap();
        chain
            .add_transaction(signed_transfer(&alice, &bob, 10))
            .unwrap();
        chain.mine_pending(&bob.public_key_hex()).unwrap();

        let supply = chain.balance(&alice.public_key_hex()) + chain.balance(&bob.public_key_hex());
        let rewards: i64 = chain
            .chain
            .iter()
            .flat_map(|block| &block.transactions)
            .filter(|tx| tx.sender.is_none())
            .count() as i64;
        assert_eq!(supply, rewards * 50);
    }
}
