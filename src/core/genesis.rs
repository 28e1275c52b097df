// src/core/genesis.rs

use crate::core::block::Block;

// Builds the genesis block: index 0, no transactions, previous hash
// "0", timestamped at creation. Genesis is not mined; its hash is the
// plain digest of its contents and is exempt from the difficulty check.
pub fn create_genesis_block() -> Block {
    Block::new(0, Vec::new(), "0".to_string())
}
