// src/p2p/sync.rs

use crate::core::block::Block;
use crate::core::chain::Blockchain;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Applies a full chain received from a peer: longest valid chain wins.
pub struct ChainSynchronizer;

impl ChainSynchronizer {
    // Returns true when the local chain was replaced.
    pub async fn handle_chain_response(
        blockchain: &Arc<Mutex<Blockchain>>,
        blocks: Vec<Block>,
    ) -> bool {
        let mut chain = blockchain.lock().await;
        if blocks.len() <= chain.chain.len() {
            debug!(
                ours = chain.chain.len(),
                theirs = blocks.len(),
                "peer chain is not longer, ignoring"
            );
            return false;
        }
        info!(
            ours = chain.chain.len(),
            theirs = blocks.len(),
            "syncing to longer peer chain"
        );
        match chain.replace_chain(blocks) {
            Ok(()) => {
                info!(length = chain.chain.len(), "chain synchronized");
                true
            }
            Err(e) => {
                warn!(error = %e, "rejected peer chain");
                false
            }
        }
    }

    pub async fn chain_snapshot(blockchain: &Arc<Mutex<Blockchain>>) -> Vec<Block> {
        blockchain.lock().await.chain.clone()
    }
}
