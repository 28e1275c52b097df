// src/p2p/message.rs

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0.0";

// The gossip message set. On the wire each message is one line of
// JSON shaped as {"type": "...", "data": ...}; unknown types coming
// from peers are logged and ignored by the service loop.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "data")]
pub enum P2pMessage {
    // First message on any new connection, in both directions.
    #[serde(rename = "HANDSHAKE")]
    Handshake {
        node_url: String,
        chain_length: u64,
        version: String,
    },
    #[serde(rename = "GET_CHAIN")]
    GetChain,
    // Full chain, in block order. Response to GET_CHAIN or pushed.
    #[serde(rename = "CHAIN")]
    Chain(Vec<Block>),
    #[serde(rename = "NEW_BLOCK")]
    NewBlock(Block),
    #[serde(rename = "NEW_TX")]
    NewTx(Transaction),
    #[serde(rename = "GET_PEERS")]
    GetPeers,
    #[serde(rename = "PEERS")]
    Peers(Vec<String>),
}
