// src/p2p/mod.rs

pub mod discovery;
pub mod message;
pub mod peer;
pub mod service;
pub mod sync;

pub use message::{P2pMessage, PROTOCOL_VERSION};
pub use peer::{gossip_addr, PeerTable, GOSSIP_PORT_OFFSET};
pub use service::P2pService;
pub use sync::ChainSynchronizer;
