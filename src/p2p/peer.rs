// src/p2p/peer.rs

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::debug;

// Outbound frame queue of one live connection. The connection's writer
// task drains it onto the socket.
pub type PeerSender = mpsc::UnboundedSender<String>;

// Live connections keyed by the peer's self-reported node URL, plus
// every URL we have ever learned about. Dead connections leave the
// table but their URL stays in `known_peers` for the reconnect timer.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerSender>,
    known_peers: HashSet<String>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Records a connection after its handshake. Also remembers the URL
    // for reconnection.
    pub fn insert(&mut self, node_url: String, sender: PeerSender) {
        self.known_peers.insert(node_url.clone());
        self.peers.insert(node_url, sender);
    }

    pub fn remove(&mut self, node_url: &str) {
        self.peers.remove(node_url);
    }

    pub fn is_connected(&self, node_url: &str) -> bool {
        self.peers.contains_key(node_url)
    }

    pub fn connected_urls(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    // Returns true for URLs we had not heard of before.
    pub fn add_known(&mut self, node_url: String) -> bool {
        self.known_peers.insert(node_url)
    }

    pub fn known_urls(&self) -> Vec<String> {
        self.known_peers.iter().cloned().collect()
    }

    // Everything the reconnect timer should dial.
    pub fn disconnected_known(&self) -> Vec<String> {
        self.known_peers
            .iter()
            .filter(|url| !self.peers.contains_key(*url))
            .cloned()
            .collect()
    }

    // Sends one already-serialized frame to every live peer. A peer
    // whose queue is gone (writer task exited) is dropped on the spot.
    pub fn broadcast(&mut self, frame: &str) {
        self.peers.retain(|url, sender| {
            let alive = sender.send(frame.to_string()).is_ok();
            if !alive {
                debug!(peer = %url, "dropping dead peer from table");
            }
            alive
        });
    }

    pub fn send_to(&mut self, node_url: &str, frame: String) {
        if let Some(sender) = self.peers.get(node_url) {
            if sender.send(frame).is_err() {
                self.peers.remove(node_url);
            }
        }
    }
}

// Derives the gossip listen address from a node URL. The gossip port
// sits a fixed offset above the HTTP port, so seed lists only need the
// HTTP-facing URL.
pub const GOSSIP_PORT_OFFSET: u16 = 1000;

pub fn gossip_addr(node_url: &str) -> Option<String> {
    let without_scheme = node_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(node_url);
    let (host, port) = without_scheme.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(format!("{}:{}", host, port.checked_add(GOSSIP_PORT_OFFSET)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_addr_adds_the_port_offset() {
        assert_eq!(
            gossip_addr("http://127.0.0.1:3001"),
            Some("127.0.0.1:4001".to_string())
        );
        assert_eq!(gossip_addr("localhost:8000"), Some("localhost:9000".to_string()));
        assert_eq!(gossip_addr("http://nohost"), None);
        assert_eq!(gossip_addr("http://host:notaport"), None);
    }

    #[test]
    fn table_tracks_connected_and_known_separately() {
        let mut table = PeerTable::new();
        let (sender, _receiver) = mpsc::unbounded_channel();
        table.insert("http://a:1".to_string(), sender);
        table.add_known("http://b:2".to_string());

        assert!(table.is_connected("http://a:1"));
        assert!(!table.is_connected("http://b:2"));
        assert_eq!(table.disconnected_known(), vec!["http://b:2".to_string()]);

        table.remove("http://a:1");
        assert!(!table.is_connected("http://a:1"));
        // The URL survives for the reconnect timer.
        assert!(table.known_urls().contains(&"http://a:1".to_string()));
    }

    #[test]
    fn broadcast_prunes_dead_queues() {
        let mut table = PeerTable::new();
        let (alive, mut alive_rx) = mpsc::unbounded_channel();
        let (dead, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        table.insert("http://alive:1".to_string(), alive);
        table.insert("http://dead:2".to_string(), dead);

        table.broadcast("frame");
        assert!(table.is_connected("http://alive:1"));
        assert!(!table.is_connected("http://dead:2"));
        assert_eq!(alive_rx.try_recv().unwrap(), "frame");
    }
}
