// src/p2p/discovery.rs

use crate::p2p::service::P2pService;
use tokio::time::{interval, sleep, Duration};
use tracing::debug;

// Give the listener a moment to come up before dialing out.
const SEED_CONNECT_DELAY: Duration = Duration::from_secs(1);
// How often the reconnect timer sweeps known-but-disconnected peers.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

// Bootstraps from the configured seed nodes, then keeps retrying every
// known peer that is not currently connected. URLs of dead peers are
// never forgotten; they just wait for the next sweep.
pub async fn run(service: P2pService, bootstrap_nodes: Vec<String>) {
    sleep(SEED_CONNECT_DELAY).await;
    for url in &bootstrap_nodes {
        service.connect_to_peer(url).await;
    }

    let mut timer = interval(RECONNECT_INTERVAL);
    loop {
        timer.tick().await;
        let pending = service.disconnected_known().await;
        if !pending.is_empty() {
            debug!(count = pending.len(), "reconnect sweep");
        }
        for url in pending {
            service.connect_to_peer(&url).await;
        }
    }
}
