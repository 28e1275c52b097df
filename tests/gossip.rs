// tests/gossip.rs
//
// Two real nodes over TCP on ephemeral ports: handshake, transaction
// gossip, block gossip and the longer-chain pull.

use osmium::core::chain::Blockchain;
use osmium::core::transaction::Transaction;
use osmium::p2p::service::P2pService;
use std::net::TcpListener;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

// Picks a free gossip port and returns the node URL whose derived
// gossip address maps onto it.
fn free_node_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let gossip_port = listener.local_addr().unwrap().port();
    assert!(gossip_port > 1000);
    format!("http://127.0.0.1:{}", gossip_port - 1000)
}

// A ledger with test-grade difficulty so mining stays instant.
fn fast_chain() -> Arc<Mutex<Blockchain>> {
    let mut chain = Blockchain::new();
    chain.difficulty = 1;
    Arc::new(Mutex::new(chain))
}

struct TestNode {
    url: String,
    chain: Arc<Mutex<Blockchain>>,
    service: P2pService,
}

// Brings up a listening node; discovery is not started, tests dial
// explicitly.
async fn start_node(chain: Arc<Mutex<Blockchain>>) -> TestNode {
    let url = free_node_url();
    let service = P2pService::new(url.clone(), Arc::clone(&chain));
    let listener = service.clone();
    tokio::spawn(async move { listener.run(Vec::new()).await });
    sleep(Duration::from_millis(200)).await;
    TestNode {
        url,
        chain,
        service,
    }
}

async fn connected_pair() -> (TestNode, TestNode) {
    let a = start_node(fast_chain()).await;
    // Both nodes share genesis so gossiped blocks link up.
    let genesis_chain = {
        let mut chain = Blockchain::new();
        chain.difficulty = 1;
        chain.chain = a.chain.lock().await.chain.clone();
        Arc::new(Mutex::new(chain))
    };
    let b = start_node(genesis_chain).await;

    b.service.connect_to_peer(&a.url).await;
    sleep(Duration::from_millis(500)).await;
    (a, b)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handshake_registers_both_sides() {
    let (a, b) = connected_pair().await;
    assert_eq!(a.service.get_peers().await, vec![b.url.clone()]);
    assert_eq!(b.service.get_peers().await, vec![a.url.clone()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connecting_to_ourselves_is_a_no_op() {
    let a = start_node(fast_chain()).await;
    a.service.connect_to_peer(&a.url).await;
    sleep(Duration::from_millis(300)).await;
    assert!(a.service.get_peers().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_transaction_lands_in_the_peer_pool() {
    let (a, b) = connected_pair().await;

    let tx = Transaction::reward("miner".to_string(), 50);
    {
        let mut chain = b.chain.lock().await;
        chain.add_received_transaction(tx.clone()).unwrap();
    }
    b.service.broadcast_transaction(&tx).await;
    sleep(Duration::from_millis(500)).await;

    let pool = a.chain.lock().await;
    assert!(pool
        .pending
        .iter()
        .any(|pending| pending.fingerprint() == tx.fingerprint()));
    // The echo back to B deduplicates instead of looping forever.
    assert_eq!(b.chain.lock().await.pending.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_block_extends_the_peer_chain() {
    let (a, b) = connected_pair().await;

    let block = {
        let mut chain = b.chain.lock().await;
        chain.mine_pending("miner-b").unwrap()
    };
    b.service.broadcast_block(&block).await;
    sleep(Duration::from_millis(500)).await;

    let chain = a.chain.lock().await;
    assert_eq!(chain.chain.len(), 2);
    assert_eq!(chain.tip().hash, block.hash);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_block_far_ahead_triggers_a_full_sync() {
    let (a, b) = connected_pair().await;

    // B races ahead by three blocks while A hears nothing.
    let tip = {
        let mut chain = b.chain.lock().await;
        chain.mine_pending("miner-b").unwrap();
        chain.mine_pending("miner-b").unwrap();
        chain.mine_pending("miner-b").unwrap()
    };
    b.service.broadcast_block(&tip).await;
    // NEW_BLOCK -> GET_CHAIN -> CHAIN takes a few hops.
    sleep(Duration::from_millis(800)).await;

    let chain = a.chain.lock().await;
    assert_eq!(chain.chain.len(), 4);
    assert_eq!(chain.tip().hash, tip.hash);
    assert!(chain.is_chain_valid());
}
