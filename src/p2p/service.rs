// src/p2p/service.rs

use crate::core::block::Block;
use crate::core::chain::Blockchain;
use crate::core::transaction::Transaction;
use crate::error::{ChainError, P2pError};
use crate::p2p::message::{P2pMessage, PROTOCOL_VERSION};
use crate::p2p::peer::{self, PeerSender, PeerTable};
use crate::p2p::sync::ChainSynchronizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// The gossip service: one listener, one outbound connection per peer,
// line-framed JSON messages both ways. Holds the ledger behind its
// mutex and never touches it except through its public operations.
#[derive(Debug, Clone)]
pub struct P2pService {
    node_url: String,
    listen_addr: String,
    blockchain: Arc<Mutex<Blockchain>>,
    peers: Arc<Mutex<PeerTable>>,
}

impl P2pService {
    pub fn new(node_url: String, blockchain: Arc<Mutex<Blockchain>>) -> Self {
        let listen_addr = peer::gossip_addr(&node_url)
            .unwrap_or_else(|| panic!("node url {} has no usable port", node_url));
        Self {
            node_url,
            listen_addr,
            blockchain,
            peers: Arc::new(Mutex::new(PeerTable::new())),
        }
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    // Runs the listener and the discovery loop side by side. Never
    // returns in normal operation.
    pub async fn run(&self, bootstrap_nodes: Vec<String>) {
        tokio::join!(
            listen_for_peers(self.clone()),
            crate::p2p::discovery::run(self.clone(), bootstrap_nodes),
        );
    }

    // Dials a peer by its node URL (the gossip port is derived). Any
    // failure is silent; the URL is remembered and the reconnect timer
    // will try again.
    pub async fn connect_to_peer(&self, url: &str) {
        if let Err(e) = self.try_connect(url).await {
            debug!(peer = %url, error = %e, "connect attempt failed, will retry later");
        }
    }

    async fn try_connect(&self, url: &str) -> Result<(), P2pError> {
        if url == self.node_url {
            return Err(P2pError::SelfConnection);
        }
        self.peers.lock().await.add_known(url.to_string());
        if self.peers.lock().await.is_connected(url) {
            return Ok(());
        }
        let addr = peer::gossip_addr(url)
            .ok_or_else(|| P2pError::PeerUnreachable(format!("{} has no usable port", url)))?;
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(socket)) => {
                info!(peer = %url, "connected to peer");
                tokio::spawn(handle_connection(self.clone(), socket));
                Ok(())
            }
            Ok(Err(e)) => Err(P2pError::PeerUnreachable(e.to_string())),
            Err(_) => Err(P2pError::PeerUnreachable(format!(
                "timed out connecting to {}",
                addr
            ))),
        }
    }

    pub async fn broadcast_block(&self, block: &Block) {
        self.broadcast(&P2pMessage::NewBlock(block.clone())).await;
    }

    pub async fn broadcast_transaction(&self, tx: &Transaction) {
        self.broadcast(&P2pMessage::NewTx(tx.clone())).await;
    }

    // Asks every connected peer for its full chain; longer responses
    // replace ours as they come in.
    pub async fn sync_chain(&self) {
        self.broadcast(&P2pMessage::GetChain).await;
    }

    pub async fn get_peers(&self) -> Vec<String> {
        self.peers.lock().await.connected_urls()
    }

    pub async fn known_peers(&self) -> Vec<String> {
        self.peers.lock().await.known_urls()
    }

    pub(crate) async fn disconnected_known(&self) -> Vec<String> {
        self.peers.lock().await.disconnected_known()
    }

    // Serializes once, then fans the frame out to every live peer.
    async fn broadcast(&self, msg: &P2pMessage) {
        match serde_json::to_string(msg) {
            Ok(frame) => self.peers.lock().await.broadcast(&frame),
            Err(e) => warn!(error = %e, "failed to serialize broadcast"),
        }
    }

    async fn handshake_message(&self) -> P2pMessage {
        let chain_length = self.blockchain.lock().await.chain.len() as u64;
        P2pMessage::Handshake {
            node_url: self.node_url.clone(),
            chain_length,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

fn send_message(outbound: &PeerSender, msg: &P2pMessage) {
    if let Ok(frame) = serde_json::to_string(msg) {
        // A closed queue means the connection is going down; the read
        // loop will notice on its own.
        let _ = outbound.send(frame);
    }
}

async fn listen_for_peers(service: P2pService) {
    let listener = TcpListener::bind(&service.listen_addr)
        .await
        .expect("failed to bind gossip listener");
    info!(address = %service.listen_addr, "gossip service listening");
    loop {
        if let Ok((socket, addr)) = listener.accept().await {
            debug!(%addr, "inbound peer connection");
            tokio::spawn(handle_connection(service.clone(), socket));
        }
    }
}

// One task per connection, either direction. Sends our handshake
// first, then processes the peer's frames until the socket closes.
pub(crate) async fn handle_connection(service: P2pService, socket: TcpStream) {
    let (reader, mut writer) = socket.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if writer.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    send_message(&outbound, &service.handshake_message().await);

    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();
    // Set once the peer's handshake tells us who they are.
    let mut peer_url: Option<String> = None;

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                match serde_json::from_str::<P2pMessage>(frame) {
                    Ok(msg) => {
                        if !handle_message(&service, msg, &outbound, &mut peer_url).await {
                            break;
                        }
                    }
                    Err(e) => {
                        // Unknown message types land here too; they are
                        // ignored without dropping the connection.
                        let err = P2pError::MalformedMessage(e.to_string());
                        debug!(error = %err, "ignoring unreadable frame");
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        }
    }

    if let Some(url) = peer_url {
        service.peers.lock().await.remove(&url);
        info!(peer = %url, "peer disconnected");
    }
    writer_task.abort();
}

// Returns false when the connection should close.
async fn handle_message(
    service: &P2pService,
    msg: P2pMessage,
    outbound: &PeerSender,
    peer_url: &mut Option<String>,
) -> bool {
    match msg {
        P2pMessage::Handshake {
            node_url,
            chain_length,
            version,
        } => {
            if node_url == service.node_url {
                debug!("rejecting connection to ourselves");
                return false;
            }
            debug!(peer = %node_url, %version, chain_length, "handshake received");
            service
                .peers
                .lock()
                .await
                .insert(node_url.clone(), outbound.clone());
            *peer_url = Some(node_url);
            let ours = service.blockchain.lock().await.chain.len() as u64;
            if chain_length > ours {
                send_message(outbound, &P2pMessage::GetChain);
            }
            send_message(outbound, &P2pMessage::GetPeers);
            true
        }
        P2pMessage::GetChain => {
            let blocks = ChainSynchronizer::chain_snapshot(&service.blockchain).await;
            send_message(outbound, &P2pMessage::Chain(blocks));
            true
        }
        P2pMessage::Chain(blocks) => {
            ChainSynchronizer::handle_chain_response(&service.blockchain, blocks).await;
            true
        }
        P2pMessage::NewBlock(block) => {
            handle_new_block(service, block, outbound).await;
            true
        }
        P2pMessage::NewTx(tx) => {
            let accepted = {
                let mut chain = service.blockchain.lock().await;
                chain.add_received_transaction(tx.clone())
            };
            match accepted {
                Ok(true) => {
                    debug!(txid = %tx.txid(), "accepted gossiped transaction");
                    service.broadcast_transaction(&tx).await;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "rejected gossiped transaction"),
            }
            true
        }
        P2pMessage::GetPeers => {
            let known = service.peers.lock().await.known_urls();
            send_message(outbound, &P2pMessage::Peers(known));
            true
        }
        P2pMessage::Peers(urls) => {
            {
                let mut table = service.peers.lock().await;
                for url in urls {
                    if url != service.node_url {
                        table.add_known(url);
                    }
                }
            }
            // Reconnection runs immediately when new peers show up.
            for url in service.disconnected_known().await {
                service.connect_to_peer(&url).await;
            }
            true
        }
    }
}

// A freshly announced block either extends our tip, is old news, or
// implies a chain we have not seen; the last case turns into a chain
// request back to the announcing peer.
async fn handle_new_block(service: &P2pService, block: Block, outbound: &PeerSender) {
    enum Action {
        Rebroadcast(Block),
        RequestChain,
        Nothing,
    }

    let action = {
        let mut chain = service.blockchain.lock().await;
        let tip = chain.tip();
        if block.index <= tip.index {
            // Already have it (or something at that height); idempotent
            // drop.
            Action::Nothing
        } else if block.index == tip.index + 1 {
            match chain.add_block(block.clone()) {
                Ok(()) => Action::Rebroadcast(block),
                Err(ChainError::BlockLinkMismatch) => {
                    // Same height but a different parent: the peer is on
                    // a fork that is now longer than ours.
                    Action::RequestChain
                }
                Err(e) => {
                    warn!(error = %e, index = block.index, "rejected gossiped block");
                    Action::Nothing
                }
            }
        } else {
            // The peer is more than one block ahead.
            Action::RequestChain
        }
    };

    match action {
        Action::Rebroadcast(block) => service.broadcast_block(&block).await,
        Action::RequestChain => send_message(outbound, &P2pMessage::GetChain),
        Action::Nothing => {}
    }
}
