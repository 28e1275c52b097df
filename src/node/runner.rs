// src/node/runner.rs

use crate::contracts::manager::{CallOutcome, ContractManager, DeployOutcome};
use crate::contracts::Contract;
use crate::core::block::Block;
use crate::core::chain::{Blockchain, TransactionRecord, TxStatus};
use crate::core::transaction::Transaction;
use crate::crypto::KeyPair;
use crate::error::{ChainError, ContractError};
use crate::node::config::Config;
use crate::p2p::service::P2pService;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

// The composed node: one ledger, one contract manager, one gossip
// service, all sharing one exclusive-open store. This is the surface
// an HTTP facade talks to.
pub struct Node {
    blockchain: Arc<Mutex<Blockchain>>,
    contracts: Arc<Mutex<ContractManager>>,
    p2p: P2pService,
    config: Config,
}

impl Node {
    // Opens the store and brings the ledger up from disk. A locked
    // database is fatal here: a second node is already running on it.
    pub fn new(config: Config) -> Result<Self, ChainError> {
        let storage = crate::storage::Storage::open(&config.db_path)?;
        let blockchain = Arc::new(Mutex::new(Blockchain::with_storage(storage.clone())?));
        let contracts = Arc::new(Mutex::new(ContractManager::with_storage(storage)));
        let p2p = P2pService::new(config.node_url(), Arc::clone(&blockchain));
        Ok(Self {
            blockchain,
            contracts,
            p2p,
            config,
        })
    }

    // An in-memory node for tests and throwaway runs.
    pub fn ephemeral(config: Config) -> Self {
        let blockchain = Arc::new(Mutex::new(Blockchain::new()));
        let contracts = Arc::new(Mutex::new(ContractManager::new()));
        let p2p = P2pService::new(config.node_url(), Arc::clone(&blockchain));
        Self {
            blockchain,
            contracts,
            p2p,
            config,
        }
    }

    // Runs the gossip service (listener + discovery). Never returns in
    // normal operation.
    pub async fn run(&self) {
        info!(node_url = %self.config.node_url(), "starting node");
        self.p2p.run(self.config.bootstrap_nodes.clone()).await;
    }

    pub fn create_wallet(&self) -> KeyPair {
        KeyPair::new()
    }

    // Validates, pools and gossips a locally submitted transaction.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        self.blockchain.lock().await.add_transaction(tx.clone())?;
        self.p2p.broadcast_transaction(&tx).await;
        Ok(())
    }

    // Mines the pending pool into a block and announces it.
    pub async fn mine(&self, miner: &str) -> Result<Block, ChainError> {
        let block = self.blockchain.lock().await.mine_pending(miner)?;
        self.p2p.broadcast_block(&block).await;
        Ok(block)
    }

    pub async fn balance(&self, address: &str) -> i64 {
        self.blockchain.lock().await.balance(address)
    }

    pub async fn transactions_for(&self, address: &str) -> Vec<TransactionRecord> {
        self.blockchain.lock().await.get_transactions_for(address)
    }

    pub async fn transaction_status(&self, txid: &str) -> TxStatus {
        self.blockchain.lock().await.get_transaction_status(txid)
    }

    pub async fn is_chain_valid(&self) -> bool {
        self.blockchain.lock().await.is_chain_valid()
    }

    pub async fn deploy_contract(
        &self,
        deployer: &str,
        bytecode: Vec<u8>,
        gas_limit: u64,
    ) -> Result<DeployOutcome, ContractError> {
        self.contracts.lock().await.deploy(deployer, bytecode, gas_limit)
    }

    pub async fn deploy_contract_source(
        &self,
        deployer: &str,
        source: &str,
        gas_limit: u64,
    ) -> Result<DeployOutcome, ContractError> {
        self.contracts
            .lock()
            .await
            .deploy_source(deployer, source, gas_limit)
    }

    pub async fn call_contract(
        &self,
        address: &str,
        caller: &str,
        value: u64,
        calldata: Vec<u8>,
        gas_limit: u64,
    ) -> Result<CallOutcome, ContractError> {
        self.contracts
            .lock()
            .await
            .call(address, caller, value, calldata, gas_limit)
    }

    pub async fn get_contract(&self, address: &str) -> Result<Option<Contract>, ContractError> {
        self.contracts.lock().await.get_contract(address)
    }

    pub async fn connect_to_peer(&self, url: &str) {
        self.p2p.connect_to_peer(url).await;
    }

    pub async fn peers(&self) -> Vec<String> {
        self.p2p.get_peers().await
    }

    pub async fn sync_chain(&self) {
        self.p2p.sync_chain().await;
    }

    pub fn blockchain(&self) -> &Arc<Mutex<Blockchain>> {
        &self.blockchain
    }

    pub fn p2p(&self) -> &P2pService {
        &self.p2p
    }
}
