// src/contracts/manager.rs

use crate::contracts::contract::Contract;
use crate::crypto;
use crate::error::{ContractError, VmError};
use crate::storage::db::Storage;
use crate::utils::now_ms;
use crate::vm::{self, ExecutionContext, U256};
use std::collections::HashMap;
use tracing::info;

// How a deploy went: the derived address and the constructor outcome.
// The contract exists (and persists) only when `success` is true.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub address: String,
    pub success: bool,
    pub gas_used: u64,
    pub error: Option<VmError>,
}

// How a call went. On failure the contract is untouched and only the
// gas accounting is reported.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Vec<u8>,
    pub logs: Vec<U256>,
    pub error: Option<VmError>,
}

// Owns the live contract table and drives the VM for deploys and
// calls. The store, when configured, holds the authoritative copies;
// the in-memory table is a cache filled on demand.
#[derive(Debug, Default)]
pub struct ContractManager {
    contracts: HashMap<String, Contract>,
    deploy_nonces: HashMap<String, u64>,
    storage: Option<Storage>,
}

impl ContractManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(storage: Storage) -> Self {
        Self {
            contracts: HashMap::new(),
            deploy_nonces: HashMap::new(),
            storage: Some(storage),
        }
    }

    // contract_{40 hex chars}: a hash over deployer, per-deployer
    // deploy counter and the current time.
    fn derive_address(deployer: &str, nonce: u64) -> String {
        let preimage = format!("{}{}{}", deployer, nonce, now_ms());
        format!("contract_{}", &crypto::sha256_hex(preimage.as_bytes())[..40])
    }

    // Compiles assembly source and deploys the result.
    pub fn deploy_source(
        &mut self,
        deployer: &str,
        source: &str,
        gas_limit: u64,
    ) -> Result<DeployOutcome, ContractError> {
        let bytecode = vm::assembler::compile(source)?;
        self.deploy(deployer, bytecode, gas_limit)
    }

    // Deploys raw bytecode: derives the address, runs the constructor
    // (the whole program, with empty calldata), and records the
    // contract only when that run succeeds.
    pub fn deploy(
        &mut self,
        deployer: &str,
        bytecode: Vec<u8>,
        gas_limit: u64,
    ) -> Result<DeployOutcome, ContractError> {
        let nonce = self.deploy_nonces.entry(deployer.to_string()).or_insert(0);
        let address = Self::derive_address(deployer, *nonce);
        *nonce += 1;

        let ctx = ExecutionContext {
            caller: deployer.to_string(),
            call_value: 0,
            calldata: Vec::new(),
        };
        let result = vm::execute_with_limit(&bytecode, &ctx, HashMap::new(), gas_limit);
        if !result.success {
            return Ok(DeployOutcome {
                address,
                success: false,
                gas_used: result.gas_used,
                error: result.error,
            });
        }

        let mut contract = Contract::new(address.clone(), bytecode, deployer.to_string());
        contract.set_storage_words(&result.storage);
        if let Some(storage) = &self.storage {
            storage.save_contract(&contract)?;
        }
        info!(%address, gas_used = result.gas_used, "deployed contract");
        self.contracts.insert(address.clone(), contract);
        Ok(DeployOutcome {
            address,
            success: true,
            gas_used: result.gas_used,
            error: None,
        })
    }

    // Executes a contract. State (storage and the value transfer) is
    // committed only on success; a reverted or trapped run reports its
    // gas and leaves the contract as it was.
    pub fn call(
        &mut self,
        address: &str,
        caller: &str,
        value: u64,
        calldata: Vec<u8>,
        gas_limit: u64,
    ) -> Result<CallOutcome, ContractError> {
        let contract = self.lookup(address)?;
        let ctx = ExecutionContext {
            caller: caller.to_string(),
            call_value: value,
            calldata,
        };
        let result = vm::execute_with_limit(&contract.bytecode, &ctx, contract.storage_words(), gas_limit);
        if result.success {
            let contract = self
                .contracts
                .get_mut(address)
                .expect("lookup caches the contract");
            contract.set_storage_words(&result.storage);
            contract.balance += value;
            if let Some(storage) = &self.storage {
                storage.save_contract(contract)?;
            }
        }
        Ok(CallOutcome {
            success: result.success,
            gas_used: result.gas_used,
            return_data: result.return_data,
            logs: result.logs,
            error: result.error,
        })
    }

    // The in-memory table first, then the store; a hit from the store
    // is cached.
    pub fn get_contract(&mut self, address: &str) -> Result<Option<Contract>, ContractError> {
        match self.lookup(address) {
            Ok(contract) => Ok(Some(contract.clone())),
            Err(ContractError::ContractNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn lookup(&mut self, address: &str) -> Result<&Contract, ContractError> {
        if !self.contracts.contains_key(address) {
            let loaded = match &self.storage {
                Some(storage) => storage.load_contract(address)?,
                None => None,
            };
            match loaded {
                Some(contract) => {
                    self.contracts.insert(address.to_string(), contract);
                }
                None => return Err(ContractError::ContractNotFound(address.to_string())),
            }
        }
        Ok(&self.contracts[address])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::DEFAULT_GAS_LIMIT;

    const STORAGE_DEMO: &str = "PUSH 7\nSTORE 1\nPUSH 1\nLOAD\nSTOP";

    #[test]
    fn deploy_runs_the_constructor_and_records_storage() {
        let mut manager = ContractManager::new();
        let outcome = manager
            .deploy_source("deployer", STORAGE_DEMO, DEFAULT_GAS_LIMIT)
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.address.starts_with("contract_"));
        assert_eq!(outcome.address.len(), "contract_".len() + 40);

        let contract = manager.get_contract(&outcome.address).unwrap().unwrap();
        assert_eq!(contract.storage.get("1"), Some(&"7".to_string()));
        assert_eq!(contract.creator, "deployer");
    }

    #[test]
    fn call_preserves_state_and_succeeds_on_the_demo() {
        let mut manager = ContractManager::new();
        let outcome = manager
            .deploy_source("deployer", STORAGE_DEMO, DEFAULT_GAS_LIMIT)
            .unwrap();
        let call = manager
            .call(&outcome.address, "caller", 0, Vec::new(), DEFAULT_GAS_LIMIT)
            .unwrap();
        assert!(call.success);
        let contract = manager.get_contract(&outcome.address).unwrap().unwrap();
        assert_eq!(contract.storage.get("1"), Some(&"7".to_string()));
    }

    #[test]
    fn failed_deploy_registers_nothing() {
        let mut manager = ContractManager::new();
        let outcome = manager
            .deploy_source("deployer", "PUSH 1\nREVERT", DEFAULT_GAS_LIMIT)
            .unwrap();
        assert!(!outcome.success);
        assert!(manager.get_contract(&outcome.address).unwrap().is_none());
    }

    #[test]
    fn failed_call_leaves_the_contract_untouched() {
        use crate::vm::opcode::*;
        // Constructor path (empty calldata) stops cleanly; a call with
        // data writes storage[1] = 9 and then reverts.
        let bytecode = vec![
            CALLDATASIZE, PUSH1, 5, JUMPI, STOP, JUMPDEST, PUSH1, 9, PUSH1, 1, SSTORE, PUSH1, 0,
            REVERT,
        ];
        let mut manager = ContractManager::new();
        let deployed = manager.deploy("deployer", bytecode, DEFAULT_GAS_LIMIT).unwrap();
        assert!(deployed.success);

        let call = manager
            .call(&deployed.address, "caller", 5, vec![0x01], DEFAULT_GAS_LIMIT)
            .unwrap();
        assert!(!call.success);
        assert!(call.gas_used > 0);

        // The reverted write and the value transfer are both discarded.
        let contract = manager.get_contract(&deployed.address).unwrap().unwrap();
        assert!(contract.storage.is_empty());
        assert_eq!(contract.balance, 0);
    }

    #[test]
    fn call_value_credits_the_contract_balance_on_success() {
        let mut manager = ContractManager::new();
        let outcome = manager
            .deploy_source("deployer", "STOP", DEFAULT_GAS_LIMIT)
            .unwrap();
        manager
            .call(&outcome.address, "caller", 12, Vec::new(), DEFAULT_GAS_LIMIT)
            .unwrap();
        let contract = manager.get_contract(&outcome.address).unwrap().unwrap();
        assert_eq!(contract.balance, 12);
    }

    #[test]
    fn deploy_addresses_are_unique_per_deployer() {
        let mut manager = ContractManager::new();
        let first = manager.deploy("d", vec![crate::vm::opcode::STOP], DEFAULT_GAS_LIMIT).unwrap();
        let second = manager.deploy("d", vec![crate::vm::opcode::STOP], DEFAULT_GAS_LIMIT).unwrap();
        assert_ne!(first.address, second.address);
    }

    #[test]
    fn calling_a_missing_contract_errors() {
        let mut manager = ContractManager::new();
        let result = manager.call("contract_missing", "c", 0, Vec::new(), DEFAULT_GAS_LIMIT);
        assert!(matches!(result, Err(ContractError::ContractNotFound(_))));
    }

    #[test]
    fn bad_source_fails_compilation() {
        let mut manager = ContractManager::new();
        let result = manager.deploy_source("d", "HCF", DEFAULT_GAS_LIMIT);
        assert!(matches!(result, Err(ContractError::Compile(_))));
    }
}
