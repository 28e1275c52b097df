// src/core/transaction.rs

use crate::crypto;
use crate::error::ChainError;
use crate::utils::now_ms;
use serde::{Deserialize, Serialize};

// A single value transfer. A mining reward is a transaction with no
// sender and no signature; everything else must carry a signature that
// verifies under the sender's public key.
//
// Field declaration order is the canonical wire order: serializing with
// serde_json yields the byte-for-byte encoding that block hashing and
// the store rely on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Option<String>,
    pub receiver: String,
    pub amount: u64,
    pub timestamp: u64,
    pub signature: Option<String>,
}

impl Transaction {
    // Creates an unsigned transaction stamped with the current time.
    pub fn new(sender: Option<String>, receiver: String, amount: u64) -> Self {
        Self {
            sender,
            receiver,
            amount,
            timestamp: now_ms(),
            signature: None,
        }
    }

    // Creates a mining reward: no sender, no signature.
    pub fn reward(receiver: String, amount: u64) -> Self {
        Self::new(None, receiver, amount)
    }

    // SHA-256 over the concatenation of the identity fields. The sender
    // contributes the empty string when absent.
    pub fn hash(&self) -> String {
        let sender = self.sender.as_deref().unwrap_or("");
        let preimage = format!("{}{}{}{}", sender, self.receiver, self.amount, self.timestamp);
        crypto::sha256_hex(preimage.as_bytes())
    }

    // The short transaction id used for store keys and pending-pool
    // bookkeeping: the first 16 hex chars of the hash.
    pub fn txid(&self) -> String {
        self.hash()[..16].to_string()
    }

    // The dedup identity: two transactions with the same fingerprint are
    // the same transaction regardless of signature bytes.
    pub fn fingerprint(&self) -> (Option<&str>, &str, u64, u64) {
        (
            self.sender.as_deref(),
            self.receiver.as_str(),
            self.amount,
            self.timestamp,
        )
    }

    // Signs the transaction hash with the sender's secret key. Rewards
    // have no sender and cannot be signed.
    pub fn sign(&mut self, secret_hex: &str) -> Result<(), ChainError> {
        if self.sender.is_none() {
            return Err(ChainError::CannotSignReward);
        }
        match crypto::sign(secret_hex, &self.hash()) {
            Some(signature) => {
                self.signature = Some(signature);
                Ok(())
            }
            None => Err(ChainError::InvalidTransaction(
                "malformed secret key".to_string(),
            )),
        }
    }

    // A reward is always valid. Anything else needs a positive amount
    // and a signature that verifies under the sender's key.
    pub fn is_valid(&self) -> bool {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return true,
        };
        if self.amount == 0 {
            return false;
        }
        match &self.signature {
            Some(signature) if !signature.is_empty() => {
                crypto::verify(sender, &self.hash(), signature)
            }
            _ => false,
        }
    }
}
