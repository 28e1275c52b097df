// src/crypto/hash.rs

use sha2::{Digest, Sha256};

// Calculates the SHA-256 hash of a byte slice and returns it as a
// lowercase hexadecimal string. Every digest in the system (block
// hashes, transaction hashes, contract addresses) goes through here.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
