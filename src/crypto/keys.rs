// src/crypto/keys.rs

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

// A secp256k1 key pair. The hex-encoded uncompressed public key doubles
// as the account address everywhere in the system.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    // Generates a new random key pair.
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    // Rebuilds a key pair from a hex-encoded secret key, e.g. one read
    // back from a wallet file. Returns None on malformed input.
    pub fn from_secret_hex(secret_hex: &str) -> Option<Self> {
        let bytes = hex::decode(secret_hex).ok()?;
        let secret_key = SecretKey::from_slice(&bytes).ok()?;
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Some(Self {
            secret_key,
            public_key,
        })
    }

    // The account address: the full uncompressed public key in hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        Self::new()
    }
}

// Signs a 32-byte hex digest with a hex-encoded secret key and returns
// the DER signature in hex. Returns None when the key or digest is
// malformed.
pub fn sign(secret_hex: &str, digest_hex: &str) -> Option<String> {
    let secret_bytes = hex::decode(secret_hex).ok()?;
    let secret_key = SecretKey::from_slice(&secret_bytes).ok()?;
    let digest = hex::decode(digest_hex).ok()?;
    let message = Message::from_digest_slice(&digest).ok()?;
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa(&message, &secret_key);
    Some(hex::encode(signature.serialize_der()))
}

// Verifies a DER-hex signature over a 32-byte hex digest under a
// hex-encoded uncompressed public key. Malformed input of any kind is
// a verification failure, never an error.
pub fn verify(public_hex: &str, digest_hex: &str, signature_hex: &str) -> bool {
    let public_bytes = match hex::decode(public_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let public_key = match PublicKey::from_slice(&public_bytes) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let digest = match hex::decode(digest_hex) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(&digest) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let signature = match hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| Signature::from_der(&bytes).ok())
    {
        Some(s) => s,
        None => return false,
    };
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}
