//! Pre-image hashes
//!
//! The exact byte sequences the signing ceremony must sign. UTXO chains
//! produce one per spent input; account chains produce exactly one for the
//! whole transaction. Extraction is deterministic: the same payload always
//! yields the same hash set, which is what keeps co-signing devices in
//! agreement.

use serde::{Deserialize, Serialize};

/// Signing algorithm for a pre-image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// secp256k1 ECDSA (Bitcoin-family, EVM)
    Secp256k1Ecdsa,
    /// Ed25519 (Solana)
    Ed25519,
}

/// A byte sequence to be signed, with enough metadata to bind the
/// resulting signature back to its place in the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreImage {
    /// The bytes to sign: a 32-byte sighash for ECDSA chains, the full
    /// serialized message for Ed25519 chains
    #[serde(with = "crate::types::hex_bytes")]
    pub hash: Vec<u8>,

    /// Hex of the key material this pre-image is bound to: the input's
    /// locking-script public-key hash for UTXO inputs, the signing public
    /// key otherwise
    pub signer_key: String,

    /// For UTXO chains, which input this hash covers
    pub input_index: usize,

    pub algorithm: SigningAlgorithm,
}

impl PreImage {
    pub fn new(hash: Vec<u8>, signer_key: String, algorithm: SigningAlgorithm) -> Self {
        Self {
            hash,
            signer_key,
            input_index: 0,
            algorithm,
        }
    }

    pub fn with_input_index(mut self, index: usize) -> Self {
        self.input_index = index;
        self
    }

    /// Lowercase hex of the pre-image, the key the ceremony responds under
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_is_lowercase() {
        let pre = PreImage::new(vec![0xAB, 0xCD], "kh".into(), SigningAlgorithm::Secp256k1Ecdsa);
        assert_eq!(pre.hash_hex(), "abcd");
    }

    #[test]
    fn test_input_index_builder() {
        let pre = PreImage::new(vec![0u8; 32], "kh".into(), SigningAlgorithm::Secp256k1Ecdsa)
            .with_input_index(3);
        assert_eq!(pre.input_index, 3);
    }

    #[test]
    fn test_serde_round_trip() {
        let pre = PreImage::new(vec![1, 2, 3], "aabb".into(), SigningAlgorithm::Ed25519);
        let json = serde_json::to_string(&pre).unwrap();
        let back: PreImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pre);
    }
}
