//! Address derivation, validation, and locking scripts
//!
//! The narrow per-chain address interface the pipeline builds on: derive
//! an address from the vault public key, validate a destination, and
//! resolve a destination to its locking script (UTXO chains). All pure.

use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, ScriptBuf, WPubkeyHash, WScriptHash};
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

use crate::error::{KeysignError, KeysignResult};
use crate::types::{Chain, ChainFamily};

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Convert raw address bytes to a checksummed (EIP-55) Ethereum address
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut result = String::from("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };

        if ch.is_ascii_digit() || nibble < 8 {
            result.push(ch);
        } else {
            result.push(ch.to_ascii_uppercase());
        }
    }

    result
}

/// Bitcoin-network mapping for the chains the `bitcoin` crate knows
fn bitcoin_network(chain: Chain) -> Option<Network> {
    match chain {
        Chain::Bitcoin => Some(Network::Bitcoin),
        Chain::BitcoinTestnet => Some(Network::Testnet),
        _ => None,
    }
}

/// Derive the on-chain address for a chain from its signing public key.
///
/// UTXO and EVM chains expect a 33-byte compressed secp256k1 key; Solana
/// expects a 32-byte ed25519 key.
pub fn derive_address(chain: Chain, public_key: &[u8]) -> KeysignResult<String> {
    match chain.family() {
        ChainFamily::Utxo => {
            let pk = bitcoin::CompressedPublicKey(
                secp256k1::PublicKey::from_slice(public_key)
                    .map_err(|e| KeysignError::InvalidPublicKey(e.to_string()))?,
            );
            match chain {
                Chain::Litecoin => encode_litecoin_p2wpkh(&pk.wpubkey_hash()),
                _ => {
                    let network = bitcoin_network(chain).ok_or_else(|| {
                        KeysignError::UnsupportedChain(format!("{:?}", chain))
                    })?;
                    Ok(Address::p2wpkh(&pk, network).to_string())
                }
            }
        }
        ChainFamily::Evm => {
            let pk = secp256k1::PublicKey::from_slice(public_key)
                .map_err(|e| KeysignError::InvalidPublicKey(e.to_string()))?;
            let uncompressed = pk.serialize_uncompressed();
            let hash = keccak256(&uncompressed[1..]);
            Ok(to_checksum_address(&hash[12..]))
        }
        ChainFamily::Solana => {
            if public_key.len() != 32 {
                return Err(KeysignError::InvalidPublicKey(format!(
                    "ed25519 public key must be 32 bytes, got {}",
                    public_key.len()
                )));
            }
            Ok(bs58::encode(public_key).into_string())
        }
    }
}

/// Check whether a destination parses as a valid address for the chain
pub fn is_valid_address(chain: Chain, address: &str) -> bool {
    match chain.family() {
        ChainFamily::Utxo => lock_script(chain, address).is_ok(),
        ChainFamily::Evm => is_valid_evm_address(address),
        ChainFamily::Solana => bs58::decode(address)
            .into_vec()
            .map(|b| b.len() == 32)
            .unwrap_or(false),
    }
}

/// Resolve a UTXO-chain destination address to its scriptPubKey
pub fn lock_script(chain: Chain, address: &str) -> KeysignResult<ScriptBuf> {
    match chain {
        Chain::Bitcoin | Chain::BitcoinTestnet => {
            let network = bitcoin_network(chain)
                .ok_or_else(|| KeysignError::UnsupportedChain(format!("{:?}", chain)))?;
            let addr = Address::from_str(address)
                .map_err(|e| KeysignError::InvalidDestinationAddress(format!("{}: {}", address, e)))?
                .require_network(network)
                .map_err(|e| {
                    KeysignError::InvalidDestinationAddress(format!("{}: {}", address, e))
                })?;
            Ok(addr.script_pubkey())
        }
        Chain::Litecoin => decode_litecoin_address(address),
        _ => Err(KeysignError::UnsupportedChain(format!(
            "{:?} is not a UTXO chain",
            chain
        ))),
    }
}

fn is_valid_evm_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    // Mixed case must carry a valid EIP-55 checksum; uniform case is accepted.
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        let bytes = match hex::decode(body) {
            Ok(b) => b,
            Err(_) => return false,
        };
        return to_checksum_address(&bytes) == address;
    }
    true
}

/// Decode a Litecoin bech32 address to its script pubkey
fn decode_litecoin_address(address: &str) -> KeysignResult<ScriptBuf> {
    use bech32::FromBase32;

    let address_lower = address.to_lowercase();

    if !address_lower.starts_with("ltc1") && !address_lower.starts_with("tltc1") {
        return Err(KeysignError::InvalidDestinationAddress(format!(
            "not a Litecoin bech32 address: {}",
            address
        )));
    }

    let (hrp, data, _variant) = bech32::decode(&address_lower)
        .map_err(|e| KeysignError::InvalidDestinationAddress(format!("{}: {}", address, e)))?;

    if hrp != "ltc" && hrp != "tltc" {
        return Err(KeysignError::InvalidDestinationAddress(format!(
            "invalid Litecoin HRP: {}",
            hrp
        )));
    }

    if data.is_empty() {
        return Err(KeysignError::InvalidDestinationAddress(
            "empty bech32 data".into(),
        ));
    }

    let version = data[0].to_u8();
    let program = Vec::<u8>::from_base32(&data[1..])
        .map_err(|e| KeysignError::InvalidDestinationAddress(format!("{}: {}", address, e)))?;

    if version == 0 && program.len() == 20 {
        let hash = WPubkeyHash::from_slice(&program)
            .map_err(|e| KeysignError::InvalidDestinationAddress(e.to_string()))?;
        Ok(ScriptBuf::new_p2wpkh(&hash))
    } else if version == 0 && program.len() == 32 {
        let hash = WScriptHash::from_slice(&program)
            .map_err(|e| KeysignError::InvalidDestinationAddress(e.to_string()))?;
        Ok(ScriptBuf::new_p2wsh(&hash))
    } else {
        Err(KeysignError::InvalidDestinationAddress(format!(
            "unsupported witness version {} or program length {}",
            version,
            program.len()
        )))
    }
}

/// Encode a P2WPKH key hash as a Litecoin mainnet bech32 address
fn encode_litecoin_p2wpkh(hash: &WPubkeyHash) -> KeysignResult<String> {
    use bech32::{ToBase32, Variant};

    let mut data = vec![bech32::u5::try_from_u8(0)
        .map_err(|e| KeysignError::EncodingFailure(e.to_string()))?];
    data.extend(hash.as_byte_array().to_base32());
    bech32::encode("ltc", data, Variant::Bech32)
        .map_err(|e| KeysignError::EncodingFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compressed secp256k1 generator point
    const SECP_PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_derive_bitcoin_address() {
        let pk = hex::decode(SECP_PUBKEY).unwrap();
        let addr = derive_address(Chain::Bitcoin, &pk).unwrap();
        assert!(addr.starts_with("bc1q"));
        assert!(is_valid_address(Chain::Bitcoin, &addr));
    }

    #[test]
    fn test_derive_litecoin_address() {
        let pk = hex::decode(SECP_PUBKEY).unwrap();
        let addr = derive_address(Chain::Litecoin, &pk).unwrap();
        assert!(addr.starts_with("ltc1q"));
        assert!(is_valid_address(Chain::Litecoin, &addr));
        // Same key hash as the Bitcoin address, different HRP
        let btc = derive_address(Chain::Bitcoin, &pk).unwrap();
        assert_eq!(
            lock_script(Chain::Litecoin, &addr).unwrap(),
            lock_script(Chain::Bitcoin, &btc).unwrap()
        );
    }

    #[test]
    fn test_derive_evm_address() {
        let pk = hex::decode(SECP_PUBKEY).unwrap();
        let addr = derive_address(Chain::Ethereum, &pk).unwrap();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
        assert!(is_valid_address(Chain::Ethereum, &addr));
    }

    #[test]
    fn test_derive_solana_address() {
        let pk = [7u8; 32];
        let addr = derive_address(Chain::Solana, &pk).unwrap();
        assert!(is_valid_address(Chain::Solana, &addr));
        assert!(!is_valid_address(Chain::Solana, "0xdeadbeef"));
    }

    #[test]
    fn test_checksum_address_known_vector() {
        let bytes = hex::decode("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            to_checksum_address(&bytes),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_evm_checksum_validation() {
        assert!(is_valid_evm_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(is_valid_evm_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        // One flipped-case character breaks the checksum
        assert!(!is_valid_evm_address("0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_valid_evm_address("0x5aaeb6"));
        assert!(!is_valid_evm_address("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
    }

    #[test]
    fn test_lock_script_rejects_wrong_network() {
        // Testnet address against mainnet
        assert!(lock_script(Chain::Bitcoin, "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx").is_err());
    }
}
