//! Shared types for the keysign pipeline
//!
//! All data structures that cross module boundaries are defined here.
//! Everything is a value object: the pipeline holds no mutable state
//! between calls, and all amounts are raw integer units (satoshis, wei,
//! lamports) — never floating point.

use serde::{Deserialize, Serialize};

use crate::error::{KeysignError, KeysignResult};

// =============================================================================
// Chain Types
// =============================================================================

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    Litecoin,
    Ethereum,
    EthereumSepolia,
    Bnb,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Avalanche,
    Solana,
    SolanaDevnet,
}

/// Chain family, selected once at pipeline entry.
///
/// Every builder, hash extractor, and finalizer is keyed on this; a
/// mismatch between the coin and the chain parameters fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Utxo,
    Evm,
    Solana,
}

impl Chain {
    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet | Chain::Litecoin => ChainFamily::Utxo,
            Chain::Ethereum
            | Chain::EthereumSepolia
            | Chain::Bnb
            | Chain::Polygon
            | Chain::Arbitrum
            | Chain::Optimism
            | Chain::Base
            | Chain::Avalanche => ChainFamily::Evm,
            Chain::Solana | Chain::SolanaDevnet => ChainFamily::Solana,
        }
    }

    pub fn is_evm(&self) -> bool {
        self.family() == ChainFamily::Evm
    }

    pub fn is_utxo(&self) -> bool {
        self.family() == ChainFamily::Utxo
    }

    /// EVM network id, `None` for non-EVM chains
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::EthereumSepolia => Some(11155111),
            Chain::Bnb => Some(56),
            Chain::Polygon => Some(137),
            Chain::Arbitrum => Some(42161),
            Chain::Optimism => Some(10),
            Chain::Base => Some(8453),
            Chain::Avalanche => Some(43114),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet => "BTC",
            Chain::Litecoin => "LTC",
            Chain::Ethereum | Chain::EthereumSepolia => "ETH",
            Chain::Bnb => "BNB",
            Chain::Polygon => "MATIC",
            Chain::Arbitrum | Chain::Optimism | Chain::Base => "ETH",
            Chain::Avalanche => "AVAX",
            Chain::Solana | Chain::SolanaDevnet => "SOL",
        }
    }

    /// Decimal precision of the native asset
    pub fn decimals(&self) -> u8 {
        match self.family() {
            ChainFamily::Utxo => 8,
            ChainFamily::Evm => 18,
            ChainFamily::Solana => 9,
        }
    }
}

impl std::str::FromStr for Chain {
    type Err = KeysignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "bitcoin_testnet" | "btc_testnet" => Ok(Chain::BitcoinTestnet),
            "litecoin" | "ltc" => Ok(Chain::Litecoin),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "ethereum_sepolia" | "sepolia" => Ok(Chain::EthereumSepolia),
            "bnb" | "bsc" | "binance" => Ok(Chain::Bnb),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "optimism" | "op" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "avalanche" | "avax" => Ok(Chain::Avalanche),
            "solana" | "sol" => Ok(Chain::Solana),
            "solana_devnet" | "sol_devnet" => Ok(Chain::SolanaDevnet),
            other => Err(KeysignError::UnsupportedChain(other.to_string())),
        }
    }
}

// =============================================================================
// Coin
// =============================================================================

/// An asset held by the vault: the chain, the asset identity, and the
/// owning account's on-chain address and public key material.
///
/// Immutable once constructed for a given derivation; a new `Coin` is
/// derived per chain/account by the vault layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub chain: Chain,
    pub ticker: String,
    pub decimals: u8,
    pub is_native_token: bool,
    /// Contract / mint address when this is a token, empty for native
    #[serde(default)]
    pub contract_address: Option<String>,
    /// The owning account's on-chain address
    pub address: String,
    /// Hex of the signing public key: compressed secp256k1 (33 bytes) for
    /// UTXO and EVM chains, ed25519 (32 bytes) for Solana
    pub hex_public_key: String,
}

impl Coin {
    pub fn native(chain: Chain, address: impl Into<String>, hex_public_key: impl Into<String>) -> Self {
        Self {
            chain,
            ticker: chain.symbol().to_string(),
            decimals: chain.decimals(),
            is_native_token: true,
            contract_address: None,
            address: address.into(),
            hex_public_key: hex_public_key.into(),
        }
    }

    /// Decode the public key hex
    pub fn public_key_bytes(&self) -> KeysignResult<Vec<u8>> {
        hex::decode(&self.hex_public_key)
            .map_err(|e| KeysignError::InvalidPublicKey(format!("{}: {}", self.hex_public_key, e)))
    }
}

// =============================================================================
// Transaction Intent
// =============================================================================

/// Structured payload for contract interactions carried by an intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentPayload {
    /// ERC-20 allowance grant, used for approve-then-swap sequencing
    Erc20Approve { spender: String, amount: u128 },
    /// Pre-encoded contract calldata (swap router interactions)
    ContractCall {
        #[serde(with = "hex_bytes")]
        data: Vec<u8>,
    },
}

/// Chain-agnostic description of what the user wants to do.
///
/// `amount` is always in the asset's smallest unit; decimal input is
/// converted via [`crate::amount::to_raw_units`] before an intent is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub coin: Coin,
    pub to_address: String,
    /// Amount in raw units (satoshis / wei / lamports / token base units)
    pub amount: u128,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub payload: Option<IntentPayload>,
    /// Add exactly one to the provided nonce. Set by callers that chain a
    /// dependent transaction behind one already built with the same nonce
    /// (approve-then-swap).
    #[serde(default)]
    pub increment_nonce: bool,
}

// =============================================================================
// Chain-Specific Parameters
// =============================================================================

/// A spendable output, as reported by the UTXO-fetch service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInfo {
    /// Funding transaction id, big-endian display hex
    pub hash: String,
    pub index: u32,
    /// Value in satoshis
    pub amount: u64,
}

/// Per-chain context resolved by the external fee/chain-state service.
///
/// Exactly one variant is populated and it must match the coin's chain
/// family; a mismatch is a contract violation surfaced as
/// `UnsupportedChain` before anything is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "chain_family", rename_all = "snake_case")]
pub enum ChainParameters {
    Utxo {
        utxos: Vec<UtxoInfo>,
        /// Fee rate in satoshis per virtual byte
        byte_fee: u64,
    },
    Evm {
        nonce: u64,
        gas_limit: u64,
        max_fee_per_gas: u128,
        priority_fee: u128,
        /// Explicit gas override. Together with `gas_price` this forces
        /// legacy (EIP-155) encoding.
        #[serde(default)]
        gas: Option<u64>,
        /// Explicit flat gas price in wei (legacy mode)
        #[serde(default)]
        gas_price: Option<u128>,
    },
    Solana {
        recent_blockhash: String,
        /// Compute-unit price in micro-lamports, 0 to omit
        priority_fee_price: u64,
    },
}

impl ChainParameters {
    pub fn family(&self) -> ChainFamily {
        match self {
            ChainParameters::Utxo { .. } => ChainFamily::Utxo,
            ChainParameters::Evm { .. } => ChainFamily::Evm,
            ChainParameters::Solana { .. } => ChainFamily::Solana,
        }
    }
}

// =============================================================================
// Signed Result
// =============================================================================

/// Final output of a successful pipeline run: the broadcastable raw
/// transaction and its canonical network transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransactionResult {
    /// Hex for UTXO/EVM chains, base64 for Solana
    pub raw_transaction: String,
    pub transaction_hash: String,
}

// =============================================================================
// Hex serde helper
// =============================================================================

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_families() {
        assert_eq!(Chain::Bitcoin.family(), ChainFamily::Utxo);
        assert_eq!(Chain::Litecoin.family(), ChainFamily::Utxo);
        assert_eq!(Chain::Ethereum.family(), ChainFamily::Evm);
        assert_eq!(Chain::Base.family(), ChainFamily::Evm);
        assert_eq!(Chain::Solana.family(), ChainFamily::Solana);
    }

    #[test]
    fn test_chain_properties() {
        assert_eq!(Chain::Ethereum.chain_id(), Some(1));
        assert_eq!(Chain::Arbitrum.chain_id(), Some(42161));
        assert_eq!(Chain::Bitcoin.chain_id(), None);
        assert_eq!(Chain::Bitcoin.decimals(), 8);
        assert_eq!(Chain::Solana.decimals(), 9);
    }

    #[test]
    fn test_chain_from_str() {
        assert_eq!("btc".parse::<Chain>().unwrap(), Chain::Bitcoin);
        assert_eq!("sepolia".parse::<Chain>().unwrap(), Chain::EthereumSepolia);
        assert!(matches!(
            "ripple".parse::<Chain>(),
            Err(KeysignError::UnsupportedChain(_))
        ));
    }

    #[test]
    fn test_parameters_family() {
        let params = ChainParameters::Utxo {
            utxos: vec![],
            byte_fee: 10,
        };
        assert_eq!(params.family(), ChainFamily::Utxo);

        let params = ChainParameters::Solana {
            recent_blockhash: "11111111111111111111111111111111".into(),
            priority_fee_price: 0,
        };
        assert_eq!(params.family(), ChainFamily::Solana);
    }

    #[test]
    fn test_intent_round_trips_through_json() {
        let coin = Coin::native(Chain::Ethereum, "0xabc", "02deadbeef");
        let intent = TransactionIntent {
            coin,
            to_address: "0xdef".into(),
            amount: 1_000_000_000_000_000_000,
            memo: Some("hello".into()),
            payload: Some(IntentPayload::ContractCall {
                data: vec![0x01, 0x02],
            }),
            increment_nonce: false,
        };
        let json = serde_json::to_string(&intent).unwrap();
        let back: TransactionIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
    }
}
