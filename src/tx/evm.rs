//! Account/EVM transaction building
//!
//! Two encodings are supported: legacy (EIP-155), forced when the caller
//! supplies both an explicit gas and gas price, and fee-market (EIP-1559
//! enveloped) otherwise. Native transfers carry the amount with optional
//! memo calldata; token transfers and approvals are ABI-encoded against
//! the coin's contract.

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address as EthAddress, Bytes, Eip1559TransactionRequest, Signature as EthSignature,
    TransactionRequest, U256,
};
use ethers_core::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::address;
use crate::error::{KeysignError, KeysignResult};
use crate::signing::{PreImage, SigningAlgorithm, VerifiedSignature};
use crate::types::{
    Chain, ChainParameters, IntentPayload, SignedTransactionResult, TransactionIntent,
};

/// ERC-20 `transfer(address,uint256)`
const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// ERC-20 `approve(address,uint256)`
const ERC20_APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// Transaction encoding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvmTxMode {
    /// Flat gas price, EIP-155 replay protection
    Legacy,
    /// Fee-market (enveloped, type 0x02)
    FeeMarket,
}

/// Unsigned EVM transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmPayload {
    pub chain: Chain,
    pub mode: EvmTxMode,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    /// Populated in legacy mode only
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: u128,
    pub priority_fee: u128,
    pub to: String,
    /// Value in wei
    pub value: u128,
    #[serde(with = "crate::types::hex_bytes")]
    pub data: Vec<u8>,
    #[serde(with = "crate::types::hex_bytes")]
    pub public_key: Vec<u8>,
}

pub(crate) fn build(intent: &TransactionIntent, params: &ChainParameters) -> KeysignResult<EvmPayload> {
    let ChainParameters::Evm {
        nonce,
        gas_limit,
        max_fee_per_gas,
        priority_fee,
        gas,
        gas_price,
    } = params
    else {
        return Err(KeysignError::UnsupportedChain(format!(
            "{:?} parameters for an EVM build",
            params.family()
        )));
    };

    let chain = intent.coin.chain;
    let chain_id = chain
        .chain_id()
        .ok_or_else(|| KeysignError::UnsupportedChain(format!("{:?} has no EVM chain id", chain)))?;

    if !address::is_valid_address(chain, &intent.to_address) {
        return Err(KeysignError::InvalidDestinationAddress(
            intent.to_address.clone(),
        ));
    }

    let public_key = intent.coin.public_key_bytes()?;

    // A dependent transaction (approve-then-swap) sits exactly one nonce
    // after the one it follows.
    let nonce = nonce + u64::from(intent.increment_nonce);

    // Explicit gas plus an explicit flat price pins the legacy layout;
    // anything less falls through to the fee-market envelope.
    let (mode, gas_limit, gas_price) = match (gas, gas_price) {
        (Some(gas), Some(price)) => (EvmTxMode::Legacy, *gas, Some(*price)),
        _ => (EvmTxMode::FeeMarket, *gas_limit, None),
    };

    let (to, value, data) = match &intent.payload {
        Some(IntentPayload::Erc20Approve { spender, amount }) => {
            if !address::is_valid_address(chain, spender) {
                return Err(KeysignError::InvalidDestinationAddress(spender.clone()));
            }
            let contract = token_contract(intent)?;
            (contract, 0, encode_erc20_call(ERC20_APPROVE_SELECTOR, spender, *amount)?)
        }
        Some(IntentPayload::ContractCall { data }) => {
            (intent.to_address.clone(), intent.amount, data.clone())
        }
        None if intent.coin.is_native_token => {
            let data = intent
                .memo
                .as_ref()
                .map(|m| m.as_bytes().to_vec())
                .unwrap_or_default();
            (intent.to_address.clone(), intent.amount, data)
        }
        None => {
            let contract = token_contract(intent)?;
            (
                contract,
                0,
                encode_erc20_call(ERC20_TRANSFER_SELECTOR, &intent.to_address, intent.amount)?,
            )
        }
    };

    Ok(EvmPayload {
        chain,
        mode,
        chain_id,
        nonce,
        gas_limit,
        gas_price,
        max_fee_per_gas: *max_fee_per_gas,
        priority_fee: *priority_fee,
        to,
        value,
        data,
        public_key,
    })
}

fn token_contract(intent: &TransactionIntent) -> KeysignResult<String> {
    intent
        .coin
        .contract_address
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            KeysignError::EncodingFailure(format!(
                "token operation on {} without a contract address",
                intent.coin.ticker
            ))
        })
}

/// selector ‖ 32-byte padded address ‖ 32-byte big-endian amount
fn encode_erc20_call(selector: [u8; 4], address: &str, amount: u128) -> KeysignResult<Vec<u8>> {
    let addr = EthAddress::from_str(address)
        .map_err(|e| KeysignError::InvalidDestinationAddress(format!("{}: {}", address, e)))?;

    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&selector);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(addr.as_bytes());
    let mut amount_be = [0u8; 32];
    U256::from(amount).to_big_endian(&mut amount_be);
    data.extend_from_slice(&amount_be);
    Ok(data)
}

fn typed_transaction(payload: &EvmPayload) -> KeysignResult<TypedTransaction> {
    let to = EthAddress::from_str(&payload.to)
        .map_err(|e| KeysignError::MalformedPayload(format!("{}: {}", payload.to, e)))?;
    let data = Bytes::from(payload.data.clone());

    let tx = match payload.mode {
        EvmTxMode::Legacy => {
            let gas_price = payload.gas_price.ok_or_else(|| {
                KeysignError::MalformedPayload("legacy payload without gas price".into())
            })?;
            TypedTransaction::Legacy(
                TransactionRequest::new()
                    .to(to)
                    .value(U256::from(payload.value))
                    .gas(payload.gas_limit)
                    .gas_price(U256::from(gas_price))
                    .nonce(payload.nonce)
                    .chain_id(payload.chain_id)
                    .data(data),
            )
        }
        EvmTxMode::FeeMarket => TypedTransaction::Eip1559(
            Eip1559TransactionRequest::new()
                .to(to)
                .value(U256::from(payload.value))
                .gas(payload.gas_limit)
                .max_fee_per_gas(U256::from(payload.max_fee_per_gas))
                .max_priority_fee_per_gas(U256::from(payload.priority_fee))
                .nonce(payload.nonce)
                .chain_id(payload.chain_id)
                .data(data),
        ),
    };

    Ok(tx)
}

/// One keccak256 signing hash for the whole transaction
pub(crate) fn pre_image_hashes(payload: &EvmPayload) -> KeysignResult<Vec<PreImage>> {
    let tx = typed_transaction(payload)?;
    let sighash = tx.sighash();

    Ok(vec![PreImage::new(
        sighash.as_bytes().to_vec(),
        hex::encode(&payload.public_key),
        SigningAlgorithm::Secp256k1Ecdsa,
    )])
}

pub(crate) fn finalize(
    payload: &EvmPayload,
    signatures: &[VerifiedSignature],
) -> KeysignResult<SignedTransactionResult> {
    let [signature] = signatures else {
        return Err(KeysignError::FinalizationFailure(format!(
            "expected exactly one signature, got {}",
            signatures.len()
        )));
    };

    let recovery_id = signature.recovery_id().ok_or_else(|| {
        KeysignError::FinalizationFailure("EVM finalization requires a recoverable signature".into())
    })? as u64;

    let v = match payload.mode {
        EvmTxMode::Legacy => payload.chain_id * 2 + 35 + recovery_id,
        EvmTxMode::FeeMarket => recovery_id,
    };

    let eth_signature = EthSignature {
        r: U256::from_big_endian(signature.r()),
        s: U256::from_big_endian(signature.s()),
        v,
    };

    let tx = typed_transaction(payload)?;
    let raw = tx.rlp_signed(&eth_signature);
    let tx_hash = keccak256(&raw);

    Ok(SignedTransactionResult {
        raw_transaction: format!("0x{}", hex::encode(&raw)),
        transaction_hash: format!("0x{}", hex::encode(tx_hash)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coin;

    const PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const DEST: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn eth_coin() -> Coin {
        let pk = hex::decode(PUBKEY).unwrap();
        let addr = address::derive_address(Chain::Ethereum, &pk).unwrap();
        Coin::native(Chain::Ethereum, addr, PUBKEY)
    }

    fn eth_intent() -> TransactionIntent {
        TransactionIntent {
            coin: eth_coin(),
            to_address: DEST.into(),
            amount: 1_000_000_000_000_000_000,
            memo: None,
            payload: None,
            increment_nonce: false,
        }
    }

    fn fee_market_params() -> ChainParameters {
        ChainParameters::Evm {
            nonce: 5,
            gas_limit: 21_000,
            max_fee_per_gas: 30_000_000_000,
            priority_fee: 2_000_000_000,
            gas: None,
            gas_price: None,
        }
    }

    #[test]
    fn test_fee_market_is_the_default_mode() {
        let payload = build(&eth_intent(), &fee_market_params()).unwrap();
        assert_eq!(payload.mode, EvmTxMode::FeeMarket);
        assert_eq!(payload.chain_id, 1);
        assert_eq!(payload.nonce, 5);
        assert_eq!(payload.gas_limit, 21_000);
    }

    #[test]
    fn test_explicit_gas_and_price_force_legacy() {
        let params = ChainParameters::Evm {
            nonce: 5,
            gas_limit: 21_000,
            max_fee_per_gas: 30_000_000_000,
            priority_fee: 2_000_000_000,
            gas: Some(600_000),
            gas_price: Some(40_000_000_000),
        };
        let payload = build(&eth_intent(), &params).unwrap();
        assert_eq!(payload.mode, EvmTxMode::Legacy);
        assert_eq!(payload.gas_limit, 600_000);
        assert_eq!(payload.gas_price, Some(40_000_000_000));

        // Omitting either override falls back to fee-market
        let params = ChainParameters::Evm {
            nonce: 5,
            gas_limit: 21_000,
            max_fee_per_gas: 30_000_000_000,
            priority_fee: 2_000_000_000,
            gas: Some(600_000),
            gas_price: None,
        };
        assert_eq!(build(&eth_intent(), &params).unwrap().mode, EvmTxMode::FeeMarket);
    }

    #[test]
    fn test_increment_nonce_adds_exactly_one() {
        let mut intent = eth_intent();
        intent.increment_nonce = true;
        let payload = build(&intent, &fee_market_params()).unwrap();
        assert_eq!(payload.nonce, 6);

        intent.increment_nonce = false;
        assert_eq!(build(&intent, &fee_market_params()).unwrap().nonce, 5);
    }

    #[test]
    fn test_memo_becomes_calldata() {
        let mut intent = eth_intent();
        intent.memo = Some("swap:out".into());
        let payload = build(&intent, &fee_market_params()).unwrap();
        assert_eq!(payload.data, b"swap:out");

        intent.memo = None;
        assert!(build(&intent, &fee_market_params()).unwrap().data.is_empty());
    }

    #[test]
    fn test_erc20_transfer_encoding() {
        let mut intent = eth_intent();
        intent.coin.is_native_token = false;
        intent.coin.ticker = "USDC".into();
        intent.coin.decimals = 6;
        intent.coin.contract_address =
            Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into());
        intent.amount = 250_000_000;

        let payload = build(&intent, &fee_market_params()).unwrap();
        assert_eq!(payload.to, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        assert_eq!(payload.value, 0);
        assert_eq!(&payload.data[..4], &ERC20_TRANSFER_SELECTOR);
        assert_eq!(payload.data.len(), 4 + 32 + 32);
        // Recipient sits in the low 20 bytes of the first argument
        let dest = EthAddress::from_str(DEST).unwrap();
        assert_eq!(&payload.data[16..36], dest.as_bytes());
        // Amount is the big-endian tail
        assert_eq!(
            U256::from_big_endian(&payload.data[36..68]),
            U256::from(250_000_000u64)
        );
    }

    #[test]
    fn test_approve_payload_encoding() {
        let mut intent = eth_intent();
        intent.coin.is_native_token = false;
        intent.coin.contract_address =
            Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into());
        intent.payload = Some(IntentPayload::Erc20Approve {
            spender: DEST.into(),
            amount: u128::MAX,
        });

        let payload = build(&intent, &fee_market_params()).unwrap();
        assert_eq!(&payload.data[..4], &ERC20_APPROVE_SELECTOR);
        assert_eq!(payload.value, 0);
    }

    #[test]
    fn test_token_without_contract_fails() {
        let mut intent = eth_intent();
        intent.coin.is_native_token = false;
        intent.coin.contract_address = None;
        assert!(build(&intent, &fee_market_params()).is_err());
    }

    #[test]
    fn test_invalid_destination() {
        let mut intent = eth_intent();
        intent.to_address = "0x1234".into();
        let err = build(&intent, &fee_market_params()).unwrap_err();
        assert!(matches!(err, KeysignError::InvalidDestinationAddress(_)));
    }

    #[test]
    fn test_single_deterministic_pre_image() {
        let payload = build(&eth_intent(), &fee_market_params()).unwrap();
        let a = pre_image_hashes(&payload).unwrap();
        let b = pre_image_hashes(&payload).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(a[0].hash.len(), 32);
        assert_eq!(a[0].algorithm, SigningAlgorithm::Secp256k1Ecdsa);
    }

    #[test]
    fn test_sighash_differs_between_modes() {
        let fee_market = build(&eth_intent(), &fee_market_params()).unwrap();
        let params = ChainParameters::Evm {
            nonce: 5,
            gas_limit: 21_000,
            max_fee_per_gas: 30_000_000_000,
            priority_fee: 2_000_000_000,
            gas: Some(21_000),
            gas_price: Some(30_000_000_000),
        };
        let legacy = build(&eth_intent(), &params).unwrap();
        assert_ne!(
            pre_image_hashes(&fee_market).unwrap()[0].hash,
            pre_image_hashes(&legacy).unwrap()[0].hash
        );
    }
}
