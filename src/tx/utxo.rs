//! Bitcoin-family transaction building
//!
//! Spends every provided UTXO (output selection is the fee service's
//! concern), pays the destination, and returns change to the sender's own
//! P2WPKH script. One BIP-143 sighash per input; signatures come back from
//! the ceremony and are injected as witnesses.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature as EcdsaSignature;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    absolute::LockTime, consensus::encode, transaction::Version, Amount, CompressedPublicKey,
    OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::address;
use crate::error::{KeysignError, KeysignResult};
use crate::signing::{PreImage, SigningAlgorithm, VerifiedSignature};
use crate::types::{Chain, SignedTransactionResult, TransactionIntent, UtxoInfo};

/// Outputs below this many satoshis are not worth creating
const DUST_LIMIT: u64 = 546;

/// Virtual-size accounting for the plan: overhead + per-input + per-output
const OVERHEAD_VBYTES: u64 = 10;
const P2WPKH_INPUT_VBYTES: u64 = 68;
const P2WPKH_OUTPUT_VBYTES: u64 = 31;

/// A planned input, pinned to the funding outpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedInput {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
}

/// A planned output with its final locking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOutput {
    #[serde(with = "crate::types::hex_bytes")]
    pub script: Vec<u8>,
    pub value: u64,
}

/// Unsigned UTXO transaction plus the plan that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoPayload {
    pub chain: Chain,
    /// Sender's compressed public key; every input spends the P2WPKH
    /// script derived from it
    #[serde(with = "crate::types::hex_bytes")]
    pub public_key: Vec<u8>,
    pub inputs: Vec<PlannedInput>,
    pub outputs: Vec<PlannedOutput>,
    /// Fee the plan settled on, in satoshis
    pub fee: u64,
    /// Virtual size the fee was computed against
    pub vsize_estimate: u64,
}

pub(crate) fn build(
    intent: &TransactionIntent,
    utxos: &[UtxoInfo],
    byte_fee: u64,
) -> KeysignResult<UtxoPayload> {
    let chain = intent.coin.chain;

    let to_script = address::lock_script(chain, &intent.to_address)?;

    let public_key = intent.coin.public_key_bytes()?;
    let sender_key = compressed_key(&public_key)?;
    let change_script = ScriptBuf::new_p2wpkh(&sender_key.wpubkey_hash());

    if utxos.is_empty() {
        return Err(KeysignError::InsufficientFunds(
            "no spendable outputs provided".into(),
        ));
    }

    let amount: u64 = intent.amount.try_into().map_err(|_| {
        KeysignError::EncodingFailure(format!("amount {} exceeds u64 range", intent.amount))
    })?;

    let mut inputs = Vec::with_capacity(utxos.len());
    let mut total_input: u64 = 0;
    for utxo in utxos {
        // Validate the outpoint hash now so later stages can't fail on it
        Txid::from_str(&utxo.hash)
            .map_err(|e| KeysignError::EncodingFailure(format!("utxo {}: {}", utxo.hash, e)))?;
        total_input = total_input
            .checked_add(utxo.amount)
            .ok_or_else(|| KeysignError::EncodingFailure("input value overflow".into()))?;
        inputs.push(PlannedInput {
            txid: utxo.hash.clone(),
            vout: utxo.index,
            value: utxo.amount,
        });
    }

    // Plan: recipient + change output, fee from the estimated virtual size
    let vsize_estimate = OVERHEAD_VBYTES
        + inputs.len() as u64 * P2WPKH_INPUT_VBYTES
        + 2 * P2WPKH_OUTPUT_VBYTES;
    let fee = vsize_estimate * byte_fee;

    let needed = amount
        .checked_add(fee)
        .ok_or_else(|| KeysignError::EncodingFailure("amount + fee overflow".into()))?;
    if total_input < needed {
        return Err(KeysignError::InsufficientFunds(format!(
            "have {} sats, need {} sats (amount {} + fee {})",
            total_input, needed, amount, fee
        )));
    }

    let mut outputs = vec![PlannedOutput {
        script: to_script.into_bytes(),
        value: amount,
    }];
    let change = total_input - amount - fee;
    if change > DUST_LIMIT {
        outputs.push(PlannedOutput {
            script: change_script.into_bytes(),
            value: change,
        });
    }
    // Sub-dust change is left to the fee rather than creating an unspendable output

    Ok(UtxoPayload {
        chain,
        public_key,
        inputs,
        outputs,
        fee,
        vsize_estimate,
    })
}

/// Rebuild the chain-native transaction skeleton from the plan
fn to_transaction(payload: &UtxoPayload) -> KeysignResult<Transaction> {
    let mut tx_inputs = Vec::with_capacity(payload.inputs.len());
    for input in &payload.inputs {
        let txid = Txid::from_str(&input.txid)
            .map_err(|e| KeysignError::MalformedPayload(format!("{}: {}", input.txid, e)))?;
        tx_inputs.push(TxIn {
            previous_output: OutPoint::new(txid, input.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
    }

    let tx_outputs = payload
        .outputs
        .iter()
        .map(|o| TxOut {
            value: Amount::from_sat(o.value),
            script_pubkey: ScriptBuf::from_bytes(o.script.clone()),
        })
        .collect();

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: tx_outputs,
    })
}

fn compressed_key(bytes: &[u8]) -> KeysignResult<CompressedPublicKey> {
    Ok(CompressedPublicKey(
        bitcoin::secp256k1::PublicKey::from_slice(bytes)
            .map_err(|e| KeysignError::InvalidPublicKey(e.to_string()))?,
    ))
}

/// One BIP-143 sighash per input, each bound to the sender's key hash
pub(crate) fn pre_image_hashes(payload: &UtxoPayload) -> KeysignResult<Vec<PreImage>> {
    let tx = to_transaction(payload)?;
    let key = compressed_key(&payload.public_key)?;
    let key_hash = key.wpubkey_hash();
    let spent_script = ScriptBuf::new_p2wpkh(&key_hash);

    let mut cache = SighashCache::new(&tx);
    let mut hashes = Vec::with_capacity(payload.inputs.len());
    for (index, input) in payload.inputs.iter().enumerate() {
        let sighash = cache
            .p2wpkh_signature_hash(
                index,
                &spent_script,
                Amount::from_sat(input.value),
                EcdsaSighashType::All,
            )
            .map_err(|e| KeysignError::MalformedPayload(e.to_string()))?;

        hashes.push(
            PreImage::new(
                sighash.to_byte_array().to_vec(),
                hex::encode(key_hash.as_byte_array()),
                SigningAlgorithm::Secp256k1Ecdsa,
            )
            .with_input_index(index),
        );
    }

    Ok(hashes)
}

/// Inject witnesses and serialize the final transaction
pub(crate) fn finalize(
    payload: &UtxoPayload,
    signatures: &[VerifiedSignature],
) -> KeysignResult<SignedTransactionResult> {
    if signatures.len() != payload.inputs.len() {
        return Err(KeysignError::FinalizationFailure(format!(
            "expected {} signatures, got {}",
            payload.inputs.len(),
            signatures.len()
        )));
    }

    let mut tx = to_transaction(payload)?;
    let key = compressed_key(&payload.public_key)?;

    let mut filled = vec![false; tx.input.len()];
    for signature in signatures {
        let index = signature.input_index();
        if index >= tx.input.len() || filled[index] {
            return Err(KeysignError::FinalizationFailure(format!(
                "signature bound to invalid or duplicate input {}",
                index
            )));
        }

        let der = EcdsaSignature::from_compact(signature.rs())
            .map_err(|e| KeysignError::FinalizationFailure(e.to_string()))?
            .serialize_der();

        let mut sig_with_type = der.to_vec();
        sig_with_type.push(EcdsaSighashType::All as u8);

        let mut witness = Witness::new();
        witness.push(sig_with_type);
        witness.push(key.to_bytes());
        tx.input[index].witness = witness;
        filled[index] = true;
    }

    let raw = encode::serialize(&tx);
    Ok(SignedTransactionResult {
        raw_transaction: hex::encode(raw),
        transaction_hash: tx.compute_txid().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coin;

    const PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn test_coin() -> Coin {
        let pk = hex::decode(PUBKEY).unwrap();
        let addr = address::derive_address(Chain::Bitcoin, &pk).unwrap();
        Coin::native(Chain::Bitcoin, addr, PUBKEY)
    }

    fn test_intent(amount: u128) -> TransactionIntent {
        TransactionIntent {
            coin: test_coin(),
            to_address: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".into(),
            amount,
            memo: None,
            payload: None,
            increment_nonce: false,
        }
    }

    fn test_utxos() -> Vec<UtxoInfo> {
        vec![
            UtxoInfo {
                hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".into(),
                index: 0,
                amount: 50_000,
            },
            UtxoInfo {
                hash: "d4735e3a265e16eee03f59718b9b5d03019c07d8b6c51f90da3a666eec13ab35".into(),
                index: 1,
                amount: 30_000,
            },
        ]
    }

    #[test]
    fn test_one_pre_image_per_input() {
        let payload = build(&test_intent(60_000), &test_utxos(), 10).unwrap();
        let hashes = pre_image_hashes(&payload).unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0].input_index, 0);
        assert_eq!(hashes[1].input_index, 1);
        // Every pre-image is bound to the sender's key hash
        let key = compressed_key(&payload.public_key).unwrap();
        let key_hash = hex::encode(key.wpubkey_hash().as_byte_array());
        for h in &hashes {
            assert_eq!(h.signer_key, key_hash);
            assert_eq!(h.hash.len(), 32);
        }
        // Distinct inputs hash differently
        assert_ne!(hashes[0].hash, hashes[1].hash);
    }

    #[test]
    fn test_plan_fee_and_change() {
        let byte_fee = 10;
        let payload = build(&test_intent(60_000), &test_utxos(), byte_fee).unwrap();
        assert_eq!(payload.vsize_estimate, 10 + 2 * 68 + 2 * 31);
        assert_eq!(payload.fee, payload.vsize_estimate * byte_fee);
        assert_eq!(payload.outputs.len(), 2);
        assert_eq!(payload.outputs[0].value, 60_000);
        assert_eq!(payload.outputs[1].value, 80_000 - 60_000 - payload.fee);
    }

    #[test]
    fn test_dust_change_folded_into_fee() {
        // 80_000 total, fee 2_080, change would be 420 < dust
        let payload = build(&test_intent(77_500), &test_utxos(), 10).unwrap();
        assert_eq!(payload.outputs.len(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let err = build(&test_intent(80_000), &test_utxos(), 10).unwrap_err();
        assert!(matches!(err, KeysignError::InsufficientFunds(_)));

        let err = build(&test_intent(1), &[], 10).unwrap_err();
        assert!(matches!(err, KeysignError::InsufficientFunds(_)));
    }

    #[test]
    fn test_invalid_destination() {
        let mut intent = test_intent(1_000);
        intent.to_address = "not-an-address".into();
        let err = build(&intent, &test_utxos(), 10).unwrap_err();
        assert!(matches!(err, KeysignError::InvalidDestinationAddress(_)));
    }

    #[test]
    fn test_pre_images_are_deterministic() {
        let a = build(&test_intent(60_000), &test_utxos(), 10).unwrap();
        let b = build(&test_intent(60_000), &test_utxos(), 10).unwrap();
        assert_eq!(
            pre_image_hashes(&a).unwrap(),
            pre_image_hashes(&b).unwrap()
        );
    }

    #[test]
    fn test_amount_changes_every_sighash() {
        let a = pre_image_hashes(&build(&test_intent(60_000), &test_utxos(), 10).unwrap()).unwrap();
        let b = pre_image_hashes(&build(&test_intent(60_001), &test_utxos(), 10).unwrap()).unwrap();
        assert_ne!(a[0].hash, b[0].hash);
        assert_ne!(a[1].hash, b[1].hash);
    }

    #[test]
    fn test_finalize_requires_all_signatures() {
        let payload = build(&test_intent(60_000), &test_utxos(), 10).unwrap();
        let err = finalize(&payload, &[]).unwrap_err();
        assert!(matches!(err, KeysignError::FinalizationFailure(_)));
    }
}
