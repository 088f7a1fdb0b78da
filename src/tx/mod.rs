//! Per-chain transaction building and finalization
//!
//! The pipeline runs `Built → HashExtracted → Verified → Finalized`,
//! strictly in that order. The chain family is resolved exactly once, at
//! [`build`]; every later stage follows the payload's own tag. A failure
//! at any stage aborts the whole operation — there is no partial result
//! and no internal retry.

pub mod evm;
pub mod solana;
pub mod utxo;

use serde::{Deserialize, Serialize};

use crate::error::{KeysignError, KeysignResult};
use crate::log_debug;
use crate::signing::{assemble, PreImage, SignatureSet, VerifiedSignature};
use crate::types::{Chain, ChainFamily, ChainParameters, SignedTransactionResult, TransactionIntent};

/// Chain-specific unsigned transaction, carrying everything needed to
/// re-derive the chain-native encoding deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum UnsignedPayload {
    Utxo(utxo::UtxoPayload),
    Evm(evm::EvmPayload),
    Solana(solana::SolanaPayload),
}

impl UnsignedPayload {
    pub fn chain(&self) -> Chain {
        match self {
            UnsignedPayload::Utxo(p) => p.chain,
            UnsignedPayload::Evm(p) => p.chain,
            UnsignedPayload::Solana(p) => p.chain,
        }
    }

    /// Opaque serialized form, for handing across process boundaries
    pub fn encode(&self) -> KeysignResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| KeysignError::EncodingFailure(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> KeysignResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| KeysignError::MalformedPayload(e.to_string()))
    }
}

/// Build an unsigned payload from an intent and the chain parameters
/// resolved for it.
///
/// Fails fast with `UnsupportedChain` when the coin's chain family and the
/// parameter variant disagree — a mismatch is a caller contract violation,
/// not something to paper over.
pub fn build(intent: &TransactionIntent, params: &ChainParameters) -> KeysignResult<UnsignedPayload> {
    let family = intent.coin.chain.family();
    if params.family() != family {
        return Err(KeysignError::UnsupportedChain(format!(
            "coin {} is {:?} but parameters are {:?}",
            intent.coin.ticker,
            family,
            params.family()
        )));
    }

    log_debug!(
        "tx",
        "building unsigned payload",
        chain = format!("{:?}", intent.coin.chain),
        to_address = intent.to_address,
        amount = intent.amount,
    );

    match (family, params) {
        (ChainFamily::Utxo, ChainParameters::Utxo { utxos, byte_fee }) => {
            utxo::build(intent, utxos, *byte_fee).map(UnsignedPayload::Utxo)
        }
        (ChainFamily::Evm, ChainParameters::Evm { .. }) => {
            evm::build(intent, params).map(UnsignedPayload::Evm)
        }
        (
            ChainFamily::Solana,
            ChainParameters::Solana {
                recent_blockhash,
                priority_fee_price,
            },
        ) => solana::build(intent, recent_blockhash, *priority_fee_price).map(UnsignedPayload::Solana),
        // Family equality was checked above
        _ => Err(KeysignError::UnsupportedChain(format!(
            "{:?}",
            intent.coin.chain
        ))),
    }
}

/// Derive the exact byte sequences the signing ceremony must sign.
///
/// Pure function of the payload: identical payloads yield byte-identical
/// hash sets, which is what keeps co-signing devices consistent.
pub fn pre_image_hashes(payload: &UnsignedPayload) -> KeysignResult<Vec<PreImage>> {
    match payload {
        UnsignedPayload::Utxo(p) => utxo::pre_image_hashes(p),
        UnsignedPayload::Evm(p) => evm::pre_image_hashes(p),
        UnsignedPayload::Solana(p) => solana::pre_image_hashes(p),
    }
}

/// Inject verified signatures into the chain-native encoder and produce
/// the broadcastable transaction plus its canonical id.
pub fn finalize(
    payload: &UnsignedPayload,
    signatures: &[VerifiedSignature],
) -> KeysignResult<SignedTransactionResult> {
    let result = match payload {
        UnsignedPayload::Utxo(p) => utxo::finalize(p, signatures),
        UnsignedPayload::Evm(p) => evm::finalize(p, signatures),
        UnsignedPayload::Solana(p) => solana::finalize(p, signatures),
    }?;

    log_debug!(
        "tx",
        "finalized transaction",
        chain = format!("{:?}", payload.chain()),
        tx_hash = result.transaction_hash,
    );

    Ok(result)
}

/// The full pipeline: build, extract pre-images, bind and verify the
/// ceremony's signatures, finalize.
pub fn sign_transaction(
    intent: &TransactionIntent,
    params: &ChainParameters,
    signatures: &SignatureSet,
) -> KeysignResult<SignedTransactionResult> {
    let payload = build(intent, params)?;
    let pre_images = pre_image_hashes(&payload)?;
    let public_key = intent.coin.public_key_bytes()?;
    let verified = assemble(&pre_images, signatures, &public_key)?;
    finalize(&payload, &verified)
}
